//! Process-local connection registry.
//!
//! Maps user identity to the set of live connections this process holds.
//! Connections are exclusively owned by the accepting process and never
//! shared across instances; cross-process reach comes from the event bus,
//! not from this registry.
//!
//! # Invariant
//!
//! A user key exists in the map iff its connection set is non-empty;
//! empty sets are pruned on unregister.
//!
//! # Thread Safety
//!
//! Uses `RwLock` since fanout lookups vastly outnumber register/
//! unregister. Lock scope is a single map operation; the lock is never
//! held across a transport call.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::RwLock;

use crate::domain::foundation::{ConnectionId, Timestamp, UserId};
use crate::ports::ClientTransport;

/// One live client connection and its security metadata.
///
/// Identity and comparisons go by connection id: two connections for the
/// same user are distinct entries.
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    display_name: String,
    transport: Arc<dyn ClientTransport>,
    token: SecretString,
    token_expires_at: Timestamp,
    connected_at: Timestamp,
    /// Unix seconds of the last successful authority check.
    last_validated: AtomicU64,
}

impl Connection {
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        transport: Arc<dyn ClientTransport>,
        token: SecretString,
        token_expires_at: Timestamp,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: ConnectionId::new(),
            user_id,
            display_name: display_name.into(),
            transport,
            token,
            token_expires_at,
            connected_at: now,
            last_validated: AtomicU64::new(now.as_unix_secs()),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn transport(&self) -> &Arc<dyn ClientTransport> {
        &self.transport
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }

    pub fn token_expires_at(&self) -> Timestamp {
        self.token_expires_at
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    pub fn last_validated(&self) -> Timestamp {
        Timestamp::from_unix_secs(self.last_validated.load(Ordering::SeqCst))
    }

    /// Records a successful authority re-check.
    pub fn touch_validated(&self, at: Timestamp) {
        self.last_validated.store(at.as_unix_secs(), Ordering::SeqCst);
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Registry snapshot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    pub total_connections: usize,
    pub distinct_users: usize,
}

/// Thread-safe map of user identity to live connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<UserId, HashSet<Arc<Connection>>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a connection to its user's set, creating the set if absent.
    /// Registering the same connection twice is a no-op (set semantics).
    pub async fn register(&self, connection: Arc<Connection>) {
        self.connections
            .write()
            .await
            .entry(connection.user_id().clone())
            .or_default()
            .insert(connection);
    }

    /// Removes a connection. No-op if the user or connection is absent.
    ///
    /// Returns the number of connections the user still has, which is how
    /// the lifecycle manager decides whether to flip them offline.
    pub async fn unregister(&self, user_id: &UserId, connection_id: ConnectionId) -> usize {
        let mut connections = self.connections.write().await;
        let Some(set) = connections.get_mut(user_id) else {
            return 0;
        };
        set.retain(|c| c.id() != connection_id);
        let remaining = set.len();
        if remaining == 0 {
            connections.remove(user_id);
        }
        remaining
    }

    /// Snapshot of the user's current connections (possibly empty).
    ///
    /// The snapshot is not stable: concurrent register/unregister may
    /// change the live set after this returns.
    pub async fn connections_for(&self, user_id: &UserId) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .await
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of every tracked connection (for sweeps and admin ops).
    pub async fn all_connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .await
            .values()
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    /// Diagnostic counts.
    pub async fn stats(&self) -> RegistryStats {
        let connections = self.connections.read().await;
        RegistryStats {
            total_connections: connections.values().map(HashSet::len).sum(),
            distinct_users: connections.len(),
        }
    }

    /// True if no identity key maps to an empty set. Exposed for tests.
    pub async fn no_empty_sets(&self) -> bool {
        self.connections
            .read()
            .await
            .values()
            .all(|set| !set.is_empty())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TransportError;
    use async_trait::async_trait;

    struct NoopTransport;

    #[async_trait]
    impl ClientTransport for NoopTransport {
        async fn send(&self, _frame: &str) -> Result<(), TransportError> {
            Ok(())
        }

        async fn close(&self, _code: u16, _reason: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn connection(user_id: &str) -> Arc<Connection> {
        Arc::new(Connection::new(
            user(user_id),
            user_id.to_string(),
            Arc::new(NoopTransport),
            SecretString::new("token".to_string()),
            Timestamp::now().plus_secs(3600),
        ))
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let registry = ConnectionRegistry::new();
        let conn = connection("alice");
        registry.register(conn.clone()).await;

        let found = registry.connections_for(&user("alice")).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), conn.id());
    }

    #[tokio::test]
    async fn duplicate_register_is_deduped() {
        let registry = ConnectionRegistry::new();
        let conn = connection("alice");
        registry.register(conn.clone()).await;
        registry.register(conn).await;

        assert_eq!(registry.stats().await.total_connections, 1);
    }

    #[tokio::test]
    async fn multiple_connections_per_user() {
        let registry = ConnectionRegistry::new();
        registry.register(connection("alice")).await;
        registry.register(connection("alice")).await;

        let stats = registry.stats().await;
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.distinct_users, 1);
    }

    #[tokio::test]
    async fn unregister_reports_remaining() {
        let registry = ConnectionRegistry::new();
        let first = connection("alice");
        let second = connection("alice");
        registry.register(first.clone()).await;
        registry.register(second.clone()).await;

        assert_eq!(registry.unregister(&user("alice"), first.id()).await, 1);
        assert_eq!(registry.unregister(&user("alice"), second.id()).await, 0);
    }

    #[tokio::test]
    async fn last_unregister_prunes_user_key() {
        let registry = ConnectionRegistry::new();
        let conn = connection("alice");
        registry.register(conn.clone()).await;
        registry.unregister(&user("alice"), conn.id()).await;

        assert_eq!(registry.stats().await.distinct_users, 0);
        assert!(registry.no_empty_sets().await);
    }

    #[tokio::test]
    async fn unregister_unknown_is_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            registry.unregister(&user("ghost"), ConnectionId::new()).await,
            0
        );
    }

    #[tokio::test]
    async fn lookup_unknown_user_is_empty() {
        let registry = ConnectionRegistry::new();
        assert!(registry.connections_for(&user("nobody")).await.is_empty());
    }

    #[tokio::test]
    async fn all_connections_spans_users() {
        let registry = ConnectionRegistry::new();
        registry.register(connection("alice")).await;
        registry.register(connection("bob")).await;
        registry.register(connection("bob")).await;

        assert_eq!(registry.all_connections().await.len(), 3);
    }

    #[tokio::test]
    async fn touch_validated_updates_connection() {
        let conn = connection("alice");
        let later = Timestamp::now().plus_secs(120);
        conn.touch_validated(later);
        assert_eq!(conn.last_validated().as_unix_secs(), later.as_unix_secs());
    }

    mod registry_invariant {
        use super::*;
        use proptest::prelude::*;

        /// Scripted register/unregister step over a small user population.
        #[derive(Debug, Clone)]
        enum Step {
            Register { user: u8 },
            Unregister { user: u8, slot: usize },
        }

        fn step_strategy() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0u8..4).prop_map(|user| Step::Register { user }),
                ((0u8..4), any::<usize>())
                    .prop_map(|(user, slot)| Step::Unregister { user, slot }),
            ]
        }

        proptest! {
            // Property: after any sequence of register/unregister calls,
            // no identity key maps to an empty set.
            #[test]
            fn no_sequence_leaves_an_empty_set(steps in proptest::collection::vec(step_strategy(), 1..64)) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .build()
                    .expect("test runtime");
                runtime.block_on(async move {
                    let registry = ConnectionRegistry::new();
                    let mut live: Vec<Vec<Arc<Connection>>> = vec![Vec::new(); 4];

                    for step in steps {
                        match step {
                            Step::Register { user } => {
                                let conn = connection(&format!("user-{}", user));
                                live[user as usize].push(conn.clone());
                                registry.register(conn).await;
                            }
                            Step::Unregister { user, slot } => {
                                let pool = &mut live[user as usize];
                                if pool.is_empty() {
                                    continue;
                                }
                                let conn = pool.remove(slot % pool.len());
                                registry
                                    .unregister(conn.user_id(), conn.id())
                                    .await;
                            }
                        }
                        assert!(registry.no_empty_sets().await);
                    }

                    let expected: usize = live.iter().map(Vec::len).sum();
                    assert_eq!(registry.stats().await.total_connections, expected);
                });
            }
        }
    }
}
