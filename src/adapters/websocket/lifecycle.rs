//! Connection lifecycle management.
//!
//! Binds authentication outcome to registry state and performs periodic
//! hygiene:
//!
//! - on authenticate: register the connection, mark the user online, stamp
//!   token expiry and validation metadata on the connection
//! - on disconnect: unregister; flip the user offline only when their last
//!   connection went away (multi-device users must not flap)
//! - periodic sweep: force-close connections whose token expired
//! - periodic re-validation: re-verify long-lived connections against the
//!   issuing authority to catch revocation, closing with a reason distinct
//!   from expiry
//! - administrative force-disconnects, per user and server-wide
//!
//! Presence calls are best-effort: a presence backend hiccup is logged and
//! never fails a connection.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;

use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    close_codes, AuthError, ClientTransport, PresenceTracker, TokenValidator,
};

use super::registry::{Connection, ConnectionRegistry};

/// Timing knobs for the periodic sweeps.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How often the sweep task runs.
    pub sweep_interval: Duration,
    /// How long a connection may go without an authority re-check.
    pub revalidate_after: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(300),
            revalidate_after: Duration::from_secs(600),
        }
    }
}

/// Lifecycle manager for this process's connections.
pub struct ConnectionLifecycle {
    registry: Arc<ConnectionRegistry>,
    validator: Arc<dyn TokenValidator>,
    /// Authority-backed validator used by re-validation; may be the same
    /// implementation as `validator` when no introspection is configured.
    authority: Arc<dyn TokenValidator>,
    presence: Arc<dyn PresenceTracker>,
    config: LifecycleConfig,
}

impl ConnectionLifecycle {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        validator: Arc<dyn TokenValidator>,
        authority: Arc<dyn TokenValidator>,
        presence: Arc<dyn PresenceTracker>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            registry,
            validator,
            authority,
            presence,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Validates the handshake token and registers the connection.
    ///
    /// On success the user is marked online (best-effort) and the returned
    /// connection carries the token expiry used by the sweeps.
    pub async fn authenticate(
        &self,
        token: &str,
        transport: Arc<dyn ClientTransport>,
    ) -> Result<Arc<Connection>, AuthError> {
        let user = self.validator.validate(token).await?;

        let connection = Arc::new(Connection::new(
            user.id.clone(),
            user.display_name_or_id().to_string(),
            transport,
            SecretString::new(token.to_string()),
            user.expires_at,
        ));

        self.registry.register(connection.clone()).await;

        if let Err(e) = self.presence.set_online(&user.id).await {
            tracing::warn!(user_id = %user.id, error = %e, "Presence set_online failed");
        }

        tracing::info!(
            user_id = %user.id,
            connection_id = %connection.id(),
            "Connection registered"
        );
        Ok(connection)
    }

    /// Unregisters a closed connection and updates presence.
    ///
    /// Safe to call for any close path: socket close, forced close, sweep.
    pub async fn handle_disconnect(&self, connection: &Connection) {
        let remaining = self
            .registry
            .unregister(connection.user_id(), connection.id())
            .await;

        tracing::info!(
            user_id = %connection.user_id(),
            connection_id = %connection.id(),
            remaining,
            "Connection unregistered"
        );

        if remaining == 0 {
            if let Err(e) = self.presence.set_offline(connection.user_id()).await {
                tracing::warn!(
                    user_id = %connection.user_id(),
                    error = %e,
                    "Presence set_offline failed"
                );
            }
        }
    }

    /// Closes and unregisters one connection with the given policy code.
    async fn force_close(&self, connection: &Connection, code: u16, reason: &str) {
        if let Err(e) = connection.transport().close(code, reason).await {
            tracing::debug!(
                connection_id = %connection.id(),
                error = %e,
                "Close failed (peer already gone)"
            );
        }
        self.handle_disconnect(connection).await;
    }

    /// Force-closes every connection whose token expiry has passed.
    /// Returns the number of connections closed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Timestamp::now();
        let mut closed = 0;
        for connection in self.registry.all_connections().await {
            if connection.token_expires_at().is_after(&now) {
                continue;
            }
            tracing::info!(
                user_id = %connection.user_id(),
                connection_id = %connection.id(),
                "Closing connection with expired token"
            );
            self.force_close(&connection, close_codes::TOKEN_EXPIRED, "token expired")
                .await;
            closed += 1;
        }
        closed
    }

    /// Re-verifies long-lived connections against the issuing authority.
    ///
    /// Revoked or otherwise rejected tokens close the connection with a
    /// reason distinct from expiry. If the authority is unreachable the
    /// connection is left alone rather than kicking users during an
    /// authority outage; the next sweep retries.
    pub async fn revalidate_active(&self) -> usize {
        let now = Timestamp::now();
        let cutoff = self.config.revalidate_after.as_secs();
        let mut closed = 0;

        for connection in self.registry.all_connections().await {
            let age = now
                .as_unix_secs()
                .saturating_sub(connection.last_validated().as_unix_secs());
            if age < cutoff {
                continue;
            }

            match self
                .authority
                .validate(connection.token().expose_secret())
                .await
            {
                Ok(_) => connection.touch_validated(now),
                Err(AuthError::ServiceUnavailable(e)) => {
                    tracing::warn!(
                        connection_id = %connection.id(),
                        error = %e,
                        "Authority unreachable, deferring re-validation"
                    );
                }
                Err(e) => {
                    tracing::info!(
                        user_id = %connection.user_id(),
                        connection_id = %connection.id(),
                        error = %e,
                        "Closing connection with rejected token"
                    );
                    self.force_close(&connection, close_codes::TOKEN_REVOKED, "token revoked")
                        .await;
                    closed += 1;
                }
            }
        }
        closed
    }

    /// Closes every connection of one user. Returns the count closed.
    pub async fn force_disconnect_user(&self, user_id: &UserId, reason: &str) -> usize {
        let connections = self.registry.connections_for(user_id).await;
        let count = connections.len();
        for connection in connections {
            self.force_close(&connection, close_codes::FORCED, reason).await;
        }
        count
    }

    /// Closes every connection on this instance. Returns the count closed.
    pub async fn force_disconnect_all(&self, reason: &str) -> usize {
        let connections = self.registry.all_connections().await;
        let count = connections.len();
        for connection in connections {
            self.force_close(&connection, close_codes::SHUTDOWN, reason).await;
        }
        count
    }

    /// Spawns the periodic hygiene task: expired-token sweep plus
    /// re-validation, every `sweep_interval`.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let lifecycle = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(lifecycle.config.sweep_interval);
            // The first tick fires immediately; skip it so a fresh boot
            // doesn't sweep before anyone connects.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let expired = lifecycle.sweep_expired().await;
                let revoked = lifecycle.revalidate_active().await;
                if expired > 0 || revoked > 0 {
                    tracing::info!(expired, revoked, "Connection sweep complete");
                }
            }
        })
    }
}
