//! Health and diagnostics service.
//!
//! Aggregates bus reachability, store reachability and registry size into
//! a point-in-time snapshot for orchestration-level health checks.
//! Read-only: never mutates core state beyond the throwaway probe
//! document it writes and deletes.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::adapters::websocket::{ConnectionRegistry, RegistryStats};
use crate::domain::foundation::Timestamp;
use crate::ports::{BusHealth, DocumentStore, EventBus};

/// Collection used for store round-trip probes.
const HEALTH_COLLECTION: &str = "health_probes";

/// Overall service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    /// Every dependency reachable.
    Healthy,
    /// One dependency down; realtime delivery degraded but serving.
    Degraded,
    /// Bus and store both unreachable.
    Unhealthy,
}

/// Health of one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn healthy(latency_ms: u64) -> Self {
        Self {
            healthy: true,
            latency_ms: Some(latency_ms),
            detail: None,
        }
    }

    fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            detail: Some(detail.into()),
        }
    }
}

/// Point-in-time health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: ServiceStatus,
    pub bus: ComponentHealth,
    pub store: ComponentHealth,
    pub connections: RegistryStats,
    pub checked_at: Timestamp,
}

/// Minimal liveness signal for tight polling intervals. No I/O.
#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub checked_at: Timestamp,
}

/// Computes health snapshots on demand.
pub struct HealthService {
    store: Arc<dyn DocumentStore>,
    bus: Arc<dyn EventBus>,
    registry: Arc<ConnectionRegistry>,
}

impl HealthService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        bus: Arc<dyn EventBus>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            store,
            bus,
            registry,
        }
    }

    /// Full status: bus probe, store round-trip, and registry counts.
    pub async fn check(&self) -> HealthSnapshot {
        let bus = self.check_bus().await;
        let store = self.check_store().await;
        let connections = self.registry.stats().await;

        let status = match (bus.healthy, store.healthy) {
            (true, true) => ServiceStatus::Healthy,
            (false, false) => ServiceStatus::Unhealthy,
            _ => ServiceStatus::Degraded,
        };

        HealthSnapshot {
            status,
            bus,
            store,
            connections,
            checked_at: Timestamp::now(),
        }
    }

    /// Fast liveness probe: the process is up and responding.
    pub fn liveness(&self) -> Liveness {
        Liveness {
            status: "ok",
            checked_at: Timestamp::now(),
        }
    }

    async fn check_bus(&self) -> ComponentHealth {
        let started = Instant::now();
        match self.bus.check_health().await {
            BusHealth::Healthy => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
            BusHealth::Unhealthy { details } => ComponentHealth::unhealthy(details),
        }
    }

    /// Round-trips a throwaway document: write, read, delete.
    async fn check_store(&self) -> ComponentHealth {
        let started = Instant::now();
        let probe_id = Uuid::new_v4().to_string();
        let probe = json!({ "probe": true, "at": Timestamp::now() });

        let result = async {
            self.store.create(HEALTH_COLLECTION, &probe_id, probe).await?;
            let read = self.store.find_by_id(HEALTH_COLLECTION, &probe_id).await?;
            self.store.delete(HEALTH_COLLECTION, &probe_id).await?;
            Ok::<bool, crate::ports::StoreError>(read.is_some())
        }
        .await;

        match result {
            Ok(true) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
            Ok(false) => ComponentHealth::unhealthy("probe document not readable after write"),
            Err(e) => ComponentHealth::unhealthy(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::store::InMemoryDocumentStore;

    async fn service() -> (HealthService, Arc<InMemoryEventBus>, Arc<InMemoryDocumentStore>) {
        let store = Arc::new(InMemoryDocumentStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let registry = Arc::new(ConnectionRegistry::new());
        (
            HealthService::new(store.clone(), bus.clone(), registry),
            bus,
            store,
        )
    }

    #[tokio::test]
    async fn healthy_when_all_dependencies_up() {
        let (health, _bus, _store) = service().await;

        let snapshot = health.check().await;

        assert_eq!(snapshot.status, ServiceStatus::Healthy);
        assert!(snapshot.bus.healthy);
        assert!(snapshot.store.healthy);
        assert_eq!(snapshot.connections.total_connections, 0);
    }

    #[tokio::test]
    async fn degraded_when_bus_is_down() {
        let (health, bus, _store) = service().await;
        bus.close().await.unwrap();

        let snapshot = health.check().await;

        assert_eq!(snapshot.status, ServiceStatus::Degraded);
        assert!(!snapshot.bus.healthy);
        assert!(snapshot.store.healthy);
    }

    #[tokio::test]
    async fn probe_document_is_cleaned_up() {
        let (health, _bus, store) = service().await;

        health.check().await;

        assert_eq!(store.document_count(HEALTH_COLLECTION).await, 0);
    }

    #[tokio::test]
    async fn liveness_needs_no_dependencies() {
        let (health, bus, _store) = service().await;
        bus.close().await.unwrap();

        let liveness = health.liveness();
        assert_eq!(liveness.status, "ok");
    }

    #[tokio::test]
    async fn snapshot_serializes_for_the_http_surface() {
        let (health, _bus, _store) = service().await;

        let snapshot = health.check().await;
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["status"], "healthy");
        assert!(json["connections"]["total_connections"].is_number());
    }
}
