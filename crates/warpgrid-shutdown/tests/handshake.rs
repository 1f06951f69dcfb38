//! End-to-end shutdown handshake over the in-memory and redb backends.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use warpgrid_kv::{KvStore, MemoryKv, RedbKv};
use warpgrid_shutdown::*;

#[derive(Default)]
struct CountingAudit {
    events: Mutex<Vec<(&'static str, usize)>>,
}

impl ShutdownAudit for CountingAudit {
    fn save_shutdown_events<'a>(&'a self, instances: &'a [InstanceDetails]) -> AuditFuture<'a> {
        Box::pin(async move {
            self.events.lock().unwrap().push(("shutdown", instances.len()));
            Ok(())
        })
    }

    fn save_shutdown_confirmation_events<'a>(
        &'a self,
        instances: &'a [InstanceDetails],
    ) -> AuditFuture<'a> {
        Box::pin(async move {
            self.events
                .lock()
                .unwrap()
                .push(("confirmation", instances.len()));
            Ok(())
        })
    }
}

fn manager(store: Arc<dyn KvStore>, audit: Arc<CountingAudit>) -> ShutdownManager {
    ShutdownManager::new(ShutdownManagerOptions {
        store,
        shutdown_ttl: Duration::from_secs(600),
        audit,
    })
}

fn details(ids: &[&str]) -> Vec<InstanceDetails> {
    ids.iter().map(|id| InstanceDetails::new(*id)).collect()
}

/// The orchestrator asks, the instance confirms, the orchestrator observes.
async fn full_handshake(store: Arc<dyn KvStore>) {
    let audit = Arc::new(CountingAudit::default());
    let orchestrator = manager(store.clone(), audit.clone());
    let instance_side = manager(store, audit.clone());

    let directory = StaticDirectory::new(vec![
        InstanceDetails::new("i-1").with_group("workers"),
        InstanceDetails::new("i-2").with_group("workers"),
        InstanceDetails::new("i-3").with_group("workers"),
    ]);
    let fleet = directory.list_instances().await.unwrap();
    let ids: Vec<String> = fleet.iter().map(|i| i.instance_id.clone()).collect();

    // Nothing written yet.
    assert_eq!(
        orchestrator.get_shutdown_statuses(&ids).await,
        vec![false, false, false]
    );

    // i-3 is protected; the orchestrator leaves it alone.
    orchestrator
        .set_scale_down_protected("i-3", Duration::from_secs(60))
        .await
        .unwrap();
    let protected = orchestrator.are_scale_down_protected(&ids).await;
    assert_eq!(protected, vec![false, false, true]);

    let victims: Vec<InstanceDetails> = fleet
        .iter()
        .zip(&protected)
        .filter(|(_, protected)| !**protected)
        .map(|(instance, _)| instance.clone())
        .collect();
    assert!(orchestrator.set_shutdown_status(&victims).await);

    // Each victim sees the request and confirms.
    for victim in &victims {
        assert!(instance_side.get_shutdown_status(&victim.instance_id).await.unwrap());
        assert!(
            instance_side
                .set_shutdown_confirmation(std::slice::from_ref(victim))
                .await
        );
    }

    assert_eq!(
        orchestrator.get_shutdown_statuses(&ids).await,
        vec![true, true, false]
    );
    let confirmations = orchestrator.get_shutdown_confirmations(&ids).await;
    assert_eq!(confirmations.len(), 3);
    assert!(confirmations[0].is_some());
    assert!(confirmations[1].is_some());
    assert_eq!(confirmations[2], None);

    assert_eq!(
        *audit.events.lock().unwrap(),
        vec![("shutdown", 2), ("confirmation", 1), ("confirmation", 1)]
    );
}

#[tokio::test]
async fn handshake_over_memory_store() {
    full_handshake(Arc::new(MemoryKv::new())).await;
}

#[tokio::test]
async fn handshake_over_redb_store() {
    full_handshake(Arc::new(RedbKv::open_in_memory().unwrap())).await;
}

#[tokio::test]
async fn handshake_survives_redb_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shutdown.redb");

    {
        let store: Arc<dyn KvStore> = Arc::new(RedbKv::open(&path).unwrap());
        let writer = manager(store, Arc::default());
        assert!(writer.set_shutdown_status(&details(&["i-1", "i-2"])).await);
    }

    let store: Arc<dyn KvStore> = Arc::new(RedbKv::open(&path).unwrap());
    let reader = manager(store, Arc::default());
    assert_eq!(
        reader.get_shutdown_statuses(&["i-1", "i-2", "i-3"]).await,
        vec![true, true, false]
    );
}

#[tokio::test(start_paused = true)]
async fn protection_scenario_expires() {
    let kv = MemoryKv::new();
    let manager = manager(Arc::new(kv.clone()), Arc::default());

    manager
        .set_scale_down_protected("i-1", Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(manager.are_scale_down_protected(&["i-1"]).await, vec![true]);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(manager.are_scale_down_protected(&["i-1"]).await, vec![false]);
}

#[tokio::test(start_paused = true)]
async fn refreshed_status_outlives_original_ttl() {
    let kv = MemoryKv::new();
    let manager = manager(Arc::new(kv.clone()), Arc::default());

    manager.set_shutdown_status(&details(&["i-1"])).await;
    tokio::time::advance(Duration::from_secs(500)).await;
    manager.set_shutdown_status(&details(&["i-1"])).await;
    tokio::time::advance(Duration::from_secs(500)).await;

    assert_eq!(manager.get_shutdown_statuses(&["i-1"]).await, vec![true]);

    tokio::time::advance(Duration::from_secs(100)).await;
    assert_eq!(manager.get_shutdown_statuses(&["i-1"]).await, vec![false]);
}

#[tokio::test]
async fn overlapping_writers_last_write_wins() {
    let kv = MemoryKv::new();
    let a = manager(Arc::new(kv.clone()), Arc::default());
    let b = manager(Arc::new(kv.clone()), Arc::default());

    a.set_shutdown_confirmation_with(&details(&["i-1"]), "first").await;
    b.set_shutdown_confirmation_with(&details(&["i-1"]), "second").await;

    assert_eq!(
        a.get_shutdown_confirmations(&["i-1"]).await,
        vec![Some("second".to_string())]
    );
}
