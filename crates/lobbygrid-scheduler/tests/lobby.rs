//! Lobby facade driven end to end against the in-memory control plane.

use std::sync::Arc;

use tokio::sync::watch;

use lobbygrid_control::MemoryControlPlane;
use lobbygrid_core::GameType;
use lobbygrid_core::labels::{self, labels};
use lobbygrid_pool::{PoolConfig, ResourcePool};
use lobbygrid_proxy::RoutingTable;
use lobbygrid_scheduler::{
    ChannelNotifier, Lobby, Notice, Orchestrator, OrchestratorConfig, Recipient,
};

fn lobby(cp: Arc<MemoryControlPlane>) -> (Lobby, ChannelRx, watch::Sender<bool>) {
    let pool = Arc::new(ResourcePool::new(cp.clone(), PoolConfig::default()));
    let (shutdown, rx) = watch::channel(false);
    let orchestrator = Arc::new(Orchestrator::new(
        cp,
        pool,
        RoutingTable::new(),
        OrchestratorConfig::default(),
        rx,
    ));
    let (notifier, notices) = ChannelNotifier::new();
    (Lobby::new(orchestrator, Arc::new(notifier)), notices, shutdown)
}

type ChannelRx = tokio::sync::mpsc::UnboundedReceiver<(Recipient, Notice)>;

#[tokio::test]
async fn ready_world_becomes_a_joinable_game() {
    let cp = Arc::new(MemoryControlPlane::new().with_auto_ready());
    cp.insert_volume(
        "world-1",
        labels([(labels::PURPOSE, labels::PURPOSE_WORLD), (labels::STAGE, "ready")]),
        1,
    );
    let (lobby, mut notices, _shutdown) = lobby(cp.clone());
    lobby.orchestrator().pool().reconcile(1).await.unwrap();

    lobby.request_create(GameType::BlockShuffle, "steve").await.unwrap();

    let steve = Recipient::Player("steve".into());
    assert_eq!(
        notices.recv().await.unwrap(),
        (steve.clone(), Notice::Creating { game: GameType::BlockShuffle })
    );
    let (to, ready) = notices.recv().await.unwrap();
    assert_eq!(to, steve);
    let Notice::Ready { id, endpoint, .. } = ready else {
        panic!("expected Ready, got {ready:?}");
    };
    let (to, announced) = notices.recv().await.unwrap();
    assert_eq!(to, Recipient::Lobby);
    assert_eq!(announced, Notice::Announced { id: id.clone(), game: GameType::BlockShuffle });

    assert!(lobby.list_joinable().contains(&id));
    assert_eq!(lobby.resolve(&id), Some(endpoint));
    assert_eq!(lobby.instance(&id).unwrap().resource_id, "world-1");
}

#[tokio::test]
async fn failed_creation_sends_exactly_one_failure() {
    let cp = Arc::new(MemoryControlPlane::new());
    cp.set_unavailable(true);
    let (lobby, mut notices, _shutdown) = lobby(cp.clone());

    lobby.request_create(GameType::HunterVsSpeedrunner, "alex").await.unwrap();
    drop(lobby);

    let mut received = Vec::new();
    while let Some(n) = notices.recv().await {
        received.push(n);
    }
    assert_eq!(received.len(), 2, "{received:?}");
    assert!(matches!(received[0].1, Notice::Creating { .. }));
    let Notice::Failed { reason, .. } = &received[1].1 else {
        panic!("expected Failed, got {:?}", received[1]);
    };
    assert!(reason.contains("unavailable"), "{reason}");
}

#[tokio::test]
async fn deleted_game_stops_resolving() {
    let cp = Arc::new(MemoryControlPlane::new().with_auto_ready());
    let (lobby, _notices, _shutdown) = lobby(cp.clone());

    lobby.request_create(GameType::BlockShuffle, "steve").await.unwrap();
    let id = lobby.list_joinable().into_iter().next().unwrap();

    lobby.delete(&id).await.unwrap();
    assert_eq!(lobby.resolve(&id), None);
    assert!(lobby.instances().is_empty());
    assert!(lobby.delete(&id).await.is_err());
}
