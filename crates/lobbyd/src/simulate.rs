//! Simulated cluster for `lobbyd run --simulate`.
//!
//! Plays the part of the nodes behind the in-memory control plane:
//! pre-generation units finish after a while (suspended time does not
//! count), game units come up and end after a fixed game length.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use lobbygrid_control::{ControlPlane, ExecutionUnit, MemoryControlPlane, UnitEvent, UnitKind};
use lobbygrid_core::shutdown;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Running time a world needs to pre-generate.
    pub pre_gen: Duration,
    /// Time from submission until a game accepts players.
    pub game_start: Duration,
    pub game_length: Duration,
    /// Granularity of pre-generation progress.
    pub step: Duration,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            pre_gen: Duration::from_secs(20),
            game_start: Duration::from_secs(3),
            game_length: Duration::from_secs(300),
            step: Duration::from_secs(1),
        }
    }
}

pub struct Simulator {
    cluster: Arc<MemoryControlPlane>,
    config: SimulatorConfig,
}

impl Simulator {
    pub fn new(cluster: Arc<MemoryControlPlane>, config: SimulatorConfig) -> Self {
        Self { cluster, config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.cluster.watch_execution_units();
        info!(
            pre_gen_secs = self.config.pre_gen.as_secs(),
            game_secs = self.config.game_length.as_secs(),
            "cluster simulator started"
        );

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(UnitEvent::Added(unit)) => self.drive(unit),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "simulator missed unit events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown::signalled(&mut shutdown) => {
                    info!("cluster simulator shutting down");
                    break;
                }
            }
        }
    }

    fn drive(&self, unit: ExecutionUnit) {
        let cluster = Arc::clone(&self.cluster);
        let config = self.config.clone();
        tokio::spawn(async move {
            match unit.kind {
                UnitKind::PreGeneration => {
                    let mut remaining = config.pre_gen;
                    while !remaining.is_zero() {
                        tokio::time::sleep(config.step).await;
                        match cluster.unit(&unit.id) {
                            None => return,
                            Some(u) if u.suspended => {}
                            Some(_) => remaining = remaining.saturating_sub(config.step),
                        }
                    }
                    if cluster.complete(&unit.id) {
                        debug!(unit = %unit.id, volume = %unit.volume, "simulated pre-generation finished");
                    }
                }
                UnitKind::Game => {
                    tokio::time::sleep(config.game_start).await;
                    if !cluster.mark_ready_auto(&unit.id) {
                        return;
                    }
                    debug!(unit = %unit.id, "simulated game server ready");
                    tokio::time::sleep(config.game_length).await;
                    if cluster.complete(&unit.id) {
                        debug!(unit = %unit.id, "simulated game ended");
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbygrid_control::{UnitPhase, UnitSpec, VolumeSpec};
    use lobbygrid_core::labels::{self, labels};

    async fn submit(cluster: &MemoryControlPlane, kind: UnitKind) -> String {
        let volume = cluster
            .create_volume_resource(
                VolumeSpec {
                    name_prefix: "world".into(),
                    storage_class: "local-path".into(),
                    size: "5Gi".into(),
                },
                labels([(labels::PURPOSE, labels::PURPOSE_WORLD)]),
            )
            .await
            .unwrap();
        cluster
            .create_execution_unit(
                UnitSpec {
                    kind,
                    name_prefix: "unit".into(),
                    volume,
                    payloads: vec![],
                    port: 25565,
                    auto_stop: kind == UnitKind::Game,
                },
                labels::Labels::new(),
            )
            .await
            .unwrap()
    }

    fn start(cluster: &Arc<MemoryControlPlane>) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        let sim = Simulator::new(
            Arc::clone(cluster),
            SimulatorConfig {
                pre_gen: Duration::from_secs(10),
                game_start: Duration::from_secs(2),
                game_length: Duration::from_secs(60),
                step: Duration::from_secs(1),
            },
        );
        tokio::spawn(async move { sim.run(rx).await });
        tx
    }

    #[tokio::test(start_paused = true)]
    async fn pre_generation_finishes() {
        let cluster = Arc::new(MemoryControlPlane::new());
        let _tx = start(&cluster);
        tokio::task::yield_now().await;

        let unit = submit(&cluster, UnitKind::PreGeneration).await;
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(cluster.unit(&unit).unwrap().phase, UnitPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_time_does_not_count() {
        let cluster = Arc::new(MemoryControlPlane::new());
        let _tx = start(&cluster);
        tokio::task::yield_now().await;

        let unit = submit(&cluster, UnitKind::PreGeneration).await;
        cluster.set_execution_unit_suspended(&unit, true).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cluster.unit(&unit).unwrap().phase, UnitPhase::Pending);

        cluster.set_execution_unit_suspended(&unit, false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(cluster.unit(&unit).unwrap().phase, UnitPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn games_start_and_end() {
        let cluster = Arc::new(MemoryControlPlane::new());
        let _tx = start(&cluster);
        tokio::task::yield_now().await;

        let unit = submit(&cluster, UnitKind::Game).await;
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(cluster.unit(&unit).unwrap().ready_endpoint().is_some());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(cluster.unit(&unit).unwrap().phase, UnitPhase::Succeeded);
    }
}
