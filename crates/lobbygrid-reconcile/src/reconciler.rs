//! Reconciler — compares desired and observed state every tick.
//!
//! Nothing here is remembered between ticks. Each pass lists game units
//! and world volumes from the control plane and decides from scratch, so a
//! restarted daemon picks up exactly where the old one left off.
//!
//! A failure on one item is logged and the tick moves on; the next tick
//! retries it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use lobbygrid_control::{ControlError, ControlPlane, ExecutionUnit, LabelSelector};
use lobbygrid_core::{labels, shutdown};
use lobbygrid_core::{
    BackingResource, GameType, Instance, InstanceState, LobbyConfig, ResourceId, Stage,
    epoch_millis,
};
use lobbygrid_pool::{PoolError, PoolReport, ResourcePool, advance_stage};
use lobbygrid_proxy::RoutingTable;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    /// Finished worlds older than this are deleted.
    pub retention: Duration,
    /// Claimed worlds with no game unit after this long are abandoned.
    pub creation_timeout: Duration,
}

impl ReconcilerConfig {
    pub fn from_config(config: &LobbyConfig) -> Self {
        Self {
            interval: config.reconcile.interval.get(),
            retention: config.reconcile.retention.get(),
            creation_timeout: config.lifecycle.creation_timeout.get(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from_config(&LobbyConfig::default())
    }
}

/// What one tick changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Games whose world moved to `finished`.
    pub games_finished: usize,
    /// Game units deleted (finished or released).
    pub units_deleted: usize,
    pub routes_pruned: usize,
    /// Routes re-published for live games the table did not know.
    pub routes_restored: usize,
    /// Claimed worlds with no game that were finished.
    pub orphans_retired: usize,
    /// Expired worlds deleted.
    pub volumes_deleted: usize,
    /// Live game units seen this tick.
    pub live_games: usize,
    pub pool: Option<PoolReport>,
    /// Items that failed and were skipped.
    pub errors: usize,
}

impl TickReport {
    pub fn changed(&self) -> bool {
        self.games_finished
            + self.units_deleted
            + self.routes_pruned
            + self.routes_restored
            + self.orphans_retired
            + self.volumes_deleted
            > 0
            || self.pool.as_ref().is_some_and(PoolReport::changed)
    }
}

pub struct Reconciler {
    control: Arc<dyn ControlPlane>,
    pool: Arc<ResourcePool>,
    routes: RoutingTable,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        pool: Arc<ResourcePool>,
        routes: RoutingTable,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            control,
            pool,
            routes,
            config,
        }
    }

    /// Tick until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            "reconciler started"
        );

        loop {
            let report = self.tick().await;
            if report.errors > 0 {
                warn!(errors = report.errors, "reconcile tick finished with errors");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown::signalled(&mut shutdown) => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass.
    pub async fn tick(&self) -> TickReport {
        let now = epoch_millis();
        let mut report = TickReport::default();

        let units = match self
            .control
            .list_execution_units(&LabelSelector::new().with(labels::PURPOSE, labels::PURPOSE_GAME))
            .await
        {
            Ok(units) => units,
            Err(e) => {
                error!(error = %e, "failed to list game units, skipping tick");
                report.errors += 1;
                return report;
            }
        };
        let volumes = match self
            .control
            .list_volume_resources(&LabelSelector::new().with(labels::PURPOSE, labels::PURPOSE_WORLD))
            .await
        {
            Ok(volumes) => volumes,
            Err(e) => {
                error!(error = %e, "failed to list world volumes, skipping tick");
                report.errors += 1;
                return report;
            }
        };
        let worlds: HashMap<ResourceId, BackingResource> = volumes
            .iter()
            .filter_map(|v| BackingResource::from_labels(&v.id, v.created_at, &v.labels))
            .map(|w| (w.id.clone(), w))
            .collect();

        // Volumes some game unit (live or not) still points at.
        let attached: HashSet<ResourceId> = units.iter().map(|u| u.volume.clone()).collect();

        // Finished games.
        let mut live = Vec::new();
        for unit in units {
            if unit.phase.is_terminal() {
                self.finish_game(&unit, now, &mut report).await;
            } else {
                live.push(unit);
            }
        }

        // Games whose world was released are torn down instead of served.
        let mut serving = Vec::new();
        for unit in live {
            if worlds.get(&unit.volume).is_some_and(|w| w.released) {
                match self.control.delete_execution_unit(&unit.id).await {
                    Ok(()) => {
                        info!(unit = %unit.id, volume = %unit.volume, "released game unit deleted");
                        report.units_deleted += 1;
                        if let Some(id) = unit.label(labels::INSTANCE_ID) {
                            self.routes.remove(id);
                        }
                    }
                    Err(e) => {
                        warn!(unit = %unit.id, error = %e, "failed to delete released game unit");
                        report.errors += 1;
                        serving.push(unit);
                    }
                }
            } else {
                serving.push(unit);
            }
        }
        report.live_games = serving.len();

        self.sync_routes(&serving, &worlds, &mut report).await;
        self.sweep_worlds(&worlds, &attached, now, &mut report).await;

        match self.pool.reconcile(serving.len()).await {
            Ok(pool) => report.pool = Some(pool),
            Err(e) => {
                warn!(error = %e, "pool reconcile failed");
                report.errors += 1;
            }
        }

        if report.changed() {
            info!(
                finished = report.games_finished,
                units_deleted = report.units_deleted,
                routes_pruned = report.routes_pruned,
                routes_restored = report.routes_restored,
                orphans = report.orphans_retired,
                volumes_deleted = report.volumes_deleted,
                live_games = report.live_games,
                "reconcile tick"
            );
        } else {
            debug!(live_games = report.live_games, "reconcile tick, nothing to do");
        }
        report
    }

    /// Move a terminal game's world to `finished`, then delete its unit.
    async fn finish_game(&self, unit: &ExecutionUnit, now: u64, report: &mut TickReport) {
        match self.finish_world(&unit.volume, now).await {
            Ok(true) => {
                info!(
                    instance_id = unit.label(labels::INSTANCE_ID).unwrap_or("-"),
                    unit = %unit.id,
                    volume = %unit.volume,
                    phase = ?unit.phase,
                    "game finished"
                );
                report.games_finished += 1;
            }
            Ok(false) => {}
            Err(e) => {
                // Keep the unit; it is the only record that this world
                // still has to be finished.
                warn!(unit = %unit.id, volume = %unit.volume, error = %e, "failed to finish world");
                report.errors += 1;
                return;
            }
        }

        match self.control.delete_execution_unit(&unit.id).await {
            Ok(()) => report.units_deleted += 1,
            Err(e) => {
                warn!(unit = %unit.id, error = %e, "failed to delete finished game unit");
                report.errors += 1;
            }
        }
    }

    /// Stamp the finish time and move `game` → `finished`. Returns whether
    /// this call did the transition; a world that is already finished or
    /// gone is not an error, and keeps the finish time it already has.
    async fn finish_world(&self, volume: &str, now: u64) -> Result<bool, PoolError> {
        let Some(current) = self.control.read_volume_resource(volume).await? else {
            return Ok(false);
        };
        match current.labels.get(labels::STAGE).and_then(|s| Stage::from_label_value(s)) {
            Some(Stage::InUse) => {}
            Some(Stage::Finished) => return Ok(false),
            Some(actual) => {
                return Err(PoolError::UnexpectedStage {
                    id: volume.to_string(),
                    expected: Stage::InUse,
                    actual,
                });
            }
            None => return Err(PoolError::Unlabelled(volume.to_string())),
        }

        let stamp = self
            .control
            .patch_resource_label(volume, labels::FINISHED_AT, &now.to_string())
            .await;
        match stamp {
            Ok(()) => {}
            Err(ControlError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        match advance_stage(self.control.as_ref(), volume, Stage::InUse, Stage::Finished).await {
            Ok(()) => Ok(true),
            Err(PoolError::UnexpectedStage {
                actual: Stage::Finished,
                ..
            }) => Ok(false),
            Err(PoolError::Control(ControlError::NotFound(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Drop routes to games that are gone; restore routes to live games
    /// the table lost (e.g. after a restart).
    async fn sync_routes(
        &self,
        serving: &[ExecutionUnit],
        worlds: &HashMap<ResourceId, BackingResource>,
        report: &mut TickReport,
    ) {
        let serving_ids: HashSet<&str> = serving.iter().map(|u| u.id.as_str()).collect();

        for route in self.routes.routes() {
            let world_finished = worlds
                .get(&route.resource_id)
                .is_some_and(|w| w.stage == Stage::Finished);
            let unit_gone = if serving_ids.contains(route.unit_id.as_str()) {
                false
            } else {
                // The unit may have been created after this tick's listing.
                match self.control.read_execution_unit(&route.unit_id).await {
                    Ok(unit) => unit.is_none_or(|u| u.phase.is_terminal()),
                    Err(e) => {
                        warn!(instance_id = %route.id, error = %e, "failed to check game unit");
                        report.errors += 1;
                        false
                    }
                }
            };
            if world_finished || unit_gone {
                self.routes.remove(&route.id);
                info!(instance_id = %route.id, "route pruned");
                report.routes_pruned += 1;
            }
        }

        for unit in serving {
            let Some(endpoint) = unit.ready_endpoint() else {
                continue;
            };
            let Some(id) = unit.label(labels::INSTANCE_ID) else {
                continue;
            };
            if self.routes.get(id).is_some() {
                continue;
            }
            let Some(game) = unit.label(labels::GAME_TYPE).and_then(|g| g.parse::<GameType>().ok())
            else {
                warn!(unit = %unit.id, "live game unit has no known game type, not routing");
                continue;
            };
            self.routes.publish(Instance {
                id: id.to_string(),
                game,
                resource_id: unit.volume.clone(),
                unit_id: unit.id.clone(),
                endpoint: Some(endpoint),
                state: InstanceState::Running,
            });
            info!(instance_id = %id, %endpoint, "route restored");
            report.routes_restored += 1;
        }
    }

    /// Retire claimed worlds nobody is playing on and delete expired ones.
    async fn sweep_worlds(
        &self,
        worlds: &HashMap<ResourceId, BackingResource>,
        attached: &HashSet<ResourceId>,
        now: u64,
        report: &mut TickReport,
    ) {
        let timeout_ms = self.config.creation_timeout.as_millis() as u64;
        let retention_ms = self.config.retention.as_millis() as u64;

        for world in worlds.values() {
            match world.stage {
                Stage::InUse if !attached.contains(&world.id) => {
                    let claimed = world.claimed_at.unwrap_or(world.created_at);
                    let abandoned = claimed.saturating_add(timeout_ms) <= now;
                    if !world.released && !abandoned {
                        continue;
                    }
                    match self.finish_world(&world.id, now).await {
                        Ok(true) => {
                            info!(volume = %world.id, released = world.released, "orphaned world retired");
                            report.orphans_retired += 1;
                        }
                        Ok(false) => {}
                        Err(e) => {
                            warn!(volume = %world.id, error = %e, "failed to retire orphaned world");
                            report.errors += 1;
                        }
                    }
                }
                Stage::Finished => {
                    let Some(finished_at) = world.finished_at else {
                        continue;
                    };
                    if finished_at.saturating_add(retention_ms) >= now {
                        continue;
                    }
                    match self.control.delete_volume_resource(&world.id).await {
                        Ok(()) => {
                            info!(volume = %world.id, finished_at, "expired world deleted");
                            report.volumes_deleted += 1;
                        }
                        Err(e) => {
                            warn!(volume = %world.id, error = %e, "failed to delete expired world");
                            report.errors += 1;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
