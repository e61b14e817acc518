//! Lifecycle orchestrator — creates and deletes game instances.
//!
//! A creation walks through:
//!
//! 1. claim a ready world from the pool, or provision a fresh one
//! 2. reserve an instance id no live game uses
//! 3. pause pre-generation so the game gets the capacity
//! 4. submit the game unit, labelled with the id and world
//! 5. wait (bounded by `creation_timeout`, cancelled by shutdown) for the
//!    unit to report an endpoint
//! 6. publish the instance to the routing table
//!
//! Any failure deletes the unit and marks the world `released`; the
//! reconciler retires it on its next tick.

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use lobbygrid_control::{
    ControlError, ControlPlane, ExecutionUnit, LabelSelector, UnitEvent, UnitKind, UnitPhase,
    UnitSpec,
};
use lobbygrid_core::labels::{self, labels};
use lobbygrid_core::shutdown;
use lobbygrid_core::{
    GameType, Instance, InstanceId, InstanceState, LobbyConfig, ResourceId, UnitId,
};
use lobbygrid_pool::{IdAllocator, PoolError, ResourcePool};
use lobbygrid_proxy::RoutingTable;

use crate::error::{CreationCause, SchedulerError, SchedulerResult};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Digits per instance id.
    pub id_width: u32,
    pub creation_timeout: Duration,
    /// Plugin loaded by every game unit next to the game payload.
    pub game_plugin_url: String,
    pub port: u16,
}

impl OrchestratorConfig {
    pub fn from_config(config: &LobbyConfig) -> Self {
        Self {
            id_width: config.ids.width,
            creation_timeout: config.lifecycle.creation_timeout.get(),
            game_plugin_url: config.cluster.game_plugin_url.clone(),
            port: config.cluster.game_port,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&LobbyConfig::default())
    }
}

/// Holds an instance id until dropped so concurrent creations never pick
/// the same one before their unit is visible in the control plane.
struct IdReservation {
    id: InstanceId,
    reserved: Arc<Mutex<HashSet<InstanceId>>>,
}

impl Drop for IdReservation {
    fn drop(&mut self) {
        self.reserved.lock().expect("reserved ids lock").remove(&self.id);
    }
}

pub struct Orchestrator {
    control: Arc<dyn ControlPlane>,
    pool: Arc<ResourcePool>,
    routes: RoutingTable,
    ids: IdAllocator,
    reserved: Arc<Mutex<HashSet<InstanceId>>>,
    config: OrchestratorConfig,
    shutdown: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        pool: Arc<ResourcePool>,
        routes: RoutingTable,
        config: OrchestratorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            control,
            pool,
            routes,
            ids: IdAllocator::new(config.id_width),
            reserved: Arc::new(Mutex::new(HashSet::new())),
            config,
            shutdown,
        }
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    pub fn pool(&self) -> &Arc<ResourcePool> {
        &self.pool
    }

    /// Create a game and wait until players can join it.
    pub async fn create_instance(&self, game: GameType, requester: &str) -> SchedulerResult<Instance> {
        let fail = |cause| SchedulerError::InstanceCreationFailed { game, cause };
        let _creation = self.pool.begin_creation();
        info!(%game, %requester, "creating game instance");

        let resource = match self.pool.take_ready().await {
            Some(id) => id,
            None => {
                debug!(%game, "no pre-generated world, provisioning a fresh one");
                retry_once(
                    "provision world",
                    |e: &PoolError| matches!(e, PoolError::Control(c) if c.is_transient()),
                    || self.pool.provision_claimed(),
                )
                .await
                .map_err(|e| fail(CreationCause::from_pool(e)))?
            }
        };

        let reservation = match self.reserve_id().await {
            Ok(r) => r,
            Err(cause) => {
                self.release(&resource).await;
                return Err(fail(cause));
            }
        };
        let id = reservation.id.clone();

        self.pool.pause_generation().await;

        match self.launch(game, &id, &resource).await {
            Ok(instance) => {
                self.routes.publish(instance.clone());
                info!(
                    instance_id = %instance.id,
                    %game,
                    volume = %resource,
                    endpoint = ?instance.endpoint,
                    "game instance ready"
                );
                Ok(instance)
            }
            Err((unit, cause)) => {
                warn!(instance_id = %id, %game, volume = %resource, error = %cause, "game creation failed");
                if let Some(unit) = unit
                    && let Err(e) = self.control.delete_execution_unit(&unit).await
                {
                    warn!(%unit, error = %e, "failed to delete abandoned game unit");
                }
                self.release(&resource).await;
                Err(fail(cause))
            }
        }
    }

    /// Stop a game. The reconciler prunes what is left on its next tick.
    pub async fn delete_instance(&self, id: &str) -> SchedulerResult<()> {
        let units = self
            .control
            .list_execution_units(
                &LabelSelector::new()
                    .with(labels::PURPOSE, labels::PURPOSE_GAME)
                    .with(labels::INSTANCE_ID, id),
            )
            .await?;

        if units.is_empty() && self.routes.get(id).is_none() {
            return Err(SchedulerError::InstanceNotFound(id.to_string()));
        }

        for unit in &units {
            self.control
                .patch_resource_label(&unit.volume, labels::RELEASED, "true")
                .await
                .or_else(ignore_not_found)?;
            self.control.delete_execution_unit(&unit.id).await?;
        }
        self.routes.remove(id);
        info!(instance_id = %id, units = units.len(), "game instance deleted");
        Ok(())
    }

    async fn reserve_id(&self) -> Result<IdReservation, CreationCause> {
        let units = self
            .control
            .list_execution_units(&LabelSelector::new().with(labels::PURPOSE, labels::PURPOSE_GAME))
            .await
            .map_err(CreationCause::from_control)?;

        let mut existing: HashSet<InstanceId> = units
            .iter()
            .filter_map(|u| u.label(labels::INSTANCE_ID).map(str::to_string))
            .collect();
        existing.extend(self.routes.list());

        let mut reserved = self.reserved.lock().expect("reserved ids lock");
        existing.extend(reserved.iter().cloned());
        let id = self.ids.allocate(&existing)?;
        reserved.insert(id.clone());

        Ok(IdReservation {
            id,
            reserved: Arc::clone(&self.reserved),
        })
    }

    /// Submit the unit and wait for it. On failure, returns the unit to
    /// clean up (if one was created) with the cause.
    async fn launch(
        &self,
        game: GameType,
        id: &str,
        resource: &str,
    ) -> Result<Instance, (Option<UnitId>, CreationCause)> {
        // Subscribe before submitting so no transition is missed.
        let mut events = self.control.watch_execution_units();

        let spec = UnitSpec {
            kind: UnitKind::Game,
            name_prefix: format!("game-{id}"),
            volume: resource.to_string(),
            payloads: vec![
                self.config.game_plugin_url.clone(),
                game.payload_url().to_string(),
            ],
            port: self.config.port,
            auto_stop: true,
        };
        let unit_labels = labels([
            (labels::PURPOSE, labels::PURPOSE_GAME),
            (labels::INSTANCE_ID, id),
            (labels::GAME_TYPE, game.as_str()),
            (labels::WORLD, resource),
        ]);

        let unit_id = retry_once("create game unit", ControlError::is_transient, || {
            self.control
                .create_execution_unit(spec.clone(), unit_labels.clone())
        })
        .await
        .map_err(|e| (None, CreationCause::from_control(e)))?;
        info!(instance_id = %id, unit = %unit_id, volume = %resource, "game unit submitted");

        let endpoint = self
            .await_ready(&unit_id, &mut events)
            .await
            .map_err(|cause| (Some(unit_id.clone()), cause))?;

        Ok(Instance {
            id: id.to_string(),
            game,
            resource_id: resource.to_string(),
            unit_id,
            endpoint: Some(endpoint),
            state: InstanceState::Running,
        })
    }

    async fn await_ready(
        &self,
        unit_id: &str,
        events: &mut broadcast::Receiver<UnitEvent>,
    ) -> Result<SocketAddr, CreationCause> {
        let timeout = self.config.creation_timeout;
        let mut shutdown = self.shutdown.clone();

        tokio::select! {
            result = tokio::time::timeout(timeout, self.wait_ready(unit_id, events)) => {
                result.unwrap_or(Err(CreationCause::CreationTimeout(timeout)))
            }
            _ = shutdown::signalled(&mut shutdown) => Err(CreationCause::Cancelled),
        }
    }

    async fn wait_ready(
        &self,
        unit_id: &str,
        events: &mut broadcast::Receiver<UnitEvent>,
    ) -> Result<SocketAddr, CreationCause> {
        if let Some(endpoint) = self.probe(unit_id).await? {
            return Ok(endpoint);
        }
        loop {
            match events.recv().await {
                Ok(UnitEvent::Deleted(unit)) if unit.id == unit_id => {
                    return Err(CreationCause::UnitFailed(
                        "was deleted before it became ready".into(),
                    ));
                }
                Ok(event) if event.unit().id == unit_id => {
                    if let Some(endpoint) = readiness(event.unit())? {
                        return Ok(endpoint);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(unit = %unit_id, skipped, "unit watch lagged, re-reading");
                    if let Some(endpoint) = self.probe(unit_id).await? {
                        return Ok(endpoint);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(CreationCause::ControlPlaneUnavailable(ControlError::Unavailable(
                        "unit watch closed".into(),
                    )));
                }
            }
        }
    }
    /// Read the unit once. `Ok(None)` while it is still starting.
    async fn probe(&self, unit_id: &str) -> Result<Option<SocketAddr>, CreationCause> {
        match self.control.read_execution_unit(unit_id).await {
            Ok(Some(unit)) => readiness(&unit),
            Ok(None) => Err(CreationCause::UnitFailed("disappeared before it became ready".into())),
            // The watch may still deliver; keep waiting.
            Err(e) if e.is_transient() => Ok(None),
            Err(e) => Err(CreationCause::from_control(e)),
        }
    }

    /// Mark a world as abandoned. Best effort.
    async fn release(&self, resource: &ResourceId) {
        match self
            .control
            .patch_resource_label(resource, labels::RELEASED, "true")
            .await
        {
            Ok(()) => debug!(volume = %resource, "world released"),
            Err(e) => warn!(volume = %resource, error = %e, "failed to release world"),
        }
    }
}

fn readiness(unit: &ExecutionUnit) -> Result<Option<SocketAddr>, CreationCause> {
    match unit.phase {
        UnitPhase::Failed => Err(CreationCause::UnitFailed("crashed before it became ready".into())),
        UnitPhase::Succeeded => Err(CreationCause::UnitFailed("exited before it became ready".into())),
        UnitPhase::Pending | UnitPhase::Running => Ok(unit.ready_endpoint()),
    }
}

fn ignore_not_found(e: ControlError) -> Result<(), ControlError> {
    match e {
        ControlError::NotFound(_) => Ok(()),
        e => Err(e),
    }
}

/// Run `op`, retrying once if the first error is transient.
async fn retry_once<T, E, F, Fut>(
    what: &str,
    transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match op().await {
        Err(e) if transient(&e) => {
            warn!(op = what, error = %e, "transient control-plane error, retrying once");
            op().await
        }
        other => other,
    }
}
