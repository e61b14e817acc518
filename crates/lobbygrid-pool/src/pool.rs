//! Resource pool — keeps pre-generated worlds on hand.
//!
//! The pool owns two pieces of in-memory state: the queue of `ready`
//! volumes (oldest first) and the set of volumes still being generated.
//! Both are re-derived from the control plane on every [`ResourcePool::reconcile`]
//! and both live behind the same mutex that [`ResourcePool::take_ready`]
//! holds while claiming.
//!
//! Pre-generation competes with live games for cluster capacity, so it is
//! paused while any game is active: in-flight units are suspended and no
//! new ones are started until the lobby is idle again.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use lobbygrid_control::{
    ControlError, ControlPlane, ExecutionUnit, LabelSelector, UnitKind, UnitPhase, UnitSpec,
    VolumeSpec,
};
use lobbygrid_core::labels::{self, labels};
use lobbygrid_core::{BackingResource, LobbyConfig, ResourceId, Stage, UnitId, epoch_millis};

use crate::error::{PoolError, PoolResult};

/// Configuration for the world pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Ready + generating worlds to keep on hand.
    pub target_size: u32,
    /// Maximum pre-generation units in flight.
    pub generation_concurrency: u32,
    /// Template for new world volumes.
    pub volume: VolumeSpec,
    /// Plugins the pre-generation unit loads.
    pub pre_gen_payloads: Vec<String>,
    pub port: u16,
}

impl PoolConfig {
    pub fn from_config(config: &LobbyConfig) -> Self {
        Self {
            target_size: config.pool.target_size,
            generation_concurrency: config.pool.generation_concurrency,
            volume: VolumeSpec {
                name_prefix: "beans-world".to_string(),
                storage_class: config.cluster.storage_class.clone(),
                size: config.cluster.volume_size.clone(),
            },
            pre_gen_payloads: config.cluster.pre_gen_plugin_urls.clone(),
            port: config.cluster.game_port,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_config(&LobbyConfig::default())
    }
}

/// What one [`ResourcePool::reconcile`] pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolReport {
    /// Worlds moved from `pre-gen` to `ready`.
    pub promoted: usize,
    /// Failed or orphaned pre-generated worlds deleted.
    pub discarded: usize,
    /// New pre-generation units started.
    pub started: usize,
    pub suspended: usize,
    pub resumed: usize,
    /// Ready worlds after the pass.
    pub ready: usize,
    /// Worlds being generated after the pass.
    pub generating: usize,
}

impl PoolReport {
    pub fn changed(&self) -> bool {
        self.promoted + self.discarded + self.started + self.suspended + self.resumed > 0
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub ready: Vec<ResourceId>,
    pub generating: usize,
    pub paused: bool,
    pub creations_in_flight: usize,
    pub target_size: u32,
}

struct PoolState {
    /// Claimable worlds, oldest first.
    ready: VecDeque<ResourceId>,
    /// World being generated → its pre-generation unit.
    generating: BTreeMap<ResourceId, UnitId>,
    paused: bool,
}

/// Counts a creation as active until dropped.
pub struct CreationGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ResourcePool {
    control: Arc<dyn ControlPlane>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    creations: Arc<AtomicUsize>,
}

impl ResourcePool {
    pub fn new(control: Arc<dyn ControlPlane>, config: PoolConfig) -> Self {
        Self {
            control,
            config,
            state: Mutex::new(PoolState {
                ready: VecDeque::new(),
                generating: BTreeMap::new(),
                paused: false,
            }),
            creations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Mark a game creation as in progress. Pre-generation stays paused
    /// until every guard is dropped and no game unit is running.
    pub fn begin_creation(&self) -> CreationGuard {
        self.creations.fetch_add(1, Ordering::SeqCst);
        CreationGuard {
            counter: Arc::clone(&self.creations),
        }
    }

    pub fn creations_in_flight(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        PoolSnapshot {
            ready: state.ready.iter().cloned().collect(),
            generating: state.generating.len(),
            paused: state.paused,
            creations_in_flight: self.creations_in_flight(),
            target_size: self.config.target_size,
        }
    }

    /// Claim the oldest ready world.
    ///
    /// The world is moved to `game` before the lock is released, so two
    /// callers can never receive the same one. Returns `None` when nothing
    /// is ready or the control plane cannot be reached.
    pub async fn take_ready(&self) -> Option<ResourceId> {
        let mut state = self.state.lock().await;
        while let Some(id) = state.ready.pop_front() {
            match self.claim(&id).await {
                Ok(()) => {
                    info!(volume = %id, remaining = state.ready.len(), "claimed pre-generated world");
                    return Some(id);
                }
                Err(PoolError::ClaimRace(_)) => {
                    debug!(volume = %id, "world already claimed elsewhere, trying next");
                }
                Err(e) => {
                    // Still labelled ready; keep it for the next caller.
                    warn!(volume = %id, error = %e, "failed to claim world");
                    state.ready.push_front(id);
                    return None;
                }
            }
        }
        None
    }

    async fn claim(&self, id: &str) -> PoolResult<()> {
        let current = self
            .control
            .read_volume_resource(id)
            .await?
            .and_then(|v| v.labels.get(labels::STAGE).cloned());
        if current.as_deref() != Some(Stage::Ready.label_value()) {
            return Err(PoolError::ClaimRace(id.to_string()));
        }

        // Stamp first: a `game` world without a claim time looks abandoned.
        self.control
            .patch_resource_label(id, labels::CLAIMED_AT, &epoch_millis().to_string())
            .await
            .map_err(|e| match e {
                ControlError::NotFound(_) => PoolError::ClaimRace(id.to_string()),
                e => PoolError::Control(e),
            })?;

        match advance_stage(self.control.as_ref(), id, Stage::Ready, Stage::InUse).await {
            Ok(()) => Ok(()),
            Err(PoolError::UnexpectedStage { .. } | PoolError::Unlabelled(_)) => {
                Err(PoolError::ClaimRace(id.to_string()))
            }
            Err(PoolError::Control(ControlError::NotFound(_))) => {
                Err(PoolError::ClaimRace(id.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Create a fresh world that is claimed from birth. This is the slow
    /// path: the game has to generate its world on start-up.
    pub async fn provision_claimed(&self) -> PoolResult<ResourceId> {
        let now = epoch_millis().to_string();
        let id = self
            .control
            .create_volume_resource(
                self.config.volume.clone(),
                labels([
                    (labels::PURPOSE, labels::PURPOSE_WORLD),
                    (labels::STAGE, Stage::InUse.label_value()),
                    (labels::CLAIMED_AT, now.as_str()),
                ]),
            )
            .await?;
        info!(volume = %id, "provisioned fresh world");
        Ok(id)
    }

    /// Suspend every in-flight pre-generation unit. Best effort.
    pub async fn pause_generation(&self) {
        let mut state = self.state.lock().await;
        state.paused = true;
        for (volume, unit) in &state.generating {
            match self.control.set_execution_unit_suspended(unit, true).await {
                Ok(()) => debug!(%unit, %volume, "pre-generation suspended"),
                Err(e) => warn!(%unit, error = %e, "failed to suspend pre-generation"),
            }
        }
    }

    /// Bring the pool in line with the control plane and top it up.
    ///
    /// `active_games` is the number of live game units; creations that
    /// hold a [`CreationGuard`] are added to it.
    pub async fn reconcile(&self, active_games: usize) -> PoolResult<PoolReport> {
        let mut state = self.state.lock().await;
        let mut report = PoolReport::default();
        let active = active_games + self.creations_in_flight();

        // Settle finished pre-generation units.
        let units = self
            .control
            .list_execution_units(
                &LabelSelector::new().with(labels::PURPOSE, labels::PURPOSE_PRE_GEN),
            )
            .await?;

        let mut in_flight: BTreeMap<ResourceId, ExecutionUnit> = BTreeMap::new();
        for unit in units {
            match unit.phase {
                UnitPhase::Succeeded => {
                    if self.promote(&unit).await {
                        report.promoted += 1;
                    } else {
                        in_flight.insert(unit.volume.clone(), unit);
                    }
                }
                UnitPhase::Failed => {
                    if self.discard(&unit.volume, Some(&unit.id)).await {
                        report.discarded += 1;
                    } else {
                        in_flight.insert(unit.volume.clone(), unit);
                    }
                }
                UnitPhase::Pending | UnitPhase::Running => {
                    in_flight.insert(unit.volume.clone(), unit);
                }
            }
        }

        // Re-derive the ready queue from the full listing.
        let volumes = self
            .control
            .list_volume_resources(&LabelSelector::new().with(labels::PURPOSE, labels::PURPOSE_WORLD))
            .await?;

        let mut ready: Vec<BackingResource> = Vec::new();
        for volume in &volumes {
            let Some(res) = BackingResource::from_labels(&volume.id, volume.created_at, &volume.labels)
            else {
                continue;
            };
            match res.stage {
                Stage::Ready => ready.push(res),
                Stage::PreGenerating if !in_flight.contains_key(&res.id) => {
                    // Its unit is gone; the world was never completed.
                    if self.discard(&res.id, None).await {
                        report.discarded += 1;
                    }
                }
                _ => {}
            }
        }
        ready.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        state.ready = ready.into_iter().map(|r| r.id).collect();

        // Pause while games run, resume once the lobby is idle.
        if active > 0 {
            state.paused = true;
            for unit in in_flight.values_mut().filter(|u| !u.suspended) {
                match self.control.set_execution_unit_suspended(&unit.id, true).await {
                    Ok(()) => {
                        unit.suspended = true;
                        report.suspended += 1;
                    }
                    Err(e) => warn!(unit = %unit.id, error = %e, "failed to suspend pre-generation"),
                }
            }
        } else {
            state.paused = false;
            for unit in in_flight.values_mut().filter(|u| u.suspended) {
                match self.control.set_execution_unit_suspended(&unit.id, false).await {
                    Ok(()) => {
                        unit.suspended = false;
                        report.resumed += 1;
                    }
                    Err(e) => warn!(unit = %unit.id, error = %e, "failed to resume pre-generation"),
                }
            }
        }

        // Top up.
        if active == 0 {
            let have = state.ready.len() + in_flight.len();
            let needed = (self.config.target_size as usize).saturating_sub(have);
            let room = (self.config.generation_concurrency as usize).saturating_sub(in_flight.len());
            for _ in 0..needed.min(room) {
                match self.start_generation().await {
                    Ok(unit) => {
                        in_flight.insert(unit.volume.clone(), unit);
                        report.started += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to start pre-generation");
                        break;
                    }
                }
            }
        }

        state.generating = in_flight.into_iter().map(|(vol, unit)| (vol, unit.id)).collect();
        report.ready = state.ready.len();
        report.generating = state.generating.len();

        if report.changed() {
            info!(
                ready = report.ready,
                generating = report.generating,
                promoted = report.promoted,
                started = report.started,
                discarded = report.discarded,
                paused = state.paused,
                "world pool reconciled"
            );
        }
        Ok(report)
    }

    /// Move a generated world to `ready` and delete its unit. Returns
    /// whether the unit is gone.
    async fn promote(&self, unit: &ExecutionUnit) -> bool {
        match advance_stage(self.control.as_ref(), &unit.volume, Stage::PreGenerating, Stage::Ready)
            .await
        {
            Ok(()) => {}
            // Promoted by an earlier pass whose unit deletion failed.
            Err(PoolError::UnexpectedStage { actual, .. }) if actual > Stage::PreGenerating => {}
            Err(e) => {
                warn!(volume = %unit.volume, error = %e, "failed to promote generated world");
                return false;
            }
        }
        match self.control.delete_execution_unit(&unit.id).await {
            Ok(()) => {
                info!(volume = %unit.volume, unit = %unit.id, "world pre-generated");
                true
            }
            Err(e) => {
                warn!(unit = %unit.id, error = %e, "failed to delete pre-generation unit");
                false
            }
        }
    }

    /// Delete a half-built world and its unit. Returns whether both are gone.
    async fn discard(&self, volume: &str, unit: Option<&str>) -> bool {
        if let Some(unit) = unit
            && let Err(e) = self.control.delete_execution_unit(unit).await
        {
            warn!(%unit, error = %e, "failed to delete pre-generation unit");
            return false;
        }
        match self.control.delete_volume_resource(volume).await {
            Ok(()) => {
                warn!(%volume, "discarded incomplete world");
                true
            }
            Err(e) => {
                warn!(%volume, error = %e, "failed to delete incomplete world");
                false
            }
        }
    }

    async fn start_generation(&self) -> PoolResult<ExecutionUnit> {
        let volume = self
            .control
            .create_volume_resource(
                self.config.volume.clone(),
                labels([
                    (labels::PURPOSE, labels::PURPOSE_WORLD),
                    (labels::STAGE, Stage::PreGenerating.label_value()),
                ]),
            )
            .await?;

        let spec = UnitSpec {
            kind: UnitKind::PreGeneration,
            name_prefix: "pre-gen".to_string(),
            volume: volume.clone(),
            payloads: self.config.pre_gen_payloads.clone(),
            port: self.config.port,
            auto_stop: false,
        };
        let unit_labels = labels([
            (labels::PURPOSE, labels::PURPOSE_PRE_GEN),
            (labels::WORLD, volume.as_str()),
        ]);

        let unit_id = match self.control.create_execution_unit(spec, unit_labels.clone()).await {
            Ok(id) => id,
            Err(e) => {
                if let Err(cleanup) = self.control.delete_volume_resource(&volume).await {
                    warn!(%volume, error = %cleanup, "failed to delete unused world volume");
                }
                return Err(e.into());
            }
        };

        info!(%volume, unit = %unit_id, "pre-generation started");
        Ok(ExecutionUnit {
            id: unit_id,
            kind: UnitKind::PreGeneration,
            labels: unit_labels,
            volume,
            phase: UnitPhase::Pending,
            suspended: false,
            port: self.config.port,
            endpoint: None,
            created_at: epoch_millis(),
        })
    }
}

/// Move a volume from `from` to `to`, checking its current stage first.
///
/// Fails with [`PoolError::InvalidTransition`] when `to` does not follow
/// `from`, and with [`PoolError::UnexpectedStage`] when the volume is not
/// in `from`, so a stale decision can never move a world backwards or
/// skip a stage.
pub async fn advance_stage(
    control: &dyn ControlPlane,
    id: &str,
    from: Stage,
    to: Stage,
) -> PoolResult<()> {
    if !from.can_advance_to(to) {
        return Err(PoolError::InvalidTransition {
            id: id.to_string(),
            from,
            to,
        });
    }
    let volume = control
        .read_volume_resource(id)
        .await?
        .ok_or_else(|| ControlError::NotFound(format!("volume {id}")))?;
    let actual = volume
        .labels
        .get(labels::STAGE)
        .and_then(|v| Stage::from_label_value(v))
        .ok_or_else(|| PoolError::Unlabelled(id.to_string()))?;
    if actual != from {
        return Err(PoolError::UnexpectedStage {
            id: id.to_string(),
            expected: from,
            actual,
        });
    }
    control.patch_resource_label(id, labels::STAGE, to.label_value()).await?;
    debug!(volume = %id, %from, %to, "world stage advanced");
    Ok(())
}
