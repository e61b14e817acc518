//! In-memory control plane.
//!
//! A consistent, single-process stand-in for the cluster API. Besides the
//! [`ControlPlane`] operations it exposes knobs that let callers play the
//! part of the cluster: drive units to readiness or completion, seed
//! volumes with arbitrary labels, and inject outages.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use lobbygrid_core::labels::Labels;
use lobbygrid_core::{ResourceId, UnitId, epoch_millis};

use crate::error::{ControlError, ControlResult};
use crate::plane::ControlPlane;
use crate::types::*;

/// Capacity of the unit event channel. Slow watchers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

struct Inner {
    units: BTreeMap<UnitId, ExecutionUnit>,
    volumes: BTreeMap<ResourceId, VolumeResource>,
    next_suffix: u64,
    /// Remaining calls that fail with `Unavailable`.
    failures_pending: u32,
    /// Every call fails with `Unavailable` while set.
    unavailable: bool,
    /// Game units become ready as soon as they are created.
    auto_ready: bool,
    /// Successful mutating calls so far.
    mutations: u64,
}

impl Inner {
    fn check_available(&mut self, op: &str) -> ControlResult<()> {
        if self.unavailable {
            return Err(ControlError::Unavailable(format!("{op}: api server down")));
        }
        if self.failures_pending > 0 {
            self.failures_pending -= 1;
            return Err(ControlError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }

    fn name(&mut self, prefix: &str) -> String {
        self.next_suffix += 1;
        format!("{prefix}-{}", self.next_suffix)
    }

    /// Addresses are handed out deterministically from `10.0.0.0/16`.
    fn address_for(&self, suffix: u64, port: u16) -> SocketAddr {
        let host = (suffix % 65_000) as u16 + 2;
        let ip = Ipv4Addr::new(10, 0, (host >> 8) as u8, (host & 0xff) as u8);
        SocketAddr::new(IpAddr::V4(ip), port)
    }
}

pub struct MemoryControlPlane {
    inner: Mutex<Inner>,
    events: broadcast::Sender<UnitEvent>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                units: BTreeMap::new(),
                volumes: BTreeMap::new(),
                next_suffix: 0,
                failures_pending: 0,
                unavailable: false,
                auto_ready: false,
                mutations: 0,
            }),
            events,
        }
    }

    /// Make game units report a ready endpoint the moment they are created.
    pub fn with_auto_ready(self) -> Self {
        self.lock().auto_ready = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory control plane lock")
    }

    fn emit(&self, event: UnitEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Fault injection ────────────────────────────────────────────

    /// Fail the next `n` calls with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.lock().failures_pending = n;
    }

    /// Fail every call until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    // ── Playing the cluster ────────────────────────────────────────

    /// Report a unit as running and reachable at `endpoint`.
    pub fn mark_ready(&self, id: &str, endpoint: SocketAddr) -> bool {
        self.transition(id, |u| {
            u.phase = UnitPhase::Running;
            u.endpoint = Some(endpoint);
        })
    }

    /// Report a unit as running and reachable at a generated address.
    pub fn mark_ready_auto(&self, id: &str) -> bool {
        let endpoint = {
            let mut inner = self.lock();
            let Some(port) = inner.units.get(id).map(|u| u.port) else {
                return false;
            };
            inner.next_suffix += 1;
            inner.address_for(inner.next_suffix, port)
        };
        self.mark_ready(id, endpoint)
    }

    /// Report a unit as having exited successfully.
    pub fn complete(&self, id: &str) -> bool {
        self.transition(id, |u| {
            u.phase = UnitPhase::Succeeded;
            u.endpoint = None;
        })
    }

    /// Report a unit as crashed.
    pub fn crash(&self, id: &str) -> bool {
        self.transition(id, |u| {
            u.phase = UnitPhase::Failed;
            u.endpoint = None;
        })
    }

    fn transition(&self, id: &str, f: impl FnOnce(&mut ExecutionUnit)) -> bool {
        let updated = {
            let mut inner = self.lock();
            match inner.units.get_mut(id) {
                Some(unit) => {
                    f(unit);
                    unit.clone()
                }
                None => return false,
            }
        };
        self.emit(UnitEvent::Modified(updated));
        true
    }

    /// Store a volume directly, bypassing the API.
    pub fn insert_volume(&self, id: &str, labels: Labels, created_at: u64) {
        self.lock().volumes.insert(
            id.to_string(),
            VolumeResource {
                id: id.to_string(),
                labels,
                created_at,
            },
        );
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn units(&self) -> Vec<ExecutionUnit> {
        self.lock().units.values().cloned().collect()
    }

    pub fn unit(&self, id: &str) -> Option<ExecutionUnit> {
        self.lock().units.get(id).cloned()
    }

    pub fn volumes(&self) -> Vec<VolumeResource> {
        self.lock().volumes.values().cloned().collect()
    }

    pub fn volume(&self, id: &str) -> Option<VolumeResource> {
        self.lock().volumes.get(id).cloned()
    }

    /// Number of successful mutating calls made through the API.
    pub fn mutation_count(&self) -> u64 {
        self.lock().mutations
    }
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    async fn create_execution_unit(&self, spec: UnitSpec, labels: Labels) -> ControlResult<UnitId> {
        let unit = {
            let mut inner = self.lock();
            inner.check_available("create unit")?;
            if !inner.volumes.contains_key(&spec.volume) {
                return Err(ControlError::Rejected(format!(
                    "volume {} does not exist",
                    spec.volume
                )));
            }
            let id = inner.name(&spec.name_prefix);
            let ready = inner.auto_ready && spec.kind == UnitKind::Game;
            let address = inner.address_for(inner.next_suffix, spec.port);
            let unit = ExecutionUnit {
                id: id.clone(),
                kind: spec.kind,
                labels,
                volume: spec.volume,
                phase: if ready { UnitPhase::Running } else { UnitPhase::Pending },
                suspended: false,
                port: spec.port,
                endpoint: ready.then_some(address),
                created_at: epoch_millis(),
            };
            inner.units.insert(id, unit.clone());
            inner.mutations += 1;
            unit
        };
        debug!(unit = %unit.id, kind = ?unit.kind, "unit created");
        let id = unit.id.clone();
        self.emit(UnitEvent::Added(unit));
        Ok(id)
    }

    async fn list_execution_units(
        &self,
        selector: &LabelSelector,
    ) -> ControlResult<Vec<ExecutionUnit>> {
        let mut inner = self.lock();
        inner.check_available("list units")?;
        Ok(inner
            .units
            .values()
            .filter(|u| selector.matches(&u.labels))
            .cloned()
            .collect())
    }

    async fn read_execution_unit(&self, id: &str) -> ControlResult<Option<ExecutionUnit>> {
        let mut inner = self.lock();
        inner.check_available("read unit")?;
        Ok(inner.units.get(id).cloned())
    }

    async fn delete_execution_unit(&self, id: &str) -> ControlResult<()> {
        let removed = {
            let mut inner = self.lock();
            inner.check_available("delete unit")?;
            let removed = inner.units.remove(id);
            if removed.is_some() {
                inner.mutations += 1;
            }
            removed
        };
        if let Some(unit) = removed {
            debug!(unit = %id, "unit deleted");
            self.emit(UnitEvent::Deleted(unit));
        }
        Ok(())
    }

    async fn set_execution_unit_suspended(&self, id: &str, suspended: bool) -> ControlResult<()> {
        let updated = {
            let mut inner = self.lock();
            inner.check_available("suspend unit")?;
            let unit = inner
                .units
                .get_mut(id)
                .ok_or_else(|| ControlError::NotFound(format!("unit {id}")))?;
            if unit.suspended == suspended {
                return Ok(());
            }
            unit.suspended = suspended;
            let unit = unit.clone();
            inner.mutations += 1;
            unit
        };
        self.emit(UnitEvent::Modified(updated));
        Ok(())
    }

    async fn create_volume_resource(
        &self,
        spec: VolumeSpec,
        labels: Labels,
    ) -> ControlResult<ResourceId> {
        let mut inner = self.lock();
        inner.check_available("create volume")?;
        let id = inner.name(&spec.name_prefix);
        inner.volumes.insert(
            id.clone(),
            VolumeResource {
                id: id.clone(),
                labels,
                created_at: epoch_millis(),
            },
        );
        inner.mutations += 1;
        debug!(volume = %id, "volume created");
        Ok(id)
    }

    async fn list_volume_resources(
        &self,
        selector: &LabelSelector,
    ) -> ControlResult<Vec<VolumeResource>> {
        let mut inner = self.lock();
        inner.check_available("list volumes")?;
        Ok(inner
            .volumes
            .values()
            .filter(|v| selector.matches(&v.labels))
            .cloned()
            .collect())
    }

    async fn read_volume_resource(&self, id: &str) -> ControlResult<Option<VolumeResource>> {
        let mut inner = self.lock();
        inner.check_available("read volume")?;
        Ok(inner.volumes.get(id).cloned())
    }

    async fn patch_resource_label(&self, id: &str, key: &str, value: &str) -> ControlResult<()> {
        let mut inner = self.lock();
        inner.check_available("patch volume")?;
        let volume = inner
            .volumes
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(format!("volume {id}")))?;
        volume.labels.insert(key.to_string(), value.to_string());
        inner.mutations += 1;
        Ok(())
    }

    async fn delete_volume_resource(&self, id: &str) -> ControlResult<()> {
        let mut inner = self.lock();
        inner.check_available("delete volume")?;
        if inner.volumes.remove(id).is_some() {
            inner.mutations += 1;
            debug!(volume = %id, "volume deleted");
        }
        Ok(())
    }

    fn watch_execution_units(&self) -> broadcast::Receiver<UnitEvent> {
        self.events.subscribe()
    }
}
