//! The control-plane trait.

use async_trait::async_trait;
use tokio::sync::broadcast;

use lobbygrid_core::labels::Labels;
use lobbygrid_core::{ResourceId, UnitId};

use crate::error::ControlResult;
use crate::types::*;

/// Declarative access to the cluster that runs worlds and games.
///
/// Every call may fail transiently with [`crate::ControlError::Unavailable`].
/// Implementations must be shareable across tasks (`Arc<dyn ControlPlane>`).
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    async fn create_execution_unit(&self, spec: UnitSpec, labels: Labels) -> ControlResult<UnitId>;

    async fn list_execution_units(&self, selector: &LabelSelector)
    -> ControlResult<Vec<ExecutionUnit>>;

    /// `Ok(None)` when the unit does not exist.
    async fn read_execution_unit(&self, id: &str) -> ControlResult<Option<ExecutionUnit>>;

    /// Deleting a unit that is already gone succeeds.
    async fn delete_execution_unit(&self, id: &str) -> ControlResult<()>;

    /// Suspend (`true`) or resume (`false`) a unit without terminating it.
    async fn set_execution_unit_suspended(&self, id: &str, suspended: bool) -> ControlResult<()>;

    async fn create_volume_resource(&self, spec: VolumeSpec, labels: Labels)
    -> ControlResult<ResourceId>;

    async fn list_volume_resources(&self, selector: &LabelSelector)
    -> ControlResult<Vec<VolumeResource>>;

    /// `Ok(None)` when the volume does not exist.
    async fn read_volume_resource(&self, id: &str) -> ControlResult<Option<VolumeResource>>;

    async fn patch_resource_label(&self, id: &str, key: &str, value: &str) -> ControlResult<()>;

    /// Deleting a volume that is already gone succeeds.
    async fn delete_volume_resource(&self, id: &str) -> ControlResult<()>;

    /// Subscribe to unit lifecycle events from this point on.
    fn watch_execution_units(&self) -> broadcast::Receiver<UnitEvent>;
}
