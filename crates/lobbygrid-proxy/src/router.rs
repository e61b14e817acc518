//! Routing table — maps instance ids to reachable endpoints.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use tracing::debug;

use lobbygrid_core::{Instance, InstanceId};

/// Joinable instances keyed by id.
///
/// Cheap to clone; clones share the same table. Readers may observe an
/// entry disappear between [`list`](Self::list) and
/// [`lookup`](Self::lookup); that yields `None`, never an error.
#[derive(Clone, Default)]
pub struct RoutingTable {
    routes: Arc<RwLock<HashMap<InstanceId, Instance>>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `instance.id`.
    pub fn publish(&self, instance: Instance) {
        let mut routes = self.routes.write().expect("routes lock");
        debug!(instance_id = %instance.id, endpoint = ?instance.endpoint, "route published");
        routes.insert(instance.id.clone(), instance);
    }

    /// Remove a route. Returns the entry that was removed, if any.
    pub fn remove(&self, id: &str) -> Option<Instance> {
        let mut routes = self.routes.write().expect("routes lock");
        let removed = routes.remove(id);
        if removed.is_some() {
            debug!(instance_id = id, "route removed");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Instance> {
        let routes = self.routes.read().expect("routes lock");
        routes.get(id).cloned()
    }

    /// Ids of every joinable instance, sorted.
    pub fn list(&self) -> BTreeSet<InstanceId> {
        let routes = self.routes.read().expect("routes lock");
        routes.keys().cloned().collect()
    }

    pub fn lookup(&self, id: &str) -> Option<SocketAddr> {
        let routes = self.routes.read().expect("routes lock");
        routes.get(id).and_then(|i| i.endpoint)
    }

    /// Every entry, sorted by id.
    pub fn routes(&self) -> Vec<Instance> {
        let routes = self.routes.read().expect("routes lock");
        let mut all: Vec<Instance> = routes.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.routes.read().expect("routes lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
