//! Connection-layer facade.
//!
//! What the chat front-end sees: list joinable games, resolve an id to an
//! address, ask for a new game, delete one. Creation runs on its own task
//! and reports back through the [`Notifier`].

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use lobbygrid_core::{GameType, Instance, InstanceId};

use crate::error::SchedulerResult;
use crate::notifier::{Notice, Notifier, Recipient};
use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct Lobby {
    orchestrator: Arc<Orchestrator>,
    notifier: Arc<dyn Notifier>,
}

impl Lobby {
    pub fn new(orchestrator: Arc<Orchestrator>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            orchestrator,
            notifier,
        }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn list_joinable(&self) -> BTreeSet<InstanceId> {
        self.orchestrator.routes().list()
    }

    /// `None` if the game is unknown or ended since it was listed.
    pub fn resolve(&self, id: &str) -> Option<SocketAddr> {
        self.orchestrator.routes().lookup(id)
    }

    pub fn instance(&self, id: &str) -> Option<Instance> {
        self.orchestrator.routes().get(id)
    }

    pub fn instances(&self) -> Vec<Instance> {
        self.orchestrator.routes().routes()
    }

    /// Start creating a game and return immediately.
    ///
    /// The requester is told `Creating`, then either `Ready` or a single
    /// `Failed`. On success the whole lobby gets `Announced`.
    pub fn request_create(&self, game: GameType, requester: &str) -> JoinHandle<()> {
        let player = Recipient::Player(requester.to_string());
        self.notifier.notify(&player, &Notice::Creating { game });

        let orchestrator = Arc::clone(&self.orchestrator);
        let notifier = Arc::clone(&self.notifier);
        let requester = requester.to_string();
        tokio::spawn(async move {
            match orchestrator.create_instance(game, &requester).await {
                Ok(instance) => {
                    if let Some(endpoint) = instance.endpoint {
                        notifier.notify(
                            &player,
                            &Notice::Ready {
                                id: instance.id.clone(),
                                game,
                                endpoint,
                            },
                        );
                    }
                    notifier.notify(
                        &Recipient::Lobby,
                        &Notice::Announced {
                            id: instance.id,
                            game,
                        },
                    );
                }
                Err(e) => {
                    warn!(%game, %requester, error = %e, "create request failed");
                    let reason = e.cause().map_or_else(|| e.to_string(), |c| c.to_string());
                    notifier.notify(&player, &Notice::Failed { game, reason });
                }
            }
        })
    }

    pub async fn delete(&self, id: &str) -> SchedulerResult<()> {
        self.orchestrator.delete_instance(id).await
    }
}
