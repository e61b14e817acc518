//! Messages back to players.
//!
//! The chat front-end is out of process; it implements [`Notifier`] (or
//! drains a [`ChannelNotifier`]) and renders each [`Notice`] with its
//! `Display` text.

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tracing::{info, warn};

use lobbygrid_core::{GameType, InstanceId};

/// Who a notice is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// The player who asked for the game.
    Player(String),
    /// Everyone in the lobby.
    Lobby,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Creating { game: GameType },
    Ready {
        id: InstanceId,
        game: GameType,
        endpoint: SocketAddr,
    },
    Failed { game: GameType, reason: String },
    Announced { id: InstanceId, game: GameType },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Creating { game } => write!(f, "Creating a new {game} game, this can take a minute..."),
            Notice::Ready { id, .. } => write!(f, "Game {id} is ready! Join with /game join {id}"),
            Notice::Failed { game, reason } => write!(f, "Could not create {game} game: {reason}"),
            Notice::Announced { id, game } => {
                write!(f, "A new {game} game ({id}) is open. Join with /game join {id}")
            }
        }
    }
}

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, to: &Recipient, notice: &Notice);
}

/// Writes every notice to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, to: &Recipient, notice: &Notice) {
        match notice {
            Notice::Failed { .. } => warn!(recipient = ?to, "{notice}"),
            _ => info!(recipient = ?to, "{notice}"),
        }
    }
}

/// Forwards notices over an unbounded channel.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(Recipient, Notice)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Recipient, Notice)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, to: &Recipient, notice: &Notice) {
        // A closed receiver means nobody is listening any more.
        let _ = self.tx.send((to.clone(), notice.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_render_join_instructions() {
        let ready = Notice::Ready {
            id: "07".into(),
            game: GameType::BlockShuffle,
            endpoint: "10.0.0.7:25565".parse().unwrap(),
        };
        assert_eq!(ready.to_string(), "Game 07 is ready! Join with /game join 07");

        let failed = Notice::Failed {
            game: GameType::HunterVsSpeedrunner,
            reason: "timed out".into(),
        };
        assert!(failed.to_string().contains("hunter_vs_speedrunner"));
    }

    #[tokio::test]
    async fn channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(&Recipient::Lobby, &Notice::Creating { game: GameType::BlockShuffle });
        let (to, notice) = rx.recv().await.unwrap();
        assert_eq!(to, Recipient::Lobby);
        assert_eq!(notice, Notice::Creating { game: GameType::BlockShuffle });
    }
}
