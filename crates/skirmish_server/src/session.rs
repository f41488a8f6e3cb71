//! Player sessions.
//!
//! The lobby hands out player ids. Each session owns an [`IntentSender`]
//! that stamps outgoing intents with that id, so a client can never act on
//! behalf of another player.

use skirmish_core::components::PlayerId;
use skirmish_core::intents::{PlayerIntent, SubmittedIntent};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::tick_loop::HostMessage;
use crate::ServerError;

/// Slot allocation for one match.
#[derive(Debug)]
pub struct Lobby {
    max_players: u8,
    next_player: PlayerId,
    players: Vec<PlayerId>,
    inbox: mpsc::UnboundedSender<HostMessage>,
}

impl Lobby {
    /// Create an empty lobby feeding `inbox`.
    #[must_use]
    pub fn new(max_players: u8, inbox: mpsc::UnboundedSender<HostMessage>) -> Self {
        Self {
            max_players,
            next_player: 0,
            players: Vec::new(),
            inbox,
        }
    }

    /// Allocate the next player id and ask the host to spawn its forces.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::ServerFull`] when every slot is taken, or
    /// [`ServerError::SessionClosed`] if the tick loop has stopped.
    pub fn join(&mut self) -> Result<PlayerSession, ServerError> {
        if self.players.len() >= usize::from(self.max_players) {
            return Err(ServerError::ServerFull {
                max_players: self.max_players,
            });
        }

        let player = self.next_player;
        self.inbox
            .send(HostMessage::Join(player))
            .map_err(|_| ServerError::SessionClosed(player))?;
        self.next_player += 1;
        self.players.push(player);
        info!(player, joined = self.players.len(), "Player joined");

        Ok(PlayerSession {
            player,
            sender: IntentSender {
                player,
                inbox: self.inbox.clone(),
            },
        })
    }

    /// Players admitted so far, in join order.
    #[must_use]
    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    /// Whether every slot is taken.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.players.len() >= usize::from(self.max_players)
    }
}

/// One admitted player.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    /// Id assigned by the lobby.
    pub player: PlayerId,
    /// Outgoing intent channel.
    pub sender: IntentSender,
}

/// Sends intents tagged with the owning session's player id.
#[derive(Debug, Clone)]
pub struct IntentSender {
    player: PlayerId,
    inbox: mpsc::UnboundedSender<HostMessage>,
}

impl IntentSender {
    /// Player this sender acts for.
    #[must_use]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Queue an intent for the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::SessionClosed`] if the tick loop has stopped.
    pub fn send(&self, intent: PlayerIntent) -> Result<(), ServerError> {
        debug!(player = self.player, ?intent, "Intent received");
        self.inbox
            .send(HostMessage::Intent(SubmittedIntent {
                player: self.player,
                intent,
            }))
            .map_err(|_| ServerError::SessionClosed(self.player))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skirmish_core::economy::ResourceCost;

    #[test]
    fn test_join_allocates_sequential_ids() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut lobby = Lobby::new(2, tx);

        assert_eq!(lobby.join().unwrap().player, 0);
        assert_eq!(lobby.join().unwrap().player, 1);
        assert!(lobby.is_full());
        assert!(matches!(
            lobby.join(),
            Err(ServerError::ServerFull { max_players: 2 })
        ));
        assert_eq!(lobby.players(), &[0, 1]);

        assert!(matches!(rx.try_recv(), Ok(HostMessage::Join(0))));
        assert!(matches!(rx.try_recv(), Ok(HostMessage::Join(1))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sender_tags_intents_with_session_player() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut lobby = Lobby::new(4, tx);
        let _first = lobby.join().unwrap();
        let second = lobby.join().unwrap();
        let _ = rx.try_recv();
        let _ = rx.try_recv();

        let intent = PlayerIntent::AddResources {
            amount: ResourceCost::new(5, 0),
        };
        second.sender.send(intent).unwrap();

        match rx.try_recv() {
            Ok(HostMessage::Intent(submitted)) => {
                assert_eq!(submitted.player, 1);
                assert_eq!(submitted.intent, intent);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_closed_inbox_reports_session_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut lobby = Lobby::new(1, tx);
        let session = lobby.join().unwrap();
        drop(rx);

        let err = session
            .sender
            .send(PlayerIntent::AddResources {
                amount: ResourceCost::new(1, 1),
            })
            .unwrap_err();
        assert!(matches!(err, ServerError::SessionClosed(0)));
    }
}
