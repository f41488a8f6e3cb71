//! Fixed-rate tick loop.
//!
//! Drains the session inbox, advances the simulation one tick, then
//! publishes a fresh [`WorldView`]. Intents that arrive mid-tick wait for the
//! next drain.

use std::time::Duration;

use skirmish_core::components::PlayerId;
use skirmish_core::intents::SubmittedIntent;
use skirmish_core::simulation::Simulation;
use skirmish_core::view::WorldView;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Message from a session to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMessage {
    /// A player was admitted and needs starting forces.
    Join(PlayerId),
    /// Intent stamped with the session's player id.
    Intent(SubmittedIntent),
}

/// Owns the simulation while the host runs.
#[derive(Debug)]
pub struct TickLoop {
    simulation: Simulation,
    period: Duration,
    max_ticks: Option<u64>,
    inbox: mpsc::UnboundedReceiver<HostMessage>,
    views: watch::Sender<WorldView>,
    shutdown: watch::Receiver<bool>,
}

impl TickLoop {
    /// Build a loop ticking `tick_rate` times per second.
    #[must_use]
    pub fn new(
        simulation: Simulation,
        tick_rate: u32,
        max_ticks: Option<u64>,
        inbox: mpsc::UnboundedReceiver<HostMessage>,
        views: watch::Sender<WorldView>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1)));
        Self {
            simulation,
            period,
            max_ticks,
            inbox,
            views,
            shutdown,
        }
    }

    /// Simulation being driven.
    #[must_use]
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                HostMessage::Join(player) => match self.simulation.add_player(player) {
                    Ok(spawned) => debug!(player, entities = spawned.len(), "Starting forces spawned"),
                    Err(e) => warn!(player, error = %e, "Join rejected"),
                },
                HostMessage::Intent(SubmittedIntent { player, intent }) => {
                    self.simulation.submit(player, intent);
                }
            }
        }
    }

    fn step(&mut self) {
        self.drain_inbox();
        let events = self.simulation.tick();
        for rejected in &events.rejected {
            warn!(
                tick = events.tick,
                player = rejected.player,
                reason = %rejected.reason,
                "Intent rejected"
            );
        }
        if !events.deaths.is_empty() || !events.spawned.is_empty() {
            debug!(
                tick = events.tick,
                deaths = events.deaths.len(),
                spawned = events.spawned.len(),
                "Roster changed"
            );
        }
        self.views.send_replace(self.simulation.world_view());
    }

    fn finished(&self) -> bool {
        self.max_ticks
            .is_some_and(|max| self.simulation.get_tick() >= max)
    }
}

/// Run until shutdown is signalled or `max_ticks` is reached.
///
/// Returns the simulation in its final state.
pub async fn run_tick_loop(mut tick_loop: TickLoop) -> Simulation {
    let mut interval = time::interval(tick_loop.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        period = ?tick_loop.period,
        max_ticks = ?tick_loop.max_ticks,
        "Tick loop started"
    );

    while !tick_loop.finished() {
        tokio::select! {
            _ = interval.tick() => tick_loop.step(),
            changed = tick_loop.shutdown.changed() => {
                // A dropped handle also stops the loop.
                if changed.is_err() || *tick_loop.shutdown.borrow() {
                    info!(tick = tick_loop.simulation.get_tick(), "Shutdown requested");
                    break;
                }
            }
        }
    }

    info!(
        tick = tick_loop.simulation.get_tick(),
        state_hash = tick_loop.simulation.state_hash(),
        "Tick loop stopped"
    );
    tick_loop.simulation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host, ServerConfig};
    use skirmish_core::config::SimConfig;
    use skirmish_core::economy::ResourceCost;
    use skirmish_core::intents::PlayerIntent;

    fn fast_config(max_ticks: Option<u64>) -> ServerConfig {
        ServerConfig {
            tick_rate: 1000,
            max_players: 2,
            sim_config_path: None,
            max_ticks,
        }
    }

    #[tokio::test]
    async fn test_runs_to_max_ticks_and_publishes_views() {
        let config = fast_config(Some(20));
        let (tick_loop, mut handle) = host(&config, Simulation::new(SimConfig::default()));
        let first = handle.lobby.join().unwrap();
        let second = handle.lobby.join().unwrap();
        assert!(handle.lobby.join().is_err());

        first
            .sender
            .send(PlayerIntent::AddResources {
                amount: ResourceCost::new(7, 0),
            })
            .unwrap();

        let views = handle.subscribe();
        let sim = run_tick_loop(tick_loop).await;
        assert_eq!(sim.get_tick(), 20);

        let view = views.borrow().clone();
        assert_eq!(view.tick, 20);
        assert_eq!(view.state_hash, sim.state_hash());
        assert_eq!(view.players.len(), 2);
        assert!(view.units_of(first.player).next().is_some());
        assert!(view.units_of(second.player).next().is_some());
        assert_eq!(handle.latest_view(), view);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let config = fast_config(None);
        let (tick_loop, handle) = host(&config, Simulation::default());
        let task = tokio::spawn(run_tick_loop(tick_loop));

        let mut views = handle.subscribe();
        views.changed().await.unwrap();
        handle.shutdown();

        let sim = task.await.unwrap();
        assert!(sim.get_tick() >= 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_stops_loop() {
        let (tick_loop, handle) = host(&fast_config(None), Simulation::default());
        drop(handle);
        let sim = run_tick_loop(tick_loop).await;
        assert!(sim.get_tick() <= 1);
    }

    #[tokio::test]
    async fn test_session_cannot_queue_at_foreign_building() {
        let (tick_loop, mut handle) = host(&fast_config(Some(200)), Simulation::default());
        let intruder = handle.lobby.join().unwrap();
        let _owner = handle.lobby.join().unwrap();
        let mut views = handle.subscribe();
        let task = tokio::spawn(run_tick_loop(tick_loop));

        // Both joins are applied on the first tick.
        views.changed().await.unwrap();
        let foreign = views
            .borrow_and_update()
            .buildings
            .iter()
            .find(|b| b.owner != intruder.player)
            .map(|b| b.id)
            .unwrap();
        intruder
            .sender
            .send(PlayerIntent::QueueUnit { building: foreign })
            .unwrap();

        let sim = task.await.unwrap();
        let building = sim.building_view(foreign).unwrap();
        assert_eq!(building.units_in_queue, 0);
        assert!(!building.is_spawning);
        // Nothing was charged, so both ledgers still match.
        let players = sim.world_view().players;
        assert_eq!(players.len(), 2);
        assert_eq!(players[0].resources, players[1].resources);
    }
}
