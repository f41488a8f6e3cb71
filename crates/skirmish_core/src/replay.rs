//! Replay system for recording and playing back matches.
//!
//! Replays store the initial simulation state and the stream of player
//! intents submitted during the match. Because the simulation is
//! deterministic, re-submitting the same intents at the same ticks
//! recreates the match exactly.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::components::PlayerId;
use crate::error::{GameError, Result};
use crate::intents::PlayerIntent;
use crate::simulation::Simulation;

/// A single intent record for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayIntent {
    /// Simulation tick at which the intent was submitted.
    pub tick: u64,
    /// Submitting player.
    pub player: PlayerId,
    /// The intent.
    pub intent: PlayerIntent,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Random seed used for the match.
    pub seed: u64,
    /// Serialized initial simulation state.
    pub initial_state: Vec<u8>,
    /// Intents in submission order.
    pub intents: Vec<ReplayIntent>,
    /// Final tick when the match ended.
    pub final_tick: u64,
    /// Final state hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Create a new replay from a simulation's initial state.
    ///
    /// # Errors
    /// Returns an error if the state cannot be serialized.
    pub fn new(scenario_id: impl Into<String>, initial_state: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed: initial_state.config().seed,
            initial_state: initial_state.serialize()?,
            intents: Vec::new(),
            final_tick: initial_state.get_tick(),
            final_hash: initial_state.state_hash(),
        })
    }

    /// Record an intent submitted at `tick`.
    pub fn record_intent(&mut self, tick: u64, player: PlayerId, intent: PlayerIntent) {
        self.intents.push(ReplayIntent {
            tick,
            player,
            intent,
        });
    }

    /// Submit an intent to a live simulation and record it.
    pub fn submit(&mut self, simulation: &mut Simulation, player: PlayerId, intent: PlayerIntent) {
        self.record_intent(simulation.get_tick(), player, intent);
        simulation.submit(player, intent);
    }

    /// Finalize the replay with the end-of-match state.
    pub fn finalize(&mut self, simulation: &Simulation) {
        self.final_tick = simulation.get_tick();
        self.final_hash = simulation.state_hash();
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path, bytes).map_err(|source| GameError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading, deserialization or the version
    /// check fails.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| GameError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| GameError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::ReplayVersion {
                expected: REPLAY_VERSION,
                found: replay.version,
            });
        }

        Ok(replay)
    }

    /// Get the initial simulation state for playback.
    ///
    /// # Errors
    /// Returns an error if state deserialization fails.
    pub fn restore_initial_state(&self) -> Result<Simulation> {
        Simulation::deserialize(&self.initial_state)
    }

    /// Intents submitted at a specific tick.
    #[must_use]
    pub fn intents_at_tick(&self, tick: u64) -> Vec<&ReplayIntent> {
        self.intents.iter().filter(|i| i.tick == tick).collect()
    }

    /// Total number of recorded intents.
    #[must_use]
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    /// Index into the intent stream.
    intent_index: usize,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            simulation,
            intent_index: 0,
            paused: false,
        })
    }

    /// Advance the replay by one tick.
    ///
    /// Returns true if there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        if self.paused || self.is_finished() {
            return !self.is_finished();
        }
        self.step();
        !self.is_finished()
    }

    fn step(&mut self) {
        let tick = self.simulation.get_tick();
        while let Some(record) = self.replay.intents.get(self.intent_index) {
            if record.tick > tick {
                break;
            }
            self.simulation.submit(record.player, record.intent);
            self.intent_index += 1;
        }
        self.simulation.tick();
    }

    /// Seek to a specific tick by replaying from the start.
    ///
    /// # Errors
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        self.simulation = self.replay.restore_initial_state()?;
        self.intent_index = 0;
        // Intents recorded before the initial tick were already in the
        // serialized inbox.
        let start = self.simulation.get_tick();
        while self
            .replay
            .intents
            .get(self.intent_index)
            .is_some_and(|r| r.tick < start)
        {
            self.intent_index += 1;
        }
        while self.simulation.get_tick() < target_tick && !self.is_finished() {
            self.step();
        }
        Ok(())
    }

    /// Get the current tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// Get a reference to the current simulation state.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if the replay has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.simulation.get_tick() >= self.replay.final_tick
    }

    /// Re-run the whole replay and compare the final hash.
    ///
    /// # Errors
    /// Returns [`GameError::DesyncDetected`] on a hash mismatch, or an error
    /// if the initial state cannot be restored.
    pub fn verify(&mut self) -> Result<()> {
        self.seek(self.replay.final_tick)?;
        let local_hash = self.simulation.state_hash();
        if local_hash != self.replay.final_hash {
            return Err(GameError::DesyncDetected {
                tick: self.simulation.get_tick(),
                local_hash,
                remote_hash: self.replay.final_hash,
            });
        }
        Ok(())
    }

    /// Toggle pause state.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Progress as a percentage (0-100).
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.replay.final_tick == 0 {
            100.0
        } else {
            (self.current_tick() as f64 / self.replay.final_tick as f64) * 100.0
        }
    }
}
