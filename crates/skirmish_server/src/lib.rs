//! # Skirmish Server
//!
//! Headless authoritative host for the skirmish simulation.
//!
//! Runs [`skirmish_core::simulation::Simulation`] at a fixed rate, feeds it
//! intents from player sessions, and publishes a [`WorldView`] after every
//! tick. Transport is left to the embedding application: sessions are
//! in-process handles.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod session;
pub mod tick_loop;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use skirmish_core::config::{SimConfig, DEFAULT_TICK_RATE};
use skirmish_core::error::GameError;
use skirmish_core::simulation::Simulation;
use skirmish_core::view::WorldView;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::session::Lobby;
use crate::tick_loop::{HostMessage, TickLoop};

/// Errors raised by the host.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Every player slot is taken.
    #[error("Server is full ({max_players} players)")]
    ServerFull {
        /// Configured capacity.
        max_players: u8,
    },

    /// The tick loop has stopped and no longer accepts messages.
    #[error("Session closed for player {0}")]
    SessionClosed(i32),

    /// Server configuration could not be read.
    #[error("Failed to load server config '{path}': {message}")]
    Config {
        /// File path.
        path: String,
        /// Underlying message.
        message: String,
    },

    /// The tick loop task panicked or was cancelled.
    #[error("Tick loop failed: {0}")]
    TickLoop(String),

    /// Output could not be written.
    #[error("Failed to write '{path}': {message}")]
    Output {
        /// Destination path.
        path: String,
        /// Underlying message.
        message: String,
    },

    /// The simulation rejected an operation.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Ticks per second of wall-clock time.
    pub tick_rate: u32,
    /// Maximum players per match.
    pub max_players: u8,
    /// RON simulation config; defaults are used when absent.
    pub sim_config_path: Option<PathBuf>,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            max_players: 8,
            sim_config_path: None,
            max_ticks: None,
        }
    }
}

impl ServerConfig {
    /// Load from a RON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let config_error = |message: String| ServerError::Config {
            path: path.display().to_string(),
            message,
        };
        let source = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        ron::from_str(&source).map_err(|e| config_error(e.to_string()))
    }

    /// Simulation config named by `sim_config_path`, or the defaults.
    ///
    /// # Errors
    /// Returns an error if the named file fails to load or validate.
    pub fn load_sim_config(&self) -> Result<SimConfig, ServerError> {
        match &self.sim_config_path {
            Some(path) => Ok(SimConfig::load(path)?),
            None => Ok(SimConfig::default()),
        }
    }
}

/// Control side of a running host.
#[derive(Debug)]
pub struct ServerHandle {
    /// Player slot allocation.
    pub lobby: Lobby,
    views: watch::Receiver<WorldView>,
    shutdown: watch::Sender<bool>,
}

impl ServerHandle {
    /// The most recently published view.
    #[must_use]
    pub fn latest_view(&self) -> WorldView {
        self.views.borrow().clone()
    }

    /// A receiver that is notified after every tick.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<WorldView> {
        self.views.clone()
    }

    /// Ask the tick loop to stop after the current tick.
    pub fn shutdown(&self) {
        // Ignored if the loop already exited.
        let _ = self.shutdown.send(true);
    }
}

/// Wire a simulation to a tick loop and its control handle.
#[must_use]
pub fn host(config: &ServerConfig, simulation: Simulation) -> (TickLoop, ServerHandle) {
    let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<HostMessage>();
    let (view_tx, view_rx) = watch::channel(simulation.world_view());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tick_loop = TickLoop::new(
        simulation,
        config.tick_rate,
        config.max_ticks,
        inbox_rx,
        view_tx,
        shutdown_rx,
    );
    let handle = ServerHandle {
        lobby: Lobby::new(config.max_players, inbox_tx),
        views: view_rx,
        shutdown: shutdown_tx,
    };
    (tick_loop, handle)
}
