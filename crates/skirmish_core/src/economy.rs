//! Resource ledger.
//!
//! Authoritative per-player counters for the two resources. The ledger is
//! only consulted by production when a unit cost is configured.
//!
//! All amounts are integers for deterministic simulation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::components::PlayerId;
use crate::error::{GameError, Result};
use crate::math::{decimal_serde, fixed_serde, Fixed, TIMER_EPSILON};

/// An amount of both resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceCost {
    /// First resource.
    pub resource1: i64,
    /// Second resource.
    pub resource2: i64,
}

impl ResourceCost {
    /// Create an amount.
    #[must_use]
    pub const fn new(resource1: i64, resource2: i64) -> Self {
        Self {
            resource1,
            resource2,
        }
    }

    fn check_non_negative(self) -> Result<()> {
        for amount in [self.resource1, self.resource2] {
            if amount < 0 {
                return Err(GameError::InvalidAmount(amount));
            }
        }
        Ok(())
    }
}

/// A player's stockpile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PlayerResources {
    /// First resource.
    pub resource1: i64,
    /// Second resource.
    pub resource2: i64,
}

impl PlayerResources {
    /// Check if the stockpile covers a cost.
    #[must_use]
    pub const fn can_afford(&self, cost: &ResourceCost) -> bool {
        self.resource1 >= cost.resource1 && self.resource2 >= cost.resource2
    }

    /// Add to the stockpile.
    pub fn deposit(&mut self, amount: &ResourceCost) {
        self.resource1 = self.resource1.saturating_add(amount.resource1);
        self.resource2 = self.resource2.saturating_add(amount.resource2);
    }

    /// Spend a cost if both resources cover it.
    ///
    /// Returns true if the transaction succeeded.
    pub fn spend(&mut self, cost: &ResourceCost) -> bool {
        if !self.can_afford(cost) {
            return false;
        }
        self.resource1 -= cost.resource1;
        self.resource2 -= cost.resource2;
        true
    }
}

/// Ledger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    /// First resource granted on join.
    pub starting_resource1: i64,
    /// Second resource granted on join.
    pub starting_resource2: i64,
    /// Seconds between passive income payouts.
    #[serde(with = "decimal_serde")]
    pub generation_interval_seconds: Fixed,
    /// Amount of each resource paid out per interval.
    pub generation_amount: i64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_resource1: 100,
            starting_resource2: 100,
            generation_interval_seconds: Fixed::from_num(5),
            generation_amount: 0,
        }
    }
}

impl EconomyConfig {
    /// Validate settings, returning a list of problems.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.starting_resource1 < 0 || self.starting_resource2 < 0 {
            errors.push("starting resources must not be negative".to_string());
        }
        if self.generation_amount < 0 {
            errors.push("generation_amount must not be negative".to_string());
        }
        if self.generation_interval_seconds <= TIMER_EPSILON {
            errors.push(format!(
                "generation_interval_seconds must be greater than {TIMER_EPSILON}"
            ));
        }
        errors
    }
}

/// Events generated by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EconomyEvent {
    /// Resources were added.
    Deposited {
        /// Player.
        player: PlayerId,
        /// Amount added.
        amount: ResourceCost,
    },
    /// Resources were spent.
    Spent {
        /// Player.
        player: PlayerId,
        /// Amount spent.
        amount: ResourceCost,
    },
}

/// Per-player resource counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResourceLedger {
    players: BTreeMap<PlayerId, PlayerResources>,
    /// Seconds until the next passive payout.
    #[serde(with = "fixed_serde")]
    generation_timer: Fixed,
}

impl ResourceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new(config: &EconomyConfig) -> Self {
        Self {
            players: BTreeMap::new(),
            generation_timer: config.generation_interval_seconds,
        }
    }

    /// Open an account with the configured starting resources.
    pub fn register(&mut self, player: PlayerId, config: &EconomyConfig) -> Result<()> {
        if self.players.contains_key(&player) {
            return Err(GameError::PlayerAlreadyJoined(player));
        }
        self.players.insert(
            player,
            PlayerResources {
                resource1: config.starting_resource1,
                resource2: config.starting_resource2,
            },
        );
        Ok(())
    }

    /// Whether the player has an account.
    #[must_use]
    pub fn contains(&self, player: PlayerId) -> bool {
        self.players.contains_key(&player)
    }

    /// Current balance.
    #[must_use]
    pub fn balance(&self, player: PlayerId) -> Option<PlayerResources> {
        self.players.get(&player).copied()
    }

    /// All accounts in player order.
    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, &PlayerResources)> {
        self.players.iter().map(|(id, r)| (*id, r))
    }

    fn account(&mut self, player: PlayerId) -> Result<&mut PlayerResources> {
        self.players
            .get_mut(&player)
            .ok_or(GameError::UnknownPlayer(player))
    }

    /// Add resources. Negative amounts are rejected.
    pub fn add(&mut self, player: PlayerId, amount: ResourceCost) -> Result<EconomyEvent> {
        amount.check_non_negative()?;
        self.account(player)?.deposit(&amount);
        Ok(EconomyEvent::Deposited { player, amount })
    }

    /// Check whether a player can cover a cost.
    #[must_use]
    pub fn can_afford(&self, player: PlayerId, cost: &ResourceCost) -> bool {
        self.players
            .get(&player)
            .is_some_and(|r| r.can_afford(cost))
    }

    /// Spend a cost; nothing changes unless both resources cover it.
    pub fn try_spend(&mut self, player: PlayerId, cost: ResourceCost) -> Result<EconomyEvent> {
        cost.check_non_negative()?;
        let account = self.account(player)?;
        if account.resource1 < cost.resource1 {
            return Err(GameError::InsufficientResources {
                resource: "resource1",
                required: cost.resource1,
                available: account.resource1,
            });
        }
        if !account.spend(&cost) {
            return Err(GameError::InsufficientResources {
                resource: "resource2",
                required: cost.resource2,
                available: account.resource2,
            });
        }
        Ok(EconomyEvent::Spent {
            player,
            amount: cost,
        })
    }

    /// Advance passive income. Pays every account once per elapsed interval.
    pub fn tick(&mut self, config: &EconomyConfig, dt: Fixed) -> Vec<EconomyEvent> {
        let mut events = Vec::new();
        // Also guards unvalidated configs against spinning below.
        if config.generation_interval_seconds <= TIMER_EPSILON {
            return events;
        }

        self.generation_timer -= dt;
        while self.generation_timer <= TIMER_EPSILON {
            self.generation_timer += config.generation_interval_seconds;
            if config.generation_amount <= 0 {
                continue;
            }
            let amount = ResourceCost::new(config.generation_amount, config.generation_amount);
            for (player, resources) in &mut self.players {
                resources.deposit(&amount);
                events.push(EconomyEvent::Deposited {
                    player: *player,
                    amount,
                });
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger_with(player: PlayerId) -> (ResourceLedger, EconomyConfig) {
        let config = EconomyConfig::default();
        let mut ledger = ResourceLedger::new(&config);
        ledger.register(player, &config).unwrap();
        (ledger, config)
    }

    #[test]
    fn test_starting_balance() {
        let (ledger, _) = ledger_with(0);
        assert_eq!(
            ledger.balance(0),
            Some(PlayerResources {
                resource1: 100,
                resource2: 100
            })
        );
        assert_eq!(ledger.balance(1), None);
    }

    #[test]
    fn test_double_register_rejected() {
        let (mut ledger, config) = ledger_with(0);
        assert!(matches!(
            ledger.register(0, &config),
            Err(GameError::PlayerAlreadyJoined(0))
        ));
    }

    #[test]
    fn test_try_spend_requires_both() {
        let (mut ledger, _) = ledger_with(0);
        let err = ledger.try_spend(0, ResourceCost::new(50, 150)).unwrap_err();
        assert!(matches!(
            err,
            GameError::InsufficientResources {
                resource: "resource2",
                ..
            }
        ));
        assert_eq!(ledger.balance(0).unwrap().resource1, 100);

        ledger.try_spend(0, ResourceCost::new(60, 40)).unwrap();
        let balance = ledger.balance(0).unwrap();
        assert_eq!((balance.resource1, balance.resource2), (40, 60));
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let (mut ledger, _) = ledger_with(0);
        assert!(matches!(
            ledger.add(0, ResourceCost::new(-5, 0)),
            Err(GameError::InvalidAmount(-5))
        ));
        assert!(ledger.try_spend(0, ResourceCost::new(0, -1)).is_err());
        assert!(matches!(
            ledger.add(3, ResourceCost::new(1, 1)),
            Err(GameError::UnknownPlayer(3))
        ));
    }

    #[test]
    fn test_generation_pays_each_interval() {
        let config = EconomyConfig {
            generation_amount: 10,
            ..EconomyConfig::default()
        };
        let mut ledger = ResourceLedger::new(&config);
        ledger.register(0, &config).unwrap();
        ledger.register(1, &config).unwrap();

        let dt = Fixed::ONE / Fixed::from_num(20);
        let mut paid = 0;
        for _ in 0..200 {
            paid += ledger.tick(&config, dt).len();
        }
        // 10 seconds: two payouts for each of two players.
        assert_eq!(paid, 4);
        assert_eq!(ledger.balance(1).unwrap().resource2, 120);
    }

    #[test]
    fn test_tiny_generation_interval_rejected() {
        let config = EconomyConfig {
            generation_interval_seconds: TIMER_EPSILON,
            generation_amount: 1,
            ..EconomyConfig::default()
        };
        assert_eq!(config.validate().len(), 1);
        let mut ledger = ResourceLedger::new(&config);
        ledger.register(0, &config).unwrap();
        assert!(ledger.tick(&config, Fixed::ONE).is_empty());

        let ok = EconomyConfig {
            generation_interval_seconds: TIMER_EPSILON + Fixed::DELTA,
            ..config
        };
        assert!(ok.validate().is_empty());
    }

    #[test]
    fn test_zero_generation_is_silent() {
        let (mut ledger, config) = ledger_with(0);
        for _ in 0..1000 {
            assert!(ledger.tick(&config, Fixed::ONE).is_empty());
        }
        assert_eq!(ledger.balance(0).unwrap().resource1, 100);
    }
}
