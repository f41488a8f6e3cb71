//! Determinism testing utilities.
//!
//! The server is authoritative, but replays, desync checks and client
//! prediction all assume that the same config, seed and intent stream give
//! the same state hash. The helpers here run a setup several times and
//! compare hashes.
//!
//! Sources of non-determinism to watch for:
//!
//! - **Floating-point math**: the simulation uses
//!   [`skirmish_core::math::Fixed`] everywhere; floats appear only while
//!   parsing config.
//! - **HashMap iteration order**: systems iterate in sorted entity id order.
//! - **Randomness**: every roll comes from the serialized
//!   [`skirmish_core::rng::SimRng`].

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use skirmish_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that every run matched.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic,
            "Simulation is non-deterministic: {} runs over {} ticks gave {} unique hashes {:?}",
            self.hashes.len(),
            self.ticks,
            self.unique_hashes().len(),
            self.hashes
        );
    }
}

/// Run a state `runs` times and compare final hashes.
///
/// ```ignore
/// let result = verify_determinism(
///     3,
///     200,
///     || two_player_match(),
///     |sim| { sim.tick(); },
///     Simulation::state_hash,
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let mut state = setup();
            for _ in 0..ticks {
                step(&mut state);
            }
            hash(&state)
        })
        .collect();

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks,
    }
}

/// Run a simulation setup twice and compare the final state hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run `num_sims` copies of a setup on scoped threads and collect the final
/// hashes in spawn order.
///
/// A thread that panics contributes hash 0.
pub fn run_parallel_simulations_scoped<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> Vec<u64>
where
    F: Fn() -> Simulation + Sync,
{
    thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick();
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(0))
            .collect()
    })
}

/// Step two copies of a setup side by side.
///
/// Returns `None` if they stay identical, `Some(tick)` for the first tick
/// at which the hashes differ.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    (1..=num_ticks).find(|_| {
        sim1.tick();
        sim2.tick();
        sim1.state_hash() != sim2.state_hash()
    })
}

/// Check that a serialize/deserialize round trip keeps the hash, and that
/// the restored copy keeps matching the original when both tick on.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick();
    }

    let Ok(bytes) = sim.serialize() else {
        return false;
    };
    let Ok(mut restored) = Simulation::deserialize(&bytes) else {
        return false;
    };
    if restored.state_hash() != sim.state_hash() {
        return false;
    }

    for _ in 0..num_ticks {
        sim.tick();
        restored.tick();
    }
    restored.state_hash() == sim.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for simulation inputs.
pub mod strategies {
    use proptest::prelude::*;
    use skirmish_core::components::EntityId;
    use skirmish_core::economy::ResourceCost;
    use skirmish_core::formation::FormationKind;
    use skirmish_core::health::HealthStage;
    use skirmish_core::intents::PlayerIntent;
    use skirmish_core::math::{Fixed, Vec2Fixed};
    use skirmish_core::movement::MoveOrder;

    /// Coordinate in the playable area.
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-5000i64..5000).prop_map(|n| Fixed::from_num(n) / Fixed::from_num(100))
    }

    /// Position in the playable area.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Any health stage.
    pub fn arb_health_stage() -> impl Strategy<Value = HealthStage> {
        prop::sample::select(HealthStage::ALL.to_vec())
    }

    /// Any health delta, including extremes.
    pub fn arb_health_delta() -> impl Strategy<Value = i32> {
        prop_oneof![-8i32..8, any::<i32>()]
    }

    /// Any formation shape.
    pub fn arb_formation_kind() -> impl Strategy<Value = FormationKind> {
        prop_oneof![
            Just(FormationKind::Line),
            Just(FormationKind::Box),
            Just(FormationKind::Wedge),
            Just(FormationKind::Circle),
        ]
    }

    /// A move order with the given sequence.
    pub fn arb_move_order(sequence: u32) -> impl Strategy<Value = MoveOrder> {
        (arb_vec2_position(), -3i32..=3, any::<bool>()).prop_map(
            move |(target_position, yaw, running)| MoveOrder {
                target_position,
                target_rotation: Fixed::from_num(yaw),
                running,
                sequence,
            },
        )
    }

    /// A sequence number in a small range so repeats are common.
    pub fn arb_sequence() -> impl Strategy<Value = u32> {
        0u32..16
    }

    /// An intent addressed to one of `entities`.
    pub fn arb_intent(entities: Vec<EntityId>) -> impl Strategy<Value = PlayerIntent> {
        let pick = prop::sample::select(if entities.is_empty() {
            vec![0]
        } else {
            entities
        });
        prop_oneof![
            (arb_vec2_position(), any::<bool>())
                .prop_map(|(position, neutral)| PlayerIntent::SpawnUnit { position, neutral }),
            pick.clone()
                .prop_map(|building| PlayerIntent::QueueUnit { building }),
            (pick.clone(), arb_vec2_position())
                .prop_map(|(building, position)| PlayerIntent::SetRallyPoint { building, position }),
            (pick, arb_sequence()).prop_flat_map(|(unit, sequence)| {
                arb_move_order(sequence).prop_map(move |order| PlayerIntent::MoveUnit { unit, order })
            }),
            (0i64..50, 0i64..50).prop_map(|(a, b)| PlayerIntent::AddResources {
                amount: ResourceCost::new(a, b)
            }),
        ]
    }

    /// A script of `(tick offset, player, intent)` entries.
    pub fn arb_intent_script(
        entities: Vec<EntityId>,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(u8, i32, PlayerIntent)>> {
        prop::collection::vec((0u8..10, 0i32..2, arb_intent(entities)), 0..max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use skirmish_core::config::SimConfig;
    use skirmish_core::intents::PlayerIntent;

    fn two_player_match() -> Simulation {
        let mut sim = Simulation::new(SimConfig::default());
        for player in 0..2 {
            let ids = sim.add_player(player).unwrap();
            sim.submit(
                player,
                PlayerIntent::QueueUnit {
                    building: *ids.last().unwrap(),
                },
            );
        }
        sim
    }

    #[test]
    fn test_two_player_match_deterministic() {
        verify_determinism(
            3,
            200,
            two_player_match,
            |sim| {
                sim.tick();
            },
            Simulation::state_hash,
        )
        .assert_deterministic();
    }

    #[test]
    fn test_simulation_determinism_helper() {
        assert!(verify_simulation_determinism(two_player_match, 100));
        assert_eq!(find_first_divergence(two_player_match, 100), None);
    }

    #[test]
    fn test_parallel_runs_match() {
        let hashes = run_parallel_simulations_scoped(two_player_match, 4, 150);
        assert_eq!(hashes.len(), 4);
        assert!(hashes.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_serialization_determinism() {
        assert!(verify_serialization_determinism(two_player_match, 60));
    }

    #[test]
    fn test_seed_changes_hash() {
        let a = Simulation::new(SimConfig::default().with_seed(1));
        let b = Simulation::new(SimConfig::default().with_seed(2));
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_unique_hashes() {
        let result = DeterminismResult {
            is_deterministic: false,
            hashes: vec![3, 1, 3],
            ticks: 1,
        };
        assert_eq!(result.unique_hashes(), vec![1, 3]);
        assert_eq!(compute_hash(&7u8), compute_hash(&7u8));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_intent_scripts_are_deterministic(
            script in strategies::arb_intent_script((1..=14).collect(), 24)
        ) {
            let setup = || {
                let mut sim = Simulation::new(SimConfig::default());
                sim.add_player(0).unwrap();
                sim.add_player(1).unwrap();
                sim
            };
            let run = || {
                let mut sim = setup();
                for (delay, player, intent) in &script {
                    sim.submit(*player, *intent);
                    for _ in 0..*delay {
                        sim.tick();
                    }
                }
                sim.tick();
                sim.state_hash()
            };
            prop_assert_eq!(run(), run());
        }
    }
}
