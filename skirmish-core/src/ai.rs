//! Move sources for live play and the game loop

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::board::Topology;
use crate::combat::Resolver;
use crate::eval::evaluate;
use crate::game::{GameError, GameMove, GameResult, GameState, Resolution};
use crate::search::{SearchStats, Solver};
use crate::units::{Player, UnitId};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default expectimax depth
pub const DEFAULT_DEPTH: u32 = 3;

/// Proposals an agent gets per turn before the turn is skipped
const MAX_ATTEMPTS: u32 = 3;

// ============================================================================
// AGENTS
// ============================================================================

/// Anything that picks moves for the unit whose turn it is
pub trait Agent<T: Topology> {
    fn name(&self) -> &str;

    /// Pick a move, or `None` when there is nothing to do
    fn choose(&mut self, state: &GameState<T>) -> Option<GameMove>;

    /// Forget per-game caches
    fn reset(&mut self) {}
}

type Heuristic<T> = fn(&GameState<T>) -> f64;

/// Expectimax search over the material heuristic
pub struct ExpectimaxAI<T: Topology> {
    pub depth: u32,
    solver: Solver<GameState<T>, Heuristic<T>>,
}

impl<T: Topology> ExpectimaxAI<T> {
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            solver: Solver::new(evaluate::<T> as Heuristic<T>),
        }
    }

    /// Best move for the current unit; player one maximizes
    pub fn best_move(&mut self, state: &GameState<T>) -> Option<GameMove> {
        let maximizing = state.current_player().ok()?.is_maximizing();
        let (value, mv) = self.search(state, maximizing);
        tracing::debug!("expectimax depth {} picked {:?} ({:.2})", self.depth, mv, value);
        mv
    }

    /// Counters from the last search
    pub fn stats(&self) -> SearchStats {
        self.solver.stats()
    }

    #[cfg(not(feature = "parallel"))]
    fn search(&mut self, state: &GameState<T>, maximizing: bool) -> (f64, Option<GameMove>) {
        self.solver.solve(state, self.depth, maximizing)
    }

    #[cfg(feature = "parallel")]
    fn search(&mut self, state: &GameState<T>, maximizing: bool) -> (f64, Option<GameMove>) {
        self.solver.solve_parallel(state, self.depth, maximizing)
    }
}

impl<T: Topology> Default for ExpectimaxAI<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

impl<T: Topology> Agent<T> for ExpectimaxAI<T> {
    fn name(&self) -> &str {
        "expectimax"
    }

    fn choose(&mut self, state: &GameState<T>) -> Option<GameMove> {
        self.best_move(state)
    }

    fn reset(&mut self) {
        self.solver.table_mut().clear();
    }
}

/// One-ply lookahead on the expected heuristic
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyAI;

impl<T: Topology> Agent<T> for GreedyAI {
    fn name(&self) -> &str {
        "greedy"
    }

    fn choose(&mut self, state: &GameState<T>) -> Option<GameMove> {
        let maximizing = state.current_player().ok()?.is_maximizing();
        let mut best: Option<(f64, GameMove)> = None;

        for mv in state.legal_moves() {
            let Ok(branches) = state.apply_with_branching(&mv) else {
                continue;
            };
            let expected: f64 = branches.iter().map(|(child, p)| p * evaluate(child)).sum();
            let improves = match &best {
                None => true,
                Some((value, _)) if maximizing => expected > *value,
                Some((value, _)) => expected < *value,
            };
            if improves {
                best = Some((expected, mv));
            }
        }
        best.map(|(_, mv)| mv)
    }
}

/// Uniform over legal moves
#[derive(Clone, Debug)]
pub struct RandomAI {
    rng: ChaCha8Rng,
}

impl RandomAI {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl<T: Topology> Agent<T> for RandomAI {
    fn name(&self) -> &str {
        "random"
    }

    fn choose(&mut self, state: &GameState<T>) -> Option<GameMove> {
        state.legal_moves().choose(&mut self.rng).cloned()
    }
}

// ============================================================================
// GAME LOOP
// ============================================================================

/// One applied move
#[derive(Clone, Debug)]
pub struct TurnRecord {
    pub turn: u32,
    pub unit: UnitId,
    pub mv: GameMove,
    pub resolution: Resolution,
}

/// Finished (or capped) game
#[derive(Clone, Debug)]
pub struct GameRecord<T: Topology> {
    pub result: GameResult,
    pub turns: u32,
    pub history: Vec<TurnRecord>,
    pub final_state: GameState<T>,
}

/// Play until one side is wiped out or `max_turns` unit turns have passed.
///
/// An agent whose proposals keep getting rejected forfeits that turn.
pub fn play_game<T, R>(
    initial: GameState<T>,
    player_one: &mut dyn Agent<T>,
    player_two: &mut dyn Agent<T>,
    resolver: &mut R,
    max_turns: u32,
) -> Result<GameRecord<T>, GameError>
where
    T: Topology,
    R: Resolver + ?Sized,
{
    play_game_observed(initial, player_one, player_two, resolver, max_turns, |_, _| {})
}

/// [`play_game`], calling `observe` after every applied move
pub fn play_game_observed<T, R, F>(
    initial: GameState<T>,
    player_one: &mut dyn Agent<T>,
    player_two: &mut dyn Agent<T>,
    resolver: &mut R,
    max_turns: u32,
    mut observe: F,
) -> Result<GameRecord<T>, GameError>
where
    T: Topology,
    R: Resolver + ?Sized,
    F: FnMut(&TurnRecord, &GameState<T>),
{
    player_one.reset();
    player_two.reset();

    let mut state = initial;
    let mut history = Vec::new();
    let mut turns = 0;

    while !state.is_terminal() && turns < max_turns {
        turns += 1;
        let unit = state.current_unit()?;
        let (id, owner) = (unit.id, unit.owner);
        let agent: &mut dyn Agent<T> = match owner {
            Player::One => &mut *player_one,
            Player::Two => &mut *player_two,
        };

        let mut applied = false;
        for attempt in 1..=MAX_ATTEMPTS {
            let Some(mv) = agent.choose(&state) else {
                break;
            };
            match state.execute(&mv, resolver) {
                Ok(resolution) => {
                    tracing::debug!("turn {}: unit {} ({}) {}", turns, id, agent.name(), mv);
                    let record = TurnRecord {
                        turn: turns,
                        unit: id,
                        mv,
                        resolution,
                    };
                    observe(&record, &state);
                    history.push(record);
                    applied = true;
                    break;
                }
                Err(err) => {
                    tracing::warn!(
                        "{} proposed {} for unit {} (attempt {}): {}",
                        agent.name(),
                        mv,
                        id,
                        attempt,
                        err
                    );
                }
            }
        }
        if !applied {
            tracing::warn!("unit {} skips turn {}", id, turns);
            state.advance_turn();
        }
    }

    let result = match state.result() {
        GameResult::Ongoing => GameResult::Draw,
        finished => finished,
    };
    tracing::info!("Game over after {} turns: {:?}", turns, result);

    Ok(GameRecord {
        result,
        turns,
        history,
        final_state: state,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::board::{Point, Square};
    use crate::combat::{DiceResolver, FixedResolver, RollOutcome};
    use crate::setup::ArmySetup;
    use crate::units::{Archetype, Catalog, Spell};

    fn catalog() -> Arc<Catalog> {
        let warrior = Archetype {
            name: "Warrior".into(),
            max_health: 30,
            armor_class: 10,
            weapon_class: 2,
            attack_damage: 8,
            speed: 2,
            spells: vec![],
        };
        let mage = Archetype {
            name: "Mage".into(),
            max_health: 20,
            armor_class: 8,
            weapon_class: 0,
            attack_damage: 3,
            speed: 2,
            spells: vec!["Fireball".into()],
        };
        let fireball = Spell {
            name: "Fireball".into(),
            damage: 10,
            range: 4,
        };
        Arc::new(Catalog::new(vec![warrior, mage], vec![fireball]))
    }

    fn adjacent(first: UnitId) -> GameState<Square> {
        let order = if first == 1 { vec![1, 2] } else { vec![2, 1] };
        GameState::new(
            6,
            6,
            catalog(),
            &[
                (1, Player::One, "Warrior", Point::new(2, 2)),
                (2, Player::Two, "Warrior", Point::new(2, 3)),
            ],
            order,
        )
        .unwrap()
    }

    fn skirmish(seed: u64) -> GameState<Square> {
        let setup = ArmySetup::mirrored(["Warrior", "Mage"]);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        setup.build(4, 3, catalog(), &mut rng).unwrap()
    }

    /// Always proposes a move off the board
    struct Stubborn;

    impl Agent<Square> for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }

        fn choose(&mut self, _state: &GameState<Square>) -> Option<GameMove> {
            Some(GameMove::Move { to: Point::new(99, 99) })
        }
    }

    #[test]
    fn test_expectimax_attacks_for_either_side() {
        let mut ai = ExpectimaxAI::new(1);
        assert_eq!(
            ai.best_move(&adjacent(1)),
            Some(GameMove::Attack { target: Point::new(2, 3) })
        );
        assert_eq!(
            ai.best_move(&adjacent(2)),
            Some(GameMove::Attack { target: Point::new(2, 2) })
        );
        assert!(ai.stats().nodes > 1);
    }

    #[test]
    fn test_teammates_acting_back_to_back() {
        // Unit 1 cannot reach anyone; unit 3 acts next and stands beside unit 2
        let state = GameState::<Square>::new(
            6,
            6,
            catalog(),
            &[
                (1, Player::One, "Warrior", Point::new(0, 0)),
                (2, Player::Two, "Warrior", Point::new(5, 5)),
                (3, Player::One, "Warrior", Point::new(5, 4)),
            ],
            vec![1, 3, 2],
        )
        .unwrap();
        assert_eq!(evaluate(&state), 240.0);

        // Unit 3 attacks: 0.35 miss, 0.6 hit for 8, 0.05 crit for 16
        let mut solver = Solver::new(evaluate::<Square> as Heuristic<Square>);
        let (value, _) = solver.solve(&state, 2, true);
        assert!((value - 284.8).abs() < 1e-9, "got {}", value);
    }

    #[test]
    fn test_greedy_attacks() {
        let mut ai = GreedyAI;
        assert_eq!(
            Agent::<Square>::choose(&mut ai, &adjacent(1)),
            Some(GameMove::Attack { target: Point::new(2, 3) })
        );
    }

    #[test]
    fn test_random_is_seeded_and_legal() {
        let state = skirmish(3);
        let mut a = RandomAI::new(11);
        let mut b = RandomAI::new(11);
        for _ in 0..10 {
            let mv = Agent::<Square>::choose(&mut a, &state).unwrap();
            assert_eq!(Some(mv.clone()), Agent::<Square>::choose(&mut b, &state));
            assert!(state.legal_moves().contains(&mv));
        }
    }

    #[test]
    fn test_no_moves_when_finished() {
        let mut state = adjacent(1);
        state.set_health(2, 0).unwrap();
        assert!(ExpectimaxAI::new(2).best_move(&state).is_none());
        assert!(Agent::<Square>::choose(&mut GreedyAI, &state).is_none());
    }

    #[test]
    fn test_play_game_reaches_an_end() {
        let mut one = GreedyAI;
        let mut two = RandomAI::new(5);
        let mut dice = DiceResolver::seeded(5);
        let record = play_game(skirmish(1), &mut one, &mut two, &mut dice, 400).unwrap();

        let GameResult::Won(player) = record.result else {
            panic!("expected a winner, got {:?}", record.result);
        };
        assert_eq!(record.final_state.winner(), Some(player));
        assert_eq!(record.history.len() as u32, record.turns);
    }

    #[test]
    fn test_play_game_is_reproducible() {
        let run = || {
            let mut one = ExpectimaxAI::new(1);
            let mut two = GreedyAI;
            let mut dice = DiceResolver::seeded(21);
            let record = play_game(skirmish(8), &mut one, &mut two, &mut dice, 60).unwrap();
            (record.result, record.turns, record.final_state.fingerprint())
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_observer_sees_every_move() {
        let mut one = GreedyAI;
        let mut two = GreedyAI;
        let mut dice = DiceResolver::seeded(4);
        let mut seen = Vec::new();
        let record = play_game_observed(skirmish(6), &mut one, &mut two, &mut dice, 30, |turn, state| {
            seen.push((turn.turn, state.fingerprint()));
        })
        .unwrap();
        assert_eq!(seen.len(), record.history.len());
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_turn_cap_is_a_draw() {
        let mut one = GreedyAI;
        let mut two = GreedyAI;
        let mut dice = DiceResolver::seeded(0);
        let start = skirmish(2);
        let record = play_game(start.clone(), &mut one, &mut two, &mut dice, 0).unwrap();
        assert_eq!(record.result, GameResult::Draw);
        assert_eq!(record.turns, 0);
        assert_eq!(record.final_state.fingerprint(), start.fingerprint());
    }

    #[test]
    fn test_rejected_agent_forfeits_turn() {
        let mut one = Stubborn;
        let mut two = Stubborn;
        let mut dice = FixedResolver(RollOutcome::Hit);
        let record = play_game(adjacent(1), &mut one, &mut two, &mut dice, 4).unwrap();
        assert!(record.history.is_empty());
        assert_eq!(record.turns, 4);
        assert_eq!(record.result, GameResult::Draw);
        assert_eq!(record.final_state.unit(2).unwrap().health, 30);
    }
}
