//! Expectimax with alpha-beta pruning and a transposition table
//!
//! The solver is generic over any game that can list its moves and expand a
//! move into weighted successor states. Deterministic moves have a single
//! successor with probability 1.0; chance moves have several.

use rustc_hash::FxHashMap;

// ============================================================================
// SEARCHABLE STATES
// ============================================================================

/// A game position the solver can explore
pub trait SearchState: Sized {
    type Move: Clone;

    fn is_terminal(&self) -> bool;

    fn legal_moves(&self) -> Vec<Self::Move>;

    /// Successors of a move with their probabilities (summing to 1.0).
    ///
    /// An empty list marks a move the state refused; the solver skips it.
    fn apply_with_branching(&self, mv: &Self::Move) -> Vec<(Self, f64)>;

    /// Structural hash used as the table key
    fn fingerprint(&self) -> u64;

    /// Whether the side to move is the maximizer.
    ///
    /// `None` means sides strictly alternate every ply.
    fn maximizing(&self) -> Option<bool> {
        None
    }
}

// ============================================================================
// TRANSPOSITION TABLE
// ============================================================================

/// How a stored value relates to the true value of the node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    Exact,
    /// True value is at least `value` (search failed high)
    Lower,
    /// True value is at most `value` (search failed low)
    Upper,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entry<M> {
    pub value: f64,
    pub bound: Bound,
    pub best: Option<M>,
}

impl<M> Entry<M> {
    pub fn exact(value: f64, best: Option<M>) -> Self {
        Self {
            value,
            bound: Bound::Exact,
            best,
        }
    }

    /// Whether this entry settles a node searched with `(alpha, beta)`
    fn settles(&self, alpha: f64, beta: f64) -> bool {
        match self.bound {
            Bound::Exact => true,
            Bound::Lower => self.value >= beta,
            Bound::Upper => self.value <= alpha,
        }
    }
}

/// Cache keyed by (fingerprint, remaining depth, maximizing side)
#[derive(Clone, Debug)]
pub struct TranspositionTable<M> {
    entries: FxHashMap<(u64, u32, bool), Entry<M>>,
}

impl<M> Default for TranspositionTable<M> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<M> TranspositionTable<M> {
    pub fn get(&self, fingerprint: u64, depth: u32, maximizing: bool) -> Option<&Entry<M>> {
        self.entries.get(&(fingerprint, depth, maximizing))
    }

    pub fn insert(&mut self, fingerprint: u64, depth: u32, maximizing: bool, entry: Entry<M>) {
        self.entries.insert((fingerprint, depth, maximizing), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// SOLVER
// ============================================================================

/// Counters for the most recent solve
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes: u64,
    pub table_hits: u64,
    pub cutoffs: u64,
}

impl SearchStats {
    #[cfg(feature = "parallel")]
    fn absorb(&mut self, other: SearchStats) {
        self.nodes += other.nodes;
        self.table_hits += other.table_hits;
        self.cutoffs += other.cutoffs;
    }
}

/// Expectimax solver; the heuristic scores states from the maximizer's view
pub struct Solver<S: SearchState, H> {
    heuristic: H,
    table: TranspositionTable<S::Move>,
    stats: SearchStats,
}

impl<S, H> Solver<S, H>
where
    S: SearchState,
    H: Fn(&S) -> f64,
{
    pub fn new(heuristic: H) -> Self {
        Self {
            heuristic,
            table: TranspositionTable::default(),
            stats: SearchStats::default(),
        }
    }

    pub fn table(&self) -> &TranspositionTable<S::Move> {
        &self.table
    }

    /// Direct table access, e.g. to seed or inspect entries
    pub fn table_mut(&mut self) -> &mut TranspositionTable<S::Move> {
        &mut self.table
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Best expected value and the move achieving it.
    ///
    /// The table persists across calls; `None` means no move was searched.
    pub fn solve(&mut self, state: &S, depth: u32, maximizing: bool) -> (f64, Option<S::Move>) {
        self.stats = SearchStats::default();
        let result = self.search(state, depth, f64::NEG_INFINITY, f64::INFINITY, maximizing);
        tracing::debug!(
            "solve depth {}: value {:.2}, {} nodes, {} table hits, {} cutoffs, {} entries",
            depth,
            result.0,
            self.stats.nodes,
            self.stats.table_hits,
            self.stats.cutoffs,
            self.table.len()
        );
        result
    }

    fn search(
        &mut self,
        state: &S,
        depth: u32,
        mut alpha: f64,
        mut beta: f64,
        maximizing: bool,
    ) -> (f64, Option<S::Move>) {
        self.stats.nodes += 1;
        let maximizing = state.maximizing().unwrap_or(maximizing);

        let key = state.fingerprint();
        if let Some(entry) = self.table.get(key, depth, maximizing) {
            if entry.settles(alpha, beta) {
                self.stats.table_hits += 1;
                return (entry.value, entry.best.clone());
            }
        }

        if depth == 0 || state.is_terminal() {
            return ((self.heuristic)(state), None);
        }

        let (alpha_in, beta_in) = (alpha, beta);
        let mut best_value = if maximizing {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
        let mut best_move = None;

        for mv in state.legal_moves() {
            let Some(expected) = self.expected_value(state, &mv, depth - 1, alpha, beta, !maximizing) else {
                continue;
            };

            let improves = if maximizing {
                expected > best_value
            } else {
                expected < best_value
            };
            if improves || best_move.is_none() {
                best_value = expected;
                best_move = Some(mv);
            }

            if maximizing {
                alpha = alpha.max(best_value);
            } else {
                beta = beta.min(best_value);
            }
            if beta <= alpha {
                self.stats.cutoffs += 1;
                break;
            }
        }

        if best_move.is_none() {
            return ((self.heuristic)(state), None);
        }

        let bound = if best_value <= alpha_in {
            Bound::Upper
        } else if best_value >= beta_in {
            Bound::Lower
        } else {
            Bound::Exact
        };
        self.table.insert(
            key,
            depth,
            maximizing,
            Entry {
                value: best_value,
                bound,
                best: best_move.clone(),
            },
        );
        (best_value, best_move)
    }

    /// Probability-weighted value of one move; `None` if the move was refused
    fn expected_value(
        &mut self,
        state: &S,
        mv: &S::Move,
        depth: u32,
        alpha: f64,
        beta: f64,
        maximizing: bool,
    ) -> Option<f64> {
        let branches = state.apply_with_branching(mv);
        if branches.is_empty() {
            return None;
        }

        // Bounds on individual outcomes say nothing exact about their average
        let (alpha, beta) = if branches.len() > 1 {
            (f64::NEG_INFINITY, f64::INFINITY)
        } else {
            (alpha, beta)
        };

        let mut total = 0.0;
        for (child, probability) in &branches {
            let (value, _) = self.search(child, depth, alpha, beta, maximizing);
            total += probability * value;
        }
        Some(total)
    }
}

// ============================================================================
// ROOT-PARALLEL SOLVE
// ============================================================================

#[cfg(feature = "parallel")]
impl<S, H> Solver<S, H>
where
    S: SearchState + Sync,
    S::Move: Send + Sync,
    H: Fn(&S) -> f64 + Sync,
{
    /// Solve with one rayon task per top-level move.
    ///
    /// Each task owns a private table; this solver's table is left untouched.
    pub fn solve_parallel(&mut self, state: &S, depth: u32, maximizing: bool) -> (f64, Option<S::Move>) {
        use rayon::prelude::*;

        self.stats = SearchStats::default();
        if depth == 0 || state.is_terminal() {
            return ((self.heuristic)(state), None);
        }

        let maximizing = state.maximizing().unwrap_or(maximizing);
        let heuristic = &self.heuristic;
        let moves = state.legal_moves();
        let scored: Vec<Option<(f64, SearchStats)>> = moves
            .par_iter()
            .map(|mv| {
                let mut worker: Solver<S, &H> = Solver::new(heuristic);
                let value = worker.expected_value(
                    state,
                    mv,
                    depth - 1,
                    f64::NEG_INFINITY,
                    f64::INFINITY,
                    !maximizing,
                )?;
                Some((value, worker.stats))
            })
            .collect();

        let mut best: Option<(f64, &S::Move)> = None;
        for (mv, result) in moves.iter().zip(scored) {
            let Some((value, stats)) = result else {
                continue;
            };
            self.stats.absorb(stats);
            let improves = match best {
                None => true,
                Some((current, _)) if maximizing => value > current,
                Some((current, _)) => value < current,
            };
            if improves {
                best = Some((value, mv));
            }
        }

        match best {
            Some((value, mv)) => (value, Some(mv.clone())),
            None => ((self.heuristic)(state), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHasher;
    use std::hash::{Hash, Hasher};

    /// Take one or two tokens; whoever takes the last token wins
    #[derive(Clone, Debug)]
    struct Nim {
        tokens: u32,
        max_to_move: bool,
    }

    impl SearchState for Nim {
        type Move = u32;

        fn is_terminal(&self) -> bool {
            self.tokens == 0
        }

        fn legal_moves(&self) -> Vec<u32> {
            (1..=2).filter(|&take| take <= self.tokens).collect()
        }

        fn apply_with_branching(&self, take: &u32) -> Vec<(Self, f64)> {
            let next = Nim {
                tokens: self.tokens - take,
                max_to_move: !self.max_to_move,
            };
            vec![(next, 1.0)]
        }

        fn fingerprint(&self) -> u64 {
            (u64::from(self.tokens) << 1) | u64::from(self.max_to_move)
        }
    }

    fn nim_heuristic(state: &Nim) -> f64 {
        match (state.is_terminal(), state.max_to_move) {
            (false, _) => 0.0,
            (true, true) => -1000.0,
            (true, false) => 1000.0,
        }
    }

    fn nim(tokens: u32) -> Nim {
        Nim {
            tokens,
            max_to_move: true,
        }
    }

    /// Flip a coin per move: +10 or -5, even odds
    #[derive(Clone, Debug)]
    struct CoinFlip {
        score: i32,
        flips_left: u32,
    }

    impl SearchState for CoinFlip {
        type Move = &'static str;

        fn is_terminal(&self) -> bool {
            self.flips_left == 0
        }

        fn legal_moves(&self) -> Vec<&'static str> {
            if self.flips_left > 0 {
                vec!["flip"]
            } else {
                vec![]
            }
        }

        fn apply_with_branching(&self, _mv: &&'static str) -> Vec<(Self, f64)> {
            let flips_left = self.flips_left - 1;
            vec![
                (CoinFlip { score: self.score + 10, flips_left }, 0.5),
                (CoinFlip { score: self.score - 5, flips_left }, 0.5),
            ]
        }

        fn fingerprint(&self) -> u64 {
            ((self.score as i64 as u64) << 8) | u64::from(self.flips_left)
        }
    }

    /// Two-sided race: a safe step or a gamble, for checking pruning against
    /// a plain expectimax
    #[derive(Clone, Debug)]
    struct Race {
        lead: i32,
        max_to_move: bool,
        turns_left: u32,
        odds: f64,
    }

    impl SearchState for Race {
        type Move = u8;

        fn is_terminal(&self) -> bool {
            self.turns_left == 0 || self.lead.abs() >= 6
        }

        fn legal_moves(&self) -> Vec<u8> {
            vec![0, 1, 2]
        }

        fn apply_with_branching(&self, mv: &u8) -> Vec<(Self, f64)> {
            let sign = if self.max_to_move { 1 } else { -1 };
            let step = |delta: i32| Race {
                lead: self.lead + sign * delta,
                max_to_move: !self.max_to_move,
                turns_left: self.turns_left - 1,
                odds: self.odds,
            };
            match mv {
                0 => vec![(step(1), 1.0)],
                1 => vec![(step(3), self.odds), (step(-2), 1.0 - self.odds)],
                _ => vec![(step(4), 0.25), (step(0), 0.5), (step(-3), 0.25)],
            }
        }

        fn fingerprint(&self) -> u64 {
            let mut hasher = FxHasher::default();
            (self.lead, self.turns_left, self.max_to_move, self.odds.to_bits()).hash(&mut hasher);
            hasher.finish()
        }
    }

    fn race_heuristic(state: &Race) -> f64 {
        f64::from(state.lead)
    }

    fn plain_expectimax(state: &Race, depth: u32, maximizing: bool) -> f64 {
        if depth == 0 || state.is_terminal() {
            return race_heuristic(state);
        }
        let values = state.legal_moves().into_iter().map(|mv| {
            state
                .apply_with_branching(&mv)
                .iter()
                .map(|(child, p)| p * plain_expectimax(child, depth - 1, !maximizing))
                .sum::<f64>()
        });
        if maximizing {
            values.fold(f64::NEG_INFINITY, f64::max)
        } else {
            values.fold(f64::INFINITY, f64::min)
        }
    }

    /// Each mover adds +1 or -1 to a running total; `schedule[i]` says
    /// whether the maximizer makes move `i`
    #[derive(Clone, Debug)]
    struct Relay {
        total: i32,
        schedule: &'static [bool],
        played: usize,
    }

    impl SearchState for Relay {
        type Move = i32;

        fn is_terminal(&self) -> bool {
            self.played == self.schedule.len()
        }

        fn legal_moves(&self) -> Vec<i32> {
            vec![-1, 1]
        }

        fn apply_with_branching(&self, delta: &i32) -> Vec<(Self, f64)> {
            let next = Relay {
                total: self.total + delta,
                schedule: self.schedule,
                played: self.played + 1,
            };
            vec![(next, 1.0)]
        }

        fn fingerprint(&self) -> u64 {
            let mut hasher = FxHasher::default();
            (self.total, self.played, self.schedule).hash(&mut hasher);
            hasher.finish()
        }

        fn maximizing(&self) -> Option<bool> {
            self.schedule.get(self.played).copied()
        }
    }

    #[test]
    fn test_nim_win_in_one() {
        let mut solver = Solver::new(nim_heuristic);
        assert_eq!(solver.solve(&nim(1), 10, true), (1000.0, Some(1)));
    }

    #[test]
    fn test_nim_win_in_two() {
        let mut solver = Solver::new(nim_heuristic);
        assert_eq!(solver.solve(&nim(2), 10, true), (1000.0, Some(2)));
    }

    #[test]
    fn test_nim_lost_position() {
        let mut solver = Solver::new(nim_heuristic);
        let (score, _) = solver.solve(&nim(3), 10, true);
        assert_eq!(score, -1000.0);
    }

    #[test]
    fn test_nim_four_tokens() {
        let mut solver = Solver::new(nim_heuristic);
        assert_eq!(solver.solve(&nim(4), 10, true), (1000.0, Some(1)));
    }

    #[test]
    fn test_depth_zero_uses_heuristic() {
        let mut solver = Solver::new(nim_heuristic);
        assert_eq!(solver.solve(&nim(4), 0, true), (0.0, None));
    }

    #[test]
    fn test_table_poisoning_is_observed() {
        let start = nim(5);
        let mut solver = Solver::new(nim_heuristic);
        let (first, _) = solver.solve(&start, 10, true);
        assert_eq!(first, 1000.0);
        assert!(!solver.table().is_empty());

        let root = solver.table().get(start.fingerprint(), 10, true).unwrap();
        assert_eq!(root.bound, Bound::Exact);

        solver
            .table_mut()
            .insert(start.fingerprint(), 10, true, Entry::exact(999_999.0, Some(2)));
        let (second, best) = solver.solve(&start, 10, true);
        assert_eq!(second, 999_999.0);
        assert_eq!(best, Some(2));
        assert_eq!(solver.stats().table_hits, 1);
    }

    #[test]
    fn test_coin_flip_expected_value() {
        let mut solver = Solver::new(|s: &CoinFlip| f64::from(s.score));
        let (score, mv) = solver.solve(&CoinFlip { score: 0, flips_left: 1 }, 10, true);
        assert_eq!(mv, Some("flip"));
        assert!((score - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_coin_flip_multiple_flips() {
        let mut solver = Solver::new(|s: &CoinFlip| f64::from(s.score));
        let (score, mv) = solver.solve(&CoinFlip { score: 0, flips_left: 2 }, 10, true);
        assert_eq!(mv, Some("flip"));
        assert!((score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_pruning_matches_plain_expectimax() {
        for odds in [0.2, 0.5, 0.7] {
            for lead in -2..=2 {
                for depth in 1..=5 {
                    let start = Race {
                        lead,
                        max_to_move: true,
                        turns_left: 6,
                        odds,
                    };
                    let mut solver = Solver::new(race_heuristic);
                    let (value, _) = solver.solve(&start, depth, true);
                    let expected = plain_expectimax(&start, depth, true);
                    assert!(
                        (value - expected).abs() < 1e-9,
                        "odds {} lead {} depth {}: {} != {}",
                        odds,
                        lead,
                        depth,
                        value,
                        expected
                    );
                }
            }
        }
    }

    #[test]
    fn test_warm_table_gives_same_answer() {
        let start = Race {
            lead: 0,
            max_to_move: true,
            turns_left: 6,
            odds: 0.4,
        };
        let mut solver = Solver::new(race_heuristic);
        let cold = solver.solve(&start, 4, true);
        let warm = solver.solve(&start, 4, true);
        assert_eq!(cold, warm);

        // Shallower searches reuse deeper entries' subtrees without corrupting them
        let shallow = solver.solve(&start, 2, true).0;
        assert!((shallow - plain_expectimax(&start, 2, true)).abs() < 1e-9);
    }

    #[test]
    fn test_shared_table_across_odds() {
        let mut solver = Solver::new(race_heuristic);
        for odds in [0.2, 0.5, 0.7] {
            let start = Race {
                lead: 0,
                max_to_move: true,
                turns_left: 6,
                odds,
            };
            let (value, _) = solver.solve(&start, 4, true);
            assert!((value - plain_expectimax(&start, 4, true)).abs() < 1e-9, "odds {}", odds);
        }
    }

    #[test]
    fn test_side_to_move_comes_from_state() {
        // Maximizer moves twice, then the minimizer once
        let start = Relay {
            total: 0,
            schedule: &[true, true, false],
            played: 0,
        };
        let mut solver = Solver::new(|s: &Relay| f64::from(s.total));
        assert_eq!(solver.solve(&start, 3, true), (1.0, Some(1)));

        let back_to_back = Relay {
            total: 0,
            schedule: &[false, false],
            played: 0,
        };
        // The root hint is overridden by the state itself
        assert_eq!(solver.solve(&back_to_back, 2, true), (-2.0, Some(-1)));
    }

    #[test]
    fn test_solve_is_deterministic() {
        let start = Race {
            lead: 1,
            max_to_move: false,
            turns_left: 5,
            odds: 0.6,
        };
        let a = Solver::new(race_heuristic).solve(&start, 4, false);
        let b = Solver::new(race_heuristic).solve(&start, 4, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_stats_are_collected() {
        let mut solver = Solver::new(nim_heuristic);
        solver.solve(&nim(6), 10, true);
        let stats = solver.stats();
        assert!(stats.nodes > 1);
        assert!(stats.cutoffs > 0);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_serial() {
        let start = Race {
            lead: 0,
            max_to_move: true,
            turns_left: 6,
            odds: 0.3,
        };
        let serial = Solver::new(race_heuristic).solve(&start, 4, true);
        let parallel = Solver::new(race_heuristic).solve_parallel(&start, 4, true);
        assert!((serial.0 - parallel.0).abs() < 1e-9);
        assert_eq!(serial.1, parallel.1);
    }
}
