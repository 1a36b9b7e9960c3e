//! Game state, move legality and resolution

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::{Grid, GridError, Hex, Point, Topology};
use crate::combat::{FixedResolver, Resolver, Roll, RollOutcome};
use crate::search::SearchState;
use crate::units::{Catalog, Player, UnitId, UnitState, UnitStatus};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Weapon class penalty for attacking at the end of a charge
pub const CHARGE_PENALTY: i32 = 4;

/// Extra difficulty per cell a spell is cast beyond its range
pub const OVERRANGE_FACTOR: i32 = 4;

/// Probability mass tolerance for branching
const PROBABILITY_EPSILON: f64 = 1e-9;

// ============================================================================
// CORE TYPES
// ============================================================================

/// One action for the unit whose turn it is
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameMove {
    Move { to: Point },
    Attack { target: Point },
    Charge { target: Point },
    CastSpell { target: Point, spell: String },
}

impl fmt::Display for GameMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMove::Move { to } => write!(f, "move {}", to),
            GameMove::Attack { target } => write!(f, "attack {}", target),
            GameMove::Charge { target } => write!(f, "charge {}", target),
            GameMove::CastSpell { target, spell } => write!(f, "cast {} at {}", spell, target),
        }
    }
}

/// Game result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Ongoing,
    Won(Player),
    /// Both sides wiped out, or a game stopped at the turn cap
    Draw,
}

/// Rejected moves and broken state lookups
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("no active unit")]
    NoActiveUnit,
    #[error("unit {0} does not exist")]
    UnknownUnit(UnitId),
    #[error("unknown archetype {0:?}")]
    UnknownArchetype(String),
    #[error("cell {0} is already occupied")]
    Occupied(Point),
    #[error("unit {0} is placed twice")]
    DuplicateUnit(UnitId),
    #[error("game is already over")]
    GameOver,
    #[error("unit {unit} cannot move to {to}")]
    InvalidDestination { unit: UnitId, to: Point },
    #[error("no unit at {0}")]
    NoTarget(Point),
    #[error("unit {unit} cannot target its own side at {target}")]
    FriendlyTarget { unit: UnitId, target: Point },
    #[error("target {target} is {distance} cells away")]
    OutOfRange { target: Point, distance: u32 },
    #[error("unit {unit} does not know spell {spell:?}")]
    UnknownSpell { unit: UnitId, spell: String },
    #[error("unit {unit} has no charge path to {target}")]
    NoChargePath { unit: UnitId, target: Point },
}

/// What a move did, for logs and replays
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub unit: UnitId,
    /// Cell the acting unit ended on, when it moved
    pub moved_to: Option<Point>,
    pub strike: Option<StrikeReport>,
}

/// Outcome of an attack roll against one target
#[derive(Clone, Debug, PartialEq)]
pub struct StrikeReport {
    pub target: UnitId,
    pub roll: Roll,
    pub damage: i32,
    pub killed: bool,
}

/// A validated move, ready to commit
#[derive(Clone, Copy, Debug)]
enum Action {
    Relocate { unit: UnitId, to: Point },
    Strike(Strike),
}

#[derive(Clone, Copy, Debug)]
struct Strike {
    attacker: UnitId,
    /// Cell reached by a charge before the lunge
    approach: Option<Point>,
    target: UnitId,
    bonus: i32,
    difficulty: i32,
    damage: i32,
}

/// Difficulty of landing a spell at some distance
pub fn spell_difficulty(distance: u32, range: u32) -> i32 {
    let distance = i32::try_from(distance).unwrap_or(i32::MAX / 2);
    let range = i32::try_from(range).unwrap_or(i32::MAX / 2);
    if distance <= range {
        distance
    } else {
        distance + (distance - range) * OVERRANGE_FACTOR
    }
}

// ============================================================================
// GAME STATE
// ============================================================================

/// Game state (clone to branch)
#[derive(Clone, Debug)]
pub struct GameState<T: Topology = Hex> {
    grid: Grid<T>,
    units: BTreeMap<UnitId, UnitState>,
    turn_order: Arc<[UnitId]>,
    cursor: usize,
    catalog: Arc<Catalog>,
}

impl<T: Topology> GameState<T> {
    // ========================================================================
    // CONSTRUCTORS
    // ========================================================================

    /// Create a game from `(id, owner, archetype name, position)` placements.
    ///
    /// The first unit in `turn_order` acts first.
    pub fn new(
        width: u32,
        height: u32,
        catalog: Arc<Catalog>,
        placements: &[(UnitId, Player, &str, Point)],
        turn_order: Vec<UnitId>,
    ) -> Result<Self, GameError> {
        let mut grid = Grid::new(width, height);
        let mut units = BTreeMap::new();

        for &(id, owner, name, position) in placements {
            let archetype = catalog
                .archetype(name)
                .ok_or_else(|| GameError::UnknownArchetype(name.to_string()))?;
            if units.contains_key(&id) {
                return Err(GameError::DuplicateUnit(id));
            }
            if grid.is_occupied(position) {
                return Err(GameError::Occupied(position));
            }
            grid.place(position, id)?;
            units.insert(id, UnitState::new(id, owner, Arc::clone(archetype), position));
        }

        if let Some(&missing) = turn_order.iter().find(|id| !units.contains_key(*id)) {
            return Err(GameError::UnknownUnit(missing));
        }

        Ok(Self {
            grid,
            units,
            turn_order: turn_order.into(),
            cursor: 0,
            catalog,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn grid(&self) -> &Grid<T> {
        &self.grid
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn turn_order(&self) -> &[UnitId] {
        &self.turn_order
    }

    pub fn unit(&self, id: UnitId) -> Option<&UnitState> {
        self.units.get(&id)
    }

    /// Every unit record, living or dead, by id
    pub fn units(&self) -> impl Iterator<Item = &UnitState> + '_ {
        self.units.values()
    }

    /// Living units of one player, by id
    pub fn living(&self, player: Player) -> impl Iterator<Item = &UnitState> + '_ {
        self.units
            .values()
            .filter(move |u| u.owner == player && u.is_alive())
    }

    /// Unit at the turn cursor
    pub fn current_unit(&self) -> Result<&UnitState, GameError> {
        let id = *self
            .turn_order
            .get(self.cursor)
            .ok_or(GameError::NoActiveUnit)?;
        self.units.get(&id).ok_or(GameError::UnknownUnit(id))
    }

    /// Owner of the unit at the turn cursor
    pub fn current_player(&self) -> Result<Player, GameError> {
        self.current_unit().map(|u| u.owner)
    }

    pub fn is_terminal(&self) -> bool {
        self.living(Player::One).next().is_none() || self.living(Player::Two).next().is_none()
    }

    pub fn result(&self) -> GameResult {
        let one = self.living(Player::One).next().is_some();
        let two = self.living(Player::Two).next().is_some();
        match (one, two) {
            (true, true) => GameResult::Ongoing,
            (true, false) => GameResult::Won(Player::One),
            (false, true) => GameResult::Won(Player::Two),
            (false, false) => GameResult::Draw,
        }
    }

    pub fn winner(&self) -> Option<Player> {
        match self.result() {
            GameResult::Won(player) => Some(player),
            _ => None,
        }
    }

    // ========================================================================
    // TURN ORDER
    // ========================================================================

    /// Step the cursor to the next living unit, stopping after a full cycle
    pub fn advance_turn(&mut self) {
        let len = self.turn_order.len();
        if len == 0 {
            return;
        }
        let start = self.cursor;
        loop {
            self.cursor = (self.cursor + 1) % len;
            let alive = self
                .units
                .get(&self.turn_order[self.cursor])
                .is_some_and(UnitState::is_alive);
            if alive || self.cursor == start {
                break;
            }
        }
    }

    // ========================================================================
    // MOVE GENERATION
    // ========================================================================

    /// In bounds, empty or held by `unit`, and within `max_distance`
    pub fn is_valid_destination(&self, unit: &UnitState, target: Point, max_distance: u32) -> bool {
        let Some(from) = unit.position() else {
            return false;
        };
        self.grid.contains(target)
            && self.grid.occupant_at(target).map_or(true, |id| id == unit.id)
            && T::distance(from, target) <= max_distance
    }

    /// All legal moves for the current unit
    pub fn legal_moves(&self) -> Vec<GameMove> {
        if self.is_terminal() {
            return vec![];
        }
        let Ok(unit) = self.current_unit() else {
            return vec![];
        };
        let Some(from) = unit.position() else {
            return vec![];
        };

        let mut moves = Vec::new();
        self.generate_relocations(unit, from, &mut moves);

        let enemies: Vec<Point> = self
            .living(unit.owner.opponent())
            .filter_map(UnitState::position)
            .collect();

        for &target in &enemies {
            if T::distance(from, target) <= 1 {
                moves.push(GameMove::Attack { target });
            }
        }
        for &target in &enemies {
            if self.charge_path(unit, from, target).is_some() {
                moves.push(GameMove::Charge { target });
            }
        }
        for spell in &unit.archetype.spells {
            if self.catalog.spell(spell).is_none() {
                continue;
            }
            for &target in &enemies {
                moves.push(GameMove::CastSpell {
                    target,
                    spell: spell.clone(),
                });
            }
        }
        moves
    }

    fn generate_relocations(&self, unit: &UnitState, from: Point, moves: &mut Vec<GameMove>) {
        let budget = unit.archetype.speed.saturating_mul(2);
        if T::PATH_AWARE {
            moves.extend(
                self.grid
                    .reachable_within(from, budget)
                    .into_iter()
                    .map(|to| GameMove::Move { to }),
            );
            return;
        }
        for y in 0..self.grid.height() {
            for x in 0..self.grid.width() {
                let to = Point::new(x, y);
                if self.is_valid_destination(unit, to, budget) {
                    moves.push(GameMove::Move { to });
                }
            }
        }
    }

    /// Path to a cell next to `target`, short enough for the unit's speed
    fn charge_path(&self, unit: &UnitState, from: Point, target: Point) -> Option<Vec<Point>> {
        let path = self.grid.find_path_adjacent(from, target)?;
        let limit = usize::try_from(unit.archetype.speed).unwrap_or(usize::MAX);
        (path.len() <= limit).then_some(path)
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    fn plan(&self, mv: &GameMove) -> Result<Action, GameError> {
        if self.is_terminal() {
            return Err(GameError::GameOver);
        }
        let unit = self.current_unit()?;
        let from = unit.position().ok_or(GameError::NoActiveUnit)?;

        match mv {
            GameMove::Move { to } => {
                let budget = unit.archetype.speed.saturating_mul(2);
                let invalid = GameError::InvalidDestination { unit: unit.id, to: *to };
                if !self.is_valid_destination(unit, *to, budget) {
                    return Err(invalid);
                }
                if T::PATH_AWARE {
                    let steps = self.grid.find_path(from, *to).map(|p| p.len() - 1);
                    let limit = usize::try_from(budget).unwrap_or(usize::MAX);
                    if !steps.is_some_and(|s| s <= limit) {
                        return Err(invalid);
                    }
                }
                Ok(Action::Relocate { unit: unit.id, to: *to })
            }

            GameMove::Attack { target } => {
                let victim = self.enemy_at(unit, *target)?;
                let distance = T::distance(from, *target);
                if distance > 1 {
                    return Err(GameError::OutOfRange {
                        target: *target,
                        distance,
                    });
                }
                Ok(Action::Strike(Strike {
                    attacker: unit.id,
                    approach: None,
                    target: victim.id,
                    bonus: unit.archetype.weapon_class,
                    difficulty: victim.archetype.armor_class,
                    damage: unit.archetype.attack_damage,
                }))
            }

            GameMove::Charge { target } => {
                let victim = self.enemy_at(unit, *target)?;
                let path = self
                    .charge_path(unit, from, *target)
                    .ok_or(GameError::NoChargePath {
                        unit: unit.id,
                        target: *target,
                    })?;
                let end = path.last().copied().unwrap_or(from);
                Ok(Action::Strike(Strike {
                    attacker: unit.id,
                    approach: (end != from).then_some(end),
                    target: victim.id,
                    bonus: unit.archetype.weapon_class - CHARGE_PENALTY,
                    difficulty: victim.archetype.armor_class,
                    damage: unit.archetype.attack_damage,
                }))
            }

            GameMove::CastSpell { target, spell } => {
                let unknown = || GameError::UnknownSpell {
                    unit: unit.id,
                    spell: spell.clone(),
                };
                if !unit.archetype.knows_spell(spell) {
                    return Err(unknown());
                }
                let definition = self.catalog.spell(spell).ok_or_else(unknown)?;
                let victim = self.enemy_at(unit, *target)?;
                Ok(Action::Strike(Strike {
                    attacker: unit.id,
                    approach: None,
                    target: victim.id,
                    bonus: 0,
                    difficulty: spell_difficulty(T::distance(from, *target), definition.range),
                    damage: definition.damage,
                }))
            }
        }
    }

    /// Living enemy of `unit` standing on `target`
    fn enemy_at(&self, unit: &UnitState, target: Point) -> Result<&UnitState, GameError> {
        let id = self.grid.occupant_at(target).ok_or(GameError::NoTarget(target))?;
        let victim = self.units.get(&id).ok_or(GameError::UnknownUnit(id))?;
        if victim.owner == unit.owner {
            return Err(GameError::FriendlyTarget {
                unit: unit.id,
                target,
            });
        }
        Ok(victim)
    }

    // ========================================================================
    // APPLY MOVE
    // ========================================================================

    /// Validate and resolve a move in place, then advance the turn.
    ///
    /// A rejected move leaves the state untouched.
    pub fn execute<R>(&mut self, mv: &GameMove, resolver: &mut R) -> Result<Resolution, GameError>
    where
        R: Resolver + ?Sized,
    {
        let action = self.plan(mv)?;
        let resolution = self.commit(action, resolver)?;
        tracing::debug!("unit {} resolved {}: {:?}", resolution.unit, mv, resolution.strike);
        Ok(resolution)
    }

    /// Apply move, return new state
    pub fn apply_move<R>(&self, mv: &GameMove, resolver: &mut R) -> Result<Self, GameError>
    where
        R: Resolver + ?Sized,
    {
        let mut next = self.clone();
        next.execute(mv, resolver)?;
        Ok(next)
    }

    /// Every successor of a move with its probability
    pub fn apply_with_branching(&self, mv: &GameMove) -> Result<Vec<(Self, f64)>, GameError> {
        let action = self.plan(mv)?;
        let Action::Strike(strike) = action else {
            let mut next = self.clone();
            next.commit(action, &mut FixedResolver(RollOutcome::Hit))?;
            return Ok(vec![(next, 1.0)]);
        };

        let mut branches = Vec::with_capacity(RollOutcome::ALL.len());
        for outcome in RollOutcome::ALL {
            let probability = outcome.probability(strike.bonus, strike.difficulty);
            if probability <= 0.0 {
                continue;
            }
            let mut next = self.clone();
            next.commit(action, &mut FixedResolver(outcome))?;
            branches.push((next, probability));
        }

        let total: f64 = branches.iter().map(|(_, p)| p).sum();
        debug_assert!(
            (total - 1.0).abs() < PROBABILITY_EPSILON,
            "branch probabilities for {} sum to {}",
            mv,
            total
        );
        Ok(branches)
    }

    fn commit<R>(&mut self, action: Action, resolver: &mut R) -> Result<Resolution, GameError>
    where
        R: Resolver + ?Sized,
    {
        let resolution = match action {
            Action::Relocate { unit, to } => {
                self.relocate(unit, to)?;
                Resolution {
                    unit,
                    moved_to: Some(to),
                    strike: None,
                }
            }
            Action::Strike(strike) => {
                if let Some(cell) = strike.approach {
                    self.relocate(strike.attacker, cell)?;
                }
                let roll = resolver.roll(strike.bonus, strike.difficulty);
                let damage = strike.damage * roll.outcome.damage_multiplier();
                let killed = self.apply_damage(strike.target, damage)?;
                Resolution {
                    unit: strike.attacker,
                    moved_to: strike.approach,
                    strike: Some(StrikeReport {
                        target: strike.target,
                        roll,
                        damage,
                        killed,
                    }),
                }
            }
        };
        self.advance_turn();
        Ok(resolution)
    }

    fn relocate(&mut self, id: UnitId, to: Point) -> Result<(), GameError> {
        let unit = self.units.get_mut(&id).ok_or(GameError::UnknownUnit(id))?;
        self.grid.place(to, id)?;
        unit.status = UnitStatus::Alive(to);
        Ok(())
    }

    /// Overwrite a unit's health; zero or below removes it from the grid.
    ///
    /// Dead units stay dead.
    pub fn set_health(&mut self, id: UnitId, health: i32) -> Result<(), GameError> {
        let current = self.units.get(&id).ok_or(GameError::UnknownUnit(id))?.health;
        self.apply_damage(id, current - health)?;
        Ok(())
    }

    /// Subtract health; a unit at zero or below leaves the grid
    fn apply_damage(&mut self, id: UnitId, damage: i32) -> Result<bool, GameError> {
        let unit = self.units.get_mut(&id).ok_or(GameError::UnknownUnit(id))?;
        unit.health -= damage;
        if unit.health > 0 {
            return Ok(false);
        }
        if let UnitStatus::Alive(cell) = unit.status {
            self.grid.remove(cell)?;
            unit.status = UnitStatus::Dead;
            tracing::debug!("unit {} ({}) died at {}", id, unit.archetype.name, cell);
        }
        Ok(true)
    }

    // ========================================================================
    // HASHING
    // ========================================================================

    /// Structural hash of the turn cursor and unit records
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.cursor.hash(&mut hasher);
        self.turn_order.get(self.cursor).hash(&mut hasher);
        for unit in self.units.values() {
            unit.id.hash(&mut hasher);
            unit.status.hash(&mut hasher);
            unit.health.hash(&mut hasher);
        }
        hasher.finish()
    }
}

// ============================================================================
// SEARCH INTEGRATION
// ============================================================================

impl<T: Topology> SearchState for GameState<T> {
    type Move = GameMove;

    fn is_terminal(&self) -> bool {
        self.is_terminal()
    }

    fn legal_moves(&self) -> Vec<GameMove> {
        self.legal_moves()
    }

    fn apply_with_branching(&self, mv: &GameMove) -> Vec<(Self, f64)> {
        match self.apply_with_branching(mv) {
            Ok(branches) => branches,
            Err(err) => {
                tracing::warn!("search skipped {}: {}", mv, err);
                Vec::new()
            }
        }
    }

    fn fingerprint(&self) -> u64 {
        self.fingerprint()
    }

    fn maximizing(&self) -> Option<bool> {
        self.current_player().ok().map(Player::is_maximizing)
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl<T: Topology> fmt::Display for GameState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "    ")?;
        for x in 0..self.grid.width() {
            write!(f, "{:>3}", x)?;
        }
        writeln!(f)?;

        for y in 0..self.grid.height() {
            write!(f, "{:>3} ", y)?;
            if T::STAGGERED && y % 2 == 1 {
                write!(f, " ")?;
            }
            for x in 0..self.grid.width() {
                match self.grid.occupant_at(Point::new(x, y)) {
                    Some(id) => write!(f, "{:>3}", id)?,
                    None => write!(f, "  .")?,
                }
            }
            writeln!(f)?;
        }

        let active = self.current_unit().ok().map(|u| u.id);
        for unit in self.units.values() {
            let marker = if Some(unit.id) == active { '>' } else { ' ' };
            let side = match unit.owner {
                Player::One => "P1",
                Player::Two => "P2",
            };
            match unit.status {
                UnitStatus::Alive(p) => writeln!(
                    f,
                    "{}#{:<3} {} {:<12} hp {:>4}/{:<4} at {}",
                    marker, unit.id, side, unit.archetype.name, unit.health, unit.archetype.max_health, p
                )?,
                UnitStatus::Dead => writeln!(
                    f,
                    "{}#{:<3} {} {:<12} dead",
                    marker, unit.id, side, unit.archetype.name
                )?,
            }
        }
        Ok(())
    }
}
