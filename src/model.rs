//! Simulation entities: agents (birds) and structures (lampposts).

use crate::config::{AgentConfig, StructureConfig};
use crate::geometry::{Flight, Point, Rect};
use rand::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Handle of an agent inside the simulation arena.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct AgentId(pub u64);

/// Handle of a structure inside the simulation arena.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct StructureId(pub u64);

pub type Structures = BTreeMap<StructureId, Structure>;

/// Behavioral state of an agent.
///
/// The structure an agent is attached to lives inside the state, so an agent
/// references a structure exactly when it is en route to it or perched on it.
#[derive(Debug, PartialEq, Clone)]
pub enum AgentState {
    Seeking,
    EnRoute {
        structure: StructureId,
        flight: Flight,
    },
    Perched {
        structure: StructureId,
        sitting_secs: f64,
    },
    Departing {
        flight: Flight,
    },
}

/// Mobile agent of the simulation.
#[derive(Debug, Clone)]
pub struct Agent {
    id: AgentId,
    position: Point,
    /// Distance travelled per tick-equivalent.
    speed: f64,
    /// Perched time (in milliseconds) after which the agent leaves.
    sitting_time: f64,
    state: AgentState,
}

impl Agent {
    /// Create a new agent in the `Seeking` state.
    pub fn new(id: AgentId, position: Point, speed: f64, sitting_time: f64) -> Self {
        Self {
            id,
            position,
            speed,
            sitting_time,
            state: AgentState::Seeking,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn sitting_time(&self) -> f64 {
        self.sitting_time
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    /// Structure the agent is en route to or perched on.
    pub fn attached_structure(&self) -> Option<StructureId> {
        match self.state {
            AgentState::EnRoute { structure, .. } | AgentState::Perched { structure, .. } => {
                Some(structure)
            }
            AgentState::Seeking | AgentState::Departing { .. } => None,
        }
    }

    pub fn is_departing(&self) -> bool {
        matches!(self.state, AgentState::Departing { .. })
    }

    /// Advance the agent by `dt` seconds.
    ///
    /// Reads the structure roster and joins or leaves occupant sets, so
    /// membership and the agent state always change together.
    pub fn update<R: Rng + ?Sized>(
        &mut self,
        dt: f64,
        tick_rate: f64,
        structures: &mut Structures,
        cfg: &AgentConfig,
        rng: &mut R,
    ) {
        match &mut self.state {
            AgentState::Seeking => {
                // Occupancy is deliberately ignored: full structures stay eligible.
                let candidates: Vec<_> = structures
                    .values()
                    .filter(|structure| structure.is_standing())
                    .collect();
                let Some(&structure) = candidates.choose(rng) else {
                    return;
                };
                let flight = Flight::at_speed(
                    self.position,
                    structure.perch_point(),
                    self.speed * tick_rate,
                    cfg.effective_arc_factor(),
                );
                self.state = AgentState::EnRoute {
                    structure: structure.id(),
                    flight,
                };
            }
            AgentState::EnRoute { structure, flight } => {
                let structure_id = *structure;
                let arrived = flight.advance(dt);
                self.position = flight.position();
                if !arrived {
                    return;
                }
                match structures.get_mut(&structure_id) {
                    Some(structure) if structure.is_standing() => {
                        structure.occupants.insert(self.id);
                        self.state = AgentState::Perched {
                            structure: structure_id,
                            sitting_secs: 0.0,
                        };
                    }
                    Some(_) => self.depart(cfg, rng),
                    None => self.state = AgentState::Seeking,
                }
            }
            AgentState::Perched {
                structure,
                sitting_secs,
            } => {
                let structure_id = *structure;
                *sitting_secs += dt;
                let expired = *sitting_secs * 1000.0 >= self.sitting_time;
                let fallen = structures
                    .get(&structure_id)
                    .is_none_or(|structure| !structure.is_standing());
                if expired || fallen {
                    if let Some(structure) = structures.get_mut(&structure_id) {
                        structure.occupants.remove(&self.id);
                    }
                    self.depart(cfg, rng);
                }
            }
            AgentState::Departing { flight } => {
                // Stay departing for the arrival tick so the despawn sweep sees it.
                if flight.arrived() {
                    self.state = AgentState::Seeking;
                    return;
                }
                flight.advance(dt);
                self.position = flight.position();
            }
        }
    }

    /// Leave the given structure after it dropped this agent from its roster.
    pub fn evict<R: Rng + ?Sized>(&mut self, structure: StructureId, cfg: &AgentConfig, rng: &mut R) {
        if matches!(self.state, AgentState::Perched { structure: id, .. } if id == structure) {
            self.depart(cfg, rng);
        }
    }

    /// Forget a structure that is being removed from the scene.
    ///
    /// The caller is responsible for the structure roster.
    pub fn forget<R: Rng + ?Sized>(&mut self, structure: StructureId, cfg: &AgentConfig, rng: &mut R) {
        match self.state {
            AgentState::Perched { structure: id, .. } if id == structure => self.depart(cfg, rng),
            AgentState::EnRoute { structure: id, .. } if id == structure => {
                self.state = AgentState::Seeking;
            }
            _ => {}
        }
    }

    /// Start a random flight towards a point above the scene.
    fn depart<R: Rng + ?Sized>(&mut self, cfg: &AgentConfig, rng: &mut R) {
        let [drift_min, drift_max] = cfg.departure_drift;
        let [secs_min, secs_max] = cfg.departure_secs;
        let target = Point::new(
            self.position.x + rng.random_range(drift_min..=drift_max),
            cfg.departure_altitude,
        );
        let total_secs = rng.random_range(secs_min..=secs_max);
        let arc_height = self.position.distance(&target) * cfg.effective_arc_factor();
        self.state = AgentState::Departing {
            flight: Flight::new(self.position, target, total_secs, arc_height),
        };
    }
}

/// Status of a structure.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum StructureStatus {
    Standing,
    Fallen { recovery_secs: f64 },
}

/// Change of status reported by [`Structure::update`].
#[derive(Debug, PartialEq)]
pub enum StructureEvent {
    /// The structure fell and dropped these occupants.
    Fell(Vec<AgentId>),
    Recovered,
}

/// Stationary, capacity-limited structure.
#[derive(Debug, Clone)]
pub struct Structure {
    id: StructureId,
    /// Top-left corner.
    position: Point,
    width: f64,
    height: f64,
    capacity: usize,
    occupants: BTreeSet<AgentId>,
    status: StructureStatus,
}

impl Structure {
    /// Create a new standing structure with no occupants.
    pub fn new(id: StructureId, position: Point, capacity: usize, cfg: &StructureConfig) -> Self {
        Self {
            id,
            position,
            width: cfg.width,
            height: cfg.height,
            capacity,
            occupants: BTreeSet::new(),
            status: StructureStatus::Standing,
        }
    }

    pub fn id(&self) -> StructureId {
        self.id
    }

    pub fn position(&self) -> Point {
        self.position
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    pub fn occupants(&self) -> &BTreeSet<AgentId> {
        &self.occupants
    }

    pub fn is_standing(&self) -> bool {
        self.status == StructureStatus::Standing
    }

    /// Click geometry.
    pub fn bounds(&self) -> Rect {
        Rect {
            origin: self.position,
            width: self.width,
            height: self.height,
        }
    }

    /// Center of the top edge, where agents land.
    pub fn perch_point(&self) -> Point {
        Point::new(self.position.x + self.width / 2.0, self.position.y)
    }

    /// Drop every occupant and return them.
    pub fn clear_occupants(&mut self) -> Vec<AgentId> {
        std::mem::take(&mut self.occupants).into_iter().collect()
    }

    /// Check for overload or advance recovery by `dt` seconds.
    ///
    /// Must run after every agent of the tick has been updated.
    pub fn update(&mut self, dt: f64, restore_secs: f64) -> Option<StructureEvent> {
        match &mut self.status {
            StructureStatus::Standing => {
                if self.occupants.len() <= self.capacity {
                    return None;
                }
                self.status = StructureStatus::Fallen {
                    recovery_secs: restore_secs,
                };
                Some(StructureEvent::Fell(self.clear_occupants()))
            }
            StructureStatus::Fallen { recovery_secs } => {
                *recovery_secs -= dt;
                if *recovery_secs > 0.0 {
                    return None;
                }
                self.status = StructureStatus::Standing;
                Some(StructureEvent::Recovered)
            }
        }
    }
}
