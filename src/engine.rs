use crate::clock::{SimulationClock, SpawnTimer};
use crate::config::{CAPACITY_RANGE, Config, SceneConfig, check_num};
use crate::geometry::Point;
use crate::model::{Agent, AgentId, Structure, StructureEvent, StructureId, Structures};
use crate::scene::{
    BirdSeed, LAMPPOST_BAND, LamppostSeed, SPAWN_BAND, SceneSeed, check_point, random_point,
};
use anyhow::{Context, Result, bail};
use rand_chacha::ChaCha12Rng;
use std::collections::BTreeMap;

/// Summary of what changed during a single step.
///
/// Returning it also tells the presentation layer that the frame is dirty.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct StepReport {
    pub spawned_agents: usize,
    pub spawned_structures: usize,
    pub despawned_agents: usize,
    pub fallen_structures: usize,
    pub recovered_structures: usize,
}

/// Simulation aggregate.
///
/// Owns the configuration, clock, spawn timers, random number generator and
/// both entity arenas. Entities are keyed by monotonically increasing ids, so
/// iteration follows insertion order and seeded runs are reproducible.
pub struct Simulation {
    cfg: Config,
    clock: SimulationClock,
    bird_timer: SpawnTimer,
    lamppost_timer: SpawnTimer,
    rng: ChaCha12Rng,
    next_id: u64,
    agents: BTreeMap<AgentId, Agent>,
    structures: Structures,
}

impl Simulation {
    /// Create an empty simulation.
    pub fn new(cfg: Config, rng: ChaCha12Rng) -> Result<Self> {
        let bird_timer = match cfg.spawn.bird_rate {
            Some(rate) => SpawnTimer::with_rate(rate)?,
            None => SpawnTimer::disabled(),
        };
        let lamppost_timer = match cfg.spawn.lamppost_rate {
            Some(rate) => SpawnTimer::with_rate(rate)?,
            None => SpawnTimer::disabled(),
        };

        Ok(Self {
            clock: SimulationClock::new(cfg.clock.tick_rate),
            cfg,
            bird_timer,
            lamppost_timer,
            rng,
            next_id: 0,
            agents: BTreeMap::new(),
            structures: BTreeMap::new(),
        })
    }

    /// Create a simulation populated from a scene seed.
    pub fn from_seed(cfg: Config, seed: &SceneSeed, rng: ChaCha12Rng) -> Result<Self> {
        let mut sim = Self::new(cfg, rng)?;
        for lamppost in &seed.lampposts {
            sim.add_structure(Point::new(lamppost.x, lamppost.y), lamppost.max_birds)
                .context("failed to add lamppost")?;
        }
        for bird in &seed.birds {
            sim.add_agent(Point::new(bird.x, bird.y), bird.sitting_time);
        }
        Ok(sim)
    }

    /// Capture the current layout as a scene seed.
    pub fn to_seed(&self) -> SceneSeed {
        SceneSeed {
            lampposts: self
                .structures
                .values()
                .map(|structure| LamppostSeed {
                    x: structure.position().x,
                    y: structure.position().y,
                    max_birds: structure.capacity(),
                })
                .collect(),
            birds: self
                .agents
                .values()
                .map(|agent| BirdSeed {
                    x: agent.position().x,
                    y: agent.position().y,
                    sitting_time: agent.sitting_time(),
                })
                .collect(),
        }
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn toggle_pause(&mut self) {
        self.clock.toggle_pause();
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    pub fn structure(&self, id: StructureId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    pub fn set_bird_rate(&mut self, value: u32) -> Result<()> {
        self.bird_timer.set_rate(value)
    }

    pub fn set_lamppost_rate(&mut self, value: u32) -> Result<()> {
        self.lamppost_timer.set_rate(value)
    }

    /// Issue a clock tick and step the simulation, unless paused.
    pub fn tick(&mut self) -> Result<Option<StepReport>> {
        match self.clock.tick() {
            Some(dt) => self.step(dt).map(Some),
            None => Ok(None),
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f64) -> Result<StepReport> {
        let mut report = StepReport::default();

        // Spawn new entities.
        if self.bird_timer.advance(dt) {
            self.spawn_agent().context("failed to spawn agent")?;
            report.spawned_agents += 1;
        }
        if self.lamppost_timer.advance(dt) {
            self.spawn_structure()
                .context("failed to spawn structure")?;
            report.spawned_structures += 1;
        }

        // Update agents before any structure checks for overload.
        let tick_rate = self.clock.tick_rate();
        for agent in self.agents.values_mut() {
            agent.update(
                dt,
                tick_rate,
                &mut self.structures,
                &self.cfg.agent,
                &mut self.rng,
            );
        }

        // Despawn departing agents that left the scene.
        let n_agents = self.agents.len();
        let scene = &self.cfg.scene;
        self.agents.retain(|_, agent| {
            let gone = agent.is_departing() && out_of_scene(agent.position(), scene);
            if gone {
                log::debug!("despawned {:?}", agent.id());
            }
            !gone
        });
        report.despawned_agents = n_agents - self.agents.len();

        // Update structures.
        for structure in self.structures.values_mut() {
            match structure.update(dt, self.cfg.structure.restore_secs) {
                Some(StructureEvent::Fell(evicted)) => {
                    log::debug!("{:?} fell with {} occupants", structure.id(), evicted.len());
                    for id in evicted {
                        if let Some(agent) = self.agents.get_mut(&id) {
                            agent.evict(structure.id(), &self.cfg.agent, &mut self.rng);
                        }
                    }
                    report.fallen_structures += 1;
                }
                Some(StructureEvent::Recovered) => {
                    log::debug!("{:?} recovered", structure.id());
                    report.recovered_structures += 1;
                }
                None => {}
            }
        }

        Ok(report)
    }

    /// Add a seeking agent at `position` with a sitting limit in milliseconds.
    pub fn add_agent(&mut self, position: Point, sitting_time: f64) -> AgentId {
        let id = AgentId(self.next_id());
        let agent = Agent::new(id, position, self.cfg.agent.speed, sitting_time);
        self.agents.insert(id, agent);
        id
    }

    /// Add a standing structure with its top-left corner at `position`.
    pub fn add_structure(&mut self, position: Point, capacity: usize) -> Result<StructureId> {
        check_num(capacity, CAPACITY_RANGE).context("invalid capacity")?;
        let id = StructureId(self.next_id());
        let structure = Structure::new(id, position, capacity, &self.cfg.structure);
        self.structures.insert(id, structure);
        Ok(id)
    }

    /// Add an agent at a random entry position above the structures.
    pub fn spawn_agent(&mut self) -> Result<AgentId> {
        let position = random_point(&mut self.rng, self.cfg.scene.width, SPAWN_BAND)?;
        let id = self.add_agent(position, self.cfg.agent.sitting_secs * 1000.0);
        log::debug!("spawned {id:?} at {position:?}");
        Ok(id)
    }

    /// Add a structure at a random position with the default capacity.
    pub fn spawn_structure(&mut self) -> Result<StructureId> {
        let position = random_point(&mut self.rng, self.cfg.scene.width, LAMPPOST_BAND)?;
        let id = self.add_structure(position, self.cfg.structure.capacity)?;
        log::debug!("spawned {id:?} at {position:?}");
        Ok(id)
    }

    /// Find the structure whose click geometry contains `point`.
    pub fn structure_at(&self, point: Point) -> Option<StructureId> {
        self.structures
            .values()
            .find(|structure| structure.bounds().contains(&point))
            .map(Structure::id)
    }

    /// Set the capacity of `target`, or create a structure centered
    /// horizontally on `at` when there is no target.
    ///
    /// Must be called between ticks.
    pub fn edit_structure(
        &mut self,
        target: Option<StructureId>,
        capacity: usize,
        at: Point,
    ) -> Result<StructureId> {
        check_point(at.x, at.y).context("invalid click position")?;
        check_num(capacity, CAPACITY_RANGE).context("invalid capacity")?;
        match target {
            Some(id) => {
                let Some(structure) = self.structures.get_mut(&id) else {
                    bail!("no structure with id {id:?}");
                };
                structure.set_capacity(capacity);
                Ok(id)
            }
            None => {
                let position = Point::new(at.x - self.cfg.structure.width / 2.0, at.y);
                self.add_structure(position, capacity)
            }
        }
    }

    /// Handle a pointer click: edit the structure under `at` or create one.
    pub fn click(&mut self, at: Point, capacity: usize) -> Result<StructureId> {
        let target = self.structure_at(at);
        self.edit_structure(target, capacity, at)
    }

    /// Remove a structure after detaching every agent referencing it.
    ///
    /// Must be called between ticks.
    pub fn remove_structure(&mut self, id: StructureId) -> Result<()> {
        let Some(structure) = self.structures.get_mut(&id) else {
            bail!("no structure with id {id:?}");
        };
        structure.clear_occupants();
        for agent in self.agents.values_mut() {
            agent.forget(id, &self.cfg.agent, &mut self.rng);
        }
        self.structures.remove(&id);
        Ok(())
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn out_of_scene(position: Point, scene: &SceneConfig) -> bool {
    let margin = scene.despawn_margin;
    position.x < -margin
        || position.x > scene.width + margin
        || position.y < -margin
        || position.y > scene.height + margin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AgentState;
    use crate::scene::BIRD_BAND;
    use rand::SeedableRng;

    const DT: f64 = 1.0 / 60.0;

    impl Simulation {
        fn agent(&self, id: AgentId) -> Option<&Agent> {
            self.agents.get(&id)
        }
    }

    fn simulation(seed: u64) -> Simulation {
        Simulation::new(Config::default(), ChaCha12Rng::seed_from_u64(seed))
            .expect("failed to create simulation")
    }

    fn save_seed(sim: &Simulation, name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("perch-engine-tests-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("failed to create test directory");
        let file = dir.join(name);
        sim.to_seed().save(&file).expect("failed to save seed");
        file
    }

    fn check_invariants(sim: &Simulation) {
        for agent in sim.agents() {
            match agent.state() {
                AgentState::EnRoute { structure, .. } => {
                    assert_eq!(agent.attached_structure(), Some(*structure));
                }
                AgentState::Perched { structure, .. } => {
                    assert_eq!(agent.attached_structure(), Some(*structure));
                    let structure = sim.structure(*structure).expect("dangling structure");
                    assert!(structure.occupants().contains(&agent.id()));
                }
                AgentState::Seeking | AgentState::Departing { .. } => {
                    assert!(agent.attached_structure().is_none());
                }
            }
            assert!(agent.position().x.is_finite() && agent.position().y.is_finite());
        }
        for structure in sim.structures() {
            if !structure.is_standing() {
                assert!(structure.occupants().is_empty());
            }
            for id in structure.occupants() {
                let agent = sim.agent(*id).expect("dangling occupant");
                assert_eq!(agent.attached_structure(), Some(structure.id()));
            }
        }
    }

    #[test]
    fn overload_fells_structure_on_the_same_tick() {
        let mut sim = simulation(0);
        let structure = sim
            .add_structure(Point::new(395.0, 300.0), 2)
            .expect("failed to add structure");
        // All three agents start on the perch point and arrive together.
        let agents: Vec<_> = (0..3)
            .map(|_| sim.add_agent(Point::new(400.0, 300.0), 100_000.0))
            .collect();

        // Seeking -> en route.
        let report = sim.step(DT).expect("failed to step");
        assert_eq!(report.fallen_structures, 0);
        for &id in &agents {
            assert_eq!(sim.agent(id).expect("missing agent").attached_structure(), Some(structure));
        }

        // Zero-length flights land after 0.1 s.
        let mut report = StepReport::default();
        for _ in 0..10 {
            report = sim.step(DT).expect("failed to step");
            if report.fallen_structures > 0 {
                break;
            }
        }
        assert_eq!(report.fallen_structures, 1);

        let structure = sim.structure(structure).expect("missing structure");
        assert!(!structure.is_standing());
        assert!(structure.occupants().is_empty());
        for &id in &agents {
            let agent = sim.agent(id).expect("missing agent");
            assert!(agent.is_departing());
            assert!(agent.attached_structure().is_none());
        }
        check_invariants(&sim);
    }

    #[test]
    fn fallen_structure_recovers_after_restore_time() {
        let mut sim = simulation(1);
        let id = sim
            .add_structure(Point::new(100.0, 300.0), 1)
            .expect("failed to add structure");
        for _ in 0..2 {
            sim.add_agent(Point::new(105.0, 300.0), 100_000.0);
        }

        let mut n_steps = 0;
        while sim.structure(id).expect("missing structure").is_standing() {
            sim.step(DT).expect("failed to step");
            n_steps += 1;
            assert!(n_steps < 100);
        }

        let mut elapsed = 0.0;
        loop {
            let report = sim.step(0.25).expect("failed to step");
            elapsed += 0.25;
            if report.recovered_structures == 1 {
                break;
            }
            assert!(elapsed < 3.5);
        }
        assert_eq!(elapsed, 3.5);
        assert!(sim.structure(id).expect("missing structure").is_standing());
    }

    #[test]
    fn departing_agents_leaving_the_scene_are_despawned() {
        let mut sim = simulation(2);
        sim.add_structure(Point::new(300.0, 300.0), 5)
            .expect("failed to add structure");
        let id = sim.add_agent(Point::new(305.0, 300.0), 200.0);

        let mut despawned = 0;
        for _ in 0..2_000 {
            despawned += sim.step(DT).expect("failed to step").despawned_agents;
            check_invariants(&sim);
            if sim.agent(id).is_none() {
                break;
            }
        }
        assert_eq!(despawned, 1);
        assert!(sim.agent(id).is_none());
        assert!(sim.structures().all(|structure| structure.occupants().is_empty()));

        for _ in 0..10 {
            sim.step(DT).expect("failed to step");
            assert!(sim.agent(id).is_none());
        }
    }

    #[test]
    fn seeking_without_structures_stays_put() {
        let mut sim = simulation(3);
        let start = Point::new(200.0, 100.0);
        let id = sim.add_agent(start, 100_000.0);
        for _ in 0..1_000 {
            sim.step(DT).expect("failed to step");
        }
        let agent = sim.agent(id).expect("missing agent");
        assert_eq!(agent.state(), &AgentState::Seeking);
        assert_eq!(agent.position(), start);
    }

    #[test]
    fn long_run_keeps_invariants() {
        let mut cfg = Config::default();
        cfg.agent.sitting_secs = 30.0;
        cfg.spawn.bird_rate = Some(100);
        cfg.spawn.lamppost_rate = Some(80);
        let seed = SceneSeed::generate(&cfg, &mut ChaCha12Rng::seed_from_u64(4))
            .expect("failed to generate scene");
        let mut sim = Simulation::from_seed(cfg, &seed, ChaCha12Rng::seed_from_u64(5))
            .expect("failed to create simulation");

        let mut total = StepReport::default();
        for _ in 0..3_600 {
            let report = sim.step(DT).expect("failed to step");
            total.spawned_agents += report.spawned_agents;
            total.fallen_structures += report.fallen_structures;
            check_invariants(&sim);
        }
        assert!(total.spawned_agents > 0);
        assert!(total.fallen_structures > 0);
    }

    #[test]
    fn paused_clock_freezes_state() {
        let mut sim = simulation(6);
        sim.add_structure(Point::new(600.0, 350.0), 2)
            .expect("failed to add structure");
        let id = sim.add_agent(Point::new(100.0, 100.0), 100_000.0);
        for _ in 0..10 {
            sim.tick().expect("failed to tick");
        }
        let before = sim.agent(id).expect("missing agent").clone();

        sim.toggle_pause();
        for _ in 0..10 {
            assert_eq!(sim.tick().expect("failed to tick"), None);
        }
        let agent = sim.agent(id).expect("missing agent");
        assert_eq!(agent.position(), before.position());
        assert_eq!(agent.state(), before.state());

        sim.toggle_pause();
        assert!(sim.tick().expect("failed to tick").is_some());
        assert_ne!(sim.agent(id).expect("missing agent").position(), before.position());
    }

    #[test]
    fn click_edits_or_creates_structures() {
        let mut sim = simulation(7);
        let existing = sim
            .add_structure(Point::new(100.0, 300.0), 2)
            .expect("failed to add structure");

        let edited = sim.click(Point::new(105.0, 400.0), 7).expect("failed to click");
        assert_eq!(edited, existing);
        assert_eq!(sim.structure(existing).expect("missing structure").capacity(), 7);

        let created = sim.click(Point::new(500.0, 320.0), 3).expect("failed to click");
        assert_ne!(created, existing);
        let structure = sim.structure(created).expect("missing structure");
        assert_eq!(structure.position(), Point::new(495.0, 320.0));
        assert_eq!(structure.capacity(), 3);
        assert!(structure.is_standing());
        assert!(structure.occupants().is_empty());

        assert!(sim.click(Point::new(105.0, 400.0), 0).is_err());
        assert!(sim.click(Point::new(105.0, 400.0), 11).is_err());
        assert_eq!(sim.structure(existing).expect("missing structure").capacity(), 7);
    }

    #[test]
    fn removing_a_structure_detaches_agents() {
        let mut sim = simulation(8);
        let id = sim
            .add_structure(Point::new(100.0, 300.0), 5)
            .expect("failed to add structure");
        let perched = sim.add_agent(Point::new(105.0, 300.0), 100_000.0);
        for _ in 0..10 {
            sim.step(DT).expect("failed to step");
        }
        let en_route = sim.add_agent(Point::new(700.0, 50.0), 100_000.0);
        sim.step(DT).expect("failed to step");
        assert_eq!(sim.agent(en_route).expect("missing agent").attached_structure(), Some(id));

        sim.remove_structure(id).expect("failed to remove structure");
        assert!(sim.structure(id).is_none());
        assert!(sim.agent(perched).expect("missing agent").is_departing());
        assert_eq!(
            sim.agent(en_route).expect("missing agent").state(),
            &AgentState::Seeking
        );
        check_invariants(&sim);
    }

    #[test]
    fn non_finite_clicks_are_rejected() {
        let mut sim = simulation(11);
        sim.add_structure(Point::new(100.0, 300.0), 2)
            .expect("failed to add structure");

        assert!(sim.click(Point::new(f64::NAN, 300.0), 3).is_err());
        assert!(sim.click(Point::new(200.0, f64::INFINITY), 3).is_err());
        assert_eq!(sim.structures().count(), 1);
        let file = save_seed(&sim, "non_finite_clicks.json");
        assert!(SceneSeed::from_file(&file).is_ok());
        std::fs::remove_file(&file).ok();
    }

    #[test]
    fn seed_round_trip_through_file_keeps_layout() {
        let mut sim = simulation(9);
        let mut rng = ChaCha12Rng::seed_from_u64(12);
        for _ in 0..20 {
            let position = random_point(&mut rng, 800.0, LAMPPOST_BAND).expect("failed to sample");
            sim.add_structure(position, 4)
                .expect("failed to add structure");
        }
        sim.add_structure(Point::new(0.1 + 0.2, 1.0 / 3.0), 7)
            .expect("failed to add structure");
        for sitting_time in [1001.0, 2945.0, 100_000.0, 12_345.678] {
            let position = random_point(&mut rng, 800.0, BIRD_BAND).expect("failed to sample");
            sim.add_agent(position, sitting_time);
        }
        let seed = sim.to_seed();

        let file = save_seed(&sim, "round_trip.json");
        let loaded = SceneSeed::from_file(&file).expect("failed to load seed");
        assert_eq!(loaded, seed);

        let restored = Simulation::from_seed(Config::default(), &loaded, ChaCha12Rng::seed_from_u64(10))
            .expect("failed to create simulation");
        assert_eq!(restored.to_seed(), seed);
        assert_eq!(loaded.birds[0].sitting_time, 1001.0);
        assert_eq!(loaded.lampposts[20].max_birds, 7);
        std::fs::remove_file(&file).ok();
    }
}
