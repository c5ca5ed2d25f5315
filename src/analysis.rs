use crate::engine::{Simulation, StepReport};
use crate::model::AgentState;
use crate::stats::RunningStats;
use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Observable updated after every simulation step.
pub trait Obs {
    fn update(&mut self, sim: &Simulation, step: &StepReport);
    fn report(&self) -> serde_json::Value;
}

/// Live, en-route and perched agent counts.
pub struct Population {
    n_agents: RunningStats,
    n_en_route: RunningStats,
    n_perched: RunningStats,
}

impl Population {
    pub fn new() -> Self {
        Self {
            n_agents: RunningStats::new(),
            n_en_route: RunningStats::new(),
            n_perched: RunningStats::new(),
        }
    }
}

impl Obs for Population {
    fn update(&mut self, sim: &Simulation, _step: &StepReport) {
        let mut n_agents = 0;
        let mut n_en_route = 0;
        let mut n_perched = 0;
        for agent in sim.agents() {
            n_agents += 1;
            match agent.state() {
                AgentState::Perched { .. } => n_perched += 1,
                _ if agent.attached_structure().is_some() => n_en_route += 1,
                _ => {}
            }
        }
        self.n_agents.push(n_agents as f64);
        self.n_en_route.push(n_en_route as f64);
        self.n_perched.push(n_perched as f64);
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "n_agents": self.n_agents.report(),
            "n_en_route": self.n_en_route.report(),
            "n_perched": self.n_perched.report(),
        })
    }
}

/// Standing fraction, load and fall/recovery counts of structures.
pub struct StructureHealth {
    frac_standing: RunningStats,
    load: RunningStats,
    n_falls: usize,
    n_recoveries: usize,
}

impl StructureHealth {
    pub fn new() -> Self {
        Self {
            frac_standing: RunningStats::new(),
            load: RunningStats::new(),
            n_falls: 0,
            n_recoveries: 0,
        }
    }
}

impl Obs for StructureHealth {
    fn update(&mut self, sim: &Simulation, step: &StepReport) {
        let mut n_total = 0;
        let mut n_standing = 0;
        for structure in sim.structures() {
            n_total += 1;
            if structure.is_standing() {
                n_standing += 1;
                // Occupants relative to capacity.
                let load = structure.occupants().len() as f64 / structure.capacity() as f64;
                self.load.push(load);
            }
        }
        if n_total > 0 {
            self.frac_standing.push(n_standing as f64 / n_total as f64);
        }
        self.n_falls += step.fallen_structures;
        self.n_recoveries += step.recovered_structures;
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "frac_standing": self.frac_standing.report(),
            "load": self.load.report(),
            "n_falls": self.n_falls,
            "n_recoveries": self.n_recoveries,
        })
    }
}

/// Spawn and despawn counts.
pub struct Traffic {
    total: StepReport,
}

impl Traffic {
    pub fn new() -> Self {
        Self {
            total: StepReport::default(),
        }
    }
}

impl Obs for Traffic {
    fn update(&mut self, _sim: &Simulation, step: &StepReport) {
        self.total.spawned_agents += step.spawned_agents;
        self.total.spawned_structures += step.spawned_structures;
        self.total.despawned_agents += step.despawned_agents;
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "spawned_agents": self.total.spawned_agents,
            "spawned_structures": self.total.spawned_structures,
            "despawned_agents": self.total.despawned_agents,
        })
    }
}

pub struct Analyzer {
    n_steps: usize,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new() -> Self {
        let obs_ptr_vec: Vec<Box<dyn Obs>> = vec![
            Box::new(Population::new()),
            Box::new(StructureHealth::new()),
            Box::new(Traffic::new()),
        ];
        Self {
            n_steps: 0,
            obs_ptr_vec,
        }
    }

    pub fn update(&mut self, sim: &Simulation, step: &StepReport) {
        self.n_steps += 1;
        for obs in &mut self.obs_ptr_vec {
            obs.update(sim, step);
        }
    }

    pub fn report(&self) -> serde_json::Value {
        let reports: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::json!({ "n_steps": self.n_steps, "observables": reports })
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.report())
            .context("failed to serialize results")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::geometry::Point;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn counts_falls_and_perched_agents() {
        let mut sim = Simulation::new(Config::default(), ChaCha12Rng::seed_from_u64(0))
            .expect("failed to create simulation");
        sim.add_structure(Point::new(100.0, 300.0), 1)
            .expect("failed to add structure");
        sim.add_agent(Point::new(105.0, 300.0), 100_000.0);
        sim.add_agent(Point::new(105.0, 300.0), 100_000.0);

        let mut analyzer = Analyzer::new();
        for _ in 0..20 {
            let step = sim.step(1.0 / 60.0).expect("failed to step");
            analyzer.update(&sim, &step);
        }

        let report = analyzer.report();
        assert_eq!(report["n_steps"], 20);
        let observables = report["observables"]
            .as_array()
            .expect("observables must be an array");
        assert_eq!(observables[0]["n_agents"]["max"], 2.0);
        assert_eq!(observables[0]["n_perched"]["max"], 0.0);
        assert_eq!(observables[1]["n_falls"], 1);
    }
}
