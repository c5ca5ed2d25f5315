use crate::analysis::Analyzer;
use crate::config::Config;
use crate::engine::Simulation;
use crate::geometry::Point;
use crate::scene::SceneSeed;
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

/// Options of a simulation run.
#[derive(Debug)]
pub struct RunOptions {
    /// Number of clock callbacks to deliver.
    pub ticks: u64,
    pub seed: Option<u64>,
    pub bird_rate: Option<u32>,
    pub lamppost_rate: Option<u32>,
    /// Callback at which the pause control is toggled on.
    pub pause_at: Option<u64>,
    /// Number of callbacks the clock stays paused.
    pub resume_after: u64,
    /// Sleep between callbacks to run at the clock rate.
    pub realtime: bool,
}

pub struct Manager {
    scene_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(scene_dir: P) -> Result<Self> {
        let scene_dir = scene_dir.as_ref().to_path_buf();
        fs::create_dir_all(&scene_dir)
            .with_context(|| format!("failed to create {scene_dir:?}"))?;

        let cfg =
            Config::from_file(scene_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { scene_dir, cfg })
    }

    /// Generate a default scene, overwriting any existing seed.
    pub fn init_scene(&self, seed: Option<u64>) -> Result<()> {
        let mut rng = make_rng(seed)?;
        let scene = SceneSeed::generate(&self.cfg, &mut rng)
            .context("failed to generate default scene")?;

        let scene_file = self.scene_file();
        scene.save(&scene_file)?;
        log::info!("saved {scene_file:?}");

        Ok(())
    }

    pub fn run_simulation(&self, opts: &RunOptions) -> Result<()> {
        let mut sim = self.load_simulation(opts.seed)?;
        if let Some(rate) = opts.bird_rate {
            sim.set_bird_rate(rate)?;
        }
        if let Some(rate) = opts.lamppost_rate {
            sim.set_lamppost_rate(rate)?;
        }

        let resume_at = opts.pause_at.map(|pause_at| pause_at + opts.resume_after);
        let progress_every = (opts.ticks / 10).max(1);
        let mut analyzer = Analyzer::new();

        for i_call in 0..opts.ticks {
            if opts.pause_at == Some(i_call) {
                sim.toggle_pause();
                log::info!("paused at callback {i_call}");
            }
            if resume_at == Some(i_call) && sim.clock().is_paused() {
                sim.toggle_pause();
                log::info!("resumed at callback {i_call}");
            }

            if let Some(step) = sim.tick().context("failed to perform tick")? {
                analyzer.update(&sim, &step);
            }

            if opts.realtime {
                thread::sleep(Duration::from_secs_f64(sim.clock().dt()));
            }

            if (i_call + 1) % progress_every == 0 {
                let progress = 100.0 * (i_call + 1) as f64 / opts.ticks as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        log::info!("issued {} ticks", sim.clock().ticks());

        self.save_simulation(&sim)?;

        let report_file = self.report_file();
        analyzer.save_results(&report_file)?;
        log::info!("{:#}", analyzer.report());

        Ok(())
    }

    /// Apply a pointer click at `at`: edit the structure under it or create one.
    pub fn edit_scene(&self, at: Point, capacity: usize) -> Result<()> {
        let mut sim = self.load_simulation(None)?;
        let id = sim.click(at, capacity).context("failed to edit structure")?;
        if let Some(structure) = sim.structure(id) {
            log::info!("{id:?} at {:?} has capacity {}", structure.position(), structure.capacity());
        }

        self.save_simulation(&sim)?;

        Ok(())
    }

    /// Remove the structure under `at`, if any.
    pub fn remove_from_scene(&self, at: Point) -> Result<()> {
        let mut sim = self.load_simulation(None)?;
        let Some(id) = sim.structure_at(at) else {
            log::info!("no structure at {at:?}");
            return Ok(());
        };
        sim.remove_structure(id)
            .context("failed to remove structure")?;
        log::info!("removed {id:?}");

        self.save_simulation(&sim)?;

        Ok(())
    }

    pub fn clean_scene(&self) -> Result<()> {
        for file in [self.scene_file(), self.report_file()] {
            if file.exists() {
                fs::remove_file(&file).with_context(|| format!("failed to remove {file:?}"))?;
                log::info!("removed {file:?}");
            }
        }
        Ok(())
    }

    /// Load the scene seed, regenerating it if needed, into a new simulation.
    fn load_simulation(&self, seed: Option<u64>) -> Result<Simulation> {
        let mut rng = make_rng(seed)?;
        let scene = SceneSeed::load_or_generate(self.scene_file(), &self.cfg, &mut rng)
            .context("failed to load scene")?;

        Simulation::from_seed(self.cfg.clone(), &scene, rng)
            .context("failed to construct simulation")
    }

    fn save_simulation(&self, sim: &Simulation) -> Result<()> {
        let scene_file = self.scene_file();
        sim.to_seed().save(&scene_file)?;
        log::info!("saved {scene_file:?}");
        Ok(())
    }

    fn scene_file(&self) -> PathBuf {
        self.scene_dir.join("scene.json")
    }

    fn report_file(&self) -> PathBuf {
        self.scene_dir.join("report.json")
    }
}

fn make_rng(seed: Option<u64>) -> Result<ChaCha12Rng> {
    match seed {
        Some(seed) => Ok(ChaCha12Rng::seed_from_u64(seed)),
        None => ChaCha12Rng::try_from_os_rng().context("failed to seed rng from the os"),
    }
}
