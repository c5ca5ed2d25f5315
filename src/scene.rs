//! Scene seed persistence.
//!
//! A seed holds only the initial layout of the scene: structure positions and
//! capacities, agent positions and sitting limits. Motion in progress is never
//! persisted.

use crate::config::{CAPACITY_RANGE, Config, check_num};
use crate::geometry::Point;
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_distr::Uniform;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    ops::RangeInclusive,
    path::Path,
};

/// Horizontal inset of generated positions from the scene edges.
const EDGE_INSET: f64 = 50.0;

/// Vertical band of generated agents.
pub const BIRD_BAND: RangeInclusive<f64> = 50.0..=150.0;

/// Vertical band of spawned agents.
pub const SPAWN_BAND: RangeInclusive<f64> = 10.0..=40.0;

/// Vertical band of generated and spawned structures.
pub const LAMPPOST_BAND: RangeInclusive<f64> = 300.0..=380.0;

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LamppostSeed {
    pub x: f64,
    pub y: f64,
    pub max_birds: usize,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct BirdSeed {
    pub x: f64,
    pub y: f64,
    /// Sitting limit in milliseconds.
    pub sitting_time: f64,
}

/// Initial layout of a scene, as stored on disk.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SceneSeed {
    pub lampposts: Vec<LamppostSeed>,
    pub birds: Vec<BirdSeed>,
}

impl SceneSeed {
    /// Generate the default scene with randomized positions.
    pub fn generate<R: Rng + ?Sized>(cfg: &Config, rng: &mut R) -> Result<Self> {
        let lampposts = (0..cfg.scene.n_lampposts)
            .map(|_| -> Result<LamppostSeed> {
                let position = random_point(rng, cfg.scene.width, LAMPPOST_BAND)?;
                Ok(LamppostSeed {
                    x: position.x,
                    y: position.y,
                    max_birds: cfg.structure.capacity,
                })
            })
            .collect::<Result<_>>()?;

        let birds = (0..cfg.scene.n_birds)
            .map(|_| -> Result<BirdSeed> {
                let position = random_point(rng, cfg.scene.width, BIRD_BAND)?;
                Ok(BirdSeed {
                    x: position.x,
                    y: position.y,
                    sitting_time: cfg.agent.sitting_secs * 1000.0,
                })
            })
            .collect::<Result<_>>()?;

        Ok(Self { lampposts, birds })
    }

    /// Load a [`SceneSeed`] from a JSON file and validate it.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let reader = BufReader::new(file);

        let seed: SceneSeed =
            serde_json::from_reader(reader).context("failed to deserialize scene seed")?;

        seed.validate().context("failed to validate scene seed")?;

        Ok(seed)
    }

    /// Load a seed or, if it is missing or malformed, generate the default
    /// scene and save it over the existing file.
    pub fn load_or_generate<P: AsRef<Path>, R: Rng + ?Sized>(
        file: P,
        cfg: &Config,
        rng: &mut R,
    ) -> Result<Self> {
        let file = file.as_ref();
        if file.exists() {
            match Self::from_file(file) {
                Ok(seed) => {
                    log::info!("loaded {file:?}");
                    return Ok(seed);
                }
                Err(error) => log::warn!("discarding {file:?}: {error:#}"),
            }
        }

        let seed = Self::generate(cfg, rng).context("failed to generate default scene")?;
        seed.save(file)?;
        log::info!("generated default scene in {file:?}");

        Ok(seed)
    }

    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).context("failed to serialize scene seed")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (i_lamppost, lamppost) in self.lampposts.iter().enumerate() {
            check_point(lamppost.x, lamppost.y)
                .and_then(|_| check_num(lamppost.max_birds, CAPACITY_RANGE))
                .with_context(|| format!("invalid lamppost {i_lamppost}"))?;
        }
        for (i_bird, bird) in self.birds.iter().enumerate() {
            check_point(bird.x, bird.y)
                .and_then(|_| check_num(bird.sitting_time, 0.0..f64::INFINITY))
                .with_context(|| format!("invalid bird {i_bird}"))?;
        }
        Ok(())
    }
}

/// Sample a point across the scene width within a vertical band.
pub fn random_point<R: Rng + ?Sized>(
    rng: &mut R,
    width: f64,
    band: RangeInclusive<f64>,
) -> Result<Point> {
    let x_dist = Uniform::new_inclusive(EDGE_INSET, width - EDGE_INSET)?;
    let y_dist = Uniform::new_inclusive(*band.start(), *band.end())?;
    Ok(Point::new(x_dist.sample(rng), y_dist.sample(rng)))
}

/// Reject non-finite coordinates, which JSON cannot represent.
pub fn check_point(x: f64, y: f64) -> Result<()> {
    if !x.is_finite() || !y.is_finite() {
        bail!("coordinates must be finite, but are ({x}, {y})");
    }
    Ok(())
}
