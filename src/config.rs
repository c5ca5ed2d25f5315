use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::{Bound::Excluded, RangeBounds, RangeInclusive},
    path::Path,
};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// Every section is optional and falls back to its defaults.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub scene: SceneConfig,
    pub clock: ClockConfig,
    pub agent: AgentConfig,
    pub structure: StructureConfig,
    pub spawn: SpawnConfig,
}

/// Visible area and default-scene parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    /// Width of the visible area.
    pub width: f64,
    /// Height of the visible area.
    pub height: f64,
    /// Margin outside the visible area before departing agents are despawned.
    pub despawn_margin: f64,
    /// Number of agents in a generated scene.
    pub n_birds: usize,
    /// Number of structures in a generated scene.
    pub n_lampposts: usize,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Ticks per second.
    pub tick_rate: f64,
}

/// Shape of directed flights.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trajectory {
    /// Straight line between origin and target.
    Linear,
    /// Bowed upwards by an arc proportional to the travelled distance.
    Parabolic,
}

/// Agent motion and occupancy parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Distance travelled per tick-equivalent.
    pub speed: f64,
    pub trajectory: Trajectory,
    /// Arc height as a fraction of the flight distance.
    pub arc_factor: f64,
    /// Sitting limit (in seconds) given to generated and spawned agents.
    pub sitting_secs: f64,
    /// Range of departure-flight durations (in seconds).
    pub departure_secs: [f64; 2],
    /// Range of the horizontal offset of the departure target.
    pub departure_drift: [f64; 2],
    /// Vertical coordinate of the departure target.
    pub departure_altitude: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructureConfig {
    pub width: f64,
    pub height: f64,
    /// Capacity given to generated and spawned structures.
    pub capacity: usize,
    /// Time (in seconds) a fallen structure waits before standing again.
    pub restore_secs: f64,
}

/// Initial spawn-rate slider values; `None` keeps spawning disabled.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpawnConfig {
    pub bird_rate: Option<u32>,
    pub lamppost_rate: Option<u32>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            despawn_margin: 50.0,
            n_birds: 11,
            n_lampposts: 6,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self { tick_rate: 60.0 }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            speed: 1.1,
            trajectory: Trajectory::Parabolic,
            arc_factor: 0.2,
            sitting_secs: 100.0,
            departure_secs: [0.5, 5.0],
            departure_drift: [-100.0, 300.0],
            departure_altitude: -100.0,
        }
    }
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            width: 10.0,
            height: 150.0,
            capacity: 2,
            restore_secs: 3.5,
        }
    }
}

impl AgentConfig {
    /// Arc factor actually applied to flights.
    pub fn effective_arc_factor(&self) -> f64 {
        match self.trajectory {
            Trajectory::Linear => 0.0,
            Trajectory::Parabolic => self.arc_factor,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded. If it does not exist the default
    /// configuration is returned. Performs validation on all parameters
    /// before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let config = if file.exists() {
            let contents =
                fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
            toml::from_str(&contents).context("failed to deserialize config")?
        } else {
            log::info!("{file:?} not found, using default config");
            Config::default()
        };

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let scene = &self.scene;
        check_num(scene.width, 100.0..1e6).context("invalid scene width")?;
        check_num(scene.height, 1.0..1e6).context("invalid scene height")?;
        check_num(scene.despawn_margin, 0.0..1e6).context("invalid despawn margin")?;
        check_num(scene.n_birds, 0..10_000).context("invalid number of birds")?;
        check_num(scene.n_lampposts, 0..10_000).context("invalid number of lampposts")?;

        check_num(self.clock.tick_rate, 1.0..=1000.0).context("invalid tick rate")?;

        let agent = &self.agent;
        check_num(agent.speed, (Excluded(0.0), Excluded(1e3))).context("invalid agent speed")?;
        check_num(agent.arc_factor, 0.0..=10.0).context("invalid arc factor")?;
        check_num(agent.sitting_secs, 0.0..1e9).context("invalid sitting time")?;
        check_range(agent.departure_secs, 0.0..1e3).context("invalid departure duration")?;
        check_range(agent.departure_drift, -1e6..1e6).context("invalid departure drift")?;
        check_num(agent.departure_altitude, -1e6..1e6).context("invalid departure altitude")?;

        let structure = &self.structure;
        check_num(structure.width, 0.0..1e3).context("invalid structure width")?;
        check_num(structure.height, 0.0..1e4).context("invalid structure height")?;
        check_num(structure.capacity, CAPACITY_RANGE).context("invalid structure capacity")?;
        check_num(structure.restore_secs, 0.0..1e6).context("invalid restore time")?;

        if let Some(rate) = self.spawn.bird_rate {
            check_num(rate, SPAWN_RATE_RANGE).context("invalid bird spawn rate")?;
        }
        if let Some(rate) = self.spawn.lamppost_rate {
            check_num(rate, SPAWN_RATE_RANGE).context("invalid lamppost spawn rate")?;
        }

        Ok(())
    }
}

/// Accepted structure capacities.
pub const CAPACITY_RANGE: RangeInclusive<usize> = 1..=10;

/// Accepted spawn-rate slider values.
pub const SPAWN_RATE_RANGE: RangeInclusive<u32> = 0..=100;

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_range<R>(pair: [f64; 2], range: R) -> Result<()>
where
    R: RangeBounds<f64> + Debug + Clone,
{
    // Both ends inside the range and ordered.
    for ele in pair {
        check_num(ele, range.clone())?;
    }
    if pair[0] > pair[1] {
        bail!("range start must not exceed its end, but is {pair:?}");
    }
    Ok(())
}
