mod analysis;
mod clock;
mod config;
mod engine;
mod geometry;
mod manager;
mod model;
mod scene;
mod stats;

use crate::geometry::Point;
use crate::manager::{Manager, RunOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    scene_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init {
        #[arg(long)]
        seed: Option<u64>,
    },

    Run {
        #[arg(long)]
        ticks: u64,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        bird_rate: Option<u32>,

        #[arg(long)]
        lamppost_rate: Option<u32>,

        #[arg(long)]
        pause_at: Option<u64>,

        #[arg(long, default_value_t = 0)]
        resume_after: u64,

        #[arg(long)]
        realtime: bool,
    },

    Edit {
        #[arg(long, allow_negative_numbers = true)]
        x: f64,

        #[arg(long, allow_negative_numbers = true)]
        y: f64,

        #[arg(long)]
        capacity: usize,
    },

    Remove {
        #[arg(long, allow_negative_numbers = true)]
        x: f64,

        #[arg(long, allow_negative_numbers = true)]
        y: f64,
    },

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let mgr = Manager::new(args.scene_dir).context("failed to construct mgr")?;

    match args.command {
        Command::Init { seed } => mgr.init_scene(seed)?,
        Command::Run {
            ticks,
            seed,
            bird_rate,
            lamppost_rate,
            pause_at,
            resume_after,
            realtime,
        } => mgr.run_simulation(&RunOptions {
            ticks,
            seed,
            bird_rate,
            lamppost_rate,
            pause_at,
            resume_after,
            realtime,
        })?,
        Command::Edit { x, y, capacity } => mgr.edit_scene(Point::new(x, y), capacity)?,
        Command::Remove { x, y } => mgr.remove_from_scene(Point::new(x, y))?,
        Command::Clean => mgr.clean_scene()?,
    }

    Ok(())
}
