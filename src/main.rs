//! CLI front-end for the hydraulic erosion engine: generates a tile, runs
//! a fixed number of ticks, and optionally writes out discharge/momentum
//! PNG snapshots and a config JSON file.

use clap::Parser;
use hydraulic_erosion::config::{Config, ErosionPreset};
use hydraulic_erosion::image_export;
use hydraulic_erosion::terrain::PerlinOracle;
use hydraulic_erosion::world::{self, World};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hydraulic_erosion")]
#[command(about = "Simulate particle-based hydraulic erosion over a procedurally generated tile")]
struct Args {
    /// Master seed. Any string that doesn't parse as an integer falls back
    /// to a wall-clock seed, and the fallback is reported on stderr.
    seed: Option<String>,

    /// Named starting point for the tunables (default, fast, high_quality, lakes, barren).
    #[arg(long, default_value = "default")]
    preset: String,

    /// Side length of a single map tile, in cells.
    #[arg(long)]
    tile_size: Option<usize>,

    /// Number of tiles per side of the world grid.
    #[arg(long)]
    map_size: Option<usize>,

    /// Number of ticks to run.
    #[arg(long, default_value_t = 50)]
    ticks: u64,

    /// Drops spawned per tile per tick. Overrides the preset's default.
    #[arg(long)]
    cycles_per_tick: Option<usize>,

    /// Apply a radial falloff so terrain forms an island.
    #[arg(long)]
    island: bool,

    /// Enable the flood/lake operator regardless of preset.
    #[arg(long)]
    flood: bool,

    /// Use the rayon-batched parallel driver instead of the sequential one.
    #[arg(long)]
    parallel: bool,

    /// Load tunables from a JSON file, overriding the preset.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the resolved tunables to a JSON file before running.
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Write a discharge-field PNG after the run.
    #[arg(long)]
    export_discharge: Option<PathBuf>,

    /// Write a momentum-field PNG after the run.
    #[arg(long)]
    export_momentum: Option<PathBuf>,

    /// Print the available presets and exit.
    #[arg(long)]
    list_presets: bool,
}

fn main() {
    let args = Args::parse();

    if args.list_presets {
        for preset in ErosionPreset::all() {
            println!("{:<12} {}", preset.to_string(), preset.description());
        }
        return;
    }

    let (seed, seed_err) = world::parse_seed(args.seed.as_deref());
    if let Some(err) = seed_err {
        eprintln!("{}, falling back to wall-clock seed {}", err, seed);
    }

    let mut config = match &args.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load config from {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => {
            let preset = ErosionPreset::from_str(&args.preset).unwrap_or_else(|| {
                eprintln!("unknown preset '{}', using default", args.preset);
                ErosionPreset::Default
            });
            Config::from_preset(preset, seed)
        }
    };

    config.seed = seed;
    if let Some(tile_size) = args.tile_size {
        config.tile_size = tile_size;
    }
    if let Some(map_size) = args.map_size {
        config.map_size = map_size;
    }
    if let Some(cycles) = args.cycles_per_tick {
        config.cycles_per_tick = cycles;
    }
    if args.flood {
        config.flood_enabled = true;
    }

    if let Some(path) = &args.save_config {
        if let Err(e) = config.save_to_file(path) {
            eprintln!("failed to save config to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }

    let oracle = PerlinOracle::new(config.seed);
    let cycles_per_tick = config.cycles_per_tick;
    let mut world = match World::new(config, &oracle, args.island) {
        Ok(world) => world,
        Err(e) => {
            eprintln!("failed to build world: {}", e);
            std::process::exit(1);
        }
    };

    for _ in 0..args.ticks {
        if args.parallel {
            world.erode_parallel(cycles_per_tick);
        } else {
            world.erode(cycles_per_tick);
        }
    }

    let snapshot = world.snapshot();
    if let Some(path) = &args.export_discharge {
        if let Err(e) = image_export::export_discharge_png(&snapshot, path) {
            eprintln!("failed to export discharge PNG to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
    if let Some(path) = &args.export_momentum {
        if let Err(e) = image_export::export_momentum_png(&snapshot, path) {
            eprintln!("failed to export momentum PNG to {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}
