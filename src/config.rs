//! Simulation configuration, in the spirit of the grounding repo's
//! `ErosionParams`/`ErosionPreset` pair: one flat record of tunables with a
//! sensible `Default`, plus a small enum of named presets a caller can pick
//! from the CLI instead of hand-tuning every field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical world constants and per-operator tunables. Every field here is
/// surfaced as a CLI flag in `main.rs`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub seed: u64,
    pub tile_size: usize,
    pub map_size: usize,
    pub map_scale: f32,

    pub lrate: f32,
    pub maxdiff: f32,
    pub settling: f32,

    pub gravity: f32,
    pub momentum_transfer: f32,
    pub entrainment: f32,
    pub evap_rate: f32,
    pub deposition_rate: f32,
    pub min_vol: f32,
    pub max_age: u32,
    pub cycles_per_tick: usize,

    pub flood_enabled: bool,
    pub flood_volume_factor: f32,
    pub flood_delta: f32,
    pub flood_max_fail: u32,

    pub plant_max_size: f32,
    pub plant_grow_rate: f32,
    pub plant_max_steep: f32,
    pub plant_max_discharge: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 0,
            tile_size: 512,
            map_size: 1,
            map_scale: 80.0,

            lrate: 0.1,
            maxdiff: 0.01,
            settling: 0.8,

            gravity: 1.0,
            momentum_transfer: 1.0,
            entrainment: 10.0,
            evap_rate: 0.001,
            deposition_rate: 0.1,
            min_vol: 0.01,
            max_age: 500,
            cycles_per_tick: 500,

            flood_enabled: false,
            flood_volume_factor: 0.5,
            flood_delta: 0.001,
            flood_max_fail: 10,

            plant_max_size: 1.5,
            plant_grow_rate: 0.05,
            plant_max_steep: 0.8,
            plant_max_discharge: 0.3,
        }
    }
}

/// A JSON-shaped read/write failure, separate from [`crate::error::EngineError`]
/// since it only ever happens at the CLI boundary, never inside the core.
#[derive(Debug)]
pub enum ConfigFileError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for ConfigFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileError::Io(e) => write!(f, "config file error: {}", e),
            ConfigFileError::Json(e) => write!(f, "config file is not valid JSON: {}", e),
        }
    }
}

impl std::error::Error for ConfigFileError {}

impl Config {
    /// Load a config from a JSON file, in the style of the grounding repo's
    /// `simulation::export` writers (`serde_json` over a `File`).
    pub fn load_from_file(path: &std::path::Path) -> Result<Self, ConfigFileError> {
        let file = std::fs::File::open(path).map_err(ConfigFileError::Io)?;
        serde_json::from_reader(file).map_err(ConfigFileError::Json)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigFileError> {
        let file = std::fs::File::create(path).map_err(ConfigFileError::Io)?;
        serde_json::to_writer_pretty(file, self).map_err(ConfigFileError::Json)
    }

    pub fn from_preset(preset: ErosionPreset, seed: u64) -> Self {
        let mut cfg = Self { seed, ..Self::default() };
        match preset {
            ErosionPreset::Default => {}
            ErosionPreset::Fast => {
                cfg.cycles_per_tick = 100;
            }
            ErosionPreset::HighQuality => {
                cfg.cycles_per_tick = 2000;
                cfg.map_scale = 120.0;
            }
            ErosionPreset::Lakes => {
                cfg.flood_enabled = true;
                cfg.cycles_per_tick = 800;
            }
            ErosionPreset::Barren => {
                cfg.plant_max_discharge = 0.0;
            }
        }
        cfg
    }
}

/// Named starting points for `Config`, surfaced on the CLI as `--preset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErosionPreset {
    Default,
    Fast,
    HighQuality,
    Lakes,
    Barren,
}

impl ErosionPreset {
    pub fn all() -> &'static [ErosionPreset] {
        &[
            ErosionPreset::Default,
            ErosionPreset::Fast,
            ErosionPreset::HighQuality,
            ErosionPreset::Lakes,
            ErosionPreset::Barren,
        ]
    }

    pub fn from_str(s: &str) -> Option<ErosionPreset> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Some(ErosionPreset::Default),
            "fast" => Some(ErosionPreset::Fast),
            "high_quality" | "high-quality" => Some(ErosionPreset::HighQuality),
            "lakes" => Some(ErosionPreset::Lakes),
            "barren" => Some(ErosionPreset::Barren),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ErosionPreset::Default => "canonical settings matching the reference simulation",
            ErosionPreset::Fast => "fewer drops per tick, coarser rivers, quick iteration",
            ErosionPreset::HighQuality => "many drops per tick, exaggerated relief",
            ErosionPreset::Lakes => "flood operator enabled, drops pool into lakes",
            ErosionPreset::Barren => "vegetation never gates erosion; bare rock everywhere",
        }
    }
}

impl fmt::Display for ErosionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErosionPreset::Default => "default",
            ErosionPreset::Fast => "fast",
            ErosionPreset::HighQuality => "high_quality",
            ErosionPreset::Lakes => "lakes",
            ErosionPreset::Barren => "barren",
        };
        write!(f, "{}", name)
    }
}
