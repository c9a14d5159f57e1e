//! Particle-based hydraulic erosion core.
//!
//! A grid-backed simulation that spawns water drops, descends them along
//! the surface gradient, exchanges sediment, and low-pass-filters the
//! resulting discharge and momentum into persistent fields that steer
//! subsequent drops. A talus cascade operator keeps slopes stable, an
//! optional flood operator grows lakes, and a small vegetation model
//! couples root density back into erosion.

pub mod cascade;
pub mod cellpool;
pub mod config;
pub mod drop;
pub mod error;
pub mod image_export;
pub mod mathutil;
pub mod terrain;
pub mod vegetation;
pub mod world;
