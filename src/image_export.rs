//! Optional PNG snapshots of the discharge and momentum fields, in the
//! style of the grounding repo's debug binaries: build an `ImageBuffer`
//! pixel by pixel from the simulation state, then `save` it.

use crate::world::Snapshot;
use image::{ImageBuffer, Rgb, RgbImage};
use std::path::Path;

/// A user-supplied encoding from (discharge, momentum) to a color. The core
/// never hardcodes a single visualization; this is the "optional image
/// sink" collaborator hook.
pub type Encoder = dyn Fn(f32, (f32, f32)) -> [u8; 3];

pub fn default_discharge_encoder(discharge: f32, _momentum: (f32, f32)) -> [u8; 3] {
    let v = (discharge.clamp(0.0, 1.0) * 255.0) as u8;
    [20, 20 + v / 2, v]
}

pub fn default_momentum_encoder(_discharge: f32, momentum: (f32, f32)) -> [u8; 3] {
    let mag = (momentum.0 * momentum.0 + momentum.1 * momentum.1).sqrt();
    let v = (mag.min(1.0) * 255.0) as u8;
    [v, v / 2, 40]
}

fn export(snapshot: &Snapshot, path: &Path, encoder: &Encoder) -> Result<(), image::ImageError> {
    let res = snapshot.world_resolution() as u32;
    let mut img: RgbImage = ImageBuffer::new(res, res);

    for y in 0..res {
        for x in 0..res {
            let p = (x as i32, y as i32);
            let discharge = snapshot.discharge(p);
            let momentum = snapshot.momentum(p).unwrap_or((0.0, 0.0));
            img.put_pixel(x, y, Rgb(encoder(discharge, momentum)));
        }
    }

    img.save(path)
}

pub fn export_discharge_png(snapshot: &Snapshot, path: &Path) -> Result<(), image::ImageError> {
    export(snapshot, path, &default_discharge_encoder)
}

pub fn export_momentum_png(snapshot: &Snapshot, path: &Path) -> Result<(), image::ImageError> {
    export(snapshot, path, &default_momentum_encoder)
}
