//! Debug tool for comparing erosion presets visually.
//! Generates a grid of shaded heightmaps, one per [`ErosionPreset`], all
//! started from the same seed and terrain so the only difference between
//! cells is the preset's tunables.

use hydraulic_erosion::config::{Config, ErosionPreset};
use hydraulic_erosion::terrain::PerlinOracle;
use hydraulic_erosion::world::World;
use image::{ImageBuffer, Rgb, RgbImage};

const TILE_SIZE: usize = 128;
const SEED: u64 = 42;
const TICKS: u64 = 20;

fn main() {
    println!("Generating erosion preset comparison grid...");

    let mut images: Vec<(String, RgbImage)> = Vec::new();

    for preset in ErosionPreset::all() {
        println!("  Processing: {}", preset);
        let config = Config {
            tile_size: TILE_SIZE,
            map_size: 1,
            ..Config::from_preset(*preset, SEED)
        };
        let oracle = PerlinOracle::new(config.seed);
        let mut world = World::new(config, &oracle, true).expect("tile_size > 0 always succeeds");

        for _ in 0..TICKS {
            world.erode(world.config.cycles_per_tick);
        }

        let img = render_shaded(&world);
        images.push((preset.to_string(), img));
    }

    let grid = create_grid(&images, 3, 2);
    grid.save("erosion_preset_comparison.png")
        .expect("failed to save comparison grid");

    println!("Saved erosion_preset_comparison.png");
}

/// Render a hillshaded, discharge-tinted heightmap: base color from
/// elevation and lighting from the surface normal, darkened and
/// blue-shifted where discharge is high (rivers).
fn render_shaded(world: &World) -> RgbImage {
    let snapshot = world.snapshot();
    let res = snapshot.world_resolution();
    let mut img: RgbImage = ImageBuffer::new(res as u32, res as u32);

    let light_x = -0.7f32;
    let light_y = -0.7f32;
    let light_z = 0.5f32;
    let light_len = (light_x * light_x + light_y * light_y + light_z * light_z).sqrt();
    let (lx, ly, lz) = (light_x / light_len, light_y / light_len, light_z / light_len);

    for y in 0..res {
        for x in 0..res {
            let p = (x, y);
            let h = snapshot.height(p).unwrap_or(0.0);

            let h_left = snapshot.height((x - 1, y)).unwrap_or(h);
            let h_right = snapshot.height((x + 1, y)).unwrap_or(h);
            let h_up = snapshot.height((x, y - 1)).unwrap_or(h);
            let h_down = snapshot.height((x, y + 1)).unwrap_or(h);

            let scale = 4.0;
            let nx = (h_left - h_right) * scale;
            let ny = (h_up - h_down) * scale;
            let nz = 1.0f32;
            let nlen = (nx * nx + ny * ny + nz * nz).sqrt();
            let (nx, ny, nz) = (nx / nlen, ny / nlen, nz / nlen);

            let diffuse = (nx * lx + ny * ly + nz * lz).max(0.0);
            let ambient = 0.35;
            let lighting = (ambient + (1.0 - ambient) * diffuse).min(1.0);

            let base = if h < 0.15 {
                Rgb([40, 80, 140])
            } else if h < 0.45 {
                Rgb([80, 140, 60])
            } else if h < 0.75 {
                let t = (h - 0.45) / 0.3;
                let r = (80.0 + t * 80.0) as u8;
                let g = (140.0 - t * 60.0) as u8;
                let b = (60.0 - t * 20.0) as u8;
                Rgb([r, g, b])
            } else {
                Rgb([235, 235, 240])
            };

            let discharge = snapshot.discharge(p).clamp(0.0, 1.0);
            let river_mix = discharge.powf(0.5);
            let r = (base[0] as f32 * (1.0 - river_mix) * lighting) as u8;
            let g = (base[1] as f32 * (1.0 - river_mix) * lighting + 60.0 * river_mix) as u8;
            let b = (base[2] as f32 * (1.0 - river_mix) * lighting + 140.0 * river_mix) as u8;

            img.put_pixel(x as u32, y as u32, Rgb([r, g, b]));
        }
    }

    img
}

fn create_grid(images: &[(String, RgbImage)], cols: usize, rows: usize) -> RgbImage {
    if images.is_empty() {
        return ImageBuffer::new(1, 1);
    }

    let cell_width = images[0].1.width();
    let cell_height = images[0].1.height();
    let label_height = 20u32;
    let total_cell_height = cell_height + label_height;

    let grid_width = cell_width * cols as u32;
    let grid_height = total_cell_height * rows as u32;

    let mut grid: RgbImage = ImageBuffer::from_pixel(grid_width, grid_height, Rgb([40, 40, 40]));

    for (idx, (name, img)) in images.iter().enumerate() {
        let col = idx % cols;
        let row = idx / cols;
        if row >= rows {
            break;
        }

        let x_offset = col as u32 * cell_width;
        let y_offset = row as u32 * total_cell_height + label_height;

        for y in 0..cell_height {
            for x in 0..cell_width {
                let pixel = img.get_pixel(x, y);
                grid.put_pixel(x_offset + x, y_offset + y, *pixel);
            }
        }

        for y in 0..label_height {
            for x in 0..cell_width {
                grid.put_pixel(x_offset + x, row as u32 * total_cell_height + y, Rgb([30, 30, 30]));
            }
        }

        draw_text(&mut grid, x_offset + 5, row as u32 * total_cell_height + 5, name);
    }

    grid
}

// Simple 5x7 bitmap font for basic characters.
fn get_char_bitmap(c: char) -> [u8; 7] {
    match c {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00110, 0b01000, 0b10000, 0b11111],
        '3' => [0b01110, 0b10001, 0b00001, 0b00110, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        'A' | 'a' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' | 'b' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' | 'c' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' | 'd' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' | 'e' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' | 'f' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' | 'g' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01110],
        'H' | 'h' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' | 'i' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' | 'j' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' | 'k' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' | 'l' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' | 'm' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' | 'n' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' | 'o' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' | 'p' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' | 'q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' | 'r' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' | 's' => [0b01110, 0b10001, 0b10000, 0b01110, 0b00001, 0b10001, 0b01110],
        'T' | 't' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' | 'u' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' | 'v' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' | 'w' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'X' | 'x' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' | 'y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' | 'z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '+' => [0b00000, 0b00100, 0b00100, 0b11111, 0b00100, 0b00100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '=' => [0b00000, 0b00000, 0b11111, 0b00000, 0b11111, 0b00000, 0b00000],
        _ => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000],
    }
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str) {
    let white = Rgb([255, 255, 255]);
    let char_width = 6u32;

    for (i, c) in text.chars().enumerate() {
        let cx = x + (i as u32 * char_width);
        if cx + 5 >= img.width() {
            break;
        }

        let bitmap = get_char_bitmap(c);
        for (row, &bits) in bitmap.iter().enumerate() {
            for col in 0..5 {
                if (bits >> (4 - col)) & 1 == 1 {
                    let px = cx + col;
                    let py = y + row as u32;
                    if px < img.width() && py < img.height() {
                        img.put_pixel(px, py, white);
                    }
                }
            }
        }
    }
}
