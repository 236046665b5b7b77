use std::f32::consts::PI;

use glam::UVec2;
use hog_core::HogSettings;

use crate::cpu::Scalar;

const EPSILON: Scalar = 1e-6;

/// Orientation bin for an unsigned phase in `[0, π)`.
pub fn orientation_bin(phase: Scalar, num_bins: u32) -> usize {
    let bin = (phase / PI * num_bins as Scalar) as u32;
    bin.min(num_bins - 1) as usize
}

/// Assembles the block-normalized descriptor of one window.
///
/// Blocks are visited row by row. Inside a block, each cell contributes a magnitude-weighted
/// histogram (hard binning), and the concatenated block histogram is L2-normalized.
/// `scratch` is resized to one block histogram and reused across calls.
pub fn descriptor(
    hog: &HogSettings,
    window: UVec2,
    magnitude: &[Scalar],
    phase: &[Scalar],
    out: &mut [Scalar],
    scratch: &mut Vec<Scalar>,
) {
    let width = window.x as usize;
    let cell = hog.cell_size as usize;
    let block_cells = hog.block_cells as usize;
    let bins = hog.num_bins as usize;
    let blocks = hog.blocks(window);
    let block_len = hog.block_len();
    debug_assert_eq!(out.len(), hog.descriptor_length(window));

    scratch.resize(block_len, 0.0);
    for by in 0..blocks.y as usize {
        for bx in 0..blocks.x as usize {
            scratch.fill(0.0);
            for cy in 0..block_cells {
                for cx in 0..block_cells {
                    let cell_base = (cy * block_cells + cx) * bins;
                    let x0 = (bx + cx) * cell;
                    let y0 = (by + cy) * cell;
                    for py in 0..cell {
                        for px in 0..cell {
                            let index = (y0 + py) * width + x0 + px;
                            let bin = orientation_bin(phase[index], hog.num_bins);
                            scratch[cell_base + bin] += magnitude[index];
                        }
                    }
                }
            }

            let norm_sq: Scalar = scratch.iter().map(|v| v * v).sum();
            let scale = 1.0 / (norm_sq + EPSILON).sqrt();
            let out_base = (by * blocks.x as usize + bx) * block_len;
            for (dst, value) in out[out_base..out_base + block_len].iter_mut().zip(scratch.iter()) {
                *dst = value * scale;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HogSettings {
        HogSettings::default()
    }

    #[test]
    fn bins_cover_half_circle() {
        assert_eq!(orientation_bin(0.0, 9), 0);
        assert_eq!(orientation_bin(PI / 9.0 * 4.5, 9), 4);
        assert_eq!(orientation_bin(PI - 1e-4, 9), 8);
        // rounding up to π still lands in the last bin
        assert_eq!(orientation_bin(PI, 9), 8);
    }

    #[test]
    fn blocks_are_unit_length() {
        let window = UVec2::new(16, 16);
        let n = 16 * 16;
        let magnitude: Vec<f32> = (0..n).map(|i| (i % 7) as f32 + 0.5).collect();
        let phase: Vec<f32> = (0..n).map(|i| (i % 13) as f32 * 0.2).collect();
        let mut out = vec![0.0; settings().descriptor_length(window)];
        let mut scratch = Vec::new();
        descriptor(&settings(), window, &magnitude, &phase, &mut out, &mut scratch);

        assert_eq!(out.len(), 36);
        let norm: f32 = out.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4, "norm = {norm}");
    }

    #[test]
    fn single_orientation_fills_one_bin_per_cell() {
        let window = UVec2::new(16, 16);
        let magnitude = vec![1.0; 256];
        let phase = vec![PI / 2.0; 256];
        let mut out = vec![0.0; 36];
        descriptor(&settings(), window, &magnitude, &phase, &mut out, &mut Vec::new());
        for cell in 0..4 {
            for bin in 0..9 {
                let value = out[cell * 9 + bin];
                if bin == 4 {
                    assert!((value - 0.5).abs() < 1e-4);
                } else {
                    assert_eq!(value, 0.0);
                }
            }
        }
    }

    #[test]
    fn zero_magnitude_gives_zero_descriptor() {
        let window = UVec2::new(64, 128);
        let len = settings().descriptor_length(window);
        let mut out = vec![1.0; len];
        let zeros = vec![0.0; 64 * 128];
        descriptor(&settings(), window, &zeros, &zeros, &mut out, &mut Vec::new());
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
