use std::f32::consts::PI;

use crate::cpu::Scalar;

/// Per-pixel gradient of an interleaved `width × height × channels` window.
///
/// Centered differences, with the neighbour index clamped at the window edge. For multi-channel
/// input the channel with the largest squared magnitude wins (first one on ties). Phase is
/// unsigned and lands in `[0, π)`.
pub fn gradient(
    pixels: &[Scalar],
    width: usize,
    height: usize,
    channels: usize,
    magnitude: &mut [Scalar],
    phase: &mut [Scalar],
) {
    debug_assert_eq!(pixels.len(), width * height * channels);
    debug_assert_eq!(magnitude.len(), width * height);
    debug_assert_eq!(phase.len(), width * height);

    let texel = |x: usize, y: usize, c: usize| pixels[(y * width + x) * channels + c];

    for y in 0..height {
        let up = y.saturating_sub(1);
        let down = (y + 1).min(height - 1);
        for x in 0..width {
            let left = x.saturating_sub(1);
            let right = (x + 1).min(width - 1);

            let mut best = -1.0;
            let (mut best_dx, mut best_dy) = (0.0, 0.0);
            for c in 0..channels {
                let dx = texel(right, y, c) - texel(left, y, c);
                let dy = texel(x, down, c) - texel(x, up, c);
                let strength = dx * dx + dy * dy;
                if strength > best {
                    best = strength;
                    best_dx = dx;
                    best_dy = dy;
                }
            }

            let index = y * width + x;
            magnitude[index] = best.sqrt();
            phase[index] = fold_angle(best_dy.atan2(best_dx));
        }
    }
}

/// Maps an `atan2` result onto `[0, π)`.
pub fn fold_angle(angle: Scalar) -> Scalar {
    let mut angle = angle;
    if angle < 0.0 {
        angle += PI;
    }
    if angle >= PI {
        angle -= PI;
    }
    angle
}
