//! Seeded window sampling over a bounded image.

use glam::UVec2;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Sub-rectangle of an image used as the pipeline input for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Window {
    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    /// True when the window keeps the one-pixel halo margin on every side of `image`.
    pub fn fits_with_margin(&self, image: UVec2) -> bool {
        self.x > 0
            && self.y > 0
            && u64::from(self.x) + u64::from(self.width) < u64::from(image.x).saturating_sub(1)
            && u64::from(self.y) + u64::from(self.height) < u64::from(image.y).saturating_sub(1)
    }
}

/// Draws window origins uniformly from `[1, cols - w - 2] × [1, rows - h - 2]`.
///
/// The sampler holds no generator of its own: callers pass one in by `&mut`, so paired
/// backends consume a single stream and nothing is replayed by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSampler {
    window: UVec2,
    max_x: u32,
    max_y: u32,
}

impl WindowSampler {
    pub fn new(image: UVec2, window: UVec2) -> Result<Self> {
        if window.x == 0 || window.y == 0 {
            return Err(HarnessError::invalid(format!(
                "window {}x{} has an empty side",
                window.x, window.y
            )));
        }
        let max_x = i64::from(image.x) - i64::from(window.x) - 2;
        let max_y = i64::from(image.y) - i64::from(window.y) - 2;
        if max_x < 1 || max_y < 1 {
            return Err(HarnessError::invalid(format!(
                "window {}x{} does not fit image {}x{} with a one-pixel margin",
                window.x, window.y, image.x, image.y
            )));
        }
        debug!(?image, ?window, max_x, max_y, "window sampler ready");
        Ok(Self {
            window,
            max_x: max_x as u32,
            max_y: max_y as u32,
        })
    }

    pub fn window_size(&self) -> UVec2 {
        self.window
    }

    /// Inclusive upper bounds of the origin intervals.
    pub fn origin_bounds(&self) -> UVec2 {
        UVec2::new(self.max_x, self.max_y)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Window {
        let x = rng.gen_range(1..=self.max_x);
        let y = rng.gen_range(1..=self.max_y);
        Window {
            x,
            y,
            width: self.window.x,
            height: self.window.y,
        }
    }

    /// Lazy, unbounded stream of windows drawn from `rng`.
    pub fn windows<'a, R: Rng + ?Sized>(&'a self, rng: &'a mut R) -> Windows<'a, R> {
        Windows { sampler: self, rng }
    }
}

pub struct Windows<'a, R: ?Sized> {
    sampler: &'a WindowSampler,
    rng: &'a mut R,
}

impl<R: Rng + ?Sized> Iterator for Windows<'_, R> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        Some(self.sampler.sample(&mut *self.rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn draws_stay_inside_margins() {
        let image = UVec2::new(100, 100);
        let sampler = WindowSampler::new(image, UVec2::new(10, 10)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0xA11CE);
        for window in sampler.windows(&mut rng).take(10_000) {
            assert!((1..=88).contains(&window.x), "x out of range: {window:?}");
            assert!((1..=88).contains(&window.y), "y out of range: {window:?}");
            assert!(window.fits_with_margin(image));
        }
    }

    #[test]
    fn both_interval_ends_are_reachable() {
        let sampler = WindowSampler::new(UVec2::new(16, 14), UVec2::new(10, 10)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let (mut xs, mut ys) = (Vec::new(), Vec::new());
        for window in sampler.windows(&mut rng).take(500) {
            xs.push(window.x);
            ys.push(window.y);
        }
        assert_eq!(xs.iter().min(), Some(&1));
        assert_eq!(xs.iter().max(), Some(&4));
        assert_eq!(ys.iter().min(), Some(&1));
        assert_eq!(ys.iter().max(), Some(&2));
    }

    #[test]
    fn same_seed_replays_same_windows() {
        let sampler = WindowSampler::new(UVec2::new(640, 480), UVec2::new(64, 128)).unwrap();
        let mut first = ChaCha8Rng::seed_from_u64(42);
        let mut second = ChaCha8Rng::seed_from_u64(42);
        let a: Vec<_> = sampler.windows(&mut first).take(32).collect();
        let b: Vec<_> = sampler.windows(&mut second).take(32).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn shared_generator_keeps_advancing() {
        let sampler = WindowSampler::new(UVec2::new(640, 480), UVec2::new(64, 128)).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let a: Vec<_> = sampler.windows(&mut rng).take(32).collect();
        let b: Vec<_> = sampler.windows(&mut rng).take(32).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_windows_without_margin() {
        assert!(WindowSampler::new(UVec2::new(12, 12), UVec2::new(10, 10)).is_err());
        assert!(WindowSampler::new(UVec2::new(13, 13), UVec2::new(10, 10)).is_ok());
        assert!(WindowSampler::new(UVec2::new(8, 100), UVec2::new(10, 10)).is_err());
        assert!(WindowSampler::new(UVec2::new(100, 100), UVec2::new(0, 10)).is_err());
    }
}
