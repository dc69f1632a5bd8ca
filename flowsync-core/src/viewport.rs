//! Viewport state and the canvas ⇄ screen transform.
//!
//! ```text
//! screen = canvas × zoom + pan
//! canvas = (screen − pan) ÷ zoom
//! ```
//!
//! `pan` is measured in screen pixels relative to the render surface's
//! bounding box. Both directions are recomputed on every call; nothing here
//! caches a projected point, because pan and zoom change continuously while
//! the user interacts with the canvas.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Smallest zoom factor a viewport accepts.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest zoom factor a viewport accepts.
pub const MAX_ZOOM: f64 = 50.0;

/// Pan/zoom state of the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Horizontal pan offset in screen pixels.
    pub x: f64,
    /// Vertical pan offset in screen pixels.
    pub y: f64,
    /// Scale factor, always within [`MIN_ZOOM`, `MAX_ZOOM`].
    pub zoom: f64,
}

impl Viewport {
    pub const IDENTITY: Viewport = Viewport { x: 0.0, y: 0.0, zoom: 1.0 };

    /// Build a viewport, clamping `zoom` into the accepted range.
    ///
    /// A non-finite zoom falls back to `1.0` and a non-finite pan to `0.0`,
    /// so the transform stays finite and invertible.
    pub fn new(x: f64, y: f64, zoom: f64) -> Self {
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        Self {
            x: finite_or_zero(x),
            y: finite_or_zero(y),
            zoom,
        }
    }

    /// Re-apply the bounds of [`Viewport::new`] to a value whose public
    /// fields may have been set directly.
    pub fn normalized(self) -> Self {
        Self::new(self.x, self.y, self.zoom)
    }

    /// Map a canvas-space point to screen pixels.
    pub fn to_screen(&self, point: Point) -> Point {
        Point {
            x: point.x * self.zoom + self.x,
            y: point.y * self.zoom + self.y,
        }
    }

    /// Map a screen-space point (relative to the render surface) to canvas space.
    pub fn to_canvas(&self, point: Point) -> Point {
        Point {
            x: (point.x - self.x) / self.zoom,
            y: (point.y - self.y) / self.zoom,
        }
    }

    /// Pan by a delta measured in screen pixels. Non-finite deltas are ignored.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        if !(dx.is_finite() && dy.is_finite()) {
            log::debug!("Ignoring non-finite pan ({dx}, {dy})");
            return;
        }
        self.x = finite_or_zero(self.x + dx);
        self.y = finite_or_zero(self.y + dy);
    }

    /// Zoom by `factor` around the screen point `anchor`.
    ///
    /// The canvas point under `anchor` stays under `anchor`. A factor that
    /// is not finite and positive, or a non-finite anchor, leaves the
    /// viewport unchanged.
    pub fn zoom_at(&mut self, anchor: Point, factor: f64) {
        let usable = factor.is_finite() && factor > 0.0 && anchor.x.is_finite() && anchor.y.is_finite();
        if !usable {
            log::debug!("Ignoring zoom by {factor} at ({}, {})", anchor.x, anchor.y);
            return;
        }
        let fixed = self.to_canvas(anchor);

        self.zoom = (self.zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);

        self.x = anchor.x - fixed.x * self.zoom;
        self.y = anchor.y - fixed.y * self.zoom;
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::IDENTITY
    }
}
