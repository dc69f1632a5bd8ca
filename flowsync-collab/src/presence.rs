//! Remote collaborator cursors.
//!
//! ## Data flow
//!
//! ```text
//! update_mouse {x, y, conn_id}   (canvas space)
//!       │
//!       ▼
//! PresenceStore::on_remote_cursor()  ──► Throttle (per conn_id)
//!       │                                      │ window elapsed
//!       ▼                                      ▼
//! PresenceStore::flush_due(viewport) ──► Viewport::to_screen ──► collaborators
//! ```
//!
//! Each collaborator keeps its last canvas position and a derived screen
//! position. The screen position is recomputed whenever the viewport
//! changes ([`PresenceStore::reproject`]), never cached across one.

use std::collections::HashMap;
use std::time::Duration;

use flowsync_core::{Point, Viewport};
use serde::{Deserialize, Serialize};

use crate::throttle::{Throttle, ThrottleStats};

// ───────────────────────────────────────────────────────────────────
// Cursor color
// ───────────────────────────────────────────────────────────────────

/// RGBA color for cursor rendering, components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    const SATURATION: f32 = 0.8;
    const LIGHTNESS: f32 = 0.6;

    /// Stable color for a connection id.
    ///
    /// The hue is the sum of the id's character codes (dashes removed)
    /// modulo 360, so every participant derives the same color for a peer.
    pub fn from_conn_id(conn_id: &str) -> Self {
        let hue = Self::hue_of(conn_id);
        let (r, g, b) = hsl_to_rgb(hue as f32 / 360.0, Self::SATURATION, Self::LIGHTNESS);
        Self { r, g, b, a: 1.0 }
    }

    /// Hue in whole degrees for a connection id.
    pub fn hue_of(conn_id: &str) -> u32 {
        let sum: u64 = conn_id
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c as u64)
            .sum();
        (sum % 360) as u32
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self { r: 0.26, g: 0.52, b: 0.96, a: 1.0 }
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Presence store
// ───────────────────────────────────────────────────────────────────

/// A remote participant's pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collaborator {
    pub conn_id: String,
    /// Last applied position, canvas space.
    pub canvas: Point,
    /// `canvas` projected through the current viewport.
    pub screen: Point,
    pub color: CursorColor,
}

/// `conn_id → cursor` map with throttled writes.
#[derive(Debug, Clone)]
pub struct PresenceStore {
    peers: HashMap<String, Collaborator>,
    throttle: Throttle<String, Point>,
}

impl PresenceStore {
    pub fn new(throttle_window: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            throttle: Throttle::new(throttle_window),
        }
    }

    /// Queue a remote cursor position (canvas space).
    ///
    /// Nothing is visible until [`PresenceStore::flush_due`] releases it;
    /// a burst for the same connection collapses to its last position.
    pub fn on_remote_cursor(&mut self, conn_id: &str, canvas: Point, now: Duration) {
        self.throttle.offer(conn_id.to_owned(), canvas, now);
    }

    /// Apply every update whose throttle window has elapsed, projecting it
    /// through `viewport`. Returns the number of collaborators written.
    pub fn flush_due(&mut self, now: Duration, viewport: &Viewport) -> usize {
        let released = self.throttle.drain_due(now);
        let applied = released.len();

        for (conn_id, canvas) in released {
            let screen = viewport.to_screen(canvas);
            match self.peers.get_mut(&conn_id) {
                Some(peer) => {
                    peer.canvas = canvas;
                    peer.screen = screen;
                }
                None => {
                    log::debug!("collaborator {conn_id} appeared");
                    let color = CursorColor::from_conn_id(&conn_id);
                    self.peers.insert(
                        conn_id.clone(),
                        Collaborator { conn_id, canvas, screen, color },
                    );
                }
            }
        }
        applied
    }

    /// Remove a collaborator and anything still pending for it.
    ///
    /// Unknown ids are a no-op. Returns whether an entry was removed.
    pub fn on_disconnect(&mut self, conn_id: &str) -> bool {
        let key = conn_id.to_owned();
        let had_pending = self.throttle.cancel(&key).is_some();
        let removed = self.peers.remove(conn_id).is_some();
        if removed || had_pending {
            log::debug!("collaborator {conn_id} left");
        }
        removed
    }

    /// Recompute every screen position against a new viewport.
    pub fn reproject(&mut self, viewport: &Viewport) {
        for peer in self.peers.values_mut() {
            peer.screen = viewport.to_screen(peer.canvas);
        }
    }

    /// Forget every collaborator and pending update.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.throttle.clear();
    }

    /// When the next pending update becomes due, if any.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.throttle.next_deadline()
    }

    pub fn collaborator(&self, conn_id: &str) -> Option<&Collaborator> {
        self.peers.get(conn_id)
    }

    /// Collaborators sorted by connection id.
    pub fn collaborators(&self) -> Vec<Collaborator> {
        let mut peers: Vec<Collaborator> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.conn_id.cmp(&b.conn_id));
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.throttle.pending_len()
    }

    pub fn throttle_stats(&self) -> ThrottleStats {
        self.throttle.stats()
    }
}
