//! Fit-to-container viewport and screen/image coordinate conversion.
//!
//! The image is only ever shrunk to fit its container, never enlarged, and is
//! centred inside it. Drawing happens in canvas-local coordinates where the
//! canvas is exactly `canvas_size` large, so `image_to_screen` is a plain
//! multiplication by `scale`.

use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};

use egui::{Pos2, Rect, Vec2};

/// Scale and placement of an image inside its container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Image-to-canvas scale, always in `(0, 1]`
    pub scale: f32,
    /// Displayed canvas size, `image_size * scale`
    pub canvas_size: Vec2,
    /// Translation that centres the canvas in the container
    pub offset: Vec2,
}

impl Viewport {
    /// Compute the fit of an image inside a container.
    ///
    /// Returns `None` while either size is degenerate, e.g. before the
    /// container has been laid out or before the image dimensions are known.
    pub fn fit(image_size: Vec2, container_size: Vec2) -> Option<Self> {
        if !is_measured(image_size) || !is_measured(container_size) {
            return None;
        }

        let scale = (container_size.x / image_size.x)
            .min(container_size.y / image_size.y)
            .min(1.0);
        let canvas_size = image_size * scale;
        let offset = (container_size - canvas_size) / 2.0;

        Some(Self {
            scale,
            canvas_size,
            offset,
        })
    }

    /// Map a pointer position to image space, given where the canvas sits on screen.
    pub fn screen_to_image(&self, screen_pos: Pos2, canvas_rect: Rect) -> Pos2 {
        ((screen_pos - canvas_rect.min) / self.scale).to_pos2()
    }

    /// Map an image-space position to canvas-local coordinates.
    pub fn image_to_screen(&self, image_pos: Pos2) -> Pos2 {
        (image_pos.to_vec2() * self.scale).to_pos2()
    }

    /// Convert a screen-space distance into image-space pixels.
    pub fn screen_len_to_image(&self, len: f32) -> f32 {
        len / self.scale
    }

    /// Where the canvas should be placed inside a container starting at `container_min`.
    pub fn canvas_rect(&self, container_min: Pos2) -> Rect {
        Rect::from_min_size(container_min + self.offset, self.canvas_size)
    }
}

fn is_measured(size: Vec2) -> bool {
    size.x.is_finite() && size.y.is_finite() && size.x > 0.0 && size.y > 0.0
}

// ── Resize signal ───────────────────────────────────────────────────────────

/// Handle returned by [`ResizeSignal::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// A source of container-size measurements.
pub trait ResizeSignal {
    fn subscribe(&mut self, listener: Sender<Vec2>) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// A [`ResizeSignal`] fed by the host with the measured container size.
///
/// Only changed sizes are forwarded to subscribers.
#[derive(Debug, Default)]
pub struct ResizeBroadcaster {
    listeners: BTreeMap<SubscriptionId, Sender<Vec2>>,
    next_id: u64,
    last: Option<Vec2>,
}

impl ResizeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the current container size. Returns true when it changed.
    pub fn measure(&mut self, size: Vec2) -> bool {
        if self.last == Some(size) {
            return false;
        }
        self.last = Some(size);
        // Listeners whose receiver is gone are dropped.
        self.listeners.retain(|_, tx| tx.send(size).is_ok());
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }
}

impl ResizeSignal for ResizeBroadcaster {
    fn subscribe(&mut self, listener: Sender<Vec2>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        if let Some(size) = self.last {
            let _ = listener.send(size);
        }
        self.listeners.insert(id, listener);
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.remove(&id);
    }
}

// ── Tracker ─────────────────────────────────────────────────────────────────

/// Keeps the current [`Viewport`] in sync with image and container sizes.
#[derive(Debug)]
pub struct ViewportTracker {
    image_size: Option<Vec2>,
    container_size: Option<Vec2>,
    current: Option<Viewport>,
    resize_rx: Receiver<Vec2>,
    resize_tx: Sender<Vec2>,
    subscription: Option<SubscriptionId>,
}

impl Default for ViewportTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportTracker {
    pub fn new() -> Self {
        let (resize_tx, resize_rx) = mpsc::channel();
        Self {
            image_size: None,
            container_size: None,
            current: None,
            resize_rx,
            resize_tx,
            subscription: None,
        }
    }

    /// Start listening to a resize source, replacing any previous subscription.
    pub fn attach(&mut self, signal: &mut dyn ResizeSignal) {
        if let Some(id) = self.subscription.take() {
            signal.unsubscribe(id);
        }
        self.subscription = Some(signal.subscribe(self.resize_tx.clone()));
    }

    pub fn detach(&mut self, signal: &mut dyn ResizeSignal) {
        if let Some(id) = self.subscription.take() {
            signal.unsubscribe(id);
        }
    }

    /// Apply pending resize notifications. Returns true if the viewport changed.
    pub fn pump(&mut self) -> bool {
        let latest = self.resize_rx.try_iter().last();
        match latest {
            Some(size) => self.set_container_size(size),
            None => false,
        }
    }

    /// Returns true if the viewport changed.
    pub fn set_container_size(&mut self, size: Vec2) -> bool {
        self.container_size = Some(size);
        self.recompute()
    }

    /// Returns true if the viewport changed.
    pub fn set_image_size(&mut self, size: Option<Vec2>) -> bool {
        self.image_size = size;
        self.recompute()
    }

    pub fn image_size(&self) -> Option<Vec2> {
        self.image_size
    }

    pub fn current(&self) -> Option<Viewport> {
        self.current
    }

    fn recompute(&mut self) -> bool {
        let next = match (self.image_size, self.container_size) {
            (Some(image), Some(container)) => Viewport::fit(image, container),
            _ => None,
        };
        // A zero-sized container defers: keep the last good fit.
        let next = match (next, self.image_size) {
            (None, Some(_)) if self.container_size.is_some_and(|c| !is_measured(c)) => {
                self.current
            }
            _ => next,
        };
        let changed = next != self.current;
        if changed {
            log::debug!("Viewport changed: {:?}", next);
        }
        self.current = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_fit_halves_large_image() {
        let v = Viewport::fit(vec2(1600.0, 1200.0), vec2(800.0, 600.0)).unwrap();
        assert_eq!(v.scale, 0.5);
        assert_eq!(v.canvas_size, vec2(800.0, 600.0));
        assert_eq!(v.offset, vec2(0.0, 0.0));
    }

    #[test]
    fn test_fit_never_enlarges() {
        let v = Viewport::fit(vec2(200.0, 100.0), vec2(800.0, 600.0)).unwrap();
        assert_eq!(v.scale, 1.0);
        assert_eq!(v.canvas_size, vec2(200.0, 100.0));
        assert_eq!(v.offset, vec2(300.0, 250.0));
    }

    #[test]
    fn test_fit_limited_by_height() {
        let v = Viewport::fit(vec2(1000.0, 2000.0), vec2(800.0, 600.0)).unwrap();
        assert!(approx_eq(v.scale, 0.3));
        assert!(approx_eq(v.canvas_size.x, 300.0));
        assert!(approx_eq(v.canvas_size.y, 600.0));
        assert!(approx_eq(v.offset.x, 250.0));
        assert!(approx_eq(v.offset.y, 0.0));
    }

    #[test]
    fn test_fit_bounds_over_many_sizes() {
        let sizes = [1.0, 7.0, 64.0, 333.0, 640.0, 1024.0, 4000.0, 12345.0];
        for &w in &sizes {
            for &h in &sizes {
                for &cw in &sizes {
                    for &ch in &sizes {
                        let v = Viewport::fit(vec2(w, h), vec2(cw, ch)).unwrap();
                        assert!(v.scale <= 1.0);
                        assert!(v.scale > 0.0);
                        assert!(approx_eq(v.canvas_size.x, w * v.scale));
                        assert!(approx_eq(v.canvas_size.y, h * v.scale));
                        assert!(v.canvas_size.x <= cw + EPSILON);
                        assert!(v.canvas_size.y <= ch + EPSILON);
                        assert!(v.offset.x >= -EPSILON && v.offset.y >= -EPSILON);
                    }
                }
            }
        }
    }

    #[test]
    fn test_fit_defers_on_zero_container() {
        assert!(Viewport::fit(vec2(100.0, 100.0), vec2(0.0, 600.0)).is_none());
        assert!(Viewport::fit(vec2(100.0, 100.0), vec2(800.0, 0.0)).is_none());
        assert!(Viewport::fit(vec2(0.0, 100.0), vec2(800.0, 600.0)).is_none());
    }

    #[test]
    fn test_round_trip() {
        let v = Viewport::fit(vec2(1920.0, 1080.0), vec2(700.0, 500.0)).unwrap();
        let canvas = v.canvas_rect(pos2(13.0, 47.0));
        for &(x, y) in &[(0.0, 0.0), (1.0, 1.0), (960.5, 540.25), (1920.0, 1080.0)] {
            let p = pos2(x, y);
            let screen = canvas.min + v.image_to_screen(p).to_vec2();
            let back = v.screen_to_image(screen, canvas);
            assert!((back.x - p.x).abs() < 0.01);
            assert!((back.y - p.y).abs() < 0.01);
        }
    }

    #[test]
    fn test_screen_to_image_subtracts_origin() {
        let v = Viewport::fit(vec2(1600.0, 1200.0), vec2(800.0, 600.0)).unwrap();
        let canvas = Rect::from_min_size(pos2(100.0, 50.0), v.canvas_size);
        let p = v.screen_to_image(pos2(150.0, 100.0), canvas);
        assert_eq!(p, pos2(100.0, 100.0));
        assert_eq!(v.screen_len_to_image(15.0), 30.0);
    }

    #[test]
    fn test_broadcaster_only_emits_changes() {
        let mut signal = ResizeBroadcaster::new();
        let (tx, rx) = mpsc::channel();
        let id = signal.subscribe(tx);

        assert!(signal.measure(vec2(800.0, 600.0)));
        assert!(!signal.measure(vec2(800.0, 600.0)));
        assert!(signal.measure(vec2(640.0, 480.0)));
        let received: Vec<Vec2> = rx.try_iter().collect();
        assert_eq!(received, vec![vec2(800.0, 600.0), vec2(640.0, 480.0)]);

        signal.unsubscribe(id);
        assert_eq!(signal.subscriber_count(), 0);
        signal.measure(vec2(1.0, 1.0));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tracker_recomputes_on_resize_and_image() {
        let mut signal = ResizeBroadcaster::new();
        let mut tracker = ViewportTracker::new();
        tracker.attach(&mut signal);

        signal.measure(vec2(800.0, 600.0));
        assert!(!tracker.pump());
        assert!(tracker.current().is_none());

        assert!(tracker.set_image_size(Some(vec2(1600.0, 1200.0))));
        assert_eq!(tracker.current().unwrap().scale, 0.5);

        signal.measure(vec2(400.0, 600.0));
        assert!(tracker.pump());
        assert_eq!(tracker.current().unwrap().scale, 0.25);

        tracker.detach(&mut signal);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn test_tracker_keeps_last_fit_while_container_collapsed() {
        let mut tracker = ViewportTracker::new();
        tracker.set_image_size(Some(vec2(1600.0, 1200.0)));
        tracker.set_container_size(vec2(800.0, 600.0));
        let before = tracker.current();
        assert!(before.is_some());

        assert!(!tracker.set_container_size(vec2(0.0, 0.0)));
        assert_eq!(tracker.current(), before);

        assert!(tracker.set_image_size(None));
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_late_subscriber_gets_last_size() {
        let mut signal = ResizeBroadcaster::new();
        signal.measure(vec2(300.0, 200.0));

        let mut tracker = ViewportTracker::new();
        tracker.attach(&mut signal);
        tracker.set_image_size(Some(vec2(600.0, 400.0)));
        tracker.pump();
        assert_eq!(tracker.current().unwrap().scale, 0.5);
    }
}
