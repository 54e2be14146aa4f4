//! A single annotation session: one image, its points, its overlays.
//!
//! The session is what a host embeds. It takes [`SessionProps`] from the host,
//! reports point changes back through the change listener, and turns pointer
//! events and list-view actions into store operations.

use std::sync::Arc;

use egui::{Rect, Vec2};

use crate::config::AnnotatorConfig;
use crate::interaction::{Interaction, InteractionState, Outcome, PointerEvent};
use crate::loader::{ImageLoader, LoadState, LoadedImage, SourceFetcher, WakeFn};
use crate::model::AnnotationPoint;
use crate::overlay::{resolve_all, DetectionOverlay, DetectionRecord};
use crate::render::{build_frame, Frame, FrameInput, ImageLayer, RenderStyle};
use crate::store::{AnnotationStore, ChangeListener};
use crate::viewport::{ResizeSignal, Viewport, ViewportTracker};

/// Inputs supplied by the host for one rendering session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionProps {
    /// Primary image URL or path
    pub image_source: String,
    /// Tried in order when the primary source fails
    pub fallback_sources: Vec<String>,
    pub initial_annotations: Vec<AnnotationPoint>,
    pub detection_overlays: Vec<DetectionRecord>,
}

impl SessionProps {
    pub fn new(image_source: impl Into<String>) -> Self {
        Self {
            image_source: image_source.into(),
            ..Default::default()
        }
    }

    /// Primary source followed by the fallbacks.
    pub fn candidates(&self) -> Vec<String> {
        std::iter::once(self.image_source.clone())
            .filter(|s| !s.is_empty())
            .chain(self.fallback_sources.iter().cloned())
            .collect()
    }
}

/// The closed set of categories and the one used for new points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySet {
    names: Vec<String>,
    active: Option<usize>,
}

impl CategorySet {
    /// An empty list disables categories.
    pub fn new(names: Vec<String>) -> Self {
        let active = (!names.is_empty()).then_some(0);
        Self { names, active }
    }

    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_enabled(&self) -> bool {
        !self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn active(&self) -> Option<&str> {
        self.active.map(|i| self.names[i].as_str())
    }

    /// Returns false if `name` is not in the set.
    fn choose(&mut self, name: &str) -> bool {
        match self.names.iter().position(|n| n == name) {
            Some(i) => {
                self.active = Some(i);
                true
            }
            None => false,
        }
    }
}

pub struct AnnotationSession {
    props: SessionProps,
    store: AnnotationStore,
    interaction: Interaction,
    tracker: ViewportTracker,
    loader: ImageLoader,
    overlays: Vec<DetectionOverlay>,
    categories: CategorySet,
    style: RenderStyle,
}

impl AnnotationSession {
    pub fn new(config: &AnnotatorConfig, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self::with_wake(config, fetcher, None)
    }

    /// `wake` is called from the loader thread when an image finishes loading.
    pub fn with_wake(
        config: &AnnotatorConfig,
        fetcher: Arc<dyn SourceFetcher>,
        wake: Option<WakeFn>,
    ) -> Self {
        let categories = if config.categories.enabled {
            CategorySet::new(config.categories.names.clone())
        } else {
            CategorySet::disabled()
        };
        Self {
            props: SessionProps::default(),
            store: AnnotationStore::default(),
            interaction: Interaction::new(config.hit_radius_px),
            tracker: ViewportTracker::new(),
            loader: ImageLoader::with_wake(fetcher, wake),
            overlays: Vec::new(),
            categories,
            style: RenderStyle::from_config(config),
        }
    }

    /// Register the host callback that receives the full list after every change.
    pub fn on_annotations_change(&mut self, listener: ChangeListener) {
        self.store.set_listener(listener);
    }

    /// Apply new props from the host.
    ///
    /// A new image or a new set of initial annotations resets the points and
    /// cancels any drag; a new source list restarts loading.
    pub fn set_props(&mut self, props: SessionProps) {
        let sources_changed = props.candidates() != self.props.candidates();
        let annotations_changed = props.initial_annotations != self.props.initial_annotations;
        let overlays_changed = props.detection_overlays != self.props.detection_overlays;

        if sources_changed || annotations_changed {
            self.interaction.cancel_drag();
            self.store.reset(props.initial_annotations.clone());
            log::debug!(
                "Session reset with {} initial points",
                props.initial_annotations.len()
            );
        }
        if overlays_changed {
            self.overlays = resolve_all(&props.detection_overlays);
            log::debug!(
                "{} of {} detections drawable",
                self.overlays.len(),
                props.detection_overlays.len()
            );
        }
        if sources_changed {
            self.store.set_image_size(None);
            self.tracker.set_image_size(None);
            self.loader.load(props.candidates());
        }
        self.props = props;
    }

    pub fn props(&self) -> &SessionProps {
        &self.props
    }

    /// Pick up finished image loads. Returns true if a redraw is needed.
    pub fn poll(&mut self) -> bool {
        let mut changed = self.tracker.pump();
        if self.loader.poll() {
            let size = self.loader.state().image().map(|image| image.size());
            self.store.set_image_size(size);
            self.tracker
                .set_image_size(size.map(|(w, h)| Vec2::new(w as f32, h as f32)));
            changed = true;
        }
        changed
    }

    pub fn attach_resize_signal(&mut self, signal: &mut dyn ResizeSignal) {
        self.tracker.attach(signal);
    }

    pub fn detach_resize_signal(&mut self, signal: &mut dyn ResizeSignal) {
        self.tracker.detach(signal);
    }

    /// Report the container size directly, without a resize signal.
    pub fn set_container_size(&mut self, size: Vec2) -> bool {
        self.tracker.set_container_size(size)
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.tracker.current()
    }

    pub fn load_state(&self) -> &LoadState {
        self.loader.state()
    }

    pub fn image(&self) -> Option<&Arc<LoadedImage>> {
        self.loader.state().image()
    }

    pub fn points(&self) -> &[AnnotationPoint] {
        self.store.points()
    }

    pub fn selected(&self) -> Option<usize> {
        self.store.selected()
    }

    pub fn overlays(&self) -> &[DetectionOverlay] {
        &self.overlays
    }

    pub fn style(&self) -> &RenderStyle {
        &self.style
    }

    pub fn categories(&self) -> &CategorySet {
        &self.categories
    }

    pub fn interaction_state(&self) -> InteractionState {
        self.interaction.state(&self.store)
    }

    pub fn is_dragging(&self) -> bool {
        self.interaction.is_dragging()
    }

    /// Feed a pointer event. `canvas_rect` is where the canvas is on screen.
    pub fn handle_pointer(&mut self, event: PointerEvent, canvas_rect: Rect) -> Outcome {
        let Some(viewport) = self.tracker.current() else {
            return Outcome::Ignored;
        };
        if self.loader.state().image().is_none() {
            return Outcome::Ignored;
        }
        let categories = &self.categories;
        let outcome = self.interaction.handle(
            event,
            &mut self.store,
            &viewport,
            canvas_rect,
            |store| match categories.active() {
                Some(name) => (name.to_string(), Some(name.to_string())),
                None => (format!("Point {}", store.len() + 1), None),
            },
        );
        if let Outcome::Added(index) = outcome {
            log::debug!("Added point {} at {:?}", index, self.store.points()[index].pos());
        }
        outcome
    }

    /// Make `name` the category for new points and relabel the selected point.
    pub fn choose_category(&mut self, name: &str) {
        if !self.categories.choose(name) {
            log::warn!("Unknown category '{}'", name);
            return;
        }
        if let Some(index) = self.store.selected() {
            self.store.recategorize(index, name);
        }
    }

    pub fn select(&mut self, index: usize) {
        self.store.select(index);
    }

    pub fn relabel(&mut self, index: usize, label: impl Into<String>) {
        self.store.relabel(index, label);
    }

    pub fn delete_selected(&mut self) {
        self.interaction.cancel_drag();
        self.store.delete_selected();
    }

    pub fn clear_all(&mut self) {
        self.interaction.cancel_drag();
        self.store.clear_all();
    }

    /// Build the draw list for the current state.
    pub fn frame(&self) -> Frame {
        let image = match self.loader.state() {
            LoadState::Ready(_) => ImageLayer::Ready,
            LoadState::Idle | LoadState::Loading => ImageLayer::Loading,
            LoadState::Unavailable => ImageLayer::Unavailable,
        };
        build_frame(&FrameInput {
            viewport: self.tracker.current(),
            image,
            points: self.store.points(),
            selected: self.store.selected(),
            overlays: &self.overlays,
            style: &self.style,
        })
    }
}
