//! Pointer interaction state machine.
//!
//! Presses on an existing point start a drag; clicks on empty space create a
//! point; clicks on a point select it. Creation happens on click rather than
//! on press so that a press which turns into a drag never adds a point.

use egui::{Pos2, Rect};

use crate::model::AnnotationPoint;
use crate::store::AnnotationStore;
use crate::viewport::Viewport;

/// Where the user is in a select/drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Selected(usize),
    Dragging(usize),
}

/// Low-level pointer input, positions in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Pos2),
    Move(Pos2),
    /// Release, with the last known position if there is one
    Up(Option<Pos2>),
    /// The pointer left the canvas
    Leave(Option<Pos2>),
    /// Press and release on the canvas
    Click(Pos2),
}

/// What handling an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Selected(usize),
    DragStarted(usize),
    Moved(usize),
    DragEnded(usize),
    Added(usize),
}

impl Outcome {
    /// Whether the frame needs to be rebuilt.
    pub fn needs_redraw(self) -> bool {
        !matches!(self, Outcome::Ignored)
    }
}

/// Interprets pointer events against the store.
///
/// The selection itself lives in the store; this only tracks the drag.
#[derive(Debug, Clone)]
pub struct Interaction {
    hit_radius_px: f32,
    dragging: Option<usize>,
    /// Whether the current drag has seen a move yet
    moved: bool,
}

impl Interaction {
    pub fn new(hit_radius_px: f32) -> Self {
        Self {
            hit_radius_px,
            dragging: None,
            moved: false,
        }
    }

    pub fn state(&self, store: &AnnotationStore) -> InteractionState {
        match (self.dragging, store.selected()) {
            (Some(index), _) => InteractionState::Dragging(index),
            (None, Some(index)) => InteractionState::Selected(index),
            (None, None) => InteractionState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    /// Abandon a drag without touching the store.
    pub fn cancel_drag(&mut self) {
        if let Some(index) = self.dragging.take() {
            log::debug!("Drag on point {} cancelled", index);
        }
    }

    /// Handle one pointer event.
    ///
    /// `new_label` is used when a click creates a point.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        store: &mut AnnotationStore,
        viewport: &Viewport,
        canvas_rect: Rect,
        new_label: impl FnOnce(&AnnotationStore) -> (String, Option<String>),
    ) -> Outcome {
        let to_image = |pos: Pos2| viewport.screen_to_image(pos, canvas_rect);
        let threshold = viewport.screen_len_to_image(self.hit_radius_px);

        match event {
            PointerEvent::Down(pos) => match store.hit_test(to_image(pos), threshold) {
                Some(index) => {
                    store.select(index);
                    self.dragging = Some(index);
                    self.moved = false;
                    Outcome::DragStarted(index)
                }
                None => Outcome::Ignored,
            },
            PointerEvent::Move(pos) => match self.dragging {
                Some(index) => {
                    let p = to_image(pos);
                    store.move_selected(p.x.round() as i32, p.y.round() as i32);
                    self.moved = true;
                    Outcome::Moved(index)
                }
                None => Outcome::Ignored,
            },
            PointerEvent::Up(pos) | PointerEvent::Leave(pos) => {
                let Some(index) = self.dragging.take() else {
                    return Outcome::Ignored;
                };
                // A press and release without movement only selects.
                if let Some(pos) = pos.filter(|_| self.moved) {
                    let p = to_image(pos);
                    store.move_selected(p.x.round() as i32, p.y.round() as i32);
                }
                store.select(index);
                Outcome::DragEnded(index)
            }
            PointerEvent::Click(pos) => {
                if self.dragging.is_some() {
                    return Outcome::Ignored;
                }
                let p = to_image(pos);
                match store.hit_test(p, threshold) {
                    Some(index) => {
                        store.select(index);
                        Outcome::Selected(index)
                    }
                    None => {
                        let (label, category) = new_label(store);
                        let mut point = AnnotationPoint::new(
                            p.x.round() as i32,
                            p.y.round() as i32,
                            label,
                        );
                        point.category = category;
                        Outcome::Added(store.add_point(point))
                    }
                }
            }
        }
    }
}
