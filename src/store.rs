//! Ordered collection of annotation points with a single selection.
//!
//! Every mutation of the point list emits the full list to the registered
//! change listener, synchronously. Selection changes alone do not emit.

use crate::model::AnnotationPoint;

/// Receives the full point list after every mutation.
pub type ChangeListener = Box<dyn FnMut(&[AnnotationPoint])>;

#[derive(Default)]
pub struct AnnotationStore {
    points: Vec<AnnotationPoint>,
    selected: Option<usize>,
    /// Bounds used to clamp moves, `(width, height)` in image pixels
    image_size: Option<(u32, u32)>,
    listener: Option<ChangeListener>,
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("points", &self.points)
            .field("selected", &self.selected)
            .field("image_size", &self.image_size)
            .finish_non_exhaustive()
    }
}

impl AnnotationStore {
    pub fn new(points: Vec<AnnotationPoint>) -> Self {
        Self {
            points,
            ..Default::default()
        }
    }

    pub fn set_listener(&mut self, listener: ChangeListener) {
        self.listener = Some(listener);
    }

    pub fn points(&self) -> &[AnnotationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    /// Set the bounds that `move_selected` clamps to. `None` while no image is loaded.
    pub fn set_image_size(&mut self, size: Option<(u32, u32)>) {
        self.image_size = size;
    }

    /// Replace the whole list, e.g. when the active image changes. Clears selection.
    pub fn reset(&mut self, points: Vec<AnnotationPoint>) {
        self.points = points;
        self.selected = None;
    }

    /// Append a point and select it. Returns its index.
    pub fn add(&mut self, x: i32, y: i32, label: impl Into<String>) -> usize {
        self.add_point(AnnotationPoint::new(x, y, label))
    }

    pub fn add_point(&mut self, point: AnnotationPoint) -> usize {
        self.points.push(point);
        let index = self.points.len() - 1;
        self.selected = Some(index);
        self.emit();
        index
    }

    /// Move the selected point, clamped to the image bounds.
    pub fn move_selected(&mut self, x: i32, y: i32) -> &[AnnotationPoint] {
        let Some(index) = self.selected else {
            return &self.points;
        };
        let (x, y) = self.clamp(x, y);
        let Some(point) = self.points.get_mut(index) else {
            return &self.points;
        };
        if point.x == x && point.y == y {
            return &self.points;
        }
        point.x = x;
        point.y = y;
        self.emit();
        &self.points
    }

    pub fn relabel(&mut self, index: usize, label: impl Into<String>) -> &[AnnotationPoint] {
        if let Some(point) = self.points.get_mut(index) {
            point.label = label.into();
            self.emit();
        }
        &self.points
    }

    /// Set both label and category of a point.
    pub fn recategorize(&mut self, index: usize, category: &str) -> &[AnnotationPoint] {
        if let Some(point) = self.points.get_mut(index) {
            point.label = category.to_string();
            point.category = Some(category.to_string());
            self.emit();
        }
        &self.points
    }

    pub fn delete_selected(&mut self) -> &[AnnotationPoint] {
        let Some(index) = self.selected.take() else {
            return &self.points;
        };
        if index < self.points.len() {
            self.points.remove(index);
            self.emit();
        }
        &self.points
    }

    pub fn clear_all(&mut self) -> &[AnnotationPoint] {
        self.points.clear();
        self.selected = None;
        self.emit();
        &self.points
    }

    /// Select a point. Out-of-range indices are ignored.
    pub fn select(&mut self, index: usize) {
        if index < self.points.len() {
            self.selected = Some(index);
        }
    }

    pub fn deselect(&mut self) {
        self.selected = None;
    }

    /// Index of the first point strictly within `threshold` of `pos` (image space).
    pub fn hit_test(&self, pos: egui::Pos2, threshold: f32) -> Option<usize> {
        self.points
            .iter()
            .position(|p| p.pos().distance(pos) < threshold)
    }

    fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        match self.image_size {
            Some((w, h)) => (
                x.clamp(0, i32::try_from(w).unwrap_or(i32::MAX)),
                y.clamp(0, i32::try_from(h).unwrap_or(i32::MAX)),
            ),
            None => (x.max(0), y.max(0)),
        }
    }

    fn emit(&mut self) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.points);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_store() -> (AnnotationStore, Rc<RefCell<Vec<Vec<AnnotationPoint>>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut store = AnnotationStore::default();
        store.set_image_size(Some((640, 480)));
        store.set_listener(Box::new(move |points| sink.borrow_mut().push(points.to_vec())));
        (store, log)
    }

    #[test]
    fn test_add_selects_and_emits() {
        let (mut store, log) = recording_store();
        let a = store.add(10, 20, "ship");
        let b = store.add(30, 40, "door");

        assert_eq!((a, b), (0, 1));
        assert_eq!(store.selected(), Some(1));
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(log.borrow()[1], store.points().to_vec());
    }

    #[test]
    fn test_move_selected_clamps() {
        let (mut store, _) = recording_store();
        store.add(100, 100, "ship");

        store.move_selected(5000, 5000);
        assert_eq!((store.points()[0].x, store.points()[0].y), (640, 480));

        store.move_selected(-3, 200);
        assert_eq!((store.points()[0].x, store.points()[0].y), (0, 200));
    }

    #[test]
    fn test_move_without_selection_is_noop() {
        let (mut store, log) = recording_store();
        store.add(1, 1, "ship");
        store.deselect();
        let before = log.borrow().len();

        store.move_selected(50, 50);
        assert_eq!(store.points()[0].pos(), egui::pos2(1.0, 1.0));
        assert_eq!(log.borrow().len(), before);
    }

    #[test]
    fn test_relabel_out_of_range_is_noop() {
        let (mut store, log) = recording_store();
        store.add(1, 1, "ship");

        store.relabel(0, "boat");
        assert_eq!(store.points()[0].label, "boat");

        let before = log.borrow().len();
        store.relabel(7, "ghost");
        assert_eq!(log.borrow().len(), before);
    }

    #[test]
    fn test_recategorize_sets_label_and_category() {
        let (mut store, _) = recording_store();
        store.add(1, 1, "ship");
        store.recategorize(0, "chair");
        assert_eq!(store.points()[0].label, "chair");
        assert_eq!(store.points()[0].category.as_deref(), Some("chair"));
    }

    #[test]
    fn test_delete_selected() {
        let (mut store, log) = recording_store();
        store.add(1, 1, "a");
        store.add(2, 2, "b");
        store.add(3, 3, "c");
        store.select(1);

        store.delete_selected();
        let labels: Vec<_> = store.points().iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c"]);
        assert_eq!(store.selected(), None);

        let before = log.borrow().len();
        store.delete_selected();
        assert_eq!(store.len(), 2);
        assert_eq!(log.borrow().len(), before);
    }

    #[test]
    fn test_clear_all_emits_empty_list() {
        let (mut store, log) = recording_store();
        store.add(1, 1, "a");
        store.add(2, 2, "b");

        store.clear_all();
        assert!(store.is_empty());
        assert_eq!(store.selected(), None);
        assert_eq!(log.borrow().last(), Some(&Vec::new()));
    }

    #[test]
    fn test_select_out_of_range_is_ignored() {
        let (mut store, log) = recording_store();
        store.add(1, 1, "a");
        store.select(0);
        store.select(3);
        assert_eq!(store.selected(), Some(0));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_reset_replaces_without_emitting() {
        let (mut store, log) = recording_store();
        store.add(1, 1, "a");
        store.reset(vec![AnnotationPoint::new(9, 9, "z")]);

        assert_eq!(store.points(), &[AnnotationPoint::new(9, 9, "z")]);
        assert_eq!(store.selected(), None);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_hit_test_prefers_first_created() {
        let mut store = AnnotationStore::new(vec![
            AnnotationPoint::new(100, 100, "first"),
            AnnotationPoint::new(104, 100, "second"),
        ]);
        assert_eq!(store.hit_test(egui::pos2(103.0, 100.0), 15.0), Some(0));
        assert_eq!(store.hit_test(egui::pos2(200.0, 200.0), 15.0), None);
        // The threshold is strict.
        assert_eq!(store.hit_test(egui::pos2(115.0, 100.0), 11.0), None);

        store.clear_all();
        assert_eq!(store.hit_test(egui::pos2(100.0, 100.0), 15.0), None);
    }
}
