//! The desktop host: an eframe app around one [`AnnotationSession`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

use eframe::egui;

use crate::config::AnnotatorConfig;
use crate::interaction::PointerEvent;
use crate::loader::{DefaultFetcher, LoadedImage};
use crate::model::{load_points, save_points, AnnotationPoint};
use crate::overlay::{parse_records, DetectionOverlay, DetectionRecord, OverlayShape};
use crate::session::{AnnotationSession, SessionProps};
use crate::viewport::ResizeBroadcaster;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

/// What the app starts with.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Paths or URLs, browsed with Next/Prev
    pub images: Vec<String>,
    /// Tried after each image's own source fails
    pub fallbacks: Vec<String>,
    /// Detections for the first image
    pub overlays: Vec<DetectionRecord>,
}

/// Local file behind a source, if any. Remote images get no sidecar.
pub fn local_path(source: &str) -> Option<PathBuf> {
    if source.starts_with("http://") || source.starts_with("https://") {
        return None;
    }
    Some(PathBuf::from(source.strip_prefix("file://").unwrap_or(source)))
}

pub fn read_overlays(path: &Path) -> Result<Vec<DetectionRecord>, String> {
    let data = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    parse_records(&data).map_err(|e| format!("{}: {}", path.display(), e))
}

// ── Side panel actions ──────────────────────────────────────────────────────

enum ListAction {
    Select(usize),
    Relabel(usize, String),
    DeleteSelected,
    ClearAll,
}

// ── Image list ──────────────────────────────────────────────────────────────

/// The images being browsed, plus saving of edited points to their sidecars.
///
/// Change notifications are queued and written to the sidecar of the image
/// that was current when they were flushed, so every move away from an image
/// flushes first.
pub struct ImageList {
    images: Vec<String>,
    current: usize,
    autosave: bool,
    changes: Receiver<Vec<AnnotationPoint>>,
}

impl ImageList {
    pub fn new(
        images: Vec<String>,
        autosave: bool,
        changes: Receiver<Vec<AnnotationPoint>>,
    ) -> Self {
        Self {
            images,
            current: 0,
            autosave,
            changes,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.images.get(self.current).map(String::as_str)
    }

    pub fn index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Move to the next or previous image, wrapping. Returns false with fewer than two images.
    pub fn step(&mut self, forward: bool) -> bool {
        let n = self.images.len();
        if n < 2 {
            return false;
        }
        self.flush();
        self.current = if forward {
            (self.current + 1) % n
        } else {
            (self.current + n - 1) % n
        };
        true
    }

    pub fn replace(&mut self, images: Vec<String>) {
        self.flush();
        self.images = images;
        self.current = 0;
    }

    /// Save the latest change notification to the sidecar of the current image.
    pub fn flush(&mut self) {
        let Some(points) = self.changes.try_iter().last() else {
            return;
        };
        if !self.autosave {
            return;
        }
        let Some(path) = self.current().and_then(local_path) else {
            return;
        };
        match save_points(&path, &points) {
            Ok(()) => log::debug!("Saved {} points for {}", points.len(), path.display()),
            Err(e) => log::error!("Failed to save points: {}", e),
        }
    }
}

// ── App ─────────────────────────────────────────────────────────────────────

pub struct AnnotateApp {
    list: ImageList,
    fallbacks: Vec<String>,
    /// Detections per image index
    overlays: HashMap<usize, Vec<DetectionRecord>>,

    session: AnnotationSession,
    resize: ResizeBroadcaster,
    texture: Option<(Arc<LoadedImage>, egui::TextureHandle)>,

    // pointer tracking across frames
    last_pointer: Option<egui::Pos2>,
    pointer_inside: bool,
}

impl AnnotateApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AnnotatorConfig,
        options: LaunchOptions,
    ) -> Self {
        let ctx = cc.egui_ctx.clone();
        let mut session = AnnotationSession::with_wake(
            &config,
            Arc::new(DefaultFetcher),
            Some(Box::new(move || ctx.request_repaint())),
        );

        let (tx, changes) = mpsc::channel();
        session.on_annotations_change(Box::new(move |points: &[AnnotationPoint]| {
            let _ = tx.send(points.to_vec());
        }));

        let mut resize = ResizeBroadcaster::new();
        session.attach_resize_signal(&mut resize);

        let mut overlays = HashMap::new();
        if !options.overlays.is_empty() {
            overlays.insert(0, options.overlays);
        }

        let mut app = Self {
            list: ImageList::new(options.images, config.autosave, changes),
            fallbacks: options.fallbacks,
            overlays,
            session,
            resize,
            texture: None,
            last_pointer: None,
            pointer_inside: false,
        };
        app.open_current(&cc.egui_ctx);
        app
    }

    /// Hand the current image and its saved points to the session.
    fn open_current(&mut self, ctx: &egui::Context) {
        let Some(source) = self.list.current().map(str::to_string) else {
            self.session.set_props(SessionProps {
                fallback_sources: self.fallbacks.clone(),
                ..Default::default()
            });
            return;
        };

        let initial_annotations = match local_path(&source) {
            Some(path) => load_points(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring saved points for {}: {}", source, e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        log::info!(
            "Opening {} ({}/{}) with {} saved points",
            source,
            self.list.index() + 1,
            self.list.len(),
            initial_annotations.len()
        );

        let title = format!("annotate-points: {}", display_name(&source));
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(title));

        self.session.set_props(SessionProps {
            image_source: source,
            fallback_sources: self.fallbacks.clone(),
            initial_annotations,
            detection_overlays: self
                .overlays
                .get(&self.list.index())
                .cloned()
                .unwrap_or_default(),
        });
    }

    fn step(&mut self, ctx: &egui::Context, forward: bool) {
        if self.list.step(forward) {
            self.open_current(ctx);
        }
    }

    fn open_images_dialog(&mut self, ctx: &egui::Context) {
        let Some(paths) = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_files()
        else {
            return;
        };
        self.list.replace(paths.iter().map(|p| p.display().to_string()).collect());
        self.overlays.clear();
        self.open_current(ctx);
    }

    fn open_overlays_dialog(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Detections", &["json"])
            .pick_file()
        else {
            return;
        };
        match read_overlays(&path) {
            Ok(records) => {
                log::info!("Loaded {} detections from {}", records.len(), path.display());
                self.overlays.insert(self.list.index(), records.clone());
                let mut props = self.session.props().clone();
                props.detection_overlays = records;
                self.session.set_props(props);
            }
            Err(e) => log::error!("Failed to read detections: {}", e),
        }
    }

    fn ensure_texture(&mut self, ctx: &egui::Context) {
        let Some(image) = self.session.image() else {
            self.texture = None;
            return;
        };
        if self
            .texture
            .as_ref()
            .is_some_and(|(shown, _)| Arc::ptr_eq(shown, image))
        {
            return;
        }
        let size = [image.pixels.width() as usize, image.pixels.height() as usize];
        let pixels = image.pixels.as_flat_samples();
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, pixels.as_slice());
        let handle = ctx.load_texture("image", color_image, egui::TextureOptions::LINEAR);
        self.texture = Some((Arc::clone(image), handle));
    }

    // ── Panels ──────────────────────────────────────────────────────────────

    fn toolbar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open image…").clicked() {
                self.open_images_dialog(ctx);
            }
            if ui.button("Open overlays…").clicked() {
                self.open_overlays_dialog();
            }
            ui.separator();
            let many = self.list.len() > 1;
            if ui.add_enabled(many, egui::Button::new("◀ Prev")).clicked() {
                self.step(ctx, false);
            }
            if !self.list.is_empty() {
                ui.label(format!("{}/{}", self.list.index() + 1, self.list.len()));
            }
            if ui.add_enabled(many, egui::Button::new("Next ▶")).clicked() {
                self.step(ctx, true);
            }

            if self.session.categories().is_enabled() {
                ui.separator();
                ui.label("Category:");
                let active = self.session.categories().active().map(str::to_string);
                let names = self.session.categories().names().to_vec();
                for name in names {
                    let on = active.as_deref() == Some(name.as_str());
                    if ui.selectable_label(on, &name).clicked() {
                        self.session.choose_category(&name);
                    }
                }
            }
        });
    }

    fn point_list(&mut self, ui: &mut egui::Ui) {
        let mut actions = Vec::new();

        ui.heading(format!("Points ({})", self.session.points().len()));
        ui.horizontal(|ui| {
            let has_selection = self.session.selected().is_some();
            if ui
                .add_enabled(has_selection, egui::Button::new("Delete selected"))
                .clicked()
            {
                actions.push(ListAction::DeleteSelected);
            }
            if ui
                .add_enabled(!self.session.points().is_empty(), egui::Button::new("Clear all"))
                .clicked()
            {
                actions.push(ListAction::ClearAll);
            }
        });
        ui.separator();

        egui::ScrollArea::vertical()
            .id_salt("points")
            .max_height(ui.available_height() * 0.55)
            .show(ui, |ui| {
                let selected = self.session.selected();
                for (i, point) in self.session.points().iter().enumerate() {
                    ui.horizontal(|ui| {
                        let caption = format!("#{} ({}, {})", i + 1, point.x, point.y);
                        if ui.selectable_label(selected == Some(i), caption).clicked() {
                            actions.push(ListAction::Select(i));
                        }
                        let mut label = point.label.clone();
                        let edit = egui::TextEdit::singleline(&mut label).desired_width(110.0);
                        if ui.add(edit).changed() {
                            actions.push(ListAction::Relabel(i, label));
                        }
                    });
                }
            });

        for action in actions {
            match action {
                ListAction::Select(i) => self.session.select(i),
                ListAction::Relabel(i, label) => self.session.relabel(i, label),
                ListAction::DeleteSelected => self.session.delete_selected(),
                ListAction::ClearAll => self.session.clear_all(),
            }
        }
    }

    fn detection_list(&self, ui: &mut egui::Ui) {
        let overlays = self.session.overlays();
        ui.heading(format!("Detections ({})", overlays.len()));
        ui.separator();
        egui::ScrollArea::vertical().id_salt("detections").show(ui, |ui| {
            for overlay in overlays {
                ui.horizontal(|ui| {
                    let color = self.session.style().overlay_color(&overlay.label);
                    let (rect, _) =
                        ui.allocate_exact_size(egui::vec2(12.0, 12.0), egui::Sense::hover());
                    ui.painter().rect_filled(rect, 2.0, color);
                    ui.label(overlay.caption());
                });
                ui.label(egui::RichText::new(describe_shape(overlay)).small().weak());
            }
        });
    }

    // ── Canvas ──────────────────────────────────────────────────────────────

    fn canvas(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        let container = response.rect;

        self.resize.measure(container.size());
        self.session.poll();
        self.ensure_texture(ctx);

        let canvas_rect = self
            .session
            .viewport()
            .map(|v| v.canvas_rect(container.min))
            .unwrap_or(container);

        painter.rect_filled(container, 0.0, self.session.style().background);
        let texture = self.texture.as_ref().map(|(_, handle)| handle.id());
        self.session.frame().paint(&painter, canvas_rect, texture);

        for event in self.pointer_events(ctx, &response, canvas_rect) {
            if self.session.handle_pointer(event, canvas_rect).needs_redraw() {
                ctx.request_repaint();
            }
        }

        if self.session.is_dragging() {
            ctx.set_cursor_icon(egui::CursorIcon::Grabbing);
        } else if self.pointer_inside {
            ctx.set_cursor_icon(egui::CursorIcon::Crosshair);
        }
    }

    /// Translate this frame's egui input into canvas pointer events.
    fn pointer_events(
        &mut self,
        ctx: &egui::Context,
        response: &egui::Response,
        canvas_rect: egui::Rect,
    ) -> Vec<PointerEvent> {
        let (hover, pressed, released) = ctx.input(|i| {
            (
                i.pointer.hover_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
            )
        });
        let inside = hover.filter(|p| canvas_rect.contains(*p));
        let mut events = Vec::new();

        if self.pointer_inside && inside.is_none() {
            events.push(PointerEvent::Leave(self.last_pointer));
        }
        if pressed {
            if let Some(p) = inside {
                events.push(PointerEvent::Down(p));
            }
        }
        if let Some(p) = inside {
            if self.session.is_dragging() && self.last_pointer != Some(p) {
                events.push(PointerEvent::Move(p));
            }
        }
        if released {
            events.push(PointerEvent::Up(inside));
        }
        if response.clicked() {
            if let Some(p) = response.interact_pointer_pos().filter(|p| canvas_rect.contains(*p)) {
                events.push(PointerEvent::Click(p));
            }
        }

        self.pointer_inside = inside.is_some();
        if inside.is_some() {
            self.last_pointer = inside;
        }
        events
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let (delete, next, prev) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace),
                i.key_pressed(egui::Key::PageDown),
                i.key_pressed(egui::Key::PageUp),
            )
        });
        if delete {
            self.session.delete_selected();
        }
        if next {
            self.step(ctx, true);
        } else if prev {
            self.step(ctx, false);
        }
    }
}

fn display_name(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

fn describe_shape(overlay: &DetectionOverlay) -> String {
    let kind = overlay.shape.kind_name();
    match &overlay.shape {
        OverlayShape::BoundingBox { min, size } => format!(
            "{} [{:.0}, {:.0}, {:.0}, {:.0}]",
            kind, min.x, min.y, size.x, size.y
        ),
        OverlayShape::Polygons(polygons) => format!(
            "{}: {} polygon(s), {} vertices",
            kind,
            polygons.len(),
            polygons.iter().map(Vec::len).sum::<usize>()
        ),
        OverlayShape::RotatedBox(corners) => {
            let start = corners[0];
            format!("{} from ({:.0}, {:.0})", kind, start.x, start.y)
        }
    }
}

// ── eframe App impl ────────────────────────────────────────────────────────

impl eframe::App for AnnotateApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_keys(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ctx, ui);
        });

        egui::SidePanel::right("list")
            .default_width(260.0)
            .show(ctx, |ui| {
                self.point_list(ui);
                ui.add_space(8.0);
                self.detection_list(ui);
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::default())
            .show(ctx, |ui| {
                self.canvas(ctx, ui);
            });

        self.list.flush();
    }
}

impl Drop for AnnotateApp {
    fn drop(&mut self) {
        self.list.flush();
    }
}
