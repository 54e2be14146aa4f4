//! Frame rendering.
//!
//! Every change rebuilds the whole frame: [`build_frame`] turns the current
//! state into a flat list of [`DrawCommand`]s in canvas-local coordinates, and
//! [`Frame::paint`] executes that list with an egui painter. There is no
//! partial invalidation.

use std::collections::BTreeMap;

use egui::{pos2, vec2, Align2, Color32, FontId, Painter, Pos2, Rect, Stroke, TextureId, Vec2};

use crate::config::AnnotatorConfig;
use crate::model::AnnotationPoint;
use crate::overlay::{DetectionOverlay, OverlayShape};
use crate::viewport::Viewport;

/// Visual constants for points and overlays.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStyle {
    pub background: Color32,
    pub point_radius: f32,
    pub point_border: Stroke,
    pub center_radius: f32,
    pub center_color: Color32,
    pub selected_fill: Color32,
    pub unselected_fill: Color32,
    pub label_offset: Vec2,
    pub label_font_size: f32,
    pub label_color: Color32,
    pub label_outline: Color32,
    pub label_outline_width: f32,
    pub overlay_stroke_width: f32,
    /// Alpha applied to the label colour for shape fills
    pub overlay_fill_alpha: u8,
    pub chip_background: Color32,
    pub chip_text: Color32,
    pub chip_font_size: f32,
    pub chip_padding: Vec2,
    pub overlay_colors: BTreeMap<String, [u8; 3]>,
    pub fallback_overlay_color: Color32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            background: Color32::from_gray(40),
            point_radius: 10.0,
            point_border: Stroke::new(2.0, Color32::WHITE),
            center_radius: 3.0,
            center_color: Color32::WHITE,
            selected_fill: Color32::from_rgba_unmultiplied(255, 107, 107, 204),
            unselected_fill: Color32::from_rgba_unmultiplied(78, 205, 196, 204),
            label_offset: vec2(15.0, -10.0),
            label_font_size: 12.0,
            label_color: Color32::WHITE,
            label_outline: Color32::BLACK,
            label_outline_width: 3.0,
            overlay_stroke_width: 2.0,
            overlay_fill_alpha: 51,
            chip_background: Color32::from_rgb(33, 33, 33),
            chip_text: Color32::WHITE,
            chip_font_size: 13.0,
            chip_padding: vec2(5.0, 3.0),
            overlay_colors: crate::config::default_overlay_colors(),
            fallback_overlay_color: Color32::from_gray(0x99),
        }
    }
}

impl RenderStyle {
    pub fn from_config(config: &AnnotatorConfig) -> Self {
        Self {
            overlay_colors: config.overlay_colors.clone(),
            ..Self::default()
        }
    }

    pub fn overlay_color(&self, label: &str) -> Color32 {
        self.overlay_colors
            .get(label)
            .map(|&[r, g, b]| Color32::from_rgb(r, g, b))
            .unwrap_or(self.fallback_overlay_color)
    }

    fn overlay_fill(&self, color: Color32) -> Color32 {
        Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), self.overlay_fill_alpha)
    }
}

/// One drawing step, in canvas-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear {
        color: Color32,
    },
    /// The base image stretched over `rect`
    Image {
        rect: Rect,
    },
    /// Shown instead of the image when none is available
    Placeholder {
        text: String,
    },
    Circle {
        center: Pos2,
        radius: f32,
        fill: Color32,
        stroke: Stroke,
    },
    /// Text drawn as an outline pass beneath a fill pass
    OutlinedText {
        pos: Pos2,
        text: String,
        font_size: f32,
        fill: Color32,
        outline: Color32,
        outline_width: f32,
    },
    Rect {
        rect: Rect,
        fill: Color32,
        stroke: Stroke,
    },
    Polygon {
        points: Vec<Pos2>,
        fill: Color32,
        stroke: Stroke,
    },
    /// Text on a solid background sized to the text, bottom-left corner at `anchor`
    LabelChip {
        anchor: Pos2,
        text: String,
        font_size: f32,
        background: Color32,
        text_color: Color32,
        padding: Vec2,
    },
}

/// What the image layer currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayer {
    Ready,
    Loading,
    Unavailable,
}

/// Everything a frame is built from.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub viewport: Option<Viewport>,
    pub image: ImageLayer,
    pub points: &'a [AnnotationPoint],
    pub selected: Option<usize>,
    pub overlays: &'a [DetectionOverlay],
    pub style: &'a RenderStyle,
}

/// A fully built draw list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    /// Canvas size; zero when there is nothing to lay out yet
    pub size: Vec2,
    pub commands: Vec<DrawCommand>,
}

pub fn build_frame(input: &FrameInput<'_>) -> Frame {
    let style = input.style;

    let Some(viewport) = input.viewport.filter(|_| input.image == ImageLayer::Ready) else {
        let text = match input.image {
            ImageLayer::Loading => "Loading image…",
            _ => "No image available",
        };
        return Frame {
            size: Vec2::ZERO,
            commands: vec![
                DrawCommand::Clear {
                    color: style.background,
                },
                DrawCommand::Placeholder {
                    text: text.to_string(),
                },
            ],
        };
    };

    let mut commands = vec![
        DrawCommand::Clear {
            color: style.background,
        },
        DrawCommand::Image {
            rect: Rect::from_min_size(Pos2::ZERO, viewport.canvas_size),
        },
    ];

    for (i, point) in input.points.iter().enumerate() {
        push_point(&mut commands, point, input.selected == Some(i), &viewport, style);
    }

    for (i, overlay) in input.overlays.iter().enumerate() {
        match overlay_commands(overlay, viewport.scale, style) {
            Some(mut cmds) => commands.append(&mut cmds),
            None => log::trace!("Overlay #{} ({}) skipped", i, overlay.label),
        }
    }

    Frame {
        size: viewport.canvas_size,
        commands,
    }
}

fn push_point(
    commands: &mut Vec<DrawCommand>,
    point: &AnnotationPoint,
    selected: bool,
    viewport: &Viewport,
    style: &RenderStyle,
) {
    let center = viewport.image_to_screen(point.pos());
    commands.push(DrawCommand::Circle {
        center,
        radius: style.point_radius,
        fill: if selected {
            style.selected_fill
        } else {
            style.unselected_fill
        },
        stroke: style.point_border,
    });
    commands.push(DrawCommand::Circle {
        center,
        radius: style.center_radius,
        fill: style.center_color,
        stroke: Stroke::NONE,
    });
    if !point.label.is_empty() {
        commands.push(DrawCommand::OutlinedText {
            pos: center + style.label_offset,
            text: point.label.clone(),
            font_size: style.label_font_size,
            fill: style.label_color,
            outline: style.label_outline,
            outline_width: style.label_outline_width,
        });
    }
}

/// Commands for one overlay, or `None` if its scaled geometry is unusable.
fn overlay_commands(
    overlay: &DetectionOverlay,
    scale: f32,
    style: &RenderStyle,
) -> Option<Vec<DrawCommand>> {
    let scaled = |p: Pos2| {
        let s = pos2(p.x * scale, p.y * scale);
        (s.x.is_finite() && s.y.is_finite()).then_some(s)
    };
    let color = style.overlay_color(&overlay.label);
    let fill = style.overlay_fill(color);
    let stroke = Stroke::new(style.overlay_stroke_width, color);

    let mut commands = Vec::new();
    match &overlay.shape {
        OverlayShape::BoundingBox { min, size } => {
            let a = scaled(*min)?;
            let b = scaled(*min + *size)?;
            commands.push(DrawCommand::Rect {
                rect: Rect::from_two_pos(a, b),
                fill,
                stroke,
            });
        }
        OverlayShape::Polygons(polygons) => {
            for polygon in polygons {
                let points = polygon
                    .iter()
                    .map(|p| scaled(*p))
                    .collect::<Option<Vec<_>>>()?;
                if points.len() < 3 {
                    return None;
                }
                commands.push(DrawCommand::Polygon {
                    points,
                    fill,
                    stroke,
                });
            }
        }
        OverlayShape::RotatedBox(corners) => {
            let points = corners
                .iter()
                .map(|p| scaled(*p))
                .collect::<Option<Vec<_>>>()?;
            commands.push(DrawCommand::Polygon {
                points,
                fill,
                stroke,
            });
        }
    }

    commands.push(DrawCommand::LabelChip {
        anchor: scaled(overlay.shape.anchor())?,
        text: overlay.caption(),
        font_size: style.chip_font_size,
        background: style.chip_background,
        text_color: style.chip_text,
        padding: style.chip_padding,
    });
    Some(commands)
}

impl Frame {
    /// Execute the draw list. `canvas_rect` is where the canvas sits on screen;
    /// with no canvas size yet it is the whole container.
    pub fn paint(&self, painter: &Painter, canvas_rect: Rect, texture: Option<TextureId>) {
        let origin = canvas_rect.min.to_vec2();
        let at = |p: Pos2| p + origin;

        for command in &self.commands {
            match command {
                DrawCommand::Clear { color } => {
                    painter.rect_filled(canvas_rect, 0.0, *color);
                }
                DrawCommand::Image { rect } => {
                    if let Some(texture) = texture {
                        painter.image(
                            texture,
                            rect.translate(origin),
                            Rect::from_min_max(pos2(0.0, 0.0), pos2(1.0, 1.0)),
                            Color32::WHITE,
                        );
                    }
                }
                DrawCommand::Placeholder { text } => {
                    painter.text(
                        canvas_rect.center(),
                        Align2::CENTER_CENTER,
                        text,
                        FontId::proportional(16.0),
                        Color32::from_gray(160),
                    );
                }
                DrawCommand::Circle {
                    center,
                    radius,
                    fill,
                    stroke,
                } => {
                    painter.circle(at(*center), *radius, *fill, *stroke);
                }
                DrawCommand::OutlinedText {
                    pos,
                    text,
                    font_size,
                    fill,
                    outline,
                    outline_width,
                } => {
                    let font = FontId::proportional(*font_size);
                    let d = outline_width / 2.0;
                    for offset in [
                        vec2(-d, -d),
                        vec2(0.0, -d),
                        vec2(d, -d),
                        vec2(-d, 0.0),
                        vec2(d, 0.0),
                        vec2(-d, d),
                        vec2(0.0, d),
                        vec2(d, d),
                    ] {
                        painter.text(
                            at(*pos) + offset,
                            Align2::LEFT_BOTTOM,
                            text,
                            font.clone(),
                            *outline,
                        );
                    }
                    painter.text(at(*pos), Align2::LEFT_BOTTOM, text, font, *fill);
                }
                DrawCommand::Rect { rect, fill, stroke } => {
                    let rect = rect.translate(origin);
                    painter.rect_filled(rect, 0.0, *fill);
                    painter.rect_stroke(rect, 0.0, *stroke, egui::StrokeKind::Middle);
                }
                DrawCommand::Polygon {
                    points,
                    fill,
                    stroke,
                } => {
                    let points: Vec<Pos2> = points.iter().map(|p| at(*p)).collect();
                    // egui only tessellates convex fills; concave outlines stay exact.
                    painter.add(egui::Shape::convex_polygon(
                        points.clone(),
                        *fill,
                        Stroke::NONE,
                    ));
                    painter.add(egui::Shape::closed_line(points, *stroke));
                }
                DrawCommand::LabelChip {
                    anchor,
                    text,
                    font_size,
                    background,
                    text_color,
                    padding,
                } => {
                    let galley = painter.layout_no_wrap(
                        text.clone(),
                        FontId::proportional(*font_size),
                        *text_color,
                    );
                    let size = galley.size() + *padding * 2.0;
                    let anchor = at(*anchor);
                    let mut chip = Rect::from_min_size(anchor - vec2(0.0, size.y), size);
                    if chip.top() < canvas_rect.top() {
                        chip = Rect::from_min_size(anchor, size);
                    }
                    painter.rect_filled(chip, 2.0, *background);
                    painter.galley(chip.min + *padding, galley, *text_color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{DetectionRecord, resolve_all};

    fn viewport(scale_to: Vec2, image: Vec2) -> Option<Viewport> {
        Viewport::fit(image, scale_to)
    }

    fn overlays(json: &str) -> Vec<DetectionOverlay> {
        let records: Vec<DetectionRecord> = serde_json::from_str(json).unwrap();
        resolve_all(&records)
    }

    #[test]
    fn test_bbox_scaled_with_caption() {
        let style = RenderStyle::default();
        let overlays = overlays(r#"[{ "bbox": [10, 10, 50, 20], "label": "ship", "score": 0.9 }]"#);
        let frame = build_frame(&FrameInput {
            viewport: viewport(vec2(500.0, 500.0), vec2(1000.0, 1000.0)),
            image: ImageLayer::Ready,
            points: &[],
            selected: None,
            overlays: &overlays,
            style: &style,
        });

        let rect = frame
            .commands
            .iter()
            .find_map(|c| match c {
                DrawCommand::Rect { rect, .. } => Some(*rect),
                _ => None,
            })
            .unwrap();
        assert_eq!(rect.min, pos2(5.0, 5.0));
        assert_eq!(rect.size(), vec2(25.0, 10.0));

        let chip = frame.commands.last().unwrap();
        assert!(matches!(
            chip,
            DrawCommand::LabelChip { anchor, text, .. }
                if *anchor == pos2(5.0, 5.0) && text == "ship 90.0%"
        ));
    }

    #[test]
    fn test_frame_layer_order() {
        let style = RenderStyle::default();
        let points = vec![
            AnnotationPoint::new(100, 100, "ship"),
            AnnotationPoint::new(200, 50, ""),
        ];
        let overlays =
            overlays(r#"[{ "true_rbox": [0, 0, 10, 0, 10, 10, 0, 10], "label": "car" }]"#);
        let frame = build_frame(&FrameInput {
            viewport: viewport(vec2(800.0, 600.0), vec2(400.0, 300.0)),
            image: ImageLayer::Ready,
            points: &points,
            selected: Some(0),
            overlays: &overlays,
            style: &style,
        });

        assert_eq!(frame.size, vec2(400.0, 300.0));
        let kinds: Vec<&str> = frame
            .commands
            .iter()
            .map(|c| match c {
                DrawCommand::Clear { .. } => "clear",
                DrawCommand::Image { .. } => "image",
                DrawCommand::Placeholder { .. } => "placeholder",
                DrawCommand::Circle { .. } => "circle",
                DrawCommand::OutlinedText { .. } => "text",
                DrawCommand::Rect { .. } => "rect",
                DrawCommand::Polygon { .. } => "polygon",
                DrawCommand::LabelChip { .. } => "chip",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "clear", "image", "circle", "circle", "text", "circle", "circle", "polygon",
                "chip"
            ]
        );
    }

    #[test]
    fn test_point_appearance() {
        let style = RenderStyle::default();
        let points = vec![
            AnnotationPoint::new(100, 100, "ship"),
            AnnotationPoint::new(40, 60, "door"),
        ];
        let frame = build_frame(&FrameInput {
            viewport: viewport(vec2(320.0, 240.0), vec2(640.0, 480.0)),
            image: ImageLayer::Ready,
            points: &points,
            selected: Some(1),
            overlays: &[],
            style: &style,
        });

        let circles: Vec<_> = frame
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Circle {
                    center,
                    radius,
                    fill,
                    ..
                } => Some((*center, *radius, *fill)),
                _ => None,
            })
            .collect();
        assert_eq!(circles[0], (pos2(50.0, 50.0), 10.0, style.unselected_fill));
        assert_eq!(circles[1], (pos2(50.0, 50.0), 3.0, Color32::WHITE));
        assert_eq!(circles[2], (pos2(20.0, 30.0), 10.0, style.selected_fill));

        let label = frame
            .commands
            .iter()
            .find_map(|c| match c {
                DrawCommand::OutlinedText { pos, text, .. } => Some((*pos, text.clone())),
                _ => None,
            })
            .unwrap();
        assert_eq!(label, (pos2(65.0, 40.0), "ship".to_string()));
    }

    #[test]
    fn test_placeholder_without_image() {
        let style = RenderStyle::default();
        let points = vec![AnnotationPoint::new(1, 1, "a")];
        for layer in [ImageLayer::Unavailable, ImageLayer::Loading] {
            let frame = build_frame(&FrameInput {
                viewport: None,
                image: layer,
                points: &points,
                selected: None,
                overlays: &[],
                style: &style,
            });
            assert_eq!(frame.size, Vec2::ZERO);
            assert!(matches!(frame.commands[1], DrawCommand::Placeholder { .. }));
            assert_eq!(frame.commands.len(), 2);
        }
    }

    #[test]
    fn test_unusable_overlay_does_not_block_others() {
        let style = RenderStyle::default();
        let overlays = vec![
            DetectionOverlay {
                label: "bad".to_string(),
                score: None,
                shape: OverlayShape::Polygons(vec![vec![pos2(0.0, 0.0), pos2(1.0, 1.0)]]),
            },
            DetectionOverlay {
                label: "huge".to_string(),
                score: None,
                shape: OverlayShape::BoundingBox {
                    min: pos2(f32::MAX, 0.0),
                    size: vec2(f32::MAX, 1.0),
                },
            },
            DetectionOverlay {
                label: "good".to_string(),
                score: Some(0.5),
                shape: OverlayShape::BoundingBox {
                    min: pos2(2.0, 4.0),
                    size: vec2(2.0, 2.0),
                },
            },
        ];
        let frame = build_frame(&FrameInput {
            viewport: viewport(vec2(100.0, 100.0), vec2(100.0, 100.0)),
            image: ImageLayer::Ready,
            points: &[],
            selected: None,
            overlays: &overlays,
            style: &style,
        });

        let chips: Vec<_> = frame
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::LabelChip { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chips, vec!["good 50.0%"]);
    }

    #[test]
    fn test_overlay_colors() {
        let style = RenderStyle::default();
        assert_eq!(style.overlay_color("person"), Color32::from_rgb(0xFF, 0x6B, 0x6B));
        assert_eq!(style.overlay_color("ship"), Color32::from_gray(0x99));

        let mut config = AnnotatorConfig::default();
        config.overlay_colors.insert("ship".to_string(), [1, 2, 3]);
        let style = RenderStyle::from_config(&config);
        assert_eq!(style.overlay_color("ship"), Color32::from_rgb(1, 2, 3));
    }
}
