//! Detection overlays: externally supplied shapes drawn on top of the image.
//!
//! Records arrive in the detection service's wire format, where the shape kind
//! is implied by which field is populated. They are resolved once, on
//! ingestion, into [`OverlayShape`]; the renderer never looks at raw records.

use egui::{pos2, Pos2};
use serde::{Deserialize, Serialize};

use crate::error::OverlayError;

/// Minimum number of vertices for a segmentation polygon.
pub const MIN_POLYGON_VERTICES: usize = 4;

/// One detection as produced by the upstream service.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(default)]
    pub label: String,

    /// `[x, y, w, h]`, axis-aligned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// Polygons, each a flat `x0, y0, x1, y1, ...` sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segmentation: Option<Vec<Vec<f64>>>,

    /// Rotated quadrilateral, four flat `x, y` pairs
    #[serde(
        default,
        alias = "rotated_box",
        alias = "rotatedBox",
        skip_serializing_if = "Option::is_none"
    )]
    pub true_rbox: Option<Vec<f64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Response body of the detection service.
#[derive(Clone, Debug, Default, Deserialize)]
struct DetectionResponse {
    detections: Vec<DetectionRecord>,
    #[serde(default)]
    detection_count: Option<usize>,
}

/// Geometry of a resolved overlay, in image-space pixels.
#[derive(Clone, Debug, PartialEq)]
pub enum OverlayShape {
    BoundingBox { min: Pos2, size: egui::Vec2 },
    Polygons(Vec<Vec<Pos2>>),
    RotatedBox([Pos2; 4]),
}

impl OverlayShape {
    /// Topmost vertex, leftmost among ties. Label chips are anchored here.
    pub fn anchor(&self) -> Pos2 {
        let top_left = |a: Pos2, b: Pos2| {
            if (b.y, b.x) < (a.y, a.x) {
                b
            } else {
                a
            }
        };
        match self {
            OverlayShape::BoundingBox { min, .. } => *min,
            OverlayShape::Polygons(polygons) => polygons
                .iter()
                .flatten()
                .copied()
                .reduce(top_left)
                .unwrap_or(Pos2::ZERO),
            OverlayShape::RotatedBox(corners) => {
                corners.iter().copied().reduce(top_left).unwrap_or(Pos2::ZERO)
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            OverlayShape::BoundingBox { .. } => "bbox",
            OverlayShape::Polygons(_) => "segmentation",
            OverlayShape::RotatedBox(_) => "rotated box",
        }
    }
}

/// A detection ready to be drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionOverlay {
    pub label: String,
    /// Confidence in `[0, 1]`, from `score` or else `confidence`
    pub score: Option<f32>,
    pub shape: OverlayShape,
}

impl DetectionOverlay {
    /// Resolve a record's shape. Segmentation wins over a rotated box, which
    /// wins over a bbox; empty fields count as absent.
    pub fn from_record(record: &DetectionRecord) -> Result<Self, OverlayError> {
        let non_empty = |v: &Option<Vec<f64>>| v.as_ref().filter(|v| !v.is_empty()).cloned();

        let shape = if let Some(segmentation) = record
            .segmentation
            .as_ref()
            .filter(|polygons| polygons.iter().any(|p| !p.is_empty()))
        {
            let polygons: Vec<Vec<Pos2>> = segmentation
                .iter()
                .filter(|flat| flat.len() >= MIN_POLYGON_VERTICES * 2)
                .map(|flat| to_points(flat))
                .collect();
            if polygons.is_empty() {
                return Err(OverlayError::NoValidPolygon);
            }
            OverlayShape::Polygons(polygons)
        } else if let Some(rbox) = non_empty(&record.true_rbox) {
            if rbox.len() != 8 {
                return Err(OverlayError::BadRotatedBox { len: rbox.len() });
            }
            let p = to_points(&rbox);
            OverlayShape::RotatedBox([p[0], p[1], p[2], p[3]])
        } else if let Some(bbox) = non_empty(&record.bbox) {
            if bbox.len() != 4 {
                return Err(OverlayError::BadBoundingBox { len: bbox.len() });
            }
            OverlayShape::BoundingBox {
                min: pos2(bbox[0] as f32, bbox[1] as f32),
                size: egui::vec2(bbox[2] as f32, bbox[3] as f32),
            }
        } else {
            return Err(OverlayError::NoShape {
                label: record.label.clone(),
            });
        };

        if !shape_is_finite(&shape) {
            return Err(OverlayError::NonFinite {
                label: record.label.clone(),
            });
        }

        Ok(Self {
            label: record.label.clone(),
            score: record.score.or(record.confidence),
            shape,
        })
    }

    /// Chip text, e.g. `ship 90.0%`.
    pub fn caption(&self) -> String {
        match self.score {
            Some(score) => format!("{} {:.1}%", self.label, score * 100.0),
            None => self.label.clone(),
        }
    }
}

/// Resolve every record, dropping the malformed ones.
pub fn resolve_all(records: &[DetectionRecord]) -> Vec<DetectionOverlay> {
    records
        .iter()
        .enumerate()
        .filter_map(|(i, record)| match DetectionOverlay::from_record(record) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                log::debug!("Skipping detection #{}: {}", i, e);
                None
            }
        })
        .collect()
}

/// Parse either a bare array of records or a detection service response.
pub fn parse_records(json: &str) -> Result<Vec<DetectionRecord>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Body {
        List(Vec<DetectionRecord>),
        Response(DetectionResponse),
    }

    match serde_json::from_str(json)? {
        Body::List(records) => Ok(records),
        Body::Response(response) => {
            if let Some(count) = response.detection_count {
                if count != response.detections.len() {
                    log::warn!(
                        "detection_count is {} but {} detections were sent",
                        count,
                        response.detections.len()
                    );
                }
            }
            Ok(response.detections)
        }
    }
}

fn to_points(flat: &[f64]) -> Vec<Pos2> {
    flat.chunks_exact(2)
        .map(|xy| pos2(xy[0] as f32, xy[1] as f32))
        .collect()
}

fn shape_is_finite(shape: &OverlayShape) -> bool {
    let finite = |p: &Pos2| p.x.is_finite() && p.y.is_finite();
    match shape {
        OverlayShape::BoundingBox { min, size } => {
            finite(min) && size.x.is_finite() && size.y.is_finite()
        }
        OverlayShape::Polygons(polygons) => polygons.iter().flatten().all(finite),
        OverlayShape::RotatedBox(corners) => corners.iter().all(finite),
    }
}
