//! Annotation point data model and sidecar persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SidecarError;

/// Shape tag carried in serialized points. Points are the only user-placed shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    #[default]
    Point,
}

/// One user-placed marker, in image-space pixels with a top-left origin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationPoint {
    pub x: i32,
    pub y: i32,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: PointKind,
}

impl AnnotationPoint {
    pub fn new(x: i32, y: i32, label: impl Into<String>) -> Self {
        Self {
            x,
            y,
            label: label.into(),
            category: None,
            kind: PointKind::Point,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn pos(&self) -> egui::Pos2 {
        egui::pos2(self.x as f32, self.y as f32)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PointFile {
    points: Vec<AnnotationPoint>,
}

/// Sidecar file that stores the points of `image_path` next to it.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension(format!(
        "{}.points.json",
        image_path
            .extension()
            .unwrap_or_default()
            .to_str()
            .unwrap_or("")
    ))
}

/// Load previously saved points. A missing sidecar is an empty list.
pub fn load_points(image_path: &Path) -> Result<Vec<AnnotationPoint>, SidecarError> {
    let path = sidecar_path(image_path);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(&path).map_err(|e| SidecarError::io(&path, e))?;
    let file: PointFile = serde_json::from_str(&data)?;
    Ok(file.points)
}

pub fn save_points(image_path: &Path, points: &[AnnotationPoint]) -> Result<(), SidecarError> {
    let path = sidecar_path(image_path);
    let file = PointFile {
        points: points.to_vec(),
    };
    let data = serde_json::to_string_pretty(&file)?;
    std::fs::write(&path, data).map_err(|e| SidecarError::io(&path, e))?;
    log::debug!("Saved {} points to {:?}", points.len(), path);
    Ok(())
}
