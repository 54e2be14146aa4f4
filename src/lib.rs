//! Point annotation on top of an image, with detection overlays.
//!
//! The engine is split the way the data flows: [`loader`] produces an image,
//! [`viewport`] fits it to the container, [`interaction`] turns pointer events
//! into [`store`] edits, and [`render`] draws points and [`overlay`] shapes.
//! [`session::AnnotationSession`] ties them together for a host; [`app`] is
//! the eframe host used by the binary.

pub mod app;
pub mod config;
pub mod error;
pub mod interaction;
pub mod loader;
pub mod model;
pub mod overlay;
pub mod render;
pub mod session;
pub mod store;
pub mod viewport;

pub use config::AnnotatorConfig;
pub use error::{ConfigError, LoadError, OverlayError, SidecarError};
pub use model::AnnotationPoint;
pub use session::{AnnotationSession, SessionProps};
