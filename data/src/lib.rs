pub mod annotation;
pub mod chart;
pub mod replay;
pub mod series;
pub mod util;

pub use annotation::{Annotation, AnnotationKind, DrawingPoint, Style};
pub use replay::Replay;

/// Errors the client surfaces to its status line.
#[derive(thiserror::Error, Debug, Clone)]
pub enum InternalError {
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("persistence error: {0}")]
    Persist(String),
}
