pub mod cards;
pub mod drag;
pub mod feedback;
pub mod fields;
pub mod filters;
pub mod grouping;
pub mod lists;
pub mod memory;
pub mod notifications;
pub mod ordering;
pub mod preferences;
pub mod projects;
pub mod reorder;
pub mod repository;

pub use drag::{DragError, DragMachine, DragState};
pub use repository::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Repository(#[from] RepoError),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
