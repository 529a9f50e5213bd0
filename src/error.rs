use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("layout solver failed: {0}")]
    Solver(String),
    #[error("invalid layout graph: {0}")]
    InvalidGraph(String),
    #[error("failed to parse flow: {0}")]
    Parse(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = LayoutError> = std::result::Result<T, E>;
