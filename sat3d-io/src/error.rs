use sat3d_core::GeomError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("format error: {0}")]
    Format(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("failed to parse {field}: {value:?}")]
    Parse { field: String, value: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("registry parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Geometry(#[from] GeomError),
}

pub type Result<T> = std::result::Result<T, CodecError>;
