use thiserror::Error;

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Expected exactly one route definition, found {0}")]
    RouteCount(usize),
}

impl CodecError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        CodecError::Parse {
            offset,
            message: message.into(),
        }
    }
}
