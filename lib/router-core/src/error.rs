use crate::store::StoreError;
use router_api::CodecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing route id")]
    MissingRouteId,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Route definition error: {0}")]
    Parse(#[from] CodecError),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
