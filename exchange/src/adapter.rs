pub mod binance;

/// Errors surfaced by data-provider adapters.
#[derive(thiserror::Error, Debug)]
pub enum AdapterError {
    #[error("fetch error: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
