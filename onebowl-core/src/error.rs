use std::net::IpAddr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URLs pointing to private/internal networks are not allowed ({host} resolves to {addr})")]
    BlockedNetwork { host: String, addr: IpAddr },

    #[error("Could not resolve hostname: {0}")]
    ResolutionFailed(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("Could not fetch URL: {0}")]
    Network(String),

    #[error("Could not fetch URL: HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Redirect error: {0}")]
    Redirect(String),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No Recipe found in structured data")]
    NoRecipe,

    #[error("Invalid JSON-LD: {0}")]
    InvalidJson(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Could not extract any content from the page")]
    NoContent,

    #[error("Page does not appear to contain a recipe ({length} characters of text)")]
    InsufficientContent { length: usize },
}
