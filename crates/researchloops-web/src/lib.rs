//! # researchloops-web
//!
//! The web collaborators used by fact checking: keyword search returning
//! URLs, and page fetch returning a title plus a plain-text body.
//!
//! ## Key Types
//!
//! - [`WebSearch`] / [`PageFetch`] - Collaborator traits
//! - [`SerperSearch`] - Google results through serper.dev
//! - [`HttpPageFetcher`] - `reqwest` fetch with a per-request timeout
//! - [`testing`] - Canned search results and pages for tests

mod fetch;
mod serper;
pub mod testing;
mod traits;

pub use fetch::{html_to_text, HttpPageFetcher};
pub use serper::SerperSearch;
pub use traits::{FetchedPage, PageFetch, WebError, WebSearch};
