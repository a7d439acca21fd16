//! Session bootstrap against the conversational search service.

pub mod client;
pub mod cookie;
pub mod scrape;
pub mod token_cache;

pub use client::{SearchClient, SearchSession};
pub use token_cache::{TokenCache, TtlTokenCache};
