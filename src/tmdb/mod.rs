pub mod client;

use async_trait::async_trait;

use crate::core::types::FetchedTitle;
use crate::error::Result;

pub use client::TmdbClient;

/// Lookup of a title's name, popularity score and release date by catalog id
#[async_trait]
pub trait TitleFetcher: Send + Sync {
    async fn fetch(&self, tmdb_id: i64) -> Result<FetchedTitle>;
}
