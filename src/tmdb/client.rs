//! HTTP client for the TMDB movie details endpoint.
//!
//! Every failure (transport, timeout, non-2xx status, unexpected payload) is
//! surfaced as [`PipelineError::ExternalFetch`] so the external worker can
//! drop the update without touching the record.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::TitleFetcher;
use crate::config::DEFAULT_TMDB_BASE_URL;
use crate::core::types::FetchedTitle;
use crate::error::{PipelineError, Result};

const MAX_EXTERNAL_SCORE: f64 = 10.0;

#[derive(Debug, Deserialize)]
struct MovieDetails {
    title: Option<String>,
    vote_average: Option<f64>,
    #[serde(default)]
    release_date: Option<String>,
}

/// Client for `GET {base}/{id}?api_key=...`.
///
/// Use [`TmdbClient::new`] for the public API or [`TmdbClient::with_base_url`]
/// to point at another host (a mock server in tests).
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: Url,
}

impl TmdbClient {
    pub fn new(api_key: &str, timeout_secs: u64) -> Result<Self> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_TMDB_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, timeout_secs: u64, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .user_agent("trend-pipeline/0.1")
            .build()?;

        // Exactly one trailing slash so `join` appends the id instead of
        // replacing the last path segment
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised)
            .map_err(|e| PipelineError::Config(format!("invalid TMDB base URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.to_owned(),
            base_url,
        })
    }

    pub(crate) fn build_url(&self, tmdb_id: i64) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&tmdb_id.to_string())
            .map_err(|e| PipelineError::ExternalFetch(format!("invalid URL for {tmdb_id}: {e}")))?;
        url.query_pairs_mut().append_pair("api_key", &self.api_key);
        Ok(url)
    }

    async fn request_details(&self, tmdb_id: i64) -> Result<MovieDetails> {
        let url = self.build_url(tmdb_id)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::ExternalFetch(format!("request for {tmdb_id} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::ExternalFetch(format!(
                "TMDB returned {status} for {tmdb_id}"
            )));
        }

        response.json::<MovieDetails>().await.map_err(|e| {
            PipelineError::ExternalFetch(format!("malformed TMDB payload for {tmdb_id}: {e}"))
        })
    }
}

fn into_fetched(tmdb_id: i64, details: MovieDetails) -> Result<FetchedTitle> {
    let name = details
        .title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| PipelineError::ExternalFetch(format!("no title for {tmdb_id}")))?;

    let external_score = details
        .vote_average
        .ok_or_else(|| PipelineError::ExternalFetch(format!("no vote_average for {tmdb_id}")))?;

    if !external_score.is_finite() || !(0.0..=MAX_EXTERNAL_SCORE).contains(&external_score) {
        return Err(PipelineError::ExternalFetch(format!(
            "vote_average {external_score} out of range for {tmdb_id}"
        )));
    }

    // TMDB sends "" for unreleased titles
    let release_date = details.release_date.filter(|d| !d.trim().is_empty());

    Ok(FetchedTitle {
        name,
        external_score,
        release_date,
    })
}

#[async_trait]
impl TitleFetcher for TmdbClient {
    async fn fetch(&self, tmdb_id: i64) -> Result<FetchedTitle> {
        let details = self.request_details(tmdb_id).await?;
        let fetched = into_fetched(tmdb_id, details)?;
        debug!(
            "Fetched '{}' (score {}) for TMDB ID {}",
            fetched.name, fetched.external_score, tmdb_id
        );
        Ok(fetched)
    }
}
