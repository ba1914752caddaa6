//! Jikan (MyAnimeList) search client
//!
//! Only anime title search is used: `GET {base}/anime?q={query}`.
//! No rate limiting or retry is applied; a failed request fails the item.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::models::Candidate;

const USER_AGENT: &str = concat!("sttag/", env!("CARGO_PKG_VERSION"));

/// Metadata lookup errors
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Remote title search
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Candidates for `query`, in the service's relevance order
    async fn search_by_title(&self, query: &str) -> Result<Vec<Candidate>, LookupError>;
}

/// Jikan search response envelope
#[derive(Debug, Deserialize)]
struct JikanSearchResponse {
    #[serde(default)]
    data: Vec<JikanAnime>,
}

/// Jikan anime entry (fields used here only)
#[derive(Debug, Deserialize)]
struct JikanAnime {
    title: String,
    /// Number of MyAnimeList members tracking the entry
    members: Option<u64>,
    images: Option<JikanImages>,
}

#[derive(Debug, Deserialize)]
struct JikanImages {
    jpg: Option<JikanImageSet>,
}

#[derive(Debug, Deserialize)]
struct JikanImageSet {
    image_url: Option<String>,
    large_image_url: Option<String>,
}

impl JikanAnime {
    fn into_candidate(self) -> Option<Candidate> {
        let jpg = self.images?.jpg?;
        let image_url = jpg.image_url.or(jpg.large_image_url)?;
        Some(Candidate {
            title: self.title,
            popularity: self.members,
            image_url,
        })
    }
}

/// Jikan API client
pub struct JikanClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl JikanClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| LookupError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataLookup for JikanClient {
    async fn search_by_title(&self, query: &str) -> Result<Vec<Candidate>, LookupError> {
        let url = format!("{}/anime", self.base_url);

        tracing::debug!(query = %query, url = %url, "Querying Jikan API");

        let response = self
            .http_client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| LookupError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LookupError::ApiError(status.as_u16(), error_text));
        }

        let body: JikanSearchResponse = response
            .json()
            .await
            .map_err(|e| LookupError::ParseError(e.to_string()))?;

        let candidates: Vec<Candidate> = body
            .data
            .into_iter()
            .filter_map(JikanAnime::into_candidate)
            .collect();

        tracing::debug!(query = %query, count = candidates.len(), "Jikan search complete");

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let json = r#"{
            "pagination": {"has_next_page": false},
            "data": [
                {
                    "mal_id": 1,
                    "title": "Cowboy Bebop",
                    "members": 1900000,
                    "images": {"jpg": {
                        "image_url": "https://cdn.myanimelist.net/images/anime/4/19644.jpg",
                        "large_image_url": "https://cdn.myanimelist.net/images/anime/4/19644l.jpg"
                    }}
                },
                {
                    "mal_id": 5,
                    "title": "Cowboy Bebop: Tengoku no Tobira",
                    "members": null,
                    "images": {"jpg": {"image_url": null, "large_image_url": "https://img/large.jpg"}}
                },
                {
                    "mal_id": 6,
                    "title": "No Art",
                    "members": 3
                }
            ]
        }"#;

        let body: JikanSearchResponse = serde_json::from_str(json).unwrap();
        let candidates: Vec<Candidate> = body
            .data
            .into_iter()
            .filter_map(JikanAnime::into_candidate)
            .collect();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Cowboy Bebop");
        assert_eq!(candidates[0].popularity, Some(1_900_000));
        assert!(candidates[0].image_url.ends_with("19644.jpg"));
        assert_eq!(candidates[1].popularity, None);
        assert_eq!(candidates[1].image_url, "https://img/large.jpg");
    }

    #[test]
    fn test_empty_data_parses() {
        let body: JikanSearchResponse = serde_json::from_str(r#"{"data": []}"#).unwrap();
        assert!(body.data.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = JikanClient::new("https://api.jikan.moe/v4/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "https://api.jikan.moe/v4");
    }
}
