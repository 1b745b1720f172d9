//! Roblox web API data source.
//!
//! Implements [`GameDataSource`] over two public endpoints:
//!
//! - `GET {games_api}/v1/games?universeIds={id}` for name, visits and the
//!   `updated` token
//! - `GET {develop_api}/v1/universes/{id}/places` for the place listing,
//!   paged with `nextPageCursor`
//!
//! Response bodies are decoded into typed structs; anything unexpected
//! becomes a [`FetchError`] and abandons the game's tick.

use std::time::Duration;

use herald_core::config::RobloxConfig;
use herald_core::{FetchError, GameDataSource};
use herald_types::{GameMetadata, PlaceId, PlaceInfo, UniverseId};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AnnouncerError;

/// Per-request timeout for Roblox API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Largest page size the places endpoint accepts.
const PLACES_PAGE_LIMIT: u32 = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GamesResponse {
    #[serde(default)]
    data: Vec<GameEntry>,
}

#[derive(Debug, Deserialize)]
struct GameEntry {
    name: String,
    #[serde(default)]
    visits: u64,
    updated: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacesPage {
    #[serde(default)]
    data: Vec<PlaceEntry>,
    #[serde(default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceEntry {
    id: u64,
    #[serde(default)]
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Roblox games and develop APIs.
pub struct RobloxClient {
    client: reqwest::Client,
    games_api: String,
    develop_api: String,
    max_place_pages: u32,
}

impl RobloxClient {
    /// Build a client from the `roblox` config section.
    ///
    /// # Errors
    ///
    /// Returns [`AnnouncerError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &RobloxConfig) -> Result<Self, AnnouncerError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("herald-announcer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AnnouncerError::Http {
                message: format!("failed to build Roblox client: {e}"),
            })?;

        Ok(Self {
            client,
            games_api: config.games_api.trim_end_matches('/').to_owned(),
            develop_api: config.develop_api.trim_end_matches('/').to_owned(),
            max_place_pages: config.max_place_pages.max(1),
        })
    }

    /// GET `url` and return the body of a successful response.
    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                message: format!("GET {url} failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response.text().await.map_err(|e| FetchError::Transport {
            message: format!("reading {url} body failed: {e}"),
        })
    }
}

impl GameDataSource for RobloxClient {
    async fn fetch_metadata(&self, universe_id: &UniverseId) -> Result<GameMetadata, FetchError> {
        let url = format!("{}/v1/games", self.games_api);
        let body = self
            .get_text(&url, &[("universeIds", universe_id.to_string())])
            .await?;
        parse_metadata(universe_id, &body)
    }

    async fn fetch_places(&self, universe_id: &UniverseId) -> Result<Vec<PlaceInfo>, FetchError> {
        let url = format!("{}/v1/universes/{universe_id}/places", self.develop_api);
        let mut places = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 1..=self.max_place_pages {
            let mut query = vec![
                ("sortOrder", "Asc".to_owned()),
                ("limit", PLACES_PAGE_LIMIT.to_string()),
            ];
            if let Some(cursor) = cursor.take() {
                query.push(("cursor", cursor));
            }

            let body = self.get_text(&url, &query).await?;
            let (batch, next) = parse_places_page(&body)?;
            debug!(
                universe_id = %universe_id,
                page,
                places = batch.len(),
                "Fetched place page"
            );
            places.extend(batch);

            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(places),
            }
        }

        warn!(
            universe_id = %universe_id,
            max_place_pages = self.max_place_pages,
            places = places.len(),
            "Place listing truncated at page cap"
        );
        Ok(places)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a `/v1/games` response for `universe_id`.
fn parse_metadata(universe_id: &UniverseId, body: &str) -> Result<GameMetadata, FetchError> {
    let response: GamesResponse = serde_json::from_str(body).map_err(|e| FetchError::Malformed {
        message: format!("games response: {e}"),
    })?;

    let entry = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::NotFound {
            universe_id: universe_id.clone(),
        })?;

    Ok(GameMetadata {
        name: entry.name,
        visits: entry.visits,
        updated_at: entry.updated,
    })
}

/// Decode one places page into the places and the next cursor, if any.
fn parse_places_page(body: &str) -> Result<(Vec<PlaceInfo>, Option<String>), FetchError> {
    let page: PlacesPage = serde_json::from_str(body).map_err(|e| FetchError::Malformed {
        message: format!("places response: {e}"),
    })?;

    let places = page
        .data
        .into_iter()
        .map(|entry| PlaceInfo {
            id: PlaceId(entry.id),
            name: entry.name,
        })
        .collect();
    let next = page.next_page_cursor.filter(|c| !c.is_empty());
    Ok((places, next))
}
