//! Game data source trait.
//!
//! During the Fetching stage of a reconciliation the driver asks a
//! [`GameDataSource`] for a universe's catalog metadata and its place
//! listing. The trait abstracts where that data comes from: the Roblox
//! HTTP API in production, a scripted fake in tests.

use std::future::Future;

use herald_types::{GameMetadata, PlaceInfo, UniverseId};

/// Errors that can occur while fetching remote game data.
///
/// Always recoverable: the game's tick is abandoned and the next scheduled
/// tick retries naturally.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request could not be sent or the connection failed.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// The response body was not in the expected shape.
    #[error("malformed response: {message}")]
    Malformed {
        /// Description of what was wrong.
        message: String,
    },

    /// The API answered but had no data for the universe.
    #[error("no data returned for universe {universe_id}")]
    NotFound {
        /// The universe that was requested.
        universe_id: UniverseId,
    },
}

/// A source of remote game state.
pub trait GameDataSource {
    /// Fetch catalog metadata (name, visits, updated token) for a universe.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, a non-success response,
    /// a malformed body, or an empty data set.
    fn fetch_metadata(
        &self,
        universe_id: &UniverseId,
    ) -> impl Future<Output = Result<GameMetadata, FetchError>> + Send;

    /// Fetch the universe's places in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, a non-success response,
    /// or a malformed body.
    fn fetch_places(
        &self,
        universe_id: &UniverseId,
    ) -> impl Future<Output = Result<Vec<PlaceInfo>, FetchError>> + Send;
}
