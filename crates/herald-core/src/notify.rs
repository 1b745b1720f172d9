//! Notifier trait.
//!
//! The Announcing stage hands composed message text to a [`Notifier`].
//! Text may contain platform markup (role mentions, markdown links,
//! relative-timestamp tokens); the core only composes strings.

use std::future::Future;

use herald_types::ChannelId;

/// Errors that can occur while delivering one announcement.
///
/// Recoverable and never rolled back: the event counts as processed even
/// if the message did not arrive.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request could not be sent or the connection failed.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// The messaging platform rejected the message.
    #[error("channel {channel_id} rejected message ({status}): {body}")]
    Rejected {
        /// Target channel.
        channel_id: ChannelId,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },
}

/// A destination for announcements.
pub trait Notifier {
    /// Post `text` to `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the message could not be delivered.
    fn send(
        &self,
        channel_id: &ChannelId,
        text: &str,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;
}
