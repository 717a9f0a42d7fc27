//! Session error types.

use thiserror::Error;

/// Errors from explicit session requests.
///
/// Protocol events never produce these: inbound inconsistencies are soft and
/// only counted. These cover requests the caller made against state that does
/// not allow them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Conversation is not open.
    #[error("conversation {name} is not open")]
    UnknownConversation {
        /// Requested name.
        name: String,
    },

    /// Name cannot identify a conversation.
    #[error("invalid conversation name {name:?}")]
    InvalidName {
        /// Rejected name.
        name: String,
    },
}
