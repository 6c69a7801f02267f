use tandem_shared::AddressError;
use tandem_store::StoreError;
use thiserror::Error;

/// Which half of the two-step send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStage {
    /// Appending to the message log.  Nothing was written.
    Append,
    /// Upserting the thread summary.  The message itself is persisted.
    Summary,
}

impl std::fmt::Display for SendStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Append => f.write_str("append"),
            Self::Summary => f.write_str("summary"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(#[from] AddressError),

    #[error("Subscription error: {0}")]
    Subscription(#[source] StoreError),

    #[error("Send failed at {stage} step: {source}")]
    Send {
        stage: SendStage,
        /// Set when the message was appended before the failure.
        message_id: Option<String>,
        #[source]
        source: StoreError,
    },

    #[error("Sign-in required")]
    AuthRequired,

    #[error("Cannot start a conversation with yourself")]
    SelfConversation,

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Message too long: {len} characters (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("No phone number is linked to the signed-in account")]
    PhoneNotLinked,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Whether the failed operation left no trace in the store, so the
    /// user's input should be handed back for a retry.
    pub fn nothing_written(&self) -> bool {
        !matches!(
            self,
            Self::Send {
                stage: SendStage::Summary,
                ..
            }
        )
    }

    /// Whether the UI should send the user back to sign-in.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::AuthRequired)
    }

    /// Text suitable for an alert or inline notice.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidIdentifier(_) | Self::InvalidRecipient(_) => {
                "Invalid chat recipient".to_string()
            }
            Self::Subscription(e) => format!("Failed to load updates: {e}"),
            Self::Send { stage: SendStage::Append, source, .. } => {
                format!("Failed to send message: {source}")
            }
            Self::Send { stage: SendStage::Summary, .. } => {
                "Message sent, but the conversation list may be out of date".to_string()
            }
            Self::AuthRequired => "You must be logged in to send messages".to_string(),
            Self::SelfConversation => "You cannot chat with yourself".to_string(),
            Self::MessageTooLong { max, .. } => {
                format!("Messages are limited to {max} characters")
            }
            Self::PhoneNotLinked => "Link a phone number first".to_string(),
            Self::Store(e) => format!("Something went wrong: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_failure_keeps_message() {
        let append = ClientError::Send {
            stage: SendStage::Append,
            message_id: None,
            source: StoreError::Backend("offline".into()),
        };
        let summary = ClientError::Send {
            stage: SendStage::Summary,
            message_id: Some("m1".into()),
            source: StoreError::Backend("offline".into()),
        };
        assert!(append.nothing_written());
        assert!(!summary.nothing_written());
        assert!(append.user_message().contains("offline"));
    }

    #[test]
    fn test_auth_required_redirects() {
        assert!(ClientError::AuthRequired.requires_sign_in());
        assert!(!ClientError::SelfConversation.requires_sign_in());
    }
}
