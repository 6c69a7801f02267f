//! Draft state behind a message input.

use tandem_shared::ConversationKey;
use tandem_store::{MessageLogStore, Participant, Principal};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::send::{send_message_then, SendReceipt};

/// The text being typed and whether a send is in flight.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Composer {
    draft: String,
    sending: bool,
}

/// Clears `sending` and hands the draft back unless the append step
/// disarmed it, even if the send future is dropped mid-flight.
struct InFlight<'a> {
    composer: &'a mut Composer,
    restore: Option<String>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.composer.sending = false;
        if let Some(text) = self.restore.take() {
            self.composer.draft = text;
        }
    }
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Whether a send button should be enabled.
    pub fn can_send(&self) -> bool {
        !self.sending && !self.draft.trim().is_empty()
    }

    /// Send the trimmed draft.
    ///
    /// The input is cleared while the send runs.  It is restored when
    /// nothing reached the store, and left cleared when the message was
    /// appended, even if the summary update then failed.
    pub async fn submit(
        &mut self,
        store: &dyn MessageLogStore,
        key: &ConversationKey,
        sender: &Principal,
        recipient: &Participant,
        config: &ClientConfig,
    ) -> Result<SendReceipt, ClientError> {
        let text = self.draft.trim().to_string();
        if text.is_empty() {
            return Ok(SendReceipt::Skipped);
        }

        let original = std::mem::take(&mut self.draft);
        self.sending = true;
        let mut in_flight = InFlight {
            composer: self,
            restore: Some(original),
        };

        let restore = &mut in_flight.restore;
        let result = send_message_then(store, key, sender, recipient, &text, config, |_| {
            // The message is in the log from here on; never hand it back.
            *restore = None;
        })
        .await;

        drop(in_flight);
        result
    }
}
