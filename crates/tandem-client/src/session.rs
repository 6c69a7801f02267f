//! Everything one signed-in client needs, bundled.
//!
//! [`ChatSession`] holds the collaborators and the config and forwards to
//! the free functions in the other modules, filling in the principal.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tandem_shared::{ConversationKey, ParticipantId};
use tandem_store::{
    DirectoryStore, IdentityProvider, MessageLogStore, NoPushToken, Participant, Principal,
    PushTokenSource,
};

use crate::composer::Composer;
use crate::config::ClientConfig;
use crate::conversations::{list_conversations, ConversationPreview};
use crate::directory::{lookup_participant, watch_directory, DirectoryUpdate};
use crate::error::ClientError;
use crate::profile::{self, DedupReport};
use crate::send::{send_message, SendReceipt};
use crate::subscription::{Gate, Subscription};
use crate::thread::{watch_thread, ThreadUpdate};

/// An open one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub key: ConversationKey,
    pub recipient: Participant,
}

pub struct ChatSession {
    directory: Arc<dyn DirectoryStore>,
    log: Arc<dyn MessageLogStore>,
    identity: Arc<dyn IdentityProvider>,
    push: Arc<dyn PushTokenSource>,
    config: ClientConfig,
}

impl ChatSession {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        log: Arc<dyn MessageLogStore>,
        identity: Arc<dyn IdentityProvider>,
        config: ClientConfig,
    ) -> Self {
        Self {
            directory,
            log,
            identity,
            push: Arc::new(NoPushToken),
            config,
        }
    }

    /// A session over one backend that serves both stores.
    pub fn with_backend<B>(backend: Arc<B>, identity: Arc<dyn IdentityProvider>, config: ClientConfig) -> Self
    where
        B: DirectoryStore + MessageLogStore + 'static,
    {
        let directory: Arc<dyn DirectoryStore> = backend.clone();
        let log: Arc<dyn MessageLogStore> = backend;
        Self::new(directory, log, identity, config)
    }

    pub fn with_push_tokens(mut self, push: Arc<dyn PushTokenSource>) -> Self {
        self.push = push;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The signed-in principal, or [`ClientError::AuthRequired`].
    pub fn require_principal(&self) -> Result<Principal, ClientError> {
        self.identity
            .current_principal()
            .ok_or(ClientError::AuthRequired)
    }

    /// Address the conversation between the principal and `recipient`.
    pub fn open_conversation(&self, recipient: &Participant) -> Result<Conversation, ClientError> {
        let me = self.require_principal()?;
        if recipient.id == me.uid {
            return Err(ClientError::SelfConversation);
        }
        let key = ConversationKey::derive(&me.uid, &recipient.id);
        debug!(key = %key, "conversation opened");
        Ok(Conversation {
            key,
            recipient: recipient.clone(),
        })
    }

    /// Like [`Self::open_conversation`] for a recipient known only by a
    /// raw id and a display name, e.g. from navigation parameters.
    pub fn open_conversation_with(&self, recipient_id: &str, display_name: &str) -> Result<Conversation, ClientError> {
        if recipient_id.trim().is_empty() {
            return Err(ClientError::InvalidRecipient("recipient id is empty".to_string()));
        }
        let id = ParticipantId::parse(recipient_id)
            .map_err(|e| ClientError::InvalidRecipient(e.to_string()))?;
        self.open_conversation(&Participant {
            id,
            display_name: display_name.to_string(),
            email: None,
            phone_number: None,
            photo_url: None,
        })
    }

    /// Open a conversation with the participant whose uid is
    /// `recipient_id`, taking their name from the directory.  Without a
    /// directory record the configured fallback name is used.
    pub async fn open_conversation_by_id(&self, recipient_id: &str) -> Result<Conversation, ClientError> {
        if recipient_id.trim().is_empty() {
            return Err(ClientError::InvalidRecipient("recipient id is empty".to_string()));
        }
        let id = ParticipantId::parse(recipient_id)
            .map_err(|e| ClientError::InvalidRecipient(e.to_string()))?;
        match lookup_participant(self.directory.as_ref(), &id, &self.config.fallback_name).await? {
            Some(recipient) => self.open_conversation(&recipient),
            None => {
                debug!(uid = %id.short(), "recipient has no directory record");
                self.open_conversation_with(recipient_id, &self.config.fallback_name)
            }
        }
    }

    pub fn watch_directory<F>(&self, on_update: F) -> Result<Subscription, ClientError>
    where
        F: FnMut(DirectoryUpdate) + Send + 'static,
    {
        let me = self.require_principal()?;
        Ok(watch_directory(self.directory.as_ref(), me.uid, on_update))
    }

    pub fn watch_thread<F>(&self, conversation: &Conversation, on_update: F) -> Subscription
    where
        F: FnMut(ThreadUpdate) + Send + 'static,
    {
        watch_thread(self.log.as_ref(), &conversation.key, on_update)
    }

    pub async fn send(&self, conversation: &Conversation, body: &str) -> Result<SendReceipt, ClientError> {
        let me = self.require_principal()?;
        send_message(
            self.log.as_ref(),
            &conversation.key,
            &me,
            &conversation.recipient,
            body,
            &self.config,
        )
        .await
    }

    /// Send `composer`'s draft into `conversation`.
    pub async fn submit(&self, composer: &mut Composer, conversation: &Conversation) -> Result<SendReceipt, ClientError> {
        let me = self.require_principal()?;
        composer
            .submit(
                self.log.as_ref(),
                &conversation.key,
                &me,
                &conversation.recipient,
                &self.config,
            )
            .await
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationPreview>, ClientError> {
        let me = self.require_principal()?;
        list_conversations(self.log.as_ref(), &me.uid, &self.config.fallback_name).await
    }

    /// Upsert the principal's directory record.  Returns whether it was
    /// created.
    pub async fn sync_profile(&self) -> Result<bool, ClientError> {
        let me = self.require_principal()?;
        profile::sync_profile(self.directory.as_ref(), &me, self.push.as_ref()).await
    }

    pub async fn record_phone_link(&self) -> Result<(), ClientError> {
        let me = self.require_principal()?;
        profile::record_phone_link(self.directory.as_ref(), &me).await
    }

    pub async fn phone_number_registered(&self, phone_number: &str) -> Result<bool, ClientError> {
        profile::phone_number_registered(self.directory.as_ref(), phone_number).await
    }

    pub async fn remove_duplicate_profiles(&self) -> Result<DedupReport, ClientError> {
        profile::remove_duplicate_profiles(self.directory.as_ref()).await
    }

    /// Repair the principal's own record, then listen to the directory for
    /// the configured refresh window and return the last delivery.
    ///
    /// A failed repair is logged and does not stop the refresh.
    pub async fn refresh_directory(&self) -> Result<DirectoryUpdate, ClientError> {
        let me = self.require_principal()?;
        if let Err(e) = profile::repair_profile(self.directory.as_ref(), &me).await {
            warn!(error = %e, "profile repair failed during refresh");
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut subscription = watch_directory(self.directory.as_ref(), me.uid, move |update| {
            let _ = tx.send(update);
        });

        let mut latest = None;
        let window = tokio::time::sleep(self.config.refresh_window);
        tokio::pin!(window);
        loop {
            tokio::select! {
                _ = &mut window => break,
                update = rx.recv() => match update {
                    Some(update) => latest = Some(update),
                    None => break,
                },
            }
        }
        subscription.cancel();

        let update = latest.unwrap_or(DirectoryUpdate {
            participants: Vec::new(),
            error: None,
        });
        info!(
            participants = update.participants.len(),
            failed = update.error.is_some(),
            "directory refreshed"
        );
        Ok(update)
    }

    /// Call `on_change` on every sign-in and sign-out.  The current state
    /// is not replayed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch_auth<F>(&self, mut on_change: F) -> Subscription
    where
        F: FnMut(Option<Principal>) + Send + 'static,
    {
        let mut rx = self.identity.watch_principal();
        let gate = Gate::new();
        let task_gate = Arc::clone(&gate);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                debug!(signed_in = current.is_some(), "auth state changed");
                if !task_gate.deliver(|| on_change(current)) {
                    break;
                }
            }
        });
        Subscription::new(gate, task)
    }
}
