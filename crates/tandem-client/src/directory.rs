//! Live directory of people the principal can chat with.

use std::collections::HashSet;

use tracing::{debug, warn};

use tandem_shared::types::display_name_or;
use tandem_shared::ParticipantId;
use tandem_store::{DirectoryRecord, DirectoryStore, Document, Participant, SnapshotResult};

use crate::error::ClientError;
use crate::subscription::Subscription;

/// One delivery from [`watch_directory`].  On a subscription failure
/// `participants` is empty and `error` says why.
#[derive(Debug)]
pub struct DirectoryUpdate {
    pub participants: Vec<Participant>,
    pub error: Option<ClientError>,
}

/// Admit, exclude and dedupe directory documents, in snapshot order.
///
/// A record is admitted when it has a uid, a display name, and an email or
/// a phone number.  `exclude` (the principal) is dropped, and of several
/// records with the same uid only the first is kept.
pub fn filter_directory(documents: &[Document], exclude: &ParticipantId) -> Vec<Participant> {
    let mut seen = HashSet::new();
    let mut participants = Vec::new();

    for doc in documents {
        let participant = match Participant::try_from(DirectoryRecord::from_document(doc)) {
            Ok(p) => p,
            Err(reason) => {
                debug!(doc_id = %doc.id, %reason, "directory record not admitted");
                continue;
            }
        };
        if participant.id == *exclude {
            continue;
        }
        if !seen.insert(participant.id.clone()) {
            debug!(uid = %participant.id.short(), doc_id = %doc.id, "duplicate directory record");
            continue;
        }
        participants.push(participant);
    }

    participants
}

/// Open a live query over the directory.  `on_update` receives the full
/// filtered set after every change.
///
/// Must be called from within a tokio runtime.
pub fn watch_directory<F>(
    store: &dyn DirectoryStore,
    exclude: ParticipantId,
    mut on_update: F,
) -> Subscription
where
    F: FnMut(DirectoryUpdate) + Send + 'static,
{
    let handler = move |item: SnapshotResult| match item {
        Ok(snapshot) => {
            let participants = filter_directory(&snapshot.documents, &exclude);
            debug!(
                received = snapshot.len(),
                admitted = participants.len(),
                "directory snapshot"
            );
            on_update(DirectoryUpdate {
                participants,
                error: None,
            });
        }
        Err(e) => {
            warn!(error = %e, "directory subscription failed");
            on_update(DirectoryUpdate {
                participants: Vec::new(),
                error: Some(ClientError::Subscription(e)),
            });
        }
    };

    match store.subscribe_profiles() {
        Ok(stream) => Subscription::listen(stream, handler),
        Err(e) => Subscription::failed(e, handler),
    }
}

/// Look up one participant by id, keeping the stored display name even
/// when the record would not pass admission.  `None` if no record exists.
pub async fn lookup_participant(
    store: &dyn DirectoryStore,
    id: &ParticipantId,
    fallback_name: &str,
) -> Result<Option<Participant>, ClientError> {
    let Some(doc) = store.get_profile(id.as_str()).await? else {
        return Ok(None);
    };
    let record = DirectoryRecord::from_document(&doc);
    let display_name = display_name_or(
        record.display_name.as_deref(),
        record.email.as_deref(),
        fallback_name,
    );
    Ok(Some(Participant {
        id: id.clone(),
        display_name,
        email: record.email,
        phone_number: record.phone_number,
        photo_url: record.photo_url,
    }))
}

/// Case-insensitive substring match on display name or email.  A blank
/// query matches everyone.
pub fn search_directory<'a>(participants: &'a [Participant], query: &str) -> Vec<&'a Participant> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return participants.iter().collect();
    }
    participants
        .iter()
        .filter(|p| {
            p.display_name.to_lowercase().contains(&needle)
                || p
                    .email
                    .as_deref()
                    .is_some_and(|email| email.to_lowercase().contains(&needle))
        })
        .collect()
}
