//! Directory bookkeeping for the signed-in principal.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info, warn};

use tandem_shared::constants::{fields, DEFAULT_PROVIDER, FALLBACK_PROFILE_NAME};
use tandem_shared::types::display_name_or;
use tandem_shared::ParticipantId;
use tandem_store::{
    DirectoryRecord, DirectoryStore, FieldValue, Principal, PushTokenSource, SetMode, WriteFields,
};

use crate::error::ClientError;

/// Result of [`remove_duplicate_profiles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub duplicates_removed: usize,
    pub unique_users: usize,
}

fn profile_name(principal: &Principal) -> String {
    display_name_or(
        principal.display_name.as_deref(),
        principal.email.as_deref(),
        FALLBACK_PROFILE_NAME,
    )
}

fn or_empty(value: &Option<String>) -> FieldValue {
    value.clone().unwrap_or_default().into()
}

fn providers(principal: &Principal) -> FieldValue {
    if principal.providers.is_empty() {
        vec![DEFAULT_PROVIDER.to_string()].into()
    } else {
        principal.providers.clone().into()
    }
}

/// Merge `profile` into the principal's record, adding `createdAt` when
/// the record does not exist yet.  Returns whether it was created.
async fn upsert_own(
    directory: &dyn DirectoryStore,
    principal: &Principal,
    mut profile: WriteFields,
) -> Result<bool, ClientError> {
    let id = principal.uid.as_str();
    let created = directory.get_profile(id).await?.is_none();
    if created {
        profile.insert(fields::CREATED_AT.into(), FieldValue::ServerTimestamp);
    }
    directory.set_profile(id, profile, SetMode::Merge).await?;
    Ok(created)
}

/// Fill in a principal known only by uid from its own directory record.
/// Fields the record lacks stay empty.
pub async fn load_principal(
    directory: &dyn DirectoryStore,
    uid: ParticipantId,
) -> Result<Principal, ClientError> {
    let mut principal = Principal::new(uid);
    if let Some(doc) = directory.get_profile(principal.uid.as_str()).await? {
        let record = DirectoryRecord::from_document(&doc);
        principal.display_name = record.display_name;
        principal.email = record.email;
        principal.phone_number = record.phone_number;
        principal.photo_url = record.photo_url;
        principal.providers = record.providers;
    } else {
        debug!(uid = %principal.uid.short(), "no directory record for principal");
    }
    Ok(principal)
}

/// Write the principal's full directory record after sign-in.
///
/// Returns whether the record was created.
pub async fn sync_profile(
    directory: &dyn DirectoryStore,
    principal: &Principal,
    push: &dyn PushTokenSource,
) -> Result<bool, ClientError> {
    let token = push.token().await;
    if token.is_none() {
        debug!(uid = %principal.uid.short(), "no push token available");
    }

    let mut profile = WriteFields::new();
    profile.insert(fields::UID.into(), principal.uid.as_str().into());
    profile.insert(fields::DISPLAY_NAME.into(), profile_name(principal).into());
    profile.insert(fields::EMAIL.into(), or_empty(&principal.email));
    profile.insert(fields::PHONE_NUMBER.into(), or_empty(&principal.phone_number));
    profile.insert(fields::PHOTO_URL.into(), or_empty(&principal.photo_url));
    profile.insert(fields::FCM_TOKEN.into(), token.into());
    profile.insert(
        fields::PHONE_VERIFIED.into(),
        principal.phone_number.is_some().into(),
    );
    profile.insert(fields::LAST_LOGIN.into(), FieldValue::ServerTimestamp);
    profile.insert(fields::PROVIDERS.into(), providers(principal));

    let created = upsert_own(directory, principal, profile).await?;
    info!(uid = %principal.uid.short(), created, "profile synced");
    Ok(created)
}

/// Rewrite the identity fields of the principal's record, leaving phone
/// and push fields untouched.
pub async fn repair_profile(
    directory: &dyn DirectoryStore,
    principal: &Principal,
) -> Result<bool, ClientError> {
    let mut profile = WriteFields::new();
    profile.insert(fields::UID.into(), principal.uid.as_str().into());
    profile.insert(fields::DISPLAY_NAME.into(), profile_name(principal).into());
    profile.insert(fields::EMAIL.into(), or_empty(&principal.email));
    profile.insert(fields::PHOTO_URL.into(), or_empty(&principal.photo_url));
    profile.insert(fields::LAST_LOGIN.into(), FieldValue::ServerTimestamp);

    let created = upsert_own(directory, principal, profile).await?;
    debug!(uid = %principal.uid.short(), created, "profile repaired");
    Ok(created)
}

/// Record a phone credential the identity provider has just linked.
pub async fn record_phone_link(
    directory: &dyn DirectoryStore,
    principal: &Principal,
) -> Result<(), ClientError> {
    let phone = principal
        .phone_number
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or(ClientError::PhoneNotLinked)?;

    let mut profile = WriteFields::new();
    profile.insert(fields::UID.into(), principal.uid.as_str().into());
    profile.insert(fields::DISPLAY_NAME.into(), profile_name(principal).into());
    if let Some(email) = &principal.email {
        profile.insert(fields::EMAIL.into(), email.as_str().into());
    }
    profile.insert(fields::PHONE_NUMBER.into(), phone.into());
    profile.insert(fields::PHONE_VERIFIED.into(), true.into());
    profile.insert(fields::LAST_LOGIN.into(), FieldValue::ServerTimestamp);
    profile.insert(fields::PROVIDERS.into(), providers(principal));

    directory
        .set_profile(principal.uid.as_str(), profile, SetMode::Merge)
        .await?;
    info!(uid = %principal.uid.short(), "phone number linked");
    Ok(())
}

/// Whether any directory record carries exactly this phone number.
pub async fn phone_number_registered(
    directory: &dyn DirectoryStore,
    phone_number: &str,
) -> Result<bool, ClientError> {
    let matches = directory
        .find_profiles(fields::PHONE_NUMBER, &Value::String(phone_number.to_string()))
        .await?;
    Ok(!matches.is_empty())
}

/// Delete records without a uid and collapse records sharing a uid.
///
/// Of several records with one uid, the record whose document id equals
/// the uid survives; failing that, the first one in directory order.
pub async fn remove_duplicate_profiles(
    directory: &dyn DirectoryStore,
) -> Result<DedupReport, ClientError> {
    let documents = directory.list_profiles().await?;

    let mut kept: HashMap<String, String> = HashMap::new();
    let mut doomed = Vec::new();

    for doc in &documents {
        let Some(uid) = DirectoryRecord::from_document(doc).uid else {
            doomed.push(doc.id.clone());
            continue;
        };
        match kept.get_mut(&uid) {
            None => {
                kept.insert(uid, doc.id.clone());
            }
            Some(current) if doc.id == uid => {
                doomed.push(std::mem::replace(current, doc.id.clone()));
            }
            Some(_) => doomed.push(doc.id.clone()),
        }
    }

    for id in &doomed {
        if !directory.delete_profile(id).await? {
            warn!(doc_id = %id, "duplicate record already gone");
        }
    }

    let report = DedupReport {
        duplicates_removed: doomed.len(),
        unique_users: kept.len(),
    };
    info!(
        removed = report.duplicates_removed,
        unique = report.unique_users,
        "duplicate profile cleanup complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tandem_store::{MemoryBackend, NoPushToken, StaticPushToken};

    fn principal() -> Principal {
        let mut p = Principal::new(ParticipantId::parse("u1").unwrap());
        p.email = Some("ada@example.com".into());
        p
    }

    #[tokio::test]
    async fn test_sync_creates_then_updates() {
        let store = MemoryBackend::new();
        let push = StaticPushToken("tok-1".into());

        assert!(sync_profile(&store, &principal(), &push).await.unwrap());
        let doc = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("displayName"), Some("ada"));
        assert_eq!(doc.str_field("phoneNumber"), Some(""));
        assert_eq!(doc.str_field("fcmToken"), Some("tok-1"));
        assert_eq!(doc.bool_field("phoneVerified"), Some(false));
        assert_eq!(doc.get("providers"), Some(&json!(["google"])));
        let created_at = doc.timestamp_field("createdAt").unwrap();

        assert!(!sync_profile(&store, &principal(), &NoPushToken).await.unwrap());
        let doc = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(doc.timestamp_field("createdAt"), Some(created_at));
        assert!(doc.get("fcmToken").unwrap().is_null());
    }

    #[tokio::test]
    async fn test_load_principal_from_record() {
        let store = MemoryBackend::new();
        sync_profile(&store, &principal(), &NoPushToken).await.unwrap();

        let uid = ParticipantId::parse("u1").unwrap();
        let loaded = load_principal(&store, uid).await.unwrap();
        assert_eq!(loaded.display_name.as_deref(), Some("ada"));
        assert_eq!(loaded.email.as_deref(), Some("ada@example.com"));
        assert_eq!(loaded.phone_number, None);
        assert_eq!(loaded.providers, vec!["google".to_string()]);

        let stranger = load_principal(&store, ParticipantId::parse("u9").unwrap())
            .await
            .unwrap();
        assert_eq!(stranger.display_name, None);
    }

    #[tokio::test]
    async fn test_repair_keeps_phone() {
        let store = MemoryBackend::new();
        store.seed_profile("u1", json!({"uid": "u1", "phoneNumber": "+15550100"}));

        assert!(!repair_profile(&store, &principal()).await.unwrap());
        let doc = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(doc.str_field("phoneNumber"), Some("+15550100"));
        assert_eq!(doc.str_field("email"), Some("ada@example.com"));
        assert!(doc.get("createdAt").is_none());
    }

    #[tokio::test]
    async fn test_phone_link_requires_number() {
        let store = MemoryBackend::new();
        let err = record_phone_link(&store, &principal()).await.unwrap_err();
        assert!(matches!(err, ClientError::PhoneNotLinked));

        let mut linked = principal();
        linked.phone_number = Some("+15550100".into());
        linked.providers = vec!["google.com".into(), "phone".into()];
        record_phone_link(&store, &linked).await.unwrap();

        assert!(phone_number_registered(&store, "+15550100").await.unwrap());
        assert!(!phone_number_registered(&store, "+15550199").await.unwrap());
        let doc = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(doc.bool_field("phoneVerified"), Some(true));
    }

    #[tokio::test]
    async fn test_remove_duplicates_prefers_matching_doc_id() {
        let store = MemoryBackend::new();
        store.seed_profile("a-copy", json!({"uid": "a", "displayName": "Copy"}));
        store.seed_profile("a", json!({"uid": "a", "displayName": "Ada"}));
        store.seed_profile("b1", json!({"uid": "b"}));
        store.seed_profile("b2", json!({"uid": "b"}));
        store.seed_profile("orphan", json!({"displayName": "Nobody"}));

        let report = remove_duplicate_profiles(&store).await.unwrap();
        assert_eq!(
            report,
            DedupReport {
                duplicates_removed: 3,
                unique_users: 2
            }
        );

        let ids: Vec<String> = store
            .list_profiles()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, ["a", "b1"]);
    }
}
