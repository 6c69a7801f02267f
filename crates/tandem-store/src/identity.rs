//! In-process identity provider and push-token sources.

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::info;

use crate::backend::{IdentityProvider, PushTokenSource};
use crate::models::Principal;

/// Identity provider whose principal is set directly, for tests and for
/// embedding behind an external sign-in flow.
pub struct LocalIdentity {
    tx: watch::Sender<Option<Principal>>,
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl LocalIdentity {
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(principal: Principal) -> Self {
        let (tx, _rx) = watch::channel(Some(principal));
        Self { tx }
    }

    pub fn sign_in(&self, principal: Principal) {
        info!(uid = %principal.uid.short(), "principal signed in");
        self.tx.send_replace(Some(principal));
    }

    pub fn sign_out(&self) {
        info!("principal signed out");
        self.tx.send_replace(None);
    }

    /// Replace the principal in place, e.g. after a credential was linked.
    pub fn update(&self, f: impl FnOnce(&mut Principal)) {
        self.tx.send_if_modified(|current| match current {
            Some(p) => {
                f(p);
                true
            }
            None => false,
        });
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.tx.borrow().clone()
    }

    fn watch_principal(&self) -> watch::Receiver<Option<Principal>> {
        self.tx.subscribe()
    }
}

/// No push token is ever available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPushToken;

#[async_trait]
impl PushTokenSource for NoPushToken {
    async fn token(&self) -> Option<String> {
        None
    }
}

/// A fixed push token.
#[derive(Debug, Clone)]
pub struct StaticPushToken(pub String);

#[async_trait]
impl PushTokenSource for StaticPushToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
