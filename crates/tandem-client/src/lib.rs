//! # tandem-client
//!
//! The client side of one-to-one chat over an external store:
//!
//! - **directory**: live, filtered list of people to talk to
//! - **thread**: live, ordered message log of one conversation
//! - **send** / **composer**: the two-step send and the draft around it
//! - **profile**: the principal's own directory record
//! - **conversations**: recent conversations from thread summaries
//! - **session**: all of the above bound to the collaborators and config
//!
//! Live views return a [`Subscription`]; cancelling or dropping it stops
//! callbacks.

pub mod composer;
pub mod config;
pub mod conversations;
pub mod directory;
pub mod error;
pub mod profile;
pub mod send;
pub mod session;
pub mod subscription;
pub mod thread;

pub use composer::Composer;
pub use config::ClientConfig;
pub use conversations::ConversationPreview;
pub use directory::{search_directory, DirectoryUpdate};
pub use error::{ClientError, SendStage};
pub use send::SendReceipt;
pub use session::{ChatSession, Conversation};
pub use subscription::Subscription;
pub use thread::ThreadUpdate;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tandem_client=debug,tandem_store=info,warn";

/// Install a `fmt` subscriber that respects `RUST_LOG`.  Returns `false` if
/// a global subscriber was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .try_init()
        .is_ok()
}
