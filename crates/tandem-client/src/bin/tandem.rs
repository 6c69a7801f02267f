//! Command-line driver over a local SQLite store.
//!
//! ```text
//! tandem join    <uid> <display name> <email>
//! tandem people  <uid>
//! tandem send    <from uid> <to uid> <text...>
//! tandem history <uid> <other uid>
//! tandem chats   <uid>
//! ```

use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use tandem_client::profile;
use tandem_client::{init_tracing, ChatSession, ClientConfig};
use tandem_shared::constants::APP_NAME;
use tandem_shared::ParticipantId;
use tandem_store::{LocalIdentity, MessageLogStore, Principal};

fn parse_uid(uid: &str) -> anyhow::Result<ParticipantId> {
    ParticipantId::parse(uid).with_context(|| format!("bad uid {uid:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting {} v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    let db = Arc::new(config.open_database().context("opening database")?);
    info!(path = ?db.path(), "Loaded configuration");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!("usage: tandem <join|people|send|history|chats> ...");
    };
    let Some(uid) = rest.first() else {
        bail!("{command}: missing uid");
    };

    // Joining supplies the profile; every other command signs in as the
    // stored record so messages carry the real name.
    let me = if command == "join" {
        let mut me = Principal::new(parse_uid(uid)?);
        me.display_name = rest.get(1).cloned();
        me.email = rest.get(2).cloned();
        me
    } else {
        profile::load_principal(db.as_ref(), parse_uid(uid)?).await?
    };
    let identity = Arc::new(LocalIdentity::signed_in(me));
    let session = ChatSession::with_backend(Arc::clone(&db), identity, config);

    match command.as_str() {
        "join" => {
            let created = session.sync_profile().await?;
            println!("{}", if created { "created" } else { "updated" });
        }
        "people" => {
            let update = session.refresh_directory().await?;
            if let Some(e) = update.error {
                bail!(e.user_message());
            }
            for p in update.participants {
                println!("{}\t{}", p.id, p.display_name);
            }
        }
        "send" => {
            let (Some(to), text) = (rest.get(1), rest.get(2..).unwrap_or_default().join(" ")) else {
                bail!("send: missing recipient");
            };
            let conversation = session.open_conversation_by_id(to).await?;
            let receipt = session.send(&conversation, &text).await?;
            println!("{receipt:?}");
        }
        "history" => {
            let Some(other) = rest.get(1) else {
                bail!("history: missing other uid");
            };
            let conversation = session.open_conversation_by_id(other).await?;
            let documents = db.list_messages(&conversation.key).await?;
            for m in tandem_client::thread::order_messages(&documents, chrono::Utc::now()) {
                println!("{}\t{}\t{}", m.time.instant().to_rfc3339(), m.sender_name, m.text);
            }
        }
        "chats" => {
            for c in session.list_conversations().await? {
                let last = c.last_message.map(|m| m.text).unwrap_or_default();
                println!("{}\t{}\t{}", c.key, c.counterpart_name, last);
            }
        }
        other => bail!("unknown command {other:?}"),
    }

    Ok(())
}
