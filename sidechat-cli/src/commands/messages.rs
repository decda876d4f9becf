use anyhow::{Context, Result};
use clap::Args;
use shared::{
    config::Config,
    models::{ConversationId, ConversationKind, Message, Timestamp},
    read_tracking::{FileStore, WatermarkStore},
};
use std::sync::Arc;

use super::session::load_session;
use crate::api::SidechatClient;

#[derive(Args, Debug)]
#[command(about = "List the messages of a group, direct message or thread")]
pub struct MessagesArgs {
    /// Conversation identifier
    pub conversation: String,

    /// Treat the identifier as a side thread instead of a group
    #[arg(long)]
    pub thread: bool,
}

pub async fn run(args: MessagesArgs, config: &Config) -> Result<()> {
    let client = SidechatClient::new(config.base_url()?, config.request_timeout())?;
    let conversation = ConversationId::new(args.conversation);
    let kind = if args.thread {
        ConversationKind::Thread
    } else {
        ConversationKind::Group
    };

    let messages = client
        .list_messages_of(&conversation, kind)
        .await
        .with_context(|| format!("failed to list messages for {conversation}"))?;

    // Highlighting is best effort: without a session everything prints plain.
    let reader = load_session(&config.session_path()).ok().map(|session| {
        let store = WatermarkStore::new(Arc::new(FileStore::new(&config.storage_path)), &session.user.id);
        let watermark = store
            .load()
            .ok()
            .and_then(|map| map.get(&conversation).copied())
            .unwrap_or(Timestamp::EPOCH);
        (session.user.id, watermark)
    });

    if messages.is_empty() {
        println!("No messages in {conversation}.");
        return Ok(());
    }
    for message in &messages {
        let unread = reader.as_ref().is_some_and(|(user_id, watermark)| {
            !message.is_authored_by(user_id) && message.created_at > *watermark
        });
        println!("{}", render_message(message, unread));
    }
    Ok(())
}

fn render_message(message: &Message, unread: bool) -> String {
    let marker = if unread { "*" } else { " " };
    let author = if message.is_ai { "AI" } else { message.user_id.as_str() };
    let mut line = format!("{marker} [{}] {author}: {}", message.created_at, message.content);
    if message.is_pinned {
        line.push_str(" (pinned)");
    }
    if message.has_attachment() {
        let name = message.file_name.as_deref().unwrap_or("file");
        line.push_str(&format!(" [attachment: {name}]"));
    }
    line
}
