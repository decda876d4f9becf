use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use shared::{
    config::Config,
    models::ConversationId,
    read_tracking::{FileStore, ReadTracker},
};

use super::session::load_session;
use crate::api::SidechatClient;

#[derive(Args, Debug)]
#[command(about = "Mark a conversation as read up to now")]
pub struct ReadArgs {
    /// Conversation identifier
    pub conversation: String,
}

pub fn run(args: ReadArgs, config: &Config) -> Result<()> {
    let session = load_session(&config.session_path())?;
    let client = SidechatClient::new(config.base_url()?, config.request_timeout())?;
    let tracker = ReadTracker::new(
        session.user.id,
        Arc::new(FileStore::new(&config.storage_path)),
        Arc::new(client),
    );

    let conversation = ConversationId::new(args.conversation);
    let watermark = tracker
        .mark_as_read(&conversation)
        .with_context(|| format!("failed to persist read state for {conversation}"))?;
    println!("Marked {conversation} as read at {watermark}");
    Ok(())
}
