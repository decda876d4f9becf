use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Args;
use futures_util::future::join_all;
use shared::{
    config::Config,
    models::{ConversationId, ConversationKind},
    read_tracking::{FileStore, ReadTracker, UnreadSnapshot},
};
use tracing::{info, warn};

use super::session::load_session;
use crate::api::SidechatClient;

#[derive(Args, Debug)]
#[command(about = "Show unread message counts for your groups and threads")]
pub struct UnreadArgs {
    /// Keep polling and print counts whenever they change, until Ctrl+C
    #[arg(long, short)]
    pub watch: bool,

    /// Seconds between two polls (default: the configured poll interval)
    #[arg(long, short, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,
}

pub async fn run(args: UnreadArgs, config: &Config) -> Result<()> {
    let session = load_session(&config.session_path())?;
    let client = Arc::new(SidechatClient::new(config.base_url()?, config.request_timeout())?);
    let labels = discover_conversations(&client, &session.user.id).await?;

    let tracker = Arc::new(ReadTracker::new(
        session.user.id.clone(),
        Arc::new(FileStore::new(&config.storage_path)),
        client,
    ));
    tracker.set_conversations(labels.keys().cloned());

    if labels.is_empty() {
        println!("You are not in any conversation yet.");
        return Ok(());
    }

    if !args.watch {
        let snapshot = tracker.recompute().await;
        print_counts(&labels, &snapshot);
        return Ok(());
    }

    let interval = args
        .interval
        .map_or_else(|| config.poll_interval(), Duration::from_secs);
    let mut updates = tracker.subscribe();
    let handle = tracker.spawn_polling(interval);
    info!(interval_secs = interval.as_secs(), "watching unread counts");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl+C")?;
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                print_counts(&labels, &snapshot);
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

/// Lists the user's groups and their threads, registering each id with the
/// client so the tracker can fetch it. Returns display labels by id.
async fn discover_conversations(
    client: &SidechatClient,
    user_id: &str,
) -> Result<BTreeMap<ConversationId, String>> {
    let groups = client.list_groups(user_id).await?;
    let mut labels = BTreeMap::new();
    for group in &groups {
        client.register(group.id.clone(), ConversationKind::Group);
        labels.insert(group.id.clone(), group.name.clone());
    }

    let thread_lists = join_all(groups.iter().map(|group| client.list_threads(&group.id))).await;
    for (group, threads) in groups.iter().zip(thread_lists) {
        match threads {
            Ok(threads) => {
                for thread in threads.into_iter().filter(|thread| thread.is_active) {
                    client.register(thread.id.clone(), ConversationKind::Thread);
                    labels.insert(thread.id, format!("{} / {}", group.name, thread.name));
                }
            }
            Err(err) => warn!(group = %group.id, error = %err, "failed to list threads"),
        }
    }
    Ok(labels)
}

fn print_counts(labels: &BTreeMap<ConversationId, String>, snapshot: &UnreadSnapshot) {
    let mut total = 0;
    for (id, label) in labels {
        let count = snapshot.get(id).copied().unwrap_or(0);
        total += count;
        println!("{count:>4}  {label} ({id})");
    }
    println!("{total:>4}  total unread");
}
