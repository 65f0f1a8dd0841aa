mod tui;

use anyhow::{bail, Context, Result};
use microblog_feed::api::rest::RestTransport;
use microblog_feed::api::store::{FileKeyStore, KeyStore};
use microblog_feed::api::{ApiKey, Transport};
use microblog_feed::config::Config;
use microblog_feed::engine::model::{Attachment, UserId};
use microblog_feed::engine::{FeedSettings, FeedStateEngine, ProfileEngine};
use microblog_feed::FeedError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tui::state::{Notice, NoticeLevel};
use tui::UiCommand;

#[tokio::main]
async fn main() -> Result<()> {
    let log_file = std::fs::File::create("microblog-feed.log")?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("microblog_feed=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .init();

    // Saved settings from .env (real env vars take precedence)
    Config::load_env_file();
    let config = Config::load(Path::new("config.toml"))?;

    let store: Arc<dyn KeyStore> = Arc::new(FileKeyStore::new(config.storage.key_file.clone()));
    if let Some(key) = Config::api_key_override() {
        store.save(ApiKey::new(&key).as_ref())?;
    }
    let transport: Arc<dyn Transport> = Arc::new(RestTransport::new(&config.api)?);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return run_cli(&args, transport, store.as_ref()).await;
    }

    let engine = Arc::new(FeedStateEngine::new(
        transport,
        store,
        FeedSettings {
            sort: config.feed.default_sort,
            limit: config.feed.default_limit,
        },
    ));

    let (notice_tx, notice_rx) = watch::channel::<Option<Notice>>(None);
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<UiCommand>(16);

    if engine.is_signed_in() {
        let engine = engine.clone();
        let notice_tx = notice_tx.clone();
        tokio::spawn(async move {
            report(&notice_tx, engine.refresh_all().await, None);
        });
    } else {
        notice_tx.send_replace(Some(Notice::new(
            NoticeLevel::Info,
            "No API key stored. Press 'a' to sign in.",
        )));
    }

    // Commands run concurrently; the engine serializes what needs it
    let feed_config = config.feed.clone();
    let cmd_engine = engine.clone();
    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            if cmd == UiCommand::Quit {
                break;
            }
            let engine = cmd_engine.clone();
            let notice_tx = notice_tx.clone();
            let next_limit = feed_config.next_limit(engine.query().limit);
            tokio::spawn(async move {
                handle_command(&engine, &notice_tx, cmd, next_limit).await;
            });
        }
        tracing::debug!("command loop finished");
    });

    if let Err(e) = tui::run_tui(engine.subscribe(), notice_rx, cmd_tx, config.feed.likers_preview).await {
        tracing::error!("terminal UI failed: {:#}", e);
        return Err(e);
    }

    tracing::debug!("shutting down");
    Ok(())
}

async fn handle_command(
    engine: &FeedStateEngine,
    notice_tx: &watch::Sender<Option<Notice>>,
    cmd: UiCommand,
    next_limit: u32,
) {
    match cmd {
        UiCommand::Quit => {}
        UiCommand::Refresh => report(notice_tx, engine.refresh_all().await, Some("Feed refreshed")),
        UiCommand::NextPage => report(notice_tx, engine.next_page().await.map(|_| ()), None),
        UiCommand::PreviousPage => report(notice_tx, engine.previous_page().await.map(|_| ()), None),
        UiCommand::SetSort(sort) => report(notice_tx, engine.set_query(Some(sort), None, None).await.map(|_| ()), None),
        UiCommand::CycleLimit => report(
            notice_tx,
            engine.set_query(None, Some(next_limit), None).await.map(|_| ()),
            None,
        ),
        UiCommand::ToggleLike { post_id, liked } => {
            report(notice_tx, engine.toggle_like(post_id, liked).await, None)
        }
        UiCommand::Delete { post_id } => report(
            notice_tx,
            engine.delete_post(post_id, true).await,
            Some("Update deleted"),
        ),
        UiCommand::Compose { text, attachment } => {
            let result = match read_attachment(attachment).await {
                Ok(attachment) => engine.compose_post(&text, attachment).await.map(|_| ()),
                Err(e) => Err(e),
            };
            report(notice_tx, result, Some("Update published"));
        }
        UiCommand::SetApiKey(raw) => {
            let signing_out = raw.trim().is_empty();
            let message = if signing_out { "Signed out" } else { "API key saved" };
            report(notice_tx, engine.set_api_key(&raw).await, Some(message));
        }
    }
}

async fn read_attachment(path: Option<PathBuf>) -> microblog_feed::Result<Option<Attachment>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| FeedError::validation(format!("Cannot read {}: {}", path.display(), e)))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Some(Attachment { file_name, bytes }))
}

/// Turn an engine result into a notice. Superseded fetches and refused
/// double-likes are silent.
fn report(notice_tx: &watch::Sender<Option<Notice>>, result: microblog_feed::Result<()>, success: Option<&str>) {
    match result {
        Ok(()) => {
            if let Some(message) = success {
                notice_tx.send_replace(Some(Notice::new(NoticeLevel::Success, message)));
            }
        }
        Err(e) if e.is_recoverable() => tracing::debug!(error = %e, "ignored"),
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            notice_tx.send_replace(Some(Notice::new(NoticeLevel::Error, e.to_string())));
        }
    }
}

/// Non-interactive profile commands: `profile <id>`, `follow <id>`,
/// `unfollow <id>`.
async fn run_cli(args: &[String], transport: Arc<dyn Transport>, store: &dyn KeyStore) -> Result<()> {
    let (command, user_id) = match args {
        [command, id] => {
            let user_id: UserId = id
                .parse()
                .with_context(|| format!("invalid user id '{}'", id))?;
            (command.as_str(), user_id)
        }
        _ => bail!("usage: microblog-feed [profile|follow|unfollow <user-id>]"),
    };

    let key = store.load()?;
    let profiles = ProfileEngine::new(transport, key, Some(user_id));

    match command {
        "profile" => {}
        "follow" => profiles.toggle_follow(false).await?,
        "unfollow" => profiles.toggle_follow(true).await?,
        other => bail!("unknown command '{}'", other),
    }

    let snapshot = profiles.load_all().await?;
    let Some(profile) = &snapshot.profile else {
        bail!("profile {} did not load", user_id);
    };
    println!();
    println!("  {} (#{})", profile.name, profile.id);
    println!("  ========================");
    println!("  Followers: {}", snapshot.followers.len());
    for user in &snapshot.followers {
        println!("    {} (#{})", user.name, user.id);
    }
    println!("  Following: {}", snapshot.following.len());
    for user in &snapshot.following {
        println!("    {} (#{})", user.name, user.id);
    }
    if snapshot.is_self() {
        println!("  This is you.");
    } else if snapshot.is_following() {
        println!("  You follow this user.");
    } else {
        println!("  You do not follow this user.");
    }
    println!();
    Ok(())
}
