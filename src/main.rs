mod config;
mod effects;
mod error;
mod keymap;
mod keystore;
mod maildir;
mod message;
mod mime;
mod security;
mod source;
mod tui;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::effects::SystemEffects;
use crate::keystore::{FileKeystore, Keystore};
use crate::maildir::MaildirSource;
use crate::source::Mailbox;
use crate::tui::command::Collaborators;

/// Watch one or more mailboxes and browse new mail as it arrives.
#[derive(Parser, Debug)]
#[command(name = "inboxwatch", version)]
struct Args {
    /// Mailbox addresses to watch. Defaults to the configured and saved ones.
    mailboxes: Vec<String>,

    /// Config file to use instead of the default search path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding one Maildir per mailbox address.
    #[arg(long)]
    maildir: Option<PathBuf>,

    /// Where saved attachments go.
    #[arg(long)]
    download_dir: Option<PathBuf>,
}

/// Log to the file named by `INBOXWATCH_LOG`; the terminal belongs to the UI.
fn init_tracing() -> Result<()> {
    let Ok(path) = std::env::var("INBOXWATCH_LOG") else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path))?;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "inboxwatch=info".into()),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init();
    Ok(())
}

/// Mailboxes named on the command line win; otherwise the config file's
/// plus every identity in the keystore, without duplicates.
fn startup_mailboxes(cli: &[String], config: &Config, keystore: &dyn Keystore) -> Vec<Mailbox> {
    if !cli.is_empty() {
        return dedup(cli.iter().cloned());
    }
    let saved = match keystore.load() {
        Ok(identities) => identities,
        Err(e) => {
            warn!("could not read saved mailboxes: {}", e);
            Vec::new()
        }
    };
    dedup(
        config
            .mailboxes
            .iter()
            .map(|m| m.address.clone())
            .chain(saved.into_iter().map(|i| i.address)),
    )
}

fn dedup(addresses: impl Iterator<Item = String>) -> Vec<Mailbox> {
    let mut out: Vec<Mailbox> = Vec::new();
    for address in addresses {
        let address = address.trim().to_string();
        if !address.is_empty() && !out.iter().any(|m| m.address == address) {
            out.push(Mailbox::new(address));
        }
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let config = Config::load(args.config.as_deref())?;
    let root = args.maildir.unwrap_or_else(|| config.maildir_root());
    let download_dir = args.download_dir.unwrap_or_else(|| config.download_dir());
    let keystore = Arc::new(FileKeystore::new(
        config
            .keystore_path()
            .unwrap_or_else(FileKeystore::default_path),
    ));

    let mailboxes = startup_mailboxes(&args.mailboxes, &config, keystore.as_ref());
    info!(
        "starting with {} mailbox(es) under {}",
        mailboxes.len(),
        root.display()
    );

    let collaborators = Collaborators {
        source: Arc::new(MaildirSource::new(
            root,
            config.domain.clone(),
            config.poll_interval(),
        )),
        keystore,
        effects: Arc::new(SystemEffects),
    };
    let app = tui::App::new(mailboxes, download_dir);
    tui::run(app, collaborators).await
}
