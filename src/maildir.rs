//! Maildir-backed event source.
//!
//! Each mailbox is a Maildir directory `<root>/<address>/{new,cur,tmp}`.
//! Arrivals are detected by rescanning `new/` and `cur/` on an interval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::message::Message;
use crate::mime;
use crate::source::{Event, EventSource, EventStream, Mailbox};

const SUBDIRS: [&str; 3] = ["new", "cur", "tmp"];

type Index = Arc<Mutex<HashMap<String, PathBuf>>>;

pub struct MaildirSource {
    root: PathBuf,
    domain: String,
    poll_interval: Duration,
    /// message id -> file, filled in by every scan.
    index: Index,
}

impl MaildirSource {
    pub fn new(root: impl Into<PathBuf>, domain: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            domain: domain.into(),
            poll_interval,
            index: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn mailbox_dir(&self, mailbox: &Mailbox) -> PathBuf {
        self.root.join(&mailbox.address)
    }
}

/// List message files in `new/` and `cur/` of a Maildir.
fn message_files(dir: &Path, mailbox: &Mailbox) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::MailboxNotFound(mailbox.address.clone()));
    }
    let mut files = Vec::new();
    for sub in ["new", "cur"] {
        let entries = match std::fs::read_dir(dir.join(sub)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            if path.is_file() && !hidden {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Maildir unique name, without the `:2,FLAGS` info suffix.
fn unique_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().split(':').next().unwrap_or_default().to_string())
        .unwrap_or_default()
}

fn load_message(path: &Path, index: &Index) -> Result<Message> {
    let raw = std::fs::read(path)?;
    let modified: DateTime<Utc> = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::from)
        .unwrap_or_else(|_| Utc::now());
    let message = mime::parse_message(&raw, &unique_name(path), modified)?;
    if let Ok(mut index) = index.lock() {
        index.insert(message.id.clone(), path.to_path_buf());
    }
    Ok(message)
}

struct PollState {
    dirs: Vec<(Mailbox, PathBuf)>,
    seen: HashSet<PathBuf>,
    pending: VecDeque<Result<Event>>,
    ticker: Interval,
    token: CancellationToken,
    index: Index,
}

/// Identity of a message file within its Maildir. A move from `new/` to
/// `cur/` or a flag change keeps the same key.
fn seen_key(dir: &Path, path: &Path) -> PathBuf {
    dir.join(unique_name(path))
}

/// Rescan every mailbox, returning events for files not in `seen`.
///
/// Keys of files that are gone are dropped from `seen`, and index entries
/// pointing at vanished files are dropped from `index`.
fn rescan(
    dirs: &[(Mailbox, PathBuf)],
    seen: &mut HashSet<PathBuf>,
    index: &Index,
) -> Vec<Result<Event>> {
    let mut out = Vec::new();
    for (mailbox, dir) in dirs {
        let files = match message_files(dir, mailbox) {
            Ok(files) => files,
            Err(e) => {
                out.push(Err(e));
                continue;
            }
        };
        let present: HashSet<PathBuf> = files.iter().map(|p| seen_key(dir, p)).collect();
        seen.retain(|key| !key.starts_with(dir) || present.contains(key));
        if let Ok(mut index) = index.lock() {
            index.retain(|_, path| !path.starts_with(dir) || path.is_file());
        }

        let mut fresh = Vec::new();
        for path in files {
            if !seen.insert(seen_key(dir, &path)) {
                continue;
            }
            match load_message(&path, index) {
                Ok(message) => fresh.push(message),
                Err(e) => warn!("skipping {}: {}", path.display(), e),
            }
        }
        fresh.sort_by_key(|m| m.received_at);
        out.extend(fresh.into_iter().map(|message| {
            Ok(Event {
                message,
                mailbox: mailbox.clone(),
            })
        }));
    }
    out
}

async fn next_event(mut state: PollState) -> Option<(Result<Event>, PollState)> {
    loop {
        if let Some(event) = state.pending.pop_front() {
            return Some((event, state));
        }
        tokio::select! {
            _ = state.token.cancelled() => return None,
            _ = state.ticker.tick() => {}
        }
        let dirs = state.dirs.clone();
        let mut seen = std::mem::take(&mut state.seen);
        let index = state.index.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let events = rescan(&dirs, &mut seen, &index);
            (seen, events)
        })
        .await;
        match joined {
            Ok((seen, events)) => {
                state.seen = seen;
                state.pending.extend(events);
            }
            Err(e) => state.pending.push_back(Err(e.into())),
        }
    }
}

#[async_trait]
impl EventSource for MaildirSource {
    async fn subscribe(
        &self,
        token: CancellationToken,
        mailboxes: &[Mailbox],
    ) -> Result<EventStream> {
        let dirs: Vec<(Mailbox, PathBuf)> = mailboxes
            .iter()
            .map(|m| (m.clone(), self.mailbox_dir(m)))
            .collect();

        // Everything present now belongs to the backfill, not the stream.
        let prime_dirs = dirs.clone();
        let seen = tokio::task::spawn_blocking(move || -> Result<HashSet<PathBuf>> {
            let mut seen = HashSet::new();
            for (mailbox, dir) in &prime_dirs {
                let files = message_files(dir, mailbox)?;
                seen.extend(files.iter().map(|p| seen_key(dir, p)));
            }
            Ok(seen)
        })
        .await??;

        info!(
            "subscribed to {} mailbox(es), {} existing file(s)",
            dirs.len(),
            seen.len()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let state = PollState {
            dirs,
            seen,
            pending: VecDeque::new(),
            ticker,
            token,
            index: self.index.clone(),
        };
        Ok(futures::stream::unfold(state, next_event).boxed())
    }

    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<Message>> {
        let dir = self.mailbox_dir(mailbox);
        let mailbox = mailbox.clone();
        let index = self.index.clone();
        tokio::task::spawn_blocking(move || {
            let mut messages = Vec::new();
            for path in message_files(&dir, &mailbox)? {
                match load_message(&path, &index) {
                    Ok(message) => messages.push(message),
                    Err(e) => warn!("skipping {}: {}", path.display(), e),
                }
            }
            messages.sort_by_key(|m| m.received_at);
            debug!("listed {} message(s) in {}", messages.len(), mailbox);
            Ok(messages)
        })
        .await?
    }

    async fn delete_message(&self, mailbox: &Mailbox, id: &str) -> Result<()> {
        let dir = self.mailbox_dir(mailbox);
        let mailbox = mailbox.clone();
        let id = id.to_string();
        let index = self.index.clone();
        tokio::task::spawn_blocking(move || {
            let known = index
                .lock()
                .ok()
                .and_then(|index| index.get(&id).cloned())
                .filter(|path| path.starts_with(&dir) && path.is_file());
            let path = match known {
                Some(path) => path,
                None => message_files(&dir, &mailbox)?
                    .into_iter()
                    .find(|path| {
                        load_message(path, &index)
                            .map(|m| m.id == id)
                            .unwrap_or(false)
                    })
                    .ok_or_else(|| Error::MessageNotFound(id.clone()))?,
            };
            std::fs::remove_file(&path)?;
            if let Ok(mut index) = index.lock() {
                index.remove(&id);
            }
            info!("deleted {} from {}", id, mailbox);
            Ok(())
        })
        .await?
    }

    async fn create_mailbox(&self) -> Result<Mailbox> {
        let local: String = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        let mailbox = Mailbox::new(format!("{}@{}", local, self.domain));
        let dir = self.mailbox_dir(&mailbox);
        tokio::task::spawn_blocking(move || -> Result<()> {
            for sub in SUBDIRS {
                std::fs::create_dir_all(dir.join(sub))?;
            }
            Ok(())
        })
        .await??;
        info!("created mailbox {}", mailbox);
        Ok(mailbox)
    }
}
