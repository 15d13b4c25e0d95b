//! Persisted mailbox identities, so created mailboxes survive a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxIdentity {
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Keystore: Send + Sync {
    fn load(&self) -> Result<Vec<MailboxIdentity>>;

    /// Insert or replace the identity with the same address.
    fn save_mailbox_identity(&self, identity: &MailboxIdentity) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct KeystoreFile {
    #[serde(default)]
    mailboxes: Vec<MailboxIdentity>,
}

/// A TOML file of identities. Writers are serialised and the file is
/// replaced by rename, so a reader sees either the old or the new contents.
pub struct FileKeystore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeystore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `$XDG_DATA_HOME/inboxwatch/mailboxes.toml`, or under `~/.local/share`.
    pub fn default_path() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            PathBuf::from(xdg).join("inboxwatch").join("mailboxes.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("inboxwatch")
                .join("mailboxes.toml")
        } else {
            PathBuf::from("mailboxes.toml")
        }
    }

    fn read_file(&self) -> Result<KeystoreFile> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(KeystoreFile::default())
            }
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&contents)
            .map_err(|e| Error::Keystore(format!("{}: {}", self.path.display(), e)))
    }

    fn write_file(&self, file: &KeystoreFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents =
            toml::to_string_pretty(file).map_err(|e| Error::Keystore(e.to_string()))?;
        let tmp = temp_path(&self.path);
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

impl Keystore for FileKeystore {
    fn load(&self) -> Result<Vec<MailboxIdentity>> {
        Ok(self.read_file()?.mailboxes)
    }

    fn save_mailbox_identity(&self, identity: &MailboxIdentity) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::Keystore("keystore lock poisoned".into()))?;
        let mut file = self.read_file()?;
        match file
            .mailboxes
            .iter_mut()
            .find(|m| m.address == identity.address)
        {
            Some(existing) => *existing = identity.clone(),
            None => file.mailboxes.push(identity.clone()),
        }
        self.write_file(&file)?;
        debug!("saved identity {} to {}", identity.address, self.path.display());
        Ok(())
    }
}
