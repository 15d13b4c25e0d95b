use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory holding one Maildir per mailbox address.
    pub maildir_root: String,
    /// Domain used for newly created mailboxes.
    pub domain: String,
    pub poll_interval_ms: u64,
    /// Where attachments are saved.
    pub download_dir: String,
    /// Identity store; defaults to the XDG data directory.
    pub keystore: Option<String>,
    pub mailboxes: Vec<MailboxConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            maildir_root: "~/Maildir/inboxwatch".to_string(),
            domain: "inboxwatch.local".to_string(),
            poll_interval_ms: 1000,
            download_dir: "~/Downloads".to_string(),
            keystore: None,
            mailboxes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct MailboxConfig {
    pub address: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load from `explicit` if given, otherwise try, in order:
    ///
    /// 1. `$INBOXWATCH_CONFIG`
    /// 2. `$XDG_CONFIG_HOME/inboxwatch/config.toml`
    /// 3. `~/.config/inboxwatch/config.toml`
    ///
    /// If none of these paths exist, return a default `Config`.
    pub fn load(explicit: Option<&std::path::Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::locate(),
        };
        if let Some(path) = path {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Return the first config path that actually exists on disk, or `None`.
    fn locate() -> Option<PathBuf> {
        let candidates = Self::candidate_paths();
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Ordered list of paths we check for a config file.
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(p) = std::env::var("INBOXWATCH_CONFIG") {
            paths.push(PathBuf::from(p));
        }

        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("inboxwatch").join("config.toml"));
        }

        if let Ok(home) = std::env::var("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("inboxwatch")
                    .join("config.toml"),
            );
        }

        paths
    }

    pub fn maildir_root(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.maildir_root))
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.download_dir))
    }

    pub fn keystore_path(&self) -> Option<PathBuf> {
        self.keystore.as_deref().map(|p| PathBuf::from(expand_tilde(p)))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

/// Expand `~/` prefix in a path string.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        format!("{}/{}", home, rest)
    } else {
        path.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.domain, "inboxwatch.local");
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
        assert!(cfg.mailboxes.is_empty());
        assert!(cfg.keystore_path().is_none());
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
            maildir_root = "/srv/mail"
            domain = "tmp.example"
            poll_interval_ms = 250
            download_dir = "/tmp/dl"
            keystore = "/tmp/ks.toml"

            [[mailboxes]]
            address = "alice@tmp.example"

            [[mailboxes]]
            address = "bob@tmp.example"
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.maildir_root(), PathBuf::from("/srv/mail"));
        assert_eq!(cfg.download_dir(), PathBuf::from("/tmp/dl"));
        assert_eq!(cfg.keystore_path(), Some(PathBuf::from("/tmp/ks.toml")));
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
        assert_eq!(
            cfg.mailboxes,
            vec![
                MailboxConfig {
                    address: "alice@tmp.example".into()
                },
                MailboxConfig {
                    address: "bob@tmp.example".into()
                },
            ]
        );
    }

    #[test]
    fn poll_interval_has_a_floor() {
        let cfg: Config = toml::from_str("poll_interval_ms = 1").unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn load_explicit_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "domain = \"x.test\"\n").unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.domain, "x.test");
        assert_eq!(cfg.maildir_root, Config::default().maildir_root);

        std::fs::write(&path, "domain = [").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn tilde_expansion() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(expand_tilde("~/Mail"), format!("{}/Mail", home));
        assert_eq!(expand_tilde("/abs"), "/abs");
    }
}
