//! Side effects that leave the terminal: browser, HTML preview, files on disk.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::message::Message;

#[cfg_attr(test, mockall::automock)]
pub trait Effects: Send + Sync {
    /// Open a URL in the default browser / handler.
    fn open_url(&self, url: &str) -> Result<()>;

    /// Show the message's HTML body in the default browser.
    fn render_html_preview(&self, message: &Message) -> Result<()>;

    /// Write `bytes` into `dir`, renaming on collision. Returns the final path.
    fn save_attachment(&self, dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// The real desktop: `open` on macOS, `xdg-open` elsewhere.
pub struct SystemEffects;

impl Effects for SystemEffects {
    fn open_url(&self, url: &str) -> Result<()> {
        open_path(url)
    }

    fn render_html_preview(&self, message: &Message) -> Result<()> {
        let html = message
            .html
            .as_deref()
            .ok_or_else(|| Error::Parse(format!("{} has no HTML body", message.id)))?;
        let path = std::env::temp_dir().join(format!(
            "inboxwatch-{}-{}.html",
            std::process::id(),
            sanitize_filename(&message.id)
        ));
        std::fs::write(&path, html)?;
        open_path(&path.to_string_lossy())
    }

    fn save_attachment(&self, dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        save_unique(dir, filename, bytes)
    }
}

fn open_path(target: &str) -> Result<()> {
    let cmd = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };

    std::process::Command::new(cmd)
        .arg(target)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| Error::Launch {
            command: format!("{} {}", cmd, target),
            reason: e.to_string(),
        })?;

    info!("opened {}", target);
    Ok(())
}

/// Final path component only, with characters unsafe in file names replaced.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

/// Candidate name for the n-th collision: `report (2).pdf`.
fn numbered(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", name, n),
    }
}

/// Create a new file in `dir` without clobbering anything already there.
pub fn save_unique(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = sanitize_filename(filename);
    let mut n = 0;
    loop {
        let candidate = if n == 0 {
            dir.join(&name)
        } else {
            dir.join(numbered(&name, n))
        };
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(bytes)?;
                info!("saved attachment to {}", candidate.display());
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_bad_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\temp\\a:b.txt"), "a_b.txt");
        assert_eq!(sanitize_filename("  "), "attachment");
        assert_eq!(sanitize_filename(".."), "attachment");
        assert_eq!(sanitize_filename("<abc@x>"), "_abc@x_");
    }

    #[test]
    fn numbered_names_keep_extension() {
        assert_eq!(numbered("report.pdf", 1), "report (1).pdf");
        assert_eq!(numbered("archive.tar.gz", 2), "archive.tar (2).gz");
        assert_eq!(numbered("README", 3), "README (3)");
    }

    #[test]
    fn save_renames_on_collision() {
        let tmp = tempfile::tempdir().unwrap();
        let first = save_unique(tmp.path(), "x.pdf", b"one").unwrap();
        let second = save_unique(tmp.path(), "x.pdf", b"two").unwrap();
        let third = save_unique(tmp.path(), "x.pdf", b"three").unwrap();
        assert_eq!(first, tmp.path().join("x.pdf"));
        assert_eq!(second, tmp.path().join("x (1).pdf"));
        assert_eq!(third, tmp.path().join("x (2).pdf"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&third).unwrap(), b"three");
    }

    #[test]
    fn save_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("downloads/inbox");
        let path = SystemEffects.save_attachment(&dir, "a.txt", b"hi").unwrap();
        assert_eq!(path, dir.join("a.txt"));
    }

    #[test]
    fn html_preview_needs_html() {
        let msg = Message::default();
        assert!(matches!(
            SystemEffects.render_html_preview(&msg),
            Err(Error::Parse(_))
        ));
    }
}
