//! Side effects requested by the reducer, run off the UI loop.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::Msg;
use crate::effects::Effects;
use crate::error::Result;
use crate::keystore::{Keystore, MailboxIdentity};
use crate::message::Message;
use crate::source::{EventSource, Mailbox};
use crate::watch::Watcher;

#[derive(Debug)]
pub enum Command {
    DeleteMessage {
        mailbox: Mailbox,
        id: String,
    },
    SaveAttachment {
        message: Arc<Message>,
        index: usize,
        dir: PathBuf,
    },
    OpenUrl(String),
    ViewHtml(Arc<Message>),
    CreateMailbox,
    /// Start a listener for a mailbox created at runtime.
    Watch(Mailbox),
}

/// The capabilities commands run against.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn EventSource>,
    pub keystore: Arc<dyn Keystore>,
    pub effects: Arc<dyn Effects>,
}

/// Run blocking work (filesystem, process spawn) off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

impl Command {
    /// Whether the command names something it can act on: a message id,
    /// an attachment in range, a non-blank URL, an HTML body.
    pub fn has_target(&self) -> bool {
        match self {
            Command::DeleteMessage { id, .. } => !id.is_empty(),
            Command::SaveAttachment { message, index, .. } => *index < message.attachments.len(),
            Command::OpenUrl(url) => !url.trim().is_empty(),
            Command::ViewHtml(message) => message.html.is_some(),
            Command::CreateMailbox | Command::Watch(_) => true,
        }
    }

    /// Perform the effect and describe its outcome. `None` means the
    /// command had no valid target and did nothing.
    pub async fn execute(self, c: &Collaborators) -> Option<Msg> {
        if !self.has_target() {
            return None;
        }
        match self {
            Command::DeleteMessage { mailbox, id } => {
                let result = c.source.delete_message(&mailbox, &id).await;
                Some(Msg::MessageDeleted { id, result })
            }
            Command::SaveAttachment {
                message,
                index,
                dir,
            } => {
                let attachment = message.attachments.get(index)?.clone();
                let effects = c.effects.clone();
                let result = blocking(move || {
                    effects.save_attachment(&dir, &attachment.filename, &attachment.bytes)
                })
                .await;
                Some(Msg::AttachmentSaved(result))
            }
            Command::OpenUrl(url) => {
                let effects = c.effects.clone();
                let result = blocking(move || effects.open_url(&url)).await;
                Some(Msg::BrowserOpened(result))
            }
            Command::ViewHtml(message) => {
                let effects = c.effects.clone();
                let result = blocking(move || effects.render_html_preview(&message)).await;
                Some(Msg::BrowserOpened(result))
            }
            Command::CreateMailbox => {
                let result = create_mailbox(c).await;
                Some(Msg::MailboxCreated(result))
            }
            Command::Watch(_) => None,
        }
    }
}

/// Provision a mailbox and persist its identity. A mailbox whose identity
/// could not be stored is reported as a failure.
async fn create_mailbox(c: &Collaborators) -> Result<Mailbox> {
    let mailbox = c.source.create_mailbox().await?;
    let identity = MailboxIdentity {
        address: mailbox.address.clone(),
        created_at: Utc::now(),
    };
    let keystore = c.keystore.clone();
    blocking(move || keystore.save_mailbox_identity(&identity)).await?;
    Ok(mailbox)
}

/// Runs commands as independent tasks under the app lifetime and posts
/// their follow-up messages to the UI queue.
pub struct Dispatcher {
    collaborators: Collaborators,
    watcher: Watcher,
    tx: UnboundedSender<Msg>,
    token: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        collaborators: Collaborators,
        watcher: Watcher,
        tx: UnboundedSender<Msg>,
        token: CancellationToken,
    ) -> Self {
        Self {
            collaborators,
            watcher,
            tx,
            token,
        }
    }

    pub fn dispatch(&self, command: Command) {
        if let Command::Watch(mailbox) = command {
            self.watcher.watch(mailbox);
            return;
        }
        debug!("dispatch {:?}", command);

        let collaborators = self.collaborators.clone();
        let tx = self.tx.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            let msg = tokio::select! {
                _ = token.cancelled() => return,
                msg = command.execute(&collaborators) => msg,
            };
            if let Some(msg) = msg {
                if tx.send(msg).is_err() {
                    warn!("UI loop gone; dropping command result");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::MockEffects;
    use crate::error::Error;
    use crate::keystore::MockKeystore;
    use crate::message::Attachment;
    use crate::source::EventStream;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc::unbounded_channel;

    #[derive(Default)]
    struct StubSource {
        fail_delete: bool,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventSource for StubSource {
        async fn subscribe(
            &self,
            _token: CancellationToken,
            _mailboxes: &[Mailbox],
        ) -> Result<EventStream> {
            Ok(futures::stream::pending().boxed())
        }

        async fn list_messages(&self, _mailbox: &Mailbox) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }

        async fn delete_message(&self, _mailbox: &Mailbox, id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(Error::MessageNotFound(id.to_string()));
            }
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }

        async fn create_mailbox(&self) -> Result<Mailbox> {
            Ok(Mailbox::new("fresh@watch.test"))
        }
    }

    fn collaborators(
        source: StubSource,
        keystore: MockKeystore,
        effects: MockEffects,
    ) -> (Collaborators, Arc<StubSource>) {
        let source = Arc::new(source);
        (
            Collaborators {
                source: source.clone(),
                keystore: Arc::new(keystore),
                effects: Arc::new(effects),
            },
            source,
        )
    }

    fn with_attachment() -> Arc<Message> {
        Arc::new(Message {
            id: "m1".into(),
            attachments: vec![Attachment {
                filename: "a.pdf".into(),
                content_type: "application/pdf".into(),
                bytes: b"%PDF".to_vec(),
            }],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn delete_reports_outcome() {
        let (c, source) =
            collaborators(StubSource::default(), MockKeystore::new(), MockEffects::new());
        let msg = Command::DeleteMessage {
            mailbox: Mailbox::new("a@x"),
            id: "m1".into(),
        }
        .execute(&c)
        .await;
        assert!(matches!(
            msg,
            Some(Msg::MessageDeleted { ref id, result: Ok(()) }) if id == "m1"
        ));
        assert_eq!(*source.deleted.lock().unwrap(), vec!["m1".to_string()]);

        let failing = StubSource {
            fail_delete: true,
            ..Default::default()
        };
        let (c, _) = collaborators(failing, MockKeystore::new(), MockEffects::new());
        let msg = Command::DeleteMessage {
            mailbox: Mailbox::new("a@x"),
            id: "m1".into(),
        }
        .execute(&c)
        .await;
        assert!(matches!(
            msg,
            Some(Msg::MessageDeleted {
                result: Err(Error::MessageNotFound(_)),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn save_attachment_uses_effects() {
        let mut effects = MockEffects::new();
        effects
            .expect_save_attachment()
            .withf(|dir, name, bytes| {
                dir == std::path::Path::new("/dl") && name == "a.pdf" && bytes == &b"%PDF"[..]
            })
            .times(1)
            .returning(|dir, name, _| Ok(dir.join(name)));
        let (c, _) = collaborators(StubSource::default(), MockKeystore::new(), effects);

        let msg = Command::SaveAttachment {
            message: with_attachment(),
            index: 0,
            dir: PathBuf::from("/dl"),
        }
        .execute(&c)
        .await;
        match msg {
            Some(Msg::AttachmentSaved(Ok(path))) => assert_eq!(path, PathBuf::from("/dl/a.pdf")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn commands_without_target_do_nothing() {
        // No expectations: any call into the mocks would panic.
        let (c, _) =
            collaborators(StubSource::default(), MockKeystore::new(), MockEffects::new());

        let out_of_range = Command::SaveAttachment {
            message: with_attachment(),
            index: 3,
            dir: PathBuf::from("/dl"),
        };
        assert!(out_of_range.execute(&c).await.is_none());
        assert!(Command::OpenUrl("  ".into()).execute(&c).await.is_none());
        assert!(Command::ViewHtml(Arc::new(Message::default()))
            .execute(&c)
            .await
            .is_none());
        assert!(Command::DeleteMessage {
            mailbox: Mailbox::new("a@x"),
            id: String::new(),
        }
        .execute(&c)
        .await
        .is_none());
    }

    #[tokio::test]
    async fn open_url_reports_launch_failure() {
        let mut effects = MockEffects::new();
        effects
            .expect_open_url()
            .withf(|url| url == "https://example.com")
            .times(1)
            .returning(|url| {
                Err(Error::Launch {
                    command: format!("xdg-open {}", url),
                    reason: "not found".into(),
                })
            });
        let (c, _) = collaborators(StubSource::default(), MockKeystore::new(), effects);
        let msg = Command::OpenUrl("https://example.com".into())
            .execute(&c)
            .await;
        assert!(matches!(
            msg,
            Some(Msg::BrowserOpened(Err(Error::Launch { .. })))
        ));
    }

    #[tokio::test]
    async fn create_mailbox_persists_identity() {
        let mut keystore = MockKeystore::new();
        keystore
            .expect_save_mailbox_identity()
            .withf(|identity| identity.address == "fresh@watch.test")
            .times(1)
            .returning(|_| Ok(()));
        let (c, _) = collaborators(StubSource::default(), keystore, MockEffects::new());
        match Command::CreateMailbox.execute(&c).await {
            Some(Msg::MailboxCreated(Ok(m))) => assert_eq!(m.address, "fresh@watch.test"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_mailbox_fails_when_keystore_fails() {
        let mut keystore = MockKeystore::new();
        keystore
            .expect_save_mailbox_identity()
            .returning(|_| Err(Error::Keystore("read-only".into())));
        let (c, _) = collaborators(StubSource::default(), keystore, MockEffects::new());
        assert!(matches!(
            Command::CreateMailbox.execute(&c).await,
            Some(Msg::MailboxCreated(Err(Error::Keystore(_))))
        ));
    }

    #[tokio::test]
    async fn dispatcher_posts_follow_up() {
        let mut effects = MockEffects::new();
        effects.expect_open_url().returning(|_| Ok(()));
        let (c, _) = collaborators(StubSource::default(), MockKeystore::new(), effects);
        let (tx, mut rx) = unbounded_channel();
        let token = CancellationToken::new();
        let watcher = Watcher::new(c.source.clone(), tx.clone(), token.clone());
        let dispatcher = Dispatcher::new(c, watcher, tx, token);

        dispatcher.dispatch(Command::OpenUrl("https://example.com".into()));
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("follow-up within timeout");
        assert!(matches!(msg, Some(Msg::BrowserOpened(Ok(())))));
    }

    #[tokio::test]
    async fn dispatcher_routes_watch_to_watcher() {
        let (c, _) =
            collaborators(StubSource::default(), MockKeystore::new(), MockEffects::new());
        let (tx, mut rx) = unbounded_channel();
        let token = CancellationToken::new();
        let watcher = Watcher::new(c.source.clone(), tx.clone(), token.clone());
        let dispatcher = Dispatcher::new(c, watcher.clone(), tx, token);

        dispatcher.dispatch(Command::Watch(Mailbox::new("fresh@watch.test")));
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("listener connects");
        assert!(matches!(msg, Some(Msg::Connected)));
        watcher.shutdown().await;
    }
}
