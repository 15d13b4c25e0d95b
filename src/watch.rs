//! Bridges the push-based event source to the UI's single message queue.

use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::message::MessageItem;
use crate::source::{EventSource, Mailbox};
use crate::tui::Msg;

/// Spawns one listener task per mailbox. Listeners only ever post [`Msg`]s;
/// they never see the UI state.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn EventSource>,
    tx: UnboundedSender<Msg>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn EventSource>,
        tx: UnboundedSender<Msg>,
        token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                tx,
                token,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Begin backfill and live subscriptions for every mailbox.
    pub fn start(&self, mailboxes: &[Mailbox]) {
        info!("watching {} mailbox(es)", mailboxes.len());
        for mailbox in mailboxes {
            self.watch(mailbox.clone());
        }
    }

    /// Add a listener for one more mailbox under the same lifetime.
    pub fn watch(&self, mailbox: Mailbox) {
        if self.inner.token.is_cancelled() {
            return;
        }
        let listener = Listener {
            source: self.inner.source.clone(),
            tx: self.inner.tx.clone(),
            token: self.inner.token.clone(),
            mailbox,
        };
        let handle = tokio::spawn(listener.run());
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.retain(|h| !h.is_finished());
            tasks.push(handle);
        }
    }

    /// Cancel the lifetime; every listener returns at its next await.
    pub fn stop(&self) {
        self.inner.token.cancel();
    }

    /// Stop, then wait for every listener to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let handles = match self.inner.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            let _ = handle.await;
        }
        debug!("all listeners stopped");
    }
}

struct Listener {
    source: Arc<dyn EventSource>,
    tx: UnboundedSender<Msg>,
    token: CancellationToken,
    mailbox: Mailbox,
}

impl Listener {
    /// Post to the UI unless the lifetime is over. Never blocks.
    fn post(&self, msg: Msg) {
        if !self.token.is_cancelled() {
            let _ = self.tx.send(msg);
        }
    }

    fn received(&self, message: crate::message::Message, mailbox: &Mailbox) {
        self.post(Msg::MessageReceived(MessageItem::new(
            Arc::new(message),
            mailbox.address.clone(),
        )));
    }

    async fn run(self) {
        let token = self.token.clone();

        // Subscribe before backfilling so nothing arriving in between is lost;
        // the overlap is dropped by dedup-on-insert.
        let subscribed = tokio::select! {
            _ = token.cancelled() => return,
            s = self.source.subscribe(token.child_token(), std::slice::from_ref(&self.mailbox)) => s,
        };
        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(e) => {
                warn!("subscribe to {} failed: {}", self.mailbox, e);
                self.post(Msg::ConnectionError(e));
                return;
            }
        };
        self.post(Msg::Connected);

        let listed = tokio::select! {
            _ = token.cancelled() => return,
            l = self.source.list_messages(&self.mailbox) => l,
        };
        // A failed backfill counts as an outage until the stream delivers.
        let mut healthy = listed.is_ok();
        match listed {
            Ok(messages) => {
                debug!("backfill {}: {} message(s)", self.mailbox, messages.len());
                for message in messages {
                    self.received(message, &self.mailbox);
                }
            }
            Err(e) => {
                warn!("backfill of {} failed: {}", self.mailbox, e);
                self.post(Msg::ConnectionError(e));
            }
        }

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return,
                n = stream.next() => n,
            };
            match next {
                Some(Ok(event)) => {
                    if !healthy {
                        healthy = true;
                        self.post(Msg::Connected);
                    }
                    self.received(event.message, &event.mailbox);
                }
                Some(Err(e)) => {
                    warn!("stream error on {}: {}", self.mailbox, e);
                    healthy = false;
                    self.post(Msg::ConnectionError(e));
                }
                None => {
                    info!("subscription for {} ended", self.mailbox);
                    self.post(Msg::ConnectionError(Error::StreamClosed));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::message::Message;
    use crate::source::{Event, EventStream};
    use async_trait::async_trait;
    use futures::channel::mpsc as fmpsc;
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct FakeSource {
        existing: Vec<Message>,
        live: Mutex<Option<fmpsc::UnboundedReceiver<Result<Event>>>>,
        fail_subscribe: bool,
        fail_list: bool,
    }

    impl FakeSource {
        fn new(existing: &[&str]) -> (Self, fmpsc::UnboundedSender<Result<Event>>) {
            let (tx, rx) = fmpsc::unbounded();
            let source = Self {
                existing: existing.iter().map(|id| message(id)).collect(),
                live: Mutex::new(Some(rx)),
                fail_subscribe: false,
                fail_list: false,
            };
            (source, tx)
        }
    }

    #[async_trait]
    impl EventSource for FakeSource {
        async fn subscribe(
            &self,
            _token: CancellationToken,
            mailboxes: &[Mailbox],
        ) -> Result<EventStream> {
            if self.fail_subscribe {
                return Err(Error::MailboxNotFound(mailboxes[0].address.clone()));
            }
            let rx = self.live.lock().unwrap().take().expect("subscribed once");
            Ok(rx.boxed())
        }

        async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<Message>> {
            if self.fail_list {
                return Err(Error::MailboxNotFound(mailbox.address.clone()));
            }
            Ok(self.existing.clone())
        }

        async fn delete_message(&self, _mailbox: &Mailbox, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn create_mailbox(&self) -> Result<Mailbox> {
            Ok(Mailbox::new("new@watch.test"))
        }
    }

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn event(id: &str) -> Result<Event> {
        Ok(Event {
            message: message(id),
            mailbox: Mailbox::new("a@watch.test"),
        })
    }

    async fn recv(rx: &mut UnboundedReceiver<Msg>) -> Msg {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("message within timeout")
            .expect("channel open")
    }

    fn received_id(msg: &Msg) -> Option<&str> {
        match msg {
            Msg::MessageReceived(item) => Some(item.id()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn backfills_then_forwards_live_events() {
        let (source, live) = FakeSource::new(&["1", "2"]);
        let (tx, mut rx) = unbounded_channel();
        let watcher = Watcher::new(Arc::new(source), tx, CancellationToken::new());
        watcher.start(&[Mailbox::new("a@watch.test")]);

        assert!(matches!(recv(&mut rx).await, Msg::Connected));
        assert_eq!(received_id(&recv(&mut rx).await), Some("1"));
        assert_eq!(received_id(&recv(&mut rx).await), Some("2"));

        live.unbounded_send(event("3")).unwrap();
        let msg = recv(&mut rx).await;
        assert_eq!(received_id(&msg), Some("3"));
        if let Msg::MessageReceived(item) = msg {
            assert_eq!(item.mailbox, "a@watch.test");
        }
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn subscribe_failure_reports_connection_error() {
        let (mut source, _live) = FakeSource::new(&[]);
        source.fail_subscribe = true;
        let (tx, mut rx) = unbounded_channel();
        let watcher = Watcher::new(Arc::new(source), tx, CancellationToken::new());
        watcher.watch(Mailbox::new("gone@watch.test"));

        assert!(matches!(
            recv(&mut rx).await,
            Msg::ConnectionError(Error::MailboxNotFound(_))
        ));
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn stream_error_then_recovery_reconnects() {
        let (source, live) = FakeSource::new(&[]);
        let (tx, mut rx) = unbounded_channel();
        let watcher = Watcher::new(Arc::new(source), tx, CancellationToken::new());
        watcher.watch(Mailbox::new("a@watch.test"));
        assert!(matches!(recv(&mut rx).await, Msg::Connected));

        live.unbounded_send(Err(Error::Parse("boom".into()))).unwrap();
        live.unbounded_send(event("9")).unwrap();
        assert!(matches!(recv(&mut rx).await, Msg::ConnectionError(_)));
        assert!(matches!(recv(&mut rx).await, Msg::Connected));
        assert_eq!(received_id(&recv(&mut rx).await), Some("9"));

        drop(live);
        assert!(matches!(
            recv(&mut rx).await,
            Msg::ConnectionError(Error::StreamClosed)
        ));
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn live_event_after_failed_backfill_reconnects() {
        let (mut source, live) = FakeSource::new(&["1"]);
        source.fail_list = true;
        let (tx, mut rx) = unbounded_channel();
        let watcher = Watcher::new(Arc::new(source), tx, CancellationToken::new());
        watcher.watch(Mailbox::new("a@watch.test"));

        assert!(matches!(recv(&mut rx).await, Msg::Connected));
        assert!(matches!(
            recv(&mut rx).await,
            Msg::ConnectionError(Error::MailboxNotFound(_))
        ));

        live.unbounded_send(event("2")).unwrap();
        assert!(matches!(recv(&mut rx).await, Msg::Connected));
        assert_eq!(received_id(&recv(&mut rx).await), Some("2"));
        watcher.shutdown().await;
    }

    #[tokio::test]
    async fn cancellation_stops_listeners_without_posting() {
        let (source, live) = FakeSource::new(&[]);
        let (tx, mut rx) = unbounded_channel();
        let token = CancellationToken::new();
        let watcher = Watcher::new(Arc::new(source), tx, token.clone());
        watcher.watch(Mailbox::new("a@watch.test"));
        assert!(matches!(recv(&mut rx).await, Msg::Connected));

        tokio::time::timeout(Duration::from_secs(5), watcher.shutdown())
            .await
            .expect("listeners exit promptly");
        assert!(token.is_cancelled());

        // Late events go nowhere and no new listener starts.
        let _ = live.unbounded_send(event("late"));
        watcher.watch(Mailbox::new("b@watch.test"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }
}
