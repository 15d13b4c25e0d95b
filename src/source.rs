//! The event source capability: where messages come from.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::Message;

/// A monitored mailbox, identified by its address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    pub address: String,
}

impl Mailbox {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// One arrived message and the mailbox it arrived in.
#[derive(Debug, Clone)]
pub struct Event {
    pub message: Message,
    pub mailbox: Mailbox,
}

pub type EventStream = BoxStream<'static, Result<Event>>;

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Open a live stream of new arrivals in `mailboxes`.
    ///
    /// Messages that already exist when this returns are not yielded; use
    /// [`EventSource::list_messages`] for those. The stream ends when
    /// `token` is cancelled or the source gives up.
    async fn subscribe(&self, token: CancellationToken, mailboxes: &[Mailbox])
        -> Result<EventStream>;

    /// Every message currently in `mailbox`, oldest first.
    async fn list_messages(&self, mailbox: &Mailbox) -> Result<Vec<Message>>;

    async fn delete_message(&self, mailbox: &Mailbox, id: &str) -> Result<()>;

    /// Provision a brand new mailbox.
    async fn create_mailbox(&self) -> Result<Mailbox>;
}
