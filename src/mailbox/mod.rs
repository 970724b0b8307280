//! Mailbox collaborator: the operations the cleaning pipeline needs from a
//! mail server, plus the IMAP implementation used by the binary.

pub mod imap;
pub mod types;

pub use imap::ImapMailbox;
pub use types::{Message, Sender, Uid};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::MailboxError;

/// Item handed from the streaming producer to the pipeline consumer.
///
/// An `Err` item is a message the mailbox could not decode; the consumer
/// treats it as a handler failure and aborts the scan.
pub type StreamItem = Result<Message, MailboxError>;

/// A mail server session as seen by the cleaner.
///
/// `stream` is the producer half of the scan: it pushes every message of the
/// target folder into `tx` in delivery order and returns once the folder is
/// exhausted. It must tolerate `tx` closing early (consumer aborted) and
/// return [`MailboxError::Closed`] in that case, leaving the session usable
/// for `disconnect`.
#[async_trait]
pub trait Mailbox: Send {
    async fn connect(&mut self) -> Result<(), MailboxError>;

    async fn stream(&mut self, tx: mpsc::Sender<StreamItem>) -> Result<(), MailboxError>;

    async fn mark_deleted(&mut self, uid: Uid) -> Result<(), MailboxError>;

    async fn expunge(&mut self) -> Result<(), MailboxError>;

    async fn disconnect(&mut self) -> Result<(), MailboxError>;
}
