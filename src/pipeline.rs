//! Cleaning run: connect → scan → commit → expunge → disconnect.
//!
//! The scan runs the mailbox's streaming producer and the rule-evaluating
//! consumer side by side over a bounded channel. Deletions are only
//! committed after the whole folder was scanned without error, so an aborted
//! scan never marks anything.

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::{MailboxError, PipelineError};
use crate::mailbox::{Mailbox, StreamItem, Uid};
use crate::rules::RuleSet;

/// Messages buffered between producer and consumer.
const STREAM_BUFFER: usize = 10;

/// Log a progress line every this many scanned messages.
const PROGRESS_INTERVAL: usize = 100;

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub scanned: usize,
    pub deleted: usize,
}

/// Result of the scan stage.
struct Scan {
    scanned: usize,
    batch: Vec<Uid>,
}

/// Applies a rule set to every message of a mailbox and deletes the matches.
pub struct Cleaner {
    rules: RuleSet,
}

impl Cleaner {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run one full cleaning pass against `mailbox`.
    ///
    /// The session is always closed once connected, whatever happened in
    /// between; a failure to close is logged and does not change the result.
    pub async fn run<M: Mailbox>(&self, mailbox: &mut M) -> Result<CleanReport, PipelineError> {
        mailbox.connect().await.map_err(PipelineError::Connect)?;

        let result = self.clean(mailbox).await;

        if let Err(e) = mailbox.disconnect().await {
            warn!(error = %e, "Failed to close mailbox session");
        }
        match &result {
            Ok(report) => info!(
                scanned = report.scanned,
                deleted = report.deleted,
                "Cleaning run finished"
            ),
            Err(e) => error!(error = %e, "Cleaning run aborted"),
        }
        result
    }

    async fn clean<M: Mailbox>(&self, mailbox: &mut M) -> Result<CleanReport, PipelineError> {
        let scan = self.scan(mailbox).await?;

        info!(total = scan.batch.len(), "Total messages to delete");

        for &uid in &scan.batch {
            mailbox
                .mark_deleted(uid)
                .await
                .map_err(|source| PipelineError::Mark { uid, source })?;
        }
        // Also sweeps messages left flagged by an earlier aborted run.
        mailbox.expunge().await.map_err(PipelineError::Expunge)?;
        info!(count = scan.batch.len(), "Expunged marked messages");

        Ok(CleanReport {
            scanned: scan.scanned,
            deleted: scan.batch.len(),
        })
    }

    async fn scan<M: Mailbox>(&self, mailbox: &mut M) -> Result<Scan, PipelineError> {
        let (tx, rx) = mpsc::channel::<StreamItem>(STREAM_BUFFER);

        let (produced, consumed) = tokio::join!(mailbox.stream(tx), self.consume(rx));

        // The consumer's error explains a producer `Closed`, so it wins.
        let scan = consumed.map_err(PipelineError::Scan)?;
        produced.map_err(PipelineError::Scan)?;
        Ok(scan)
    }

    async fn consume(&self, mut rx: mpsc::Receiver<StreamItem>) -> Result<Scan, MailboxError> {
        let mut scan = Scan {
            scanned: 0,
            batch: Vec::new(),
        };

        while let Some(item) = rx.recv().await {
            let message = item?;
            scan.scanned += 1;
            if scan.scanned % PROGRESS_INTERVAL == 0 {
                info!(scanned = scan.scanned, "Processed messages");
            }

            if self.rules.evaluate(&message).await {
                info!(
                    "Marking for deletion: {} - {}",
                    message.first_sender_address().unwrap_or_default(),
                    message.subject
                );
                scan.batch.push(message.uid);
            }
        }

        Ok(scan)
    }
}
