//! Pushes locally redeemed tickets to the authoritative store.
//!
//! Pushes run one at a time so each outcome can be attributed to a single
//! ticket. A failed push is logged and reported, never raised, and the
//! ticket stays dirty for the next pass.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authority::TicketAuthority;
use crate::error::Result;
use crate::models::SyncLogEntry;
use crate::storage::{within, DownloadSummary, LocalStore, PushedTicket};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<SyncLogEntry>,
}

pub struct SyncEngine<A> {
    store: LocalStore,
    authority: A,
    request_timeout: Duration,
}

impl<A: TicketAuthority> SyncEngine<A> {
    pub fn new(store: LocalStore, authority: A) -> Self {
        Self {
            store,
            authority,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Bounds every round trip to the authoritative store.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Replaces the local cache with one session's tickets.
    pub async fn download_session(&self, session_id: Uuid) -> Result<DownloadSummary> {
        self.store
            .download(&self.authority, session_id, self.request_timeout)
            .await
    }

    /// Pushes every dirty ticket and records the outcome locally.
    ///
    /// The dirty set is read once up front; tickets redeemed while the pass
    /// runs are picked up by the next call.
    pub async fn sync(&self) -> Result<SyncSummary> {
        let _guard = self.store.exclusive().await;

        let dirty = self.store.dirty_tickets().await?;
        if dirty.is_empty() {
            debug!("Nothing to sync");
            return Ok(SyncSummary::default());
        }

        let mut pushed = Vec::with_capacity(dirty.len());
        let mut errors = Vec::new();

        for local in &dirty {
            let update = local.ticket.to_update();
            match within(self.request_timeout, self.authority.upsert_ticket(&update)).await {
                Ok(()) => pushed.push(PushedTicket {
                    qr_code: update.qr_code,
                    last_scan_timestamp: update.last_scan_timestamp,
                }),
                Err(e) => {
                    warn!(code = %update.qr_code, error = %e, "Ticket push failed");
                    errors.push(SyncLogEntry::new(update.qr_code, e));
                }
            }
        }

        let marked = self.store.finish_sync(&pushed, &errors).await?;
        if (marked as usize) < pushed.len() {
            info!(
                rescanned = pushed.len() - marked as usize,
                "Tickets re-scanned during sync stay dirty"
            );
        }

        let summary = SyncSummary {
            total: dirty.len(),
            success: pushed.len(),
            failed: errors.len(),
            errors,
        };
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            "Sync finished"
        );
        Ok(summary)
    }
}
