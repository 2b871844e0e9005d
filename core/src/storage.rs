//! On-device ticket cache backed by SQLite.
//!
//! Holds at most one session's tickets at a time: every download replaces
//! the whole ticket table. Template summaries accumulate across downloads
//! and failed pushes go to an append-only `sync_log` table.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::authority::TicketAuthority;
use crate::error::{AuthorityError, Error, Result};
use crate::models::{LocalTicket, SyncLogEntry, TemplateSummary, Ticket, TicketStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub count: usize,
}

/// A ticket whose push succeeded, with the scan time that was pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedTicket {
    pub qr_code: String,
    pub last_scan_timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    operation: Arc<Mutex<()>>,
}

impl LocalStore {
    /// Opens (creating if needed) the store file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// A throwaway store that lives as long as the returned handle.
    pub async fn open_in_memory() -> Result<Self> {
        Self::connect(SqliteConnectOptions::from_str("sqlite::memory:")?).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One connection: the device has a single operator and an in-memory
        // database only exists on the connection that created it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            operation: Arc::new(Mutex::new(())),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Serializes whole-store operations (download and sync).
    pub(crate) async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.operation.lock().await
    }

    /// Replaces the cached tickets with `session_id`'s tickets from the
    /// authoritative store and caches their templates.
    ///
    /// Everything is fetched before the first local write, so a network or
    /// auth failure leaves the store untouched.
    pub async fn download<A>(
        &self,
        authority: &A,
        session_id: Uuid,
        timeout: Duration,
    ) -> Result<DownloadSummary>
    where
        A: TicketAuthority + ?Sized,
    {
        let _guard = self.exclusive().await;

        let tickets = within(timeout, authority.fetch_tickets_for_session(session_id))
            .await
            .map_err(Error::DownloadFailed)?;
        if tickets.is_empty() {
            info!(%session_id, "Session has no tickets, local store left as is");
            return Ok(DownloadSummary { count: 0 });
        }

        let template_ids: Vec<Uuid> = tickets
            .iter()
            .map(|t| t.template_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let templates = within(timeout, authority.fetch_templates(&template_ids))
            .await
            .map_err(Error::DownloadFailed)?;

        let count = tickets.len();
        self.replace_contents(tickets, &templates).await?;

        info!(%session_id, tickets = count, templates = templates.len(), "Downloaded session");
        Ok(DownloadSummary { count })
    }

    async fn replace_contents(&self, tickets: Vec<Ticket>, templates: &[TemplateSummary]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for template in templates {
            sqlx::query(
                r#"
                INSERT INTO templates (id, ticket_format, required_user_fields)
                VALUES (?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    ticket_format = excluded.ticket_format,
                    required_user_fields = excluded.required_user_fields
                "#,
            )
            .bind(template.id.to_string())
            .bind(template.ticket_format.as_str())
            .bind(serde_json::to_string(&template.required_user_fields)?)
            .execute(&mut *tx)
            .await?;
        }

        let cleared = sqlx::query("DELETE FROM tickets").execute(&mut *tx).await?;
        debug!(removed = cleared.rows_affected(), "Cleared ticket cache");

        for ticket in tickets {
            let row = TicketRow::try_from(&LocalTicket::downloaded(ticket))?;
            row.upsert().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, qr_code: &str) -> Result<Option<LocalTicket>> {
        let row = sqlx::query_as::<_, TicketRow>("SELECT * FROM tickets WHERE qr_code = ?")
            .bind(qr_code)
            .fetch_optional(&self.pool)
            .await?;
        row.map(LocalTicket::try_from).transpose()
    }

    pub async fn get_template(&self, template_id: Uuid) -> Result<Option<TemplateSummary>> {
        let row = sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = ?")
            .bind(template_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TemplateSummary::try_from).transpose()
    }

    /// Inserts or overwrites the ticket with the same code.
    pub async fn put(&self, ticket: &LocalTicket) -> Result<()> {
        TicketRow::try_from(ticket)?
            .upsert()
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn all_tickets(&self) -> Result<Vec<LocalTicket>> {
        let rows = sqlx::query_as::<_, TicketRow>("SELECT * FROM tickets ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(LocalTicket::try_from).collect()
    }

    /// Redeemed tickets not yet confirmed by the authoritative store, in
    /// scan order.
    pub async fn dirty_tickets(&self) -> Result<Vec<LocalTicket>> {
        let rows = sqlx::query_as::<_, TicketRow>(
            "SELECT * FROM tickets WHERE synced = 0 AND status = ? \
             ORDER BY last_scan_timestamp, rowid",
        )
        .bind(TicketStatus::Redeemed.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(LocalTicket::try_from).collect()
    }

    pub async fn count(&self) -> Result<usize> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tickets")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Records a sync pass in one transaction: marks pushed tickets synced
    /// and appends the failures to the log.
    ///
    /// A ticket only flips to synced if its scan time still matches what
    /// was pushed; a re-scan during the pass keeps it dirty for next time.
    pub async fn finish_sync(
        &self,
        pushed: &[PushedTicket],
        failures: &[SyncLogEntry],
    ) -> Result<u64> {
        if pushed.is_empty() && failures.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut marked = 0;

        for ticket in pushed {
            let result = sqlx::query(
                "UPDATE tickets SET synced = 1 WHERE qr_code = ? AND last_scan_timestamp IS ?",
            )
            .bind(&ticket.qr_code)
            .bind(ticket.last_scan_timestamp.map(encode_time))
            .execute(&mut *tx)
            .await?;
            marked += result.rows_affected();
        }

        for entry in failures {
            sqlx::query("INSERT INTO sync_log (timestamp, ticket, error) VALUES (?, ?, ?)")
                .bind(encode_time(entry.timestamp))
                .bind(&entry.ticket)
                .bind(&entry.error)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(marked)
    }

    /// The failure log, oldest first.
    pub async fn sync_log(&self) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            "SELECT timestamp, ticket, error FROM sync_log ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SyncLogEntry::try_from).collect()
    }
}

/// Runs one authoritative-store round trip under `timeout`.
pub(crate) async fn within<T, F>(timeout: Duration, call: F) -> Result<T, AuthorityError>
where
    F: Future<Output = Result<T, AuthorityError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AuthorityError::Timeout(timeout.as_secs())),
    }
}

fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidRecord(format!("bad timestamp '{}': {}", text, e)))
}

fn decode_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| Error::InvalidRecord(format!("bad id '{}': {}", text, e)))
}

#[derive(Debug, FromRow)]
struct TicketRow {
    qr_code: String,
    id: String,
    session_id: String,
    template_id: String,
    assigned_value: String,
    user_data: String,
    status: String,
    last_scan_timestamp: Option<String>,
    synced: bool,
}

impl TicketRow {
    fn upsert(&self) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        sqlx::query(
            r#"
            INSERT INTO tickets (
                qr_code, id, session_id, template_id, assigned_value,
                user_data, status, last_scan_timestamp, synced
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (qr_code) DO UPDATE SET
                id = excluded.id,
                session_id = excluded.session_id,
                template_id = excluded.template_id,
                assigned_value = excluded.assigned_value,
                user_data = excluded.user_data,
                status = excluded.status,
                last_scan_timestamp = excluded.last_scan_timestamp,
                synced = excluded.synced
            "#,
        )
        .bind(&self.qr_code)
        .bind(&self.id)
        .bind(&self.session_id)
        .bind(&self.template_id)
        .bind(&self.assigned_value)
        .bind(&self.user_data)
        .bind(&self.status)
        .bind(&self.last_scan_timestamp)
        .bind(self.synced)
    }
}

impl TryFrom<&LocalTicket> for TicketRow {
    type Error = Error;

    fn try_from(local: &LocalTicket) -> Result<Self> {
        let ticket = &local.ticket;
        Ok(Self {
            qr_code: ticket.qr_code.clone(),
            id: ticket.id.to_string(),
            session_id: ticket.session_id.to_string(),
            template_id: ticket.template_id.to_string(),
            assigned_value: ticket.assigned_value.clone(),
            user_data: serde_json::to_string(&ticket.user_data)?,
            status: ticket.status.as_str().to_string(),
            last_scan_timestamp: ticket.last_scan_timestamp.map(encode_time),
            synced: local.synced,
        })
    }
}

impl TryFrom<TicketRow> for LocalTicket {
    type Error = Error;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(LocalTicket {
            ticket: Ticket {
                id: decode_uuid(&row.id)?,
                session_id: decode_uuid(&row.session_id)?,
                template_id: decode_uuid(&row.template_id)?,
                qr_code: row.qr_code,
                assigned_value: row.assigned_value,
                user_data: serde_json::from_str(&row.user_data)?,
                status: row.status.parse()?,
                last_scan_timestamp: row.last_scan_timestamp.as_deref().map(decode_time).transpose()?,
            },
            synced: row.synced,
        })
    }
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: String,
    ticket_format: String,
    required_user_fields: String,
}

impl TryFrom<TemplateRow> for TemplateSummary {
    type Error = Error;

    fn try_from(row: TemplateRow) -> Result<Self> {
        Ok(TemplateSummary {
            id: decode_uuid(&row.id)?,
            ticket_format: row.ticket_format.parse()?,
            required_user_fields: serde_json::from_str(&row.required_user_fields)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncLogRow {
    timestamp: String,
    ticket: String,
    error: String,
}

impl TryFrom<SyncLogRow> for SyncLogEntry {
    type Error = Error;

    fn try_from(row: SyncLogRow) -> Result<Self> {
        Ok(SyncLogEntry {
            timestamp: decode_time(&row.timestamp)?,
            ticket: row.ticket,
            error: row.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testing::MockAuthority;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_download_caches_tickets_and_templates() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let session = Uuid::new_v4();
        let template_id = authority.seed_session(session, &["AAA111", "BBB222"]);

        let summary = store.download(&authority, session, TIMEOUT).await.unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let ticket = store.get("AAA111").await.unwrap().unwrap();
        assert!(ticket.synced);
        assert_eq!(ticket.ticket.status, TicketStatus::Generated);
        assert!(ticket.ticket.last_scan_timestamp.is_none());
        assert!(ticket.ticket.user_data["family_size"].is_null());

        let template = store.get_template(template_id).await.unwrap().unwrap();
        assert_eq!(template.required_user_fields[0].key(), "family_size");
    }

    #[tokio::test]
    async fn test_second_download_replaces_first_session() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        authority.seed_session(a, &["AAA111", "AAA222"]);
        authority.seed_session(b, &["BBB111"]);

        store.download(&authority, a, TIMEOUT).await.unwrap();
        store.download(&authority, b, TIMEOUT).await.unwrap();

        let remaining = store.all_tickets().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.iter().all(|t| t.ticket.session_id == b));
        assert!(store.get("AAA111").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_store_untouched() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        authority.seed_session(a, &["AAA111"]);
        authority.seed_session(b, &["BBB111"]);
        store.download(&authority, a, TIMEOUT).await.unwrap();

        authority.go_offline();
        let err = store.download(&authority, b, TIMEOUT).await.unwrap_err();

        assert!(matches!(err, Error::DownloadFailed(AuthorityError::Transport(_))));
        assert!(store.get("AAA111").await.unwrap().is_some());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_session_download_keeps_cache() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let a = Uuid::new_v4();
        authority.seed_session(a, &["AAA111"]);
        store.download(&authority, a, TIMEOUT).await.unwrap();

        let summary = store.download(&authority, Uuid::new_v4(), TIMEOUT).await.unwrap();
        assert_eq!(summary.count, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_is_an_upsert_keyed_by_code() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let session = Uuid::new_v4();
        authority.seed_session(session, &["AAA111"]);
        store.download(&authority, session, TIMEOUT).await.unwrap();

        let mut ticket = store.get("AAA111").await.unwrap().unwrap();
        ticket.redeem(json!({"family_size": 4}).as_object().cloned().unwrap(), Utc::now());
        store.put(&ticket).await.unwrap();
        store.put(&ticket).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get("AAA111").await.unwrap().unwrap();
        assert_eq!(stored, ticket);
        assert_eq!(store.dirty_tickets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finish_sync_skips_tickets_rescanned_since_push() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let session = Uuid::new_v4();
        authority.seed_session(session, &["AAA111", "BBB222"]);
        store.download(&authority, session, TIMEOUT).await.unwrap();

        let mut pushed = Vec::new();
        for code in ["AAA111", "BBB222"] {
            let mut ticket = store.get(code).await.unwrap().unwrap();
            ticket.redeem(Default::default(), Utc::now());
            store.put(&ticket).await.unwrap();
            pushed.push(PushedTicket {
                qr_code: code.to_string(),
                last_scan_timestamp: ticket.ticket.last_scan_timestamp,
            });
        }

        // BBB222 is scanned again after its push went out.
        let mut rescanned = store.get("BBB222").await.unwrap().unwrap();
        rescanned.redeem(Default::default(), Utc::now() + chrono::Duration::seconds(1));
        store.put(&rescanned).await.unwrap();

        let failure = SyncLogEntry::new("CCC333", "boom");
        let marked = store.finish_sync(&pushed, &[failure.clone()]).await.unwrap();

        assert_eq!(marked, 1);
        assert!(store.get("AAA111").await.unwrap().unwrap().synced);
        assert!(!store.get("BBB222").await.unwrap().unwrap().synced);
        assert_eq!(store.sync_log().await.unwrap(), vec![failure]);
    }

    #[tokio::test]
    async fn test_store_file_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("gatepass-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("scanner.db");

        let authority = MockAuthority::default();
        let session = Uuid::new_v4();
        authority.seed_session(session, &["AAA111"]);

        let store = LocalStore::open(&path).await.unwrap();
        store.download(&authority, session, TIMEOUT).await.unwrap();
        store.close().await;

        let reopened = LocalStore::open(&path).await.unwrap();
        assert!(reopened.get("AAA111").await.unwrap().is_some());
        reopened.close().await;

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
