//! Ticket issuance and the offline redemption cache for gatepass.
//!
//! The authoritative side uses [`issuance`] to turn a template and a new
//! session into a ticket batch. A scanning device keeps a [`LocalStore`],
//! redeems through [`ScanEngine`] without any network access and later
//! reconciles with [`SyncEngine`].

pub mod authority;
pub mod clock;
pub mod codegen;
pub mod error;
pub mod issuance;
pub mod models;
pub mod scan;
pub mod slug;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod testing;

pub use authority::TicketAuthority;
pub use clock::ClockTime;
pub use error::{AuthorityError, Error, Result};
pub use issuance::{IssuedSession, PreparedIssue, TicketIssuer};
pub use scan::{FieldPrompt, ScanEngine, ScanPrompt};
pub use storage::{DownloadSummary, LocalStore};
pub use sync::{SyncEngine, SyncSummary};
