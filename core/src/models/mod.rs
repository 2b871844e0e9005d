pub mod session;
pub mod sync_log;
pub mod template;
pub mod ticket;

pub use session::{NewSession, Session, SessionStatus};
pub use sync_log::SyncLogEntry;
pub use template::{
    FieldDefinition, FieldType, Template, TemplateSummary, TicketAllocation, TicketFormat,
};
pub use ticket::{LocalTicket, Ticket, TicketStatus, TicketUpdate};
