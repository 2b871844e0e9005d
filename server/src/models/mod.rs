pub mod session;
pub mod template;
pub mod ticket;

pub use session::SessionRecord;
pub use template::{CreateTemplate, TemplateRecord};
pub use ticket::TicketRecord;
