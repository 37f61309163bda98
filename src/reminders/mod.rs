pub mod dispatcher;
pub mod model;
pub mod pg;
pub mod service;
pub mod store;

pub use dispatcher::{DispatchStats, Dispatcher};
pub use model::{ChatType, Reminder, ReminderStatus, Source};
pub use pg::PgReminderStore;
pub use service::{generate_id, CancelOutcome, ReminderService};
pub use store::ReminderStore;
