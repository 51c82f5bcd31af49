pub mod gcal;
pub use gcal::{CalendarClient, CalendarError};
