pub mod calendar;
pub use calendar::{CalendarToolCall, CalendarToolbox};
