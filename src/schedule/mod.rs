//! Expansion of recurring schedules into dated routine instances.

pub mod expander;
pub mod holidays;

pub use expander::{
    schedule_instance_id, weekday_index, ExpansionReport, Recurrence, ScheduleExpander,
};
pub use holidays::HolidayCalendar;
