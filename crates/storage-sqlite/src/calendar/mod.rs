//! Trading calendar storage.

mod model;
mod repository;

pub use model::CalendarEntryDB;
pub use repository::CalendarRepository;
