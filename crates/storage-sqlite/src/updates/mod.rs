//! Data-update audit trail storage.

mod model;
mod repository;

pub use model::DataUpdateDB;
pub use repository::UpdateRecordRepository;
