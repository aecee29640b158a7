//! Daily quote storage.

mod model;
mod repository;

pub use model::QuoteDB;
pub use repository::QuoteRepository;
