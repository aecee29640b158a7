//! Domain core of the QuoteHub market-quote platform.
//!
//! Everything between the provider layer and the storage layer lives here:
//! the persisted domain models, the store traits storage must implement,
//! and the services that do the actual work:
//!
//! ```text
//!                quotehub-market-data (providers, routing)
//!                           │
//!                           ▼
//!   calendar ◄──── MarketDataService ────► quality stage
//!       │                   │                   │
//!       └──► DownloadPlanner┴►PipelineOrchestrator──► store traits
//!                           │                   ▲
//!                       GapEngine ──────────────┘
//! ```
//!
//! The crate is storage-agnostic: all persistence goes through the traits
//! in [`store`], implemented by `quotehub-storage-sqlite`.

pub mod calendar;
pub mod config;
pub mod constants;
pub mod errors;
pub mod gaps;
pub mod market_data;
pub mod models;
pub mod pipeline;
pub mod quality;
pub mod quotes;
pub mod reports;
pub mod store;
pub mod time;

pub use errors::{DatabaseError, Error, Result};

// Re-exported so downstream crates name instruments and exchanges through
// the core rather than reaching into the provider crate.
pub use quotehub_market_data::{Exchange, InstrumentId};
