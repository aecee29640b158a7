//! Model types crossing the provider boundary.

mod exchange;
mod instrument;
mod quote;

pub use exchange::Exchange;
pub use instrument::InstrumentId;
pub use quote::{CalendarDay, ProviderInstrument, RawDailyQuote};
