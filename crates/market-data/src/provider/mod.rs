//! Provider adapters.
//!
//! One module per upstream source, plus the trait they all implement.

mod capabilities;
mod traits;

pub mod eastmoney;
pub mod tushare;
pub mod yahoo;

pub use capabilities::{ProviderCapabilities, RateLimit};
pub use eastmoney::EastMoneyAdapter;
pub use traits::ProviderAdapter;
pub use tushare::TushareAdapter;
pub use yahoo::YahooAdapter;
