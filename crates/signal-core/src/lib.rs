pub mod error;
pub mod report;
pub mod stats;
pub mod store;
pub mod traits;
pub mod types;

pub use error::CoreError;
pub use report::BatchReport;
pub use store::MarketStore;
pub use traits::{ContentIngestionAdapter, QuoteProvider};
pub use types::*;
