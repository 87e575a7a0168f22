pub mod config;
pub mod csv_store;
pub mod error;
pub mod fetcher;
pub mod logger;

pub use error::DataIngestionError;
pub use fetcher::{Fundamentals, FundamentalsProvider, PriceProvider, PriceRow, PriceSeries};
