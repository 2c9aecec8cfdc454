// Re-exports
pub use column_names as COL;
pub use pipeline::{Pipeline, PipelineSummary};

// Modules
pub mod cleaning;
pub mod column_names;
pub mod config;
pub mod country;
pub mod error;
pub mod export;
pub mod geo;
pub mod loader;
pub mod parquet;
pub mod pipeline;
pub mod plot;
pub mod table;
pub mod trend;
