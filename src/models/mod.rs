//! Data Models
//!
//! Run configuration and dataset records.

pub mod config;
pub mod dataset;

pub use config::{
    ConfigOverrides, ExecutionConfig, OracleConfig, OutputConfig, PhaseStrategy, SynthesisConfig,
};
pub use dataset::{load_dataset, parse_dataset, trim_localized_code, DatasetInstance};
