//! genomen-common: Shared entities, errors, and configuration used across all GenOmen crates.

pub mod config;
pub mod entities;
pub mod error;

// Re-export commonly used types
pub use config::{Config, ReportConfig, SchedulerConfig, TaskConfig};
pub use entities::{DataSet, EffectType, Rule, Sample, TraitInfo};
pub use error::{GenomenError, Result};
