//! mistconv - Cuckoo behavior report to MIST converter
//!
//! This library converts sandbox behavior reports into MIST, a fixed-grammar
//! token format for downstream similarity and classification pipelines. Rule
//! tables are loaded once from TOML mapping documents, reports are normalized
//! call by call, and batches run on a fixed worker pool with per-file failure
//! isolation.

pub mod abstraction;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod mist;
pub mod module;
pub mod normalizer;
pub mod report;

pub use batch::{BatchOptions, BatchReport, WorkItem};
pub use config::{ConversionTables, DefaultValueTable, Rule, RuleTable};
pub use error::{ConfigError, ConversionError, ConversionWarning, Resolution};
pub use mist::{MistDocument, MistLine};
pub use normalizer::{convert, BehaviorNormalizer, Conversion};
pub use report::Report;
