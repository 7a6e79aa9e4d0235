//! Hosting adapter for analysis pipelines
//!
//! A host hands the module a configuration object with a `conf_dir` field,
//! then submits `id → input path` maps. Results come back through a
//! completion callback that is invoked exactly once per submission, even
//! when the module has no usable configuration.

use crate::batch::{self, BatchOptions, WorkItem};
use crate::config::{self, ConversionTables};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Host-supplied module configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Directory holding the two mapping documents
    #[serde(default)]
    pub conf_dir: Option<PathBuf>,

    /// Worker threads; defaults to available parallelism
    #[serde(default)]
    pub workers: Option<usize>,
}

impl ModuleConfig {
    pub fn with_conf_dir(conf_dir: impl Into<PathBuf>) -> Self {
        Self {
            conf_dir: Some(conf_dir.into()),
            workers: None,
        }
    }
}

/// Result handed to the completion callback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleResult {
    /// Output path per id; empty string when no output was produced
    pub outputs: BTreeMap<String, String>,

    /// Auxiliary messages per id
    pub notes: BTreeMap<String, Vec<String>>,
}

/// MIST conversion module
#[derive(Debug, Default)]
pub struct MistModule {
    conf_dir: Option<PathBuf>,
    tables: Option<ConversionTables>,
    options: BatchOptions,
}

impl MistModule {
    /// Create the module; a missing or invalid `conf_dir` leaves it
    /// unconfigured rather than failing
    pub fn new(config: Option<&ModuleConfig>) -> Self {
        let mut module = Self::default();
        match config {
            Some(config) if config.conf_dir.is_some() => module.change_config(config),
            _ => warn!("No conf_dir defined; MIST conversion disabled"),
        }
        module
    }

    /// Apply a new configuration
    ///
    /// Tables are reloaded when `conf_dir` changes, or when the previous load
    /// from the same directory failed.
    pub fn change_config(&mut self, config: &ModuleConfig) {
        if let Some(workers) = config.workers.filter(|w| *w > 0) {
            self.options.workers = workers;
        }

        let Some(conf_dir) = &config.conf_dir else {
            return;
        };
        if self.conf_dir.as_ref() == Some(conf_dir) && self.tables.is_some() {
            return;
        }

        self.conf_dir = Some(conf_dir.clone());
        match config::load(conf_dir) {
            Ok(tables) => {
                info!(
                    "Loaded {} MIST rules from {}",
                    tables.rules.len(),
                    conf_dir.display()
                );
                self.tables = Some(tables);
            }
            Err(e) => {
                warn!("MIST configuration unavailable: {}", e);
                self.tables = None;
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.tables.is_some()
    }

    pub fn conf_dir(&self) -> Option<&Path> {
        self.conf_dir.as_deref()
    }

    /// Convert the given inputs into `out_dir` and report through `callback`
    pub fn from_files<F>(&self, inputs: &BTreeMap<String, PathBuf>, out_dir: &Path, callback: F)
    where
        F: FnOnce(ModuleResult),
    {
        callback(self.convert(inputs, out_dir));
    }

    /// Convert the given inputs into `out_dir`
    pub fn convert(&self, inputs: &BTreeMap<String, PathBuf>, out_dir: &Path) -> ModuleResult {
        let Some(tables) = &self.tables else {
            error!("MIST rule tables not loaded; returning empty results");
            let note = vec!["MIST configuration unavailable".to_string()];
            return ModuleResult {
                outputs: inputs.keys().map(|id| (id.clone(), String::new())).collect(),
                notes: inputs.keys().map(|id| (id.clone(), note.clone())).collect(),
            };
        };

        let items: Vec<WorkItem> = inputs
            .iter()
            .map(|(id, path)| WorkItem::new(id.clone(), path.clone()))
            .collect();
        let report = batch::run(&items, out_dir, tables, &self.options);

        let mut result = ModuleResult::default();
        for id in inputs.keys() {
            let output = report
                .outputs
                .get(id)
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            result.outputs.insert(id.clone(), output);
        }
        for (id, message) in report.warnings {
            result.notes.entry(id).or_default().push(message);
        }
        for (id, warnings) in report.notes {
            result
                .notes
                .entry(id)
                .or_default()
                .extend(warnings.iter().map(ToString::to_string));
        }
        result
    }
}
