//! Behavior normalizer: report → MIST document
//!
//! Walks processes in report order and calls in recorded order, emitting
//! exactly one line per call. Nothing in here fails: unresolved calls use the
//! unknown sentinel, unusable arguments use the default token, and each
//! degradation is recorded as a [`ConversionWarning`].

use crate::config::{ArgumentSpec, ConversionTables, DefaultValueTable, RuleTable};
use crate::error::{ConversionWarning, Resolution};
use crate::mist::{MistDocument, MistLine};
use crate::report::{Call, Report};
use tracing::trace;

/// Result of converting one report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    pub document: MistDocument,
    pub warnings: Vec<ConversionWarning>,
}

/// Converts reports using a fixed pair of rule tables
#[derive(Debug, Clone, Copy)]
pub struct BehaviorNormalizer<'a> {
    rules: &'a RuleTable,
    defaults: &'a DefaultValueTable,
}

impl<'a> BehaviorNormalizer<'a> {
    pub fn new(rules: &'a RuleTable, defaults: &'a DefaultValueTable) -> Self {
        Self { rules, defaults }
    }

    pub fn from_tables(tables: &'a ConversionTables) -> Self {
        Self::new(&tables.rules, &tables.defaults)
    }

    /// Convert a whole report
    pub fn convert(&self, report: &Report) -> Conversion {
        let mut conversion = Conversion::default();

        if report.processes().is_empty() {
            conversion.warnings.push(ConversionWarning::EmptyReport);
            return conversion;
        }

        for (process_index, process) in report.processes().iter().enumerate() {
            for (call_index, call) in process.calls.iter().enumerate() {
                let line = self.convert_call(
                    call,
                    process_index,
                    call_index,
                    &mut conversion.warnings,
                );
                conversion.document.push(line);
            }
        }

        trace!(
            "Converted {} calls with {} warnings",
            conversion.document.len(),
            conversion.warnings.len()
        );
        conversion
    }

    /// Encode one call
    ///
    /// `process` and `call` are positions in the report, used only to locate
    /// warnings.
    pub fn convert_call(
        &self,
        call: &Call,
        process: usize,
        call_index: usize,
        warnings: &mut Vec<ConversionWarning>,
    ) -> MistLine {
        let (rule, resolution) = self.rules.resolve(&call.category, &call.api);
        if resolution != Resolution::Exact {
            warnings.push(ConversionWarning::RuleResolution {
                process,
                call: call_index,
                category: call.category.clone(),
                api: call.api.clone(),
                resolution,
            });
        }

        let arguments = rule
            .args
            .iter()
            .map(|spec| self.argument_token(call, spec, process, call_index, warnings))
            .collect();

        MistLine::new(rule.levels.clone(), arguments, resolution)
    }

    fn argument_token(
        &self,
        call: &Call,
        spec: &ArgumentSpec,
        process: usize,
        call_index: usize,
        warnings: &mut Vec<ConversionWarning>,
    ) -> String {
        let token = call
            .argument(&spec.name)
            .and_then(|value| spec.abstraction.apply(value, spec.max_len));

        token.unwrap_or_else(|| {
            warnings.push(ConversionWarning::ArgumentDefault {
                process,
                call: call_index,
                argument: spec.name.clone(),
                abstraction: spec.abstraction,
            });
            self.defaults.token_for(spec.abstraction).to_string()
        })
    }
}

/// Convert a report with the given tables
pub fn convert(report: &Report, rules: &RuleTable, defaults: &DefaultValueTable) -> Conversion {
    BehaviorNormalizer::new(rules, defaults).convert(report)
}
