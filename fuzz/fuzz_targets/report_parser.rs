#![no_main]

use libfuzzer_sys::fuzz_target;
use mistconv::abstraction::Abstraction;
use mistconv::config::{ArgumentSpec, DefaultValueTable, Rule, RuleTable};
use mistconv::normalizer;
use mistconv::report::Report;
use std::sync::LazyLock;

static RULES: LazyLock<RuleTable> = LazyLock::new(|| {
    let arg = |name: &str, abstraction| ArgumentSpec {
        name: name.to_string(),
        abstraction,
        max_len: 8,
    };
    let levels = |tokens: &[&str]| -> Vec<String> { tokens.iter().map(|t| t.to_string()).collect() };

    let mut rules = RuleTable::default();
    rules.insert(
        "file",
        "NtCreateFile",
        Rule::new(
            levels(&["01", "01"]),
            vec![arg("filepath", Abstraction::Path), arg("desired_access", Abstraction::Hex)],
        ),
    );
    rules.insert(
        "process",
        "NtAllocateVirtualMemory",
        Rule::new(
            levels(&["03", "02"]),
            vec![arg("region_size", Abstraction::Bucket), arg("protection", Abstraction::Integer)],
        ),
    );
    rules.insert_generic(
        "network",
        Rule::new(
            levels(&["04", "00"]),
            vec![arg("ip_address", Abstraction::Hash), arg("url", Abstraction::String)],
        ),
    );
    rules
});

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must either parse into a report or return an error,
    // never panic. A parsed report must convert to one line per call.
    if let Ok(report) = Report::from_slice(data) {
        let defaults = DefaultValueTable::default();
        let conversion = normalizer::convert(&report, &RULES, &defaults);
        assert_eq!(conversion.document.len(), report.call_count());
        let _ = conversion.document.render();
    }
});
