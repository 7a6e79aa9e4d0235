//! Cuckoo behavior report model
//!
//! Only the parts the converter walks are modeled: `behavior.processes[]`,
//! each with its ordered `calls[]`. Both Cuckoo layouts are accepted
//! (`pid`/`ppid` or `process_id`/`parent_id`; arguments as an object or as a
//! list of `{name, value}` pairs). A malformed call never fails the report;
//! it becomes a call without category or api and is encoded as unknown.

use crate::error::ConversionError;
use flate2::read::GzDecoder;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A sandbox behavior report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Report {
    #[serde(default)]
    pub behavior: Behavior,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub processes: Vec<Process>,
}

/// One monitored process and its calls in recorded order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Process {
    #[serde(default, alias = "pid", deserialize_with = "lenient_id")]
    pub process_id: Option<u64>,

    #[serde(default, alias = "ppid", deserialize_with = "lenient_id")]
    pub parent_id: Option<u64>,

    #[serde(default)]
    pub process_name: Option<String>,

    #[serde(default)]
    pub calls: Vec<Call>,
}

/// One observed API call
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct Call {
    pub category: String,
    pub api: String,
    pub arguments: BTreeMap<String, Value>,
}

impl Call {
    pub fn new(category: &str, api: &str) -> Self {
        Self {
            category: category.to_string(),
            api: api.to_string(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, name: &str, value: Value) -> Self {
        self.arguments.insert(name.to_string(), value);
        self
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

impl From<Value> for Call {
    fn from(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return Call::default();
        };

        let text = |v: Option<Value>| match v {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let category = text(fields.remove("category"));
        let api = text(fields.remove("api"));

        let arguments = match fields.remove("arguments") {
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(Value::Array(list)) => list
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(mut pair) => match pair.remove("name") {
                        Some(Value::String(name)) => {
                            Some((name, pair.remove("value").unwrap_or(Value::Null)))
                        }
                        _ => None,
                    },
                    _ => None,
                })
                .collect(),
            _ => BTreeMap::new(),
        };

        Call {
            category,
            api,
            arguments,
        }
    }
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

impl Report {
    /// Parse a report from JSON bytes
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn processes(&self) -> &[Process] {
        &self.behavior.processes
    }

    /// Total number of calls over all processes
    pub fn call_count(&self) -> usize {
        self.behavior.processes.iter().map(|p| p.calls.len()).sum()
    }
}

/// Whether a path names a gzip-compressed report
pub fn is_compressed(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Read and parse a report, decompressing `.gz` input
pub fn load_report(path: &Path) -> Result<Report, ConversionError> {
    let read_error = |source| ConversionError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(read_error)?;
    let mut data = Vec::new();
    if is_compressed(path) {
        GzDecoder::new(BufReader::new(file))
            .read_to_end(&mut data)
            .map_err(read_error)?;
    } else {
        BufReader::new(file)
            .read_to_end(&mut data)
            .map_err(read_error)?;
    }

    Report::from_slice(&data).map_err(|source| ConversionError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_cuckoo2_layout() {
        let data = json!({
            "behavior": {
                "processes": [{
                    "pid": 1204,
                    "ppid": 812,
                    "process_name": "a.exe",
                    "calls": [
                        {"category": "file", "api": "CreateFile",
                         "arguments": {"filepath": "C:\\temp\\a.exe"}},
                        {"category": "process", "api": "ExitProcess", "arguments": {}}
                    ]
                }]
            }
        });
        let report = Report::from_slice(data.to_string().as_bytes()).unwrap();

        assert_eq!(report.processes().len(), 1);
        let process = &report.processes()[0];
        assert_eq!(process.process_id, Some(1204));
        assert_eq!(process.parent_id, Some(812));
        assert_eq!(process.calls[0].api, "CreateFile");
        assert_eq!(
            process.calls[0].argument("filepath"),
            Some(&json!("C:\\temp\\a.exe"))
        );
        assert_eq!(report.call_count(), 2);
    }

    #[test]
    fn test_parse_cuckoo1_layout() {
        let data = json!({
            "behavior": {
                "processes": [{
                    "process_id": "1204",
                    "parent_id": 4,
                    "calls": [{
                        "category": "registry",
                        "api": "RegOpenKeyExA",
                        "arguments": [
                            {"name": "SubKey", "value": "Software\\Run"},
                            {"name": "Handle", "value": "0x00000080"},
                            {"value": "nameless"}
                        ]
                    }]
                }]
            }
        });
        let report = Report::from_slice(data.to_string().as_bytes()).unwrap();
        let process = &report.processes()[0];

        assert_eq!(process.process_id, Some(1204));
        assert_eq!(process.calls[0].arguments.len(), 2);
        assert_eq!(process.calls[0].argument("Handle"), Some(&json!("0x00000080")));
    }

    #[test]
    fn test_malformed_call_degrades() {
        let data = json!({"behavior": {"processes": [{"calls": [42, {"api": 7}]}]}});
        let report = Report::from_slice(data.to_string().as_bytes()).unwrap();
        let calls = &report.processes()[0].calls;

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::default());
        assert_eq!(calls[1].api, "");
    }

    #[test]
    fn test_missing_behavior_is_empty() {
        let report = Report::from_slice(b"{\"info\": {}}").unwrap();
        assert!(report.processes().is_empty());
    }

    #[test]
    fn test_structural_failures() {
        assert!(Report::from_slice(b"{\"behavior\": {\"processes\": 3}}").is_err());
        assert!(Report::from_slice(b"{\"behavior\": {\"processes\": [1]}}").is_err());
        assert!(Report::from_slice(b"{\"behavior\": {\"processes\": [{\"calls\": {}}]}}").is_err());
        assert!(Report::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_load_compressed_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.json.gz");
        let body = json!({"behavior": {"processes": [{"calls": [{"category": "file", "api": "ReadFile"}]}]}});

        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(body.to_string().as_bytes()).unwrap();
        encoder.finish().unwrap();

        let report = load_report(&path).unwrap();
        assert_eq!(report.call_count(), 1);
    }

    #[test]
    fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_report(&missing), Err(ConversionError::Read { .. })));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{\"behavior\": ").unwrap();
        assert!(matches!(load_report(&broken), Err(ConversionError::Parse { .. })));

        let not_gzip = dir.path().join("plain.gz");
        std::fs::write(&not_gzip, "{}").unwrap();
        assert!(matches!(load_report(&not_gzip), Err(ConversionError::Read { .. })));
    }
}
