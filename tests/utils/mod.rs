// Integration test utilities
//
// Helpers for writing Cuckoo-style reports and configuration directories
// into temporary directories.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory with the configuration shipped in the repository
pub fn shipped_conf_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("conf")
}

/// A report with one process per entry of `calls_per_process`
///
/// Calls cycle through a small set of known and unknown apis so every
/// resolution path is exercised.
pub fn report_json(calls_per_process: &[usize]) -> Value {
    let processes: Vec<Value> = calls_per_process
        .iter()
        .enumerate()
        .map(|(p, &count)| {
            let calls: Vec<Value> = (0..count).map(|c| sample_call(p, c)).collect();
            json!({
                "pid": 1000 + p,
                "ppid": 4,
                "process_name": format!("proc{}.exe", p),
                "calls": calls,
            })
        })
        .collect();
    json!({ "behavior": { "processes": processes } })
}

fn sample_call(process: usize, call: usize) -> Value {
    match call % 4 {
        0 => json!({
            "category": "file",
            "api": "NtCreateFile",
            "arguments": {
                "filepath": format!("C:\\Users\\p{}\\file{}.txt", process, call),
                "desired_access": "0x80100080",
                "create_disposition": 1
            }
        }),
        1 => json!({
            "category": "registry",
            "api": "RegOpenKeyExW",
            "arguments": [
                {"name": "regkey", "value": "HKEY_LOCAL_MACHINE\\Software\\Run"},
                {"name": "access", "value": "0x00020019"}
            ]
        }),
        2 => json!({"category": "file", "api": "GetFileType", "arguments": {}}),
        _ => json!({"category": "exotic", "api": "Unheard", "arguments": {"x": 1}}),
    }
}

/// Write a plain JSON report
pub fn write_report(dir: &Path, name: &str, report: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, report.to_string()).unwrap();
    path
}

/// Write a gzip-compressed JSON report
pub fn write_gz_report(dir: &Path, name: &str, report: &Value) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(report.to_string().as_bytes()).unwrap();
    encoder.finish().unwrap();
    path
}

/// Write a file that is not a parsable report
pub fn write_broken_report(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "{\"behavior\": {\"processes\": [").unwrap();
    path
}
