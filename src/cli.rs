//! CLI argument parsing for mistconv

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mistconv")]
#[command(version)]
#[command(about = "Convert Cuckoo behavior reports into MIST reports", long_about = None)]
pub struct Cli {
    /// Directory of configuration files (cuckoo_elements2mist.xml, cuckoo_types2mist.xml)
    #[arg(short = 'c', long = "confdir", value_name = "DIR", default_value = "conf")]
    pub confdir: PathBuf,

    /// Directory of Cuckoo behavior reports (*.json, *.gz)
    #[arg(short = 'i', long = "inputdir", value_name = "DIR", default_value = "reports")]
    pub inputdir: PathBuf,

    /// Directory where MIST reports are saved
    #[arg(short = 'o', long = "outputdir", value_name = "DIR", default_value = "reports")]
    pub outputdir: PathBuf,

    /// Number of worker threads (default: available processing units)
    #[arg(short = 'j', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Print a progress line per converted report
    #[arg(long = "progress")]
    pub progress: bool,

    /// Write log output to this file instead of stderr
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}
