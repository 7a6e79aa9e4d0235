//! MIST document and line grammar
//!
//! A line is the rule's level tokens joined by single spaces, the section
//! separator ` |`, then each argument token preceded by a single space:
//!
//! ```text
//! 02 03 01 | 9c1b0a47
//! 02 00 00 |
//! ```
//!
//! Every line, including the last, ends with `\n`. Downstream consumers parse
//! this byte-for-byte.

use crate::error::Resolution;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Separator between level tokens and argument tokens
pub const SECTION_SEPARATOR: &str = " |";

/// Separator between tokens within a section
pub const TOKEN_SEPARATOR: char = ' ';

/// Extension of written MIST reports
pub const MIST_EXTENSION: &str = "mist";

/// Encoding of one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MistLine {
    pub levels: Vec<String>,
    pub arguments: Vec<String>,
    pub resolution: Resolution,
}

impl MistLine {
    pub fn new(levels: Vec<String>, arguments: Vec<String>, resolution: Resolution) -> Self {
        Self {
            levels,
            arguments,
            resolution,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.resolution == Resolution::Unknown
    }

    /// All tokens in emission order
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.levels
            .iter()
            .chain(self.arguments.iter())
            .map(String::as_str)
    }
}

impl fmt::Display for MistLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, level) in self.levels.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", TOKEN_SEPARATOR)?;
            }
            f.write_str(level)?;
        }
        f.write_str(SECTION_SEPARATOR)?;
        for argument in &self.arguments {
            write!(f, "{}{}", TOKEN_SEPARATOR, argument)?;
        }
        Ok(())
    }
}

/// Ordered lines of one converted report
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MistDocument {
    lines: Vec<MistLine>,
}

impl MistDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: MistLine) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[MistLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of lines encoded with the unknown sentinel
    pub fn unknown_count(&self) -> usize {
        self.lines.iter().filter(|l| l.is_unknown()).count()
    }

    /// Write all lines, each terminated by `\n`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        for line in &self.lines {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    /// Render the document as it is written to disk
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.to_string());
            out.push('\n');
        }
        out
    }

    /// Create or truncate `path` and write the document
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}
