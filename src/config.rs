//! Mapping document loader
//!
//! A configuration directory holds two mapping documents:
//!
//! - `cuckoo_elements2mist.xml` maps (category, api) pairs to MIST rules
//! - `cuckoo_types2mist.xml` maps abstraction types to fallback tokens
//!
//! When an XML document is absent, its TOML counterpart (`elements2mist.toml`,
//! `types2mist.toml`) is read instead. Both are parsed into validated,
//! immutable tables once. A malformed entry is skipped with a warning; only a
//! missing directory, a missing document or a document that does not parse
//! at all fails the load.
//!
//! # Example XML
//! ```xml
//! <elements2mist>
//!   <unknown levels="ff ff"/>
//!   <file levels="02 00 00">
//!     <CreateFile levels="02 03 01">
//!       <arg name="filepath" type="path"/>
//!     </CreateFile>
//!   </file>
//! </elements2mist>
//! ```
//!
//! A category element's own `levels` attribute is its generic rule. The
//! explicit forms `<category name="..">` and `<api name="..">` are accepted
//! for names that are not valid element names.
//!
//! # Example TOML
//! ```toml
//! [unknown]
//! levels = ["ff", "ff"]
//!
//! [[rule]]
//! category = "file"
//! api = "CreateFile"
//! levels = ["02", "03", "01"]
//! args = [{ name = "filepath", type = "path" }]
//!
//! [[rule]]
//! category = "file"
//! levels = ["02", "00", "00"]
//! ```

use crate::abstraction::{Abstraction, DEFAULT_MAX_LEN, FALLBACK_TOKEN};
use crate::error::{ConfigError, Resolution};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the rule document inside a configuration directory
pub const RULES_DOCUMENT: &str = "cuckoo_elements2mist.xml";

/// File name of the default-value document inside a configuration directory
pub const DEFAULTS_DOCUMENT: &str = "cuckoo_types2mist.xml";

/// TOML rule document, read when [`RULES_DOCUMENT`] is absent
pub const RULES_TOML_DOCUMENT: &str = "elements2mist.toml";

/// TOML default-value document, read when [`DEFAULTS_DOCUMENT`] is absent
pub const DEFAULTS_TOML_DOCUMENT: &str = "types2mist.toml";

/// Level tokens of the unknown sentinel unless the rule document overrides them
pub const DEFAULT_UNKNOWN_LEVELS: [&str; 2] = ["ff", "ff"];

/// Wildcard api name marking a category-level generic rule
const GENERIC_API: &str = "*";

/// One argument to extract from a call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArgumentSpec {
    /// Argument name in the report
    pub name: String,

    /// Abstraction applied to the raw value
    #[serde(rename = "type")]
    pub abstraction: Abstraction,

    /// Truncation length for `string` arguments
    #[serde(default = "default_max_len")]
    pub max_len: usize,
}

fn default_max_len() -> usize {
    DEFAULT_MAX_LEN
}

/// Encoding of one (category, api) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Coarse-to-fine classification codes
    pub levels: Vec<String>,
    /// Ordered argument specs
    pub args: Vec<ArgumentSpec>,
}

impl Rule {
    pub fn new(levels: Vec<String>, args: Vec<ArgumentSpec>) -> Self {
        Self { levels, args }
    }

    fn unknown_sentinel() -> Self {
        Self::new(
            DEFAULT_UNKNOWN_LEVELS.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct RuleEntry {
    category: String,
    #[serde(default)]
    api: Option<String>,
    levels: Vec<String>,
    #[serde(default)]
    args: Vec<ArgumentSpec>,
}

#[derive(Debug, Deserialize)]
struct UnknownEntry {
    levels: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct CategoryRules {
    apis: HashMap<String, Rule>,
    generic: Option<Rule>,
}

/// Rule lookup: exact match, then category generic, then the unknown sentinel
#[derive(Debug, Clone)]
pub struct RuleTable {
    categories: HashMap<String, CategoryRules>,
    unknown: Rule,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            categories: HashMap::new(),
            unknown: Rule::unknown_sentinel(),
        }
    }
}

impl RuleTable {
    /// Parse a rule document
    ///
    /// Returns the table and one message per skipped entry.
    pub fn from_toml(content: &str) -> Result<(Self, Vec<String>), String> {
        let doc: toml::Table = content.parse().map_err(|e: toml::de::Error| e.to_string())?;
        let mut table = Self::default();
        let mut skipped = Vec::new();

        if let Some(value) = doc.get("unknown") {
            match value.clone().try_into::<UnknownEntry>() {
                Ok(entry) => match validate_levels(&entry.levels) {
                    Ok(()) => table.unknown = Rule::new(entry.levels, Vec::new()),
                    Err(e) => skipped.push(format!("[unknown]: {}", e)),
                },
                Err(e) => skipped.push(format!("[unknown]: {}", e)),
            }
        }

        let entries = match doc.get("rule") {
            None => return Ok((table, skipped)),
            Some(toml::Value::Array(entries)) => entries,
            Some(_) => return Err("'rule' must be an array of tables".to_string()),
        };

        for (index, value) in entries.iter().enumerate() {
            if let Err(e) = table.insert_entry(value) {
                skipped.push(format!("rule #{}: {}", index + 1, e));
            }
        }

        Ok((table, skipped))
    }

    /// Parse an XML rule document
    ///
    /// Returns the table and one message per skipped entry.
    pub fn from_xml(content: &str) -> Result<(Self, Vec<String>), String> {
        let doc = roxmltree::Document::parse(content).map_err(|e| e.to_string())?;
        let mut table = Self::default();
        let mut skipped = Vec::new();

        for node in doc.root_element().children().filter(|n| n.is_element()) {
            if node.has_tag_name("unknown") {
                let levels = xml_levels(node).and_then(|levels| {
                    validate_levels(&levels)?;
                    Ok(levels)
                });
                match levels {
                    Ok(levels) => table.unknown = Rule::new(levels, Vec::new()),
                    Err(e) => skipped.push(format!("<unknown>: {}", e)),
                }
                continue;
            }

            let category = xml_name(node, "category");
            if has_levels(node) {
                let result = xml_entry(node, &category, None).and_then(|e| table.insert_rule(e));
                if let Err(e) = result {
                    skipped.push(format!("<{}>: {}", category, e));
                }
            }

            let apis = node
                .children()
                .filter(|n| n.is_element() && !n.has_tag_name("arg"));
            for api_node in apis {
                let api = xml_name(api_node, "api");
                let result = xml_entry(api_node, &category, Some(api.clone()))
                    .and_then(|e| table.insert_rule(e));
                if let Err(e) = result {
                    skipped.push(format!("<{}/{}>: {}", category, api, e));
                }
            }
        }

        Ok((table, skipped))
    }

    fn insert_entry(&mut self, value: &toml::Value) -> Result<(), String> {
        let entry: RuleEntry = value.clone().try_into().map_err(|e| e.to_string())?;
        self.insert_rule(entry)
    }

    fn insert_rule(&mut self, entry: RuleEntry) -> Result<(), String> {
        if entry.category.is_empty() {
            return Err("empty category".to_string());
        }
        if entry.api.as_deref() == Some("") {
            return Err("empty api".to_string());
        }
        validate_levels(&entry.levels)?;
        if let Some(spec) = entry.args.iter().find(|s| s.name.is_empty()) {
            return Err(format!("argument spec with empty name ({})", spec.abstraction));
        }

        let rule = Rule::new(entry.levels, entry.args);
        let category = self.categories.entry(entry.category.clone()).or_default();
        match entry.api.as_deref() {
            None | Some(GENERIC_API) => {
                if category.generic.is_some() {
                    return Err(format!("duplicate generic rule for '{}'", entry.category));
                }
                category.generic = Some(rule);
            }
            Some(api) => {
                if category.apis.contains_key(api) {
                    return Err(format!("duplicate rule for '{}/{}'", entry.category, api));
                }
                category.apis.insert(api.to_string(), rule);
            }
        }
        Ok(())
    }

    /// Add an exact rule
    pub fn insert(&mut self, category: &str, api: &str, rule: Rule) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .apis
            .insert(api.to_string(), rule);
    }

    /// Add a category-level generic rule
    pub fn insert_generic(&mut self, category: &str, rule: Rule) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .generic = Some(rule);
    }

    /// Find the rule for a call
    pub fn resolve(&self, category: &str, api: &str) -> (&Rule, Resolution) {
        if let Some(rules) = self.categories.get(category) {
            if let Some(rule) = rules.apis.get(api) {
                return (rule, Resolution::Exact);
            }
            if let Some(rule) = &rules.generic {
                return (rule, Resolution::Generic);
            }
        }
        (&self.unknown, Resolution::Unknown)
    }

    /// The unknown sentinel rule
    pub fn unknown(&self) -> &Rule {
        &self.unknown
    }

    /// Number of exact and generic rules
    pub fn len(&self) -> usize {
        self.categories
            .values()
            .map(|c| c.apis.len() + usize::from(c.generic.is_some()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fallback tokens per abstraction type
#[derive(Debug, Clone, Default)]
pub struct DefaultValueTable {
    tokens: HashMap<Abstraction, String>,
}

impl DefaultValueTable {
    /// Parse a default-value document
    ///
    /// Keys are abstraction names; the legacy `type_` prefix is accepted.
    pub fn from_toml(content: &str) -> Result<(Self, Vec<String>), String> {
        let doc: toml::Table = content.parse().map_err(|e: toml::de::Error| e.to_string())?;
        let mut table = Self::default();
        let mut skipped = Vec::new();

        for (key, value) in &doc {
            let result = match value.as_str() {
                Some(token) => table.insert_entry(key, token),
                None => Err("value must be a string".to_string()),
            };
            if let Err(e) = result {
                skipped.push(format!("default '{}': {}", key, e));
            }
        }

        Ok((table, skipped))
    }

    /// Parse an XML default-value document
    ///
    /// Each child of the root is one default: `<type_path>00000000</type_path>`
    /// or `<type name="path">00000000</type>`.
    pub fn from_xml(content: &str) -> Result<(Self, Vec<String>), String> {
        let doc = roxmltree::Document::parse(content).map_err(|e| e.to_string())?;
        let mut table = Self::default();
        let mut skipped = Vec::new();

        for node in doc.root_element().children().filter(|n| n.is_element()) {
            let key = xml_name(node, "type");
            let token = node.text().map(str::trim).unwrap_or_default();
            if let Err(e) = table.insert_entry(&key, token) {
                skipped.push(format!("default '{}': {}", key, e));
            }
        }

        Ok((table, skipped))
    }

    fn insert_entry(&mut self, key: &str, token: &str) -> Result<(), String> {
        let name = key.strip_prefix("type_").unwrap_or(key);
        let abstraction = name.parse::<Abstraction>()?;
        validate_token(token)?;
        self.tokens.insert(abstraction, token.to_string());
        Ok(())
    }

    pub fn insert(&mut self, abstraction: Abstraction, token: &str) {
        self.tokens.insert(abstraction, token.to_string());
    }

    /// Fallback token for an abstraction type
    pub fn token_for(&self, abstraction: Abstraction) -> &str {
        self.tokens
            .get(&abstraction)
            .map(String::as_str)
            .unwrap_or(FALLBACK_TOKEN)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Immutable configuration shared by every conversion of a run
#[derive(Debug, Clone, Default)]
pub struct ConversionTables {
    pub rules: RuleTable,
    pub defaults: DefaultValueTable,
    skipped: Vec<String>,
}

impl ConversionTables {
    pub fn new(rules: RuleTable, defaults: DefaultValueTable) -> Self {
        Self {
            rules,
            defaults,
            skipped: Vec::new(),
        }
    }

    /// Entries dropped during load, one message each
    pub fn skipped_entries(&self) -> &[String] {
        &self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Xml,
    Toml,
}

/// Load both mapping documents from a configuration directory
pub fn load<P: AsRef<Path>>(dir: P) -> Result<ConversionTables, ConfigError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(ConfigError::MissingDirectory(dir.to_path_buf()));
    }

    let (rules_path, format) = locate_document(dir, RULES_DOCUMENT, RULES_TOML_DOCUMENT)?;
    let content = read_document(&rules_path)?;
    let parsed = match format {
        DocumentFormat::Xml => RuleTable::from_xml(&content),
        DocumentFormat::Toml => RuleTable::from_toml(&content),
    };
    let (rules, mut skipped) = parsed.map_err(|message| ConfigError::Parse {
        path: rules_path.clone(),
        message,
    })?;

    let (defaults_path, format) =
        locate_document(dir, DEFAULTS_DOCUMENT, DEFAULTS_TOML_DOCUMENT)?;
    let content = read_document(&defaults_path)?;
    let parsed = match format {
        DocumentFormat::Xml => DefaultValueTable::from_xml(&content),
        DocumentFormat::Toml => DefaultValueTable::from_toml(&content),
    };
    let (defaults, skipped_defaults) = parsed.map_err(|message| ConfigError::Parse {
        path: defaults_path.clone(),
        message,
    })?;
    skipped.extend(skipped_defaults);

    for message in &skipped {
        warn!("Skipping malformed mapping entry in {}: {}", dir.display(), message);
    }
    debug!(
        "Loaded {} rules from {} and {} default tokens from {}",
        rules.len(),
        rules_path.display(),
        defaults.len(),
        defaults_path.display()
    );

    Ok(ConversionTables {
        rules,
        defaults,
        skipped,
    })
}

/// XML document if present, else its TOML counterpart
fn locate_document(
    dir: &Path,
    xml_name: &str,
    toml_name: &str,
) -> Result<(PathBuf, DocumentFormat), ConfigError> {
    let xml_path = dir.join(xml_name);
    if xml_path.is_file() {
        return Ok((xml_path, DocumentFormat::Xml));
    }
    let toml_path = dir.join(toml_name);
    if toml_path.is_file() {
        return Ok((toml_path, DocumentFormat::Toml));
    }
    Err(ConfigError::MissingDocument(xml_path))
}

fn read_document(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })
}

/// Element name, or its `name` attribute for the explicit `<tag name="..">` form
fn xml_name(node: roxmltree::Node<'_, '_>, explicit_tag: &str) -> String {
    if node.has_tag_name(explicit_tag) {
        node.attribute("name").unwrap_or_default().to_string()
    } else {
        node.tag_name().name().to_string()
    }
}

fn has_levels(node: roxmltree::Node<'_, '_>) -> bool {
    node.has_attribute("levels") || node.has_attribute("mist")
}

/// Whitespace-separated level tokens from `levels` (or `mist`)
fn xml_levels(node: roxmltree::Node<'_, '_>) -> Result<Vec<String>, String> {
    node.attribute("levels")
        .or_else(|| node.attribute("mist"))
        .map(|raw| raw.split_whitespace().map(str::to_string).collect())
        .ok_or_else(|| "missing levels attribute".to_string())
}

fn xml_entry(
    node: roxmltree::Node<'_, '_>,
    category: &str,
    api: Option<String>,
) -> Result<RuleEntry, String> {
    let levels = xml_levels(node)?;
    let mut args = Vec::new();
    for arg in node.children().filter(|n| n.has_tag_name("arg")) {
        let name = arg.attribute("name").unwrap_or_default().to_string();
        let abstraction = arg
            .attribute("type")
            .ok_or_else(|| format!("argument '{}' has no type", name))?
            .parse::<Abstraction>()?;
        let max_len = match arg.attribute("max_len") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| format!("argument '{}' max_len: {}", name, e))?,
            None => DEFAULT_MAX_LEN,
        };
        args.push(ArgumentSpec {
            name,
            abstraction,
            max_len,
        });
    }
    Ok(RuleEntry {
        category: category.to_string(),
        api,
        levels,
        args,
    })
}

fn validate_levels(levels: &[String]) -> Result<(), String> {
    if levels.is_empty() {
        return Err("levels must not be empty".to_string());
    }
    levels.iter().try_for_each(|level| validate_token(level))
}

/// Tokens are emitted verbatim, so they must not break the line grammar
fn validate_token(token: &str) -> Result<(), String> {
    if token.is_empty() {
        return Err("empty token".to_string());
    }
    if token.chars().any(|c| c.is_whitespace() || c == '|') {
        return Err(format!("token '{}' contains whitespace or '|'", token));
    }
    Ok(())
}
