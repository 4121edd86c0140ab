//! Configuration loading and management.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest to lowest):
//!
//! 1. Environment variables
//! 2. `.sqlguard.toml` in the current directory
//! 3. `~/.config/sqlguard/config.toml`
//! 4. Default values
//!
//! # Configuration File Format
//!
//! ```toml
//! [parser]
//! cache_capacity = 1000
//!
//! [dedup]
//! enabled = true
//! ttl_ms = 100
//!
//! [rules]
//! disabled = ["pagination.large-page-size"]
//! denied_tables = ["sys_*", "pg_catalog.*"]
//! read_only_tables = ["audit_log"]
//! blacklist_fields = ["ssn", "password"]
//! whitelist_fields = []
//! dangerous_functions = ["xp_cmdshell", "load_file", "into outfile"]
//!
//! [rules.severity]
//! no-where = "critical"
//!
//! # Per-rule overrides key off the rule's stable id (see
//! # `RuleChecker::id`); any field left unset falls back to the group-level
//! # default above, then to the checker's own built-in default.
//! [rules.deep-offset]
//! enabled = true
//! max-offset = 10000
//! exemptions = ["reporting.*"]
//!
//! [rules.no-pagination]
//! limiting-field-patterns = ["*_id", "uuid"]
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Description |
//! |----------|-------------|
//! | `SQLGUARD_DEDUP_TTL_MS` | Overrides `dedup.ttl_ms` |
//! | `SQLGUARD_CACHE_CAPACITY` | Overrides `parser.cache_capacity` |

use std::{collections::HashMap, env, fs, path::PathBuf};

use serde::Deserialize;

use crate::error::{AppResult, config_error};

/// Top-level application configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub strictness: Strictness,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub dedup:  DedupConfig,
    #[serde(default)]
    pub rules:  RulesConfig
}

/// Controls how the validator reacts to a parser failure (spec §4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strictness {
    /// A parse failure surfaces as a CRITICAL "parse failure" violation and
    /// no checker runs (there is no AST to check).
    Strict,
    /// A parse failure is downgraded to a LOW violation; validation
    /// continues against an empty AST, so most checkers become no-ops.
    Lenient
}

impl Default for Strictness {
    fn default() -> Self {
        Self::Strict
    }
}

/// AST facade configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    /// Maximum number of distinct SQL strings kept in the parse cache.
    pub cache_capacity: usize
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000
        }
    }
}

/// Thread-local deduplication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    pub enabled: bool,
    pub ttl_ms:  u64
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_ms:  100
        }
    }
}

/// Rule checker configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RulesConfig {
    /// Disabled rule IDs (e.g. `"PAG003"`).
    #[serde(default)]
    pub disabled: Vec<String>,
    /// Risk-level overrides, keyed by rule ID.
    #[serde(default)]
    pub severity: HashMap<String, String>,
    /// Glob patterns (`*` matches one path segment) of tables that must
    /// never be referenced.
    #[serde(default)]
    pub denied_tables: Vec<String>,
    /// Tables that may be read but never mutated.
    #[serde(default)]
    pub read_only_tables: Vec<String>,
    /// Column names that must never appear bare in a WHERE clause.
    #[serde(default)]
    pub blacklist_fields: Vec<String>,
    /// When non-empty, WHERE clauses must reference only these columns.
    #[serde(default)]
    pub whitelist_fields: Vec<String>,
    /// Function or procedure names treated as dangerous (case-insensitive).
    #[serde(default)]
    pub dangerous_functions: Vec<String>,
    /// Glob patterns of application names exempt from the pagination group.
    #[serde(default)]
    pub pagination_exempt: Vec<String>,
    /// Per-rule overrides keyed by the checker's stable id
    /// (`"no-where"`, `"deep-offset"`, ...). Any TOML sub-table under
    /// `[rules]` whose key is not one of the named fields above lands here.
    #[serde(default, flatten)]
    pub by_rule: HashMap<String, RuleOverride>
}

/// One checker's overridable settings. Every field is optional; an absent
/// field falls back to the checker's built-in default.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuleOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Raw strategy override (`"block"` / `"warn"` / `"log"`); interpreted
    /// by `sqlguard-runtime`, which owns strategy enforcement — the core
    /// only carries the value through.
    #[serde(default)]
    pub strategy: Option<String>,
    /// Origin-id glob patterns exempt from this checker entirely (spec §6,
    /// `rules.<rule-id>.exemptions`). Matched against
    /// [`crate::context::StatementContext::origin_id`] with
    /// [`crate::glob::SegmentedGlobSet`] semantics (`*` = non-separator run).
    #[serde(default)]
    pub exemptions: Vec<String>,
    /// Table-name glob patterns a rule treats as out of scope (e.g.
    /// no-where's audit-log exception, no-pagination's small reference
    /// tables). Distinct from `exemptions`, which is origin-id based.
    #[serde(default, rename = "exempt-tables")]
    pub exempt_tables: Vec<String>,
    /// Whether `/*+ ... */` optimizer hint comments are allowed through the
    /// `sql-comment` checker.
    #[serde(default, rename = "allow-hint-comments")]
    pub allow_hint_comments: bool,
    #[serde(default, rename = "max-offset")]
    pub max_offset: Option<u64>,
    #[serde(default, rename = "max-page-size")]
    pub max_page_size: Option<u64>,
    #[serde(default, rename = "allowed-operations")]
    pub allowed_operations: Vec<String>,
    #[serde(default, rename = "denied-functions")]
    pub denied_functions: Vec<String>,
    #[serde(default, rename = "denied-tables")]
    pub denied_tables: Vec<String>,
    #[serde(default, rename = "limiting-field-patterns")]
    pub limiting_field_patterns: Vec<String>,
    /// Tables this rule applies to (whitelist-fields: the tables whose
    /// mandatory columns are enforced).
    #[serde(default)]
    pub tables: Vec<String>,
    /// Column names required to appear in WHERE for the tables above.
    #[serde(default, rename = "mandatory-fields")]
    pub mandatory_fields: Vec<String>
}

impl RulesConfig {
    fn lookup(&self, id: &str) -> Option<&RuleOverride> {
        self.by_rule.get(id)
    }

    /// Whether `id` is enabled: an explicit `rules.<id>.enabled` wins, then
    /// presence in the legacy `rules.disabled` list, then `default`.
    pub fn is_enabled(&self, id: &str, default: bool) -> bool {
        if let Some(explicit) = self.lookup(id).and_then(|o| o.enabled) {
            return explicit;
        }
        if self.disabled.iter().any(|d| d == id) {
            return false;
        }
        default
    }

    /// Origin-id glob exemptions for `id` (spec §6
    /// `rules.<rule-id>.exemptions`).
    pub fn exemptions(&self, id: &str) -> &[String] {
        self.lookup(id).map(|o| o.exemptions.as_slice()).unwrap_or(&[])
    }

    /// Table-name glob exemptions for `id` (distinct from `exemptions`,
    /// which is origin-id based).
    pub fn exempt_tables(&self, id: &str) -> &[String] {
        self.lookup(id).map(|o| o.exempt_tables.as_slice()).unwrap_or(&[])
    }

    pub fn allow_hint_comments(&self, id: &str) -> bool {
        self.lookup(id).map(|o| o.allow_hint_comments).unwrap_or(false)
    }

    pub fn max_offset(&self, id: &str, default: u64) -> u64 {
        self.lookup(id).and_then(|o| o.max_offset).unwrap_or(default)
    }

    pub fn max_page_size(&self, id: &str, default: u64) -> u64 {
        self.lookup(id).and_then(|o| o.max_page_size).unwrap_or(default)
    }

    pub fn allowed_operations(&self, id: &str) -> &[String] {
        self.lookup(id).map(|o| o.allowed_operations.as_slice()).unwrap_or(&[])
    }

    /// Rule-specific denylist if configured, else the group-level
    /// `dangerous_functions` default.
    pub fn denied_functions(&self, id: &str) -> &[String] {
        match self.lookup(id).map(|o| o.denied_functions.as_slice()) {
            Some(list) if !list.is_empty() => list,
            _ => &self.dangerous_functions
        }
    }

    /// Rule-specific denylist if configured, else the group-level
    /// `denied_tables` default.
    pub fn denied_tables_for(&self, id: &str) -> &[String] {
        match self.lookup(id).map(|o| o.denied_tables.as_slice()) {
            Some(list) if !list.is_empty() => list,
            _ => &self.denied_tables
        }
    }

    pub fn limiting_field_patterns(&self, id: &str) -> &[String] {
        self.lookup(id).map(|o| o.limiting_field_patterns.as_slice()).unwrap_or(&[])
    }

    pub fn severity_override(&self, id: &str) -> Option<&str> {
        self.severity.get(id).map(String::as_str)
    }

    pub fn target_tables(&self, id: &str) -> &[String] {
        self.lookup(id).map(|o| o.tables.as_slice()).unwrap_or(&[])
    }

    /// Rule-specific mandatory-field list if configured, else the
    /// group-level `whitelist_fields` default.
    pub fn mandatory_fields(&self, id: &str) -> &[String] {
        match self.lookup(id).map(|o| o.mandatory_fields.as_slice()) {
            Some(list) if !list.is_empty() => list,
            _ => &self.whitelist_fields
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(home) = env::var_os("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("sqlguard")
                .join("config.toml");

            if home_config.exists() {
                let content = fs::read_to_string(&home_config)
                    .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
                config = toml::from_str(&content)
                    .map_err(|e| config_error(format!("Invalid config file: {}", e)))?;
            }
        }

        let local_config = PathBuf::from(".sqlguard.toml");
        if local_config.exists() {
            let content = fs::read_to_string(&local_config)
                .map_err(|e| config_error(format!("Failed to read config file: {}", e)))?;
            config = toml::from_str(&content)
                .map_err(|e| config_error(format!("Invalid config file: {}", e)))?;
        }

        if let Ok(ttl) = env::var("SQLGUARD_DEDUP_TTL_MS") {
            config.dedup.ttl_ms = ttl
                .parse()
                .map_err(|_| config_error("SQLGUARD_DEDUP_TTL_MS must be an integer"))?;
        }

        if let Ok(cap) = env::var("SQLGUARD_CACHE_CAPACITY") {
            config.parser.cache_capacity = cap
                .parse()
                .map_err(|_| config_error("SQLGUARD_CACHE_CAPACITY must be an integer"))?;
        }

        Ok(config)
    }
}
