//! Glob-style pattern matching shared by several rule checkers.
//!
//! Two flavors, both built once at checker-registration time (never
//! recompiled per call, per Design Notes' "config objects with many optional
//! fields" guidance):
//!
//! - [`GlobSet::new`] — `*` matches any run of characters, including the
//!   configured separator. Used for table/function-name denylists where a
//!   qualified name (`schema.table`) should still be matched by `sys_*`.
//! - [`SegmentedGlobSet::new`] — `*` matches a run of non-separator
//!   characters only (spec §3: "`*` = any run of non-separator chars, `**`
//!   unused"). Used for origin-id exemption patterns (`pkg.Class.*`).

use regex::{Regex, RegexSet};

fn escape_non_star(pattern: &str) -> String {
    pattern
        .chars()
        .map(|c| {
            if c == '*' {
                "\u{0}".to_string()
            } else {
                regex::escape(&c.to_string())
            }
        })
        .collect()
}

/// A compiled set of case-insensitive glob patterns where `*` matches
/// anything (`.*`).
pub struct GlobSet {
    set: RegexSet
}

impl GlobSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>
    {
        let regexes: Vec<String> = patterns
            .into_iter()
            .map(|p| format!("(?i)^{}$", escape_non_star(p.as_ref()).replace('\u{0}', ".*")))
            .collect();
        Self {
            set: RegexSet::new(&regexes).unwrap_or_else(|_| RegexSet::empty())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        !self.is_empty() && self.set.is_match(text)
    }
}

/// A compiled set of case-sensitive glob patterns where `*` matches a run of
/// characters other than `sep`.
pub struct SegmentedGlobSet {
    set: RegexSet,
    sep: char
}

impl SegmentedGlobSet {
    pub fn new<I, S>(patterns: I, sep: char) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>
    {
        let star_class = format!("[^{}]*", regex::escape(&sep.to_string()));
        let regexes: Vec<String> = patterns
            .into_iter()
            .map(|p| format!("^{}$", escape_non_star(p.as_ref()).replace('\u{0}', &star_class)))
            .collect();
        Self {
            set: RegexSet::new(&regexes).unwrap_or_else(|_| RegexSet::empty()),
            sep
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        let _ = self.sep;
        !self.is_empty() && self.set.is_match(text)
    }
}

/// Compile a single case-insensitive glob pattern, `*` matching anything.
/// Used where only one pattern is needed (e.g. a single allow-list regex
/// supplied via configuration).
pub fn single_glob(pattern: &str) -> Option<Regex> {
    Regex::new(&format!("(?i)^{}$", escape_non_star(pattern).replace('\u{0}', ".*"))).ok()
}

/// A compiled set of case-insensitive glob patterns where `*` matches a run
/// of characters *other than* `_` (spec §4.4: "Pattern `sys_*` means
/// 'starts with `sys_` followed by characters other than `_`' — i.e.
/// `sys_user` matches, `system` does not"). Used for table-name denylists
/// (`DeniedTableChecker`, `ReadOnlyTableChecker`), matched case-insensitively
/// against object names per spec §4.4's case rules.
pub struct TableGlobSet {
    set: RegexSet
}

impl TableGlobSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>
    {
        let regexes: Vec<String> = patterns
            .into_iter()
            .map(|p| format!("(?i)^{}$", escape_non_star(p.as_ref()).replace('\u{0}', "[^_]+")))
            .collect();
        Self {
            set: RegexSet::new(&regexes).unwrap_or_else(|_| RegexSet::empty())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn matches(&self, text: &str) -> bool {
        !self.is_empty() && self.set.is_match(text)
    }
}
