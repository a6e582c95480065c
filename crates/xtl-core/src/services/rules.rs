//! Regex rewrite rules applied before and after translation.
//!
//! Rule files hold one `pattern=replacement` rule per line. Blank lines and
//! lines starting with `;` are ignored. Rules run in file order, each one
//! against the output of the previous rule.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

/// File name of the pre-processing rules, next to the glossary file.
pub const PRE_RULES_FILE: &str = "_Preprocessors.txt";

/// File name of the post-processing rules, next to the glossary file.
pub const POST_RULES_FILE: &str = "_Postprocessors.txt";

/// Errors from reading a rule file.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("Failed to read rule file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A compiled rewrite rule.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: Regex,
    replacement: String,
}

impl RewriteRule {
    /// Compile a rule from a raw pattern and a `$n`-style replacement.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: convert_group_refs(replacement),
        })
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, self.replacement.as_str())
            .into_owned()
    }
}

/// Rewrite `$n` group references into the `${n}` form the regex crate expects.
///
/// `$1abc` would otherwise be read as a group named `1abc`. Any `$` not
/// followed by a digit is literal and becomes `$$`.
fn convert_group_refs(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            chars.next();
        }
        if digits.is_empty() {
            out.push_str("$$");
        } else {
            out.push_str("${");
            out.push_str(&digits);
            out.push('}');
        }
    }
    out
}

/// Parse rule file contents, skipping comments, blanks and invalid patterns.
pub fn parse_rules(content: &str) -> Vec<RewriteRule> {
    let mut rules = Vec::new();
    for (line_num, line) in content.lines().enumerate() {
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        let Some((pattern, replacement)) = line.split_once('=') else {
            continue;
        };
        if pattern.is_empty() {
            continue;
        }
        match RewriteRule::new(pattern, replacement) {
            Ok(rule) => rules.push(rule),
            Err(e) => warn!(line = line_num + 1, pattern, "Skipping invalid rule: {e}"),
        }
    }
    rules
}

/// Load rules from a file. A missing file yields no rules; invalid UTF-8 is
/// decoded lossily.
pub fn load_rules(path: &Path) -> Result<Vec<RewriteRule>, RuleLoadError> {
    match fs::read(path) {
        Ok(bytes) => Ok(parse_rules(&String::from_utf8_lossy(&bytes))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(RuleLoadError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, Default)]
struct RuleSet {
    pre: Vec<RewriteRule>,
    post: Vec<RewriteRule>,
}

/// Owns the pre- and post-processing rule lists.
///
/// Reloads replace both lists at once; `apply_*` work on the set that was
/// current when they started.
#[derive(Debug, Default)]
pub struct RuleEngine {
    rules: RwLock<Arc<RuleSet>>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine from already compiled rules.
    pub fn with_rules(pre: Vec<RewriteRule>, post: Vec<RewriteRule>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(RuleSet { pre, post })),
        }
    }

    /// Load both rule files. Missing files leave the corresponding list empty.
    pub fn load(&self, pre_path: &Path, post_path: &Path) -> Result<(), RuleLoadError> {
        let pre = load_rules(pre_path)?;
        let post = load_rules(post_path)?;
        debug!(
            pre = pre.len(),
            post = post.len(),
            "Loaded rewrite rules from {}",
            pre_path.parent().unwrap_or(pre_path).display()
        );
        *self.rules.write() = Arc::new(RuleSet { pre, post });
        Ok(())
    }

    /// Load `_Preprocessors.txt` and `_Postprocessors.txt` next to `glossary_path`.
    pub fn load_beside(&self, glossary_path: &Path) -> Result<(), RuleLoadError> {
        let (pre, post) = rule_paths_beside(glossary_path);
        self.load(&pre, &post)
    }

    /// Drop all rules.
    pub fn clear(&self) {
        *self.rules.write() = Arc::new(RuleSet::default());
    }

    pub fn apply_pre(&self, text: &str) -> String {
        let rules = Arc::clone(&*self.rules.read());
        apply_all(&rules.pre, text)
    }

    pub fn apply_post(&self, text: &str) -> String {
        let rules = Arc::clone(&*self.rules.read());
        apply_all(&rules.post, text)
    }

    /// Number of (pre, post) rules loaded.
    pub fn counts(&self) -> (usize, usize) {
        let rules = self.rules.read();
        (rules.pre.len(), rules.post.len())
    }
}

/// Paths of the rule files that live beside a glossary file.
pub fn rule_paths_beside(glossary_path: &Path) -> (PathBuf, PathBuf) {
    let dir = glossary_path.parent().unwrap_or_else(|| Path::new(""));
    (dir.join(PRE_RULES_FILE), dir.join(POST_RULES_FILE))
}

fn apply_all(rules: &[RewriteRule], text: &str) -> String {
    rules
        .iter()
        .fold(text.to_string(), |current, rule| rule.apply(&current))
}
