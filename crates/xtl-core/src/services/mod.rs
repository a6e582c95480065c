//! Relay services.
//!
//! Explicitly owned stores (rules, glossary, credentials, client contexts,
//! token totals)
//! and the [`RelayEngine`] that orchestrates them. Each store documents its
//! own locking discipline.

mod context;
mod glossary;
mod keys;
mod relay;
mod rules;
mod usage;

pub use context::{ClientContext, ContextManager, client_key};
pub use glossary::{
    GLOSSARY_FILE, GlossaryError, GlossaryStore, InsertOutcome, KNOWN_TERMS_HEADER,
    format_hint_block,
};
pub use keys::KeyRotator;
pub use relay::{
    AttemptError, AttemptErrorKind, FAILURE_BODY, RelayEngine, RelayError, RelayServices,
    RetryPolicy,
};
pub use rules::{
    POST_RULES_FILE, PRE_RULES_FILE, RewriteRule, RuleEngine, RuleLoadError, load_rules,
    parse_rules, rule_paths_beside,
};
pub use usage::UsageMeter;
