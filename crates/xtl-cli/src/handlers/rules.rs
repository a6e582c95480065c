//! Rules command handler.

use std::path::Path;

use anyhow::Result;

use xtl_core::RuleEngine;
use xtl_core::services::GLOSSARY_FILE;

use crate::error::CliError;

/// Execute `rules apply`.
pub fn apply(path: &Path, post: bool, text: &str) -> Result<()> {
    println!("{}", apply_rules(path, post, text)?);
    Ok(())
}

fn apply_rules(path: &Path, post: bool, text: &str) -> Result<String, CliError> {
    let glossary_path = if path.is_dir() {
        path.join(GLOSSARY_FILE)
    } else {
        path.to_path_buf()
    };
    let rules = RuleEngine::new();
    rules.load_beside(&glossary_path)?;

    Ok(if post {
        rules.apply_post(text)
    } else {
        rules.apply_pre(text)
    })
}
