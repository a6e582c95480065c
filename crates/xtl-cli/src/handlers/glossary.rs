//! Glossary command handlers.

use std::path::Path;

use anyhow::Result;

use xtl_core::GlossaryStore;
use xtl_core::services::InsertOutcome;

use crate::error::CliError;

/// Execute `glossary lookup`.
pub fn lookup(path: &Path, text: &str) -> Result<()> {
    print!("{}", lookup_block(path, text)?);
    Ok(())
}

/// Execute `glossary add`.
pub fn add(path: &Path, source: &str, target: &str) -> Result<()> {
    println!("{}", add_term(path, source, target)?);
    Ok(())
}

fn lookup_block(path: &Path, text: &str) -> Result<String, CliError> {
    let store = GlossaryStore::open(path)?;
    let block = store.context_prompt(text);
    if block.is_empty() {
        return Ok(format!("No known terms in text ({} terms loaded)\n", store.len()));
    }
    Ok(block)
}

fn add_term(path: &Path, source: &str, target: &str) -> Result<String, CliError> {
    let store = GlossaryStore::open(path)?;
    match store.learn(source, target) {
        InsertOutcome::Inserted => Ok(format!("Added {source} = {target}")),
        InsertOutcome::Duplicate => Ok(format!(
            "'{source}' is already in the glossary as '{}'",
            store.get(source).unwrap_or_default()
        )),
        InsertOutcome::Rejected => Err(CliError::Arguments(format!(
            "'{source}' = '{target}' is not a valid term (source needs 2+ chars, no '=' or line breaks)"
        ))),
        InsertOutcome::WriteFailed => Err(CliError::Io(format!(
            "could not append to {}",
            path.display()
        ))),
    }
}
