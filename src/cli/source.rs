//! Tokenizer resolution from the CLI `--tokenizer` argument.
//!
//! The argument may name a `tokenizer.json` file, a directory holding one,
//! or a hub identifier such as `bert-base-uncased`.

use std::path::{Path, PathBuf};

use crate::error::TokenizerError;
use crate::tokenizer::Tokenizer;

/// Environment variable consulted when `--tokenizer` is omitted.
pub const TOKENIZER_ENV: &str = "TOKENX_TOKENIZER";

const TOKENIZER_FILE: &str = "tokenizer.json";

/// Where a tokenizer is loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerSource {
    File(PathBuf),
    Pretrained(String),
}

/// Resolve a `--tokenizer` argument, falling back to `TOKENX_TOKENIZER`.
///
/// Detection heuristic:
/// - An existing directory → its `tokenizer.json`
/// - An existing file → that file
/// - Ends with `.json` (case-insensitive) or starts with `.`/`/` → a missing file
/// - Otherwise → hub identifier
pub fn resolve_tokenizer(input: Option<&str>) -> Result<TokenizerSource, TokenizerError> {
    let input = match input {
        Some(value) => value.to_string(),
        None => std::env::var(TOKENIZER_ENV).map_err(|_| {
            TokenizerError::InvalidArgument(format!(
                "No tokenizer given. Use --tokenizer or set {}",
                TOKENIZER_ENV
            ))
        })?,
    };
    let input = input.trim();
    if input.is_empty() {
        return Err(TokenizerError::InvalidArgument(
            "Tokenizer argument must not be empty".to_string(),
        ));
    }

    let path = Path::new(input);
    if path.is_dir() {
        let file = path.join(TOKENIZER_FILE);
        if !file.is_file() {
            return Err(not_found(&file));
        }
        return Ok(TokenizerSource::File(file));
    }
    if path.is_file() {
        return Ok(TokenizerSource::File(path.to_path_buf()));
    }

    let lower = input.to_ascii_lowercase();
    if lower.ends_with(".json") || input.starts_with('.') || input.starts_with('/') {
        return Err(not_found(path));
    }
    Ok(TokenizerSource::Pretrained(input.to_string()))
}

fn not_found(path: &Path) -> TokenizerError {
    TokenizerError::InvalidArgument(format!("Tokenizer file not found: {}", path.display()))
}

/// Load the tokenizer a [`TokenizerSource`] points at.
pub fn load_tokenizer(
    source: &TokenizerSource,
    revision: Option<&str>,
    auth_token: Option<&str>,
) -> Result<Tokenizer, TokenizerError> {
    match source {
        TokenizerSource::File(path) => Tokenizer::from_file(path),
        TokenizerSource::Pretrained(identifier) => {
            load_pretrained(identifier, revision, auth_token)
        }
    }
}

#[cfg(feature = "http")]
fn load_pretrained(
    identifier: &str,
    revision: Option<&str>,
    auth_token: Option<&str>,
) -> Result<Tokenizer, TokenizerError> {
    Tokenizer::from_pretrained(identifier, revision, auth_token)
}

#[cfg(not(feature = "http"))]
fn load_pretrained(
    identifier: &str,
    _revision: Option<&str>,
    _auth_token: Option<&str>,
) -> Result<Tokenizer, TokenizerError> {
    Err(TokenizerError::InvalidArgument(format!(
        "'{}' is not a local file and hub downloads require the `http` feature",
        identifier
    )))
}
