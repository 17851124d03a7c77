//! Shared CLI utilities for the tokenx binary tools.

pub mod source;

use std::io::Read;
use std::path::Path;

use crate::error::TokenizerError;

/// Install the stderr `tracing` subscriber used by the tokenx tools.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`. Does nothing when
/// `disable` is set or when a subscriber is already installed.
pub fn init_logging(disable: bool) {
    use tracing_subscriber::EnvFilter;

    if disable {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Read tool input from `--prompt`, `--file` or `--stdin`, in that order.
///
/// Text is returned verbatim; `tokenx-decode` splits it into id lines with
/// [`parse_id_lines`].
pub fn read_input(
    prompt: Option<&str>,
    file: Option<&Path>,
    use_stdin: bool,
) -> Result<String, TokenizerError> {
    if let Some(text) = prompt {
        return Ok(text.to_string());
    }

    if let Some(path) = file {
        return std::fs::read_to_string(path).map_err(|e| {
            TokenizerError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read input file '{}': {}", path.display(), e),
            ))
        });
    }

    if use_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }

    Err(TokenizerError::InvalidArgument(
        "No input provided. Use --prompt, --file, or --stdin".to_string(),
    ))
}

/// Parse one id sequence per non-blank line.
///
/// Ids may be separated by whitespace or commas, and a line may be wrapped
/// in `[...]`, so the output of `tokenx-tokenize --ids` reads back directly.
pub fn parse_id_lines(input: &str) -> Result<Vec<Vec<u32>>, TokenizerError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| parse_id_line(line).map_err(|e| {
            TokenizerError::InvalidArgument(format!("line {}: {}", n + 1, e))
        }))
        .collect()
}

fn parse_id_line(line: &str) -> Result<Vec<u32>, String> {
    let line = line.trim();
    let line = match (line.strip_prefix('['), line.ends_with(']')) {
        (Some(rest), true) => &rest[..rest.len() - 1],
        (None, false) => line,
        _ => return Err(format!("unbalanced brackets in '{}'", line)),
    };

    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|_| format!("'{}' is not a valid token id", part))
        })
        .collect()
}
