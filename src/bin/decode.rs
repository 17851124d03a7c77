//! tokenx-decode: Decode token id sequences back to text.
//!
//! Each non-blank input line is one sequence; all lines are decoded with a
//! single batch call.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde::Serialize;

use tokenx::cli;
use tokenx::cli::source::{load_tokenizer, resolve_tokenizer};

#[derive(Parser)]
#[command(name = "tokenx-decode", about = "Decode token ids with a tokenizer.json")]
struct Args {
    /// tokenizer.json path, directory containing one, or hub identifier
    /// (falls back to $TOKENX_TOKENIZER)
    #[arg(short = 't', long)]
    tokenizer: Option<String>,

    /// Hub revision (branch, tag or commit)
    #[arg(long)]
    revision: Option<String>,

    /// Hub access token
    #[arg(long)]
    auth_token: Option<String>,

    /// Ids to decode, e.g. "[101, 7592, 102]"; one sequence per line
    #[arg(short = 'p', long, conflicts_with_all = ["file", "stdin"])]
    prompt: Option<String>,

    /// Read id lines from file
    #[arg(short = 'f', long, conflicts_with = "stdin")]
    file: Option<PathBuf>,

    /// Read id lines from stdin
    #[arg(long)]
    stdin: bool,

    /// Keep special tokens in the output
    #[arg(long)]
    keep_special: bool,

    /// Output format: text or json
    #[arg(long, default_value = "text", value_parser = validate_output_format)]
    output_format: String,

    /// Suppress all logging
    #[arg(long)]
    log_disable: bool,
}

fn validate_output_format(s: &str) -> Result<String, String> {
    match s {
        "text" | "json" => Ok(s.to_string()),
        _ => Err(format!("Unknown output format '{}'. Options: text, json", s)),
    }
}

#[derive(Serialize)]
struct JsonOutput {
    texts: Vec<String>,
    count: usize,
}

fn main() {
    let args = Args::parse();
    cli::init_logging(args.log_disable);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let source = resolve_tokenizer(args.tokenizer.as_deref())?;
    let input = cli::read_input(
        args.prompt.as_deref(),
        args.file.as_deref(),
        args.stdin,
    )?;
    let sequences = cli::parse_id_lines(&input)?;

    let tokenizer = load_tokenizer(
        &source,
        args.revision.as_deref(),
        args.auth_token.as_deref(),
    )?;
    let texts = tokenizer.decode_batch(&sequences, !args.keep_special)?;

    match args.output_format.as_str() {
        "json" => {
            let output = JsonOutput {
                count: texts.len(),
                texts,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            for text in &texts {
                println!("{}", text);
            }
        }
    }

    Ok(())
}
