//! tokenx-tokenize: Tokenize text with a `tokenizer.json` or hub tokenizer.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use serde::Serialize;

use tokenx::cli;
use tokenx::cli::source::{load_tokenizer, resolve_tokenizer};
use tokenx::{Encoding, PaddingDirection, PaddingOptions, TruncationDirection, TruncationOptions};

#[derive(Parser)]
#[command(name = "tokenx-tokenize", about = "Tokenize text with a tokenizer.json")]
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

    /// Text to tokenize
    #[arg(short = 'p', long, conflicts_with_all = ["file", "stdin"])]
    prompt: Option<String>,

    /// Read text from file
    #[arg(short = 'f', long, conflicts_with = "stdin")]
    file: Option<PathBuf>,

    /// Read text from stdin
    #[arg(long)]
    stdin: bool,

    /// Second sequence of a pair
    #[arg(long)]
    pair: Option<String>,

    /// Output only token IDs in list format: [1, 2, 3]
    #[arg(long)]
    ids: bool,

    /// Print total token count
    #[arg(long)]
    show_count: bool,

    /// Don't add special tokens
    #[arg(long)]
    no_special: bool,

    /// Pad the encoding to this length
    #[arg(long)]
    pad_to: Option<usize>,

    /// Pad on the left instead of the right
    #[arg(long)]
    pad_left: bool,

    /// Truncate the encoding to this length
    #[arg(long)]
    truncate: Option<usize>,

    /// Tokens of context repeated in each overflow window
    #[arg(long, default_value = "0", requires = "truncate")]
    stride: usize,

    /// Keep the last tokens instead of the first when truncating
    #[arg(long, requires = "truncate")]
    truncate_left: bool,

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
struct TokenEntry<'a> {
    id: u32,
    text: &'a str,
    start: usize,
    end: usize,
    type_id: u32,
    word: Option<u32>,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    tokens: Vec<TokenEntry<'a>>,
    count: usize,
    overflowing: &'a [Encoding],
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

    let tokenizer = load_tokenizer(
        &source,
        args.revision.as_deref(),
        args.auth_token.as_deref(),
    )?;

    if let Some(max_length) = args.truncate {
        let direction = if args.truncate_left {
            TruncationDirection::Left
        } else {
            TruncationDirection::Right
        };
        tokenizer.enable_truncation(&TruncationOptions {
            direction,
            ..TruncationOptions::new(max_length).with_stride(args.stride)
        })?;
    }
    if let Some(length) = args.pad_to {
        let direction = if args.pad_left {
            PaddingDirection::Left
        } else {
            PaddingDirection::Right
        };
        tokenizer.enable_padding(&PaddingOptions {
            direction,
            ..PaddingOptions::fixed(length)
        })?;
    }

    let add_special_tokens = !args.no_special;
    let encoding = match args.pair.as_deref() {
        Some(pair) => tokenizer.encode_pair(&input, pair, add_special_tokens)?,
        None => tokenizer.encode(&input, add_special_tokens)?,
    };

    match args.output_format.as_str() {
        "json" => {
            let tokens: Vec<TokenEntry> = (0..encoding.len())
                .map(|i| TokenEntry {
                    id: encoding.ids()[i],
                    text: &encoding.tokens()[i],
                    start: encoding.offsets()[i].0,
                    end: encoding.offsets()[i].1,
                    type_id: encoding.type_ids()[i],
                    word: encoding.word_ids()[i],
                })
                .collect();
            let output = JsonOutput {
                count: tokens.len(),
                tokens,
                overflowing: encoding.overflowing(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            if args.ids {
                let id_strs: Vec<String> = encoding.ids().iter().map(|id| id.to_string()).collect();
                println!("[{}]", id_strs.join(", "));
            } else {
                for (id, token) in encoding.ids().iter().zip(encoding.tokens()) {
                    println!("{:>5} -> '{}'", id, token);
                }
            }

            if !encoding.overflowing().is_empty() {
                println!("Overflowing windows: {}", encoding.overflowing().len());
            }
            if args.show_count {
                println!("Total number of tokens: {}", encoding.len());
            }
        }
    }

    Ok(())
}
