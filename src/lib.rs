pub mod cli;
pub mod encoding;
pub mod error;
pub mod native;
pub mod tokenizer;

pub use encoding::{Encoding, PaddingDirection, TruncationDirection};
pub use error::TokenizerError;
pub use tokenizer::{PaddingOptions, Tokenizer, TruncationOptions, TruncationStrategy};
