//! Padding and truncation settings applied by the engine on every encode.
//!
//! Options are validated and converted to the engine's wire structs before
//! any native call. The engine reports its current settings back as JSON,
//! which is parsed leniently: unknown directions fall back to `Right`,
//! unknown strategies to `LongestFirst`, and an empty pad token to `[PAD]`.

use std::ffi::CString;
use std::os::raw::c_int;

use serde::Deserialize;
use serde_json::Value;

use crate::encoding::{PaddingDirection, TruncationDirection};
use crate::error::TokenizerError;
use crate::native::{
    to_cstring, PaddingRequest, TruncationRequest, DIRECTION_LEFT, DIRECTION_RIGHT,
    STRATEGY_LONGEST_FIRST, STRATEGY_ONLY_FIRST, STRATEGY_ONLY_SECOND,
};

pub const DEFAULT_PAD_TOKEN: &str = "[PAD]";

/// How the engine pads each encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaddingOptions {
    pub direction: PaddingDirection,
    pub pad_id: u32,
    pub pad_type_id: u32,
    pub pad_token: String,
    /// Fixed target length; `None` pads each batch to its longest item.
    pub length: Option<usize>,
    /// Round the padded length up to a multiple of this. Values below 2 mean
    /// no rounding.
    pub pad_to_multiple_of: Option<usize>,
}

impl Default for PaddingOptions {
    fn default() -> Self {
        Self {
            direction: PaddingDirection::Right,
            pad_id: 0,
            pad_type_id: 0,
            pad_token: DEFAULT_PAD_TOKEN.to_string(),
            length: None,
            pad_to_multiple_of: None,
        }
    }
}

/// Padding options in wire form; owns the pad token string.
pub(crate) struct PaddingWire {
    direction: c_int,
    pad_id: u32,
    pad_type_id: u32,
    pad_token: CString,
    length: c_int,
    pad_to_multiple_of: c_int,
}

impl PaddingWire {
    pub(crate) fn request(&self) -> PaddingRequest<'_> {
        PaddingRequest {
            direction: self.direction,
            pad_id: self.pad_id,
            pad_type_id: self.pad_type_id,
            pad_token: &self.pad_token,
            length: self.length,
            pad_to_multiple_of: self.pad_to_multiple_of,
        }
    }
}

fn wire_int(what: &str, value: usize) -> Result<c_int, TokenizerError> {
    c_int::try_from(value).map_err(|_| {
        TokenizerError::OutOfRange(format!("{} {} exceeds {}", what, value, c_int::MAX))
    })
}

impl PaddingOptions {
    /// Pad every encoding to exactly `length` tokens.
    pub fn fixed(length: usize) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    pub(crate) fn to_wire(&self) -> Result<PaddingWire, TokenizerError> {
        if self.pad_token.is_empty() {
            return Err(TokenizerError::InvalidArgument(
                "pad token must not be empty".to_string(),
            ));
        }
        let length = match self.length {
            Some(length) => wire_int("padding length", length)?,
            None => -1,
        };
        let pad_to_multiple_of = match self.pad_to_multiple_of.filter(|&m| m >= 2) {
            Some(multiple) => wire_int("pad_to_multiple_of", multiple)?,
            None => 0,
        };

        Ok(PaddingWire {
            direction: match self.direction {
                PaddingDirection::Left => DIRECTION_LEFT,
                PaddingDirection::Right => DIRECTION_RIGHT,
            },
            pad_id: self.pad_id,
            pad_type_id: self.pad_type_id,
            pad_token: to_cstring("pad token", &self.pad_token)?,
            length,
            pad_to_multiple_of,
        })
    }

    /// Parse the engine's JSON description of its padding settings.
    pub(crate) fn from_engine_json(json: &str) -> Result<Self, TokenizerError> {
        let payload: PaddingPayload = serde_json::from_str(json)?;

        let length = match &payload.strategy {
            Value::Object(map) => map
                .get("Fixed")
                .and_then(Value::as_u64)
                .and_then(|n| usize::try_from(n).ok()),
            _ => None,
        };
        let pad_token = if payload.pad_token.is_empty() {
            DEFAULT_PAD_TOKEN.to_string()
        } else {
            payload.pad_token
        };

        Ok(Self {
            direction: if is_left(&payload.direction) {
                PaddingDirection::Left
            } else {
                PaddingDirection::Right
            },
            pad_id: payload.pad_id,
            pad_type_id: payload.pad_type_id,
            pad_token,
            length,
            pad_to_multiple_of: payload.pad_to_multiple_of.filter(|&m| m >= 2),
        })
    }
}

/// Which sequence of a pair loses tokens first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TruncationStrategy {
    #[default]
    LongestFirst,
    OnlyFirst,
    OnlySecond,
}

impl TruncationStrategy {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().replace('_', "").as_str() {
            "onlyfirst" => Self::OnlyFirst,
            "onlysecond" => Self::OnlySecond,
            _ => Self::LongestFirst,
        }
    }
}

/// How the engine truncates each encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TruncationOptions {
    pub max_length: usize,
    pub stride: usize,
    pub strategy: TruncationStrategy,
    pub direction: TruncationDirection,
}

impl Default for TruncationOptions {
    fn default() -> Self {
        Self::new(512)
    }
}

impl TruncationOptions {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            stride: 0,
            strategy: TruncationStrategy::LongestFirst,
            direction: TruncationDirection::Right,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub(crate) fn to_request(&self) -> Result<TruncationRequest, TokenizerError> {
        if self.max_length == 0 {
            return Err(TokenizerError::InvalidArgument(
                "max_length must be greater than 0".to_string(),
            ));
        }
        if self.stride >= self.max_length {
            return Err(TokenizerError::InvalidArgument(format!(
                "stride ({}) must be less than max_length ({})",
                self.stride, self.max_length
            )));
        }

        Ok(TruncationRequest {
            max_length: self.max_length,
            stride: self.stride,
            strategy: match self.strategy {
                TruncationStrategy::LongestFirst => STRATEGY_LONGEST_FIRST,
                TruncationStrategy::OnlyFirst => STRATEGY_ONLY_FIRST,
                TruncationStrategy::OnlySecond => STRATEGY_ONLY_SECOND,
            },
            direction: match self.direction {
                TruncationDirection::Left => DIRECTION_LEFT,
                TruncationDirection::Right => DIRECTION_RIGHT,
            },
        })
    }

    /// Parse the engine's JSON description of its truncation settings.
    pub(crate) fn from_engine_json(json: &str) -> Result<Self, TokenizerError> {
        let payload: TruncationPayload = serde_json::from_str(json)?;
        Ok(Self {
            max_length: payload.max_length,
            stride: payload.stride,
            strategy: payload
                .strategy
                .as_deref()
                .map(TruncationStrategy::parse)
                .unwrap_or_default(),
            direction: if is_left(&payload.direction) {
                TruncationDirection::Left
            } else {
                TruncationDirection::Right
            },
        })
    }
}

fn is_left(direction: &str) -> bool {
    direction.eq_ignore_ascii_case("left")
}

fn default_direction() -> String {
    "right".to_string()
}

fn default_pad_token() -> String {
    DEFAULT_PAD_TOKEN.to_string()
}

#[derive(Debug, Deserialize)]
struct PaddingPayload {
    #[serde(default)]
    strategy: Value,
    #[serde(default = "default_direction")]
    direction: String,
    #[serde(default)]
    pad_to_multiple_of: Option<usize>,
    #[serde(default)]
    pad_id: u32,
    #[serde(default)]
    pad_type_id: u32,
    #[serde(default = "default_pad_token")]
    pad_token: String,
}

#[derive(Debug, Deserialize)]
struct TruncationPayload {
    #[serde(default = "default_direction")]
    direction: String,
    max_length: usize,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    stride: usize,
}
