//! The tokenizer client.
//!
//! [`Tokenizer`] owns one native handle and routes every engine call through
//! it, so calls on a shared instance are serialized. Everything it returns is
//! plain managed data; [`Encoding`] values stay usable after the tokenizer is
//! released or dropped.

pub(crate) mod batch;
pub(crate) mod marshal;
pub mod options;

pub use options::{PaddingOptions, TruncationOptions, TruncationStrategy};

use std::ffi::CString;
use std::os::raw::c_int;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::encoding::Encoding;
use crate::error::TokenizerError;
use crate::native::{
    check_status, to_cstring, HfEngine, NativeHandle, NativeInterop, STATUS_OK,
};
use batch::FlatBatch;
use marshal::{encode_one, take_string};

/// A loaded tokenizer backed by a native engine.
pub struct Tokenizer {
    handle: NativeHandle,
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("released", &self.handle.is_released())
            .finish()
    }
}

impl Tokenizer {
    /// Load a tokenizer from its `tokenizer.json` contents using the
    /// built-in engine.
    pub fn from_json(json: &str) -> Result<Self, TokenizerError> {
        Self::with_interop(Arc::new(HfEngine::new()), json)
    }

    /// Load a tokenizer from JSON through an arbitrary engine.
    pub fn with_interop(
        interop: Arc<dyn NativeInterop>,
        json: &str,
    ) -> Result<Self, TokenizerError> {
        if json.trim().is_empty() {
            return Err(TokenizerError::InvalidArgument(
                "tokenizer json must not be empty".to_string(),
            ));
        }
        let json = to_cstring("tokenizer json", json)?;
        let handle = NativeHandle::create(interop, "tokenizer_create", |interop, status| {
            interop.tokenizer_create(&json, status)
        })?;
        Ok(Self { handle })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenizerError> {
        let json = std::str::from_utf8(bytes).map_err(|e| {
            TokenizerError::InvalidArgument(format!("tokenizer json is not valid UTF-8: {}", e))
        })?;
        Self::from_json(json)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TokenizerError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), bytes = json.len(), "loading tokenizer");
        Self::from_json(&json)
    }

    /// Download a tokenizer by hub identifier using the built-in engine.
    #[cfg(feature = "http")]
    pub fn from_pretrained(
        identifier: &str,
        revision: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<Self, TokenizerError> {
        Self::from_pretrained_with(Arc::new(HfEngine::new()), identifier, revision, auth_token)
    }

    /// Load a tokenizer by identifier through an arbitrary engine.
    pub fn from_pretrained_with(
        interop: Arc<dyn NativeInterop>,
        identifier: &str,
        revision: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<Self, TokenizerError> {
        if identifier.trim().is_empty() {
            return Err(TokenizerError::InvalidArgument(
                "identifier must not be empty".to_string(),
            ));
        }
        let identifier = to_cstring("identifier", identifier)?;
        let revision = revision.map(|r| to_cstring("revision", r)).transpose()?;
        let auth_token = auth_token
            .map(|t| to_cstring("auth token", t))
            .transpose()?;

        let handle =
            NativeHandle::create(interop, "tokenizer_from_pretrained", |interop, status| {
                interop.tokenizer_from_pretrained(
                    &identifier,
                    revision.as_deref(),
                    auth_token.as_deref(),
                    status,
                )
            })?;
        Ok(Self { handle })
    }

    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding, TokenizerError> {
        let text = to_cstring("text", text)?;
        self.handle
            .invoke(|interop, raw| encode_one(interop, raw, &text, None, add_special_tokens))
    }

    /// Encode a sequence pair; tokens of `pair` get type id 1.
    pub fn encode_pair(
        &self,
        text: &str,
        pair: &str,
        add_special_tokens: bool,
    ) -> Result<Encoding, TokenizerError> {
        let text = to_cstring("text", text)?;
        let pair = to_cstring("pair text", pair)?;
        self.handle.invoke(|interop, raw| {
            encode_one(interop, raw, &text, Some(&pair), add_special_tokens)
        })
    }

    /// Encode every text under a single lock acquisition.
    ///
    /// Stops at the first failing item and returns its error.
    pub fn encode_batch<S: AsRef<str>>(
        &self,
        texts: &[S],
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>, TokenizerError> {
        let texts = texts
            .iter()
            .map(|t| to_cstring("text", t.as_ref()))
            .collect::<Result<Vec<CString>, _>>()?;

        debug!(count = texts.len(), "encoding batch");
        self.handle.invoke(|interop, raw| {
            texts
                .iter()
                .map(|text| encode_one(interop, raw, text, None, add_special_tokens))
                .collect()
        })
    }

    /// Encode every `(text, pair)` under a single lock acquisition.
    ///
    /// Items whose pair is `None` are encoded as a single sequence, so one
    /// batch may mix single texts and pairs.
    pub fn encode_batch_pairs<A: AsRef<str>, B: AsRef<str>>(
        &self,
        items: &[(A, Option<B>)],
        add_special_tokens: bool,
    ) -> Result<Vec<Encoding>, TokenizerError> {
        let items = items
            .iter()
            .map(|(text, pair)| {
                let text = to_cstring("text", text.as_ref())?;
                let pair = pair
                    .as_ref()
                    .map(|p| to_cstring("pair text", p.as_ref()))
                    .transpose()?;
                Ok((text, pair))
            })
            .collect::<Result<Vec<(CString, Option<CString>)>, TokenizerError>>()?;

        debug!(count = items.len(), "encoding pair batch");
        self.handle.invoke(|interop, raw| {
            items
                .iter()
                .map(|(text, pair)| {
                    encode_one(interop, raw, text, pair.as_deref(), add_special_tokens)
                })
                .collect()
        })
    }

    /// Decode one id sequence. An empty sequence decodes to `""`.
    pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, TokenizerError> {
        self.handle.invoke(|interop, raw| {
            if ids.is_empty() {
                return Ok(String::new());
            }
            let mut status = STATUS_OK;
            let ptr = unsafe { interop.decode(raw, ids, skip_special_tokens, &mut status) };
            Ok(take_string(interop, "decode", ptr, status)?.unwrap_or_default())
        })
    }

    /// Decode many id sequences with one engine call.
    ///
    /// Fails with [`TokenizerError::UnsupportedSize`] before touching the
    /// engine when the combined length exceeds `i32::MAX`.
    pub fn decode_batch<S: AsRef<[u32]>>(
        &self,
        sequences: &[S],
        skip_special_tokens: bool,
    ) -> Result<Vec<String>, TokenizerError> {
        let batch = FlatBatch::pack(sequences)?;
        self.handle
            .invoke(|interop, raw| batch::decode_flat(interop, raw, &batch, skip_special_tokens))
    }

    pub fn enable_padding(&self, options: &PaddingOptions) -> Result<(), TokenizerError> {
        let wire = options.to_wire()?;
        self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let result = unsafe { interop.enable_padding(raw, &wire.request(), &mut status) };
            check_status(interop, "enable_padding", first_failure(status, result))
        })?;
        debug!(?options, "padding enabled");
        Ok(())
    }

    pub fn disable_padding(&self) -> Result<(), TokenizerError> {
        self.handle.invoke(|interop, raw| {
            unsafe { interop.disable_padding(raw) };
            Ok(())
        })
    }

    /// Current padding settings, or `None` when padding is disabled.
    pub fn padding(&self) -> Result<Option<PaddingOptions>, TokenizerError> {
        let json = self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let ptr = unsafe { interop.padding(raw, &mut status) };
            take_string(interop, "padding", ptr, status)
        })?;
        json.as_deref()
            .map(PaddingOptions::from_engine_json)
            .transpose()
    }

    pub fn enable_truncation(&self, options: &TruncationOptions) -> Result<(), TokenizerError> {
        let request = options.to_request()?;
        self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let result = unsafe { interop.enable_truncation(raw, &request, &mut status) };
            check_status(interop, "enable_truncation", first_failure(status, result))
        })?;
        debug!(?options, "truncation enabled");
        Ok(())
    }

    pub fn disable_truncation(&self) -> Result<(), TokenizerError> {
        self.handle.invoke(|interop, raw| {
            unsafe { interop.disable_truncation(raw) };
            Ok(())
        })
    }

    /// Current truncation settings, or `None` when truncation is disabled.
    pub fn truncation(&self) -> Result<Option<TruncationOptions>, TokenizerError> {
        let json = self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let ptr = unsafe { interop.truncation(raw, &mut status) };
            take_string(interop, "truncation", ptr, status)
        })?;
        json.as_deref()
            .map(TruncationOptions::from_engine_json)
            .transpose()
    }

    pub fn token_to_id(&self, token: &str) -> Result<Option<u32>, TokenizerError> {
        let token = to_cstring("token", token)?;
        self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let id = unsafe { interop.token_to_id(raw, &token, &mut status) };
            check_status(interop, "token_to_id", status)?;
            Ok(u32::try_from(id).ok())
        })
    }

    pub fn id_to_token(&self, id: u32) -> Result<Option<String>, TokenizerError> {
        let id = c_int::try_from(id).map_err(|_| {
            TokenizerError::OutOfRange(format!("token id {} exceeds {}", id, c_int::MAX))
        })?;
        self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let ptr = unsafe { interop.id_to_token(raw, id, &mut status) };
            take_string(interop, "id_to_token", ptr, status)
        })
    }

    pub fn vocab_size(&self, with_added_tokens: bool) -> Result<usize, TokenizerError> {
        self.handle
            .invoke(|interop, raw| Ok(unsafe { interop.vocab_size(raw, with_added_tokens) }))
    }

    /// Serialize the full tokenizer configuration, including current padding
    /// and truncation settings.
    pub fn to_json(&self, pretty: bool) -> Result<String, TokenizerError> {
        self.handle.invoke(|interop, raw| {
            let mut status = STATUS_OK;
            let ptr = unsafe { interop.config_json(raw, pretty, &mut status) };
            take_string(interop, "config_json", ptr, status)?.ok_or_else(|| {
                TokenizerError::native("config_json", Some("engine returned no json".to_string()))
            })
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<(), TokenizerError> {
        let json = self.to_json(pretty)?;
        std::fs::write(path.as_ref(), json)?;
        debug!(path = %path.as_ref().display(), "tokenizer saved");
        Ok(())
    }

    /// Free the native handle. Returns `false` if it was already released.
    pub fn release(&self) -> bool {
        self.handle.release()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }
}

/// Some engine calls report failure through both the out-status and the
/// return value.
fn first_failure(status: c_int, result: c_int) -> c_int {
    if status != STATUS_OK {
        status
    } else {
        result
    }
}
