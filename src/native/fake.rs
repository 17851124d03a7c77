//! Counting stand-in for the native engine, used by unit tests.
//!
//! Tokenizes on whitespace (id = word length in chars), tracks every
//! allocation it hands out and panics on a double or foreign free.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use super::{
    NativeInterop, NumericDest, PaddingRequest, RawEncoding, RawOffset, RawTokenizer,
    TruncationRequest, DIRECTION_LEFT, NONE_INDEX, STATUS_OK,
};

const STATUS_ERROR: c_int = 1;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct FakeStats {
    pub tokenizers_created: usize,
    pub tokenizers_freed: usize,
    pub encodings_created: usize,
    pub encodings_freed: usize,
    pub strings_created: usize,
    pub strings_freed: usize,
    pub encode_calls: usize,
    pub decode_calls: usize,
    pub decode_batch_calls: usize,
    pub max_concurrent_calls: usize,
}

#[derive(Debug, Default)]
struct FakeConfig {
    /// Fail `decode_batch_flat` after writing this many slots.
    fail_batch_after: Option<usize>,
    /// Report this count from `decode_batch_flat` instead of the real one.
    batch_count: Option<c_int>,
    /// Write one token string fewer than the encoding holds.
    short_token_copy: bool,
}

#[derive(Debug, Default)]
struct FakeTokenizer {
    padding: Option<String>,
    truncation: Option<TruncationRequest>,
}

#[derive(Debug, Clone, Default)]
struct FakeEncoding {
    ids: Vec<u32>,
    tokens: Vec<String>,
    offsets: Vec<RawOffset>,
    type_ids: Vec<u32>,
    special: Vec<u32>,
    word_ids: Vec<i32>,
    sequence_ids: Vec<i32>,
    overflowing: Vec<FakeEncoding>,
}

impl FakeEncoding {
    fn push(&mut self, token: &str, offset: (u32, u32), type_id: u32, word: i32, sequence: i32) {
        let special = u32::from(word == NONE_INDEX);
        self.ids.push(if special == 1 { 0 } else { token.chars().count() as u32 });
        self.tokens.push(token.to_string());
        self.offsets.push(RawOffset {
            start: offset.0,
            end: offset.1,
        });
        self.type_ids.push(type_id);
        self.special.push(special);
        self.word_ids.push(word);
        self.sequence_ids.push(sequence);
    }

    fn push_words(&mut self, text: &str, type_id: u32, sequence: i32) {
        for (word, (token, start, end)) in split_words(text).into_iter().enumerate() {
            self.push(&token, (start, end), type_id, word as i32, sequence);
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn range(&self, start: usize, end: usize) -> FakeEncoding {
        FakeEncoding {
            ids: self.ids[start..end].to_vec(),
            tokens: self.tokens[start..end].to_vec(),
            offsets: self.offsets[start..end].to_vec(),
            type_ids: self.type_ids[start..end].to_vec(),
            special: self.special[start..end].to_vec(),
            word_ids: self.word_ids[start..end].to_vec(),
            sequence_ids: self.sequence_ids[start..end].to_vec(),
            overflowing: Vec::new(),
        }
    }
}

fn split_words(text: &str) -> Vec<(String, u32, u32)> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut start = 0u32;
    let mut pos = 0u32;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !current.is_empty() {
                words.push((std::mem::take(&mut current), start, pos));
            }
        } else {
            if current.is_empty() {
                start = pos;
            }
            current.push(ch);
        }
        pos += 1;
    }
    if !current.is_empty() {
        words.push((current, start, pos));
    }
    words
}

pub(crate) struct FakeInterop {
    live: Mutex<HashMap<usize, &'static str>>,
    stats: Mutex<FakeStats>,
    config: Mutex<FakeConfig>,
    last_error: Mutex<Option<String>>,
    in_flight: AtomicUsize,
}

impl FakeInterop {
    pub(crate) fn new() -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            stats: Mutex::new(FakeStats::default()),
            config: Mutex::new(FakeConfig::default()),
            last_error: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn stats(&self) -> FakeStats {
        *self.stats.lock().unwrap()
    }

    /// Number of allocations handed out and not yet freed.
    pub(crate) fn live_allocations(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    pub(crate) fn fail_batch_after(&self, slots: usize) {
        self.config.lock().unwrap().fail_batch_after = Some(slots);
    }

    pub(crate) fn report_batch_count(&self, count: c_int) {
        self.config.lock().unwrap().batch_count = Some(count);
    }

    pub(crate) fn short_token_copy(&self) {
        self.config.lock().unwrap().short_token_copy = true;
    }

    pub(crate) fn alloc_string(&self, value: &str) -> *mut c_char {
        let ptr = CString::new(value).unwrap().into_raw();
        self.track(ptr as usize, "string");
        self.stats.lock().unwrap().strings_created += 1;
        ptr
    }

    fn track(&self, addr: usize, kind: &'static str) {
        self.live.lock().unwrap().insert(addr, kind);
    }

    fn untrack(&self, addr: usize, kind: &'static str) {
        match self.live.lock().unwrap().remove(&addr) {
            Some(k) if k == kind => {}
            Some(k) => panic!("freed a {} through the {} free function", k, kind),
            None => panic!("double or foreign free of {} at {:#x}", kind, addr),
        }
    }

    fn fail(&self, status: &mut c_int, message: &str) {
        *self.last_error.lock().unwrap() = Some(message.to_string());
        *status = STATUS_ERROR;
    }

    fn alloc_tokenizer(&self) -> *mut RawTokenizer {
        let ptr = Box::into_raw(Box::new(FakeTokenizer::default()));
        self.track(ptr as usize, "tokenizer");
        self.stats.lock().unwrap().tokenizers_created += 1;
        ptr.cast()
    }

    fn alloc_encoding(&self, encoding: FakeEncoding) -> *mut RawEncoding {
        let ptr = Box::into_raw(Box::new(encoding));
        self.track(ptr as usize, "encoding");
        self.stats.lock().unwrap().encodings_created += 1;
        ptr.cast()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut stats = self.stats.lock().unwrap();
        stats.max_concurrent_calls = stats.max_concurrent_calls.max(now);
    }

    fn leave(&self) {
        thread::yield_now();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn decode_ids(&self, ids: &[u32], status: &mut c_int) -> Option<String> {
        if let Some(bad) = ids.iter().find(|&&id| id == 999) {
            self.fail(status, &format!("unknown id {}", bad));
            return None;
        }
        Some(
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        )
    }
}

unsafe fn tokenizer<'a>(handle: *mut RawTokenizer) -> &'a mut FakeTokenizer {
    &mut *handle.cast::<FakeTokenizer>()
}

unsafe fn encoding<'a>(encoding: *const RawEncoding) -> &'a FakeEncoding {
    &*encoding.cast::<FakeEncoding>()
}

impl NativeInterop for FakeInterop {
    fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap().clone()
    }

    fn tokenizer_create(&self, json: &CStr, status: &mut c_int) -> *mut RawTokenizer {
        match json.to_str().unwrap_or_default() {
            "fail" => {
                self.fail(status, "invalid tokenizer json");
                ptr::null_mut()
            }
            "fail-with-handle" => {
                let raw = self.alloc_tokenizer();
                self.fail(status, "invalid tokenizer json");
                raw
            }
            _ => {
                *status = STATUS_OK;
                self.alloc_tokenizer()
            }
        }
    }

    fn tokenizer_from_pretrained(
        &self,
        identifier: &CStr,
        _revision: Option<&CStr>,
        _auth_token: Option<&CStr>,
        status: &mut c_int,
    ) -> *mut RawTokenizer {
        if identifier.to_bytes() == b"missing" {
            self.fail(status, "model not found");
            return ptr::null_mut();
        }
        *status = STATUS_OK;
        self.alloc_tokenizer()
    }

    unsafe fn tokenizer_free(&self, handle: *mut RawTokenizer) {
        self.untrack(handle as usize, "tokenizer");
        self.stats.lock().unwrap().tokenizers_freed += 1;
        drop(Box::from_raw(handle.cast::<FakeTokenizer>()));
    }

    unsafe fn encode(
        &self,
        handle: *mut RawTokenizer,
        text: &CStr,
        pair: Option<&CStr>,
        add_special_tokens: bool,
        length: &mut usize,
        status: &mut c_int,
    ) -> *mut RawEncoding {
        self.enter();
        self.stats.lock().unwrap().encode_calls += 1;
        let text = text.to_string_lossy();
        let pair = pair.map(|p| p.to_string_lossy());
        if text.contains("boom") {
            self.fail(status, "cannot encode 'boom'");
            self.leave();
            return ptr::null_mut();
        }

        let mut enc = FakeEncoding::default();
        if add_special_tokens {
            enc.push("<s>", (0, 0), 0, NONE_INDEX, NONE_INDEX);
        }
        enc.push_words(&text, 0, 0);
        if let Some(pair) = &pair {
            enc.push_words(pair, 1, 1);
        }

        if let Some(trunc) = tokenizer(handle).truncation {
            if enc.len() > trunc.max_length {
                let mut primary = enc.range(0, trunc.max_length);
                primary
                    .overflowing
                    .push(enc.range(trunc.max_length, enc.len()));
                enc = primary;
            }
        }

        *length = enc.len();
        *status = STATUS_OK;
        let raw = self.alloc_encoding(enc);
        self.leave();
        raw
    }

    unsafe fn encoding_free(&self, raw: *mut RawEncoding) {
        self.untrack(raw as usize, "encoding");
        self.stats.lock().unwrap().encodings_freed += 1;
        drop(Box::from_raw(raw.cast::<FakeEncoding>()));
    }

    unsafe fn encoding_copy_numeric(
        &self,
        raw: *const RawEncoding,
        dest: &mut NumericDest<'_>,
        status: &mut c_int,
    ) -> usize {
        let enc = encoding(raw);
        let n = enc.len();
        if dest.ids.len() != n || dest.offsets.len() != n || dest.word_ids.len() != n {
            self.fail(status, "destination length mismatch");
            return 0;
        }
        dest.ids.copy_from_slice(&enc.ids);
        dest.type_ids.copy_from_slice(&enc.type_ids);
        dest.attention_mask.fill(1);
        dest.special_tokens_mask.copy_from_slice(&enc.special);
        dest.offsets.copy_from_slice(&enc.offsets);
        dest.word_ids.copy_from_slice(&enc.word_ids);
        dest.sequence_ids.copy_from_slice(&enc.sequence_ids);
        *status = STATUS_OK;
        n
    }

    unsafe fn encoding_tokens(
        &self,
        raw: *const RawEncoding,
        out: &mut [*mut c_char],
        status: &mut c_int,
    ) -> usize {
        let enc = encoding(raw);
        let mut count = enc.len().min(out.len());
        if self.config.lock().unwrap().short_token_copy {
            count = count.saturating_sub(1);
        }
        for (slot, token) in out.iter_mut().zip(&enc.tokens).take(count) {
            *slot = self.alloc_string(token);
        }
        *status = STATUS_OK;
        count
    }

    unsafe fn encoding_overflowing_count(&self, raw: *const RawEncoding) -> usize {
        encoding(raw).overflowing.len()
    }

    unsafe fn encoding_overflowing(
        &self,
        raw: *const RawEncoding,
        index: usize,
        length: &mut usize,
        status: &mut c_int,
    ) -> *mut RawEncoding {
        match encoding(raw).overflowing.get(index) {
            Some(overflow) => {
                *length = overflow.len();
                *status = STATUS_OK;
                self.alloc_encoding(overflow.clone())
            }
            None => {
                self.fail(status, "overflow index out of range");
                ptr::null_mut()
            }
        }
    }

    unsafe fn decode(
        &self,
        _handle: *mut RawTokenizer,
        ids: &[u32],
        _skip_special_tokens: bool,
        status: &mut c_int,
    ) -> *mut c_char {
        self.enter();
        self.stats.lock().unwrap().decode_calls += 1;
        let out = match self.decode_ids(ids, status) {
            Some(text) => {
                *status = STATUS_OK;
                self.alloc_string(&text)
            }
            None => ptr::null_mut(),
        };
        self.leave();
        out
    }

    unsafe fn decode_batch_flat(
        &self,
        _handle: *mut RawTokenizer,
        flat_ids: &[u32],
        lengths: &[usize],
        _skip_special_tokens: bool,
        output: &mut [*mut c_char],
        status: &mut c_int,
    ) -> c_int {
        self.stats.lock().unwrap().decode_batch_calls += 1;
        assert_eq!(lengths.iter().sum::<usize>(), flat_ids.len());
        assert_eq!(lengths.len(), output.len());
        assert!(output.iter().all(|slot| slot.is_null()));

        let fail_after = self.config.lock().unwrap().fail_batch_after;
        let mut offset = 0;
        let mut written = 0;
        for (slot, &len) in output.iter_mut().zip(lengths) {
            let ids = &flat_ids[offset..offset + len];
            offset += len;
            if len == 0 {
                continue;
            }
            if fail_after == Some(written) {
                self.fail(status, "batch decode failed");
                return written as c_int;
            }
            match self.decode_ids(ids, status) {
                Some(text) => *slot = self.alloc_string(&text),
                None => return written as c_int,
            }
            written += 1;
        }

        *status = STATUS_OK;
        self.config
            .lock()
            .unwrap()
            .batch_count
            .unwrap_or(lengths.len() as c_int)
    }

    unsafe fn free_string(&self, value: *mut c_char) {
        self.untrack(value as usize, "string");
        self.stats.lock().unwrap().strings_freed += 1;
        drop(CString::from_raw(value));
    }

    unsafe fn enable_padding(
        &self,
        handle: *mut RawTokenizer,
        request: &PaddingRequest<'_>,
        status: &mut c_int,
    ) -> c_int {
        let strategy = if request.length < 0 {
            serde_json::json!("BatchLongest")
        } else {
            serde_json::json!({ "Fixed": request.length })
        };
        let multiple = (request.pad_to_multiple_of > 0).then_some(request.pad_to_multiple_of);
        let json = serde_json::json!({
            "strategy": strategy,
            "direction": if request.direction == DIRECTION_LEFT { "Left" } else { "Right" },
            "pad_to_multiple_of": multiple,
            "pad_id": request.pad_id,
            "pad_type_id": request.pad_type_id,
            "pad_token": request.pad_token.to_string_lossy(),
        });
        tokenizer(handle).padding = Some(json.to_string());
        *status = STATUS_OK;
        STATUS_OK
    }

    unsafe fn disable_padding(&self, handle: *mut RawTokenizer) {
        tokenizer(handle).padding = None;
    }

    unsafe fn padding(&self, handle: *mut RawTokenizer, status: &mut c_int) -> *mut c_char {
        *status = STATUS_OK;
        match &tokenizer(handle).padding {
            Some(json) => self.alloc_string(json),
            None => ptr::null_mut(),
        }
    }

    unsafe fn enable_truncation(
        &self,
        handle: *mut RawTokenizer,
        request: &TruncationRequest,
        status: &mut c_int,
    ) -> c_int {
        if request.stride >= request.max_length {
            self.fail(status, "stride must be less than max_length");
            return STATUS_ERROR;
        }
        tokenizer(handle).truncation = Some(*request);
        *status = STATUS_OK;
        STATUS_OK
    }

    unsafe fn disable_truncation(&self, handle: *mut RawTokenizer) {
        tokenizer(handle).truncation = None;
    }

    unsafe fn truncation(&self, handle: *mut RawTokenizer, status: &mut c_int) -> *mut c_char {
        *status = STATUS_OK;
        match tokenizer(handle).truncation {
            Some(t) => {
                let strategy = ["LongestFirst", "OnlyFirst", "OnlySecond"][t.strategy as usize];
                let json = serde_json::json!({
                    "direction": if t.direction == DIRECTION_LEFT { "Left" } else { "Right" },
                    "max_length": t.max_length,
                    "strategy": strategy,
                    "stride": t.stride,
                });
                self.alloc_string(&json.to_string())
            }
            None => ptr::null_mut(),
        }
    }

    unsafe fn token_to_id(
        &self,
        _handle: *mut RawTokenizer,
        token: &CStr,
        status: &mut c_int,
    ) -> c_int {
        *status = STATUS_OK;
        match token.to_str() {
            Ok("<s>") => 0,
            Ok(t) if !t.is_empty() && t.chars().all(|c| c.is_alphabetic()) => {
                t.chars().count() as c_int
            }
            _ => -1,
        }
    }

    unsafe fn id_to_token(
        &self,
        _handle: *mut RawTokenizer,
        id: c_int,
        status: &mut c_int,
    ) -> *mut c_char {
        *status = STATUS_OK;
        match id {
            0 => self.alloc_string("<s>"),
            1..=20 => self.alloc_string(&"x".repeat(id as usize)),
            _ => ptr::null_mut(),
        }
    }

    unsafe fn vocab_size(&self, _handle: *mut RawTokenizer, with_added_tokens: bool) -> usize {
        if with_added_tokens {
            21
        } else {
            20
        }
    }

    unsafe fn config_json(
        &self,
        _handle: *mut RawTokenizer,
        pretty: bool,
        status: &mut c_int,
    ) -> *mut c_char {
        *status = STATUS_OK;
        let json = serde_json::json!({ "engine": "fake" });
        let text = if pretty {
            serde_json::to_string_pretty(&json).unwrap()
        } else {
            json.to_string()
        };
        self.alloc_string(&text)
    }
}
