//! Ownership of a single native tokenizer handle.

use std::os::raw::c_int;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{NativeInterop, RawTokenizer, STATUS_OK};
use crate::error::TokenizerError;

/// One native tokenizer handle plus the lock that serializes access to it.
///
/// [`invoke`](NativeHandle::invoke) is the only way to reach the raw pointer.
/// [`release`](NativeHandle::release) frees the handle once; every later
/// `invoke` fails with [`TokenizerError::Released`].
pub struct NativeHandle {
    interop: Arc<dyn NativeInterop>,
    raw: Mutex<Option<NonNull<RawTokenizer>>>,
}

// The pointer is only handed to the interop while `raw` is locked, and the
// interop itself is Send + Sync.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    /// Run `create` against `interop` and take ownership of the result.
    ///
    /// On a non-zero status any non-null handle the engine still returned is
    /// freed before the engine's error is surfaced.
    pub fn create<F>(
        interop: Arc<dyn NativeInterop>,
        operation: &'static str,
        create: F,
    ) -> Result<Self, TokenizerError>
    where
        F: FnOnce(&dyn NativeInterop, &mut c_int) -> *mut RawTokenizer,
    {
        let mut status = STATUS_OK;
        let raw = create(interop.as_ref(), &mut status);

        if status != STATUS_OK {
            let detail = interop.last_error();
            if !raw.is_null() {
                warn!(operation, "engine returned a handle alongside a failure status");
                unsafe { interop.tokenizer_free(raw) };
            }
            return Err(TokenizerError::native(operation, detail));
        }

        let raw = NonNull::new(raw).ok_or_else(|| {
            TokenizerError::native(
                operation,
                Some("engine returned a null handle".to_string()),
            )
        })?;

        debug!(operation, "native tokenizer handle created");
        Ok(Self {
            interop,
            raw: Mutex::new(Some(raw)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<NonNull<RawTokenizer>>> {
        // A panic inside a previous call leaves the engine state as the last
        // completed native call left it.
        self.raw.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call `f` with the live handle while holding the instance lock.
    pub fn invoke<T, F>(&self, f: F) -> Result<T, TokenizerError>
    where
        F: FnOnce(&dyn NativeInterop, *mut RawTokenizer) -> Result<T, TokenizerError>,
    {
        let guard = self.lock();
        let raw = guard.ok_or(TokenizerError::Released)?;
        f(self.interop.as_ref(), raw.as_ptr())
    }

    /// Free the handle. Returns `true` the first time, `false` afterwards.
    pub fn release(&self) -> bool {
        let mut guard = self.lock();
        match guard.take() {
            Some(raw) => {
                unsafe { self.interop.tokenizer_free(raw.as_ptr()) };
                debug!("native tokenizer handle released");
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.lock().is_none()
    }
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        self.release();
    }
}
