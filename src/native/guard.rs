//! Owning guards for engine allocations.
//!
//! Each guard frees its pointer through the interop that produced it when
//! dropped, so early returns and panics cannot leak native memory.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;

use super::{NativeInterop, RawEncoding};

/// An owned, NUL-terminated string returned by the engine.
pub(crate) struct NativeString<'a> {
    interop: &'a dyn NativeInterop,
    ptr: *mut c_char,
}

impl<'a> NativeString<'a> {
    /// Take ownership of `ptr`; `None` when it is null.
    ///
    /// # Safety
    /// `ptr` must be null or a string allocated by `interop` that nothing else frees.
    pub(crate) unsafe fn new(interop: &'a dyn NativeInterop, ptr: *mut c_char) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self { interop, ptr })
        }
    }

    /// Copy the contents into managed memory, replacing invalid UTF-8.
    pub(crate) fn to_string_lossy(&self) -> String {
        // SAFETY: non-null and NUL-terminated per the constructor contract.
        unsafe { CStr::from_ptr(self.ptr) }
            .to_string_lossy()
            .into_owned()
    }
}

impl Drop for NativeString<'_> {
    fn drop(&mut self) {
        unsafe { self.interop.free_string(self.ptr) }
    }
}

/// An owned encoding object returned by the engine.
pub(crate) struct NativeEncoding<'a> {
    interop: &'a dyn NativeInterop,
    ptr: *mut RawEncoding,
}

impl<'a> NativeEncoding<'a> {
    /// # Safety
    /// `ptr` must be null or an encoding allocated by `interop` that nothing else frees.
    pub(crate) unsafe fn new(interop: &'a dyn NativeInterop, ptr: *mut RawEncoding) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self { interop, ptr })
        }
    }

    pub(crate) fn as_ptr(&self) -> *const RawEncoding {
        self.ptr
    }
}

impl Drop for NativeEncoding<'_> {
    fn drop(&mut self) {
        unsafe { self.interop.encoding_free(self.ptr) }
    }
}

/// A table of string slots the engine fills in place.
///
/// Slots start null. [`take`](OutputTable::take) copies and frees one slot;
/// whatever is still populated when the table drops is freed then.
pub(crate) struct OutputTable<'a> {
    interop: &'a dyn NativeInterop,
    slots: Vec<*mut c_char>,
}

impl<'a> OutputTable<'a> {
    pub(crate) fn new(interop: &'a dyn NativeInterop, len: usize) -> Self {
        Self {
            interop,
            slots: vec![ptr::null_mut(); len],
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [*mut c_char] {
        &mut self.slots
    }

    /// Copy slot `index` out and free it. A null slot yields `""`.
    pub(crate) fn take(&mut self, index: usize) -> String {
        let ptr = std::mem::replace(&mut self.slots[index], ptr::null_mut());
        // SAFETY: slots only ever hold null or strings the engine wrote for us.
        match unsafe { NativeString::new(self.interop, ptr) } {
            Some(s) => s.to_string_lossy(),
            None => String::new(),
        }
    }

    /// Free every populated slot; returns how many were freed.
    pub(crate) fn release_all(&mut self) -> usize {
        let mut freed = 0;
        for slot in self.slots.iter_mut() {
            let ptr = std::mem::replace(slot, ptr::null_mut());
            if !ptr.is_null() {
                unsafe { self.interop.free_string(ptr) };
                freed += 1;
            }
        }
        freed
    }
}

impl Drop for OutputTable<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::fake::FakeInterop;

    #[test]
    fn test_native_string_frees_on_drop() {
        let fake = FakeInterop::new();
        let ptr = fake.alloc_string("hello");
        {
            let s = unsafe { NativeString::new(&fake, ptr) }.unwrap();
            assert_eq!(s.to_string_lossy(), "hello");
        }
        assert_eq!(fake.stats().strings_freed, 1);
        assert_eq!(fake.live_allocations(), 0);
    }

    #[test]
    fn test_native_string_null_is_none() {
        let fake = FakeInterop::new();
        assert!(unsafe { NativeString::new(&fake, ptr::null_mut()) }.is_none());
        assert_eq!(fake.stats().strings_freed, 0);
    }

    #[test]
    fn test_output_table_take_and_drop() {
        let fake = FakeInterop::new();
        {
            let mut table = OutputTable::new(&fake, 3);
            table.as_mut_slice()[0] = fake.alloc_string("a");
            table.as_mut_slice()[2] = fake.alloc_string("c");

            assert_eq!(table.take(0), "a");
            assert_eq!(table.take(1), "");
            assert_eq!(fake.stats().strings_freed, 1);
        }
        // Slot 2 was never taken; the drop frees it.
        assert_eq!(fake.stats().strings_freed, 2);
        assert_eq!(fake.live_allocations(), 0);
    }

    #[test]
    fn test_output_table_release_all_is_idempotent() {
        let fake = FakeInterop::new();
        let mut table = OutputTable::new(&fake, 2);
        table.as_mut_slice()[1] = fake.alloc_string("x");
        assert_eq!(table.release_all(), 1);
        assert_eq!(table.release_all(), 0);
        drop(table);
        assert_eq!(fake.stats().strings_freed, 1);
    }
}
