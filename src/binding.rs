//! Pinning of caller buffers handed to native code.
//!
//! A binding holds the caller's borrow for as long as the native side may
//! read or write through the address it was given. While the borrow is held
//! the buffer can neither move nor be touched by anyone else, and releasing
//! the binding (explicitly, on rebind, or on drop) ends the borrow.

use tracing::debug;

use crate::error::{ErrorCode, JpeglsError};

/// A borrowed byte buffer whose address can be handed to native code.
pub(crate) trait PinnedBuffer {
    fn address(&mut self) -> *mut u8;
    fn size(&self) -> usize;
}

impl PinnedBuffer for &[u8] {
    // Only ever passed to `const void*` parameters.
    fn address(&mut self) -> *mut u8 {
        self.as_ptr().cast_mut()
    }

    fn size(&self) -> usize {
        self.len()
    }
}

impl PinnedBuffer for &mut [u8] {
    fn address(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }

    fn size(&self) -> usize {
        self.len()
    }
}

pub(crate) struct BufferBinding<B: PinnedBuffer> {
    buffer: Option<B>,
    label: &'static str,
}

impl<B: PinnedBuffer> BufferBinding<B> {
    pub(crate) const fn new(label: &'static str) -> Self {
        Self {
            buffer: None,
            label,
        }
    }

    /// Releases any previous buffer, then pins `buffer` and returns the
    /// address and size to pass to the native side.
    pub(crate) fn bind(&mut self, buffer: B) -> Result<(*mut u8, usize), JpeglsError> {
        self.unbind();

        let size = buffer.size();
        if size == 0 {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgument,
                format!("{} buffer must not be empty", self.label),
            ));
        }

        let pinned = self.buffer.insert(buffer);
        let address = pinned.address();
        debug!(buffer = self.label, ?address, size, "pinned buffer");
        Ok((address, size))
    }

    pub(crate) fn unbind(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            debug!(buffer = self.label, size = buffer.size(), "released buffer");
        }
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn get(&self) -> Option<&B> {
        self.buffer.as_ref()
    }
}

impl<B: PinnedBuffer> Drop for BufferBinding<B> {
    fn drop(&mut self) {
        self.unbind();
    }
}
