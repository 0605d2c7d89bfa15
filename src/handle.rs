//! Ownership of native encoder and decoder contexts.

use std::ptr::NonNull;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ErrorCode, JpeglsError, check};
use crate::ffi::{CharlsApi, NativeResult, RawDecoder, RawEncoder};
use crate::library::CharlsLibrary;

/// Create/destroy entry points for one kind of native context.
pub(crate) trait HandleKind {
    type Raw;
    const NAME: &'static str;

    fn create(api: &CharlsApi) -> *mut Self::Raw;

    /// # Safety
    /// `raw` must come from `create` on the same table and not be destroyed yet.
    unsafe fn destroy(api: &CharlsApi, raw: *mut Self::Raw);
}

pub(crate) enum EncoderKind {}
pub(crate) enum DecoderKind {}

impl HandleKind for EncoderKind {
    type Raw = RawEncoder;
    const NAME: &'static str = "encoder";

    fn create(api: &CharlsApi) -> *mut RawEncoder {
        // SAFETY: no arguments; a null result is handled by the caller.
        unsafe { (api.encoder_create)() }
    }

    unsafe fn destroy(api: &CharlsApi, raw: *mut RawEncoder) {
        // SAFETY: forwarded from the trait contract.
        unsafe { (api.encoder_destroy)(raw) }
    }
}

impl HandleKind for DecoderKind {
    type Raw = RawDecoder;
    const NAME: &'static str = "decoder";

    fn create(api: &CharlsApi) -> *mut RawDecoder {
        // SAFETY: no arguments; a null result is handled by the caller.
        unsafe { (api.decoder_create)() }
    }

    unsafe fn destroy(api: &CharlsApi, raw: *mut RawDecoder) {
        // SAFETY: forwarded from the trait contract.
        unsafe { (api.decoder_destroy)(raw) }
    }
}

/// Exactly one native context. Destroyed at most once, on `destroy` or drop.
pub(crate) struct NativeHandle<K: HandleKind> {
    library: Arc<CharlsLibrary>,
    raw: Option<NonNull<K::Raw>>,
}

// SAFETY: native contexts are not bound to the thread that created them and
// the handle is never shared, only moved.
unsafe impl<K: HandleKind> Send for NativeHandle<K> {}

impl<K: HandleKind> NativeHandle<K> {
    pub(crate) fn create(library: Arc<CharlsLibrary>) -> Result<Self, JpeglsError> {
        let Some(raw) = NonNull::new(K::create(library.api())) else {
            return Err(JpeglsError::from_native(
                &library,
                ErrorCode::NotEnoughMemory.into(),
            ));
        };
        debug!(kind = K::NAME, address = ?raw, "created native handle");
        Ok(Self {
            library,
            raw: Some(raw),
        })
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.raw.is_some()
    }

    pub(crate) fn library(&self) -> &Arc<CharlsLibrary> {
        &self.library
    }

    /// The native pointer, refused once the handle has been destroyed.
    pub(crate) fn get(&self) -> Result<*mut K::Raw, JpeglsError> {
        self.raw
            .map(NonNull::as_ptr)
            .ok_or(JpeglsError::Disposed(K::NAME))
    }

    /// Makes one foreign call and checks its result code immediately.
    pub(crate) fn call(
        &self,
        f: impl FnOnce(&CharlsApi, *mut K::Raw) -> NativeResult,
    ) -> Result<(), JpeglsError> {
        let raw = self.get()?;
        check(&self.library, f(self.library.api(), raw))
    }

    pub(crate) fn destroy(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: `raw` came from `create` and `take` guarantees a single destroy.
            unsafe { K::destroy(self.library.api(), raw.as_ptr()) };
            debug!(kind = K::NAME, address = ?raw, "destroyed native handle");
        }
    }
}

impl<K: HandleKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        self.destroy();
    }
}
