//! JPEG-LS decoder session.
//!
//! SAFETY: every `unsafe` closure passed to `NativeHandle::call` receives a
//! live decoder pointer from the handle and passes only pointers to locals or
//! to bound buffers that outlive the call.

use std::any::Any;
use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::binding::BufferBinding;
use crate::constants::AUTO_CALCULATE_STRIDE;
use crate::encoder::checked_stride;
use crate::error::{CallbackError, ErrorCode, JpeglsError};
use crate::ffi::{
    AtApplicationDataHandler, AtCommentHandler, RawFrameInfo, RawPcParameters, RawSpiffHeader,
};
use crate::handle::{DecoderKind, NativeHandle};
use crate::library::CharlsLibrary;
use crate::spiff::SpiffHeader;
use crate::{ColorTransformation, FrameInfo, InterleaveMode, JpeglsPcParameters};

/// Handler for COM segments; receives a copy of the segment payload.
pub type CommentHandler<'a> = dyn FnMut(Vec<u8>) -> Result<(), CallbackError> + Send + 'a;

/// Handler for APPn segments; receives `n` and a copy of the payload.
pub type ApplicationDataHandler<'a> =
    dyn FnMut(i32, Vec<u8>) -> Result<(), CallbackError> + Send + 'a;

/// Header values read from the stream by [`JpeglsDecoder::read_header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpeglsHeader {
    pub frame_info: FrameInfo,
    pub near_lossless: i32,
    pub interleave_mode: InterleaveMode,
    pub color_transformation: ColorTransformation,
    pub preset_coding_parameters: JpeglsPcParameters,
}

/// Lifecycle of a [`JpeglsDecoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Created,
    SourceBound,
    HeaderRead(JpeglsHeader),
    Decoded(JpeglsHeader),
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpiffLookup {
    Pending,
    Done(Option<SpiffHeader>),
}

pub struct JpeglsDecoder<'a> {
    handle: NativeHandle<DecoderKind>,
    source: BufferBinding<&'a [u8]>,
    state: DecoderState,
    spiff: SpiffLookup,
    comment_handler: Option<Box<CommentHandler<'a>>>,
    application_data_handler: Option<Box<ApplicationDataHandler<'a>>>,
}

impl<'a> JpeglsDecoder<'a> {
    /// Creates a native decoder context.
    pub fn new(library: Arc<CharlsLibrary>) -> Result<Self, JpeglsError> {
        Ok(Self {
            handle: NativeHandle::create(library)?,
            source: BufferBinding::new("source"),
            state: DecoderState::Created,
            spiff: SpiffLookup::Pending,
            comment_handler: None,
            application_data_handler: None,
        })
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        !self.handle.is_valid()
    }

    fn ensure_alive(&self) -> Result<(), JpeglsError> {
        match self.state {
            DecoderState::Disposed => Err(JpeglsError::Disposed("decoder")),
            _ => Ok(()),
        }
    }

    fn invalid_state(&self, operation: &str) -> JpeglsError {
        match self.state {
            DecoderState::Disposed => JpeglsError::Disposed("decoder"),
            state => JpeglsError::local(
                ErrorCode::InvalidOperation,
                format!("{operation} is not allowed in decoder state {state:?}"),
            ),
        }
    }

    /// Registers a handler called for every COM segment met while reading the
    /// header or decoding.
    pub fn on_comment(
        &mut self,
        handler: impl FnMut(Vec<u8>) -> Result<(), CallbackError> + Send + 'a,
    ) -> Result<(), JpeglsError> {
        self.ensure_alive()?;
        self.comment_handler = Some(Box::new(handler));
        Ok(())
    }

    /// Registers a handler called for every APPn segment met while reading
    /// the header or decoding.
    pub fn on_application_data(
        &mut self,
        handler: impl FnMut(i32, Vec<u8>) -> Result<(), CallbackError> + Send + 'a,
    ) -> Result<(), JpeglsError> {
        self.ensure_alive()?;
        self.application_data_handler = Some(Box::new(handler));
        Ok(())
    }

    /// Binds the encoded stream. The source stays borrowed until it is
    /// replaced, the decoder is disposed or dropped.
    ///
    /// A native decoder accepts a single source, so binding a new one
    /// starts over with a fresh native context.
    pub fn set_source(&mut self, source: &'a [u8]) -> Result<(), JpeglsError> {
        self.ensure_alive()?;
        if source.is_empty() {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgument,
                "source buffer must not be empty",
            ));
        }

        if self.state != DecoderState::Created {
            match NativeHandle::create(self.handle.library().clone()) {
                Ok(handle) => {
                    // The old context may still read from the bound source.
                    self.handle = handle;
                    self.source.unbind();
                    self.state = DecoderState::Created;
                    debug!("replaced native decoder for a new source");
                }
                Err(error) => {
                    self.dispose();
                    return Err(error);
                }
            }
        }
        self.spiff = SpiffLookup::Pending;

        let (address, size) = self.source.bind(source)?;
        if let Err(error) = self.handle.call(|api, decoder| unsafe {
            (api.decoder_set_source_buffer)(decoder, address.cast_const().cast(), size)
        }) {
            self.source.unbind();
            return Err(error);
        }

        self.state = DecoderState::SourceBound;
        Ok(())
    }

    /// Reads an optional SPIFF header at the start of the stream. Allowed
    /// once, before [`read_header`](Self::read_header).
    ///
    /// When no SPIFF header is present the native reader continues through
    /// the frame header, so metadata handlers already fire here.
    pub fn try_read_spiff_header(&mut self) -> Result<Option<SpiffHeader>, JpeglsError> {
        if self.state != DecoderState::SourceBound || self.spiff != SpiffLookup::Pending {
            return Err(self.invalid_state("try_read_spiff_header"));
        }

        let mut raw = RawSpiffHeader::default();
        let mut header_found = 0i32;
        self.with_callbacks(|handle| {
            handle.call(|api, decoder| unsafe {
                (api.decoder_read_spiff_header)(decoder, &mut raw, &mut header_found)
            })
        })?;

        self.spiff = SpiffLookup::Done(None);
        if header_found == 0 {
            return Ok(None);
        }
        let header = SpiffHeader::try_from(raw)?;
        self.spiff = SpiffLookup::Done(Some(header));
        Ok(Some(header))
    }

    /// The SPIFF header found by [`try_read_spiff_header`](Self::try_read_spiff_header).
    pub fn spiff_header(&self) -> Result<Option<SpiffHeader>, JpeglsError> {
        self.ensure_alive()?;
        match self.spiff {
            SpiffLookup::Done(header) => Ok(header),
            SpiffLookup::Pending => Ok(None),
        }
    }

    /// Reads the frame and scan headers and caches their values.
    pub fn read_header(&mut self) -> Result<&JpeglsHeader, JpeglsError> {
        if self.state != DecoderState::SourceBound {
            return Err(self.invalid_state("read_header"));
        }

        self.with_callbacks(|handle| {
            handle.call(|api, decoder| unsafe { (api.decoder_read_header)(decoder) })
        })?;
        let header = query_header(&self.handle)?;
        debug!(frame_info = ?header.frame_info, near_lossless = header.near_lossless, "read JPEG-LS header");

        self.state = DecoderState::HeaderRead(header);
        self.header()
    }

    /// The cached header; available once [`read_header`](Self::read_header) succeeded.
    pub fn header(&self) -> Result<&JpeglsHeader, JpeglsError> {
        match &self.state {
            DecoderState::HeaderRead(header) | DecoderState::Decoded(header) => Ok(header),
            _ => Err(self.invalid_state("reading header values")),
        }
    }

    pub fn frame_info(&self) -> Result<FrameInfo, JpeglsError> {
        Ok(self.header()?.frame_info)
    }

    pub fn near_lossless(&self) -> Result<i32, JpeglsError> {
        Ok(self.header()?.near_lossless)
    }

    pub fn interleave_mode(&self) -> Result<InterleaveMode, JpeglsError> {
        Ok(self.header()?.interleave_mode)
    }

    pub fn color_transformation(&self) -> Result<ColorTransformation, JpeglsError> {
        Ok(self.header()?.color_transformation)
    }

    pub fn preset_coding_parameters(&self) -> Result<JpeglsPcParameters, JpeglsError> {
        Ok(self.header()?.preset_coding_parameters)
    }

    /// Size in bytes of the buffer [`decode`](Self::decode) needs for `stride`.
    pub fn destination_size(&self, stride: i32) -> Result<usize, JpeglsError> {
        self.header()?;
        let stride = checked_stride(stride)?;

        let mut size = 0usize;
        self.handle.call(|api, decoder| unsafe {
            (api.decoder_get_destination_size)(decoder, stride, &mut size)
        })?;
        Ok(size)
    }

    /// Decodes the image into `destination`. The destination is only borrowed
    /// for the duration of this call.
    pub fn decode(&mut self, destination: &mut [u8], stride: i32) -> Result<(), JpeglsError> {
        let DecoderState::HeaderRead(header) = self.state else {
            return Err(self.invalid_state("decode"));
        };
        let stride = checked_stride(stride)?;

        let mut binding = BufferBinding::new("destination");
        let (address, size) = binding.bind(destination)?;
        self.with_callbacks(|handle| {
            handle.call(|api, decoder| unsafe {
                (api.decoder_decode_to_buffer)(decoder, address.cast(), size, stride)
            })
        })?;
        binding.unbind();

        debug!(size, "decoded JPEG-LS stream");
        self.state = DecoderState::Decoded(header);
        Ok(())
    }

    /// Destroys the native context and releases the source. Safe to call more
    /// than once.
    pub fn dispose(&mut self) {
        if self.state == DecoderState::Disposed {
            return;
        }
        self.handle.destroy();
        self.source.unbind();
        self.comment_handler = None;
        self.application_data_handler = None;
        self.state = DecoderState::Disposed;
    }

    /// Runs one native call with the metadata trampolines registered, then
    /// unregisters them and surfaces any handler failure.
    fn with_callbacks<R>(
        &mut self,
        call: impl FnOnce(&NativeHandle<DecoderKind>) -> Result<R, JpeglsError>,
    ) -> Result<R, JpeglsError> {
        if self.comment_handler.is_none() && self.application_data_handler.is_none() {
            return call(&self.handle);
        }

        let comment_handler = self
            .comment_handler
            .is_some()
            .then_some(comment_trampoline as AtCommentHandler);
        let application_data_handler = self
            .application_data_handler
            .is_some()
            .then_some(application_data_trampoline as AtApplicationDataHandler);

        let mut context = CallbackContext {
            comment: self.comment_handler.as_deref_mut(),
            application_data: self.application_data_handler.as_deref_mut(),
            failure: None,
        };
        let user_context = (&raw mut context).cast::<c_void>();

        let handle = &self.handle;
        let registered = handle
            .call(|api, decoder| unsafe {
                (api.decoder_at_comment)(decoder, comment_handler, user_context)
            })
            .and_then(|()| {
                handle.call(|api, decoder| unsafe {
                    (api.decoder_at_application_data)(decoder, application_data_handler, user_context)
                })
            });
        let result = registered.and_then(|()| call(handle));

        // The context pointer dies with this frame.
        let unregistered = handle
            .call(|api, decoder| unsafe {
                (api.decoder_at_comment)(decoder, None, std::ptr::null_mut())
            })
            .and_then(|()| {
                handle.call(|api, decoder| unsafe {
                    (api.decoder_at_application_data)(decoder, None, std::ptr::null_mut())
                })
            });

        match context.failure.take() {
            Some(CallbackFailure::Panic(payload)) => panic::resume_unwind(payload),
            Some(CallbackFailure::Error(error)) => {
                warn!(%error, "metadata handler failed");
                Err(JpeglsError::Callback(error))
            }
            None => {
                let value = result?;
                unregistered?;
                Ok(value)
            }
        }
    }
}

impl Drop for JpeglsDecoder<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn query_header(handle: &NativeHandle<DecoderKind>) -> Result<JpeglsHeader, JpeglsError> {
    let mut frame_info = RawFrameInfo::default();
    handle.call(|api, decoder| unsafe { (api.decoder_get_frame_info)(decoder, &mut frame_info) })?;

    let mut near_lossless = 0i32;
    handle.call(|api, decoder| unsafe {
        (api.decoder_get_near_lossless)(decoder, 0, &mut near_lossless)
    })?;

    let mut interleave_mode = 0i32;
    handle.call(|api, decoder| unsafe {
        (api.decoder_get_interleave_mode)(decoder, &mut interleave_mode)
    })?;
    let interleave_mode = InterleaveMode::try_from(interleave_mode).map_err(|_| {
        JpeglsError::local(
            ErrorCode::InvalidParameterInterleaveMode,
            format!("stream uses unknown interleave mode {interleave_mode}"),
        )
    })?;

    let mut color_transformation = 0i32;
    handle.call(|api, decoder| unsafe {
        (api.decoder_get_color_transformation)(decoder, &mut color_transformation)
    })?;
    let color_transformation = ColorTransformation::try_from(color_transformation).map_err(|_| {
        JpeglsError::local(
            ErrorCode::ColorTransformNotSupported,
            format!("stream uses unknown color transformation {color_transformation}"),
        )
    })?;

    let mut pc_parameters = RawPcParameters::default();
    handle.call(|api, decoder| unsafe {
        (api.decoder_get_preset_coding_parameters)(decoder, 0, &mut pc_parameters)
    })?;

    Ok(JpeglsHeader {
        frame_info: frame_info.into(),
        near_lossless,
        interleave_mode,
        color_transformation,
        preset_coding_parameters: pc_parameters.into(),
    })
}

enum CallbackFailure {
    Error(CallbackError),
    Panic(Box<dyn Any + Send + 'static>),
}

/// Per-call state behind the native `user_context` pointer.
struct CallbackContext<'h, 'a> {
    comment: Option<&'h mut CommentHandler<'a>>,
    application_data: Option<&'h mut ApplicationDataHandler<'a>>,
    failure: Option<CallbackFailure>,
}

impl CallbackContext<'_, '_> {
    fn record(&mut self, outcome: std::thread::Result<Result<(), CallbackError>>) -> i32 {
        match outcome {
            Ok(Ok(())) => return 0,
            Ok(Err(error)) => self.failure = Some(CallbackFailure::Error(error)),
            Err(payload) => self.failure = Some(CallbackFailure::Panic(payload)),
        }
        ErrorCode::CallbackFailed.into()
    }
}

/// # Safety
/// `data` must be null or valid for `size` bytes.
unsafe fn copy_payload(data: *const c_void, size: usize) -> Vec<u8> {
    if data.is_null() || size == 0 {
        return Vec::new();
    }
    // SAFETY: non-null and valid for `size` bytes per the caller's contract.
    unsafe { std::slice::from_raw_parts(data.cast::<u8>(), size) }.to_vec()
}

unsafe extern "C" fn comment_trampoline(
    data: *const c_void,
    size: usize,
    user_context: *mut c_void,
) -> i32 {
    // SAFETY: `user_context` is the `CallbackContext` registered by
    // `with_callbacks`, which outlives the native call invoking us.
    let context = unsafe { &mut *user_context.cast::<CallbackContext<'_, '_>>() };
    if context.failure.is_some() {
        return ErrorCode::CallbackFailed.into();
    }
    let Some(handler) = context.comment.as_deref_mut() else {
        return 0;
    };
    // SAFETY: the native side passes a range valid for the duration of this call.
    let payload = unsafe { copy_payload(data, size) };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(payload)));
    context.record(outcome)
}

unsafe extern "C" fn application_data_trampoline(
    application_data_id: i32,
    data: *const c_void,
    size: usize,
    user_context: *mut c_void,
) -> i32 {
    // SAFETY: see `comment_trampoline`.
    let context = unsafe { &mut *user_context.cast::<CallbackContext<'_, '_>>() };
    if context.failure.is_some() {
        return ErrorCode::CallbackFailed.into();
    }
    let Some(handler) = context.application_data.as_deref_mut() else {
        return 0;
    };
    // SAFETY: as above.
    let payload = unsafe { copy_payload(data, size) };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(application_data_id, payload)));
    context.record(outcome)
}

/// Decodes a complete stream into a tightly packed buffer in one call.
pub fn decode_to_vec(
    library: Arc<CharlsLibrary>,
    source: &[u8],
) -> Result<(Vec<u8>, JpeglsHeader), JpeglsError> {
    let mut decoder = JpeglsDecoder::new(library)?;
    decoder.set_source(source)?;
    decoder.try_read_spiff_header()?;
    let header = *decoder.read_header()?;

    let mut destination = vec![0u8; decoder.destination_size(AUTO_CALCULATE_STRIDE)?];
    decoder.decode(&mut destination, AUTO_CALCULATE_STRIDE)?;
    Ok((destination, header))
}
