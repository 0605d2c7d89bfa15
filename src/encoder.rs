//! JPEG-LS encoder session.
//!
//! SAFETY: every `unsafe` closure passed to `NativeHandle::call` receives a
//! live encoder pointer from the handle and passes only pointers to locals,
//! to caller slices borrowed for the call, or to the bound destination.

use std::sync::Arc;

use tracing::debug;

use crate::binding::BufferBinding;
use crate::constants::{AUTO_CALCULATE_STRIDE, MAXIMUM_APPLICATION_DATA_ID, MINIMUM_APPLICATION_DATA_ID};
use crate::error::{ErrorCode, JpeglsError};
use crate::ffi::{RawFrameInfo, RawPcParameters, RawSpiffHeader};
use crate::handle::{EncoderKind, NativeHandle};
use crate::library::CharlsLibrary;
use crate::spiff::{SpiffColorSpace, SpiffHeader, SpiffResolutionUnits};
use crate::{ColorTransformation, EncodingOptions, FrameInfo, InterleaveMode, JpeglsPcParameters};

/// Lifecycle of a [`JpeglsEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Created,
    FrameInfoSet,
    DestinationBound,
    Encoded,
    Disposed,
}

/// Configuration accepted by the native encoder, replayed when the native
/// context has to be replaced.
#[derive(Debug, Clone, Copy, Default)]
struct EncoderConfig {
    frame_info: Option<FrameInfo>,
    near_lossless: i32,
    interleave_mode: InterleaveMode,
    encoding_options: EncodingOptions,
    pc_parameters: Option<JpeglsPcParameters>,
    color_transformation: ColorTransformation,
}

pub struct JpeglsEncoder<'a> {
    handle: NativeHandle<EncoderKind>,
    destination: BufferBinding<&'a mut [u8]>,
    state: EncoderState,
    config: EncoderConfig,
}

impl<'a> JpeglsEncoder<'a> {
    /// Creates a native encoder context.
    pub fn new(library: Arc<CharlsLibrary>) -> Result<Self, JpeglsError> {
        Ok(Self {
            handle: NativeHandle::create(library)?,
            destination: BufferBinding::new("destination"),
            state: EncoderState::Created,
            config: EncoderConfig::default(),
        })
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        !self.handle.is_valid()
    }

    fn ensure_alive(&self) -> Result<(), JpeglsError> {
        match self.state {
            EncoderState::Disposed => Err(JpeglsError::Disposed("encoder")),
            _ => Ok(()),
        }
    }

    /// The frame info accepted by [`set_frame_info`](Self::set_frame_info).
    pub fn frame_info(&self) -> Result<Option<FrameInfo>, JpeglsError> {
        self.ensure_alive()?;
        Ok(self.config.frame_info)
    }

    pub fn near_lossless(&self) -> Result<i32, JpeglsError> {
        self.ensure_alive()?;
        Ok(self.config.near_lossless)
    }

    pub fn interleave_mode(&self) -> Result<InterleaveMode, JpeglsError> {
        self.ensure_alive()?;
        Ok(self.config.interleave_mode)
    }

    pub fn encoding_options(&self) -> Result<EncodingOptions, JpeglsError> {
        self.ensure_alive()?;
        Ok(self.config.encoding_options)
    }

    pub fn preset_coding_parameters(&self) -> Result<Option<JpeglsPcParameters>, JpeglsError> {
        self.ensure_alive()?;
        Ok(self.config.pc_parameters)
    }

    pub fn color_transformation(&self) -> Result<ColorTransformation, JpeglsError> {
        self.ensure_alive()?;
        Ok(self.config.color_transformation)
    }

    fn require(&self, operation: &str, allowed: &[EncoderState]) -> Result<(), JpeglsError> {
        self.ensure_alive()?;
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(JpeglsError::local(
            ErrorCode::InvalidOperation,
            format!("{operation} is not allowed in encoder state {:?}", self.state),
        ))
    }

    fn require_configurable(&self, operation: &str) -> Result<(), JpeglsError> {
        self.require(
            operation,
            &[
                EncoderState::Created,
                EncoderState::FrameInfoSet,
                EncoderState::DestinationBound,
            ],
        )
    }

    pub fn set_frame_info(&mut self, frame_info: FrameInfo) -> Result<(), JpeglsError> {
        self.require_configurable("set_frame_info")?;
        frame_info.validate()?;

        let raw = RawFrameInfo::from(frame_info);
        self.handle
            .call(|api, encoder| unsafe { (api.encoder_set_frame_info)(encoder, &raw) })?;

        self.config.frame_info = Some(frame_info);
        if self.state == EncoderState::Created {
            self.state = EncoderState::FrameInfoSet;
        }
        Ok(())
    }

    pub fn set_near_lossless(&mut self, near_lossless: i32) -> Result<(), JpeglsError> {
        self.require_configurable("set_near_lossless")?;
        self.handle
            .call(|api, encoder| unsafe { (api.encoder_set_near_lossless)(encoder, near_lossless) })?;
        self.config.near_lossless = near_lossless;
        Ok(())
    }

    pub fn set_interleave_mode(&mut self, interleave_mode: InterleaveMode) -> Result<(), JpeglsError> {
        self.require_configurable("set_interleave_mode")?;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_set_interleave_mode)(encoder, interleave_mode.into())
        })?;
        self.config.interleave_mode = interleave_mode;
        Ok(())
    }

    pub fn set_encoding_options(&mut self, encoding_options: EncodingOptions) -> Result<(), JpeglsError> {
        self.require_configurable("set_encoding_options")?;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_set_encoding_options)(encoder, encoding_options.bits())
        })?;
        self.config.encoding_options = encoding_options;
        Ok(())
    }

    pub fn set_preset_coding_parameters(
        &mut self,
        pc_parameters: JpeglsPcParameters,
    ) -> Result<(), JpeglsError> {
        self.require_configurable("set_preset_coding_parameters")?;
        let raw = RawPcParameters::from(pc_parameters);
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_set_preset_coding_parameters)(encoder, &raw)
        })?;
        self.config.pc_parameters = Some(pc_parameters);
        Ok(())
    }

    pub fn set_color_transformation(
        &mut self,
        color_transformation: ColorTransformation,
    ) -> Result<(), JpeglsError> {
        self.require_configurable("set_color_transformation")?;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_set_color_transformation)(encoder, color_transformation.into())
        })?;
        self.config.color_transformation = color_transformation;
        Ok(())
    }

    /// Worst case size of the encoded stream for the current configuration.
    pub fn estimated_destination_size(&self) -> Result<usize, JpeglsError> {
        self.require(
            "estimated_destination_size",
            &[
                EncoderState::FrameInfoSet,
                EncoderState::DestinationBound,
                EncoderState::Encoded,
            ],
        )?;
        let mut size = 0usize;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_get_estimated_destination_size)(encoder, &mut size)
        })?;
        Ok(size)
    }

    /// Binds the buffer the encoded stream is written to.
    ///
    /// The buffer stays borrowed until it is replaced, the encoder is disposed
    /// or dropped. Binding a new buffer over an existing one recreates the
    /// native context with the current configuration, because the native
    /// encoder keeps writing at the address it was first given.
    pub fn set_destination(&mut self, destination: &'a mut [u8]) -> Result<(), JpeglsError> {
        self.require(
            "set_destination",
            &[
                EncoderState::FrameInfoSet,
                EncoderState::DestinationBound,
                EncoderState::Encoded,
            ],
        )?;
        if destination.is_empty() {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgument,
                "destination buffer must not be empty",
            ));
        }

        if self.destination.is_bound() {
            self.replace_native_encoder()?;
        }

        let (address, size) = self.destination.bind(destination)?;
        if let Err(error) = self.handle.call(|api, encoder| unsafe {
            (api.encoder_set_destination_buffer)(encoder, address.cast(), size)
        }) {
            self.destination.unbind();
            self.state = EncoderState::FrameInfoSet;
            return Err(error);
        }

        self.state = EncoderState::DestinationBound;
        Ok(())
    }

    fn replace_native_encoder(&mut self) -> Result<(), JpeglsError> {
        let replacement = NativeHandle::create(self.handle.library().clone())
            .and_then(|handle| configure(&handle, &self.config).map(|()| handle));
        match replacement {
            Ok(handle) => {
                debug!("replaced native encoder for a new destination");
                // The old context still points into the bound buffer, so it
                // has to go before the buffer is released.
                self.handle = handle;
                self.destination.unbind();
                self.state = EncoderState::FrameInfoSet;
                Ok(())
            }
            Err(error) => {
                self.dispose();
                Err(error)
            }
        }
    }

    /// Writes a SPIFF header built from the frame info.
    pub fn write_standard_spiff_header(
        &mut self,
        color_space: SpiffColorSpace,
        resolution_units: SpiffResolutionUnits,
        vertical_resolution: u32,
        horizontal_resolution: u32,
    ) -> Result<(), JpeglsError> {
        self.require("write_standard_spiff_header", &[EncoderState::DestinationBound])?;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_write_standard_spiff_header)(
                encoder,
                color_space.into(),
                resolution_units.into(),
                vertical_resolution,
                horizontal_resolution,
            )
        })
    }

    pub fn write_spiff_header(&mut self, spiff_header: &SpiffHeader) -> Result<(), JpeglsError> {
        self.require("write_spiff_header", &[EncoderState::DestinationBound])?;
        let raw = RawSpiffHeader::from(spiff_header);
        self.handle
            .call(|api, encoder| unsafe { (api.encoder_write_spiff_header)(encoder, &raw) })
    }

    /// Writes a COM segment. The bytes are copied by the native side.
    pub fn write_comment(&mut self, comment: &[u8]) -> Result<(), JpeglsError> {
        self.require("write_comment", &[EncoderState::DestinationBound])?;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_write_comment)(encoder, comment.as_ptr().cast(), comment.len())
        })
    }

    /// Writes an APPn segment, `n` being `application_data_id` (0 to 15).
    pub fn write_application_data(
        &mut self,
        application_data_id: i32,
        application_data: &[u8],
    ) -> Result<(), JpeglsError> {
        self.require("write_application_data", &[EncoderState::DestinationBound])?;
        if !(MINIMUM_APPLICATION_DATA_ID..=MAXIMUM_APPLICATION_DATA_ID).contains(&application_data_id) {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgument,
                format!(
                    "application data id {application_data_id} is outside [{MINIMUM_APPLICATION_DATA_ID}, {MAXIMUM_APPLICATION_DATA_ID}]"
                ),
            ));
        }
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_write_application_data)(
                encoder,
                application_data_id,
                application_data.as_ptr().cast(),
                application_data.len(),
            )
        })
    }

    /// Encodes `source` into the bound destination and returns the number of
    /// bytes written. A stride of [`AUTO_CALCULATE_STRIDE`] means tightly
    /// packed rows.
    pub fn encode(&mut self, source: &[u8], stride: i32) -> Result<usize, JpeglsError> {
        self.require("encode", &[EncoderState::DestinationBound])?;
        let stride = checked_stride(stride)?;
        if source.is_empty() {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgument,
                "source buffer must not be empty",
            ));
        }

        self.handle.call(|api, encoder| unsafe {
            (api.encoder_encode_from_buffer)(encoder, source.as_ptr().cast(), source.len(), stride)
        })?;
        self.state = EncoderState::Encoded;

        let bytes_written = self.bytes_written()?;
        debug!(bytes_written, "encoded JPEG-LS stream");
        Ok(bytes_written)
    }

    pub fn bytes_written(&self) -> Result<usize, JpeglsError> {
        self.require(
            "bytes_written",
            &[EncoderState::DestinationBound, EncoderState::Encoded],
        )?;
        let mut bytes_written = 0usize;
        self.handle.call(|api, encoder| unsafe {
            (api.encoder_get_bytes_written)(encoder, &mut bytes_written)
        })?;
        Ok(bytes_written)
    }

    /// The part of the destination written so far.
    pub fn encoded_data(&self) -> Result<&[u8], JpeglsError> {
        let bytes_written = self.bytes_written()?;
        let destination = self.destination.get().ok_or_else(|| {
            JpeglsError::local(ErrorCode::InvalidOperation, "no destination is bound")
        })?;
        destination.get(..bytes_written).ok_or_else(|| {
            JpeglsError::local(
                ErrorCode::UnexpectedFailure,
                format!(
                    "native encoder reports {bytes_written} bytes written into a {} byte destination",
                    destination.len()
                ),
            )
        })
    }

    /// Resets the write position to the start of the destination so the
    /// same configuration can encode another image.
    pub fn rewind(&mut self) -> Result<(), JpeglsError> {
        self.require("rewind", &[EncoderState::DestinationBound, EncoderState::Encoded])?;
        self.handle
            .call(|api, encoder| unsafe { (api.encoder_rewind)(encoder) })?;
        self.state = EncoderState::DestinationBound;
        Ok(())
    }

    /// Destroys the native context and releases the destination. Safe to call
    /// more than once.
    pub fn dispose(&mut self) {
        if self.state == EncoderState::Disposed {
            return;
        }
        self.handle.destroy();
        self.destination.unbind();
        self.state = EncoderState::Disposed;
    }
}

impl Drop for JpeglsEncoder<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn configure(handle: &NativeHandle<EncoderKind>, config: &EncoderConfig) -> Result<(), JpeglsError> {
    if let Some(frame_info) = config.frame_info {
        let raw = RawFrameInfo::from(frame_info);
        handle.call(|api, encoder| unsafe { (api.encoder_set_frame_info)(encoder, &raw) })?;
    }
    handle.call(|api, encoder| unsafe {
        (api.encoder_set_near_lossless)(encoder, config.near_lossless)
    })?;
    handle.call(|api, encoder| unsafe {
        (api.encoder_set_interleave_mode)(encoder, config.interleave_mode.into())
    })?;
    handle.call(|api, encoder| unsafe {
        (api.encoder_set_encoding_options)(encoder, config.encoding_options.bits())
    })?;
    if let Some(pc_parameters) = config.pc_parameters {
        let raw = RawPcParameters::from(pc_parameters);
        handle.call(|api, encoder| unsafe {
            (api.encoder_set_preset_coding_parameters)(encoder, &raw)
        })?;
    }
    handle.call(|api, encoder| unsafe {
        (api.encoder_set_color_transformation)(encoder, config.color_transformation.into())
    })
}

pub(crate) fn checked_stride(stride: i32) -> Result<u32, JpeglsError> {
    u32::try_from(stride).map_err(|_| {
        JpeglsError::local(
            ErrorCode::InvalidArgumentStride,
            format!("stride {stride} is negative (use {AUTO_CALCULATE_STRIDE} for packed rows)"),
        )
    })
}

/// Settings for [`encode_to_vec`].
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    pub near_lossless: i32,
    pub interleave_mode: InterleaveMode,
    pub color_transformation: ColorTransformation,
    pub encoding_options: EncodingOptions,
    pub preset_coding_parameters: Option<JpeglsPcParameters>,
    /// Write a standard SPIFF header with this color space.
    pub spiff_color_space: Option<SpiffColorSpace>,
    pub comment: Option<Vec<u8>>,
}

/// Encodes a tightly packed image in one call.
pub fn encode_to_vec(
    library: Arc<CharlsLibrary>,
    source: &[u8],
    frame_info: FrameInfo,
    options: &EncodeOptions,
) -> Result<Vec<u8>, JpeglsError> {
    let mut destination = Vec::new();
    let mut encoder = JpeglsEncoder::new(library)?;
    encoder.set_frame_info(frame_info)?;
    if options.near_lossless != 0 {
        encoder.set_near_lossless(options.near_lossless)?;
    }
    if options.interleave_mode != InterleaveMode::None {
        encoder.set_interleave_mode(options.interleave_mode)?;
    }
    if options.color_transformation != ColorTransformation::None {
        encoder.set_color_transformation(options.color_transformation)?;
    }
    if options.encoding_options != EncodingOptions::NONE {
        encoder.set_encoding_options(options.encoding_options)?;
    }
    if let Some(pc_parameters) = options.preset_coding_parameters {
        encoder.set_preset_coding_parameters(pc_parameters)?;
    }

    destination.resize(encoder.estimated_destination_size()?, 0);
    encoder.set_destination(&mut destination)?;
    if let Some(color_space) = options.spiff_color_space {
        encoder.write_standard_spiff_header(color_space, SpiffResolutionUnits::AspectRatio, 1, 1)?;
    }
    if let Some(comment) = &options.comment {
        encoder.write_comment(comment)?;
    }
    let bytes_written = encoder.encode(source, AUTO_CALCULATE_STRIDE)?;
    drop(encoder);

    destination.truncate(bytes_written);
    Ok(destination)
}
