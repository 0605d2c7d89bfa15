//! Safe session API over the native CharLS JPEG-LS codec.
//!
//! The codec itself lives in the native library; this crate owns the native
//! contexts, keeps every buffer handed to native code pinned for as long as
//! the native side may use it, and turns native result codes into
//! [`JpeglsError`] values that carry the code, its [`ErrorCategory`] and the
//! native diagnostic message.
//!
//! ```no_run
//! use std::sync::Arc;
//! use jpegls_native::{CharlsLibrary, FrameInfo, JpeglsDecoder, JpeglsEncoder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let library = Arc::new(CharlsLibrary::load()?);
//! let pixels = vec![0u8; 256 * 256];
//!
//! let mut encoded = Vec::new();
//! let mut encoder = JpeglsEncoder::new(library.clone())?;
//! encoder.set_frame_info(FrameInfo::new(256, 256, 8, 1)?)?;
//! encoded.resize(encoder.estimated_destination_size()?, 0);
//! encoder.set_destination(&mut encoded)?;
//! let written = encoder.encode(&pixels, 0)?;
//! drop(encoder);
//! encoded.truncate(written);
//!
//! let mut decoder = JpeglsDecoder::new(library)?;
//! decoder.set_source(&encoded)?;
//! decoder.read_header()?;
//! let mut decoded = vec![0u8; decoder.destination_size(0)?];
//! decoder.decode(&mut decoded, 0)?;
//! assert_eq!(decoded, pixels);
//! # Ok(())
//! # }
//! ```

mod binding;
pub mod coding_parameters;
pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod ffi;
mod handle;
pub mod library;
pub mod spiff;

use std::ops::{BitOr, BitOrAssign};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::constants::{
    MAXIMUM_BITS_PER_SAMPLE, MAXIMUM_COMPONENT_COUNT, MAXIMUM_HEIGHT, MAXIMUM_WIDTH,
    MINIMUM_BITS_PER_SAMPLE, MINIMUM_COMPONENT_COUNT, MINIMUM_HEIGHT, MINIMUM_WIDTH,
};
use crate::ffi::RawFrameInfo;

pub use coding_parameters::JpeglsPcParameters;
pub use decoder::{DecoderState, JpeglsDecoder, JpeglsHeader, decode_to_vec};
pub use encoder::{EncodeOptions, EncoderState, JpeglsEncoder, encode_to_vec};
pub use error::{CallbackError, ErrorCategory, ErrorCode, JpeglsError};
pub use library::{CharlsLibrary, LoadError, Version};
pub use spiff::{
    SpiffColorSpace, SpiffCompressionType, SpiffHeader, SpiffProfileId, SpiffResolutionUnits,
};

/// Interleave mode for multi-component scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum InterleaveMode {
    /// No interleaving (one scan per component).
    #[default]
    None = 0,
    /// Interleaved by line.
    Line = 1,
    /// Interleaved by sample.
    Sample = 2,
}

/// HP color transformation applied to 3-component images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ColorTransformation {
    #[default]
    None = 0,
    Hp1 = 1,
    Hp2 = 2,
    Hp3 = 3,
}

/// Encoder option flags (`charls_encoding_options`).
///
/// Values are passed through unchecked; the native side rejects unknown bits
/// with [`ErrorCode::InvalidArgumentEncodingOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct EncodingOptions(i32);

impl EncodingOptions {
    pub const NONE: Self = Self(0);
    /// Pad the output with a trailing 0xFF so its size is even.
    pub const EVEN_DESTINATION_SIZE: Self = Self(1);
    /// Write the native library version in a comment segment.
    pub const INCLUDE_VERSION_NUMBER: Self = Self(2);
    /// Always write the preset coding parameters segment (needed by some JAI decoders).
    pub const INCLUDE_PC_PARAMETERS_JAI: Self = Self(4);

    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for EncodingOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EncodingOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Dimensions and sample layout of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: i32,
    pub component_count: i32,
}

impl FrameInfo {
    /// Creates a frame info, rejecting values outside the JPEG-LS limits.
    pub fn new(
        width: u32,
        height: u32,
        bits_per_sample: i32,
        component_count: i32,
    ) -> Result<Self, JpeglsError> {
        let frame_info = Self {
            width,
            height,
            bits_per_sample,
            component_count,
        };
        frame_info.validate()?;
        Ok(frame_info)
    }

    pub fn validate(&self) -> Result<(), JpeglsError> {
        if !(MINIMUM_WIDTH..=MAXIMUM_WIDTH).contains(&self.width) {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgumentWidth,
                format!("width {} is outside [{MINIMUM_WIDTH}, {MAXIMUM_WIDTH}]", self.width),
            ));
        }
        if !(MINIMUM_HEIGHT..=MAXIMUM_HEIGHT).contains(&self.height) {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgumentHeight,
                format!("height {} is outside [{MINIMUM_HEIGHT}, {MAXIMUM_HEIGHT}]", self.height),
            ));
        }
        if !(MINIMUM_BITS_PER_SAMPLE..=MAXIMUM_BITS_PER_SAMPLE).contains(&self.bits_per_sample) {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgumentBitsPerSample,
                format!(
                    "bits per sample {} is outside [{MINIMUM_BITS_PER_SAMPLE}, {MAXIMUM_BITS_PER_SAMPLE}]",
                    self.bits_per_sample
                ),
            ));
        }
        if !(MINIMUM_COMPONENT_COUNT..=MAXIMUM_COMPONENT_COUNT).contains(&self.component_count) {
            return Err(JpeglsError::local(
                ErrorCode::InvalidArgumentComponentCount,
                format!(
                    "component count {} is outside [{MINIMUM_COMPONENT_COUNT}, {MAXIMUM_COMPONENT_COUNT}]",
                    self.component_count
                ),
            ));
        }
        Ok(())
    }

    /// Bytes needed for one sample: 1 up to 8 bits, 2 above.
    pub fn bytes_per_sample(&self) -> usize {
        if self.bits_per_sample <= 8 { 1 } else { 2 }
    }

    /// Size of a tightly packed, sample-interleaved pixel buffer, or `None`
    /// when it does not fit in `usize`.
    pub fn pixel_data_size(&self) -> Option<usize> {
        let component_count = usize::try_from(self.component_count).ok()?;
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(component_count)?
            .checked_mul(self.bytes_per_sample())
    }
}

impl From<FrameInfo> for RawFrameInfo {
    fn from(frame_info: FrameInfo) -> Self {
        Self {
            width: frame_info.width,
            height: frame_info.height,
            bits_per_sample: frame_info.bits_per_sample,
            component_count: frame_info.component_count,
        }
    }
}

impl From<RawFrameInfo> for FrameInfo {
    fn from(raw: RawFrameInfo) -> Self {
        Self {
            width: raw.width,
            height: raw.height,
            bits_per_sample: raw.bits_per_sample,
            component_count: raw.component_count,
        }
    }
}
