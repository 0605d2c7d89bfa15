//! Still Picture Interchange File Format (SPIFF) header values.

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{ErrorCode, JpeglsError};
use crate::ffi::RawSpiffHeader;

/// SPIFF profile identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum SpiffProfileId {
    #[default]
    None = 0,
    ContinuousToneBase = 1,
    ContinuousToneProgressive = 2,
    BiLevelFacsimile = 3,
    ContinuousToneFacsimile = 4,
}

/// SPIFF color space identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum SpiffColorSpace {
    BiLevelBlack = 0,
    YCbCrItuBt709Video = 1,
    None = 2,
    YCbCrItuBt6011Rgb = 3,
    YCbCrItuBt6011Video = 4,
    Grayscale = 8,
    PhotoYcc = 9,
    Rgb = 10,
    Cmy = 11,
    Cmyk = 12,
    Ycck = 13,
    CieLab = 14,
    BiLevelWhite = 15,
}

/// SPIFF compression type identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum SpiffCompressionType {
    Uncompressed = 0,
    ModifiedHuffman = 1,
    ModifiedRead = 2,
    ModifiedModifiedRead = 3,
    Jbig = 4,
    Jpeg = 5,
    JpegLs = 6,
}

/// SPIFF resolution units identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum SpiffResolutionUnits {
    /// Resolutions express the pixel aspect ratio only.
    #[default]
    AspectRatio = 0,
    DotsPerInch = 1,
    DotsPerCentimeter = 2,
}

/// SPIFF header as defined in ISO/IEC 10918-3, F.2.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiffHeader {
    pub profile_id: SpiffProfileId,
    pub component_count: i32,
    pub height: u32,
    pub width: u32,
    pub color_space: SpiffColorSpace,
    pub bits_per_sample: i32,
    pub compression_type: SpiffCompressionType,
    pub resolution_units: SpiffResolutionUnits,
    pub vertical_resolution: u32,
    pub horizontal_resolution: u32,
}

fn field<T: TryFromPrimitive<Primitive = i32>>(name: &str, value: i32) -> Result<T, JpeglsError> {
    T::try_from_primitive(value).map_err(|_| {
        JpeglsError::local(
            ErrorCode::InvalidEncodedData,
            format!("SPIFF header field {name} holds unsupported value {value}"),
        )
    })
}

fn count(name: &str, value: i32) -> Result<i32, JpeglsError> {
    if value < 0 {
        return Err(JpeglsError::local(
            ErrorCode::InvalidEncodedData,
            format!("SPIFF header field {name} holds negative value {value}"),
        ));
    }
    Ok(value)
}

impl TryFrom<RawSpiffHeader> for SpiffHeader {
    type Error = JpeglsError;

    fn try_from(raw: RawSpiffHeader) -> Result<Self, JpeglsError> {
        Ok(Self {
            profile_id: field("profile_id", raw.profile_id)?,
            component_count: count("component_count", raw.component_count)?,
            height: raw.height,
            width: raw.width,
            color_space: field("color_space", raw.color_space)?,
            bits_per_sample: count("bits_per_sample", raw.bits_per_sample)?,
            compression_type: field("compression_type", raw.compression_type)?,
            resolution_units: field("resolution_units", raw.resolution_units)?,
            vertical_resolution: raw.vertical_resolution,
            horizontal_resolution: raw.horizontal_resolution,
        })
    }
}

impl From<&SpiffHeader> for RawSpiffHeader {
    fn from(header: &SpiffHeader) -> Self {
        Self {
            profile_id: header.profile_id.into(),
            component_count: header.component_count,
            height: header.height,
            width: header.width,
            color_space: header.color_space.into(),
            bits_per_sample: header.bits_per_sample,
            compression_type: header.compression_type.into(),
            resolution_units: header.resolution_units.into(),
            vertical_resolution: header.vertical_resolution,
            horizontal_resolution: header.horizontal_resolution,
        }
    }
}
