//! Native result codes and their translation into typed errors.
//!
//! Every foreign call returns an `int32_t` result code. Zero is success; every
//! other value is looked up in [`ERROR_TABLE`] to find its [`ErrorCategory`],
//! and the human readable text is fetched from the native library itself.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::library::CharlsLibrary;

/// Boxed error returned by user supplied metadata handlers.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result codes reported by the native codec (`charls_jpegls_errc`).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ErrorCode {
    #[error("Invalid argument")]
    InvalidArgument = 1,
    #[error("Parameter value not supported")]
    ParameterValueNotSupported = 2,
    #[error("Destination buffer too small")]
    DestinationBufferTooSmall = 3,
    #[error("Source buffer too small")]
    SourceBufferTooSmall = 4,
    #[error("Invalid encoded data")]
    InvalidEncodedData = 5,
    #[error("Too much encoded data")]
    TooMuchEncodedData = 6,
    #[error("Invalid operation")]
    InvalidOperation = 7,
    #[error("Bit depth for transform not supported")]
    BitDepthForTransformNotSupported = 8,
    #[error("Color transform not supported")]
    ColorTransformNotSupported = 9,
    #[error("Encoding not supported")]
    EncodingNotSupported = 10,
    #[error("Unknown JPEG marker found")]
    UnknownJpegMarkerFound = 11,
    #[error("JPEG marker start byte not found")]
    JpegMarkerStartByteNotFound = 12,
    #[error("Not enough memory")]
    NotEnoughMemory = 13,
    #[error("Unexpected failure")]
    UnexpectedFailure = 14,
    #[error("Start of image marker not found")]
    StartOfImageMarkerNotFound = 15,
    #[error("Unexpected marker found")]
    UnexpectedMarkerFound = 16,
    #[error("Invalid marker segment size")]
    InvalidMarkerSegmentSize = 17,
    #[error("Duplicate start of image marker")]
    DuplicateStartOfImageMarker = 18,
    #[error("Duplicate start of frame marker")]
    DuplicateStartOfFrameMarker = 19,
    #[error("Duplicate component ID in SOF segment")]
    DuplicateComponentIdInSofSegment = 20,
    #[error("Unexpected end of image marker")]
    UnexpectedEndOfImageMarker = 21,
    #[error("Invalid JPEG-LS preset parameter type")]
    InvalidJpeglsPresetParameterType = 22,
    #[error("JPEG-LS preset extended parameter type not supported")]
    JpeglsPresetExtendedParameterTypeNotSupported = 23,
    #[error("Missing end of SPIFF directory")]
    MissingEndOfSpiffDirectory = 24,
    #[error("Unexpected restart marker")]
    UnexpectedRestartMarker = 25,
    #[error("Restart marker not found")]
    RestartMarkerNotFound = 26,
    #[error("Callback failed")]
    CallbackFailed = 27,
    #[error("End of image marker not found")]
    EndOfImageMarkerNotFound = 28,
    #[error("Unexpected define number of lines marker")]
    UnexpectedDefineNumberOfLinesMarker = 29,
    #[error("Define number of lines marker not found")]
    DefineNumberOfLinesMarkerNotFound = 30,
    #[error("Unknown component ID")]
    UnknownComponentId = 31,
    #[error("Abbreviated format and SPIFF header mismatch")]
    AbbreviatedFormatAndSpiffHeaderMismatch = 32,
    #[error("Invalid parameter mapping table ID")]
    InvalidParameterMappingTableId = 33,
    #[error("Invalid parameter mapping table continuation")]
    InvalidParameterMappingTableContinuation = 34,

    // Logic errors
    #[error("Invalid argument width")]
    InvalidArgumentWidth = 100,
    #[error("Invalid argument height")]
    InvalidArgumentHeight = 101,
    #[error("Invalid argument component count")]
    InvalidArgumentComponentCount = 102,
    #[error("Invalid argument bits per sample")]
    InvalidArgumentBitsPerSample = 103,
    #[error("Invalid argument interleave mode")]
    InvalidArgumentInterleaveMode = 104,
    #[error("Invalid argument near lossless")]
    InvalidArgumentNearLossless = 105,
    #[error("Invalid argument JPEG-LS PC parameters")]
    InvalidArgumentJpeglsPcParameters = 106,
    #[error("Invalid argument SPIFF entry size")]
    InvalidArgumentSpiffEntrySize = 110,
    #[error("Invalid argument color transformation")]
    InvalidArgumentColorTransformation = 111,
    #[error("Invalid argument stride")]
    InvalidArgumentStride = 112,
    #[error("Invalid argument encoding options")]
    InvalidArgumentEncodingOptions = 113,

    // Invalid values found in the encoded stream
    #[error("Invalid parameter width")]
    InvalidParameterWidth = 200,
    #[error("Invalid parameter height")]
    InvalidParameterHeight = 201,
    #[error("Invalid parameter component count")]
    InvalidParameterComponentCount = 202,
    #[error("Invalid parameter bits per sample")]
    InvalidParameterBitsPerSample = 203,
    #[error("Invalid parameter interleave mode")]
    InvalidParameterInterleaveMode = 204,
    #[error("Invalid parameter near lossless")]
    InvalidParameterNearLossless = 205,
    #[error("Invalid parameter JPEG-LS preset parameters")]
    InvalidParameterJpeglsPresetParameters = 206,
}

/// Semantic grouping of result codes, used to decide how a caller can recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The encoded stream is corrupt or uses an unsupported encoding.
    InvalidData,
    /// A caller supplied value is outside its defined range.
    InvalidArgument,
    /// An enum typed argument holds a value the native side does not know.
    InvalidEnumValue,
    /// The call is not allowed in the current session state.
    InvalidOperation,
    /// Allocation failure or an unclassified native fault. The session must
    /// not be used any further.
    Unexpected,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidData => "invalid data",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidEnumValue => "invalid enumerated value",
            Self::InvalidOperation => "invalid operation",
            Self::Unexpected => "unexpected failure",
        };
        f.write_str(name)
    }
}

use ErrorCategory::{
    InvalidArgument as Arg, InvalidData as Data, InvalidEnumValue as Enum,
    InvalidOperation as Op, Unexpected,
};

/// Category assignment of every native result code.
pub static ERROR_TABLE: &[(ErrorCode, ErrorCategory)] = &[
    (ErrorCode::InvalidArgument, Arg),
    (ErrorCode::ParameterValueNotSupported, Data),
    (ErrorCode::DestinationBufferTooSmall, Arg),
    (ErrorCode::SourceBufferTooSmall, Data),
    (ErrorCode::InvalidEncodedData, Data),
    (ErrorCode::TooMuchEncodedData, Data),
    (ErrorCode::InvalidOperation, Op),
    (ErrorCode::BitDepthForTransformNotSupported, Data),
    (ErrorCode::ColorTransformNotSupported, Data),
    (ErrorCode::EncodingNotSupported, Data),
    (ErrorCode::UnknownJpegMarkerFound, Data),
    (ErrorCode::JpegMarkerStartByteNotFound, Data),
    (ErrorCode::NotEnoughMemory, Unexpected),
    (ErrorCode::UnexpectedFailure, Unexpected),
    (ErrorCode::StartOfImageMarkerNotFound, Data),
    (ErrorCode::UnexpectedMarkerFound, Data),
    (ErrorCode::InvalidMarkerSegmentSize, Data),
    (ErrorCode::DuplicateStartOfImageMarker, Data),
    (ErrorCode::DuplicateStartOfFrameMarker, Data),
    (ErrorCode::DuplicateComponentIdInSofSegment, Data),
    (ErrorCode::UnexpectedEndOfImageMarker, Data),
    (ErrorCode::InvalidJpeglsPresetParameterType, Data),
    (ErrorCode::JpeglsPresetExtendedParameterTypeNotSupported, Data),
    (ErrorCode::MissingEndOfSpiffDirectory, Data),
    (ErrorCode::UnexpectedRestartMarker, Data),
    (ErrorCode::RestartMarkerNotFound, Data),
    (ErrorCode::CallbackFailed, Unexpected),
    (ErrorCode::EndOfImageMarkerNotFound, Data),
    (ErrorCode::UnexpectedDefineNumberOfLinesMarker, Data),
    (ErrorCode::DefineNumberOfLinesMarkerNotFound, Data),
    (ErrorCode::UnknownComponentId, Data),
    (ErrorCode::AbbreviatedFormatAndSpiffHeaderMismatch, Data),
    (ErrorCode::InvalidParameterMappingTableId, Data),
    (ErrorCode::InvalidParameterMappingTableContinuation, Data),
    (ErrorCode::InvalidArgumentWidth, Arg),
    (ErrorCode::InvalidArgumentHeight, Arg),
    (ErrorCode::InvalidArgumentComponentCount, Arg),
    (ErrorCode::InvalidArgumentBitsPerSample, Arg),
    (ErrorCode::InvalidArgumentInterleaveMode, Enum),
    (ErrorCode::InvalidArgumentNearLossless, Arg),
    (ErrorCode::InvalidArgumentJpeglsPcParameters, Arg),
    (ErrorCode::InvalidArgumentSpiffEntrySize, Arg),
    (ErrorCode::InvalidArgumentColorTransformation, Enum),
    (ErrorCode::InvalidArgumentStride, Arg),
    (ErrorCode::InvalidArgumentEncodingOptions, Enum),
    (ErrorCode::InvalidParameterWidth, Data),
    (ErrorCode::InvalidParameterHeight, Data),
    (ErrorCode::InvalidParameterComponentCount, Data),
    (ErrorCode::InvalidParameterBitsPerSample, Data),
    (ErrorCode::InvalidParameterInterleaveMode, Data),
    (ErrorCode::InvalidParameterNearLossless, Data),
    (ErrorCode::InvalidParameterJpeglsPresetParameters, Data),
];

impl ErrorCode {
    /// Looks up the category of this code. Codes missing from the table are
    /// treated as unexpected failures.
    pub fn category(self) -> ErrorCategory {
        ERROR_TABLE
            .iter()
            .find(|(code, _)| *code == self)
            .map_or(ErrorCategory::Unexpected, |(_, category)| *category)
    }
}

#[derive(Error, Debug)]
pub enum JpeglsError {
    /// A known result code, either reported by the native library or raised
    /// by the binding before reaching it.
    #[error("{message}")]
    Codec { code: ErrorCode, message: String },

    /// The native library returned a code this binding does not know.
    #[error("unrecognized native error {code}: {message}")]
    Unrecognized { code: i32, message: String },

    /// The session (or its native handle) has already been released.
    #[error("{0} has already been disposed")]
    Disposed(&'static str),

    /// A comment or application data handler failed during a native call.
    #[error("metadata callback failed: {0}")]
    Callback(#[source] CallbackError),
}

impl JpeglsError {
    /// Builds an error raised by the binding itself, with a context message.
    pub(crate) fn local(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Codec {
            code,
            message: message.into(),
        }
    }

    /// Translates a failed native result code, fetching the native message.
    pub(crate) fn from_native(library: &CharlsLibrary, raw: i32) -> Self {
        match ErrorCode::try_from(raw) {
            Ok(code) => Self::Codec {
                code,
                message: library
                    .error_message(raw)
                    .unwrap_or_else(|| code.to_string()),
            },
            Err(_) => Self::Unrecognized {
                code: raw,
                message: library
                    .error_message(raw)
                    .unwrap_or_else(|| "unknown error".to_string()),
            },
        }
    }

    /// The result code carried by this error, if it has one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Codec { code, .. } => Some(*code),
            Self::Unrecognized { .. } => None,
            Self::Disposed(_) => Some(ErrorCode::InvalidOperation),
            Self::Callback(_) => Some(ErrorCode::CallbackFailed),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Codec { code, .. } => code.category(),
            Self::Unrecognized { .. } => ErrorCategory::Unexpected,
            Self::Disposed(_) => ErrorCategory::InvalidOperation,
            Self::Callback(_) => ErrorCategory::Unexpected,
        }
    }

    /// True when the caller can fix the argument or call order and keep using
    /// the same session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::InvalidArgument
                | ErrorCategory::InvalidEnumValue
                | ErrorCategory::InvalidOperation
        )
    }
}

/// Checks a native result code immediately after a foreign call.
pub(crate) fn check(library: &CharlsLibrary, raw: i32) -> Result<(), JpeglsError> {
    if raw == 0 {
        return Ok(());
    }

    let error = JpeglsError::from_native(library, raw);
    match error.category() {
        ErrorCategory::Unexpected => tracing::warn!(code = raw, %error, "native call failed"),
        category => tracing::trace!(code = raw, %category, %error, "native call failed"),
    }
    Err(error)
}
