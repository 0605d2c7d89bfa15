//! C Foreign Function Interface of the native CharLS library.
//!
//! This module declares the C-compatible structures and the function pointer
//! table through which every foreign call is made. The table is filled once
//! when the library is loaded (see [`crate::library`]); nothing else in the
//! crate names a native symbol.

use std::os::raw::{c_char, c_void};

/// Opaque native encoder (`charls_jpegls_encoder`).
#[repr(C)]
pub struct RawEncoder {
    _private: [u8; 0],
}

/// Opaque native decoder (`charls_jpegls_decoder`).
#[repr(C)]
pub struct RawDecoder {
    _private: [u8; 0],
}

/// `charls_frame_info`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawFrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: i32,
    pub component_count: i32,
}

/// `charls_jpegls_pc_parameters`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawPcParameters {
    pub maximum_sample_value: i32,
    pub threshold1: i32,
    pub threshold2: i32,
    pub threshold3: i32,
    pub reset_value: i32,
}

/// `charls_spiff_header`. Enumerated fields travel as `int32_t`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSpiffHeader {
    pub profile_id: i32,
    pub component_count: i32,
    pub height: u32,
    pub width: u32,
    pub color_space: i32,
    pub bits_per_sample: i32,
    pub compression_type: i32,
    pub resolution_units: i32,
    pub vertical_resolution: u32,
    pub horizontal_resolution: u32,
}

/// Result code returned by every fallible native function; zero is success.
pub type NativeResult = i32;

/// `charls_get_version_number`.
pub type GetVersionNumber = unsafe extern "C" fn(major: *mut i32, minor: *mut i32, patch: *mut i32);

/// `charls_at_comment_handler`.
pub type AtCommentHandler =
    unsafe extern "C" fn(data: *const c_void, size: usize, user_context: *mut c_void) -> i32;

/// `charls_at_application_data_handler`.
pub type AtApplicationDataHandler = unsafe extern "C" fn(
    application_data_id: i32,
    data: *const c_void,
    size: usize,
    user_context: *mut c_void,
) -> i32;

/// The complete set of native entry points used by the binding.
///
/// One table serves every platform and pointer width; the loader picks the
/// symbols once and sessions only ever call through these pointers.
#[derive(Clone, Copy)]
pub struct CharlsApi {
    pub get_version_number: GetVersionNumber,
    pub get_error_message: unsafe extern "C" fn(error_value: i32) -> *const c_char,

    pub encoder_create: unsafe extern "C" fn() -> *mut RawEncoder,
    pub encoder_destroy: unsafe extern "C" fn(encoder: *const RawEncoder),
    pub encoder_set_frame_info:
        unsafe extern "C" fn(encoder: *mut RawEncoder, frame_info: *const RawFrameInfo) -> NativeResult,
    pub encoder_set_near_lossless:
        unsafe extern "C" fn(encoder: *mut RawEncoder, near_lossless: i32) -> NativeResult,
    pub encoder_set_interleave_mode:
        unsafe extern "C" fn(encoder: *mut RawEncoder, interleave_mode: i32) -> NativeResult,
    pub encoder_set_encoding_options:
        unsafe extern "C" fn(encoder: *mut RawEncoder, encoding_options: i32) -> NativeResult,
    pub encoder_set_preset_coding_parameters: unsafe extern "C" fn(
        encoder: *mut RawEncoder,
        preset_coding_parameters: *const RawPcParameters,
    ) -> NativeResult,
    pub encoder_set_color_transformation:
        unsafe extern "C" fn(encoder: *mut RawEncoder, color_transformation: i32) -> NativeResult,
    pub encoder_get_estimated_destination_size:
        unsafe extern "C" fn(encoder: *const RawEncoder, size_in_bytes: *mut usize) -> NativeResult,
    pub encoder_set_destination_buffer: unsafe extern "C" fn(
        encoder: *mut RawEncoder,
        destination_buffer: *mut c_void,
        destination_size_bytes: usize,
    ) -> NativeResult,
    pub encoder_write_standard_spiff_header: unsafe extern "C" fn(
        encoder: *mut RawEncoder,
        color_space: i32,
        resolution_units: i32,
        vertical_resolution: u32,
        horizontal_resolution: u32,
    ) -> NativeResult,
    pub encoder_write_spiff_header:
        unsafe extern "C" fn(encoder: *mut RawEncoder, spiff_header: *const RawSpiffHeader) -> NativeResult,
    pub encoder_write_comment:
        unsafe extern "C" fn(encoder: *mut RawEncoder, comment: *const c_void, size: usize) -> NativeResult,
    pub encoder_write_application_data: unsafe extern "C" fn(
        encoder: *mut RawEncoder,
        application_data_id: i32,
        application_data: *const c_void,
        size: usize,
    ) -> NativeResult,
    pub encoder_encode_from_buffer: unsafe extern "C" fn(
        encoder: *mut RawEncoder,
        source_buffer: *const c_void,
        source_size_bytes: usize,
        stride: u32,
    ) -> NativeResult,
    pub encoder_get_bytes_written:
        unsafe extern "C" fn(encoder: *const RawEncoder, bytes_written: *mut usize) -> NativeResult,
    pub encoder_rewind: unsafe extern "C" fn(encoder: *mut RawEncoder) -> NativeResult,

    pub decoder_create: unsafe extern "C" fn() -> *mut RawDecoder,
    pub decoder_destroy: unsafe extern "C" fn(decoder: *const RawDecoder),
    pub decoder_set_source_buffer: unsafe extern "C" fn(
        decoder: *mut RawDecoder,
        source_buffer: *const c_void,
        source_size_bytes: usize,
    ) -> NativeResult,
    pub decoder_read_spiff_header: unsafe extern "C" fn(
        decoder: *mut RawDecoder,
        spiff_header: *mut RawSpiffHeader,
        header_found: *mut i32,
    ) -> NativeResult,
    pub decoder_read_header: unsafe extern "C" fn(decoder: *mut RawDecoder) -> NativeResult,
    pub decoder_get_frame_info:
        unsafe extern "C" fn(decoder: *const RawDecoder, frame_info: *mut RawFrameInfo) -> NativeResult,
    pub decoder_get_near_lossless: unsafe extern "C" fn(
        decoder: *const RawDecoder,
        component: i32,
        near_lossless: *mut i32,
    ) -> NativeResult,
    pub decoder_get_interleave_mode:
        unsafe extern "C" fn(decoder: *const RawDecoder, interleave_mode: *mut i32) -> NativeResult,
    pub decoder_get_color_transformation: unsafe extern "C" fn(
        decoder: *const RawDecoder,
        color_transformation: *mut i32,
    ) -> NativeResult,
    pub decoder_get_preset_coding_parameters: unsafe extern "C" fn(
        decoder: *const RawDecoder,
        reserved: i32,
        preset_coding_parameters: *mut RawPcParameters,
    ) -> NativeResult,
    pub decoder_get_destination_size: unsafe extern "C" fn(
        decoder: *const RawDecoder,
        stride: u32,
        destination_size_bytes: *mut usize,
    ) -> NativeResult,
    pub decoder_decode_to_buffer: unsafe extern "C" fn(
        decoder: *mut RawDecoder,
        destination_buffer: *mut c_void,
        destination_size_bytes: usize,
        stride: u32,
    ) -> NativeResult,
    pub decoder_at_comment: unsafe extern "C" fn(
        decoder: *mut RawDecoder,
        handler: Option<AtCommentHandler>,
        user_context: *mut c_void,
    ) -> NativeResult,
    pub decoder_at_application_data: unsafe extern "C" fn(
        decoder: *mut RawDecoder,
        handler: Option<AtApplicationDataHandler>,
        user_context: *mut c_void,
    ) -> NativeResult,
}
