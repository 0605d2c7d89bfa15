// In-process stand-in for the native CharLS library.
//
// It follows the CharLS 2.x C contract closely enough to drive the session
// state machines, but stores samples uncompressed: SOI, optional SPIFF
// (APP8), COM/APPn, SOF55, optional LSE, SOS followed by the raw samples and
// EOI. Live handles are counted per thread so tests can check that every
// path releases its native context.

#![allow(dead_code)]

use std::cell::Cell;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::slice;
use std::sync::Arc;

use jpegls_native::CharlsLibrary;
use jpegls_native::ffi::{
    AtApplicationDataHandler, AtCommentHandler, CharlsApi, RawDecoder, RawEncoder, RawFrameInfo,
    RawPcParameters, RawSpiffHeader,
};

const SUCCESS: i32 = 0;
const INVALID_ARGUMENT: i32 = 1;
const DESTINATION_BUFFER_TOO_SMALL: i32 = 3;
const SOURCE_BUFFER_TOO_SMALL: i32 = 4;
const INVALID_OPERATION: i32 = 7;
const ENCODING_NOT_SUPPORTED: i32 = 10;
const UNKNOWN_JPEG_MARKER_FOUND: i32 = 11;
const JPEG_MARKER_START_BYTE_NOT_FOUND: i32 = 12;
const START_OF_IMAGE_MARKER_NOT_FOUND: i32 = 15;
const UNEXPECTED_MARKER_FOUND: i32 = 16;
const INVALID_MARKER_SEGMENT_SIZE: i32 = 17;
const DUPLICATE_START_OF_IMAGE_MARKER: i32 = 18;
const DUPLICATE_START_OF_FRAME_MARKER: i32 = 19;
const UNEXPECTED_END_OF_IMAGE_MARKER: i32 = 21;
const INVALID_JPEGLS_PRESET_PARAMETER_TYPE: i32 = 22;
const CALLBACK_FAILED: i32 = 27;
const END_OF_IMAGE_MARKER_NOT_FOUND: i32 = 28;
const INVALID_ARGUMENT_WIDTH: i32 = 100;
const INVALID_ARGUMENT_HEIGHT: i32 = 101;
const INVALID_ARGUMENT_COMPONENT_COUNT: i32 = 102;
const INVALID_ARGUMENT_BITS_PER_SAMPLE: i32 = 103;
const INVALID_ARGUMENT_INTERLEAVE_MODE: i32 = 104;
const INVALID_ARGUMENT_NEAR_LOSSLESS: i32 = 105;
const INVALID_ARGUMENT_COLOR_TRANSFORMATION: i32 = 111;
const INVALID_ARGUMENT_STRIDE: i32 = 112;
const INVALID_ARGUMENT_ENCODING_OPTIONS: i32 = 113;

const EVEN_DESTINATION_SIZE: i32 = 1;
const INCLUDE_VERSION_NUMBER: i32 = 2;
const INCLUDE_PC_PARAMETERS_JAI: i32 = 4;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const SOF55: u8 = 0xF7;
const LSE: u8 = 0xF8;
const COM: u8 = 0xFE;
const APP0: u8 = 0xE0;
const APP8: u8 = 0xE8;

const SPIFF_MAGIC: &[u8] = b"SPIFF\0";
const TRANSFORMATION_MAGIC: &[u8] = b"mrfx";

thread_local! {
    static LIVE_ENCODERS: Cell<usize> = const { Cell::new(0) };
    static LIVE_DECODERS: Cell<usize> = const { Cell::new(0) };
    static FAIL_NEXT_CREATE: Cell<bool> = const { Cell::new(false) };
}

/// Native encoder and decoder contexts alive on this thread.
pub fn live_handles() -> (usize, usize) {
    (LIVE_ENCODERS.get(), LIVE_DECODERS.get())
}

/// Makes the next `*_create` call on this thread return null.
pub fn fail_next_create() {
    FAIL_NEXT_CREATE.set(true);
}

pub fn fake_api() -> CharlsApi {
    CharlsApi {
        get_version_number: version_2_4,
        get_error_message: error_message,

        encoder_create,
        encoder_destroy,
        encoder_set_frame_info,
        encoder_set_near_lossless,
        encoder_set_interleave_mode,
        encoder_set_encoding_options,
        encoder_set_preset_coding_parameters,
        encoder_set_color_transformation,
        encoder_get_estimated_destination_size,
        encoder_set_destination_buffer,
        encoder_write_standard_spiff_header,
        encoder_write_spiff_header,
        encoder_write_comment,
        encoder_write_application_data,
        encoder_encode_from_buffer,
        encoder_get_bytes_written,
        encoder_rewind,

        decoder_create,
        decoder_destroy,
        decoder_set_source_buffer,
        decoder_read_spiff_header,
        decoder_read_header,
        decoder_get_frame_info,
        decoder_get_near_lossless,
        decoder_get_interleave_mode,
        decoder_get_color_transformation,
        decoder_get_preset_coding_parameters,
        decoder_get_destination_size,
        decoder_decode_to_buffer,
        decoder_at_comment,
        decoder_at_application_data,
    }
}

pub fn fake_library() -> Arc<CharlsLibrary> {
    // SAFETY: every entry of the fake table follows the CharLS contract and
    // is a plain function, callable forever.
    let library = unsafe { CharlsLibrary::from_api(fake_api()) };
    Arc::new(library.expect("fake library reports a supported version"))
}

/// Same table, but reporting the given version.
pub fn fake_api_with_version(major: i32, minor: i32) -> CharlsApi {
    VERSION.set((major, minor));
    CharlsApi {
        get_version_number: configured_version,
        ..fake_api()
    }
}

thread_local! {
    static VERSION: Cell<(i32, i32)> = const { Cell::new((2, 4)) };
}

unsafe extern "C" fn version_2_4(major: *mut i32, minor: *mut i32, patch: *mut i32) {
    unsafe {
        *major = 2;
        *minor = 4;
        *patch = 0;
    }
}

unsafe extern "C" fn configured_version(major: *mut i32, minor: *mut i32, patch: *mut i32) {
    let (configured_major, configured_minor) = VERSION.get();
    unsafe {
        *major = configured_major;
        *minor = configured_minor;
        *patch = 0;
    }
}

unsafe extern "C" fn error_message(error_value: i32) -> *const c_char {
    let message: &'static CStr = match error_value {
        SUCCESS => c"Success",
        INVALID_ARGUMENT => c"Invalid argument",
        DESTINATION_BUFFER_TOO_SMALL => c"The destination buffer is too small to hold all the output",
        SOURCE_BUFFER_TOO_SMALL => c"The source buffer is too small, more input data was expected",
        INVALID_OPERATION => c"Method call is invalid for the current state",
        ENCODING_NOT_SUPPORTED => c"Invalid JPEG-LS stream: the JPEG stream is not encoded with the JPEG-LS algorithm",
        UNKNOWN_JPEG_MARKER_FOUND => c"Invalid JPEG-LS stream: an unknown JPEG marker code was found",
        JPEG_MARKER_START_BYTE_NOT_FOUND => c"Invalid JPEG-LS stream: the leading start byte (0xFF) for a JPEG marker was not found",
        START_OF_IMAGE_MARKER_NOT_FOUND => c"Invalid JPEG-LS stream: first JPEG marker is not a Start Of Image (SOI) marker",
        CALLBACK_FAILED => c"Callback function returned a failure",
        INVALID_ARGUMENT_STRIDE => c"The stride argument does not match with the frame info and buffer size",
        _ => c"Fake CharLS failure",
    };
    message.as_ptr()
}

fn status(result: Result<(), i32>) -> i32 {
    match result {
        Ok(()) => SUCCESS,
        Err(code) => code,
    }
}

fn take_create_failure() -> bool {
    FAIL_NEXT_CREATE.replace(false)
}

fn bytes_per_sample(bits_per_sample: i32) -> usize {
    if bits_per_sample <= 8 { 1 } else { 2 }
}

fn row_size(frame: &RawFrameInfo) -> usize {
    frame.width as usize * frame.component_count as usize * bytes_per_sample(frame.bits_per_sample)
}

fn resolve_stride(frame: &RawFrameInfo, stride: u32) -> Result<usize, i32> {
    let row = row_size(frame);
    match stride as usize {
        0 => Ok(row),
        stride if stride < row => Err(INVALID_ARGUMENT_STRIDE),
        stride => Ok(stride),
    }
}

fn strided_size(frame: &RawFrameInfo, stride: usize) -> usize {
    stride * (frame.height as usize - 1) + row_size(frame)
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeEncoder {
    frame: Option<RawFrameInfo>,
    near_lossless: i32,
    interleave_mode: i32,
    encoding_options: i32,
    color_transformation: i32,
    pc_parameters: RawPcParameters,
    destination: Option<(*mut u8, usize)>,
    position: usize,
}

impl FakeEncoder {
    unsafe fn from_raw<'e>(encoder: *const RawEncoder) -> &'e mut FakeEncoder {
        unsafe { &mut *encoder.cast_mut().cast::<FakeEncoder>() }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), i32> {
        let (address, capacity) = self.destination.ok_or(INVALID_OPERATION)?;
        if self.position + bytes.len() > capacity {
            return Err(DESTINATION_BUFFER_TOO_SMALL);
        }
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), address.add(self.position), bytes.len()) };
        self.position += bytes.len();
        Ok(())
    }

    fn start(&mut self) -> Result<(), i32> {
        if self.position == 0 {
            self.put(&[0xFF, SOI])?;
        }
        Ok(())
    }

    fn segment(&mut self, marker: u8, payload: &[u8]) -> Result<(), i32> {
        self.start()?;
        let length = u16::try_from(payload.len() + 2).map_err(|_| INVALID_ARGUMENT)?;
        self.put(&[0xFF, marker])?;
        self.put(&length.to_be_bytes())?;
        self.put(payload)
    }

    fn spiff(&mut self, header: &RawSpiffHeader) -> Result<(), i32> {
        if self.destination.is_none() || self.position != 0 {
            return Err(INVALID_OPERATION);
        }
        let mut payload = SPIFF_MAGIC.to_vec();
        payload.extend_from_slice(&[2, 0]);
        payload.push(header.profile_id as u8);
        payload.push(header.component_count as u8);
        payload.extend_from_slice(&header.height.to_be_bytes());
        payload.extend_from_slice(&header.width.to_be_bytes());
        payload.push(header.color_space as u8);
        payload.push(header.bits_per_sample as u8);
        payload.push(header.compression_type as u8);
        payload.push(header.resolution_units as u8);
        payload.extend_from_slice(&header.vertical_resolution.to_be_bytes());
        payload.extend_from_slice(&header.horizontal_resolution.to_be_bytes());
        self.segment(APP8, &payload)
    }

    fn encode(&mut self, source: &[u8], stride: u32) -> Result<(), i32> {
        let frame = self.frame.ok_or(INVALID_OPERATION)?;
        if self.destination.is_none() {
            return Err(INVALID_OPERATION);
        }
        let stride = resolve_stride(&frame, stride)?;
        if source.len() < strided_size(&frame, stride) {
            return Err(INVALID_ARGUMENT);
        }

        if self.encoding_options & INCLUDE_VERSION_NUMBER != 0 {
            self.segment(COM, b"charls 2.4.0")?;
        }
        if self.color_transformation != 0 {
            let mut payload = TRANSFORMATION_MAGIC.to_vec();
            payload.push(self.color_transformation as u8);
            self.segment(APP8, &payload)?;
        }

        let components = frame.component_count as u8;
        let mut sof = vec![frame.bits_per_sample as u8];
        sof.extend_from_slice(&(frame.height as u16).to_be_bytes());
        sof.extend_from_slice(&(frame.width as u16).to_be_bytes());
        sof.push(components);
        for id in 1..=components {
            sof.extend_from_slice(&[id, 0x11, 0]);
        }
        self.segment(SOF55, &sof)?;

        let pc = self.pc_parameters;
        if pc != RawPcParameters::default() || self.encoding_options & INCLUDE_PC_PARAMETERS_JAI != 0 {
            let mut lse = vec![1u8];
            for value in [
                pc.maximum_sample_value,
                pc.threshold1,
                pc.threshold2,
                pc.threshold3,
                pc.reset_value,
            ] {
                lse.extend_from_slice(&(value as u16).to_be_bytes());
            }
            self.segment(LSE, &lse)?;
        }

        let mut sos = vec![components];
        for id in 1..=components {
            sos.extend_from_slice(&[id, 0]);
        }
        sos.extend_from_slice(&[self.near_lossless as u8, self.interleave_mode as u8, 0]);
        self.segment(SOS, &sos)?;

        let row = row_size(&frame);
        for line in 0..frame.height as usize {
            let start = line * stride;
            self.put(&source[start..start + row])?;
        }

        if self.encoding_options & EVEN_DESTINATION_SIZE != 0 && self.position % 2 != 0 {
            self.put(&[0xFF])?;
        }
        self.put(&[0xFF, EOI])
    }
}

unsafe extern "C" fn encoder_create() -> *mut RawEncoder {
    if take_create_failure() {
        return ptr::null_mut();
    }
    LIVE_ENCODERS.set(LIVE_ENCODERS.get() + 1);
    Box::into_raw(Box::<FakeEncoder>::default()).cast()
}

unsafe extern "C" fn encoder_destroy(encoder: *const RawEncoder) {
    if encoder.is_null() {
        return;
    }
    LIVE_ENCODERS.set(LIVE_ENCODERS.get() - 1);
    drop(unsafe { Box::from_raw(encoder.cast_mut().cast::<FakeEncoder>()) });
}

unsafe extern "C" fn encoder_set_frame_info(encoder: *mut RawEncoder, frame_info: *const RawFrameInfo) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    let frame = unsafe { *frame_info };
    match frame {
        RawFrameInfo { width: 0 | 65536.., .. } => INVALID_ARGUMENT_WIDTH,
        RawFrameInfo { height: 0 | 65536.., .. } => INVALID_ARGUMENT_HEIGHT,
        RawFrameInfo { bits_per_sample: ..=1 | 17.., .. } => INVALID_ARGUMENT_BITS_PER_SAMPLE,
        RawFrameInfo { component_count: ..=0 | 256.., .. } => INVALID_ARGUMENT_COMPONENT_COUNT,
        _ => {
            encoder.frame = Some(frame);
            SUCCESS
        }
    }
}

unsafe extern "C" fn encoder_set_near_lossless(encoder: *mut RawEncoder, near_lossless: i32) -> i32 {
    if !(0..=255).contains(&near_lossless) {
        return INVALID_ARGUMENT_NEAR_LOSSLESS;
    }
    unsafe { FakeEncoder::from_raw(encoder) }.near_lossless = near_lossless;
    SUCCESS
}

unsafe extern "C" fn encoder_set_interleave_mode(encoder: *mut RawEncoder, interleave_mode: i32) -> i32 {
    if !(0..=2).contains(&interleave_mode) {
        return INVALID_ARGUMENT_INTERLEAVE_MODE;
    }
    unsafe { FakeEncoder::from_raw(encoder) }.interleave_mode = interleave_mode;
    SUCCESS
}

unsafe extern "C" fn encoder_set_encoding_options(encoder: *mut RawEncoder, encoding_options: i32) -> i32 {
    if encoding_options & !0b111 != 0 {
        return INVALID_ARGUMENT_ENCODING_OPTIONS;
    }
    unsafe { FakeEncoder::from_raw(encoder) }.encoding_options = encoding_options;
    SUCCESS
}

unsafe extern "C" fn encoder_set_preset_coding_parameters(
    encoder: *mut RawEncoder,
    preset_coding_parameters: *const RawPcParameters,
) -> i32 {
    unsafe { FakeEncoder::from_raw(encoder) }.pc_parameters = unsafe { *preset_coding_parameters };
    SUCCESS
}

unsafe extern "C" fn encoder_set_color_transformation(encoder: *mut RawEncoder, color_transformation: i32) -> i32 {
    if !(0..=3).contains(&color_transformation) {
        return INVALID_ARGUMENT_COLOR_TRANSFORMATION;
    }
    unsafe { FakeEncoder::from_raw(encoder) }.color_transformation = color_transformation;
    SUCCESS
}

unsafe extern "C" fn encoder_get_estimated_destination_size(
    encoder: *const RawEncoder,
    size_in_bytes: *mut usize,
) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    let Some(frame) = encoder.frame else {
        return INVALID_OPERATION;
    };
    unsafe { *size_in_bytes = row_size(&frame) * frame.height as usize + 1024 };
    SUCCESS
}

unsafe extern "C" fn encoder_set_destination_buffer(
    encoder: *mut RawEncoder,
    destination_buffer: *mut c_void,
    destination_size_bytes: usize,
) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    if encoder.destination.is_some() {
        return INVALID_OPERATION;
    }
    encoder.destination = Some((destination_buffer.cast(), destination_size_bytes));
    SUCCESS
}

unsafe extern "C" fn encoder_write_standard_spiff_header(
    encoder: *mut RawEncoder,
    color_space: i32,
    resolution_units: i32,
    vertical_resolution: u32,
    horizontal_resolution: u32,
) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    let Some(frame) = encoder.frame else {
        return INVALID_OPERATION;
    };
    let header = RawSpiffHeader {
        profile_id: 0,
        component_count: frame.component_count,
        height: frame.height,
        width: frame.width,
        color_space,
        bits_per_sample: frame.bits_per_sample,
        compression_type: 6,
        resolution_units,
        vertical_resolution,
        horizontal_resolution,
    };
    status(encoder.spiff(&header))
}

unsafe extern "C" fn encoder_write_spiff_header(encoder: *mut RawEncoder, spiff_header: *const RawSpiffHeader) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    status(encoder.spiff(unsafe { &*spiff_header }))
}

unsafe extern "C" fn encoder_write_comment(encoder: *mut RawEncoder, comment: *const c_void, size: usize) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    let payload = unsafe { bytes(comment, size) };
    status(encoder.segment(COM, payload))
}

unsafe extern "C" fn encoder_write_application_data(
    encoder: *mut RawEncoder,
    application_data_id: i32,
    application_data: *const c_void,
    size: usize,
) -> i32 {
    if !(0..=15).contains(&application_data_id) {
        return INVALID_ARGUMENT;
    }
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    let payload = unsafe { bytes(application_data, size) };
    status(encoder.segment(APP0 + application_data_id as u8, payload))
}

unsafe extern "C" fn encoder_encode_from_buffer(
    encoder: *mut RawEncoder,
    source_buffer: *const c_void,
    source_size_bytes: usize,
    stride: u32,
) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    let source = unsafe { bytes(source_buffer, source_size_bytes) };
    status(encoder.encode(source, stride))
}

unsafe extern "C" fn encoder_get_bytes_written(encoder: *const RawEncoder, bytes_written: *mut usize) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    unsafe { *bytes_written = encoder.position };
    SUCCESS
}

unsafe extern "C" fn encoder_rewind(encoder: *mut RawEncoder) -> i32 {
    let encoder = unsafe { FakeEncoder::from_raw(encoder) };
    if encoder.destination.is_none() {
        return INVALID_OPERATION;
    }
    encoder.position = 0;
    SUCCESS
}

unsafe fn bytes<'b>(data: *const c_void, size: usize) -> &'b [u8] {
    if data.is_null() || size == 0 {
        return &[];
    }
    unsafe { slice::from_raw_parts(data.cast::<u8>(), size) }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecoderStage {
    #[default]
    Initial,
    SourceSet,
    StartOfImageRead,
    HeaderRead,
    Completed,
}

#[derive(Default)]
struct FakeDecoder {
    source: Option<(*const u8, usize)>,
    position: usize,
    stage: DecoderStage,
    frame: Option<RawFrameInfo>,
    near_lossless: i32,
    interleave_mode: i32,
    color_transformation: i32,
    pc_parameters: RawPcParameters,
    comment_handler: Option<(AtCommentHandler, *mut c_void)>,
    application_data_handler: Option<(AtApplicationDataHandler, *mut c_void)>,
    // Set when a SPIFF lookup found none and read the header segments itself.
    header_read_by_spiff_lookup: bool,
}

impl FakeDecoder {
    unsafe fn from_raw<'d>(decoder: *const RawDecoder) -> &'d mut FakeDecoder {
        unsafe { &mut *decoder.cast_mut().cast::<FakeDecoder>() }
    }

    fn data<'s>(&self) -> &'s [u8] {
        match self.source {
            Some((address, size)) => unsafe { slice::from_raw_parts(address, size) },
            None => &[],
        }
    }

    fn byte(&mut self) -> Result<u8, i32> {
        let value = *self.data().get(self.position).ok_or(SOURCE_BUFFER_TOO_SMALL)?;
        self.position += 1;
        Ok(value)
    }

    fn take<'s>(&mut self, count: usize) -> Result<&'s [u8], i32> {
        let data = self.data();
        let taken = data
            .get(self.position..self.position + count)
            .ok_or(SOURCE_BUFFER_TOO_SMALL)?;
        self.position += count;
        Ok(taken)
    }

    fn marker(&mut self) -> Result<u8, i32> {
        if self.byte()? != 0xFF {
            return Err(JPEG_MARKER_START_BYTE_NOT_FOUND);
        }
        loop {
            match self.byte()? {
                0xFF => continue,
                marker => return Ok(marker),
            }
        }
    }

    fn segment<'s>(&mut self) -> Result<&'s [u8], i32> {
        let length = u16::from_be_bytes([self.byte()?, self.byte()?]) as usize;
        if length < 2 {
            return Err(INVALID_MARKER_SEGMENT_SIZE);
        }
        self.take(length - 2)
    }

    fn start_of_image(&mut self) -> Result<(), i32> {
        if self.stage == DecoderStage::SourceSet {
            if self.marker()? != SOI {
                return Err(START_OF_IMAGE_MARKER_NOT_FOUND);
            }
            self.stage = DecoderStage::StartOfImageRead;
        }
        Ok(())
    }

    fn spiff(&mut self) -> Result<Option<RawSpiffHeader>, i32> {
        if self.stage != DecoderStage::SourceSet {
            return Err(INVALID_OPERATION);
        }
        self.start_of_image()?;

        let data = self.data();
        let rest = &data[self.position..];
        if rest.len() < 10 || rest[..2] != [0xFF, APP8] || &rest[4..10] != SPIFF_MAGIC {
            // Like CharLS, keep reading through the frame and scan headers.
            self.header()?;
            self.header_read_by_spiff_lookup = true;
            return Ok(None);
        }
        self.position += 2;
        let payload = self.segment()?;
        if payload.len() < 30 {
            return Err(INVALID_MARKER_SEGMENT_SIZE);
        }
        let be32 = |at: usize| u32::from_be_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]]);
        Ok(Some(RawSpiffHeader {
            profile_id: payload[8] as i32,
            component_count: payload[9] as i32,
            height: be32(10),
            width: be32(14),
            color_space: payload[18] as i32,
            bits_per_sample: payload[19] as i32,
            compression_type: payload[20] as i32,
            resolution_units: payload[21] as i32,
            vertical_resolution: be32(22),
            horizontal_resolution: be32(26),
        }))
    }

    fn header(&mut self) -> Result<(), i32> {
        if self.header_read_by_spiff_lookup {
            self.header_read_by_spiff_lookup = false;
            return Ok(());
        }
        if !matches!(self.stage, DecoderStage::SourceSet | DecoderStage::StartOfImageRead) {
            return Err(INVALID_OPERATION);
        }
        self.start_of_image()?;

        loop {
            match self.marker()? {
                SOF55 => {
                    if self.frame.is_some() {
                        return Err(DUPLICATE_START_OF_FRAME_MARKER);
                    }
                    let payload = self.segment()?;
                    if payload.len() < 6 {
                        return Err(INVALID_MARKER_SEGMENT_SIZE);
                    }
                    self.frame = Some(RawFrameInfo {
                        bits_per_sample: payload[0] as i32,
                        height: u16::from_be_bytes([payload[1], payload[2]]) as u32,
                        width: u16::from_be_bytes([payload[3], payload[4]]) as u32,
                        component_count: payload[5] as i32,
                    });
                }
                marker @ 0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                    return Err(ENCODING_NOT_SUPPORTED);
                }
                LSE => {
                    let payload = self.segment()?;
                    if payload.first() != Some(&1) || payload.len() < 11 {
                        return Err(INVALID_JPEGLS_PRESET_PARAMETER_TYPE);
                    }
                    let be16 = |at: usize| u16::from_be_bytes([payload[at], payload[at + 1]]) as i32;
                    self.pc_parameters = RawPcParameters {
                        maximum_sample_value: be16(1),
                        threshold1: be16(3),
                        threshold2: be16(5),
                        threshold3: be16(7),
                        reset_value: be16(9),
                    };
                }
                COM => {
                    let payload = self.segment()?;
                    if let Some((handler, context)) = self.comment_handler {
                        let result = unsafe { handler(payload.as_ptr().cast(), payload.len(), context) };
                        if result != 0 {
                            return Err(CALLBACK_FAILED);
                        }
                    }
                }
                marker @ APP0..=0xEF => {
                    let payload = self.segment()?;
                    if marker == APP8 && payload.starts_with(SPIFF_MAGIC) {
                        continue;
                    }
                    if marker == APP8 && payload.starts_with(TRANSFORMATION_MAGIC) && payload.len() == 5 {
                        self.color_transformation = payload[4] as i32;
                        continue;
                    }
                    if let Some((handler, context)) = self.application_data_handler {
                        let id = (marker - APP0) as i32;
                        let result = unsafe { handler(id, payload.as_ptr().cast(), payload.len(), context) };
                        if result != 0 {
                            return Err(CALLBACK_FAILED);
                        }
                    }
                }
                SOS => {
                    if self.frame.is_none() {
                        return Err(UNEXPECTED_MARKER_FOUND);
                    }
                    let payload = self.segment()?;
                    let components = *payload.first().ok_or(INVALID_MARKER_SEGMENT_SIZE)? as usize;
                    let tail = payload.get(1 + 2 * components..).ok_or(INVALID_MARKER_SEGMENT_SIZE)?;
                    if tail.len() < 3 {
                        return Err(INVALID_MARKER_SEGMENT_SIZE);
                    }
                    self.near_lossless = tail[0] as i32;
                    self.interleave_mode = tail[1] as i32;
                    self.stage = DecoderStage::HeaderRead;
                    return Ok(());
                }
                SOI => return Err(DUPLICATE_START_OF_IMAGE_MARKER),
                EOI => return Err(UNEXPECTED_END_OF_IMAGE_MARKER),
                _ => return Err(UNKNOWN_JPEG_MARKER_FOUND),
            }
        }
    }

    fn frame(&self) -> Result<RawFrameInfo, i32> {
        match self.stage {
            DecoderStage::HeaderRead | DecoderStage::Completed => self.frame.ok_or(INVALID_OPERATION),
            _ => Err(INVALID_OPERATION),
        }
    }

    fn decode(&mut self, destination: *mut u8, size: usize, stride: u32) -> Result<(), i32> {
        if self.stage != DecoderStage::HeaderRead {
            return Err(INVALID_OPERATION);
        }
        let frame = self.frame()?;
        let stride = resolve_stride(&frame, stride)?;
        if size < strided_size(&frame, stride) {
            return Err(DESTINATION_BUFFER_TOO_SMALL);
        }

        let row = row_size(&frame);
        for line in 0..frame.height as usize {
            let samples = self.take(row)?;
            unsafe { ptr::copy_nonoverlapping(samples.as_ptr(), destination.add(line * stride), row) };
        }
        match self.marker() {
            Ok(EOI) => {}
            Ok(_) | Err(_) => return Err(END_OF_IMAGE_MARKER_NOT_FOUND),
        }
        self.stage = DecoderStage::Completed;
        Ok(())
    }
}

unsafe extern "C" fn decoder_create() -> *mut RawDecoder {
    if take_create_failure() {
        return ptr::null_mut();
    }
    LIVE_DECODERS.set(LIVE_DECODERS.get() + 1);
    Box::into_raw(Box::<FakeDecoder>::default()).cast()
}

unsafe extern "C" fn decoder_destroy(decoder: *const RawDecoder) {
    if decoder.is_null() {
        return;
    }
    LIVE_DECODERS.set(LIVE_DECODERS.get() - 1);
    drop(unsafe { Box::from_raw(decoder.cast_mut().cast::<FakeDecoder>()) });
}

unsafe extern "C" fn decoder_set_source_buffer(
    decoder: *mut RawDecoder,
    source_buffer: *const c_void,
    source_size_bytes: usize,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    if decoder.stage != DecoderStage::Initial {
        return INVALID_OPERATION;
    }
    decoder.source = Some((source_buffer.cast(), source_size_bytes));
    decoder.stage = DecoderStage::SourceSet;
    SUCCESS
}

unsafe extern "C" fn decoder_read_spiff_header(
    decoder: *mut RawDecoder,
    spiff_header: *mut RawSpiffHeader,
    header_found: *mut i32,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    match decoder.spiff() {
        Ok(Some(header)) => {
            unsafe {
                *spiff_header = header;
                *header_found = 1;
            }
            SUCCESS
        }
        Ok(None) => {
            unsafe { *header_found = 0 };
            SUCCESS
        }
        Err(code) => code,
    }
}

unsafe extern "C" fn decoder_read_header(decoder: *mut RawDecoder) -> i32 {
    status(unsafe { FakeDecoder::from_raw(decoder) }.header())
}

unsafe extern "C" fn decoder_get_frame_info(decoder: *const RawDecoder, frame_info: *mut RawFrameInfo) -> i32 {
    match unsafe { FakeDecoder::from_raw(decoder) }.frame() {
        Ok(frame) => {
            unsafe { *frame_info = frame };
            SUCCESS
        }
        Err(code) => code,
    }
}

unsafe extern "C" fn decoder_get_near_lossless(decoder: *const RawDecoder, _component: i32, near_lossless: *mut i32) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    status(decoder.frame().map(|_| unsafe { *near_lossless = decoder.near_lossless }))
}

unsafe extern "C" fn decoder_get_interleave_mode(decoder: *const RawDecoder, interleave_mode: *mut i32) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    status(decoder.frame().map(|_| unsafe { *interleave_mode = decoder.interleave_mode }))
}

unsafe extern "C" fn decoder_get_color_transformation(decoder: *const RawDecoder, color_transformation: *mut i32) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    status(decoder.frame().map(|_| unsafe { *color_transformation = decoder.color_transformation }))
}

unsafe extern "C" fn decoder_get_preset_coding_parameters(
    decoder: *const RawDecoder,
    _reserved: i32,
    preset_coding_parameters: *mut RawPcParameters,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    status(decoder.frame().map(|_| unsafe { *preset_coding_parameters = decoder.pc_parameters }))
}

unsafe extern "C" fn decoder_get_destination_size(
    decoder: *const RawDecoder,
    stride: u32,
    destination_size_bytes: *mut usize,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    let size = decoder
        .frame()
        .and_then(|frame| resolve_stride(&frame, stride).map(|stride| strided_size(&frame, stride)));
    status(size.map(|size| unsafe { *destination_size_bytes = size }))
}

unsafe extern "C" fn decoder_decode_to_buffer(
    decoder: *mut RawDecoder,
    destination_buffer: *mut c_void,
    destination_size_bytes: usize,
    stride: u32,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    status(decoder.decode(destination_buffer.cast(), destination_size_bytes, stride))
}

unsafe extern "C" fn decoder_at_comment(
    decoder: *mut RawDecoder,
    handler: Option<AtCommentHandler>,
    user_context: *mut c_void,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    decoder.comment_handler = handler.map(|handler| (handler, user_context));
    SUCCESS
}

unsafe extern "C" fn decoder_at_application_data(
    decoder: *mut RawDecoder,
    handler: Option<AtApplicationDataHandler>,
    user_context: *mut c_void,
) -> i32 {
    let decoder = unsafe { FakeDecoder::from_raw(decoder) };
    decoder.application_data_handler = handler.map(|handler| (handler, user_context));
    SUCCESS
}

// ---------------------------------------------------------------------------
// Test images
// ---------------------------------------------------------------------------

/// Deterministic gradient pixels for a packed image.
pub fn gradient(width: u32, height: u32, component_count: i32, bits_per_sample: i32) -> Vec<u8> {
    let samples = width as usize * height as usize * component_count as usize;
    let maximum = (1u32 << bits_per_sample) - 1;
    if bits_per_sample <= 8 {
        (0..samples).map(|i| (i as u32 % (maximum + 1)) as u8).collect()
    } else {
        (0..samples)
            .flat_map(|i| ((i as u32 * 7) % (maximum + 1)).to_le_bytes().into_iter().take(2))
            .collect()
    }
}
