//! Loading of the native CharLS library.
//!
//! The shared object is opened with `libloading` and every entry point is
//! resolved once into a [`CharlsApi`] table. Sessions share the loaded library
//! through an `Arc`, so the shared object outlives every native handle created
//! from it.

use std::ffi::{CStr, OsStr};
use std::fmt;

use libloading::Library;
use thiserror::Error;
use tracing::debug;

use crate::constants::{
    DEFAULT_LIBRARY_NAMES, LIBRARY_PATH_ENV, MINIMUM_MAJOR_VERSION, MINIMUM_MINOR_VERSION,
};
use crate::ffi::{CharlsApi, GetVersionNumber};

/// Version reported by `charls_get_version_number`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl Version {
    pub const MINIMUM: Version = Version {
        major: MINIMUM_MAJOR_VERSION,
        minor: MINIMUM_MINOR_VERSION,
        patch: 0,
    };

    /// The ABI is only stable within one major version, so a newer major
    /// release is refused as well.
    pub fn is_supported(&self) -> bool {
        self.major == Self::MINIMUM.major && self.minor >= Self::MINIMUM.minor
    }

    /// Queries the native version.
    ///
    /// # Safety
    /// `get_version_number` must be `charls_get_version_number` or follow its contract.
    unsafe fn query(get_version_number: GetVersionNumber) -> Self {
        let (mut major, mut minor, mut patch) = (0, 0, 0);
        // SAFETY: three valid out pointers, guaranteed by the caller's contract.
        unsafe { get_version_number(&mut major, &mut minor, &mut patch) };
        Self {
            major,
            minor,
            patch,
        }
    }

    fn require_supported(self) -> Result<Self, LoadError> {
        if !self.is_supported() {
            return Err(LoadError::UnsupportedVersion {
                found: self,
                minimum: Self::MINIMUM,
            });
        }
        Ok(self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to open native library {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("native library does not export {name}: {source}")]
    Symbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("native library version {found} is not supported (need {minimum} or a later release of the same major version)")]
    UnsupportedVersion { found: Version, minimum: Version },

    #[error("no native JPEG-LS library name is known for this platform")]
    NotFound,
}

/// A loaded native codec library and its call table.
pub struct CharlsLibrary {
    api: CharlsApi,
    version: Version,
    library: Option<Library>,
}

impl CharlsLibrary {
    /// Loads the library named by `CHARLS_LIBRARY_PATH`, or the first platform
    /// default name that can be opened.
    pub fn load() -> Result<Self, LoadError> {
        if let Some(path) = std::env::var_os(LIBRARY_PATH_ENV) {
            return Self::load_from(path);
        }

        let mut failure = None;
        for name in DEFAULT_LIBRARY_NAMES {
            match Self::load_from(name) {
                Ok(library) => return Ok(library),
                Err(error @ LoadError::Open { .. }) => {
                    debug!(name, %error, "native library candidate not available");
                    failure = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(failure.unwrap_or(LoadError::NotFound))
    }

    /// Loads the library at an explicit path.
    pub fn load_from(path: impl AsRef<OsStr>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        // SAFETY: loading runs the library's initialisers; CharLS has none
        // with preconditions.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Open {
            path: path.to_string_lossy().into_owned(),
            source,
        })?;
        // Older releases lack part of the table: gate on the version first.
        // SAFETY: the symbol type is the CharLS 2.x C prototype.
        let get_version_number =
            unsafe { symbol::<GetVersionNumber>(&library, "charls_get_version_number")? };
        // SAFETY: resolved from the library just loaded.
        unsafe { Version::query(get_version_number) }.require_supported()?;
        // SAFETY: the symbol types below are the CharLS 2.x C prototypes.
        let api = unsafe { resolve(&library)? };
        // SAFETY: `api` points into `library`, which is kept alive below.
        let mut loaded = unsafe { Self::from_api(api)? };
        debug!(path = %path.to_string_lossy(), version = %loaded.version, "loaded native JPEG-LS library");
        loaded.library = Some(library);
        Ok(loaded)
    }

    /// Wraps a call table obtained by other means, for example from a
    /// statically linked or in-process implementation of the C API.
    ///
    /// # Safety
    /// Every pointer in `api` must follow the CharLS 2.x contract and stay
    /// callable for the lifetime of the returned value.
    pub unsafe fn from_api(api: CharlsApi) -> Result<Self, LoadError> {
        // SAFETY: `get_version_number` follows the contract, per the caller.
        let version = unsafe { Version::query(api.get_version_number) }.require_supported()?;

        Ok(Self {
            api,
            version,
            library: None,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn api(&self) -> &CharlsApi {
        &self.api
    }

    /// Native description of a result code, for diagnostics only.
    pub fn error_message(&self, code: i32) -> Option<String> {
        // SAFETY: the native side returns either null or a static C string.
        let message = unsafe { (self.api.get_error_message)(code) };
        if message.is_null() {
            return None;
        }
        // SAFETY: non-null and NUL-terminated per the native contract.
        let text = unsafe { CStr::from_ptr(message) };
        Some(text.to_string_lossy().into_owned())
    }
}

impl fmt::Debug for CharlsLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharlsLibrary")
            .field("version", &self.version)
            .field("dynamically_loaded", &self.library.is_some())
            .finish()
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, LoadError> {
    // SAFETY: forwarded from `resolve`; `T` matches the exported prototype.
    let symbol = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|source| LoadError::Symbol { name, source })?;
    Ok(*symbol)
}

unsafe fn resolve(library: &Library) -> Result<CharlsApi, LoadError> {
    // SAFETY: each field type is the documented prototype of the symbol.
    unsafe {
        Ok(CharlsApi {
            get_version_number: symbol(library, "charls_get_version_number")?,
            get_error_message: symbol(library, "charls_get_error_message")?,

            encoder_create: symbol(library, "charls_jpegls_encoder_create")?,
            encoder_destroy: symbol(library, "charls_jpegls_encoder_destroy")?,
            encoder_set_frame_info: symbol(library, "charls_jpegls_encoder_set_frame_info")?,
            encoder_set_near_lossless: symbol(library, "charls_jpegls_encoder_set_near_lossless")?,
            encoder_set_interleave_mode: symbol(library, "charls_jpegls_encoder_set_interleave_mode")?,
            encoder_set_encoding_options: symbol(library, "charls_jpegls_encoder_set_encoding_options")?,
            encoder_set_preset_coding_parameters: symbol(
                library,
                "charls_jpegls_encoder_set_preset_coding_parameters",
            )?,
            encoder_set_color_transformation: symbol(
                library,
                "charls_jpegls_encoder_set_color_transformation",
            )?,
            encoder_get_estimated_destination_size: symbol(
                library,
                "charls_jpegls_encoder_get_estimated_destination_size",
            )?,
            encoder_set_destination_buffer: symbol(
                library,
                "charls_jpegls_encoder_set_destination_buffer",
            )?,
            encoder_write_standard_spiff_header: symbol(
                library,
                "charls_jpegls_encoder_write_standard_spiff_header",
            )?,
            encoder_write_spiff_header: symbol(library, "charls_jpegls_encoder_write_spiff_header")?,
            encoder_write_comment: symbol(library, "charls_jpegls_encoder_write_comment")?,
            encoder_write_application_data: symbol(
                library,
                "charls_jpegls_encoder_write_application_data",
            )?,
            encoder_encode_from_buffer: symbol(library, "charls_jpegls_encoder_encode_from_buffer")?,
            encoder_get_bytes_written: symbol(library, "charls_jpegls_encoder_get_bytes_written")?,
            encoder_rewind: symbol(library, "charls_jpegls_encoder_rewind")?,

            decoder_create: symbol(library, "charls_jpegls_decoder_create")?,
            decoder_destroy: symbol(library, "charls_jpegls_decoder_destroy")?,
            decoder_set_source_buffer: symbol(library, "charls_jpegls_decoder_set_source_buffer")?,
            decoder_read_spiff_header: symbol(library, "charls_jpegls_decoder_read_spiff_header")?,
            decoder_read_header: symbol(library, "charls_jpegls_decoder_read_header")?,
            decoder_get_frame_info: symbol(library, "charls_jpegls_decoder_get_frame_info")?,
            decoder_get_near_lossless: symbol(library, "charls_jpegls_decoder_get_near_lossless")?,
            decoder_get_interleave_mode: symbol(library, "charls_jpegls_decoder_get_interleave_mode")?,
            decoder_get_color_transformation: symbol(
                library,
                "charls_jpegls_decoder_get_color_transformation",
            )?,
            decoder_get_preset_coding_parameters: symbol(
                library,
                "charls_jpegls_decoder_get_preset_coding_parameters",
            )?,
            decoder_get_destination_size: symbol(library, "charls_jpegls_decoder_get_destination_size")?,
            decoder_decode_to_buffer: symbol(library, "charls_jpegls_decoder_decode_to_buffer")?,
            decoder_at_comment: symbol(library, "charls_jpegls_decoder_at_comment")?,
            decoder_at_application_data: symbol(library, "charls_jpegls_decoder_at_application_data")?,
        })
    }
}
