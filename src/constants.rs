pub const MINIMUM_WIDTH: u32 = 1;
pub const MAXIMUM_WIDTH: u32 = u16::MAX as u32;
pub const MINIMUM_HEIGHT: u32 = 1;
pub const MAXIMUM_HEIGHT: u32 = u16::MAX as u32;

pub const MINIMUM_COMPONENT_COUNT: i32 = 1;
pub const MAXIMUM_COMPONENT_COUNT: i32 = 255;
pub const MINIMUM_BITS_PER_SAMPLE: i32 = 2;
pub const MAXIMUM_BITS_PER_SAMPLE: i32 = 16;
pub const MAXIMUM_NEAR_LOSSLESS: i32 = 255;
pub const MINIMUM_APPLICATION_DATA_ID: i32 = 0;
pub const MAXIMUM_APPLICATION_DATA_ID: i32 = 15;

// The special value to indicate that the stride should be calculated by the
// native side from the frame info.
pub const AUTO_CALCULATE_STRIDE: i32 = 0;

// Oldest CharLS release exporting every entry of the call table in `ffi`
// (application data and color transformation accessors included).
pub const MINIMUM_MAJOR_VERSION: i32 = 2;
pub const MINIMUM_MINOR_VERSION: i32 = 4;

// Environment variable holding an explicit path to the native library.
pub const LIBRARY_PATH_ENV: &str = "CHARLS_LIBRARY_PATH";

#[cfg(target_os = "linux")]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libcharls.so.2", "libcharls.so"];
#[cfg(target_os = "macos")]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libcharls.2.dylib", "libcharls.dylib"];
#[cfg(target_os = "windows")]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["charls-2-x64.dll", "charls-2-x86.dll", "charls.dll"];
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const DEFAULT_LIBRARY_NAMES: &[&str] = &["libcharls.so"];
