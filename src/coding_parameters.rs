use crate::ffi::RawPcParameters;

/// JPEG-LS preset coding parameters (ISO/IEC 14495-1, C.2.4.1.1, Table C.1).
///
/// The valid ranges depend on the bit depth and near-lossless value of the
/// frame, so validation is left to the native codec. A zero field means
/// "use the default for this frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JpeglsPcParameters {
    pub maximum_sample_value: i32,
    pub threshold1: i32,
    pub threshold2: i32,
    pub threshold3: i32,
    pub reset_value: i32,
}

impl JpeglsPcParameters {
    /// True when every field defers to the codec's defaults.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl From<JpeglsPcParameters> for RawPcParameters {
    fn from(p: JpeglsPcParameters) -> Self {
        Self {
            maximum_sample_value: p.maximum_sample_value,
            threshold1: p.threshold1,
            threshold2: p.threshold2,
            threshold3: p.threshold3,
            reset_value: p.reset_value,
        }
    }
}

impl From<RawPcParameters> for JpeglsPcParameters {
    fn from(raw: RawPcParameters) -> Self {
        Self {
            maximum_sample_value: raw.maximum_sample_value,
            threshold1: raw.threshold1,
            threshold2: raw.threshold2,
            threshold3: raw.threshold3,
            reset_value: raw.reset_value,
        }
    }
}
