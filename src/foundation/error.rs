/// Convenience result type used across skycomp.
pub type SkyResult<T> = Result<T, SkyError>;

/// Top-level error taxonomy for the compositing pipeline.
///
/// One variant per externally distinguishable fault class; transient codec
/// anomalies (unexpected status codes, stray trailing buffers) are absorbed
/// and logged where they occur and never surface here.
#[derive(thiserror::Error, Debug)]
pub enum SkyError {
    /// No track in the media source has a video media type.
    #[error("no video track found in source")]
    NoVideoTrackFound,

    /// I/O or decoder fault while configuring the decoder or mid-stream.
    #[error("decoding failed: {0}")]
    DecodingFailed(String),

    /// No encoder supports the requested media type or rate.
    #[error("unsupported encode format: {0}")]
    UnsupportedEncodeFormat(String),

    /// Encoder surface/format setup fault, including output-file-open failure.
    #[error("encoder configuration failed: {0}")]
    EncoderConfigurationFailed(String),

    /// The encoder reported its output format a second time. Fatal internal
    /// invariant violation; never expected in normal operation.
    #[error("encoder output format changed twice")]
    FormatChangedTwice,

    /// Encoder fault after configuration, while encoding or flushing.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// The run completed without writing a single frame. A zero-frame
    /// container is not a valid result even absent a hardware error.
    #[error("no frames were encoded")]
    ZeroFramesEncoded,

    /// Invalid caller-provided parameters or layer data.
    #[error("validation error: {0}")]
    Validation(String),

    /// The pipeline was torn down while this stage was waiting at the phase
    /// barrier. Internal; the coordinator reports the failure of whichever
    /// stage failed first, not this unwind marker.
    #[error("pipeline aborted")]
    Aborted,

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SkyError {
    /// Build a [`SkyError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SkyError::DecodingFailed`] value.
    pub fn decoding(msg: impl Into<String>) -> Self {
        Self::DecodingFailed(msg.into())
    }

    /// Build a [`SkyError::EncoderConfigurationFailed`] value.
    pub fn encoder_config(msg: impl Into<String>) -> Self {
        Self::EncoderConfigurationFailed(msg.into())
    }

    /// Build a [`SkyError::UnsupportedEncodeFormat`] value.
    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedEncodeFormat(msg.into())
    }

    /// Build a [`SkyError::EncodingFailed`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_fault() {
        assert_eq!(
            SkyError::NoVideoTrackFound.to_string(),
            "no video track found in source"
        );
        assert_eq!(
            SkyError::decoding("eof mid-frame").to_string(),
            "decoding failed: eof mid-frame"
        );
        assert_eq!(
            SkyError::FormatChangedTwice.to_string(),
            "encoder output format changed twice"
        );
    }
}
