/// Result alias that carries the custom [`VizError`] type.
pub type Result<T> = std::result::Result<T, VizError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VizError {
    /// A selected input could not become the active sample buffer.
    #[error("failed to load audio: {0}")]
    Load(#[from] LoadError),
    /// Malformed configuration document.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Free-form message surfaced by the application layer.
    #[error("{0}")]
    Message(String),
}

impl VizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for VizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<DecodeError> for VizError {
    fn from(value: DecodeError) -> Self {
        Self::Load(LoadError::Decode(value))
    }
}

/// Reasons a buffer is refused by the playback engine. Playback state is left
/// untouched whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("sample buffer contains no frames")]
    EmptyBuffer,
    #[error("sample buffer has a zero sample rate or channel count")]
    InvalidFormat,
    #[error("duration must be finite and non-negative, got {0}")]
    InvalidDuration(f64),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Failures raised by a [`Decoder`](crate::source::Decoder) implementation.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed wav stream: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported sample format: {0}")]
    Unsupported(String),
    #[error("input contains no audio")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_surface_as_load_errors() {
        let err: VizError = DecodeError::Empty.into();
        assert!(matches!(err, VizError::Load(LoadError::Decode(DecodeError::Empty))));
        assert_eq!(err.to_string(), "failed to load audio: input contains no audio");
    }
}
