use crate::audio::SourceError;
use crate::listen::ListenError;

/// Общий тип ошибки библиотеки.
///
/// Каждый вариант соответствует модулю, который может генерировать
/// ошибки; детальные типы определены в самих модулях.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("audio source error: {0}")]
    Source(#[from] SourceError),

    #[error("listen error: {0}")]
    Listen(#[from] ListenError),

    #[error("config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(err: serde_json::Error) -> Self {
        CaptureError::Config(err.to_string())
    }
}

/// Общий Result-тип библиотеки.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_error_should_display_module_prefix() {
        // Given
        let error = CaptureError::Source(SourceError::UnsupportedFormat);

        // When
        let msg = error.to_string();

        // Then
        assert!(msg.starts_with("audio source error:"));
    }

    #[test]
    fn capture_error_should_convert_from_io_error() {
        // Given
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");

        // When
        let err: CaptureError = io_err.into();

        // Then
        assert!(matches!(err, CaptureError::Config(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn capture_error_should_wrap_listen_timeout() {
        // Given
        let err: CaptureError = ListenError::WaitTimeout.into();

        // When / Then
        assert!(matches!(err, CaptureError::Listen(ListenError::WaitTimeout)));
        assert!(err.to_string().contains("timed out"));
    }
}
