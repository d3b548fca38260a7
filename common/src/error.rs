use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive access is blocked for camera: {0}")]
    ArchiveBlocked(String),

    #[error("Metadata fetch failed: {0}")]
    MetadataFetch(String),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Archive data missing for camera: {0}")]
    ArchiveDataMissing(String),

    #[error("Invalid time window: start {start} is after end {end}")]
    InvalidWindow { start: i64, end: i64 },

    #[error("Unknown quality tier: {0}")]
    UnknownQuality(String),

    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PlayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            PlayerError::UnsupportedFormat("hevc".to_string()),
            PlayerError::ArchiveBlocked("cam-1".to_string()),
            PlayerError::HttpStatus { status: 503, url: "http://host/ajax".to_string() },
            PlayerError::InvalidWindow { start: 10, end: 5 },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let error: PlayerError = parse.unwrap_err().into();
        assert!(matches!(error, PlayerError::SerdeError(_)));
    }
}
