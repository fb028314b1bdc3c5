use thiserror::Error;

/// Errores del núcleo de radio. Todos son recuperables por el caller:
/// cada operación devuelve una variante definida, nunca un panic.
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("Station not found: {name}")]
    StationNotFound { name: String },

    #[error("Station already exists: {name}")]
    StationConflict { name: String },

    #[error("Station is global and cannot be removed: {name}")]
    StationIsGlobal { name: String },

    #[error("Station is currently playing: {name}")]
    StationInUse { name: String },

    #[error("Only administrators can manage stations")]
    PermissionDenied,

    #[error("Unsafe or invalid URL: {reason}")]
    UnsafeUrl { reason: String },

    #[error("User not in a voice channel")]
    NoVoiceChannel,

    #[error("Voice connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },

    #[error("Stream unavailable: {url}")]
    StreamUnavailable { url: String },

    #[error("Playback could not be started: {reason}")]
    PlaybackError { reason: String },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RadioError>;
