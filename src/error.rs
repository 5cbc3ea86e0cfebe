use thiserror::Error;

/// Errors raised outside the audio callback.
#[derive(Debug, Error)]
pub enum ClipperError {
    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("no audio input device available")]
    NoInputDevice,

    #[error("audio device '{0}' not found")]
    DeviceNotFound(String),

    #[error("could not enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("could not query default output: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("could not query input configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("input device cannot run at {0} Hz")]
    SampleRateUnsupported(u32),

    #[error("unsupported sample format: {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("failed to build stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClipperError>;
