use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// There is no output device available
    #[error("no output device available")]
    NoOutputDevice,

    /// The device could not report a usable default configuration
    #[error("could not query the output configuration: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    /// CPAL refused to build the output stream
    #[error("could not build the output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    /// CPAL refused to start the output stream
    #[error("could not start the output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The device only accepts a sample format we don't write
    #[error("unsupported device sample format: {0:?}")]
    UnsupportedSampleFormat(cpal::SampleFormat),

    /// Not a single playback source could be created at startup
    #[error("the audio backend granted no playback sources")]
    NoSources,

    /// The backend could not allocate a buffer
    #[error("the audio backend could not allocate a buffer")]
    BufferAllocation,

    /// The decoded audio can't be played (no samples, no channels, too many channels)
    #[error("invalid audio data: {0}")]
    InvalidAudio(&'static str),

    /// The file extension doesn't name a format we can decode
    #[error("unsupported audio file format: {0}")]
    UnsupportedFormat(String),

    #[error("could not decode WAVE data: {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid audio configuration: {0}")]
    Config(#[from] toml::de::Error),
}
