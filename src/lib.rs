//! Streaming audio playback for games.
//!
//! Sounds and music are loaded into an [`AudioEngine`], which shares a fixed pool of playback sources
//! between them. Audio can be decoded up front into one buffer, or streamed through a pair of buffers
//! that are refilled on every [`AudioEngine::update`]. Streams can loop over any region of their data.
//!
//! The engine plays through a [`Backend`]. [`Mixer`] is a software backend; an [`OutputStream`] sends
//! its output to the default audio device.
//!
//! ```no_run
//! use allacrost_audio::{AudioConfig, AudioEngine, LoadMode, OutputStream};
//!
//! let stream = OutputStream::new()?;
//! let mut engine = AudioEngine::new(stream.mixer(), AudioConfig::default())?;
//! let theme = engine.load_music_file("mus/theme.wav", LoadMode::StreamFromFile)?;
//! if let Some(mut music) = engine.audio(theme) {
//!     music.set_loop_start(44100);
//!     music.play();
//! }
//! loop {
//!     engine.update();
//!     # break;
//! }
//! # Ok::<(), allacrost_audio::Error>(())
//! ```

mod backend;
mod buffer;
mod config;
mod cursor;
pub mod decoder;
mod effect;
mod engine;
mod error;
mod mixer;
mod object;
mod pool;
mod stream;

pub use backend::{Backend, BackendError, BufferId, PcmFormat, SourceId, SourceState};
pub use buffer::BufferPair;
pub use config::AudioConfig;
pub use cursor::StreamCursor;
pub use decoder::{Decoder, MemoryDecoder, WavDecoder};
pub use effect::{Fade, FadeKind};
pub use engine::{AudioEngine, AudioRef};
pub use error::Error;
pub use mixer::{Mixer, DEFAULT_SOURCE_LIMIT};
pub use object::{AudioId, AudioKind, AudioObject, LoadMode, PlayState};
pub use pool::SourcePool;
pub use stream::{OutputStream, SharedMixer};
