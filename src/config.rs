//! Engine settings, usually read from the `[audio]` part of a game's TOML config.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// How many playback sources to ask the device for.
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
    /// Samples per streaming buffer. Each stream keeps two of these.
    #[serde(default = "default_stream_buffer_samples")]
    pub stream_buffer_samples: usize,
    /// How many fire-and-forget sounds `play_sound` keeps loaded.
    #[serde(default = "default_one_shot_cache_size")]
    pub one_shot_cache_size: usize,
    #[serde(default = "default_volume")]
    pub sound_volume: f32,
    #[serde(default = "default_volume")]
    pub music_volume: f32,
}

fn default_max_sources() -> usize {
    64
}

fn default_stream_buffer_samples() -> usize {
    8192
}

fn default_one_shot_cache_size() -> usize {
    8
}

fn default_volume() -> f32 {
    1.0
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            max_sources: default_max_sources(),
            stream_buffer_samples: default_stream_buffer_samples(),
            one_shot_cache_size: default_one_shot_cache_size(),
            sound_volume: default_volume(),
            music_volume: default_volume(),
        }
    }
}

impl AudioConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
