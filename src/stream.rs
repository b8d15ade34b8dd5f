use crate::{Error, Mixer};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample,
};
use std::sync::{Arc, Mutex, PoisonError};

/// A mixer shared between the audio callback and whoever drives it, usually an [`AudioEngine`](crate::AudioEngine).
pub type SharedMixer = Arc<Mutex<Mixer>>;

/// An audio output stream which plays everything its [`Mixer`] is playing.
///
/// Keep this alive for as long as audio should be heard; dropping it closes the device.
pub struct OutputStream {
    _stream: cpal::Stream,
    mixer: SharedMixer,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream {
    /// Opens the default output device with its default configuration.
    pub fn new() -> Result<Self, Error> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(Error::NoOutputDevice)?;
        let supported_config = device.default_output_config()?;

        let sample_rate = supported_config.sample_rate().0;
        let channels = supported_config.channels();
        let sample_format = supported_config.sample_format();
        log::info!(
            "opening {} with {} channels at {} Hz ({:?})",
            device.name().unwrap_or_else(|_| "output device".to_owned()),
            channels,
            sample_rate,
            sample_format
        );

        let mixer: SharedMixer = Arc::new(Mutex::new(Mixer::new(channels.into(), sample_rate)));
        let config: cpal::StreamConfig = supported_config.into();
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer.clone())?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer.clone())?,
            other => return Err(Error::UnsupportedSampleFormat(other)),
        };
        stream.play()?;

        Ok(OutputStream { _stream: stream, mixer, sample_rate, channels })
    }

    /// The mixer feeding this stream. Hand it to an engine as its backend.
    pub fn mixer(&self) -> SharedMixer {
        self.mixer.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels
    }
}

fn build_stream<T>(device: &cpal::Device, config: &cpal::StreamConfig, mixer: SharedMixer) -> Result<cpal::Stream, Error>
where
    T: SizedSample + FromSample<f32>,
{
    // The mixer works in f32, other formats are converted after mixing
    let mut mixed: Vec<f32> = Vec::new();
    let write = move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        mixed.resize(data.len(), 0.0);
        mixer.lock().unwrap_or_else(PoisonError::into_inner).write_samples(&mut mixed);
        for (out, sample) in data.iter_mut().zip(&mixed) {
            *out = T::from_sample(*sample);
        }
    };
    let err_fn = |err| log::error!("an error occurred on the output audio stream: {}", err);

    Ok(device.build_output_stream(config, write, err_fn, None)?)
}
