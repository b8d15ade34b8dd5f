pub mod memory;
pub mod wav;

pub use memory::MemoryDecoder;
pub use wav::WavDecoder;

/// A producer of decoded audio. Anything implementing this trait may be loaded into an audio object.
///
/// A "sample" here is one frame: one value per channel, interleaved. Values are `f32` in `[-1.0, 1.0]`.
pub trait Decoder {
    /// Returns the sample rate of the decoded data, ie. how many samples should be played per second.
    fn sample_rate(&self) -> u32;

    /// Returns the bit depth of the source data, before conversion to `f32`.
    fn bits_per_sample(&self) -> u16;

    /// Returns the number of channels in the decoded data.
    fn channel_count(&self) -> u16;

    /// Returns the number of samples (frames) in the whole stream.
    fn total_samples(&self) -> usize;

    /// Size of one sample (frame) in the source data, in bytes.
    fn sample_size(&self) -> usize {
        usize::from(self.channel_count()) * usize::from(self.bits_per_sample() / 8)
    }

    /// Reads up to `max_samples` samples into `dest`, starting at the read position.
    /// Never writes more than `dest.len() / channel_count()` samples.
    /// Returns the number of samples written and whether the end of the stream was reached.
    fn read(&mut self, dest: &mut [f32], max_samples: usize) -> (usize, bool);

    /// Moves the read position to `sample`. Positions past the end are clamped to the end.
    fn seek(&mut self, sample: usize);
}

/// Decodes everything from the read position to the end of the stream.
pub fn read_to_end(decoder: &mut dyn Decoder) -> Vec<f32> {
    const CHUNK: usize = 4096;

    let channels = usize::from(decoder.channel_count()).max(1);
    let mut samples = Vec::with_capacity(decoder.total_samples() * channels);
    let mut chunk = vec![0.0; CHUNK * channels];
    loop {
        let (count, end) = decoder.read(&mut chunk, CHUNK);
        samples.extend_from_slice(&chunk[..count * channels]);
        if end || count == 0 {
            break samples;
        }
    }
}
