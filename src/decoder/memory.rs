use super::{read_to_end, Decoder};

/// Already-decoded PCM held in memory.
#[derive(Clone, Debug)]
pub struct MemoryDecoder {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    position: usize,
}

impl MemoryDecoder {
    /// Wraps interleaved `samples`. A trailing partial frame is ignored.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self { samples, channels, sample_rate, bits_per_sample: 32, position: 0 }
    }

    /// Overrides the reported source bit depth (32 by default).
    pub fn with_bits_per_sample(mut self, bits: u16) -> Self {
        self.bits_per_sample = bits;
        self
    }

    /// Decodes the rest of `decoder` into memory, keeping its format description.
    pub fn from_decoder(decoder: &mut dyn Decoder) -> Self {
        let samples = read_to_end(decoder);
        Self {
            samples,
            channels: decoder.channel_count(),
            sample_rate: decoder.sample_rate(),
            bits_per_sample: decoder.bits_per_sample(),
            position: 0,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    fn channels(&self) -> usize {
        usize::from(self.channels).max(1)
    }
}

impl Decoder for MemoryDecoder {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn total_samples(&self) -> usize {
        self.samples.len() / self.channels()
    }

    fn read(&mut self, dest: &mut [f32], max_samples: usize) -> (usize, bool) {
        let channels = self.channels();
        let remaining = self.total_samples() - self.position;
        let count = max_samples.min(dest.len() / channels).min(remaining);

        let start = self.position * channels;
        let end = start + count * channels;
        dest[..count * channels].copy_from_slice(&self.samples[start..end]);
        self.position += count;

        (count, self.position == self.total_samples())
    }

    fn seek(&mut self, sample: usize) {
        self.position = sample.min(self.total_samples());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_in_frames_and_reports_the_end() {
        let mut decoder = MemoryDecoder::new(vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5], 2, 22050);
        assert_eq!(decoder.total_samples(), 3);
        assert_eq!(decoder.sample_size(), 8);

        let mut dest = [0.0; 4];
        assert_eq!(decoder.read(&mut dest, 10), (2, false));
        assert_eq!(dest, [0.0, 0.5, 1.0, 1.5]);

        assert_eq!(decoder.read(&mut dest, 10), (1, true));
        assert_eq!(&dest[..2], &[2.0, 2.5]);

        assert_eq!(decoder.read(&mut dest, 10), (0, true));
    }

    #[test]
    fn seek_clamps_to_the_end() {
        let mut decoder = MemoryDecoder::new(vec![0.0, 1.0, 2.0], 1, 8000);
        decoder.seek(1);
        let mut dest = [0.0; 3];
        assert_eq!(decoder.read(&mut dest, 3), (2, true));
        assert_eq!(&dest[..2], &[1.0, 2.0]);

        decoder.seek(99);
        assert_eq!(decoder.read(&mut dest, 3), (0, true));
    }

    #[test]
    fn from_decoder_keeps_the_format() {
        let mut source = MemoryDecoder::new(vec![0.25; 8], 2, 44100).with_bits_per_sample(16);
        source.seek(1);
        let copy = MemoryDecoder::from_decoder(&mut source);
        assert_eq!(copy.total_samples(), 3);
        assert_eq!(copy.bits_per_sample(), 16);
        assert_eq!(copy.sample_rate(), 44100);
        assert_eq!(copy.samples(), &[0.25; 6]);
    }
}
