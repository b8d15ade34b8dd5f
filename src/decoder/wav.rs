use super::Decoder;
use std::io::{Read, Seek};

/// Streams PCM samples out of a RIFF/WAVE file.
/// Only the header is read up front; sample data is pulled from the reader as it's needed.
pub struct WavDecoder<R: Read> {
    reader: hound::WavReader<R>,
    spec: hound::WavSpec,
    total_samples: usize,
    position: usize,
}

impl<R: Read + Seek> WavDecoder<R> {
    pub fn new(reader: R) -> Result<Self, hound::Error> {
        let reader = hound::WavReader::new(reader)?;
        let spec = reader.spec();
        let total_samples = reader.duration() as usize;
        Ok(Self { reader, spec, total_samples, position: 0 })
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

impl<R: Read + Seek> Decoder for WavDecoder<R> {
    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        self.spec.bits_per_sample
    }

    fn channel_count(&self) -> u16 {
        self.spec.channels
    }

    fn total_samples(&self) -> usize {
        self.total_samples
    }

    fn read(&mut self, dest: &mut [f32], max_samples: usize) -> (usize, bool) {
        let channels = usize::from(self.spec.channels).max(1);
        let remaining = self.total_samples - self.position;
        let count = max_samples.min(dest.len() / channels).min(remaining);
        if count == 0 {
            return (0, remaining == 0);
        }

        let dest = &mut dest[..count * channels];
        let result = match self.spec.sample_format {
            hound::SampleFormat::Float => fill_from(self.reader.samples::<f32>(), dest, |s| s),
            hound::SampleFormat::Int => {
                let max_value = (1u64 << (self.spec.bits_per_sample - 1)) as f32;
                fill_from(self.reader.samples::<i32>(), dest, |s| s as f32 / max_value)
            }
        };

        match result {
            Ok(written) if written == dest.len() => {
                self.position += count;
                (count, self.position == self.total_samples)
            }
            Ok(written) => {
                log::error!("WAVE data ended {} samples early", self.total_samples - self.position - written / channels);
                self.position += written / channels;
                (written / channels, true)
            }
            Err((written, err)) => {
                log::error!("failed to read WAVE samples at {}: {}", self.position + written / channels, err);
                self.position += written / channels;
                (written / channels, true)
            }
        }
    }

    fn seek(&mut self, sample: usize) {
        let sample = sample.min(self.total_samples);
        match self.reader.seek(sample as u32) {
            Ok(()) => self.position = sample,
            Err(err) => log::error!("failed to seek WAVE data to sample {}: {}", sample, err),
        }
    }
}

// Converts samples into `dest` until either runs out. On error, also reports how many were written.
fn fill_from<S>(
    samples: impl Iterator<Item = hound::Result<S>>,
    dest: &mut [f32],
    convert: impl Fn(S) -> f32,
) -> Result<usize, (usize, hound::Error)> {
    let mut written = 0;
    for (out, sample) in dest.iter_mut().zip(samples) {
        *out = convert(sample.map_err(|err| (written, err))?);
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    /// Builds a 16-bit PCM file in memory.
    pub(crate) fn pcm16_file(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec { channels, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };
        let mut file = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut file, spec).unwrap();
        for sample in samples {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
        file.into_inner()
    }

    #[test]
    fn parses_header() {
        let file = pcm16_file(2, 44100, &[0, 0, 100, -100, 200, -200]);
        let decoder = WavDecoder::new(Cursor::new(file)).unwrap();
        assert_eq!(decoder.channel_count(), 2);
        assert_eq!(decoder.sample_rate(), 44100);
        assert_eq!(decoder.bits_per_sample(), 16);
        assert_eq!(decoder.sample_size(), 4);
        assert_eq!(decoder.total_samples(), 3);
    }

    #[test]
    fn reads_and_seeks_frames() {
        let file = pcm16_file(1, 8000, &[0, 16384, -32768, 8192]);
        let mut decoder = WavDecoder::new(Cursor::new(file)).unwrap();

        let mut dest = [0.0; 3];
        assert_eq!(decoder.read(&mut dest, 3), (3, false));
        assert_relative_eq!(dest[0], 0.0);
        assert_relative_eq!(dest[1], 0.5);
        assert_relative_eq!(dest[2], -1.0);

        assert_eq!(decoder.read(&mut dest, 3), (1, true));
        assert_relative_eq!(dest[0], 0.25);
        assert_eq!(decoder.read(&mut dest, 3), (0, true));

        decoder.seek(1);
        assert_eq!(decoder.read(&mut dest, 1), (1, false));
        assert_relative_eq!(dest[0], 0.5);
    }

    #[test]
    fn float_samples_pass_through() {
        let spec = hound::WavSpec { channels: 1, sample_rate: 8000, bits_per_sample: 32, sample_format: hound::SampleFormat::Float };
        let mut file = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut file, spec).unwrap();
        writer.write_sample(0.25f32).unwrap();
        writer.write_sample(-0.75f32).unwrap();
        writer.finalize().unwrap();

        let mut decoder = WavDecoder::new(Cursor::new(file.into_inner())).unwrap();
        let mut dest = [0.0; 2];
        assert_eq!(decoder.read(&mut dest, 2), (2, true));
        assert_eq!(dest, [0.25, -0.75]);
    }

    #[test]
    fn truncated_data_ends_the_stream_early() {
        let mut file = pcm16_file(1, 8000, &[1, 2, 3, 4]);
        file.truncate(file.len() - 3);
        let mut decoder = WavDecoder::new(Cursor::new(file)).unwrap();
        assert_eq!(decoder.total_samples(), 4);

        let mut dest = [0.0; 4];
        assert_eq!(decoder.read(&mut dest, 4), (2, true));
    }

    #[test]
    fn rejects_garbage() {
        assert!(WavDecoder::new(Cursor::new(vec![0u8, 1, 2, 3, 4])).is_err());

        let mut file = pcm16_file(1, 8000, &[0; 4]);
        // 16-bit ADPCM
        file[20] = 2;
        assert!(WavDecoder::new(Cursor::new(file)).is_err());
    }

    #[test]
    fn oversized_format_chunk_is_rejected() {
        let mut file = Vec::new();
        file.extend_from_slice(b"RIFF");
        file.extend_from_slice(&36u32.to_le_bytes());
        file.extend_from_slice(b"WAVE");
        file.extend_from_slice(b"fmt ");
        file.extend_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        file.extend_from_slice(&1u16.to_le_bytes());
        file.extend_from_slice(&1u16.to_le_bytes());
        file.extend_from_slice(&8000u32.to_le_bytes());
        file.extend_from_slice(&16000u32.to_le_bytes());
        file.extend_from_slice(&2u16.to_le_bytes());
        file.extend_from_slice(&16u16.to_le_bytes());

        assert!(WavDecoder::new(Cursor::new(file)).is_err());
    }
}
