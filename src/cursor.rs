use crate::decoder::Decoder;

/// Reads a decoder as a stream with an optional loop region.
///
/// With looping enabled, reads wrap from `loop_end` back to `loop_start` as many times as needed,
/// and the stream never ends. Without it, the stream ends when the decoder runs out.
pub struct StreamCursor {
    decoder: Box<dyn Decoder + Send>,
    looping: bool,
    loop_start: usize,
    loop_end: usize,
    cursor: usize,
    end_of_stream: bool,
}

impl StreamCursor {
    pub fn new(decoder: Box<dyn Decoder + Send>) -> Self {
        let loop_end = decoder.total_samples();
        Self { decoder, looping: false, loop_start: 0, loop_end, cursor: 0, end_of_stream: false }
    }

    /// Writes up to `requested` samples into `dest` and returns how many were written.
    ///
    /// Fewer samples than requested means the stream ran out; `end_of_stream` is then set and later calls
    /// return 0 until the next [`seek`](Self::seek).
    pub fn fill(&mut self, dest: &mut [f32], requested: usize) -> usize {
        let channels = usize::from(self.decoder.channel_count()).max(1);
        let requested = requested.min(dest.len() / channels);

        if !self.looping {
            if self.end_of_stream {
                return 0;
            }
            let (count, end) = self.decoder.read(&mut dest[..requested * channels], requested);
            self.cursor += count;
            if end || count < requested {
                self.end_of_stream = true;
            }
            return count;
        }

        self.end_of_stream = false;
        if self.loop_end <= self.loop_start {
            log::warn!("refusing to loop over an empty region [{}, {})", self.loop_start, self.loop_end);
            return 0;
        }

        let mut written = 0;
        let mut written_since_wrap = 0;
        while written < requested {
            if self.cursor >= self.loop_end {
                self.wrap();
                written_since_wrap = 0;
            }

            let wanted = (requested - written).min(self.loop_end - self.cursor);
            let (count, end) = self.decoder.read(&mut dest[written * channels..(written + wanted) * channels], wanted);
            self.cursor += count;
            written += count;
            written_since_wrap += count;

            if count < wanted || end {
                if written_since_wrap == 0 {
                    log::warn!("loop region [{}, {}) yielded no samples", self.loop_start, self.loop_end);
                    break;
                }
                // Decoder ran dry before loop_end
                self.wrap();
                written_since_wrap = 0;
            }
        }

        written
    }

    /// Moves the read position to `sample`. Out of range positions are ignored.
    pub fn seek(&mut self, sample: usize) {
        if sample >= self.decoder.total_samples() {
            return;
        }
        self.decoder.seek(sample);
        self.cursor = sample;
        self.end_of_stream = false;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
        if looping {
            self.end_of_stream = false;
        }
    }

    /// Ignored if `sample` is past the end of the data or not before the loop end.
    pub fn set_loop_start(&mut self, sample: usize) {
        if sample >= self.decoder.total_samples() {
            return;
        }
        if sample >= self.loop_end {
            log::warn!("loop start {} must come before the loop end {}", sample, self.loop_end);
            return;
        }
        self.loop_start = sample;
    }

    /// Ignored if `sample` is past the end of the data or not after the loop start.
    pub fn set_loop_end(&mut self, sample: usize) {
        if sample > self.decoder.total_samples() {
            return;
        }
        if sample <= self.loop_start {
            log::warn!("loop end {} must come after the loop start {}", sample, self.loop_start);
            return;
        }
        self.loop_end = sample;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn loop_start(&self) -> usize {
        self.loop_start
    }

    pub fn loop_end(&self) -> usize {
        self.loop_end
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }

    pub fn total_samples(&self) -> usize {
        self.decoder.total_samples()
    }

    pub fn channel_count(&self) -> u16 {
        self.decoder.channel_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.decoder.sample_rate()
    }

    fn wrap(&mut self) {
        self.decoder.seek(self.loop_start);
        self.cursor = self.loop_start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MemoryDecoder;

    /// Mono stream whose sample values are their own index.
    fn indexed(total: usize) -> StreamCursor {
        let samples: Vec<f32> = (0..total).map(|i| i as f32).collect();
        StreamCursor::new(Box::new(MemoryDecoder::new(samples, 1, 1000)))
    }

    fn range(start: usize, end: usize) -> Vec<f32> {
        (start..end).map(|i| i as f32).collect()
    }

    #[test]
    fn loop_region_repeats_exactly() {
        for &(start, end, loops, rest) in &[(0, 10, 3, 4), (5, 9, 2, 0), (20, 50, 1, 29), (0, 64, 0, 63)] {
            let mut cursor = indexed(64);
            cursor.set_looping(true);
            cursor.set_loop_end(end);
            cursor.set_loop_start(start);
            cursor.seek(start);

            let len = end - start;
            let total = loops * len + rest;
            // Pull in awkward chunk sizes to cross wrap points mid-request
            let mut out = Vec::new();
            let mut chunk = [0.0; 7];
            while out.len() < total {
                let want = (total - out.len()).min(7);
                let count = cursor.fill(&mut chunk, want);
                assert_eq!(count, want);
                out.extend_from_slice(&chunk[..count]);
            }

            let mut expected = Vec::new();
            for _ in 0..loops {
                expected.extend(range(start, end));
            }
            expected.extend(range(start, start + rest));
            assert_eq!(out, expected, "loop [{}, {})", start, end);
            assert!(!cursor.end_of_stream());
        }
    }

    #[test]
    fn looping_wraps_several_times_in_one_fill() {
        let mut cursor = indexed(1000);
        cursor.set_loop_start(100);
        cursor.set_loop_end(200);
        cursor.set_looping(true);
        cursor.seek(100);

        let mut dest = vec![0.0; 350];
        assert_eq!(cursor.fill(&mut dest, 350), 350);

        let mut expected = range(100, 200);
        expected.extend(range(100, 200));
        expected.extend(range(100, 200));
        expected.extend(range(100, 150));
        assert_eq!(dest, expected);
        assert_eq!(cursor.position(), 150);
        assert!(!cursor.end_of_stream());
    }

    #[test]
    fn intro_plays_before_the_loop() {
        let mut cursor = indexed(10);
        cursor.set_loop_start(6);
        cursor.set_looping(true);

        let mut dest = [0.0; 12];
        assert_eq!(cursor.fill(&mut dest, 12), 12);
        assert_eq!(&dest[..], &[0., 1., 2., 3., 4., 5., 6., 7., 8., 9., 6., 7.]);
    }

    #[test]
    fn non_looping_stream_runs_out() {
        let mut cursor = indexed(10);
        cursor.seek(6);

        let mut dest = [0.0; 8];
        assert_eq!(cursor.fill(&mut dest, 8), 4);
        assert_eq!(&dest[..4], &[6., 7., 8., 9.]);
        assert!(cursor.end_of_stream());
        assert_eq!(cursor.position(), 10);

        assert_eq!(cursor.fill(&mut dest, 8), 0);
        assert_eq!(cursor.fill(&mut dest, 8), 0);

        cursor.seek(2);
        assert!(!cursor.end_of_stream());
        assert_eq!(cursor.fill(&mut dest, 2), 2);
        assert_eq!(&dest[..2], &[2., 3.]);
    }

    #[test]
    fn exact_fill_to_the_end_reports_it() {
        let mut cursor = indexed(4);
        let mut dest = [0.0; 4];
        assert_eq!(cursor.fill(&mut dest, 4), 4);
        assert!(cursor.end_of_stream());
    }

    #[test]
    fn enabling_looping_clears_end_of_stream() {
        let mut cursor = indexed(4);
        let mut dest = [0.0; 8];
        cursor.fill(&mut dest, 8);
        assert!(cursor.end_of_stream());

        cursor.set_looping(true);
        assert!(!cursor.end_of_stream());
        assert_eq!(cursor.fill(&mut dest, 6), 6);
        assert_eq!(&dest[..6], &[0., 1., 2., 3., 0., 1.]);
    }

    #[test]
    fn out_of_range_requests_are_ignored() {
        let mut cursor = indexed(10);
        cursor.seek(3);
        cursor.seek(10);
        assert_eq!(cursor.position(), 3);

        cursor.set_loop_start(10);
        cursor.set_loop_end(11);
        assert_eq!((cursor.loop_start(), cursor.loop_end()), (0, 10));

        cursor.set_loop_end(4);
        cursor.set_loop_start(4);
        cursor.set_loop_start(7);
        assert_eq!((cursor.loop_start(), cursor.loop_end()), (0, 4));

        cursor.set_loop_start(2);
        cursor.set_loop_end(2);
        assert_eq!((cursor.loop_start(), cursor.loop_end()), (2, 4));
    }

    #[test]
    fn cursor_past_the_loop_end_wraps_first() {
        let mut cursor = indexed(10);
        cursor.seek(8);
        cursor.set_loop_end(5);
        cursor.set_looping(true);

        let mut dest = [0.0; 3];
        assert_eq!(cursor.fill(&mut dest, 3), 3);
        assert_eq!(dest, [0., 1., 2.]);
    }

    #[test]
    fn requests_are_bounded_by_the_destination() {
        let samples: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let mut cursor = StreamCursor::new(Box::new(MemoryDecoder::new(samples, 2, 1000)));
        let mut dest = [0.0; 6];
        assert_eq!(cursor.fill(&mut dest, 100), 3);
        assert_eq!(cursor.position(), 3);
        assert!(!cursor.end_of_stream());
    }
}
