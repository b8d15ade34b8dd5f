use crate::backend::{Backend, BackendError, BufferId, PcmFormat, SourceId, SourceState};

const INIT_CAPACITY: usize = 16;

/// How many sources a mixer hands out unless told otherwise.
pub const DEFAULT_SOURCE_LIMIT: usize = 256;

/// A software implementation of [`Backend`]. Mixes every playing source into one output stream.
///
/// Designed to be attached to an output device and left there for the entire lifetime of the application.
/// Sources are resampled to the output rate with linear interpolation, and mono/stereo data is converted
/// to the output channel count.
pub struct Mixer {
    channels: usize,
    sample_rate: u32,
    source_limit: usize,
    buffers: Vec<Option<PcmBuffer>>,
    voices: Vec<Option<Voice>>,
    listener: Listener,
    error: Option<BackendError>,
}

struct PcmBuffer {
    format: PcmFormat,
    samples: Vec<f32>,
}

impl PcmBuffer {
    fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.format.channels).max(1)
    }
}

struct Voice {
    queue: Vec<BufferId>,
    // Index of the buffer being played, everything before it has been processed
    current: usize,
    // Fractional read position inside the current buffer, in source frames
    frame: f64,
    state: SourceState,
    looping: bool,
    gain: f32,
    pending_offset: Option<usize>,
    position: [f32; 3],
    velocity: [f32; 3],
    direction: [f32; 3],
}

impl Voice {
    fn new() -> Self {
        Self {
            queue: Vec::new(),
            current: 0,
            frame: 0.0,
            state: SourceState::Initial,
            looping: false,
            gain: 1.0,
            pending_offset: None,
            position: [0.0; 3],
            velocity: [0.0; 3],
            direction: [0.0; 3],
        }
    }
}

struct Listener {
    gain: f32,
    position: [f32; 3],
    velocity: [f32; 3],
    orientation: [f32; 6],
}

impl Mixer {
    /// Constructs a new Mixer. `channels` and `sample_rate` describe the output data.
    pub fn new(channels: usize, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
            source_limit: DEFAULT_SOURCE_LIMIT,
            buffers: Vec::with_capacity(INIT_CAPACITY),
            voices: Vec::with_capacity(INIT_CAPACITY),
            listener: Listener {
                gain: 1.0,
                position: [0.0; 3],
                velocity: [0.0; 3],
                orientation: [0.0, 0.0, -1.0, 0.0, 1.0, 0.0],
            },
            error: None,
        }
    }

    /// Limits how many sources may exist at once, like a device with a fixed number of voices.
    pub fn with_source_limit(mut self, limit: usize) -> Self {
        self.source_limit = limit;
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the data last written to `buffer`.
    pub fn buffer_data(&self, buffer: BufferId) -> Option<&[f32]> {
        self.buffer(buffer).map(|b| b.samples.as_slice())
    }

    /// Returns the buffers queued on `source`, oldest first.
    pub fn queued(&self, source: SourceId) -> &[BufferId] {
        self.voice(source).map(|v| v.queue.as_slice()).unwrap_or(&[])
    }

    pub fn listener_gain(&self) -> f32 {
        self.listener.gain
    }

    pub fn listener_position(&self) -> [f32; 3] {
        self.listener.position
    }

    pub fn listener_velocity(&self) -> [f32; 3] {
        self.listener.velocity
    }

    pub fn listener_orientation(&self) -> [f32; 6] {
        self.listener.orientation
    }

    pub fn source_position(&self, source: SourceId) -> Option<[f32; 3]> {
        self.voice(source).map(|v| v.position)
    }

    pub fn source_velocity(&self, source: SourceId) -> Option<[f32; 3]> {
        self.voice(source).map(|v| v.velocity)
    }

    pub fn source_direction(&self, source: SourceId) -> Option<[f32; 3]> {
        self.voice(source).map(|v| v.direction)
    }

    /// Mixes all playing sources into `buffer`, which is interleaved with this Mixer's channel count.
    /// Returns the number of values written, which is always the whole buffer.
    pub fn write_samples(&mut self, buffer: &mut [f32]) -> usize {
        buffer.iter_mut().for_each(|s| *s = 0.0);

        let Self { channels, sample_rate, buffers, voices, listener, .. } = self;
        for voice in voices.iter_mut().flatten() {
            if voice.state == SourceState::Playing {
                mix_voice(voice, buffers, buffer, *channels, *sample_rate, listener.gain);
            }
        }

        buffer.len()
    }

    fn buffer(&self, buffer: BufferId) -> Option<&PcmBuffer> {
        self.buffers.get(buffer.0 as usize).and_then(Option::as_ref)
    }

    fn voice(&self, source: SourceId) -> Option<&Voice> {
        self.voices.get(source.0 as usize).and_then(Option::as_ref)
    }

    fn voice_mut(&mut self, source: SourceId) -> Option<&mut Voice> {
        if self.voice(source).is_none() {
            self.error = Some(BackendError::InvalidName);
            return None;
        }
        self.voices.get_mut(source.0 as usize).and_then(Option::as_mut)
    }

    fn frames_in(&self, buffer: BufferId) -> usize {
        self.buffer(buffer).map(PcmBuffer::frames).unwrap_or(0)
    }

    // Positions a voice `offset` frames into its queue
    fn seek_voice(&mut self, source: SourceId, offset: usize) {
        let frames: Vec<usize> = self.queued(source).iter().map(|b| self.frames_in(*b)).collect();
        let Some(voice) = self.voice_mut(source) else { return };

        let mut remaining = offset;
        for (index, len) in frames.iter().copied().enumerate() {
            if remaining < len {
                voice.current = index;
                voice.frame = remaining as f64;
                return;
            }
            remaining -= len;
        }
        self.error = Some(BackendError::InvalidValue);
    }

    fn is_attached(&self, buffer: BufferId) -> bool {
        self.voices.iter().flatten().any(|v| {
            matches!(v.state, SourceState::Playing | SourceState::Paused) && v.queue.contains(&buffer)
        })
    }
}

fn mix_voice(
    voice: &mut Voice,
    buffers: &[Option<PcmBuffer>],
    output: &mut [f32],
    output_channels: usize,
    output_rate: u32,
    master_gain: f32,
) {
    let gain = voice.gain * master_gain;

    for out_frame in output.chunks_exact_mut(output_channels) {
        // Find the buffer the read position lands in, moving finished buffers to processed
        let data = loop {
            let Some(id) = voice.queue.get(voice.current).copied() else {
                voice.state = SourceState::Stopped;
                voice.frame = 0.0;
                return;
            };
            let Some(data) = buffers.get(id.0 as usize).and_then(Option::as_ref) else {
                voice.current += 1;
                continue;
            };
            let frames = data.frames() as f64;
            if voice.frame < frames {
                break data;
            }

            voice.frame -= frames;
            voice.current += 1;
            if voice.looping && voice.current == voice.queue.len() {
                voice.current = 0;
                if frames == 0.0 {
                    voice.state = SourceState::Stopped;
                    return;
                }
            }
        };

        let source_channels = usize::from(data.format.channels).max(1);
        let index = voice.frame.floor() as usize;
        let next = (index + 1).min(data.frames() - 1);
        let fract = (voice.frame - voice.frame.floor()) as f32;
        let sample = |frame: usize, channel: usize| data.samples[frame * source_channels + channel];
        let interpolated = |channel: usize| {
            let start = sample(index, channel);
            let end = sample(next, channel);
            start + (end - start) * fract
        };

        if source_channels == output_channels {
            // Firstly, if the input and output channel counts are the same, pass straight through.
            for (channel, out) in out_frame.iter_mut().enumerate() {
                *out += interpolated(channel) * gain;
            }
        } else if source_channels == 1 {
            // Next, if the input is 1-channel, duplicate the sample across all output channels.
            let value = interpolated(0) * gain;
            out_frame.iter_mut().for_each(|out| *out += value);
        } else if output_channels == 1 {
            // Fold everything down to mono.
            let sum: f32 = (0..source_channels).map(interpolated).sum();
            out_frame[0] += sum / source_channels as f32 * gain;
        } else {
            // Different multi-channel counts, line up the channels both sides have.
            for (channel, out) in out_frame.iter_mut().enumerate().take(source_channels) {
                *out += interpolated(channel) * gain;
            }
        }

        voice.frame += f64::from(data.format.sample_rate) / f64::from(output_rate);
    }
}

impl Backend for Mixer {
    fn create_buffer(&mut self) -> Option<BufferId> {
        let buffer = PcmBuffer { format: PcmFormat { channels: 1, sample_rate: self.sample_rate }, samples: Vec::new() };
        let index = match self.buffers.iter().position(Option::is_none) {
            Some(index) => {
                self.buffers[index] = Some(buffer);
                index
            }
            None => {
                self.buffers.push(Some(buffer));
                self.buffers.len() - 1
            }
        };
        Some(BufferId(index as u32))
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        if self.buffer(buffer).is_none() {
            self.error = Some(BackendError::InvalidName);
        } else if self.voices.iter().flatten().any(|v| v.queue.contains(&buffer)) {
            self.error = Some(BackendError::InvalidOperation);
        } else {
            self.buffers[buffer.0 as usize] = None;
        }
    }

    fn is_buffer(&self, buffer: BufferId) -> bool {
        self.buffer(buffer).is_some()
    }

    fn fill_buffer(&mut self, buffer: BufferId, format: PcmFormat, samples: &[f32]) {
        if self.buffer(buffer).is_none() {
            self.error = Some(BackendError::InvalidName);
        } else if format.channels == 0 || format.sample_rate == 0 {
            self.error = Some(BackendError::InvalidValue);
        } else if self.is_attached(buffer) {
            self.error = Some(BackendError::InvalidOperation);
        } else if let Some(data) = self.buffers[buffer.0 as usize].as_mut() {
            data.format = format;
            data.samples.clear();
            data.samples.extend_from_slice(samples);
        }
    }

    fn create_source(&mut self) -> Option<SourceId> {
        if self.voices.iter().flatten().count() >= self.source_limit {
            self.error = Some(BackendError::OutOfMemory);
            return None;
        }
        let index = match self.voices.iter().position(Option::is_none) {
            Some(index) => {
                self.voices[index] = Some(Voice::new());
                index
            }
            None => {
                self.voices.push(Some(Voice::new()));
                self.voices.len() - 1
            }
        };
        Some(SourceId(index as u32))
    }

    fn destroy_source(&mut self, source: SourceId) {
        if self.voice_mut(source).is_some() {
            self.voices[source.0 as usize] = None;
        }
    }

    fn play(&mut self, source: SourceId) {
        let Some(voice) = self.voice_mut(source) else { return };
        let offset = match voice.state {
            SourceState::Playing => None,
            SourceState::Paused => {
                voice.state = SourceState::Playing;
                None
            }
            SourceState::Initial | SourceState::Stopped => {
                voice.current = 0;
                voice.frame = 0.0;
                let offset = voice.pending_offset.take();
                if voice.queue.is_empty() {
                    voice.state = SourceState::Stopped;
                    None
                } else {
                    voice.state = SourceState::Playing;
                    offset
                }
            }
        };
        if let Some(offset) = offset {
            self.seek_voice(source, offset);
        }
    }

    fn pause(&mut self, source: SourceId) {
        let Some(voice) = self.voice_mut(source) else { return };
        if voice.state == SourceState::Playing {
            voice.state = SourceState::Paused;
        }
    }

    fn stop(&mut self, source: SourceId) {
        let Some(voice) = self.voice_mut(source) else { return };
        voice.state = SourceState::Stopped;
        voice.current = voice.queue.len();
        voice.frame = 0.0;
    }

    fn rewind(&mut self, source: SourceId) {
        let Some(voice) = self.voice_mut(source) else { return };
        voice.state = SourceState::Initial;
        voice.current = 0;
        voice.frame = 0.0;
    }

    fn source_state(&self, source: SourceId) -> SourceState {
        self.voice(source).map(|v| v.state).unwrap_or(SourceState::Initial)
    }

    fn set_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) {
        if let Some(buffer) = buffer {
            if !self.is_buffer(buffer) {
                self.error = Some(BackendError::InvalidName);
                return;
            }
        }
        let Some(voice) = self.voice_mut(source) else { return };
        if matches!(voice.state, SourceState::Playing | SourceState::Paused) {
            self.error = Some(BackendError::InvalidOperation);
            return;
        }
        voice.queue.clear();
        voice.queue.extend(buffer);
        voice.current = 0;
        voice.frame = 0.0;
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) {
        if !buffers.iter().all(|b| self.is_buffer(*b)) {
            self.error = Some(BackendError::InvalidName);
            return;
        }
        let Some(voice) = self.voice_mut(source) else { return };
        voice.queue.extend_from_slice(buffers);
    }

    fn unqueue_buffer(&mut self, source: SourceId) -> Option<BufferId> {
        let voice = self.voice_mut(source)?;
        if voice.current == 0 {
            return None;
        }
        voice.current -= 1;
        Some(voice.queue.remove(0))
    }

    fn buffers_processed(&self, source: SourceId) -> usize {
        self.voice(source).map(|v| v.current.min(v.queue.len())).unwrap_or(0)
    }

    fn buffers_queued(&self, source: SourceId) -> usize {
        self.voice(source).map(|v| v.queue.len()).unwrap_or(0)
    }

    fn set_looping(&mut self, source: SourceId, looping: bool) {
        if let Some(voice) = self.voice_mut(source) {
            voice.looping = looping;
        }
    }

    fn is_looping(&self, source: SourceId) -> bool {
        self.voice(source).map(|v| v.looping).unwrap_or(false)
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        if !(gain >= 0.0) {
            self.error = Some(BackendError::InvalidValue);
            return;
        }
        if let Some(voice) = self.voice_mut(source) {
            voice.gain = gain;
        }
    }

    fn gain(&self, source: SourceId) -> f32 {
        self.voice(source).map(|v| v.gain).unwrap_or(1.0)
    }

    fn set_sample_offset(&mut self, source: SourceId, offset: usize) {
        let Some(voice) = self.voice_mut(source) else { return };
        if matches!(voice.state, SourceState::Playing | SourceState::Paused) {
            self.seek_voice(source, offset);
        } else {
            voice.pending_offset = Some(offset);
        }
    }

    fn sample_offset(&self, source: SourceId) -> usize {
        let Some(voice) = self.voice(source) else { return 0 };
        match voice.state {
            SourceState::Playing | SourceState::Paused => {
                let played: usize = voice.queue[..voice.current.min(voice.queue.len())].iter().map(|b| self.frames_in(*b)).sum();
                played + voice.frame as usize
            }
            SourceState::Initial | SourceState::Stopped => voice.pending_offset.unwrap_or(0),
        }
    }

    fn set_position(&mut self, source: SourceId, position: [f32; 3]) {
        if let Some(voice) = self.voice_mut(source) {
            voice.position = position;
        }
    }

    fn set_velocity(&mut self, source: SourceId, velocity: [f32; 3]) {
        if let Some(voice) = self.voice_mut(source) {
            voice.velocity = velocity;
        }
    }

    fn set_direction(&mut self, source: SourceId, direction: [f32; 3]) {
        if let Some(voice) = self.voice_mut(source) {
            voice.direction = direction;
        }
    }

    fn set_listener_gain(&mut self, gain: f32) {
        self.listener.gain = gain.max(0.0);
    }

    fn set_listener_position(&mut self, position: [f32; 3]) {
        self.listener.position = position;
    }

    fn set_listener_velocity(&mut self, velocity: [f32; 3]) {
        self.listener.velocity = velocity;
    }

    fn set_listener_orientation(&mut self, orientation: [f32; 6]) {
        self.listener.orientation = orientation;
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.error.take()
    }
}
