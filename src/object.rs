//! Logical sounds and music tracks, and their play state machine.
//!
//! An object holds its decoded data (one buffer for static audio, a [`StreamCursor`] feeding two
//! alternating buffers for streamed audio) and borrows a playback source from the engine's pool.
//! Nothing here fails loudly: operations that can't be carried out are logged and skipped.

use crate::backend::{check, Backend, BufferId, PcmFormat, SourceId, SourceState};
use crate::buffer::{create_buffer, BufferPair};
use crate::cursor::StreamCursor;
use crate::decoder::{read_to_end, Decoder, MemoryDecoder};
use crate::effect::{Fade, FadeKind};
use crate::Error;
use std::time::Duration;

/// Identifies an audio object registered with an engine. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AudioId(pub(crate) u64);

/// Which global volume applies to an object. Music loops by default, sounds don't.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioKind {
    Sound,
    Music,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadMode {
    /// Decode everything up front into a single buffer.
    Static,
    /// Decode everything into memory, then stream it through two buffers.
    StreamFromMemory,
    /// Stream straight from the decoder, reading as playback advances.
    StreamFromFile,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Unloaded,
    Stopped,
    Playing,
    Paused,
}

enum Playback {
    Static { buffer: BufferId },
    Stream(Stream),
}

struct Stream {
    cursor: StreamCursor,
    buffers: BufferPair,
    chunk: usize,
    scratch: Vec<f32>,
    // Buffers that came back empty and sit off the queue until the cursor has data again
    idle: Vec<BufferId>,
}

impl Stream {
    /// Refills `buffer` from the cursor. Returns the number of samples it now holds.
    fn refill<B: Backend + ?Sized>(&mut self, backend: &mut B, buffer: BufferId, format: PcmFormat) -> usize {
        let count = self.cursor.fill(&mut self.scratch, self.chunk);
        if count == 0 {
            return 0;
        }

        let channels = usize::from(format.channels);
        backend.fill_buffer(buffer, format, &self.scratch[..count * channels]);
        if !check(backend, "refilling a stream buffer") {
            return 0;
        }
        log::trace!("refilled {:?} with {} samples, cursor at {}", buffer, count, self.cursor.position());
        count
    }

    /// Fills both buffers and queues whatever got data.
    fn prime<B: Backend + ?Sized>(&mut self, backend: &mut B, source: Option<SourceId>, format: PcmFormat) {
        for buffer in self.buffers.ids() {
            let filled = self.refill(backend, buffer, format) > 0;
            if let Some(source) = source {
                if filled {
                    backend.queue_buffers(source, &[buffer]);
                } else {
                    self.idle.push(buffer);
                }
            }
        }
        check(backend, "queueing stream buffers");
    }

    /// Puts idle buffers back on the queue once the cursor can fill them again.
    fn requeue_idle<B: Backend + ?Sized>(&mut self, backend: &mut B, source: SourceId, format: PcmFormat) {
        if self.idle.is_empty() || self.cursor.end_of_stream() {
            return;
        }
        for buffer in std::mem::take(&mut self.idle) {
            if self.refill(backend, buffer, format) > 0 {
                backend.queue_buffers(source, &[buffer]);
            } else {
                self.idle.push(buffer);
            }
        }
        check(backend, "requeueing idle stream buffers");
    }

    /// Throws away whatever is buffered and starts over from `offset`. Leaves the source stopped.
    fn restart_at<B: Backend + ?Sized>(&mut self, backend: &mut B, source: SourceId, offset: usize, format: PcmFormat) {
        backend.stop(source);
        backend.set_buffer(source, None);
        check(backend, "flushing stream buffers");

        self.idle.clear();
        self.cursor.seek(offset);
        self.prime(backend, Some(source), format);
    }
}

/// A sound effect or music track. Reached through [`AudioRef`](crate::AudioRef), which derefs to this.
pub struct AudioObject {
    id: AudioId,
    kind: AudioKind,
    state: PlayState,
    format: PcmFormat,
    bits_per_sample: u16,
    total_samples: usize,
    playback: Option<Playback>,
    source: Option<SourceId>,
    looping: bool,
    volume: f32,
    category_volume: f32,
    offset: usize,
    position: [f32; 3],
    velocity: [f32; 3],
    direction: [f32; 3],
    fade: Option<Fade>,
}

impl AudioObject {
    /// Decodes `decoder` according to `mode` and sets up playback on `source`, if there is one.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn load<B: Backend + ?Sized>(
        id: AudioId,
        kind: AudioKind,
        mut decoder: Box<dyn Decoder + Send>,
        mode: LoadMode,
        backend: &mut B,
        source: Option<SourceId>,
        stream_buffer_samples: usize,
        category_volume: f32,
    ) -> Result<Self, Error> {
        let channels = decoder.channel_count();
        if channels == 0 {
            return Err(Error::InvalidAudio("no channels"));
        }
        if channels > 2 {
            return Err(Error::InvalidAudio("more than two channels"));
        }
        if decoder.sample_rate() == 0 {
            return Err(Error::InvalidAudio("zero sample rate"));
        }
        if decoder.total_samples() == 0 {
            return Err(Error::InvalidAudio("no samples"));
        }

        let format = PcmFormat { channels, sample_rate: decoder.sample_rate() };
        let bits_per_sample = decoder.bits_per_sample();
        let total_samples = decoder.total_samples();
        let looping = kind == AudioKind::Music;

        let playback = match mode {
            LoadMode::Static => {
                let samples = read_to_end(decoder.as_mut());
                if samples.len() / usize::from(channels) < total_samples {
                    return Err(Error::InvalidAudio("data ended early"));
                }
                let buffer = create_buffer(backend).ok_or(Error::BufferAllocation)?;
                backend.fill_buffer(buffer, format, &samples);
                if !check(backend, "filling a static buffer") {
                    backend.destroy_buffer(buffer);
                    check(backend, "destroying a static buffer");
                    return Err(Error::BufferAllocation);
                }
                if let Some(source) = source {
                    backend.set_buffer(source, Some(buffer));
                    backend.set_looping(source, looping);
                    check(backend, "attaching a static buffer");
                }
                Playback::Static { buffer }
            }
            LoadMode::StreamFromMemory | LoadMode::StreamFromFile => {
                if mode == LoadMode::StreamFromMemory {
                    let decoded = MemoryDecoder::from_decoder(decoder.as_mut());
                    if decoded.total_samples() < total_samples {
                        return Err(Error::InvalidAudio("data ended early"));
                    }
                    decoder = Box::new(decoded);
                }
                let mut cursor = StreamCursor::new(decoder);
                cursor.set_looping(looping);

                let buffers = BufferPair::create(backend).ok_or(Error::BufferAllocation)?;
                let chunk = stream_buffer_samples.max(1);
                let scratch = vec![0.0; chunk * usize::from(channels)];
                let mut stream = Stream { cursor, buffers, chunk, scratch, idle: Vec::new() };
                stream.prime(backend, source, format);
                Playback::Stream(stream)
            }
        };

        let mut object = Self {
            id,
            kind,
            state: PlayState::Stopped,
            format,
            bits_per_sample,
            total_samples,
            playback: Some(playback),
            source,
            looping,
            volume: 1.0,
            category_volume,
            offset: 0,
            position: [0.0; 3],
            velocity: [0.0; 3],
            direction: [0.0; 3],
            fade: None,
        };
        object.apply_gain(backend);
        Ok(object)
    }

    pub fn id(&self) -> AudioId {
        self.id
    }

    pub fn kind(&self) -> AudioKind {
        self.kind
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.playback, Some(Playback::Stream(_)))
    }

    /// Whether a playback source was available when this object was loaded.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    /// The last position explicitly seeked to. Stops and finished streams return here.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.format.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.total_samples as f64 / f64::from(self.format.sample_rate))
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_looping(&self) -> bool {
        match &self.playback {
            Some(Playback::Stream(stream)) => stream.cursor.is_looping(),
            _ => self.looping,
        }
    }

    /// Loop start of a streamed object.
    pub fn loop_start(&self) -> Option<usize> {
        self.stream().map(|s| s.cursor.loop_start())
    }

    /// Loop end of a streamed object.
    pub fn loop_end(&self) -> Option<usize> {
        self.stream().map(|s| s.cursor.loop_end())
    }

    /// How far a streamed object has been decoded. Runs ahead of what's audible by up to two buffers.
    pub fn stream_position(&self) -> Option<usize> {
        self.stream().map(|s| s.cursor.position())
    }

    pub fn position(&self) -> [f32; 3] {
        self.position
    }

    pub fn velocity(&self) -> [f32; 3] {
        self.velocity
    }

    pub fn direction(&self) -> [f32; 3] {
        self.direction
    }

    pub fn fade(&self) -> Option<FadeKind> {
        self.fade.map(|f| f.kind())
    }

    pub(crate) fn play<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        match self.state {
            PlayState::Unloaded => {
                log::warn!("{:?} isn't loaded, can't play it", self.id);
                return;
            }
            PlayState::Playing => return,
            PlayState::Stopped | PlayState::Paused => {}
        }
        let Some(source) = self.source else {
            log::warn!("{:?} has no playback source, can't play it", self.id);
            return;
        };

        // A finished stream starts over from its seek anchor
        if self.state == PlayState::Stopped {
            if let Some(Playback::Stream(stream)) = &mut self.playback {
                if stream.cursor.end_of_stream() {
                    stream.restart_at(backend, source, self.offset, self.format);
                }
            }
        }

        backend.play(source);
        if check(backend, "starting playback") {
            self.state = PlayState::Playing;
        }
    }

    pub(crate) fn stop<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if matches!(self.state, PlayState::Unloaded | PlayState::Stopped) {
            return;
        }
        let Some(source) = self.source else {
            log::warn!("{:?} has no playback source, can't stop it", self.id);
            return;
        };

        backend.stop(source);
        match &mut self.playback {
            Some(Playback::Stream(stream)) => stream.restart_at(backend, source, self.offset, self.format),
            Some(Playback::Static { .. }) => backend.set_sample_offset(source, self.offset),
            None => {}
        }
        check(backend, "stopping playback");
        self.state = PlayState::Stopped;

        if self.fade.take().is_some() {
            self.apply_gain(backend);
        }
    }

    pub(crate) fn pause<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if self.state != PlayState::Playing {
            return;
        }
        let Some(source) = self.source else { return };

        backend.pause(source);
        if check(backend, "pausing playback") {
            self.state = PlayState::Paused;
        }
    }

    pub(crate) fn resume<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if self.state != PlayState::Paused {
            return;
        }
        let Some(source) = self.source else { return };

        backend.play(source);
        if check(backend, "resuming playback") {
            self.state = PlayState::Playing;
        }
    }

    pub(crate) fn rewind<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if self.state == PlayState::Unloaded {
            return;
        }
        let Some(source) = self.source else {
            log::warn!("{:?} has no playback source, can't rewind it", self.id);
            return;
        };

        match &mut self.playback {
            Some(Playback::Stream(stream)) => stream.restart_at(backend, source, self.offset, self.format),
            Some(Playback::Static { .. }) => backend.rewind(source),
            None => return,
        }
        if self.state == PlayState::Playing {
            backend.play(source);
        }
        check(backend, "rewinding playback");
    }

    pub(crate) fn seek_sample<B: Backend + ?Sized>(&mut self, backend: &mut B, sample: usize) {
        if self.state == PlayState::Unloaded {
            return;
        }
        if sample >= self.total_samples {
            log::warn!("{:?}: can't seek to sample {}, it only has {}", self.id, sample, self.total_samples);
            return;
        }
        let Some(source) = self.source else {
            log::warn!("{:?} has no playback source, can't seek it", self.id);
            return;
        };

        self.offset = sample;
        match &mut self.playback {
            Some(Playback::Stream(stream)) => {
                stream.restart_at(backend, source, sample, self.format);
                if self.state == PlayState::Playing {
                    backend.play(source);
                }
            }
            Some(Playback::Static { .. }) => backend.set_sample_offset(source, sample),
            None => {}
        }
        check(backend, "seeking");
    }

    pub(crate) fn seek_second<B: Backend + ?Sized>(&mut self, backend: &mut B, second: f32) {
        if !(second >= 0.0) {
            log::warn!("{:?}: can't seek to {} seconds", self.id, second);
            return;
        }
        let sample = (f64::from(second) * f64::from(self.format.sample_rate)) as usize;
        self.seek_sample(backend, sample);
    }

    pub(crate) fn set_looping<B: Backend + ?Sized>(&mut self, backend: &mut B, looping: bool) {
        self.looping = looping;
        match &mut self.playback {
            Some(Playback::Stream(stream)) => stream.cursor.set_looping(looping),
            Some(Playback::Static { .. }) => {
                if let Some(source) = self.source {
                    backend.set_looping(source, looping);
                    check(backend, "setting looping");
                }
            }
            None => {}
        }
    }

    pub(crate) fn set_loop_start(&mut self, sample: usize) {
        match &mut self.playback {
            Some(Playback::Stream(stream)) => stream.cursor.set_loop_start(sample),
            _ => log::warn!("{:?}: loop points only apply to streamed audio", self.id),
        }
    }

    pub(crate) fn set_loop_end(&mut self, sample: usize) {
        match &mut self.playback {
            Some(Playback::Stream(stream)) => stream.cursor.set_loop_end(sample),
            _ => log::warn!("{:?}: loop points only apply to streamed audio", self.id),
        }
    }

    pub(crate) fn set_volume<B: Backend + ?Sized>(&mut self, backend: &mut B, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_gain(backend);
    }

    pub(crate) fn set_category_volume<B: Backend + ?Sized>(&mut self, backend: &mut B, volume: f32) {
        self.category_volume = volume;
        self.apply_gain(backend);
    }

    pub(crate) fn set_position<B: Backend + ?Sized>(&mut self, backend: &mut B, position: [f32; 3]) {
        self.position = position;
        if let Some(source) = self.spatial_source() {
            backend.set_position(source, position);
            check(backend, "setting source position");
        }
    }

    pub(crate) fn set_velocity<B: Backend + ?Sized>(&mut self, backend: &mut B, velocity: [f32; 3]) {
        self.velocity = velocity;
        if let Some(source) = self.spatial_source() {
            backend.set_velocity(source, velocity);
            check(backend, "setting source velocity");
        }
    }

    pub(crate) fn set_direction<B: Backend + ?Sized>(&mut self, backend: &mut B, direction: [f32; 3]) {
        self.direction = direction;
        if let Some(source) = self.spatial_source() {
            backend.set_direction(source, direction);
            check(backend, "setting source direction");
        }
    }

    /// Starts playing from silence, reaching full volume after `duration`.
    pub(crate) fn fade_in<B: Backend + ?Sized>(&mut self, backend: &mut B, duration: Duration) {
        self.fade = Some(Fade::new(FadeKind::In, duration));
        self.apply_gain(backend);
        self.play(backend);
        if self.state != PlayState::Playing {
            self.fade = None;
            self.apply_gain(backend);
        }
    }

    /// Ramps down to silence over `duration`, then stops.
    pub(crate) fn fade_out<B: Backend + ?Sized>(&mut self, backend: &mut B, duration: Duration) {
        if self.state != PlayState::Playing {
            return;
        }
        self.fade = Some(Fade::new(FadeKind::Out, duration));
        self.apply_gain(backend);
    }

    pub(crate) fn update_effects<B: Backend + ?Sized>(&mut self, backend: &mut B, elapsed: Duration) {
        if self.state != PlayState::Playing {
            return;
        }
        let Some(fade) = self.fade.as_mut() else { return };
        let finished = fade.advance(elapsed);
        let kind = fade.kind();

        if finished {
            self.fade = None;
            if kind == FadeKind::Out {
                self.stop(backend);
                // Back to full gain so the next play isn't silent
                self.apply_gain(backend);
                return;
            }
        }
        self.apply_gain(backend);
    }

    /// Per-frame housekeeping: keeps streams fed and notices static audio that finished on its own.
    pub(crate) fn update<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if self.state != PlayState::Playing {
            return;
        }
        let Some(source) = self.source else { return };
        let format = self.format;

        let stream = match &mut self.playback {
            Some(Playback::Stream(stream)) => stream,
            Some(Playback::Static { .. }) => {
                if backend.source_state(source) == SourceState::Stopped {
                    self.state = PlayState::Stopped;
                    backend.set_sample_offset(source, self.offset);
                    check(backend, "resetting a finished sound");
                }
                return;
            }
            None => return,
        };

        if stream.cursor.end_of_stream() && backend.buffers_queued(source) == 0 {
            self.stop(backend);
            return;
        }

        // Buffers come back oldest first, which keeps the audio in order
        let processed = backend.buffers_processed(source);
        for _ in 0..processed {
            let Some(buffer) = backend.unqueue_buffer(source) else { break };
            if stream.refill(backend, buffer, format) > 0 {
                backend.queue_buffers(source, &[buffer]);
            } else {
                stream.idle.push(buffer);
            }
        }
        check(backend, "cycling stream buffers");
        stream.requeue_idle(backend, source, format);

        // Both buffers drained before we got here, the source stopped on its own
        if backend.source_state(source) != SourceState::Playing && backend.buffers_queued(source) > 0 {
            log::debug!("{:?} ran out of buffered audio, restarting it", self.id);
            backend.play(source);
            check(backend, "restarting an underrun stream");
        }
    }

    /// Gives up the playback source. The caller returns it to the pool.
    pub(crate) fn take_source(&mut self) -> Option<SourceId> {
        self.source.take()
    }

    /// Frees buffers and decoded data. The source must have been released first.
    pub(crate) fn unload<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        match self.playback.take() {
            Some(Playback::Static { buffer }) => {
                backend.destroy_buffer(buffer);
                check(backend, "destroying a static buffer");
            }
            Some(Playback::Stream(stream)) => stream.buffers.destroy(backend),
            None => {}
        }
        self.state = PlayState::Unloaded;
        self.fade = None;
    }

    fn stream(&self) -> Option<&Stream> {
        match &self.playback {
            Some(Playback::Stream(stream)) => Some(stream),
            _ => None,
        }
    }

    fn effective_gain(&self) -> f32 {
        let fade = self.fade.map(|f| f.gain()).unwrap_or(1.0);
        self.volume * self.category_volume * fade
    }

    fn apply_gain<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(source) = self.source {
            backend.set_gain(source, self.effective_gain());
            check(backend, "setting gain");
        }
    }

    // Positional attributes only make sense for mono data
    fn spatial_source(&self) -> Option<SourceId> {
        if self.format.channels != 1 {
            log::warn!("{:?} isn't mono, positional attributes won't be applied", self.id);
            return None;
        }
        self.source
    }
}
