//! The audio engine: owns every loaded sound and music track, the source pool, and the listener.
//!
//! Call [`AudioEngine::update`] once per frame. Streams are refilled there, so a long gap between
//! updates shows up as an underrun, which the next update recovers from.

use crate::backend::{check, Backend, SourceId};
use crate::config::AudioConfig;
use crate::decoder::{Decoder, WavDecoder};
use crate::object::{AudioId, AudioKind, AudioObject, LoadMode, PlayState};
use crate::pool::SourcePool;
use crate::Error;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

struct Listener {
    position: [f32; 3],
    velocity: [f32; 3],
    orientation: [f32; 6],
}

pub struct AudioEngine<B: Backend> {
    backend: B,
    pool: SourcePool,
    config: AudioConfig,
    // Kept in load order, which is also the order updates run in
    objects: Vec<AudioObject>,
    next_id: u64,
    sound_volume: f32,
    music_volume: f32,
    listener: Listener,
    // Least recently used first
    one_shots: VecDeque<(PathBuf, AudioId)>,
}

impl<B: Backend> AudioEngine<B> {
    /// Sets up the source pool on `backend`. Fails if the backend won't give out a single source.
    pub fn new(mut backend: B, config: AudioConfig) -> Result<Self, Error> {
        let pool = SourcePool::new(&mut backend, config.max_sources);
        if pool.capacity() == 0 {
            log::error!("audio backend didn't provide any playback sources");
            return Err(Error::NoSources);
        }

        let listener = Listener { position: [0.0; 3], velocity: [0.0; 3], orientation: [0.0, 0.0, -1.0, 0.0, 1.0, 0.0] };
        backend.set_listener_gain(1.0);
        backend.set_listener_position(listener.position);
        backend.set_listener_velocity(listener.velocity);
        backend.set_listener_orientation(listener.orientation);
        check(&mut backend, "initializing the listener");

        log::info!("audio engine started with {} playback sources", pool.capacity());
        Ok(Self {
            backend,
            pool,
            sound_volume: config.sound_volume.clamp(0.0, 1.0),
            music_volume: config.music_volume.clamp(0.0, 1.0),
            config,
            objects: Vec::new(),
            next_id: 0,
            listener,
            one_shots: VecDeque::new(),
        })
    }

    pub fn load_sound(&mut self, decoder: impl Decoder + Send + 'static, mode: LoadMode) -> Result<AudioId, Error> {
        self.load(AudioKind::Sound, Box::new(decoder), mode)
    }

    pub fn load_music(&mut self, decoder: impl Decoder + Send + 'static, mode: LoadMode) -> Result<AudioId, Error> {
        self.load(AudioKind::Music, Box::new(decoder), mode)
    }

    pub fn load_sound_file(&mut self, path: impl AsRef<Path>, mode: LoadMode) -> Result<AudioId, Error> {
        let decoder = open_decoder(path.as_ref(), mode)?;
        self.load(AudioKind::Sound, decoder, mode)
    }

    pub fn load_music_file(&mut self, path: impl AsRef<Path>, mode: LoadMode) -> Result<AudioId, Error> {
        let decoder = open_decoder(path.as_ref(), mode)?;
        self.load(AudioKind::Music, decoder, mode)
    }

    fn load(&mut self, kind: AudioKind, decoder: Box<dyn Decoder + Send>, mode: LoadMode) -> Result<AudioId, Error> {
        let id = AudioId(self.next_id);
        self.next_id += 1;

        let source = self.pool.acquire(id);
        if source.is_none() {
            log::warn!("no playback source left for {:?}, it will stay silent", id);
        }

        let category_volume = self.category_volume(kind);
        let object = AudioObject::load(
            id,
            kind,
            decoder,
            mode,
            &mut self.backend,
            source,
            self.config.stream_buffer_samples,
            category_volume,
        );
        match object {
            Ok(object) => {
                log::debug!("loaded {:?} as {:?} ({:?}, {} samples)", id, kind, mode, object.total_samples());
                self.objects.push(object);
                Ok(id)
            }
            Err(err) => {
                if let Some(source) = source {
                    self.pool.release(&mut self.backend, source);
                }
                log::error!("failed to load {:?}: {}", kind, err);
                Err(err)
            }
        }
    }

    /// Gives access to one object. Queries go through `Deref`, state changes through the returned handle.
    pub fn audio(&mut self, id: AudioId) -> Option<AudioRef<'_, B>> {
        let object = self.objects.iter_mut().find(|o| o.id() == id)?;
        Some(AudioRef { object, backend: &mut self.backend })
    }

    /// Unloads an object and returns its source to the pool. Returns `false` if `id` isn't loaded.
    pub fn free(&mut self, id: AudioId) -> bool {
        let Some(index) = self.objects.iter().position(|o| o.id() == id) else {
            return false;
        };
        let mut object = self.objects.remove(index);
        release_object(&mut self.backend, &mut self.pool, &mut object);
        self.one_shots.retain(|(_, cached)| *cached != id);
        log::debug!("freed {:?}", id);
        true
    }

    pub fn contains(&self, id: AudioId) -> bool {
        self.objects.iter().any(|o| o.id() == id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Ids of every loaded object, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = AudioId> + '_ {
        self.objects.iter().map(AudioObject::id)
    }

    /// Refills streams, restarts underrun ones, and notices sounds that finished on their own.
    pub fn update(&mut self) {
        for object in &mut self.objects {
            object.update(&mut self.backend);
        }
    }

    /// Advances fades by `elapsed`.
    pub fn update_effects(&mut self, elapsed: Duration) {
        for object in &mut self.objects {
            object.update_effects(&mut self.backend, elapsed);
        }
    }

    pub fn sound_volume(&self) -> f32 {
        self.sound_volume
    }

    pub fn music_volume(&self) -> f32 {
        self.music_volume
    }

    /// Sets the volume every sound is scaled by. Clamped to `[0, 1]`.
    pub fn set_sound_volume(&mut self, volume: f32) {
        self.sound_volume = volume.clamp(0.0, 1.0);
        let volume = self.sound_volume;
        self.for_each_of(AudioKind::Sound, |object, backend| object.set_category_volume(backend, volume));
    }

    /// Sets the volume every music track is scaled by. Clamped to `[0, 1]`.
    pub fn set_music_volume(&mut self, volume: f32) {
        self.music_volume = volume.clamp(0.0, 1.0);
        let volume = self.music_volume;
        self.for_each_of(AudioKind::Music, |object, backend| object.set_category_volume(backend, volume));
    }

    pub fn pause_all_sounds(&mut self) {
        self.for_each_of(AudioKind::Sound, |object, backend| object.pause(backend));
    }

    pub fn resume_all_sounds(&mut self) {
        self.for_each_of(AudioKind::Sound, |object, backend| object.resume(backend));
    }

    pub fn stop_all_sounds(&mut self) {
        self.for_each_of(AudioKind::Sound, |object, backend| object.stop(backend));
    }

    pub fn rewind_all_sounds(&mut self) {
        self.for_each_of(AudioKind::Sound, |object, backend| object.rewind(backend));
    }

    pub fn pause_all_music(&mut self) {
        self.for_each_of(AudioKind::Music, |object, backend| object.pause(backend));
    }

    pub fn resume_all_music(&mut self) {
        self.for_each_of(AudioKind::Music, |object, backend| object.resume(backend));
    }

    pub fn stop_all_music(&mut self) {
        self.for_each_of(AudioKind::Music, |object, backend| object.stop(backend));
    }

    pub fn rewind_all_music(&mut self) {
        self.for_each_of(AudioKind::Music, |object, backend| object.rewind(backend));
    }

    pub fn listener_position(&self) -> [f32; 3] {
        self.listener.position
    }

    pub fn listener_velocity(&self) -> [f32; 3] {
        self.listener.velocity
    }

    /// The listener's "at" vector followed by its "up" vector.
    pub fn listener_orientation(&self) -> [f32; 6] {
        self.listener.orientation
    }

    pub fn set_listener_position(&mut self, position: [f32; 3]) {
        self.listener.position = position;
        self.backend.set_listener_position(position);
        check(&mut self.backend, "setting listener position");
    }

    pub fn set_listener_velocity(&mut self, velocity: [f32; 3]) {
        self.listener.velocity = velocity;
        self.backend.set_listener_velocity(velocity);
        check(&mut self.backend, "setting listener velocity");
    }

    pub fn set_listener_orientation(&mut self, orientation: [f32; 6]) {
        self.listener.orientation = orientation;
        self.backend.set_listener_orientation(orientation);
        check(&mut self.backend, "setting listener orientation");
    }

    /// Plays a sound file without keeping a handle to it.
    ///
    /// Recently played files stay loaded, so repeating a sound restarts it instead of decoding it again.
    /// When the cache is full the least recently used sound that isn't playing is unloaded to make room.
    /// If every cached sound is still playing the request is dropped. Returns whether the sound started.
    pub fn play_sound(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();

        if let Some(index) = self.one_shots.iter().position(|(cached, _)| cached == path) {
            let Some(entry) = self.one_shots.remove(index) else { return false };
            let id = entry.1;
            self.one_shots.push_back(entry);
            let Some(mut sound) = self.audio(id) else { return false };
            sound.stop();
            sound.play();
            return sound.state() == PlayState::Playing;
        }

        if self.one_shots.len() >= self.config.one_shot_cache_size.max(1) {
            let idle = self.one_shots.iter().position(|(_, id)| self.state_of(*id) != Some(PlayState::Playing));
            let Some((evicted, id)) = idle.and_then(|index| self.one_shots.remove(index)) else {
                log::warn!("every cached sound is still playing, dropping {}", path.display());
                return false;
            };
            log::debug!("evicting {} from the sound cache", evicted.display());
            self.free(id);
        }

        let id = match self.load_sound_file(path, LoadMode::Static) {
            Ok(id) => id,
            Err(err) => {
                log::warn!("couldn't play {}: {}", path.display(), err);
                return false;
            }
        };
        self.one_shots.push_back((path.to_path_buf(), id));

        let Some(mut sound) = self.audio(id) else { return false };
        sound.play();
        sound.state() == PlayState::Playing
    }

    /// How many sources the pool holds.
    pub fn source_capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// How many sources are free for new objects.
    pub fn available_sources(&self) -> usize {
        self.pool.available()
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn category_volume(&self, kind: AudioKind) -> f32 {
        match kind {
            AudioKind::Sound => self.sound_volume,
            AudioKind::Music => self.music_volume,
        }
    }

    fn state_of(&self, id: AudioId) -> Option<PlayState> {
        self.objects.iter().find(|o| o.id() == id).map(AudioObject::state)
    }

    fn for_each_of(&mut self, kind: AudioKind, mut f: impl FnMut(&mut AudioObject, &mut B)) {
        for object in self.objects.iter_mut().filter(|o| o.kind() == kind) {
            f(object, &mut self.backend);
        }
    }
}

impl<B: Backend> Drop for AudioEngine<B> {
    fn drop(&mut self) {
        for mut object in self.objects.drain(..) {
            release_object(&mut self.backend, &mut self.pool, &mut object);
        }
        self.one_shots.clear();
        self.pool.destroy(&mut self.backend);
        log::info!("audio engine shut down");
    }
}

fn release_object<B: Backend>(backend: &mut B, pool: &mut SourcePool, object: &mut AudioObject) {
    if let Some(source) = object.take_source() {
        pool.release(backend, source);
    }
    object.unload(backend);
}

fn open_decoder(path: &Path, mode: LoadMode) -> Result<Box<dyn Decoder + Send>, Error> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();
    if extension != "wav" {
        return Err(Error::UnsupportedFormat(path.display().to_string()));
    }

    let decoder = match mode {
        LoadMode::StreamFromFile => {
            Box::new(WavDecoder::new(BufReader::new(File::open(path)?))?) as Box<dyn Decoder + Send>
        }
        LoadMode::Static | LoadMode::StreamFromMemory => {
            Box::new(WavDecoder::new(Cursor::new(std::fs::read(path)?))?) as Box<dyn Decoder + Send>
        }
    };
    Ok(decoder)
}

/// A loaded object together with the backend it plays on.
pub struct AudioRef<'a, B: Backend> {
    object: &'a mut AudioObject,
    backend: &'a mut B,
}

impl<B: Backend> Deref for AudioRef<'_, B> {
    type Target = AudioObject;

    fn deref(&self) -> &AudioObject {
        &*self.object
    }
}

impl<B: Backend> AudioRef<'_, B> {
    /// Starts or resumes playback. Does nothing if already playing.
    pub fn play(&mut self) {
        self.object.play(self.backend);
    }

    /// Stops and returns to the last seek position.
    pub fn stop(&mut self) {
        self.object.stop(self.backend);
    }

    pub fn pause(&mut self) {
        self.object.pause(self.backend);
    }

    pub fn resume(&mut self) {
        self.object.resume(self.backend);
    }

    /// Returns to the last seek position without changing whether it plays.
    pub fn rewind(&mut self) {
        self.object.rewind(self.backend);
    }

    /// Moves playback to `sample`. Out of range positions are ignored.
    pub fn seek_sample(&mut self, sample: usize) {
        self.object.seek_sample(self.backend, sample);
    }

    pub fn seek_second(&mut self, second: f32) {
        self.object.seek_second(self.backend, second);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.object.set_looping(self.backend, looping);
    }

    pub fn set_loop_start(&mut self, sample: usize) {
        self.object.set_loop_start(sample);
    }

    pub fn set_loop_end(&mut self, sample: usize) {
        self.object.set_loop_end(sample);
    }

    /// Clamped to `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) {
        self.object.set_volume(self.backend, volume);
    }

    pub fn set_position(&mut self, position: [f32; 3]) {
        self.object.set_position(self.backend, position);
    }

    pub fn set_velocity(&mut self, velocity: [f32; 3]) {
        self.object.set_velocity(self.backend, velocity);
    }

    pub fn set_direction(&mut self, direction: [f32; 3]) {
        self.object.set_direction(self.backend, direction);
    }

    pub fn fade_in(&mut self, duration: Duration) {
        self.object.fade_in(self.backend, duration);
    }

    pub fn fade_out(&mut self, duration: Duration) {
        self.object.fade_out(self.backend, duration);
    }

    /// The source this object plays on, if it got one.
    pub fn playback_source(&self) -> Option<SourceId> {
        self.object.source()
    }
}
