//! The hardware playback interface.
//!
//! Modelled on the buffer/source split of native audio APIs: buffers hold PCM data, sources play
//! buffers, either one attached buffer (static audio) or a queue of buffers (streamed audio).
//! Calls don't return errors; a failed call records one that [`Backend::take_error`] reports.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Handle to a backend buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle to a backend playback source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Hardware play state of a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Layout of the interleaved `f32` data handed to [`Backend::fill_buffer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("invalid buffer or source handle")]
    InvalidName,

    #[error("invalid parameter value")]
    InvalidValue,

    #[error("operation not valid in the current state")]
    InvalidOperation,

    #[error("out of memory or out of sources")]
    OutOfMemory,
}

pub trait Backend {
    fn create_buffer(&mut self) -> Option<BufferId>;
    fn destroy_buffer(&mut self, buffer: BufferId);
    fn is_buffer(&self, buffer: BufferId) -> bool;
    /// Replaces the buffer contents. Fails while the buffer is queued on a playing source.
    fn fill_buffer(&mut self, buffer: BufferId, format: PcmFormat, samples: &[f32]);

    fn create_source(&mut self) -> Option<SourceId>;
    fn destroy_source(&mut self, source: SourceId);

    fn play(&mut self, source: SourceId);
    fn pause(&mut self, source: SourceId);
    /// Stops playback and marks every queued buffer as processed.
    fn stop(&mut self, source: SourceId);
    /// Returns the source to [`SourceState::Initial`] at the start of its queue.
    fn rewind(&mut self, source: SourceId);
    fn source_state(&self, source: SourceId) -> SourceState;

    /// Attaches a single buffer, replacing the queue. `None` detaches everything.
    fn set_buffer(&mut self, source: SourceId, buffer: Option<BufferId>);
    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]);
    /// Removes the oldest processed buffer from the queue.
    fn unqueue_buffer(&mut self, source: SourceId) -> Option<BufferId>;
    fn buffers_processed(&self, source: SourceId) -> usize;
    /// Number of buffers on the queue, processed or not.
    fn buffers_queued(&self, source: SourceId) -> usize;

    fn set_looping(&mut self, source: SourceId, looping: bool);
    fn is_looping(&self, source: SourceId) -> bool;
    fn set_gain(&mut self, source: SourceId, gain: f32);
    fn gain(&self, source: SourceId) -> f32;
    /// Moves playback to `offset` samples from the start of the queue.
    /// On a source that isn't playing or paused, the offset applies to the next play.
    fn set_sample_offset(&mut self, source: SourceId, offset: usize);
    fn sample_offset(&self, source: SourceId) -> usize;

    fn set_position(&mut self, source: SourceId, position: [f32; 3]);
    fn set_velocity(&mut self, source: SourceId, velocity: [f32; 3]);
    fn set_direction(&mut self, source: SourceId, direction: [f32; 3]);

    fn set_listener_gain(&mut self, gain: f32);
    fn set_listener_position(&mut self, position: [f32; 3]);
    fn set_listener_velocity(&mut self, velocity: [f32; 3]);
    /// `at` and `up` vectors, in that order.
    fn set_listener_orientation(&mut self, orientation: [f32; 6]);

    /// Returns and clears the error recorded by the last failing call.
    fn take_error(&mut self) -> Option<BackendError>;
}

/// Logs any pending backend error. Returns `true` if the preceding calls succeeded.
pub(crate) fn check<B: Backend + ?Sized>(backend: &mut B, context: &str) -> bool {
    match backend.take_error() {
        Some(err) => {
            log::error!("audio backend error while {}: {}", context, err);
            false
        }
        None => true,
    }
}

// Shared backends lock once per call, so the audio thread can render in between.
impl<B: Backend> Backend for Arc<Mutex<B>> {
    fn create_buffer(&mut self) -> Option<BufferId> {
        lock(self).create_buffer()
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        lock(self).destroy_buffer(buffer)
    }

    fn is_buffer(&self, buffer: BufferId) -> bool {
        lock(self).is_buffer(buffer)
    }

    fn fill_buffer(&mut self, buffer: BufferId, format: PcmFormat, samples: &[f32]) {
        lock(self).fill_buffer(buffer, format, samples)
    }

    fn create_source(&mut self) -> Option<SourceId> {
        lock(self).create_source()
    }

    fn destroy_source(&mut self, source: SourceId) {
        lock(self).destroy_source(source)
    }

    fn play(&mut self, source: SourceId) {
        lock(self).play(source)
    }

    fn pause(&mut self, source: SourceId) {
        lock(self).pause(source)
    }

    fn stop(&mut self, source: SourceId) {
        lock(self).stop(source)
    }

    fn rewind(&mut self, source: SourceId) {
        lock(self).rewind(source)
    }

    fn source_state(&self, source: SourceId) -> SourceState {
        lock(self).source_state(source)
    }

    fn set_buffer(&mut self, source: SourceId, buffer: Option<BufferId>) {
        lock(self).set_buffer(source, buffer)
    }

    fn queue_buffers(&mut self, source: SourceId, buffers: &[BufferId]) {
        lock(self).queue_buffers(source, buffers)
    }

    fn unqueue_buffer(&mut self, source: SourceId) -> Option<BufferId> {
        lock(self).unqueue_buffer(source)
    }

    fn buffers_processed(&self, source: SourceId) -> usize {
        lock(self).buffers_processed(source)
    }

    fn buffers_queued(&self, source: SourceId) -> usize {
        lock(self).buffers_queued(source)
    }

    fn set_looping(&mut self, source: SourceId, looping: bool) {
        lock(self).set_looping(source, looping)
    }

    fn is_looping(&self, source: SourceId) -> bool {
        lock(self).is_looping(source)
    }

    fn set_gain(&mut self, source: SourceId, gain: f32) {
        lock(self).set_gain(source, gain)
    }

    fn gain(&self, source: SourceId) -> f32 {
        lock(self).gain(source)
    }

    fn set_sample_offset(&mut self, source: SourceId, offset: usize) {
        lock(self).set_sample_offset(source, offset)
    }

    fn sample_offset(&self, source: SourceId) -> usize {
        lock(self).sample_offset(source)
    }

    fn set_position(&mut self, source: SourceId, position: [f32; 3]) {
        lock(self).set_position(source, position)
    }

    fn set_velocity(&mut self, source: SourceId, velocity: [f32; 3]) {
        lock(self).set_velocity(source, velocity)
    }

    fn set_direction(&mut self, source: SourceId, direction: [f32; 3]) {
        lock(self).set_direction(source, direction)
    }

    fn set_listener_gain(&mut self, gain: f32) {
        lock(self).set_listener_gain(gain)
    }

    fn set_listener_position(&mut self, position: [f32; 3]) {
        lock(self).set_listener_position(position)
    }

    fn set_listener_velocity(&mut self, velocity: [f32; 3]) {
        lock(self).set_listener_velocity(velocity)
    }

    fn set_listener_orientation(&mut self, orientation: [f32; 6]) {
        lock(self).set_listener_orientation(orientation)
    }

    fn take_error(&mut self) -> Option<BackendError> {
        lock(self).take_error()
    }
}

fn lock<B>(backend: &Arc<Mutex<B>>) -> MutexGuard<'_, B> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}
