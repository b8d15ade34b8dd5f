use crate::backend::{check, Backend, BackendError, SourceId};
use crate::AudioId;

/// The fixed set of playback sources shared by every audio object.
///
/// A source belongs to at most one object at a time. There is no preemption: when every source is taken,
/// acquisition fails until one is released.
pub struct SourcePool {
    slots: Vec<Slot>,
}

struct Slot {
    source: SourceId,
    owner: Option<AudioId>,
}

impl SourcePool {
    /// Creates up to `capacity` sources, stopping at the first one the backend refuses.
    pub fn new<B: Backend + ?Sized>(backend: &mut B, capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        while slots.len() < capacity {
            let source = backend.create_source();
            match backend.take_error() {
                // Running out of sources here is how the device tells us its limit
                None | Some(BackendError::OutOfMemory) => {}
                Some(err) => log::debug!("creating source {}: {}", slots.len(), err),
            }
            match source {
                Some(source) => slots.push(Slot { source, owner: None }),
                None => break,
            }
        }
        if slots.len() < capacity {
            log::info!("audio device granted {} of {} requested sources", slots.len(), capacity);
        }
        Self { slots }
    }

    /// Hands the first free source to `owner`.
    pub fn acquire(&mut self, owner: AudioId) -> Option<SourceId> {
        let slot = self.slots.iter_mut().find(|slot| slot.owner.is_none())?;
        slot.owner = Some(owner);
        Some(slot.source)
    }

    /// Resets `source` to its defaults and returns it to the pool. Releasing a free source is harmless.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B, source: SourceId) {
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.source == source) else {
            log::warn!("tried to release {:?}, which isn't part of the pool", source);
            return;
        };

        backend.stop(source);
        backend.set_buffer(source, None);
        backend.set_looping(source, false);
        backend.set_gain(source, 1.0);
        backend.set_sample_offset(source, 0);
        check(backend, "resetting a released source");

        slot.owner = None;
    }

    pub fn owner(&self, source: SourceId) -> Option<AudioId> {
        self.slots.iter().find(|slot| slot.source == source).and_then(|slot| slot.owner)
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available(&self) -> usize {
        self.slots.iter().filter(|slot| slot.owner.is_none()).count()
    }

    /// Destroys every source. Owners must have released theirs first.
    pub fn destroy<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for slot in self.slots.drain(..) {
            if let Some(owner) = slot.owner {
                log::warn!("destroying {:?} while still owned by {:?}", slot.source, owner);
                backend.stop(slot.source);
                backend.set_buffer(slot.source, None);
            }
            backend.destroy_source(slot.source);
        }
        check(backend, "destroying sources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PcmFormat, SourceState};
    use crate::Mixer;

    #[test]
    fn pool_shrinks_to_what_the_device_grants() {
        let mut mixer = Mixer::new(2, 44100).with_source_limit(5);
        let pool = SourcePool::new(&mut mixer, 64);
        assert_eq!(pool.capacity(), 5);
        assert_eq!(pool.available(), 5);
        assert_eq!(mixer.take_error(), None);
    }

    #[test]
    fn stale_errors_do_not_shrink_the_pool() {
        let mut mixer = Mixer::new(2, 44100);
        mixer.play(SourceId(9));
        let pool = SourcePool::new(&mut mixer, 3);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(mixer.take_error(), None);
    }

    #[test]
    fn sources_are_exclusive_and_reset_on_release() {
        let mut mixer = Mixer::new(2, 44100);
        let mut pool = SourcePool::new(&mut mixer, 3);

        let sources: Vec<SourceId> = (0..3).map(|i| pool.acquire(AudioId(i)).unwrap()).collect();
        assert_eq!(pool.acquire(AudioId(3)), None);
        assert_eq!(pool.available(), 0);
        assert_eq!(pool.owner(sources[1]), Some(AudioId(1)));

        // Dirty the source the way a playing looping sound would
        let buffer = mixer.create_buffer().unwrap();
        mixer.fill_buffer(buffer, PcmFormat { channels: 1, sample_rate: 44100 }, &[0.5; 100]);
        mixer.set_buffer(sources[1], Some(buffer));
        mixer.set_looping(sources[1], true);
        mixer.set_gain(sources[1], 0.25);
        mixer.play(sources[1]);
        mixer.set_sample_offset(sources[1], 40);

        pool.release(&mut mixer, sources[1]);
        assert_eq!(pool.owner(sources[1]), None);

        let reacquired = pool.acquire(AudioId(3)).unwrap();
        assert_eq!(reacquired, sources[1]);
        assert_eq!(mixer.source_state(reacquired), SourceState::Stopped);
        assert!(!mixer.is_looping(reacquired));
        assert_eq!(mixer.gain(reacquired), 1.0);
        assert_eq!(mixer.sample_offset(reacquired), 0);
        assert_eq!(mixer.buffers_queued(reacquired), 0);
        assert_eq!(mixer.take_error(), None);
    }

    #[test]
    fn double_release_is_harmless() {
        let mut mixer = Mixer::new(2, 44100);
        let mut pool = SourcePool::new(&mut mixer, 1);
        let source = pool.acquire(AudioId(0)).unwrap();
        pool.release(&mut mixer, source);
        pool.release(&mut mixer, source);
        pool.release(&mut mixer, SourceId(99));
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn destroy_frees_every_source() {
        let mut mixer = Mixer::new(2, 44100).with_source_limit(2);
        let mut pool = SourcePool::new(&mut mixer, 2);
        pool.destroy(&mut mixer);
        assert_eq!(pool.capacity(), 0);
        assert!(mixer.create_source().is_some());
        assert!(mixer.create_source().is_some());
    }
}
