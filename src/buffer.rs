use crate::backend::{check, Backend, BufferId};

/// The two buffers a stream alternates between: one plays while the other is refilled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPair {
    buffers: [BufferId; 2],
}

impl BufferPair {
    /// Allocates both buffers, or neither.
    pub fn create<B: Backend + ?Sized>(backend: &mut B) -> Option<Self> {
        let first = create_buffer(backend)?;
        match create_buffer(backend) {
            Some(second) => Some(Self { buffers: [first, second] }),
            None => {
                backend.destroy_buffer(first);
                check(backend, "destroying a half-allocated buffer pair");
                None
            }
        }
    }

    pub fn ids(&self) -> [BufferId; 2] {
        self.buffers
    }

    pub fn is_valid<B: Backend + ?Sized>(&self, backend: &B) -> bool {
        self.buffers.iter().all(|b| backend.is_buffer(*b))
    }

    /// Frees both buffers. They must not be queued on any source.
    pub fn destroy<B: Backend + ?Sized>(self, backend: &mut B) {
        for buffer in self.buffers {
            backend.destroy_buffer(buffer);
        }
        check(backend, "destroying stream buffers");
    }
}

/// Allocates one buffer, logging any failure.
pub fn create_buffer<B: Backend + ?Sized>(backend: &mut B) -> Option<BufferId> {
    let buffer = backend.create_buffer();
    if !check(backend, "creating a buffer") {
        return None;
    }
    buffer
}
