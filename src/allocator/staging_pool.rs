//! Pool of host-visible staging buffers for uploads.
//!
//! Uploads write into a staging buffer and record a copy from it. The staging buffer may only be reused or destroyed
//! after the copy has executed, which the pool determines from a [`SubmissionTimeline`]:
//!
//! * [`StagingPool::set_unused()`] records the serial of the last submission on the timeline. The buffer is only handed out
//!   again once that serial has retired.
//! * [`StagingPool::remove_unused()`] destroys unused buffers once the retired serial has moved more than
//!   `delete_delay` submissions past that point, so buffers that are reused every frame are never recreated.
//!
//! Allocations consumed by a submission on another queue are returned with [`StagingPool::set_unused_after()`], which
//! additionally holds the buffer until that queue's serial has retired.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::allocator::provider::{BufferProvider, DeviceBufferProvider, HostBuffer};
use crate::sync::timeline::SubmissionTimeline;
use crate::{BufferRange, Error, Queue};

/// Configuration of a [`StagingPool`].
#[derive(Debug, Copy, Clone)]
pub struct StagingPoolSettings {
    /// Number of submissions an unused buffer survives after its last use.
    pub delete_delay: u64,
    /// A free buffer is reused for a request of `size` bytes if its capacity is at most `size * oversize_multiplier`.
    pub oversize_multiplier: u64,
}

impl Default for StagingPoolSettings {
    fn default() -> Self {
        Self {
            delete_delay: 5,
            oversize_multiplier: 4,
        }
    }
}

struct Entry<B> {
    id: u64,
    buffer: B,
    used: bool,
    // Serial that must retire before the buffer can be handed out again.
    retire_serial: u64,
    // The buffer is destroyed once the retired serial exceeds this.
    delay_serial: u64,
    // Submission on a foreign timeline that reads from the buffer.
    consumer: Option<(Arc<dyn SubmissionTimeline>, u64)>,
}

impl<B> Entry<B> {
    fn consumer_retired(&self) -> Result<bool> {
        match &self.consumer {
            Some((timeline, serial)) => timeline.is_retired(*serial),
            None => Ok(true),
        }
    }
}

/// A staging buffer handed out by a [`StagingPool`]. Give it back with [`StagingPool::set_unused()`] after submitting the
/// work that reads from it.
#[derive(Debug)]
pub struct StagingAllocation {
    id: u64,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    capacity: vk::DeviceSize,
    pointer: Option<NonNull<c_void>>,
}

// SAFETY: The pointer refers to mapped device memory owned by the pool.
unsafe impl Send for StagingAllocation {}
unsafe impl Sync for StagingAllocation {}

impl StagingAllocation {
    /// Mapped memory of the requested size.
    /// # Errors
    /// Fails if the buffer is not host visible.
    pub fn mapped_slice(&mut self) -> Result<&mut [u8]> {
        match self.pointer {
            Some(pointer) => Ok(unsafe { std::slice::from_raw_parts_mut(pointer.cast::<u8>().as_ptr(), self.size as usize) }),
            None => Err(Error::UnmappableBuffer.into()),
        }
    }

    /// Requested size.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Size of the underlying buffer. This can be larger than the requested size when a buffer is reused.
    pub fn capacity(&self) -> vk::DeviceSize {
        self.capacity
    }
}

impl BufferRange for StagingAllocation {
    fn buffer_handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn offset(&self) -> vk::DeviceSize {
        0
    }

    fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

struct StagingInner<P: BufferProvider> {
    provider: P,
    entries: Vec<Entry<P::Buffer>>,
    next_id: u64,
}

/// Size-bucketed pool of staging buffers. See the [module level documentation](self).
/// Cloning gives another handle to the same pool.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct StagingPool<P: BufferProvider = DeviceBufferProvider, T: SubmissionTimeline = Arc<Queue>> {
    #[derivative(Debug = "ignore")]
    inner: Arc<Mutex<StagingInner<P>>>,
    #[derivative(Debug = "ignore")]
    timeline: T,
    settings: StagingPoolSettings,
}

impl<P: BufferProvider, T: SubmissionTimeline + Clone> Clone for StagingPool<P, T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            timeline: self.timeline.clone(),
            settings: self.settings,
        }
    }
}

impl<P: BufferProvider, T: SubmissionTimeline> StagingPool<P, T> {
    pub fn new(provider: P, timeline: T, settings: StagingPoolSettings) -> Self {
        assert!(settings.oversize_multiplier > 0, "staging pool oversize multiplier must be at least 1");
        Self {
            inner: Arc::new(Mutex::new(StagingInner {
                provider,
                entries: vec![],
                next_id: 0,
            })),
            timeline,
            settings,
        }
    }

    /// Get a staging buffer of at least `size` bytes. Reuses the smallest unused buffer whose capacity lies in
    /// `[size, size * oversize_multiplier]` and whose last use has retired, or creates a new buffer of exactly `size` bytes.
    /// # Errors
    /// * Fails if creating a buffer fails.
    /// * Fails if the timeline cannot be queried.
    /// # Panics
    /// Panics if `size` is zero.
    pub fn allocate(&self, size: vk::DeviceSize) -> Result<StagingAllocation> {
        assert!(size > 0, "cannot allocate an empty staging buffer");
        let retired = self.timeline.last_retired()?;
        let max_capacity = size.saturating_mul(self.settings.oversize_multiplier);
        let mut inner = self.inner.lock().map_err(|_| Error::PoisonError)?;

        let mut reuse: Option<usize> = None;
        for (index, entry) in inner.entries.iter().enumerate() {
            let capacity = entry.buffer.size();
            if entry.used || capacity < size || capacity > max_capacity || retired < entry.retire_serial {
                continue;
            }
            if reuse.map_or(false, |best| inner.entries[best].buffer.size() <= capacity) {
                continue;
            }
            if entry.consumer_retired()? {
                reuse = Some(index);
            }
        }

        let index = match reuse {
            Some(index) => index,
            None => {
                let buffer = inner.provider.create_buffer(size)?;
                let id = inner.next_id;
                inner.next_id += 1;
                debug!("Staging pool: created buffer {id} of {size} bytes");
                inner.entries.push(Entry {
                    id,
                    buffer,
                    used: false,
                    retire_serial: 0,
                    delay_serial: 0,
                    consumer: None,
                });
                inner.entries.len() - 1
            }
        };

        let entry = &mut inner.entries[index];
        entry.used = true;
        Ok(StagingAllocation {
            id: entry.id,
            buffer: entry.buffer.handle(),
            size,
            capacity: entry.buffer.size(),
            pointer: entry.buffer.mapped_ptr(),
        })
    }

    /// Allocate a staging buffer, pass it to `f` and return it to the pool afterwards, also when `f` fails.
    /// `f` must submit the work that reads from the buffer before returning.
    /// # Errors
    /// * Fails if allocating the buffer fails.
    /// * Fails with the error of `f`.
    pub fn with_allocation<R>(
        &self,
        size: vk::DeviceSize,
        f: impl FnOnce(&mut StagingAllocation) -> Result<R>,
    ) -> Result<R> {
        let mut allocation = self.allocate(size)?;
        let result = f(&mut allocation);
        self.set_unused(allocation)?;
        result
    }

    /// Return a staging buffer to the pool. Must be called after the submission that reads from it was submitted.
    /// # Panics
    /// Panics if the allocation does not belong to this pool or was already returned.
    pub fn set_unused(&self, allocation: StagingAllocation) -> Result<()> {
        self.release(allocation, None)
    }

    /// Return a staging buffer that is read by submission `serial` on `timeline`, usually a queue other than the one
    /// the pool tracks. The buffer is neither reused nor destroyed before that submission retired.
    /// # Panics
    /// Panics if the allocation does not belong to this pool or was already returned.
    pub fn set_unused_after(
        &self,
        allocation: StagingAllocation,
        timeline: Arc<dyn SubmissionTimeline>,
        serial: u64,
    ) -> Result<()> {
        self.release(allocation, Some((timeline, serial)))
    }

    fn release(&self, allocation: StagingAllocation, consumer: Option<(Arc<dyn SubmissionTimeline>, u64)>) -> Result<()> {
        let serial = self.timeline.last_submitted();
        let mut inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        let entry = match inner.entries.iter_mut().find(|entry| entry.id == allocation.id) {
            Some(entry) => entry,
            None => panic!("staging pool: unknown allocation {}", allocation.id),
        };
        assert!(entry.used, "staging pool: allocation {} returned twice", allocation.id);
        entry.used = false;
        entry.retire_serial = serial;
        entry.delay_serial = serial + self.settings.delete_delay;
        entry.consumer = consumer;
        Ok(())
    }

    /// Destroy every unused buffer whose delete delay has passed. Returns the number of destroyed buffers.
    pub fn remove_unused(&self) -> Result<usize> {
        let retired = self.timeline.last_retired()?;
        let mut inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        let mut keep = Vec::with_capacity(inner.entries.len());
        for entry in &inner.entries {
            keep.push(entry.used || retired <= entry.delay_serial || !entry.consumer_retired()?);
        }
        let before = inner.entries.len();
        let mut flags = keep.into_iter();
        inner.entries.retain(|entry| {
            let keep = flags.next().unwrap_or(true);
            if !keep {
                debug!("Staging pool: destroying buffer {} ({} bytes)", entry.id, entry.buffer.size());
            }
            keep
        });
        Ok(before - inner.entries.len())
    }

    /// Number of buffers in the pool, used or not.
    pub fn len(&self) -> Result<usize> {
        let inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        Ok(inner.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Number of buffers currently handed out.
    pub fn used_count(&self) -> Result<usize> {
        let inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        Ok(inner.entries.iter().filter(|entry| entry.used).count())
    }

    /// Total size of every buffer in the pool.
    pub fn total_capacity(&self) -> Result<vk::DeviceSize> {
        let inner = self.inner.lock().map_err(|_| Error::PoisonError)?;
        Ok(inner.entries.iter().map(|entry| entry.buffer.size()).sum())
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }
}
