//! Identifier allocation.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use astron_net::{Channel, DoId};

/// Hands out timestamp-derived identifiers that never repeat within the process.
///
/// Each value is the current Unix time in milliseconds, bumped past the last
/// value handed out when two requests land in the same millisecond.
#[derive(Debug, Default)]
pub struct UniqueIdAllocator {
    last: AtomicU64,
}

impl UniqueIdAllocator {
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self
                .last
                .compare_exchange_weak(last, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(seen) => last = seen,
            }
        }
    }

    pub fn allocate_channel(&self) -> Channel {
        self.next()
    }

    /// Object ids are the same timestamp reduced to 32 bits.
    pub fn allocate_do_id(&self) -> DoId {
        self.next() as DoId
    }
}

/// Process-wide allocator shared by every repository.
pub(crate) static IDS: UniqueIdAllocator = UniqueIdAllocator::new();

/// Sequential request contexts, starting at 1.
#[derive(Debug)]
pub struct ContextGenerator {
    next: AtomicU32,
}

impl ContextGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    pub fn next_context(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for ContextGenerator {
    fn default() -> Self {
        Self::new()
    }
}
