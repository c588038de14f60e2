// rust/ckpt-client/src/handle.rs

//! Reference-counted handle registries.
//!
//! Every client-visible object (library, checkpoint, iteration cursor) is an
//! instance block stored in a [`HandleTable`] and named by an opaque
//! [`Handle`]. The table keeps the get/put discipline of the service's C
//! library, mapped onto an arena of generation-checked slots:
//!
//! - `create` stores the instance with refcount 1 (the table's own reference)
//! - `get` validates the handle and bumps the refcount; the returned
//!   [`HandleRef`] is the matching `put`, released on drop
//! - `destroy` makes the handle unusable for new lookups immediately and
//!   drops the table's reference; storage is reclaimed (and the instance's
//!   destructor runs) when the last `HandleRef` goes away
//!
//! A reclaimed slot is reused under a new generation, so a stale handle can
//! never resolve to a later instance.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{CkptError, Result};

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// Nothing in this crate leaves guarded state half-updated across a panic
/// point, so the data is still consistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opaque handle token: slot index in the low half, generation in the high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Never issued by any table.
    pub const INVALID: Self = Self(u64::MAX);

    const fn from_parts(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    const fn index(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }

    const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Handle);

        impl $name {
            /// Sentinel that never names a live instance.
            pub const INVALID: Self = Self(Handle::INVALID);

            pub const fn from_raw(raw: u64) -> Self {
                Self(Handle::from_u64(raw))
            }

            pub const fn as_raw(self) -> u64 {
                self.0.as_u64()
            }

            pub const fn is_invalid(self) -> bool {
                self.0.as_u64() == Handle::INVALID.as_u64()
            }
        }

        impl From<Handle> for $name {
            fn from(handle: Handle) -> Self {
                Self(handle)
            }
        }

        impl From<$name> for Handle {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.as_raw())
            }
        }
    };
}

typed_handle!(
    /// Handle to a library instance, returned by `initialize`.
    LibraryHandle
);
typed_handle!(
    /// Handle to an open checkpoint.
    CheckpointHandle
);
typed_handle!(
    /// Handle to a section iteration cursor.
    IterationHandle
);

struct Entry<T> {
    instance: Arc<T>,
    refcount: u32,
    destroyed: bool,
}

struct Slot<T> {
    generation: u32,
    entry: Option<Entry<T>>,
}

struct Slots<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Slots<T> {
    fn entry_mut(&mut self, handle: Handle) -> Option<&mut Entry<T>> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Drops one reference. Returns the instance if this released storage.
    fn release(&mut self, handle: Handle) -> Option<Arc<T>> {
        let entry = self.entry_mut(handle)?;
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount > 0 || !entry.destroyed {
            return None;
        }

        let slot = &mut self.slots[handle.index()];
        let entry = slot.entry.take()?;
        slot.generation = match slot.generation.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        self.free.push(handle.index() as u32);
        Some(entry.instance)
    }
}

/// One handle namespace.
///
/// Cloning a table yields another view of the same registry.
pub struct HandleTable<T> {
    namespace: &'static str,
    limit: usize,
    inner: Arc<Mutex<Slots<T>>>,
}

impl<T> Clone for HandleTable<T> {
    fn clone(&self) -> Self {
        Self {
            namespace: self.namespace,
            limit: self.limit,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for HandleTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("namespace", &self.namespace)
            .field("len", &self.len())
            .finish()
    }
}

impl<T> HandleTable<T> {
    pub fn new(namespace: &'static str) -> Self {
        Self::with_limit(namespace, u32::MAX as usize)
    }

    /// Creates a table that refuses to hold more than `limit` instances.
    pub fn with_limit(namespace: &'static str, limit: usize) -> Self {
        Self {
            namespace,
            limit: limit.min(u32::MAX as usize),
            inner: Arc::new(Mutex::new(Slots {
                slots: Vec::new(),
                free: Vec::new(),
            })),
        }
    }

    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Stores `instance` under a fresh handle with refcount 1.
    pub fn create(&self, instance: T) -> Result<Handle> {
        let mut slots = lock(&self.inner);

        let index = match slots.free.pop() {
            Some(index) => index,
            None => {
                if slots.slots.len() >= self.limit {
                    return Err(CkptError::no_memory(format!(
                        "{} handle table is full",
                        self.namespace
                    )));
                }
                slots.slots.push(Slot {
                    generation: 1,
                    entry: None,
                });
                (slots.slots.len() - 1) as u32
            }
        };

        let slot = &mut slots.slots[index as usize];
        slot.entry = Some(Entry {
            instance: Arc::new(instance),
            refcount: 1,
            destroyed: false,
        });
        Ok(Handle::from_parts(index, slot.generation))
    }

    /// Resolves `handle`, holding a reference until the guard drops.
    pub fn get(&self, handle: impl Into<Handle>) -> Result<HandleRef<T>> {
        let handle = handle.into();
        let mut slots = lock(&self.inner);

        let entry = slots
            .entry_mut(handle)
            .filter(|entry| !entry.destroyed)
            .ok_or_else(|| CkptError::bad_handle(self.namespace, handle.as_u64()))?;
        entry.refcount += 1;

        Ok(HandleRef {
            table: Arc::clone(&self.inner),
            handle,
            instance: Arc::clone(&entry.instance),
        })
    }

    /// Marks `handle` destroyed. Storage outlives any outstanding guards.
    pub fn destroy(&self, handle: impl Into<Handle>) -> Result<()> {
        let handle = handle.into();
        let reclaimed = {
            let mut slots = lock(&self.inner);
            let entry = slots
                .entry_mut(handle)
                .filter(|entry| !entry.destroyed)
                .ok_or_else(|| CkptError::bad_handle(self.namespace, handle.as_u64()))?;
            entry.destroyed = true;
            slots.release(handle)
        };
        // Instance destructor runs outside the table lock.
        drop(reclaimed);
        Ok(())
    }

    /// True if `handle` resolves for new lookups.
    pub fn is_live(&self, handle: impl Into<Handle>) -> bool {
        let handle = handle.into();
        lock(&self.inner)
            .entry_mut(handle)
            .is_some_and(|entry| !entry.destroyed)
    }

    /// Current reference count of a not-yet-reclaimed instance.
    pub fn refcount(&self, handle: impl Into<Handle>) -> Option<u32> {
        let handle = handle.into();
        lock(&self.inner)
            .entry_mut(handle)
            .map(|entry| entry.refcount)
    }

    /// Number of instances whose storage has not been reclaimed.
    pub fn len(&self) -> usize {
        let slots = lock(&self.inner);
        slots.slots.len() - slots.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A counted reference to a live instance; dropping it is the `put`.
pub struct HandleRef<T> {
    table: Arc<Mutex<Slots<T>>>,
    handle: Handle,
    instance: Arc<T>,
}

impl<T> HandleRef<T> {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Releases the reference now.
    pub fn put(self) {}
}

impl<T> Deref for HandleRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T> Drop for HandleRef<T> {
    fn drop(&mut self) {
        let reclaimed = lock(&self.table).release(self.handle);
        drop(reclaimed);
    }
}

impl<T: fmt::Debug> fmt::Debug for HandleRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRef")
            .field("handle", &self.handle)
            .field("instance", &self.instance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    /// Counts destructor runs.
    struct Tracked {
        value: u32,
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked(value: u32, drops: &Arc<AtomicUsize>) -> Tracked {
        Tracked {
            value,
            drops: Arc::clone(drops),
        }
    }

    #[test]
    fn test_create_get_put() {
        let table = HandleTable::new("test");
        let drops = Arc::new(AtomicUsize::new(0));

        let handle = table.create(tracked(7, &drops)).unwrap();
        assert_eq!(table.refcount(handle), Some(1));

        let guard = table.get(handle).unwrap();
        assert_eq!(guard.value, 7);
        assert_eq!(guard.handle(), handle);
        assert_eq!(table.refcount(handle), Some(2));

        guard.put();
        assert_eq!(table.refcount(handle), Some(1));
        assert_eq!(drops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_destroy_without_holders_reclaims() {
        let table = HandleTable::new("test");
        let drops = Arc::new(AtomicUsize::new(0));

        let handle = table.create(tracked(1, &drops)).unwrap();
        table.destroy(handle).unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
        assert!(table.refcount(handle).is_none());
    }

    #[test]
    fn test_no_destructor_while_referenced() {
        let table = HandleTable::new("test");
        let drops = Arc::new(AtomicUsize::new(0));

        let handle = table.create(tracked(1, &drops)).unwrap();
        let first = table.get(handle).unwrap();
        let second = table.get(handle).unwrap();

        table.destroy(handle).unwrap();
        assert!(!table.is_live(handle));
        assert_eq!(table.refcount(handle), Some(2));
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(first);
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        // Still usable through the remaining guard
        assert_eq!(second.value, 1);

        drop(second);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_destroyed_handle_is_never_returned() {
        let table = HandleTable::new("test");
        let handle = table.create(1u32).unwrap();
        let guard = table.get(handle).unwrap();

        table.destroy(handle).unwrap();

        // Marked destroyed: new lookups fail even though storage is alive
        let err = table.get(handle).unwrap_err();
        assert!(matches!(err, CkptError::BadHandle { namespace: "test", .. }));

        drop(guard);
        assert!(table.get(handle).is_err());
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let table = HandleTable::new("test");
        let old = table.create(1u32).unwrap();
        table.destroy(old).unwrap();

        let new = table.create(2u32).unwrap();
        assert_ne!(old, new);
        assert!(table.get(old).is_err());
        assert_eq!(*table.get(new).unwrap(), 2);
    }

    #[test]
    fn test_double_destroy_is_bad_handle() {
        let table = HandleTable::new("test");
        let handle = table.create(1u32).unwrap();

        table.destroy(handle).unwrap();
        assert!(matches!(
            table.destroy(handle),
            Err(CkptError::BadHandle { .. })
        ));
    }

    #[test]
    fn test_invalid_handle() {
        let table: HandleTable<u32> = HandleTable::new("test");
        assert!(table.get(Handle::INVALID).is_err());
        assert!(table.destroy(Handle::INVALID).is_err());
    }

    #[test]
    fn test_limit_reports_no_memory() {
        let table = HandleTable::with_limit("test", 2);
        let a = table.create(1u32).unwrap();
        table.create(2u32).unwrap();

        let err = table.create(3u32).unwrap_err();
        assert!(matches!(err, CkptError::NoMemory { .. }));

        // A reclaimed slot makes room again
        table.destroy(a).unwrap();
        assert!(table.create(3u32).is_ok());
    }

    #[test]
    fn test_typed_handles() {
        let raw = Handle::from_parts(3, 9);
        let checkpoint = CheckpointHandle::from(raw);
        assert_eq!(Handle::from(checkpoint), raw);
        assert_eq!(CheckpointHandle::from_raw(checkpoint.as_raw()), checkpoint);
        assert!(!checkpoint.is_invalid());
        assert!(CheckpointHandle::INVALID.is_invalid());
        assert_eq!(LibraryHandle::from_raw(0x10).to_string(), "0x10");
    }

    #[test]
    fn test_concurrent_get_and_destroy() {
        let table = HandleTable::new("test");
        let drops = Arc::new(AtomicUsize::new(0));
        let handle = table.create(tracked(5, &drops)).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        match table.get(handle) {
                            Ok(guard) => assert_eq!(guard.value, 5),
                            Err(_) => break,
                        }
                    }
                })
            })
            .collect();

        table.destroy(handle).unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }
}
