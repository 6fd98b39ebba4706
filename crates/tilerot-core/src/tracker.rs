//! Resource tracking tables
//!
//! Every kernel object the shim causes to exist is recorded here so it can
//! be destroyed even when the application dies without cleaning up. Leaked
//! TILER space otherwise makes later allocations fail until reboot.
//!
//! Tables are fixed-capacity arenas of `Option` slots, sized once at
//! creation and never grown, so the cleanup path can walk and drain them
//! without allocating. A full table rejects the new entry with
//! [`TilerError::TableFull`]; callers log it and carry on untracked.

use std::os::unix::io::RawFd;

use crate::error::{Result, TilerError};

/// A kernel handle on a given channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedHandle {
    pub channel: RawFd,
    pub handle: u32,
}

impl TrackedHandle {
    pub const fn new(channel: RawFd, handle: u32) -> Self {
        Self { channel, handle }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: TrackedHandle,
    seq: u64,
}

/// Fixed-capacity table of `(channel, handle)` pairs
///
/// Insertion fills the first free slot. Each entry also carries an
/// insertion sequence number, so draining in insertion (or reverse
/// insertion) order works regardless of which slots were reused.
#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<Option<Slot>>,
    next_seq: u64,
    live: usize,
}

impl HandleTable {
    /// Create an empty table with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            next_seq: 0,
            live: 0,
        }
    }

    /// Track `entry` in the first free slot
    pub fn add(&mut self, entry: TrackedHandle) -> Result<()> {
        let capacity = self.slots.len();
        let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) else {
            return Err(TilerError::TableFull { capacity });
        };
        *slot = Some(Slot { entry, seq: self.next_seq });
        self.next_seq += 1;
        self.live += 1;
        Ok(())
    }

    /// Stop tracking the first entry equal to `entry`
    ///
    /// Returns the removed entry, or `None` if it was not tracked.
    pub fn remove(&mut self, entry: TrackedHandle) -> Option<TrackedHandle> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| matches!(s, Some(slot) if slot.entry == entry))?;
        self.live -= 1;
        slot.take().map(|s| s.entry)
    }

    /// Whether `entry` is tracked
    pub fn contains(&self, entry: TrackedHandle) -> bool {
        self.iter().any(|e| e == entry)
    }

    /// Remove and return the most recently inserted entry
    pub fn pop_newest(&mut self) -> Option<TrackedHandle> {
        self.pop_by(|a, b| a > b)
    }

    /// Remove and return the least recently inserted entry
    pub fn pop_oldest(&mut self) -> Option<TrackedHandle> {
        self.pop_by(|a, b| a < b)
    }

    fn pop_by(&mut self, better: impl Fn(u64, u64) -> bool) -> Option<TrackedHandle> {
        let mut pick: Option<(usize, u64)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(s) = slot {
                match pick {
                    Some((_, seq)) if !better(s.seq, seq) => {}
                    _ => pick = Some((idx, s.seq)),
                }
            }
        }
        let (idx, _) = pick?;
        self.live -= 1;
        self.slots[idx].take().map(|s| s.entry)
    }

    /// Drain entries newest first
    pub fn drain_newest_first(&mut self) -> impl Iterator<Item = TrackedHandle> + '_ {
        core::iter::from_fn(move || self.pop_newest())
    }

    /// Drain entries oldest first
    pub fn drain_oldest_first(&mut self) -> impl Iterator<Item = TrackedHandle> + '_ {
        core::iter::from_fn(move || self.pop_oldest())
    }

    /// Live entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = TrackedHandle> + '_ {
        self.slots.iter().filter_map(|s| s.map(|s| s.entry))
    }

    /// Number of live entries
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Maximum number of live entries
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Fixed-capacity set of exported descriptors
///
/// The same descriptor can be reported by several exports; it is tracked
/// once and closed once.
#[derive(Debug)]
pub struct DescriptorSet {
    slots: Vec<Option<RawFd>>,
}

impl DescriptorSet {
    pub fn new(capacity: usize) -> Self {
        Self { slots: vec![None; capacity] }
    }

    /// Track `fd` unless already present
    ///
    /// Returns `Ok(true)` when newly inserted, `Ok(false)` for a duplicate.
    pub fn add_if_absent(&mut self, fd: RawFd) -> Result<bool> {
        if self.contains(fd) {
            return Ok(false);
        }
        let capacity = self.slots.len();
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(TilerError::TableFull { capacity })?;
        *slot = Some(fd);
        Ok(true)
    }

    /// Stop tracking `fd`; no-op if absent
    pub fn remove(&mut self, fd: RawFd) -> bool {
        match self.slots.iter_mut().find(|s| **s == Some(fd)) {
            Some(slot) => {
                *slot = None;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.slots.iter().any(|s| *s == Some(fd))
    }

    /// Remove and return any tracked descriptor, lowest slot first
    pub fn pop(&mut self) -> Option<RawFd> {
        self.slots.iter_mut().find_map(|s| s.take())
    }

    /// Tracked descriptors in slot order
    pub fn iter(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.slots.iter().filter_map(|s| *s)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(handle: u32) -> TrackedHandle {
        TrackedHandle::new(3, handle)
    }

    #[test]
    fn test_add_remove() {
        let mut table = HandleTable::new(4);
        table.add(h(1)).unwrap();
        table.add(h(2)).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.contains(h(1)));

        assert_eq!(table.remove(h(1)), Some(h(1)));
        assert!(!table.contains(h(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut table = HandleTable::new(4);
        table.add(h(7)).unwrap();
        table.add(h(8)).unwrap();

        assert!(table.remove(h(7)).is_some());
        let after_once: Vec<_> = table.iter().collect();
        assert!(table.remove(h(7)).is_none());
        let after_twice: Vec<_> = table.iter().collect();

        assert_eq!(after_once, after_twice);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_matches_channel() {
        let mut table = HandleTable::new(4);
        table.add(TrackedHandle::new(3, 1)).unwrap();
        table.add(TrackedHandle::new(4, 1)).unwrap();

        table.remove(TrackedHandle::new(4, 1));
        assert!(table.contains(TrackedHandle::new(3, 1)));
        assert!(!table.contains(TrackedHandle::new(4, 1)));
    }

    #[test]
    fn test_capacity_two_drops_third() {
        let mut table = HandleTable::new(2);
        table.add(h(10)).unwrap();
        table.add(h(11)).unwrap();
        assert_eq!(table.add(h(12)), Err(TilerError::TableFull { capacity: 2 }));

        assert_eq!(table.len(), 2);
        assert!(table.contains(h(10)));
        assert!(table.contains(h(11)));
        assert!(!table.contains(h(12)));
        assert!(table.remove(h(10)).is_some());
        assert!(table.remove(h(11)).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut table = HandleTable::new(5);
        let mut state = 0x2545_f491_u32;
        for _ in 0..2000 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let key = h(state % 9);
            if state & 0x100 == 0 {
                let _ = table.add(key);
            } else {
                table.remove(key);
            }
            assert!(table.len() <= table.capacity());
            assert_eq!(table.len(), table.iter().count());
        }
    }

    #[test]
    fn test_drain_newest_first_follows_insertion_not_slots() {
        let mut table = HandleTable::new(3);
        table.add(h(1)).unwrap();
        table.add(h(2)).unwrap();
        table.add(h(3)).unwrap();
        // Free slot 0, then reuse it: slot order is now 4,2,3
        table.remove(h(1));
        table.add(h(4)).unwrap();

        let drained: Vec<_> = table.drain_newest_first().map(|e| e.handle).collect();
        assert_eq!(drained, vec![4, 3, 2]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_drain_oldest_first() {
        let mut table = HandleTable::new(3);
        for n in [5, 6, 7] {
            table.add(h(n)).unwrap();
        }
        let drained: Vec<_> = table.drain_oldest_first().map(|e| e.handle).collect();
        assert_eq!(drained, vec![5, 6, 7]);
    }

    #[test]
    fn test_descriptor_set_collapses_duplicates() {
        let mut set = DescriptorSet::new(2);
        assert_eq!(set.add_if_absent(9), Ok(true));
        assert_eq!(set.add_if_absent(9), Ok(false));
        assert_eq!(set.len(), 1);

        assert_eq!(set.add_if_absent(10), Ok(true));
        assert_eq!(set.add_if_absent(11), Err(TilerError::TableFull { capacity: 2 }));
        // A duplicate of a tracked fd is still accepted when full
        assert_eq!(set.add_if_absent(10), Ok(false));
    }

    #[test]
    fn test_descriptor_set_pop_and_remove() {
        let mut set = DescriptorSet::new(4);
        set.add_if_absent(20).unwrap();
        set.add_if_absent(21).unwrap();
        assert!(set.remove(20));
        assert!(!set.remove(20));
        assert_eq!(set.pop(), Some(21));
        assert_eq!(set.pop(), None);
    }
}
