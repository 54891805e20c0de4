//! Filepath: src/lanelock.rs
//!
//! Lock word for a single lane span (junction).
//!
//! [`LaneLock`] packs the removal claim, the exclusive write bit and the
//! number of active readers of one span into a single `u32`. The word is
//! only ever read or written while the index mutex is held, so it is a
//! plain value rather than an atomic: the mutex orders every transition,
//! and the index condition variable is broadcast whenever a bit is cleared.
//!
//! # Concurrency Model
//! 1. Readers: `add_reader()` on each span they descend through, `remove_reader()` when done.
//! 2. Writers: `set_write()` first (turning new readers away), then wait for
//!    `readers()` to reach zero; `clear_write()` when done.
//! 3. Removers: `set_removing()` on every junction of the claimed node, so that
//!    descenders stepping onto it abort and retry.
//!
//! ```rust
//! use dirlanes::lanelock::LaneLock;
//!
//! let mut lock = LaneLock::new();
//! lock.add_reader();
//! assert!(!lock.can_write());
//! lock.remove_reader();
//! assert!(lock.can_write());
//! ```

// ============================================================================
//  Bit Constants
// ============================================================================

/// Remove bit: the node owning this junction is claimed for removal.
pub const RMLOCK: u32 = 1 << 0;

/// Write bit: one operation holds this span exclusively.
pub const WRITELOCK: u32 = 1 << 1;

/// Shift of the reader count above the flag bits.
pub const READER_SHIFT: u32 = 2;

/// One reader, in lock-word units.
pub const READER_ONE: u32 = 1 << READER_SHIFT;

/// Mask of the flag bits below the reader count.
const FLAG_MASK: u32 = READER_ONE - 1;

/// Maximum number of concurrent readers representable in the word.
pub const MAX_READERS: u32 = u32::MAX >> READER_SHIFT;

// ============================================================================
//  LaneBits
// ============================================================================

/// Which bits an operation set on a junction, for precise release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaneBits {
    /// Nothing held.
    #[default]
    None,
    /// One reader slot held.
    Read,
    /// The write bit held.
    Write,
}

// ============================================================================
//  LaneLock
// ============================================================================

/// The lock word of one lane span.
///
/// # Layout
/// Bits 2-31: reader count | Bit 1: `write` | Bit 0: `removing`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneLock {
    value: u32,
}

impl LaneLock {
    /// An unlocked span.
    #[must_use]
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Create a lock word from a raw value.
    ///
    ///  WARN: ONLY FOR TESTING.
    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self { value }
    }

    /// Raw word.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }

    // ========================================================================
    //  Flag Accessors
    // ========================================================================

    /// Is the owning node claimed for removal?
    #[inline]
    #[must_use]
    pub const fn is_removing(self) -> bool {
        self.value & RMLOCK != 0
    }

    /// Is the span held exclusively?
    #[inline]
    #[must_use]
    pub const fn is_write_locked(self) -> bool {
        self.value & WRITELOCK != 0
    }

    /// Number of active readers.
    #[inline]
    #[must_use]
    pub const fn readers(self) -> u32 {
        self.value >> READER_SHIFT
    }

    /// No bits and no readers.
    #[inline]
    #[must_use]
    pub const fn is_free(self) -> bool {
        self.value == 0
    }

    /// A reader may enter: no writer holds the span.
    ///
    /// The removal bit is checked by the caller, since the remover itself
    /// keeps traversing its own node.
    #[inline]
    #[must_use]
    pub const fn can_read(self) -> bool {
        !self.is_write_locked() && self.readers() < MAX_READERS
    }

    /// A writer may take the span right now.
    #[inline]
    #[must_use]
    pub const fn can_write(self) -> bool {
        !self.is_write_locked() && self.readers() == 0
    }

    // ========================================================================
    //  Transitions (index mutex held)
    // ========================================================================

    /// Register one reader.
    #[inline]
    pub fn add_reader(&mut self) {
        debug_assert!(self.can_read(), "add_reader on write-locked span");
        self.value += READER_ONE;
    }

    /// Deregister one reader.
    #[inline]
    pub fn remove_reader(&mut self) {
        debug_assert!(self.readers() > 0, "remove_reader without readers");
        self.value -= READER_ONE;
    }

    /// Take the write bit. Existing readers may still be draining.
    #[inline]
    pub fn set_write(&mut self) {
        debug_assert!(!self.is_write_locked(), "set_write on write-locked span");
        self.value |= WRITELOCK;
    }

    /// Drop the write bit.
    #[inline]
    pub fn clear_write(&mut self) {
        debug_assert!(self.is_write_locked(), "clear_write on unlocked span");
        self.value &= !WRITELOCK;
    }

    /// Claim the owning node for removal.
    #[inline]
    pub fn set_removing(&mut self) {
        self.value |= RMLOCK;
    }

    /// Withdraw a removal claim.
    #[inline]
    pub fn clear_removing(&mut self) {
        self.value &= !RMLOCK;
    }

    /// Release whatever `bits` describes.
    #[inline]
    pub fn release(&mut self, bits: LaneBits) {
        match bits {
            LaneBits::None => {}
            LaneBits::Read => self.remove_reader(),
            LaneBits::Write => self.clear_write(),
        }
    }

    /// Flag bits only, reader count stripped.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> u32 {
        self.value & FLAG_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_free() {
        let lock = LaneLock::new();
        assert!(lock.is_free());
        assert!(!lock.is_removing());
        assert!(!lock.is_write_locked());
        assert_eq!(lock.readers(), 0);
        assert!(lock.can_read());
        assert!(lock.can_write());
    }

    #[test]
    fn test_readers_block_writer() {
        let mut lock = LaneLock::new();
        lock.add_reader();
        lock.add_reader();

        assert_eq!(lock.readers(), 2);
        assert!(lock.can_read());
        assert!(!lock.can_write());

        lock.remove_reader();
        assert!(!lock.can_write());

        lock.remove_reader();
        assert!(lock.can_write());
        assert!(lock.is_free());
    }

    #[test]
    fn test_writer_blocks_readers() {
        let mut lock = LaneLock::new();
        lock.set_write();

        assert!(lock.is_write_locked());
        assert!(!lock.can_read());
        assert!(!lock.can_write());

        lock.clear_write();
        assert!(lock.is_free());
    }

    #[test]
    fn test_removing_is_independent_of_counts() {
        let mut lock = LaneLock::new();
        lock.add_reader();
        lock.set_removing();

        assert!(lock.is_removing());
        assert_eq!(lock.readers(), 1);
        assert_eq!(lock.flags(), RMLOCK);

        lock.remove_reader();
        lock.set_write();
        assert_eq!(lock.flags(), RMLOCK | WRITELOCK);

        lock.clear_removing();
        lock.clear_write();
        assert!(lock.is_free());
    }

    #[test]
    fn test_pending_writer_turns_readers_away() {
        let mut lock = LaneLock::new();
        lock.add_reader();
        lock.set_write();

        // Write intent is visible while the old reader drains.
        assert!(!lock.can_read());
        assert!(!lock.can_write());
        assert_eq!(lock.readers(), 1);

        lock.remove_reader();
        assert_eq!(lock.readers(), 0);
        assert!(lock.is_write_locked());
    }

    #[test]
    fn test_release_matches_bits() {
        let mut lock = LaneLock::new();

        lock.add_reader();
        lock.release(LaneBits::Read);
        assert!(lock.is_free());

        lock.set_write();
        lock.release(LaneBits::Write);
        assert!(lock.is_free());

        lock.release(LaneBits::None);
        assert!(lock.is_free());
    }

    #[test]
    fn test_reader_count_does_not_touch_flags() {
        let mut lock = LaneLock::from_value(RMLOCK);
        for _ in 0..1000 {
            lock.add_reader();
        }
        assert_eq!(lock.readers(), 1000);
        assert_eq!(lock.flags(), RMLOCK);
    }
}
