//! Address ranges and bounds-checked views into memory-mapped flash.

use serde::{Deserialize, Serialize};

/// Half-open address range `[start, end)` in physical flash or RAM.
///
/// Only names a region, it never owns the memory behind it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct MemorySpace {
    pub start: u32,
    pub end: u32,
}

impl MemorySpace {
    /// Construct a span, panicking (at compile time when used in a `const`) if `start > end`.
    pub const fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "memory space ends before it starts");
        Self { start, end }
    }

    pub const fn from_start_len(start: u32, len: u32) -> Self {
        match start.checked_add(len) {
            Some(end) => Self { start, end },
            None => panic!("memory space wraps the address space"),
        }
    }

    pub const fn length(&self) -> u32 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn contains(&self, point: u32) -> bool {
        self.start <= point && point < self.end
    }

    /// Whether `other` lies entirely within this span.
    pub const fn contains_span(&self, other: &MemorySpace) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub const fn overlaps(&self, other: &MemorySpace) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `start` is a multiple of `align`. Never true for an `align` that is not a power of
    /// two, zero included.
    pub const fn is_aligned(&self, align: u32) -> bool {
        align.is_power_of_two() && self.start & (align - 1) == 0
    }
}

/// Read-only window over a block of memory located at `base`.
///
/// Every accessor is bounds checked and yields `None` instead of reading outside the window,
/// so data read from a (possibly corrupt) image can never steer a read past its region.
#[derive(Clone, Copy, Debug)]
pub struct MemoryView<'a> {
    base: u32,
    bytes: &'a [u8],
}

impl<'a> MemoryView<'a> {
    pub const fn new(base: u32, bytes: &'a [u8]) -> Self {
        Self { base, bytes }
    }

    /// View over memory-mapped flash or RAM described by `space`.
    ///
    /// # Safety
    /// The whole of `space` must be readable, mapped memory that is not written to for `'a`.
    pub unsafe fn mapped(space: MemorySpace) -> MemoryView<'a> {
        let bytes = unsafe {
            core::slice::from_raw_parts(space.start as usize as *const u8, space.length() as usize)
        };
        Self::new(space.start, bytes)
    }

    pub const fn base(&self) -> u32 {
        self.base
    }

    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub const fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn space(&self) -> MemorySpace {
        MemorySpace {
            start: self.base,
            end: self.base.saturating_add(self.bytes.len() as u32),
        }
    }

    /// Sub-view over `space`, if it lies within this view.
    pub fn region(&self, space: MemorySpace) -> Option<MemoryView<'a>> {
        let offset = space.start.checked_sub(self.base)? as usize;
        let bytes = self.bytes.get(offset..offset.checked_add(space.length() as usize)?)?;
        Some(Self::new(space.start, bytes))
    }

    /// Sub-view starting at `offset` up to the end of this view.
    pub fn skip(&self, offset: usize) -> Option<MemoryView<'a>> {
        let bytes = self.bytes.get(offset..)?;
        Some(Self::new(self.base.checked_add(offset as u32)?, bytes))
    }

    /// Sub-view of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        self.bytes.get(offset..offset.checked_add(len)?)
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.slice(offset, 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let bytes = self.slice(offset, 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read the word at absolute address `addr`.
    pub fn read_u32_at(&self, addr: u32) -> Option<u32> {
        self.read_u32(addr.checked_sub(self.base)? as usize)
    }
}
