use core::cell::Cell;
use std::{vec, vec::Vec};

use embedded_storage_async::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

use crate::{
    Board, ResetCause, Status,
    boot::Boot,
    decision::ResetMarker,
    header::{MULTIBOOT_ARMV7M_ISA, MULTIBOOT_MAGIC, checksum},
    memory::{MemorySpace, MemoryView},
    registry::BootVectorEntry,
};

/// Initial stack pointer written into every mock vector table.
pub const STACK_TOP: u32 = 0x2000_8000;

/// Offset of the reset handler from the start of a module.
pub const RESET_OFFSET: u32 = 0x400;

/// Offset of the multiboot header from the start of a module, past its vector table.
pub const HEADER_OFFSET: u32 = 0x200;

pub const fn entry(id: u32, start: u32, len: u32) -> BootVectorEntry {
    BootVectorEntry {
        id,
        flash_region: MemorySpace::from_start_len(start, len),
        module_name: "mock",
        command_line_opts: "",
    }
}

/// Builds multiboot headers, valid unless told otherwise.
#[derive(Clone, Debug)]
pub struct HeaderBuilder {
    isa: u32,
    declared_len: Option<u32>,
    checksum: Option<u32>,
    tags: Vec<u8>,
    end_tag: bool,
    trailing: Vec<u8>,
}

impl HeaderBuilder {
    pub fn new() -> Self {
        Self {
            isa: MULTIBOOT_ARMV7M_ISA,
            declared_len: None,
            checksum: None,
            tags: Vec::new(),
            end_tag: true,
            trailing: Vec::new(),
        }
    }

    pub fn isa(mut self, isa: u32) -> Self {
        self.isa = isa;
        self
    }

    /// Override the header length field; the checksum follows unless also overridden.
    pub fn declared_len(mut self, len: u32) -> Self {
        self.declared_len = Some(len);
        self
    }

    pub fn checksum(mut self, checksum: u32) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Append a tag, padded to the next 8-byte boundary.
    pub fn tag(mut self, tag_type: u16, flags: u16, payload: &[u8]) -> Self {
        let size = 8 + payload.len() as u32;
        self.tags.extend_from_slice(&tag_type.to_le_bytes());
        self.tags.extend_from_slice(&flags.to_le_bytes());
        self.tags.extend_from_slice(&size.to_le_bytes());
        self.tags.extend_from_slice(payload);
        while self.tags.len() % 8 != 0 {
            self.tags.push(0);
        }
        self
    }

    pub fn without_end_tag(mut self) -> Self {
        self.end_tag = false;
        self
    }

    /// Bytes after the end tag, still counted in the header length.
    pub fn trailing(mut self, bytes: &[u8]) -> Self {
        self.trailing.extend_from_slice(bytes);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = self.tags.clone();
        if self.end_tag {
            body.extend_from_slice(&[0, 0, 0, 0, 8, 0, 0, 0]);
        }
        body.extend_from_slice(&self.trailing);

        let len = self.declared_len.unwrap_or(16 + body.len() as u32);
        let sum = self
            .checksum
            .unwrap_or_else(|| checksum(MULTIBOOT_MAGIC, self.isa, len));

        let mut bytes = Vec::with_capacity(16 + body.len());
        for word in [MULTIBOOT_MAGIC, self.isa, len, sum] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.extend_from_slice(&body);
        bytes
    }
}

/// Memory-mapped flash contents at a fixed base address.
#[derive(Debug)]
pub struct FlashImage {
    base: u32,
    bytes: Vec<u8>,
}

impl FlashImage {
    pub fn new(base: u32, len: usize) -> Self {
        Self {
            base,
            bytes: vec![0; len],
        }
    }

    pub fn erased(base: u32, len: usize) -> Self {
        Self {
            base,
            bytes: vec![0xff; len],
        }
    }

    pub fn view(&self) -> MemoryView<'_> {
        MemoryView::new(self.base, &self.bytes)
    }

    pub fn write(&mut self, addr: u32, data: &[u8]) {
        let offset = (addr - self.base) as usize;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn write_word(&mut self, addr: u32, word: u32) {
        self.write(addr, &word.to_le_bytes());
    }

    /// Vector table with a reset handler inside the module, in Thumb mode.
    pub fn vector_table(&mut self, start: u32) {
        self.write_word(start, STACK_TOP);
        self.write_word(start + 4, start + RESET_OFFSET + 1);
    }

    /// A module: vector table followed by the header `builder` produces.
    pub fn module(&mut self, start: u32, len: u32, builder: HeaderBuilder) {
        let header = builder.build();
        assert!(HEADER_OFFSET as usize + header.len() <= len as usize);

        self.vector_table(start);
        self.write(start + HEADER_OFFSET, &header);
    }
}

/// Board with a manually advanced clock; every delay moves `now` forward.
#[derive(Debug)]
pub struct MockBoard {
    pub cause: ResetCause,
    pub now: u32,
    /// Tick at which USB enumerates, if ever.
    pub usb_at: Option<u32>,
    pub delays: Vec<u32>,
    pub statuses: Vec<Status>,
}

impl MockBoard {
    pub fn new(cause: ResetCause) -> Self {
        Self {
            cause,
            now: 0,
            usb_at: None,
            delays: Vec::new(),
            statuses: Vec::new(),
        }
    }
}

impl Board for MockBoard {
    fn reset_cause(&self) -> ResetCause {
        self.cause
    }

    fn ticks(&self) -> u32 {
        self.now
    }

    fn is_usb_enumerated(&self) -> bool {
        self.usb_at.is_some_and(|at| self.now >= at)
    }

    fn signal_status(&mut self, status: Status) {
        self.statuses.push(status);
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
        self.now = self.now.wrapping_add(ms);
    }
}

#[derive(Debug)]
pub struct MockMarker {
    pub value: u32,
    pub reads: Cell<usize>,
    pub writes: Vec<u32>,
}

impl MockMarker {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            reads: Cell::new(0),
            writes: Vec::new(),
        }
    }
}

impl ResetMarker for MockMarker {
    fn read(&self) -> u32 {
        self.reads.set(self.reads.get() + 1);
        self.value
    }

    fn write(&mut self, value: u32) {
        self.writes.push(value);
        self.value = value;
    }
}

pub const MOCK_FLASH_SIZE: usize = 512;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MockFlashError {
    OutOfBounds,
    NotAligned,
}

impl NorFlashError for MockFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            MockFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            MockFlashError::NotAligned => NorFlashErrorKind::NotAligned,
        }
    }
}

/// NOR flash of two erase pages; writes can only clear bits.
#[derive(Debug)]
pub struct MockFlash {
    pub data: [u8; MOCK_FLASH_SIZE],
    pub erases: Vec<(u32, u32)>,
}

impl MockFlash {
    pub fn new() -> Self {
        Self {
            data: [0xff; MOCK_FLASH_SIZE],
            erases: Vec::new(),
        }
    }

    fn range(
        offset: u32,
        len: usize,
        align: usize,
    ) -> Result<core::ops::Range<usize>, MockFlashError> {
        let start = offset as usize;
        if start % align != 0 || len % align != 0 {
            return Err(MockFlashError::NotAligned);
        }
        if start + len > MOCK_FLASH_SIZE {
            return Err(MockFlashError::OutOfBounds);
        }
        Ok(start..start + len)
    }
}

impl ErrorType for MockFlash {
    type Error = MockFlashError;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len(), Self::READ_SIZE)?;
        bytes.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        MOCK_FLASH_SIZE
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 256;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let len = to.checked_sub(from).ok_or(MockFlashError::OutOfBounds)? as usize;
        let range = Self::range(from, len, Self::ERASE_SIZE)?;
        self.data[range].fill(0xff);
        self.erases.push((from, to));
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let range = Self::range(offset, bytes.len(), Self::WRITE_SIZE)?;
        for (cell, byte) in self.data[range].iter_mut().zip(bytes) {
            *cell &= *byte;
        }
        Ok(())
    }
}

/// Boot mechanism for paths that must never reach the jump.
pub struct NeverBoot;

impl Boot for NeverBoot {
    unsafe fn boot(_vector_table: *const u32) -> ! {
        unimplemented!()
    }
}
