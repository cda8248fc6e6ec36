//! Locating and decoding the multiboot-style header embedded in a module.
//!
//! Layout, all words little-endian:
//!
//! | offset | field                                   |
//! |--------|-----------------------------------------|
//! | 0      | magic, [`MULTIBOOT_MAGIC`]              |
//! | 4      | ISA, [`MULTIBOOT_ARMV7M_ISA`]           |
//! | 8      | header length, prologue and tags        |
//! | 12     | checksum, `-(magic + isa + length)`     |
//! | 16..   | tags, `{u16 type, u16 flags, u32 size}` |
//!
//! Every offset comes from flash contents that may be corrupt or hostile, so every read goes
//! through [`MemoryView`] and is checked against the declared header length.

pub mod tag;

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::{
    fmt::trace,
    header::tag::{ImageHeaderTag, TAG_ALIGN, TAG_HEADER_LEN, TagType},
    memory::MemoryView,
};

pub const MULTIBOOT_MAGIC: u32 = 0xE852_50D6;
pub const MULTIBOOT_ARMV7M_ISA: u32 = 0x0A70;

/// Length of the magic, ISA, length and checksum words.
pub const PROLOGUE_LEN: usize = 16;
pub const MIN_IMAGE_HEADER_LEN: u32 = PROLOGUE_LEN as u32;
pub const MAX_IMAGE_HEADER_LEN: u32 = 1024;

/// Maximum number of tags decoded per image.
pub const MAX_TAGS: usize = 16;

/// The header must start within this many bytes of the module start.
pub const HEADER_SEARCH_LIMIT: usize = 32 * 1024;

/// The header must start on this alignment within the module.
pub const HEADER_ALIGN: usize = 8;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ScanError {
    BadMagic,
    BadIsa,
    HeaderTooShort,
    HeaderTooLong,
    ChecksumMismatch,
    /// A tag's header or declared size extends past the declared header length.
    TagOverrunsHeader,
    TooManyTags,
    /// A tag declares a size smaller than its own header, or an end tag has the wrong size.
    MalformedTag,
}

/// Tags of a successfully scanned header, in stream order.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DecodedHeader<'a> {
    /// Address of the magic word.
    pub address: u32,
    /// Validated header length in bytes.
    pub header_len: u32,
    pub tags: Vec<ImageHeaderTag<'a>, MAX_TAGS>,
}

impl<'a> DecodedHeader<'a> {
    pub fn tags(&self) -> &[ImageHeaderTag<'a>] {
        &self.tags
    }

    pub fn tags_loaded(&self) -> usize {
        self.tags.len()
    }

    /// First tag of the given type.
    pub fn find(&self, tag_type: TagType) -> Option<&ImageHeaderTag<'a>> {
        self.tags.iter().find(|tag| tag.tag_type == tag_type)
    }
}

/// Checksum word that makes `magic + isa + header_len + checksum` wrap to zero.
pub const fn checksum(magic: u32, isa: u32, header_len: u32) -> u32 {
    0u32.wrapping_sub(magic)
        .wrapping_sub(isa)
        .wrapping_sub(header_len)
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Find the header within the first [`HEADER_SEARCH_LIMIT`] bytes of a module.
///
/// Returns a view starting at the magic word and running to the end of the module.
pub fn locate<'a>(module: &MemoryView<'a>) -> Option<MemoryView<'a>> {
    let limit = module.len().min(HEADER_SEARCH_LIMIT);

    (0..limit)
        .step_by(HEADER_ALIGN)
        .find(|&offset| module.read_u32(offset) == Some(MULTIBOOT_MAGIC))
        .and_then(|offset| module.skip(offset))
}

/// Validate the prologue at the start of `view` and decode its tag stream.
pub fn scan<'a>(view: &MemoryView<'a>) -> Result<DecodedHeader<'a>, ScanError> {
    let magic = view.read_u32(0).ok_or(ScanError::BadMagic)?;
    if magic != MULTIBOOT_MAGIC {
        return Err(ScanError::BadMagic);
    }

    let isa = view.read_u32(4).ok_or(ScanError::HeaderTooShort)?;
    if isa != MULTIBOOT_ARMV7M_ISA {
        return Err(ScanError::BadIsa);
    }

    let header_len = view.read_u32(8).ok_or(ScanError::HeaderTooShort)?;
    if header_len < MIN_IMAGE_HEADER_LEN {
        return Err(ScanError::HeaderTooShort);
    }
    if header_len > MAX_IMAGE_HEADER_LEN || header_len as usize > view.len() {
        return Err(ScanError::HeaderTooLong);
    }

    let stored = view.read_u32(12).ok_or(ScanError::HeaderTooShort)?;
    if stored != checksum(magic, isa, header_len) {
        return Err(ScanError::ChecksumMismatch);
    }

    let end = header_len as usize;
    let mut tags = Vec::new();
    let mut cursor = PROLOGUE_LEN;

    while cursor < end {
        if end - cursor < TAG_HEADER_LEN {
            return Err(ScanError::TagOverrunsHeader);
        }

        let raw_type = view.read_u16(cursor).ok_or(ScanError::TagOverrunsHeader)?;
        let flags = view
            .read_u16(cursor + 2)
            .ok_or(ScanError::TagOverrunsHeader)?;
        let size = view
            .read_u32(cursor + 4)
            .ok_or(ScanError::TagOverrunsHeader)? as usize;

        if size < TAG_HEADER_LEN {
            return Err(ScanError::MalformedTag);
        }
        if size > end - cursor {
            return Err(ScanError::TagOverrunsHeader);
        }

        let tag_type = TagType::from(raw_type);
        if tag_type == TagType::End {
            if size != TAG_HEADER_LEN {
                return Err(ScanError::MalformedTag);
            }
            break;
        }

        let data = view
            .slice(cursor + TAG_HEADER_LEN, size - TAG_HEADER_LEN)
            .ok_or(ScanError::TagOverrunsHeader)?;

        trace!("tag {=u16} at +{=usize}, {=usize} bytes", raw_type, cursor, size);

        tags.push(ImageHeaderTag {
            tag_type,
            flags,
            size: size as u32,
            data,
        })
        .map_err(|_| ScanError::TooManyTags)?;

        // `size <= end - cursor <= MAX_IMAGE_HEADER_LEN`, so this cannot overflow.
        cursor += align_up(size, TAG_ALIGN);
    }

    Ok(DecodedHeader {
        address: view.base(),
        header_len,
        tags,
    })
}
