//! Cross-module validation: scans every registered module, disqualifies the ones that cannot be
//! booted safely and picks the image to hand control to.
//!
//! A failure only ever disqualifies the module it concerns; the remaining modules are still
//! considered. The only way to obtain a [`CertifiedImage`] is through a [`ValidationReport`].

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::{
    Config,
    fmt::{debug, info, warn},
    header::{
        self, DecodedHeader, MAX_TAGS, ScanError,
        tag::{ImageHeaderTag, TagType},
    },
    memory::{MemorySpace, MemoryView},
    registry::{BootModules, BootVectorEntry, MAX_MODULES},
};

/// Maximum number of boot information items an image may request.
pub const MAX_INFO_REQUESTS: usize = 16;

/// Requested info items at or below this value are reserved and dropped.
///
/// Only 0, the end tag type, is reserved. A cut-off at the highest defined type (0x21) would
/// drop every real request, so it is deliberately not used.
pub const INFO_REQ_RESERVED_THRESHOLD: u32 = 0;

/// Smallest vector table alignment VTOR can hold.
///
/// A configured alignment below this, or one that is not a power of two, rejects every module.
pub const MIN_VECTOR_TABLE_ALIGN: u32 = 128;

/// Alignment demanded by an align-module tag without payload.
pub const DEFAULT_MODULE_ALIGN: u32 = 4096;

pub type InfoRequests = Vec<u32, MAX_INFO_REQUESTS>;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ValidationError {
    /// The module's region overlaps another module that scanned successfully.
    Overlap,
    /// The module start does not satisfy the vector table or align-module alignment.
    MisalignedModule,
    TooManyInfoRequests,
    /// The reset handler or entry address tag points outside the module region.
    EntryOutsideModule,
}

/// Reason a module was disqualified.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum ModuleError {
    /// The module's region is not part of the readable flash.
    Unmapped,
    Scan(ScanError),
    Validation(ValidationError),
}

impl From<ScanError> for ModuleError {
    fn from(error: ScanError) -> Self {
        ModuleError::Scan(error)
    }
}

impl From<ValidationError> for ModuleError {
    fn from(error: ValidationError) -> Self {
        ModuleError::Validation(error)
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModuleStatus {
    Valid,
    Invalid(ModuleError),
}

/// Capabilities requested by an image that this loader will never provide.
///
/// Recorded for the image's benefit only; they do not disqualify it.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct UnsupportedTags {
    pub framebuffer: bool,
    pub efi_boot_services: bool,
    pub efi_entry: bool,
}

impl UnsupportedTags {
    fn record(&mut self, tag_type: TagType) {
        match tag_type {
            TagType::Framebuffer => self.framebuffer = true,
            TagType::EfiBootServices => self.efi_boot_services = true,
            TagType::EntryAddressEfiI386 | TagType::EntryAddressEfiAmd64 => self.efi_entry = true,
            _ => {}
        }
    }

    pub const fn any(&self) -> bool {
        self.framebuffer || self.efi_boot_services || self.efi_entry
    }
}

/// Scan result for a single module, discarded once a boot decision has been made.
#[derive(Clone, Debug)]
pub struct BootImage<'a> {
    pub entry: &'a BootVectorEntry,
    pub memory_space: MemorySpace,
    pub status: ModuleStatus,
    pub tags: Vec<ImageHeaderTag<'a>, MAX_TAGS>,
    pub info_requests: InfoRequests,
    pub unsupported: UnsupportedTags,
}

impl<'a> BootImage<'a> {
    fn new(entry: &'a BootVectorEntry) -> Self {
        Self {
            entry,
            memory_space: entry.flash_region,
            status: ModuleStatus::Valid,
            tags: Vec::new(),
            info_requests: Vec::new(),
            unsupported: UnsupportedTags::default(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == ModuleStatus::Valid
    }

    pub fn tags_loaded(&self) -> usize {
        self.tags.len()
    }

    fn reject(&mut self, error: impl Into<ModuleError>) {
        let error = error.into();
        warn!("module {=u32} rejected: {}", self.entry.id, error);
        self.status = ModuleStatus::Invalid(error);
    }
}

/// Module that passed header scan and cross-module validation, and may be jumped to.
///
/// Cannot be constructed outside of this module.
#[derive(Clone, Debug)]
pub struct CertifiedImage<'a> {
    entry: &'a BootVectorEntry,
    info_requests: InfoRequests,
}

impl<'a> CertifiedImage<'a> {
    pub fn entry(&self) -> &'a BootVectorEntry {
        self.entry
    }

    /// Address of the vector table, which is the module start.
    pub fn vector_table(&self) -> u32 {
        self.entry.flash_region.start
    }

    pub fn info_requests(&self) -> &[u32] {
        &self.info_requests
    }
}

/// Outcome of validating every registered module.
#[derive(Clone, Debug)]
pub struct ValidationReport<'a> {
    modules: Vec<BootImage<'a>, MAX_MODULES>,
    chosen: Option<usize>,
}

impl<'a> ValidationReport<'a> {
    pub fn modules(&self) -> &[BootImage<'a>] {
        &self.modules
    }

    /// Valid module with the lowest id.
    pub fn chosen(&self) -> Option<&BootImage<'a>> {
        self.chosen.and_then(|index| self.modules.get(index))
    }

    /// Info requests of the chosen module.
    pub fn info_requests(&self) -> &[u32] {
        self.chosen()
            .map(|image| image.info_requests.as_slice())
            .unwrap_or(&[])
    }

    /// Hand out the chosen module for control transfer.
    pub fn certify(&self) -> Option<CertifiedImage<'a>> {
        let image = self.chosen()?;

        Some(CertifiedImage {
            entry: image.entry,
            info_requests: image.info_requests.clone(),
        })
    }
}

/// Scan and validate every module in `registry`, reading their contents from `flash`.
pub fn validate_all<'a>(
    registry: &BootModules<'a>,
    flash: &MemoryView<'a>,
    config: &Config,
) -> ValidationReport<'a> {
    let mut modules: Vec<BootImage<'a>, MAX_MODULES> = Vec::new();

    for entry in registry.iter() {
        let mut image = BootImage::new(entry);
        match scan_module(flash, entry) {
            Ok(header) => {
                debug!(
                    "module {=u32}: header at {=u32:#x}, {=usize} tags",
                    entry.id,
                    header.address,
                    header.tags_loaded()
                );
                image.tags = header.tags;
            }
            Err(error) => image.reject(error),
        }

        // The registry is bounded by the same capacity.
        if modules.push(image).is_err() {
            break;
        }
    }

    reject_overlapping(&mut modules);

    for image in modules.iter_mut().filter(|image| image.is_valid()) {
        if let Err(error) = check_module(image, flash, config) {
            image.reject(error);
        }
    }

    let chosen = modules
        .iter()
        .enumerate()
        .filter(|(_, image)| image.is_valid())
        .min_by_key(|(_, image)| image.entry.id)
        .map(|(index, _)| index);

    match chosen.and_then(|index| modules.get(index)) {
        Some(image) => info!(
            "chose module {=u32} ({=str})",
            image.entry.id, image.entry.module_name
        ),
        None => warn!("no bootable module"),
    }

    ValidationReport { modules, chosen }
}

fn scan_module<'a>(
    flash: &MemoryView<'a>,
    entry: &BootVectorEntry,
) -> Result<DecodedHeader<'a>, ModuleError> {
    let view = flash
        .region(entry.flash_region)
        .ok_or(ModuleError::Unmapped)?;
    let header = header::locate(&view).ok_or(ScanError::BadMagic)?;
    Ok(header::scan(&header)?)
}

/// Disqualify both sides of every overlapping pair among the modules that scanned successfully.
fn reject_overlapping(modules: &mut [BootImage<'_>]) {
    let mut overlapping = [false; MAX_MODULES];

    for (i, a) in modules.iter().enumerate() {
        for (j, b) in modules.iter().enumerate().skip(i + 1) {
            if a.is_valid() && b.is_valid() && a.memory_space.overlaps(&b.memory_space) {
                overlapping[i] = true;
                overlapping[j] = true;
            }
        }
    }

    for (image, overlapping) in modules.iter_mut().zip(overlapping) {
        if overlapping {
            image.reject(ValidationError::Overlap);
        }
    }
}

fn check_module(
    image: &mut BootImage<'_>,
    flash: &MemoryView<'_>,
    config: &Config,
) -> Result<(), ValidationError> {
    let space = image.memory_space;

    let align = config.vector_table_align;
    if align < MIN_VECTOR_TABLE_ALIGN || !space.is_aligned(align) {
        return Err(ValidationError::MisalignedModule);
    }

    let reset_handler = flash
        .read_u32_at(space.start.wrapping_add(4))
        .filter(|_| space.length() >= 8)
        .ok_or(ValidationError::EntryOutsideModule)?;
    if !space.contains(reset_handler & !1) {
        return Err(ValidationError::EntryOutsideModule);
    }

    let mut requests = InfoRequests::new();
    let mut unsupported = UnsupportedTags::default();

    for tag in image.tags.iter() {
        match tag.tag_type {
            TagType::InfoRequest => {
                for item in tag.words().filter(|&item| item > INFO_REQ_RESERVED_THRESHOLD) {
                    requests
                        .push(item)
                        .map_err(|_| ValidationError::TooManyInfoRequests)?;
                }
            }
            TagType::AlignModule => {
                let align = tag.first_word().unwrap_or(DEFAULT_MODULE_ALIGN);
                if !space.is_aligned(align) {
                    return Err(ValidationError::MisalignedModule);
                }
            }
            TagType::EntryAddress => {
                let entry = tag
                    .first_word()
                    .ok_or(ValidationError::EntryOutsideModule)?;
                if !space.contains(entry & !1) {
                    return Err(ValidationError::EntryOutsideModule);
                }
            }
            tag_type if tag_type.is_unsupported_capability() => {
                debug!("module {=u32} asks for unsupported {}", image.entry.id, tag_type);
                unsupported.record(tag_type);
            }
            // Address, flags, relocatable and unknown tags: the image runs where it is flashed.
            _ => {}
        }
    }

    image.info_requests = requests;
    image.unsupported = unsupported;
    Ok(())
}
