//! Tag records found in image headers, and the shape of the tags handed to a booted image.

/// Size of the `{type, flags, size}` record preceding each tag payload.
pub const TAG_HEADER_LEN: usize = 8;

/// Tags in the stream start on this alignment.
pub const TAG_ALIGN: usize = 8;

/// Flag bit marking a tag the loader may ignore when it lacks support for it.
pub const TAG_FLAG_OPTIONAL: u16 = 1 << 0;

/// Kind of an image header tag.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TagType {
    /// Terminates the tag stream.
    End,
    /// Array of boot information types the image wants to receive.
    InfoRequest,
    Address,
    EntryAddress,
    Flags,
    Framebuffer,
    AlignModule,
    EfiBootServices,
    EntryAddressEfiI386,
    EntryAddressEfiAmd64,
    Relocatable,
    Unknown(u16),
}

impl TagType {
    pub const fn id(self) -> u16 {
        match self {
            TagType::End => 0,
            TagType::InfoRequest => 1,
            TagType::Address => 2,
            TagType::EntryAddress => 3,
            TagType::Flags => 4,
            TagType::Framebuffer => 5,
            TagType::AlignModule => 6,
            TagType::EfiBootServices => 7,
            TagType::EntryAddressEfiI386 => 8,
            TagType::EntryAddressEfiAmd64 => 9,
            TagType::Relocatable => 10,
            TagType::Unknown(id) => id,
        }
    }

    /// Capabilities a microcontroller loader never provides.
    pub const fn is_unsupported_capability(self) -> bool {
        matches!(
            self,
            TagType::Framebuffer
                | TagType::EfiBootServices
                | TagType::EntryAddressEfiI386
                | TagType::EntryAddressEfiAmd64
        )
    }
}

impl From<u16> for TagType {
    fn from(id: u16) -> Self {
        match id {
            0 => TagType::End,
            1 => TagType::InfoRequest,
            2 => TagType::Address,
            3 => TagType::EntryAddress,
            4 => TagType::Flags,
            5 => TagType::Framebuffer,
            6 => TagType::AlignModule,
            7 => TagType::EfiBootServices,
            8 => TagType::EntryAddressEfiI386,
            9 => TagType::EntryAddressEfiAmd64,
            10 => TagType::Relocatable,
            id => TagType::Unknown(id),
        }
    }
}

/// A decoded tag, borrowing its payload from the image in flash.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ImageHeaderTag<'a> {
    pub tag_type: TagType,
    pub flags: u16,
    /// Size of the tag including its 8-byte header.
    pub size: u32,
    /// Payload, `size - 8` bytes long.
    pub data: &'a [u8],
}

impl<'a> ImageHeaderTag<'a> {
    pub const fn is_optional(&self) -> bool {
        self.flags & TAG_FLAG_OPTIONAL != 0
    }

    /// The payload as little-endian words. Trailing bytes that do not fill a word are skipped.
    pub fn words(&self) -> impl Iterator<Item = u32> + use<'a> {
        self.data
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// First payload word, if the payload holds one.
    pub fn first_word(&self) -> Option<u32> {
        self.words().next()
    }
}

/// Boot information types an image may request through an info-request tag.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum BootInfoType {
    End = 0,
    BootCommandLine = 1,
    BootloaderName = 2,
    Modules = 3,
    BasicMemoryInfo = 4,
    BiosBootDevice = 5,
    MemoryMap = 6,
    VbeInfo = 7,
    FramebufferInfo = 8,
    ElfSymbols = 9,
    ApmTable = 10,
    Efi32SystemTable = 11,
    Efi64SystemTable = 12,
    SmbiosTables = 13,
    AcpiOldRsdp = 14,
    AcpiNewRsdp = 15,
    NetworkingInfo = 16,
    EfiMemoryMap = 17,
    EfiBootServicesNotTerminated = 18,
    Efi32ImageHandle = 19,
    Efi64ImageHandle = 20,
    ImageLoadBase = 21,
}

impl TryFrom<u32> for BootInfoType {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => BootInfoType::End,
            1 => BootInfoType::BootCommandLine,
            2 => BootInfoType::BootloaderName,
            3 => BootInfoType::Modules,
            4 => BootInfoType::BasicMemoryInfo,
            5 => BootInfoType::BiosBootDevice,
            6 => BootInfoType::MemoryMap,
            7 => BootInfoType::VbeInfo,
            8 => BootInfoType::FramebufferInfo,
            9 => BootInfoType::ElfSymbols,
            10 => BootInfoType::ApmTable,
            11 => BootInfoType::Efi32SystemTable,
            12 => BootInfoType::Efi64SystemTable,
            13 => BootInfoType::SmbiosTables,
            14 => BootInfoType::AcpiOldRsdp,
            15 => BootInfoType::AcpiNewRsdp,
            16 => BootInfoType::NetworkingInfo,
            17 => BootInfoType::EfiMemoryMap,
            18 => BootInfoType::EfiBootServicesNotTerminated,
            19 => BootInfoType::Efi32ImageHandle,
            20 => BootInfoType::Efi64ImageHandle,
            21 => BootInfoType::ImageLoadBase,
            other => return Err(other),
        })
    }
}

/// Tag handed to the booted image, sharing the layout of [`ImageHeaderTag`] minus the flags.
///
/// Assembling the full information table is up to the image-facing side; only the shape lives here.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BootInfoTag<'a> {
    pub tag_type: u32,
    /// Size including the 8-byte tag header.
    pub size: u32,
    pub data: &'a [u8],
}

impl<'a> BootInfoTag<'a> {
    pub fn new(tag_type: BootInfoType, data: &'a [u8]) -> Self {
        Self {
            tag_type: tag_type as u32,
            size: (TAG_HEADER_LEN + data.len()) as u32,
            data,
        }
    }
}
