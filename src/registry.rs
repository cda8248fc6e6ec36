//! Compile-time table of the modules the bootloader may chain-load.
//!
//! Entries cannot be added or removed at runtime: the table is a `const` built into the
//! bootloader image, and [`BootModules::new`] rejects malformed tables during const evaluation.

use crate::memory::MemorySpace;

/// Maximum number of modules a registry may hold.
pub const MAX_MODULES: usize = 4;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegistryError {
    OutOfRange,
}

/// A module registered at build time.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BootVectorEntry {
    /// Dense identifier, equal to the position of the entry in the table.
    pub id: u32,
    /// Flash region occupied by the module, starting with its vector table.
    pub flash_region: MemorySpace,
    pub module_name: &'static str,
    pub command_line_opts: &'static str,
}

/// Read-only view over the registered modules.
#[derive(Clone, Copy, Debug)]
pub struct BootModules<'a> {
    /// Reserved for a checksum over the whole table. Not checked yet.
    integrity_value: u32,
    module_count: usize,
    entries: &'a [BootVectorEntry],
}

impl<'a> BootModules<'a> {
    /// Wrap a table of entries.
    ///
    /// Panics, which fails the build when evaluated in a `const`, if the table holds more than
    /// [`MAX_MODULES`] entries, if ids are not dense or if a region is inverted.
    pub const fn new(entries: &'a [BootVectorEntry]) -> Self {
        assert!(entries.len() <= MAX_MODULES, "too many boot modules");

        let mut i = 0;
        while i < entries.len() {
            assert!(entries[i].id as usize == i, "boot module ids must be dense");
            assert!(
                entries[i].flash_region.start <= entries[i].flash_region.end,
                "boot module region ends before it starts"
            );
            i += 1;
        }

        Self {
            integrity_value: 0,
            module_count: entries.len(),
            entries,
        }
    }

    pub const fn count(&self) -> usize {
        self.module_count
    }

    pub fn entry_at(&self, index: usize) -> Result<&'a BootVectorEntry, RegistryError> {
        if index >= self.module_count {
            return Err(RegistryError::OutOfRange);
        }
        self.entries.get(index).ok_or(RegistryError::OutOfRange)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a BootVectorEntry> + use<'a> {
        self.entries.iter()
    }

    /// Whole-table integrity value. Always accepted until a checksum scheme is defined.
    pub const fn integrity_value(&self) -> u32 {
        self.integrity_value
    }

    /// Entry whose flash region is exactly `space`, if any.
    pub fn find_region(&self, space: &MemorySpace) -> Option<&'a BootVectorEntry> {
        self.iter().find(|entry| entry.flash_region == *space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRIES: [BootVectorEntry; 2] = [
        BootVectorEntry {
            id: 0,
            flash_region: MemorySpace::new(0x4000, 0x8000),
            module_name: "ovule",
            command_line_opts: "",
        },
        BootVectorEntry {
            id: 1,
            flash_region: MemorySpace::new(0x8000, 0x10000),
            module_name: "rescue",
            command_line_opts: "-v",
        },
    ];

    const REGISTRY: BootModules<'static> = BootModules::new(&ENTRIES);

    #[test]
    fn entry_access() {
        assert_eq!(REGISTRY.count(), 2);
        assert_eq!(REGISTRY.entry_at(1).unwrap().module_name, "rescue");
        assert_eq!(REGISTRY.entry_at(2), Err(RegistryError::OutOfRange));
        assert_eq!(REGISTRY.iter().map(|e| e.id).sum::<u32>(), 1);
        assert_eq!(REGISTRY.integrity_value(), 0);
    }

    #[test]
    fn find_region() {
        let space = MemorySpace::new(0x8000, 0x10000);
        assert_eq!(REGISTRY.find_region(&space).map(|e| e.id), Some(1));
        assert!(REGISTRY.find_region(&MemorySpace::new(0x8000, 0x9000)).is_none());
    }

    #[test]
    fn empty_registry() {
        let registry = BootModules::new(&[]);
        assert_eq!(registry.count(), 0);
        assert_eq!(registry.entry_at(0), Err(RegistryError::OutOfRange));
    }

    #[test]
    #[should_panic(expected = "dense")]
    fn sparse_ids_are_rejected() {
        let entries = [BootVectorEntry {
            id: 3,
            ..ENTRIES[0]
        }];
        let _ = BootModules::new(&entries);
    }
}
