//! Simple straightforward implementation of keeping the boot journal.
//!
//! This implementation focusses on correctness and ease, contrary to efficiency and code size.
//! Leverages `sequential-storage` and `postcard` to store and serialize/deserialize the last
//! [`BootRecord`]. The partition handed to the journal must span exactly two erase pages.

use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::{
    cache::KeyPointerCache,
    map::{SerializationError, Value},
};

use crate::{fmt::debug, state::BootRecord};

#[derive(Debug)]
pub enum JournalError<E> {
    Storage(sequential_storage::Error<E>),
}

impl<E> From<sequential_storage::Error<E>> for JournalError<E> {
    fn from(error: sequential_storage::Error<E>) -> Self {
        JournalError::Storage(error)
    }
}

impl<'a> Value<'a> for BootRecord {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let buffer = postcard::to_slice(self, buffer).map_err(|e| match e {
            postcard::Error::SerializeBufferFull => SerializationError::BufferTooSmall,
            // Unmapped error.
            _ => SerializationError::Custom(0),
        })?;

        Ok(buffer.len())
    }

    fn deserialize_from(buffer: &'a [u8]) -> Result<Self, SerializationError>
    where
        Self: Sized,
    {
        postcard::from_bytes(buffer).map_err(|e| match e {
            postcard::Error::DeserializeUnexpectedEnd => SerializationError::BufferTooSmall,
            // Data type mismatch between Value and what is stored on disk.
            postcard::Error::DeserializeBadVarint
            | postcard::Error::DeserializeBadBool
            | postcard::Error::DeserializeBadChar
            | postcard::Error::DeserializeBadUtf8
            | postcard::Error::DeserializeBadOption
            | postcard::Error::DeserializeBadEnum
            | postcard::Error::DeserializeBadEncoding => SerializationError::InvalidFormat,
            // Unmapped error.
            _ => SerializationError::Custom(0),
        })
    }
}

/// Last [`BootRecord`], persisted in a NOR flash partition.
pub struct Journal<NVM: NorFlash> {
    nvm: NVM,
    nvm_cache: KeyPointerCache<2, (), 1>,
}

impl<NVM: NorFlash> Journal<NVM> {
    pub fn new(nvm: NVM) -> Self {
        Self {
            nvm,
            nvm_cache: KeyPointerCache::new(),
        }
    }

    /// Fetch the stored record, if any was ever written.
    pub async fn load(&mut self) -> Result<Option<BootRecord>, JournalError<NVM::Error>> {
        let nvm_size = self.nvm.capacity() as u32;
        let mut data_buffer = [0u8; BootRecord::max_serialized_size()];

        let record = sequential_storage::map::fetch_item::<(), BootRecord, _>(
            &mut self.nvm,
            0..nvm_size,
            &mut self.nvm_cache,
            &mut data_buffer,
            &(),
        )
        .await?;

        if record.is_none() {
            debug!("journal does not contain a record");
        }

        Ok(record)
    }

    pub async fn store(&mut self, record: &BootRecord) -> Result<(), JournalError<NVM::Error>> {
        let nvm_size = self.nvm.capacity() as u32;
        let mut data_buffer = [0u8; BootRecord::max_serialized_size()];

        debug!("storing {}", record);

        sequential_storage::map::store_item::<(), BootRecord, _>(
            &mut self.nvm,
            0..nvm_size,
            &mut self.nvm_cache,
            &mut data_buffer,
            &(),
            record,
        )
        .await?;

        Ok(())
    }

    pub fn release(self) -> NVM {
        self.nvm
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::{
        decision::StayReason,
        header::ScanError,
        mock::MockFlash,
        state::Outcome,
        validate::{ModuleError, ValidationError},
    };

    #[test]
    fn empty_journal() {
        let mut journal = Journal::new(MockFlash::new());
        assert_eq!(block_on(journal.load()).unwrap(), None);
    }

    #[test]
    fn latest_record_wins() {
        let mut journal = Journal::new(MockFlash::new());

        let first = BootRecord::stayed(StayReason::DoubleTap);
        let second = BootRecord {
            outcome: Outcome::Booted { module: 1 },
            rejected: [
                Some(ModuleError::Scan(ScanError::ChecksumMismatch)),
                None,
                Some(ModuleError::Validation(ValidationError::Overlap)),
                None,
            ],
        };

        block_on(async {
            journal.store(&first).await.unwrap();
            assert_eq!(journal.load().await.unwrap(), Some(first));

            journal.store(&second).await.unwrap();
            assert_eq!(journal.load().await.unwrap(), Some(second));
        });

        // A fresh journal over the same flash sees the same record.
        let mut journal = Journal::new(journal.release());
        assert_eq!(block_on(journal.load()).unwrap(), Some(second));
    }

    #[test]
    fn survives_many_stores() {
        let mut journal = Journal::new(MockFlash::new());

        block_on(async {
            for module in 0..100 {
                let record = BootRecord {
                    outcome: Outcome::Booted { module: module % 4 },
                    rejected: [None; 4],
                };
                journal.store(&record).await.unwrap();
                assert_eq!(journal.load().await.unwrap(), Some(record));
            }
        });
    }
}
