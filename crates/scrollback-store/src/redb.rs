//! Redb-backed durable read positions.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Positions
//! survive client restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use scrollback_core::{ConversationKey, ReadPosition};

use super::{ReadPositionStore, StoreError};

/// Table: read_positions
/// Key: lowercased conversation name
/// Value: CBOR-encoded `ReadPosition`
const READ_POSITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("read_positions");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(|e| StoreError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(READ_POSITIONS).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl ReadPositionStore for RedbStore {
    fn load(&self, key: &ConversationKey) -> Result<Option<ReadPosition>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(READ_POSITIONS).map_err(|e| StoreError::Io(e.to_string()))?;

        match table.get(key.as_str()).map_err(|e| StoreError::Io(e.to_string()))? {
            Some(value) => decode(value.value()).map(Some),
            None => Ok(None),
        }
    }

    fn save(&self, key: &ConversationKey, position: &ReadPosition) -> Result<(), StoreError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(position, &mut bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(READ_POSITIONS).map_err(|e| StoreError::Io(e.to_string()))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn remove(&self, key: &ConversationKey) -> Result<(), StoreError> {
        let txn = self.db.begin_write().map_err(|e| StoreError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(READ_POSITIONS).map_err(|e| StoreError::Io(e.to_string()))?;
            table.remove(key.as_str()).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(())
    }

    fn list(&self) -> Result<Vec<(ConversationKey, ReadPosition)>, StoreError> {
        let txn = self.db.begin_read().map_err(|e| StoreError::Io(e.to_string()))?;
        let table = txn.open_table(READ_POSITIONS).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut positions = Vec::new();
        for result in table.iter().map_err(|e| StoreError::Io(e.to_string()))? {
            let (key, value) = result.map_err(|e| StoreError::Io(e.to_string()))?;
            positions.push((ConversationKey::new(key.value()), decode(value.value())?));
        }

        Ok(positions)
    }
}

fn decode(bytes: &[u8]) -> Result<ReadPosition, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}
