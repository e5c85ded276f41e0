use std::ops::Bound;
use std::path::Path;

use datafile::{decode_position, encode_position, Position};
use redb::{Database, Durability, ReadOnlyTable, ReadableTableMetadata, TableDefinition};

use crate::{IndexError, IndexIterator, Indexer, Result};

/// File the B+ tree lives in, next to the data files.
pub const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

const INDEX_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("lodekv-index");

/// Persistent B+ tree index backed by an embedded `redb` database.
///
/// Every mutation is a single-statement transaction of the underlying store;
/// reads run in their own read transactions. Because the map survives
/// restarts, the engine skips the data-file replay entirely when this
/// variant is configured — the price is a disk write per index update.
pub struct BPlusTreeIndex {
    db: Database,
    durability: Durability,
}

impl BPlusTreeIndex {
    /// Opens (or creates) `<dir>/bptree-index` and ensures the table exists.
    pub fn open(dir: &Path, sync: bool) -> Result<Self> {
        let db = Database::create(dir.join(BPTREE_INDEX_FILE_NAME))?;
        let durability = if sync {
            Durability::Immediate
        } else {
            Durability::Eventual
        };

        // Create the table up front so read transactions never race a
        // missing definition.
        let txn = db.begin_write()?;
        txn.open_table(INDEX_TABLE)?;
        txn.commit()?;

        Ok(Self { db, durability })
    }
}

impl Indexer for BPlusTreeIndex {
    fn put(&self, key: Vec<u8>, pos: Position) -> Result<Option<Position>> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(self.durability);
        let old = {
            let mut table = txn.open_table(INDEX_TABLE)?;
            let encoded = encode_position(&pos);
            let prev = table
                .insert(key.as_slice(), encoded.as_slice())?
                .map(|guard| guard.value().to_vec());
            prev
        };
        txn.commit()?;

        match old {
            None => Ok(None),
            Some(bytes) => decode_position(&bytes)
                .map(Some)
                .ok_or(IndexError::Corrupted),
        }
    }

    fn get(&self, key: &[u8]) -> Result<Option<Position>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INDEX_TABLE)?;
        match table.get(key)? {
            None => Ok(None),
            Some(guard) => decode_position(guard.value())
                .map(Some)
                .ok_or(IndexError::Corrupted),
        }
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)> {
        let mut txn = self.db.begin_write()?;
        txn.set_durability(self.durability);
        let old = {
            let mut table = txn.open_table(INDEX_TABLE)?;
            let prev = table.remove(key)?.map(|guard| guard.value().to_vec());
            prev
        };
        txn.commit()?;

        match old {
            None => Ok((None, false)),
            Some(bytes) => {
                let pos = decode_position(&bytes).ok_or(IndexError::Corrupted)?;
                Ok((Some(pos), true))
            }
        }
    }

    fn size(&self) -> Result<usize> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INDEX_TABLE)?;
        Ok(table.len()? as usize)
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INDEX_TABLE)?;
        let mut it = BPlusTreeIterator {
            table,
            reverse,
            current: None,
        };
        it.rewind();
        Ok(Box::new(it))
    }

    fn close(&self) -> Result<()> {
        // A durability-Immediate empty commit flushes whatever the last
        // Eventual commits left in the page cache.
        let txn = self.db.begin_write()?;
        txn.commit()?;
        Ok(())
    }
}

/// Cursor over the on-disk tree. Holds its table (and thus a consistent
/// read snapshot) until dropped; each step re-ranges from the current key,
/// which keeps the struct free of self-references.
struct BPlusTreeIterator {
    table: ReadOnlyTable<&'static [u8], &'static [u8]>,
    reverse: bool,
    current: Option<(Vec<u8>, Position)>,
}

impl BPlusTreeIterator {
    fn first_in(
        &self,
        bounds: (Bound<&[u8]>, Bound<&[u8]>),
    ) -> Option<(Vec<u8>, Position)> {
        let mut range = self.table.range::<&[u8]>(bounds).ok()?;
        let item = if self.reverse {
            range.next_back()
        } else {
            range.next()
        };
        item.and_then(|res| res.ok())
            .and_then(|(k, v)| decode_position(v.value()).map(|pos| (k.value().to_vec(), pos)))
    }
}

impl IndexIterator for BPlusTreeIterator {
    fn rewind(&mut self) {
        self.current = self.first_in((Bound::Unbounded, Bound::Unbounded));
    }

    fn seek(&mut self, key: &[u8]) {
        self.current = if self.reverse {
            self.first_in((Bound::Unbounded, Bound::Included(key)))
        } else {
            self.first_in((Bound::Included(key), Bound::Unbounded))
        };
    }

    fn next(&mut self) {
        let Some((cur, _)) = self.current.take() else {
            return;
        };
        self.current = if self.reverse {
            self.first_in((Bound::Unbounded, Bound::Excluded(cur.as_slice())))
        } else {
            self.first_in((Bound::Excluded(cur.as_slice()), Bound::Unbounded))
        };
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        &self.current.as_ref().expect("iterator exhausted").0
    }

    fn value(&self) -> Position {
        self.current.as_ref().expect("iterator exhausted").1
    }
}
