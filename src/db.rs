use std::path::Path;
use std::sync::RwLock;

use log::debug;

use crate::config::Options;
use crate::dal::Dal;
use crate::error::Result;
use crate::transaction::Transaction;

/// An open store. Owns the on-disk file (through the DAL) and a reader-writer lock guarding it:
/// any number of read transactions may run concurrently, but at most one write transaction runs
/// at a time and excludes all readers.
pub struct Db {
    dal: RwLock<Dal>,
}

impl Db {
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Db> {
        let dal = Dal::open(path.as_ref(), options)?;
        debug!("opened store at {:?}", path.as_ref());
        Ok(Db {
            dal: RwLock::new(dal),
        })
    }

    /// Starts a read transaction. Blocks until no write transaction is active.
    pub fn read_tx(&self) -> Transaction<'_> {
        let guard = self.dal.read().expect("DAL lock poisoned");
        Transaction::new_read(guard)
    }

    /// Starts a write transaction. Blocks until no other transaction is active.
    pub fn write_tx(&self) -> Transaction<'_> {
        let guard = self.dal.write().expect("DAL lock poisoned");
        Transaction::new_write(guard)
    }

    /// Flushes the backing file.
    pub fn close(&self) -> Result<()> {
        self.dal.read().expect("DAL lock poisoned").close()
    }
}
