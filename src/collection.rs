use crate::btree;
use crate::bytes_util::copy_bytes;
use crate::error::{Error, Result};
use crate::node::Item;
use crate::transaction::Transaction;

/// A named B-tree, rooted at a page, borrowed from its owning transaction for the duration of
/// its use. Holds no page of its own beyond `root` -- every read or write goes through `tx`.
pub struct Collection<'tx, 'db> {
    tx: &'tx mut Transaction<'db>,
    name: Vec<u8>,
    root: u64,
    counter: u64,
}

/// Fixed 16-byte record stored as the value for a collection's name in the top-level collections
/// tree: `u64 root || u64 counter`, big-endian.
fn serialize_record(root: u64, counter: u64) -> Vec<u8> {
    let mut buf = vec![0u8; 16];
    buf[0..8].copy_from_slice(&root.to_be_bytes());
    buf[8..16].copy_from_slice(&counter.to_be_bytes());
    buf
}

fn deserialize_record(buf: &[u8]) -> (u64, u64) {
    let root = u64::from_be_bytes(buf[0..8].try_into().unwrap());
    let counter = u64::from_be_bytes(buf[8..16].try_into().unwrap());
    (root, counter)
}

impl<'tx, 'db> Collection<'tx, 'db> {
    pub(crate) fn load(tx: &'tx mut Transaction<'db>, name: &[u8]) -> Result<Collection<'tx, 'db>> {
        let collections_root = tx.collections_root();
        let found = btree::find_key(tx, collections_root, name, true)?;
        let index = found.index.ok_or(Error::CollectionNotFound)?;
        let (root, counter) = deserialize_record(&found.node.items[index].value);
        Ok(Collection {
            tx,
            name: copy_bytes(name),
            root,
            counter,
        })
    }

    pub(crate) fn create(tx: &'tx mut Transaction<'db>, name: &[u8]) -> Result<Collection<'tx, 'db>> {
        let leaf = tx.new_node(Vec::new(), Vec::new());
        let leaf = tx.write_node(leaf)?;
        let root = leaf.page_num;
        let counter = 0u64;

        let record = Item::new(name, &serialize_record(root, counter))?;
        let collections_root = tx.collections_root();
        let new_collections_root = btree::put(tx, collections_root, record)?;
        tx.set_collections_root(new_collections_root);

        Ok(Collection {
            tx,
            name: copy_bytes(name),
            root,
            counter,
        })
    }

    fn persist_record(&mut self) -> Result<()> {
        let record = Item::new(&self.name, &serialize_record(self.root, self.counter))?;
        let collections_root = self.tx.collections_root();
        let new_collections_root = btree::put(self.tx, collections_root, record)?;
        self.tx.set_collections_root(new_collections_root);
        Ok(())
    }

    /// Inserts or overwrites `key` with `value`. Write transactions only.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if !self.tx.is_write() {
            return Err(Error::WriteInsideReadTx);
        }
        let item = Item::new(key, value)?;
        let new_root = btree::put(self.tx, self.root, item)?;
        if new_root != self.root {
            self.root = new_root;
            self.persist_record()?;
        }
        Ok(())
    }

    /// Looks up `key`. Returns `Error::NotFound` if absent.
    pub fn find(&mut self, key: &[u8]) -> Result<Vec<u8>> {
        if self.root == 0 {
            return Err(Error::NotFound);
        }
        let found = btree::find_key(self.tx, self.root, key, true)?;
        let index = found.index.ok_or(Error::NotFound)?;
        Ok(found.node.items[index].value.clone())
    }

    /// Removes `key` if present. A no-op if absent. Write transactions only.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        if !self.tx.is_write() {
            return Err(Error::WriteInsideReadTx);
        }
        let new_root = btree::remove(self.tx, self.root, key)?;
        if new_root != self.root {
            self.root = new_root;
            self.persist_record()?;
        }
        Ok(())
    }

    /// Returns the next value of this collection's monotonic counter, persisting the increment.
    /// Write transactions only; read transactions always see 0 and do not persist.
    pub fn id(&mut self) -> Result<u64> {
        if !self.tx.is_write() {
            return Ok(0);
        }
        let id = self.counter;
        self.counter += 1;
        self.persist_record()?;
        Ok(id)
    }
}
