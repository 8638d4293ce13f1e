use std::collections::HashMap;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use log::{debug, warn};

use crate::btree;
use crate::collection::Collection;
use crate::dal::Dal;
use crate::error::{Error, Result};
use crate::node::{Item, Node};

#[derive(PartialEq, Debug, Clone, Copy)]
pub enum TransactionStatus {
    InProgress,
    Committed,
    RolledBack,
}

/// Either a shared or an exclusive lock on the DAL. Only the exclusive variant allows mutation;
/// every mutating entry point on `Transaction` checks `write` first, so `dal_mut` reaching the
/// `Read` arm would indicate a logic error upstream rather than a real runtime possibility.
enum Guard<'db> {
    Read(RwLockReadGuard<'db, Dal>),
    Write(RwLockWriteGuard<'db, Dal>),
}

impl<'db> Guard<'db> {
    fn dal(&self) -> &Dal {
        match self {
            Guard::Read(g) => g,
            Guard::Write(g) => g,
        }
    }

    fn dal_mut(&mut self) -> &mut Dal {
        match self {
            Guard::Write(g) => g,
            Guard::Read(_) => unreachable!("mutating a read transaction's DAL"),
        }
    }
}

/// A reader or writer view over the store. Buffers dirty nodes in memory; nothing is durable
/// until `commit` returns.
pub struct Transaction<'db> {
    status: TransactionStatus,
    write: bool,
    guard: Guard<'db>,
    dirty_nodes: HashMap<u64, Node>,
    allocated_page_nums: Vec<u64>,
    pages_to_delete: Vec<u64>,
    collections_root: u64,
    collections_root_dirty: bool,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new_read(guard: RwLockReadGuard<'db, Dal>) -> Transaction<'db> {
        let collections_root = guard.meta.root;
        Transaction {
            status: TransactionStatus::InProgress,
            write: false,
            guard: Guard::Read(guard),
            dirty_nodes: HashMap::new(),
            allocated_page_nums: Vec::new(),
            pages_to_delete: Vec::new(),
            collections_root,
            collections_root_dirty: false,
        }
    }

    pub(crate) fn new_write(guard: RwLockWriteGuard<'db, Dal>) -> Transaction<'db> {
        let collections_root = guard.meta.root;
        Transaction {
            status: TransactionStatus::InProgress,
            write: true,
            guard: Guard::Write(guard),
            dirty_nodes: HashMap::new(),
            allocated_page_nums: Vec::new(),
            pages_to_delete: Vec::new(),
            collections_root,
            collections_root_dirty: false,
        }
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    fn ensure_in_progress(&self) -> Result<()> {
        if self.status != TransactionStatus::InProgress {
            return Err(Error::TransactionFinished);
        }
        Ok(())
    }

    fn ensure_write(&self) -> Result<()> {
        if !self.write {
            return Err(Error::WriteInsideReadTx);
        }
        Ok(())
    }

    pub(crate) fn get_node(&self, page_num: u64) -> Result<Node> {
        if let Some(node) = self.dirty_nodes.get(&page_num) {
            return Ok(node.clone());
        }
        self.guard.dal().get_node(page_num)
    }

    pub(crate) fn new_node(&mut self, items: Vec<Item>, children: Vec<u64>) -> Node {
        let node = self.guard.dal_mut().new_node(items, children);
        self.allocated_page_nums.push(node.page_num);
        node
    }

    pub(crate) fn write_node(&mut self, node: Node) -> Result<Node> {
        let node = if node.page_num == 0 {
            let written = self.guard.dal_mut().new_node(node.items, node.children);
            self.allocated_page_nums.push(written.page_num);
            written
        } else {
            node
        };
        self.dirty_nodes.insert(node.page_num, node.clone());
        Ok(node)
    }

    pub(crate) fn delete_node(&mut self, page_num: u64) {
        self.dirty_nodes.remove(&page_num);
        self.pages_to_delete.push(page_num);
    }

    pub(crate) fn is_over_populated(&self, node: &Node) -> bool {
        self.guard.dal().is_over_populated(node)
    }

    pub(crate) fn is_under_populated(&self, node: &Node) -> bool {
        self.guard.dal().is_under_populated(node)
    }

    pub(crate) fn get_split_index(&self, node: &Node) -> Option<usize> {
        self.guard.dal().get_split_index(node)
    }

    pub(crate) fn collections_root(&self) -> u64 {
        self.collections_root
    }

    pub(crate) fn set_collections_root(&mut self, root: u64) {
        if root != self.collections_root {
            self.collections_root = root;
            self.collections_root_dirty = true;
        }
    }

    /// Looks up a named collection in the top-level collections tree.
    pub fn get_collection<'tx>(&'tx mut self, name: &[u8]) -> Result<Collection<'tx, 'db>> {
        self.ensure_in_progress()?;
        Collection::load(self, name)
    }

    /// Creates a new, empty named collection. Write transactions only.
    pub fn create_collection<'tx>(&'tx mut self, name: &[u8]) -> Result<Collection<'tx, 'db>> {
        self.ensure_in_progress()?;
        self.ensure_write()?;
        Collection::create(self, name)
    }

    /// Removes a named collection (and its record) from the top-level collections tree.
    pub fn delete_collection(&mut self, name: &[u8]) -> Result<()> {
        self.ensure_in_progress()?;
        self.ensure_write()?;
        let root = self.collections_root();
        let new_root = btree::remove(self, root, name)?;
        self.set_collections_root(new_root);
        Ok(())
    }

    /// Writes every dirty node, releases deleted pages, and (if the collections root moved)
    /// rewrites Meta, followed by the free list.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_in_progress()?;
        if !self.write {
            self.status = TransactionStatus::Committed;
            return Ok(());
        }

        let dal = self.guard.dal_mut();
        for node in self.dirty_nodes.values() {
            dal.write_node(node.clone())?;
        }
        for page in &self.pages_to_delete {
            dal.delete_node(*page);
        }
        if self.collections_root_dirty {
            dal.meta.root = self.collections_root;
            dal.write_meta()?;
        }
        dal.write_free_list()?;

        debug!(
            "committed write transaction: {} dirty nodes, {} deleted pages",
            self.dirty_nodes.len(),
            self.pages_to_delete.len()
        );
        self.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Returns every page allocated by this transaction back to the free list and discards
    /// buffered writes without touching disk.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_in_progress()?;
        if self.write {
            let dal = self.guard.dal_mut();
            for page in self.allocated_page_nums.drain(..) {
                dal.free_list.release_page(page);
            }
            self.dirty_nodes.clear();
            self.pages_to_delete.clear();
            debug!("rolled back write transaction");
        }
        self.status = TransactionStatus::RolledBack;
        Ok(())
    }
}

impl<'db> Drop for Transaction<'db> {
    fn drop(&mut self) {
        if self.status == TransactionStatus::InProgress {
            if let Err(e) = self.rollback() {
                warn!("implicit rollback on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Options;
    use crate::db::Db;
    use tempfile::TempDir;

    #[test]
    fn rollback_restores_free_list_in_lifo_order() {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("t.db"), Options::default()).unwrap();

        let mut tx = db.write_tx();
        let mut allocated = Vec::new();
        for _ in 0..5 {
            let node = tx.new_node(Vec::new(), Vec::new());
            allocated.push(node.page_num);
        }
        tx.rollback().unwrap();

        let mut tx2 = db.write_tx();
        let mut reused = Vec::new();
        for _ in 0..5 {
            let node = tx2.new_node(Vec::new(), Vec::new());
            reused.push(node.page_num);
        }

        let mut expected = allocated.clone();
        expected.reverse();
        assert_eq!(reused, expected, "freed pages must be reused most-recently-released first");
    }
}
