//! Free functions implementing the B-tree algorithm: search, insertion with split, and deletion
//! with rotate/merge rebalancing. These take the owning transaction as an explicit parameter
//! rather than having `Node` hold a back-reference to it -- see the design notes in
//! `DESIGN.md` for why.

use log::trace;

use crate::error::{Error, Result};
use crate::node::{Item, Node};
use crate::transaction::Transaction;

/// Result of a lookup: the index within the leaf/insertion-point node, the node itself, and the
/// chain of child indices taken from the root down to (but not including) that node.
pub struct FindResult {
    pub index: Option<usize>,
    pub node: Node,
    pub ancestor_indexes: Vec<usize>,
}

/// Descends from `root_page` looking for `key`. If `exact` is false and the key is absent, the
/// returned index is the insertion slot in the leaf reached.
pub fn find_key(tx: &mut Transaction, root_page: u64, key: &[u8], exact: bool) -> Result<FindResult> {
    let mut ancestor_indexes = Vec::new();
    let mut current = tx.get_node(root_page)?;

    loop {
        let (found, i) = current.find_key_in_node(key);
        if found {
            return Ok(FindResult {
                index: Some(i),
                node: current,
                ancestor_indexes,
            });
        }
        if current.is_leaf() {
            return Ok(FindResult {
                index: if exact { None } else { Some(i) },
                node: current,
                ancestor_indexes,
            });
        }
        ancestor_indexes.push(i);
        let child_page = current.children[i];
        current = tx.get_node(child_page)?;
    }
}

/// Resolves a chain of child indexes, starting at `root_page`, into the actual node objects
/// along that path (root first). Reads go through `tx.get_node`, so any node already staged in
/// the transaction's dirty map is picked up automatically.
fn path_nodes(tx: &mut Transaction, root_page: u64, ancestor_indexes: &[usize]) -> Result<Vec<Node>> {
    let mut nodes = Vec::with_capacity(ancestor_indexes.len() + 1);
    let mut current = tx.get_node(root_page)?;
    for &i in ancestor_indexes {
        nodes.push(current.clone());
        let child_page = current.children[i];
        current = tx.get_node(child_page)?;
    }
    nodes.push(current);
    Ok(nodes)
}

/// Inserts or overwrites `item` in the tree rooted at `root_page`. Returns the (possibly new)
/// root page number.
pub fn put(tx: &mut Transaction, root_page: u64, item: Item) -> Result<u64> {
    if root_page == 0 {
        let leaf = tx.new_node(vec![item], Vec::new());
        let leaf = tx.write_node(leaf)?;
        return Ok(leaf.page_num);
    }

    let found = find_key(tx, root_page, &item.key, false)?;
    let mut target = found.node;
    let (exists, i) = target.find_key_in_node(&item.key);
    if exists {
        target.items[i] = item;
    } else {
        target.items.insert(i, item);
    }
    tx.write_node(target)?;

    let mut path = path_nodes(tx, root_page, &found.ancestor_indexes)?;

    // Walk from the deepest ancestor up to the root, splitting any over-populated child.
    for depth in (0..path.len() - 1).rev() {
        let child_index = found.ancestor_indexes[depth];
        let child_page = path[depth].children[child_index];
        let child = tx.get_node(child_page)?;
        if tx.is_over_populated(&child) {
            let parent = split(tx, path[depth].clone(), child, child_index)?;
            path[depth] = parent;
        }
    }

    let mut new_root_page = root_page;
    if let Some(root) = path.first() {
        let root = tx.get_node(root.page_num)?;
        if tx.is_over_populated(&root) {
            let promoted = tx.new_node(Vec::new(), vec![root.page_num]);
            let promoted = split(tx, promoted, root, 0)?;
            new_root_page = promoted.page_num;
        }
    }

    Ok(new_root_page)
}

/// Splits `child` (the node found at `parent.children[index_in_parent]`) in two, promoting its
/// middle item into `parent`. Returns the written, updated parent.
fn split(tx: &mut Transaction, mut parent: Node, mut child: Node, index_in_parent: usize) -> Result<Node> {
    let split_index = tx
        .get_split_index(&child)
        .ok_or(Error::CannotSplit)?;

    let mid = child.items[split_index].clone();

    let right_items = child.items.split_off(split_index + 1);
    // drop the promoted middle item from the left side
    child.items.truncate(split_index);

    let right_children = if child.is_leaf() {
        Vec::new()
    } else {
        child.children.split_off(split_index + 1)
    };

    let right_node = tx.new_node(right_items, right_children);
    let right_node = tx.write_node(right_node)?;

    let child = tx.write_node(child)?;

    parent.items.insert(index_in_parent, mid);
    parent.children.insert(index_in_parent + 1, right_node.page_num);
    parent.children[index_in_parent] = child.page_num;

    trace!(
        "split page {} at index {} -> new right page {}",
        child.page_num,
        split_index,
        right_node.page_num
    );

    tx.write_node(parent)
}

/// Removes `key` from the tree rooted at `root_page` if present. Returns the (possibly new) root
/// page number.
pub fn remove(tx: &mut Transaction, root_page: u64, key: &[u8]) -> Result<u64> {
    if root_page == 0 {
        return Ok(root_page);
    }

    let found = find_key(tx, root_page, key, true)?;
    let index = match found.index {
        Some(i) => i,
        None => return Ok(root_page),
    };

    let mut target = found.node;
    let mut ancestor_indexes = found.ancestor_indexes.clone();

    if target.is_leaf() {
        target.items.remove(index);
        tx.write_node(target)?;
    } else {
        // Inorder-predecessor swap: items[index] separates children[index] and
        // children[index + 1], so the predecessor is the largest key in the children[index]
        // subtree -- descend always taking the last child until reaching a leaf.
        ancestor_indexes.push(index);
        let mut pred = tx.get_node(target.children[index])?;
        while !pred.is_leaf() {
            ancestor_indexes.push(pred.children.len() - 1);
            pred = tx.get_node(*pred.children.last().unwrap())?;
        }
        let predecessor_item = pred.items.pop().expect("leaf predecessor has an item");
        target.items[index] = predecessor_item;

        tx.write_node(target)?;
        tx.write_node(pred)?;
    }

    let mut path = path_nodes(tx, root_page, &ancestor_indexes)?;

    for depth in (0..path.len() - 1).rev() {
        let child_index = ancestor_indexes[depth];
        let child_page = path[depth].children[child_index];
        let child = tx.get_node(child_page)?;
        if tx.is_under_populated(&child) {
            let parent = rebalance_remove(tx, path[depth].clone(), child_index)?;
            path[depth] = parent;
        }
    }

    let root = tx.get_node(path[0].page_num)?;
    if root.items.is_empty() && !root.is_leaf() {
        let new_root_page = root.children[0];
        tx.delete_node(root.page_num);
        return Ok(new_root_page);
    }

    Ok(path[0].page_num)
}

/// Rebalances `parent.children[index]`, which is under-populated, by rotating an element from a
/// sibling that can spare one, or merging with a sibling otherwise. Returns the written, updated
/// parent.
fn rebalance_remove(tx: &mut Transaction, mut parent: Node, index: usize) -> Result<Node> {
    if index > 0 {
        let left = tx.get_node(parent.children[index - 1])?;
        if tx.get_split_index(&left).is_some() {
            return rotate_right(tx, parent, index);
        }
    }
    if index < parent.items.len() {
        let right = tx.get_node(parent.children[index + 1])?;
        if tx.get_split_index(&right).is_some() {
            return rotate_left(tx, parent, index);
        }
    }

    if index == 0 {
        merge(tx, &mut parent, 0)?;
    } else {
        merge(tx, &mut parent, index - 1)?;
    }
    tx.write_node(parent)
}

/// Borrows the last element of `children[index - 1]` through the parent into `children[index]`.
/// The separating item is `parent.items[index - 1]` -- the standard B-tree invariant that
/// `parent.items[i]` separates `children[i]` and `children[i+1]`.
fn rotate_right(tx: &mut Transaction, mut parent: Node, index: usize) -> Result<Node> {
    let mut left = tx.get_node(parent.children[index - 1])?;
    let mut unbalanced = tx.get_node(parent.children[index])?;

    let borrowed = left.items.pop().expect("left sibling can spare an element");
    let separator = parent.items[index - 1].clone();
    parent.items[index - 1] = borrowed;
    unbalanced.items.insert(0, separator);

    if !left.is_leaf() {
        let child = left.children.pop().expect("internal node has a trailing child");
        unbalanced.children.insert(0, child);
    }

    tx.write_node(left)?;
    tx.write_node(unbalanced)?;
    Ok(parent)
}

/// Symmetric to [`rotate_right`]: borrows the first element of `children[index + 1]` through the
/// parent into `children[index]`. The separator is `parent.items[index]`.
fn rotate_left(tx: &mut Transaction, mut parent: Node, index: usize) -> Result<Node> {
    let mut right = tx.get_node(parent.children[index + 1])?;
    let mut unbalanced = tx.get_node(parent.children[index])?;

    let borrowed = right.items.remove(0);
    let separator = parent.items[index].clone();
    parent.items[index] = borrowed;
    unbalanced.items.push(separator);

    if !right.is_leaf() {
        let child = right.children.remove(0);
        unbalanced.children.push(child);
    }

    tx.write_node(right)?;
    tx.write_node(unbalanced)?;
    Ok(parent)
}

/// Merges `children[left_index + 1]` into `children[left_index]`, pulling the separating item
/// down from `parent`. Mutates `parent`'s items/children in place; does not write `parent`.
fn merge(tx: &mut Transaction, parent: &mut Node, left_index: usize) -> Result<()> {
    let mut left = tx.get_node(parent.children[left_index])?;
    let right = tx.get_node(parent.children[left_index + 1])?;

    let separator = parent.items.remove(left_index);
    left.items.push(separator);
    left.items.extend(right.items);
    if !left.is_leaf() {
        left.children.extend(right.children);
    }

    parent.children.remove(left_index + 1);
    tx.delete_node(right.page_num);
    tx.write_node(left)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use crate::db::Db;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn open_db(options: Options) -> (Db, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Db::open(dir.path().join("t.db"), options).unwrap();
        (db, dir)
    }

    fn collect_inorder(tx: &Transaction, page: u64, out: &mut Vec<Vec<u8>>) {
        let node = tx.get_node(page).unwrap();
        if node.is_leaf() {
            out.extend(node.items.iter().map(|item| item.key.clone()));
        } else {
            for i in 0..node.items.len() {
                collect_inorder(tx, node.children[i], out);
                out.push(node.items[i].key.clone());
            }
            collect_inorder(tx, *node.children.last().unwrap(), out);
        }
    }

    fn assert_leaves_under_threshold(tx: &Transaction, page: u64) {
        let node = tx.get_node(page).unwrap();
        if node.is_leaf() {
            assert!(!tx.is_over_populated(&node));
        } else {
            for &child in &node.children {
                assert_leaves_under_threshold(tx, child);
            }
        }
    }

    #[test]
    fn lexicographic_ordering_with_shared_prefixes() {
        let (db, _dir) = open_db(Options::default());
        let mut tx = db.write_tx();
        let mut root = 0u64;
        for key in [b"a".as_slice(), b"ab", b"aa", b"b"] {
            let item = Item::new(key, key).unwrap();
            root = put(&mut tx, root, item).unwrap();
        }

        let mut keys = Vec::new();
        collect_inorder(&tx, root, &mut keys);
        assert_eq!(
            keys,
            vec![b"a".to_vec(), b"aa".to_vec(), b"ab".to_vec(), b"b".to_vec()]
        );
    }

    #[test]
    fn split_on_overflow_keeps_leaves_under_threshold() {
        let options = Options {
            page_size: 4096,
            min_fill_percent: 0.5,
            max_fill_percent: 0.25,
        };
        let (db, _dir) = open_db(options);
        let mut tx = db.write_tx();
        let mut root = 0u64;
        for i in 0..64u32 {
            let key = format!("{:0>64}", i).into_bytes();
            let value = vec![b'v'; 64];
            let item = Item::new(&key, &value).unwrap();
            root = put(&mut tx, root, item).unwrap();
        }

        let root_node = tx.get_node(root).unwrap();
        assert!(
            !root_node.is_leaf(),
            "root should have split into an internal node after 64 inserts"
        );
        assert_leaves_under_threshold(&tx, root);
    }

    #[test]
    fn delete_all_keeps_tree_consistent_and_collapses_root() {
        // min < max but both close to the element size, so a handful of ~10-byte items is
        // enough to push a leaf over or under threshold -- forces real splits going in and a
        // mix of rotate/merge rebalancing coming back out.
        let options = Options {
            page_size: 256,
            min_fill_percent: 0.4,
            max_fill_percent: 0.6,
        };
        let (db, _dir) = open_db(options);
        let mut tx = db.write_tx();
        let mut root = 0u64;

        let keys: Vec<Vec<u8>> = (0..80u32).map(|i| format!("k{:04}", i).into_bytes()).collect();
        for key in &keys {
            let item = Item::new(key, key).unwrap();
            root = put(&mut tx, root, item).unwrap();
        }
        assert!(
            !tx.get_node(root).unwrap().is_leaf(),
            "80 items should have split the root at least once"
        );

        let mut deletion_order = keys.clone();
        deletion_order.sort_by(|a, b| b.cmp(a));
        let mut remaining: BTreeSet<Vec<u8>> = keys.into_iter().collect();

        for key in &deletion_order {
            root = remove(&mut tx, root, key).unwrap();
            remaining.remove(key);

            let mut observed = Vec::new();
            collect_inorder(&tx, root, &mut observed);
            let expected: Vec<Vec<u8>> = remaining.iter().cloned().collect();
            assert_eq!(observed, expected, "tree out of order after deleting {:?}", key);
        }

        assert!(remaining.is_empty());
        let root_node = tx.get_node(root).unwrap();
        assert!(root_node.is_leaf());
        assert!(root_node.items.is_empty());
    }
}
