use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

use log::debug;

use crate::config::{Options, META_PAGE_NUM};
use crate::error::Result;
use crate::freelist::FreeList;
use crate::meta::Meta;
use crate::node::{Item, Node};
use crate::page::Page;

/// Owns the backing file and the threshold parameters. Every page read/write in the store goes
/// through here.
pub struct Dal {
    file: File,
    pub options: Options,
    pub free_list: FreeList,
    pub meta: Meta,
}

impl Dal {
    pub fn open(path: &Path, options: Options) -> Result<Dal> {
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut dal = Dal {
            file,
            options,
            free_list: FreeList::new(),
            meta: Meta {
                root: 0,
                free_list_page: 0,
            },
        };

        if existed {
            dal.meta = dal.read_meta()?;
            dal.free_list = dal.read_free_list()?;
            debug!(
                "opened existing store at {:?}, root={} free_list_page={}",
                path, dal.meta.root, dal.meta.free_list_page
            );
        } else {
            let free_list_page = dal.free_list.get_next_page();
            dal.meta.free_list_page = free_list_page;

            let root = Node::new_leaf(Vec::new());
            let root = dal.write_node(root)?;
            dal.meta.root = root.page_num;

            // The free list's page must be written *after* every allocation it needs to account
            // for, including the root's -- otherwise a reopen before any write tx commits would
            // read a stale `max_page` and hand the root's page back out as free.
            dal.write_free_list()?;
            dal.write_meta()?;
            debug!("initialized new store at {:?}", path);
        }

        Ok(dal)
    }

    pub fn close(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn read_page(&self, num: u64) -> Result<Page> {
        let mut page = Page::new(num, self.options.page_size);
        self.file
            .read_exact_at(&mut page.data, self.options.page_size as u64 * num)?;
        Ok(page)
    }

    pub fn write_page(&self, page: &Page) -> Result<()> {
        self.file
            .write_all_at(&page.data, self.options.page_size as u64 * page.num)?;
        Ok(())
    }

    pub fn get_node(&self, num: u64) -> Result<Node> {
        let page = self.read_page(num)?;
        let mut node = Node::deserialize(&page.data)?;
        node.page_num = num;
        Ok(node)
    }

    /// Assigns a fresh page number if the node doesn't have one yet, serializes, and writes it.
    pub fn write_node(&mut self, mut node: Node) -> Result<Node> {
        if node.page_num == META_PAGE_NUM {
            node.page_num = self.free_list.get_next_page();
        }
        let mut page = Page::new(node.page_num, self.options.page_size);
        node.serialize(&mut page.data)?;
        self.write_page(&page)?;
        Ok(node)
    }

    pub fn new_node(&mut self, items: Vec<Item>, children: Vec<u64>) -> Node {
        let page_num = self.free_list.get_next_page();
        Node {
            page_num,
            items,
            children,
        }
    }

    pub fn delete_node(&mut self, num: u64) {
        self.free_list.release_page(num);
    }

    pub fn read_free_list(&self) -> Result<FreeList> {
        let page = self.read_page(self.meta.free_list_page)?;
        Ok(FreeList::deserialize(&page.data))
    }

    pub fn write_free_list(&mut self) -> Result<()> {
        let mut page = Page::new(self.meta.free_list_page, self.options.page_size);
        self.free_list.serialize(&mut page.data)?;
        self.write_page(&page)
    }

    pub fn read_meta(&self) -> Result<Meta> {
        let page = self.read_page(META_PAGE_NUM)?;
        Meta::deserialize(&page.data)
    }

    pub fn write_meta(&self) -> Result<()> {
        let mut page = Page::new(META_PAGE_NUM, self.options.page_size);
        self.meta.serialize(&mut page.data);
        self.write_page(&page)
    }

    pub fn max_threshold(&self) -> usize {
        (self.options.max_fill_percent * self.options.page_size as f32) as usize
    }

    pub fn min_threshold(&self) -> usize {
        (self.options.min_fill_percent * self.options.page_size as f32) as usize
    }

    pub fn is_over_populated(&self, node: &Node) -> bool {
        node.serialized_size() > self.max_threshold()
    }

    pub fn is_under_populated(&self, node: &Node) -> bool {
        node.serialized_size() < self.min_threshold()
    }

    /// Finds the first index `i + 1` such that the running prefix size exceeds
    /// `max_threshold()` and `i` is not the node's last item.
    pub fn get_split_index(&self, node: &Node) -> Option<usize> {
        let mut size = 3usize; // header
        let max = self.max_threshold();
        for (i, item) in node.items.iter().enumerate() {
            size += 1 + item.key.len() + 1 + item.value.len() + 2 + 8;
            if size > max && i < node.items.len() - 1 {
                return Some(i + 1);
            }
        }
        None
    }
}
