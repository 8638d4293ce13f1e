use crate::config::META_PAGE_NUM;
use crate::error::{Error, Result};

/// Allocator of page numbers. Page 0 is reserved for Meta; every other page is either reachable
/// from the tree, sitting on `released` awaiting reuse, or has never been handed out (beyond
/// `max_page`).
///
/// New page numbers are first given out from `released` to avoid growing the file; if it's
/// empty, `max_page` is incremented and the file grows by one page.
#[derive(Debug, Clone)]
pub struct FreeList {
    max_page: u64,
    released: Vec<u64>,
}

impl Default for FreeList {
    fn default() -> Self {
        FreeList {
            max_page: META_PAGE_NUM,
            released: Vec::new(),
        }
    }
}

impl FreeList {
    pub fn new() -> FreeList {
        FreeList::default()
    }

    pub fn get_next_page(&mut self) -> u64 {
        if let Some(page) = self.released.pop() {
            page
        } else {
            self.max_page += 1;
            self.max_page
        }
    }

    pub fn release_page(&mut self, page: u64) {
        self.released.push(page);
    }

    /// Big-endian `u16 max_page`, `u16 released_count`, then `released_count` big-endian `u64`s.
    ///
    /// This caps a single file's lifetime page allocations at 65535; `max_page` or
    /// `released.len()` overflowing that width is a declared format limit, surfaced as a typed
    /// error rather than silently truncated or widened.
    pub fn serialize(&self, buf: &mut [u8]) -> Result<usize> {
        let max_page: u16 = self
            .max_page
            .try_into()
            .map_err(|_| Error::FreeListCapacityExceeded)?;
        let count: u16 = self
            .released
            .len()
            .try_into()
            .map_err(|_| Error::FreeListCapacityExceeded)?;

        let mut pos: usize = 0;
        buf[pos..pos + 2].copy_from_slice(&max_page.to_be_bytes());
        pos += 2;
        buf[pos..pos + 2].copy_from_slice(&count.to_be_bytes());
        pos += 2;
        for page in self.released.iter() {
            buf[pos..pos + 8].copy_from_slice(&page.to_be_bytes());
            pos += 8;
        }
        Ok(pos)
    }

    pub fn deserialize(buf: &[u8]) -> FreeList {
        let mut pos: usize = 0;

        let max_page = u16::from_be_bytes(buf[pos..pos + 2].try_into().unwrap()) as u64;
        pos += 2;

        let count = u16::from_be_bytes(buf[pos..pos + 2].try_into().unwrap()) as usize;
        pos += 2;

        let mut released = Vec::with_capacity(count);
        for _ in 0..count {
            released.push(u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap()));
            pos += 8;
        }

        FreeList { max_page, released }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifo_reuse() {
        let mut fl = FreeList::new();
        assert_eq!(fl.get_next_page(), 1);
        assert_eq!(fl.get_next_page(), 2);
        fl.release_page(1);
        fl.release_page(2);
        assert_eq!(fl.get_next_page(), 2);
        assert_eq!(fl.get_next_page(), 1);
        assert_eq!(fl.get_next_page(), 3);
    }

    #[test]
    fn round_trip() {
        let mut fl = FreeList::new();
        fl.get_next_page();
        fl.get_next_page();
        fl.release_page(1);
        let mut buf = [0u8; 64];
        let n = fl.serialize(&mut buf).unwrap();
        let back = FreeList::deserialize(&buf[..n]);
        assert_eq!(back.max_page, fl.max_page);
        assert_eq!(back.released, fl.released);
    }
}
