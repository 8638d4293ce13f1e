use crate::config::META_MAGIC;
use crate::error::{Error, Result};

/// Page 0 of the store file. Names the root of the top-level collections tree and the page
/// holding the free list.
#[derive(Debug, Clone, Copy)]
pub struct Meta {
    pub root: u64,
    pub free_list_page: u64,
}

impl Meta {
    pub fn serialize(&self, buf: &mut [u8]) {
        let mut pos: usize = 0;

        buf[pos..pos + 4].copy_from_slice(&META_MAGIC.to_be_bytes());
        pos += 4;

        buf[pos..pos + 8].copy_from_slice(&self.root.to_be_bytes());
        pos += 8;

        buf[pos..pos + 8].copy_from_slice(&self.free_list_page.to_be_bytes());
        pos += 8;

        for b in buf[pos..].iter_mut() {
            *b = 0;
        }
    }

    pub fn deserialize(buf: &[u8]) -> Result<Meta> {
        let mut pos: usize = 0;

        let magic = u32::from_be_bytes(buf[pos..pos + 4].try_into().unwrap());
        if magic != META_MAGIC {
            return Err(Error::InvalidMagic);
        }
        pos += 4;

        let root = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;

        let free_list_page = u64::from_be_bytes(buf[pos..pos + 8].try_into().unwrap());

        Ok(Meta {
            root,
            free_list_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let meta = Meta {
            root: 7,
            free_list_page: 1,
        };
        let mut buf = [0u8; 64];
        meta.serialize(&mut buf);
        let back = Meta::deserialize(&buf).unwrap();
        assert_eq!(back.root, meta.root);
        assert_eq!(back.free_list_page, meta.free_list_page);
    }

    #[test]
    fn bad_magic() {
        let buf = [0u8; 64];
        assert!(matches!(Meta::deserialize(&buf), Err(Error::InvalidMagic)));
    }
}
