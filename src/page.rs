/// A fixed-size buffer tagged with the page number it was read from (or will be written to).
#[derive(Debug, Clone)]
pub struct Page {
    pub num: u64,
    pub data: Vec<u8>,
}

impl Page {
    pub fn new(num: u64, page_size: usize) -> Page {
        Page {
            num,
            data: vec![0u8; page_size],
        }
    }
}
