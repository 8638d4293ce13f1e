/// Tunable parameters for opening a store.
///
/// `page_size` defaults to the host operating system's page size; tests that want to exercise
/// split/merge paths cheaply can override it with a small value.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub page_size: usize,
    pub min_fill_percent: f32,
    pub max_fill_percent: f32,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            page_size: page_size::get(),
            min_fill_percent: 0.5,
            max_fill_percent: 0.9,
        }
    }
}

/// Reserved page number for the Meta page.
pub const META_PAGE_NUM: u64 = 0;

/// Magic number identifying a store file, written at the start of the Meta page.
pub const META_MAGIC: u32 = 0xD00D_B00D;

/// Longest key or value the wire format can represent (single-byte length prefix).
pub const MAX_KEY_LEN: usize = u8::MAX as usize;
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;
