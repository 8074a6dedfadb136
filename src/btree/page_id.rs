/// A B+tree page number. Page 0 is reserved for the root.
pub type PageId = u32;

/// Sentinel written on disk for "no page" (child pointer, sibling pointer).
pub const NO_PAGE: i32 = -1;
