//! Memory layout constants for reflection runtime structures
//!
//! Only layouts that stay fixed across builds live here. Everything that moves between
//! builds is discovered at runtime and stored in the offset table.

/// Plausible user-space address window for 64-bit targets
pub mod address {
    /// Lowest address treated as a real pointer (first 64 KiB are never mapped)
    pub const MIN_USER: u64 = 0x10000;
    /// Highest canonical user-space address
    pub const MAX_USER: u64 = 0x7FFF_FFFF_FFFF;
}

/// Global object array header, segmented (chunked) encoding
pub mod chunked_objects {
    pub const OBJECTS: usize = 0x00;
    pub const MAX_ELEMENTS: usize = 0x10;
    pub const NUM_ELEMENTS: usize = 0x14;
    pub const MAX_CHUNKS: usize = 0x18;
    pub const NUM_CHUNKS: usize = 0x1C;
    pub const HEADER_SIZE: usize = 0x20;

    pub const NUM_CHUNKS_RANGE: std::ops::RangeInclusive<u32> = 1..=0x14;
    pub const MAX_CHUNKS_RANGE: std::ops::RangeInclusive<u32> = 6..=0x5FF;
    pub const MIN_NUM_ELEMENTS: u32 = 0x800;
    pub const MIN_MAX_ELEMENTS: u32 = 0x10000;
    pub const ELEMENTS_PER_CHUNK_RANGE: std::ops::RangeInclusive<u32> = 0x8000..=0x80000;
    /// Chunk pointers verified during anchor validation
    pub const VERIFIED_CHUNKS: u32 = 3;
}

/// Global object array header, flat encoding
pub mod flat_objects {
    pub const OBJECTS: usize = 0x00;
    pub const MAX_ELEMENTS: usize = 0x08;
    pub const NUM_ELEMENTS: usize = 0x0C;
    pub const HEADER_SIZE: usize = 0x10;

    pub const MIN_NUM_ELEMENTS: u32 = 0x1000;
    pub const MAX_MAX_ELEMENTS: u32 = 0x40_0000;
    /// Element whose self-reported index must match its position
    pub const WITNESS_INDEX: u64 = 5;
    pub const WITNESS_STRIDES: [u64; 2] = [0x18, 0x10];
    pub const WITNESS_INDEX_OFFSETS: [u64; 2] = [0x0C, 0x08];
}

/// Per-element record of the object array
pub mod object_item {
    pub const DEFAULT_STRIDE: u32 = 0x18;
    pub const DEFAULT_POINTER_OFFSET: u32 = 0;
    /// Pointer offset search: 4-byte steps below this bound
    pub const POINTER_OFFSET_LIMIT: u32 = 0x20;
    pub const MIN_STRIDE: u32 = 12;
    pub const MAX_STRIDE: u32 = 0x38;
}

/// Interned-string pool, block-pooled encoding
pub mod name_pool {
    pub const CURRENT_BLOCK: usize = 0x08;
    pub const CURRENT_CURSOR: usize = 0x0C;
    pub const BLOCKS: u64 = 0x10;
    pub const HEADER_SIZE: usize = 0x18;

    pub const MAX_CURRENT_BLOCK: u32 = 8192;
    pub const MAX_CURSOR: u32 = 0x40000;
    pub const BLOCK_OFFSET_BITS: u32 = 16;
    pub const ENTRY_STRIDE: u32 = 2;
    /// Bytes of the first block searched for the "None" entry
    pub const NONE_SEARCH_BYTES: usize = 64;

    /// Entry header: bit 0 wide flag, bits 6.. length
    pub const ENTRY_HEADER_SIZE: u64 = 2;
    pub const WIDE_FLAG: u16 = 1;
    pub const LENGTH_SHIFT: u32 = 6;
}

/// Interned-string pool, chunked array encoding
pub mod name_array {
    pub const CHUNKS: usize = 0x00;
    pub const NUM_ELEMENTS: usize = 0x08;
    pub const HEADER_SIZE: usize = 0x10;

    pub const NUM_ELEMENTS_RANGE: std::ops::RangeInclusive<i32> = 100..=5_000_000;
    pub const ELEMENTS_PER_CHUNK: u32 = 16384;
    /// Sub-offsets tried for the first entry while locating the pool
    pub const FIRST_ENTRY_OFFSETS: [u64; 5] = [0x10, 0x0C, 0x08, 0x06, 0x04];
    /// Header sizes tried while decoding entries
    pub const ENTRY_STRING_OFFSETS: [u64; 3] = [0x10, 0x0C, 0x08];
}

/// Interned name value embedded in records
pub mod name {
    pub const COMPARISON_INDEX: u64 = 0x00;
    pub const NUMBER: u64 = 0x04;
    pub const SIZE: u64 = 0x08;
    pub const MAX_LENGTH: usize = 1024;
    /// Upper bound on a believable comparison index
    pub const MAX_COMPARISON_INDEX: i32 = 2_000_000;
    pub const NONE: &str = "None";
}

/// Dynamic array header (`data`, `count`, `max`)
pub mod array {
    pub const DATA: u64 = 0x00;
    pub const COUNT: u64 = 0x08;
    pub const MAX: u64 = 0x0C;
}

/// Object flag bits referenced by discovery
pub mod object_flags {
    pub const CLASS_DEFAULT_OBJECT: i32 = 0x10;
}

/// Function flag bits referenced by discovery
pub mod function_flags {
    pub const NATIVE: u32 = 0x400;
    pub const PUBLIC: u32 = 0x20000;
    /// Immediate tested against the flags field inside the event dispatcher
    pub const DISPATCH_CHECK_NATIVE: u32 = 0x400;
    pub const DISPATCH_CHECK_NET: u32 = 0x40_0000;
}

/// Bounds for pointer chain walks
pub mod walk {
    pub const MAX_DEPTH: usize = 64;
}
