//! # archivefs
//!
//! A single-file, persistent, compressed archive store.
//!
//! * `record` is the on-disk data model: superblock, entry records, tree nodes.
//! * `allocator` hands out append-only byte regions from the superblock's watermark.
//! * `block_io` is the fixed-layout read/write layer over a `Read + Write + Seek` handle.
//! * `codec` is the canonical-construction Huffman compressor/decompressor.
//! * `tree` is the disk-resident, offset-addressed red-black index.
//! * `archive` is the facade binding all of the above into `Archive`.
//!
//! ## Example
//!
//! ```rs
//! use archivefs::Archive;
//! let mut archive = Archive::init("my_archive.bin").expect("init failed");
//! archive.put("notes.txt", b"hello, archive").expect("put failed");
//! let data = archive.get("notes.txt").expect("get failed");
//! assert_eq!(data, b"hello, archive");
//! ```

pub mod allocator;
pub mod archive;
pub mod block_io;
pub mod codec;
pub mod record;
pub mod tree;

pub use archive::{Archive, ListedEntry};

/// Errors produced by any layer of the archive.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a valid archivefs file (bad magic)")]
    BadMagic,

    #[error("the stream is corrupt or truncated")]
    CorruptStream,

    #[error("entry name already exists: {0}")]
    DuplicateName(String),

    #[error("no such entry: {0}")]
    NotFound(String),

    #[error("name '{name}' exceeds the {max}-byte limit")]
    NameTooLong { name: String, max: usize },
}

/// Exit codes returned by the `archivefs` CLI, mirroring this crate's error variants.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const GENERIC: i32 = 1;
    pub const DUPLICATE_NAME: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
    pub const BAD_MAGIC: i32 = 4;
    pub const CORRUPT_STREAM: i32 = 5;
    pub const NAME_TOO_LONG: i32 = 6;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Io(_) => exit_code::GENERIC,
            Error::DuplicateName(_) => exit_code::DUPLICATE_NAME,
            Error::NotFound(_) => exit_code::NOT_FOUND,
            Error::BadMagic => exit_code::BAD_MAGIC,
            Error::CorruptStream => exit_code::CORRUPT_STREAM,
            Error::NameTooLong { .. } => exit_code::NAME_TOO_LONG,
        }
    }
}
