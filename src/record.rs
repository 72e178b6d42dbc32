//! On-disk data model: superblock, entry records, and tree nodes.
//!
//! Every multi-byte field is little-endian. Offsets are signed 64-bit;
//! `-1` is the null sentinel (`Offset::NULL`). Layouts are fixed at
//! compile time and asserted by the `wire_sizes` test below rather than
//! left to language struct packing, per the archive's own documented
//! convention.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use std::fmt;

use crate::Error;

/// Sentinel that marks an empty archive / absent child / absent parent.
const NULL_RAW: i64 = -1;

/// Magic number stamped at superblock offset 0.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Fixed capacity of the name buffer, including the NUL terminator.
pub const MAX_NAME: usize = 64;

/// Longest name a caller may supply (capacity minus the terminator).
pub const MAX_NAME_LEN: usize = MAX_NAME - 1;

/// Size in bytes of the serialized superblock.
pub const SUPERBLOCK_SIZE: usize = 4 + 8 + 8 + 8;

/// Size in bytes of the serialized entry record.
pub const ENTRY_SIZE: usize = 1 + MAX_NAME + 8 + 8 + 8 + 8 + 8;

/// Size in bytes of the serialized tree node (the allocation unit of the index).
pub const NODE_SIZE: usize = ENTRY_SIZE + 1 + 8 + 8 + 8;

/// A byte offset into the archive file, or the null sentinel.
///
/// Distinct from a plain integer so that sentinel handling can't leak into
/// code that expects a valid, readable offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(i64);

impl Offset {
    pub const NULL: Offset = Offset(NULL_RAW);

    pub fn new(raw: i64) -> Self {
        Offset(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == NULL_RAW
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Tag distinguishing the two entry kinds the on-disk format reserves room
/// for. The core only ever writes `File`; `Directory` is carried bit-faithfully
/// for a future hierarchical layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum NodeKind {
    File = 0,
    Directory = 1,
}

/// Red-black node color. The null sentinel is always treated as `Black`
/// without ever being read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Color {
    Red = 0,
    Black = 1,
}

/// The durable root of the archive: the superblock at offset 0.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub magic: u32,
    pub root_offset: Offset,
    pub next_free: Offset,
    pub total_size: Offset,
}

impl Superblock {
    pub fn fresh() -> Self {
        Self {
            magic: MAGIC,
            root_offset: Offset::NULL,
            next_free: Offset::new(SUPERBLOCK_SIZE as i64),
            total_size: Offset::new(SUPERBLOCK_SIZE as i64),
        }
    }

    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..12].copy_from_slice(&self.root_offset.get().to_le_bytes());
        buf[12..20].copy_from_slice(&self.next_free.get().to_le_bytes());
        buf[20..28].copy_from_slice(&self.total_size.get().to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(Error::BadMagic);
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap_or_default());
        if magic != MAGIC {
            return Err(Error::BadMagic);
        }
        let root_offset = Offset::new(i64::from_le_bytes(buf[4..12].try_into().unwrap_or_default()));
        let next_free = Offset::new(i64::from_le_bytes(buf[12..20].try_into().unwrap_or_default()));
        let total_size = Offset::new(i64::from_le_bytes(buf[20..28].try_into().unwrap_or_default()));
        Ok(Self { magic, root_offset, next_free, total_size })
    }
}

/// The logical content of a tree node: a name-keyed entry.
///
/// `parent_logical` and `children_root` are reserved for a future
/// hierarchical directory layer; the flat-namespace core never sets them
/// to anything but `Offset::NULL`.
#[derive(Debug, Clone)]
pub struct EntryRecord {
    pub kind: NodeKind,
    name: [u8; MAX_NAME],
    pub parent_logical: Offset,
    pub children_root: Offset,
    pub payload_offset: Offset,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl EntryRecord {
    /// Builds a FILE entry. Fails closed with `NameTooLong` rather than the
    /// C reference's silent `strncpy` truncation, which could collide two
    /// distinct long names onto the same stored key.
    pub fn new_file(
        name: &str,
        payload_offset: Offset,
        original_size: u64,
        compressed_size: u64,
    ) -> Result<Self, Error> {
        let raw = name.as_bytes();
        if raw.len() > MAX_NAME_LEN {
            return Err(Error::NameTooLong { name: name.to_string(), max: MAX_NAME_LEN });
        }
        let mut buf = [0u8; MAX_NAME];
        buf[..raw.len()].copy_from_slice(raw);
        Ok(Self {
            kind: NodeKind::File,
            name: buf,
            parent_logical: Offset::NULL,
            children_root: Offset::NULL,
            payload_offset,
            original_size,
            compressed_size,
        })
    }

    /// Name bytes up to (not including) the first NUL, compared as
    /// unsigned bytes per the ordering invariant.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(MAX_NAME);
        &self.name[..end]
    }

    /// Lossy UTF-8 view of the name, for display purposes only (listing, CLI output).
    pub fn name_display(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    pub fn to_bytes(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[0] = self.kind.to_u8().unwrap_or(0);
        buf[1..1 + MAX_NAME].copy_from_slice(&self.name);
        let mut off = 1 + MAX_NAME;
        buf[off..off + 8].copy_from_slice(&self.parent_logical.get().to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.children_root.get().to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.payload_offset.get().to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.original_size.to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < ENTRY_SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated entry record",
            )));
        }
        let kind = NodeKind::from_u8(buf[0]).unwrap_or(NodeKind::File);
        let mut name = [0u8; MAX_NAME];
        name.copy_from_slice(&buf[1..1 + MAX_NAME]);
        let mut off = 1 + MAX_NAME;
        let parent_logical = Offset::new(i64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default()));
        off += 8;
        let children_root = Offset::new(i64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default()));
        off += 8;
        let payload_offset = Offset::new(i64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default()));
        off += 8;
        let original_size = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default());
        off += 8;
        let compressed_size = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default());
        Ok(Self {
            kind,
            name,
            parent_logical,
            children_root,
            payload_offset,
            original_size,
            compressed_size,
        })
    }
}

/// A tree node: an entry record plus the red-black structural fields. This
/// is the single allocation unit the allocator hands out for the index.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub entry: EntryRecord,
    pub color: Color,
    pub left: Offset,
    pub right: Offset,
    pub parent: Offset,
}

impl TreeNode {
    pub fn to_bytes(&self) -> [u8; NODE_SIZE] {
        let mut buf = [0u8; NODE_SIZE];
        buf[0..ENTRY_SIZE].copy_from_slice(&self.entry.to_bytes());
        let mut off = ENTRY_SIZE;
        buf[off] = self.color.to_u8().unwrap_or(1);
        off += 1;
        buf[off..off + 8].copy_from_slice(&self.left.get().to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.right.get().to_le_bytes());
        off += 8;
        buf[off..off + 8].copy_from_slice(&self.parent.get().to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < NODE_SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated tree node",
            )));
        }
        let entry = EntryRecord::from_bytes(&buf[0..ENTRY_SIZE])?;
        let mut off = ENTRY_SIZE;
        let color = Color::from_u8(buf[off]).unwrap_or(Color::Black);
        off += 1;
        let left = Offset::new(i64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default()));
        off += 8;
        let right = Offset::new(i64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default()));
        off += 8;
        let parent = Offset::new(i64::from_le_bytes(buf[off..off + 8].try_into().unwrap_or_default()));
        Ok(Self { entry, color, left, right, parent })
    }
}

#[test]
fn wire_sizes() {
    let sb = Superblock::fresh();
    assert_eq!(sb.to_bytes().len(), SUPERBLOCK_SIZE);

    let entry = EntryRecord::new_file("readme.txt", Offset::new(64), 12, 9).unwrap();
    assert_eq!(entry.to_bytes().len(), ENTRY_SIZE);

    let node = TreeNode { entry, color: Color::Red, left: Offset::NULL, right: Offset::NULL, parent: Offset::NULL };
    assert_eq!(node.to_bytes().len(), NODE_SIZE);
}

#[test]
fn superblock_round_trips() {
    let sb = Superblock { magic: MAGIC, root_offset: Offset::new(28), next_free: Offset::new(500), total_size: Offset::new(500) };
    let decoded = Superblock::from_bytes(&sb.to_bytes()).unwrap();
    assert_eq!(decoded.root_offset, sb.root_offset);
    assert_eq!(decoded.next_free, sb.next_free);
    assert_eq!(decoded.total_size, sb.total_size);
}

#[test]
fn bad_magic_is_rejected() {
    let mut buf = Superblock::fresh().to_bytes();
    buf[0] ^= 0xff;
    assert!(matches!(Superblock::from_bytes(&buf), Err(Error::BadMagic)));
}

#[test]
fn entry_round_trips_name_and_sizes() {
    let entry = EntryRecord::new_file("dir/file-name_42.bin", Offset::new(200), 4096, 1200).unwrap();
    let decoded = EntryRecord::from_bytes(&entry.to_bytes()).unwrap();
    assert_eq!(decoded.name_bytes(), b"dir/file-name_42.bin");
    assert_eq!(decoded.original_size, 4096);
    assert_eq!(decoded.compressed_size, 1200);
}

#[test]
fn name_too_long_is_rejected() {
    let long_name = "x".repeat(MAX_NAME_LEN + 1);
    let err = EntryRecord::new_file(&long_name, Offset::NULL, 0, 0).unwrap_err();
    assert!(matches!(err, Error::NameTooLong { .. }));
}

#[test]
fn max_length_name_is_accepted() {
    let name = "x".repeat(MAX_NAME_LEN);
    let entry = EntryRecord::new_file(&name, Offset::NULL, 0, 0).unwrap();
    assert_eq!(entry.name_bytes().len(), MAX_NAME_LEN);
}
