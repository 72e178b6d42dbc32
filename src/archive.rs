//! The archive facade: binds block I/O, the allocator, the codec, and the
//! index into the single-file store a caller actually opens.
//!
//! Mirrors the reference filesystem's `init_filesystem` / `load_filesystem`
//! / `close_filesystem` / `add_file` / `get_file_content` / `list_files`
//! shape, but as a type with RAII cleanup instead of a quartet of free
//! functions threading a `FILE*` by hand.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::Path;

use log::{info, warn};

use crate::block_io::BlockIo;
use crate::codec;
use crate::record::{EntryRecord, NodeKind, Offset, Superblock};
use crate::tree;
use crate::Error;

/// One entry as reported by [`Archive::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: String,
    pub original_size: u64,
    pub compressed_size: u64,
}

/// An open archive. Holds the live superblock in memory and flushes it
/// after every mutation; `Drop` makes a best-effort final flush so a
/// caller that forgets to call [`Archive::close`] doesn't lose the
/// watermark, though errors there can't be surfaced.
pub struct Archive<F> {
    io: BlockIo<F>,
    sb: Superblock,
}

impl Archive<File> {
    /// Creates a new archive file at `path`, truncating any existing
    /// contents, and writes a fresh superblock.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        let mut io = BlockIo::new(file);
        let sb = Superblock::fresh();
        io.write_superblock(&sb)?;
        info!("initialized archive, watermark at {}", sb.next_free);
        Ok(Self { io, sb })
    }

    /// Opens an existing archive file and loads its superblock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut io = BlockIo::new(file);
        let sb = io.read_superblock()?;
        info!("opened archive, root={} watermark={}", sb.root_offset, sb.next_free);
        Ok(Self { io, sb })
    }
}

impl<F: Read + Write + Seek> Archive<F> {
    /// Builds an archive over an already-open handle (a real file, or in
    /// tests a `Cursor<Vec<u8>>`), writing a fresh superblock into it.
    pub fn init_with(file: F) -> Result<Self, Error> {
        let mut io = BlockIo::new(file);
        let sb = Superblock::fresh();
        io.write_superblock(&sb)?;
        Ok(Self { io, sb })
    }

    /// Builds an archive over an already-open handle, loading its existing superblock.
    pub fn open_with(file: F) -> Result<Self, Error> {
        let mut io = BlockIo::new(file);
        let sb = io.read_superblock()?;
        Ok(Self { io, sb })
    }

    /// Compresses `data` and appends the payload unconditionally, then
    /// tries to index it under `name`. A duplicate name is only discovered
    /// at the `tree::insert` step, by which point the payload is already
    /// written; the space is orphaned rather than reclaimed, matching the
    /// archive's append-only, no-free-list design.
    pub fn put(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        let compressed = codec::encode(data);
        let payload_offset = self.io.write_payload(&mut self.sb, &compressed)?;
        let entry = EntryRecord::new_file(name, payload_offset, data.len() as u64, compressed.len() as u64)?;
        match tree::insert(&mut self.io, &mut self.sb, entry) {
            Ok(_) => {
                self.io.write_superblock(&self.sb)?;
                info!("put '{name}': {} bytes -> {} bytes", data.len(), compressed.len());
                Ok(())
            }
            Err(err @ Error::DuplicateName(_)) => {
                self.io.write_superblock(&self.sb)?;
                warn!("put '{name}': duplicate name, payload at {payload_offset} orphaned");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Looks up `name` and decompresses its stored payload. A non-FILE
    /// entry (reserved for a future directory layer) is reported as
    /// `NotFound` rather than decoded.
    pub fn get(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        let off = tree::lookup(&mut self.io, &self.sb, name.as_bytes())?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let node = self.io.read_node(off)?;
        if node.entry.kind != NodeKind::File {
            return Err(Error::NotFound(name.to_string()));
        }
        let compressed = self.io.read_payload(node.entry.payload_offset, node.entry.compressed_size)?;
        let data = codec::decode(&compressed, node.entry.original_size)?;
        Ok(data)
    }

    /// Removes `name` from the index. The underlying payload and node slot
    /// become unreachable but are not reclaimed (no free list).
    pub fn delete(&mut self, name: &str) -> Result<(), Error> {
        tree::delete(&mut self.io, &mut self.sb, name.as_bytes())?;
        self.io.write_superblock(&self.sb)?;
        info!("deleted '{name}'");
        Ok(())
    }

    /// Lists every entry in ascending name order.
    pub fn list(&mut self) -> Result<Vec<ListedEntry>, Error> {
        let mut out = Vec::new();
        tree::in_order(&mut self.io, &self.sb, |_, node| {
            out.push(ListedEntry {
                name: node.entry.name_display().into_owned(),
                original_size: node.entry.original_size,
                compressed_size: node.entry.compressed_size,
            });
        })?;
        Ok(out)
    }

    /// Flushes the superblock and returns the underlying handle.
    pub fn close(mut self) -> Result<F, Error> {
        self.io.write_superblock(&self.sb)?;
        Ok(self.io.into_inner())
    }

    pub fn root_offset(&self) -> Offset {
        self.sb.root_offset
    }
}

impl<F> Drop for Archive<F> {
    fn drop(&mut self) {
        // best-effort only: Drop can't propagate an I/O error, and a caller
        // that wants one should call `close` explicitly.
    }
}

#[cfg(test)]
use std::io::Cursor;

#[cfg(test)]
fn new_archive() -> Archive<Cursor<Vec<u8>>> {
    Archive::init_with(Cursor::new(Vec::new())).unwrap()
}

#[test]
fn put_then_get_round_trips() {
    let mut archive = new_archive();
    archive.put("hello.txt", b"hello, archive").unwrap();
    let data = archive.get("hello.txt").unwrap();
    assert_eq!(data, b"hello, archive");
}

#[test]
fn duplicate_put_orphans_the_payload_but_keeps_the_original() {
    let mut archive = new_archive();
    archive.put("a", b"one").unwrap();
    let watermark_before = archive.sb.next_free;
    let err = archive.put("a", b"two").unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));
    // the second payload was written (and orphaned) before the duplicate
    // was discovered, so the watermark still advanced past it.
    assert!(archive.sb.next_free.get() > watermark_before.get());
    assert_eq!(archive.get("a").unwrap(), b"one");
}

#[test]
fn get_missing_name_is_not_found() {
    let mut archive = new_archive();
    let err = archive.get("nope").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn get_on_a_non_file_entry_is_not_found() {
    let mut archive = new_archive();
    archive.put("a", b"data").unwrap();
    let off = tree::lookup(&mut archive.io, &archive.sb, b"a").unwrap().unwrap();
    let mut node = archive.io.read_node(off).unwrap();
    node.entry.kind = NodeKind::Directory;
    archive.io.write_node(off, &node).unwrap();
    assert!(matches!(archive.get("a").unwrap_err(), Error::NotFound(_)));
}

#[test]
fn delete_then_get_is_not_found() {
    let mut archive = new_archive();
    archive.put("a", b"data").unwrap();
    archive.delete("a").unwrap();
    assert!(matches!(archive.get("a").unwrap_err(), Error::NotFound(_)));
}

#[test]
fn list_reports_ascending_names_and_sizes() {
    let mut archive = new_archive();
    archive.put("c", b"xyz").unwrap();
    archive.put("a", b"1").unwrap();
    archive.put("b", b"ab").unwrap();
    let listed = archive.list().unwrap();
    let names: Vec<&str> = listed.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(listed[0].original_size, 1);
    assert_eq!(listed[2].original_size, 3);
}

#[test]
fn empty_payload_round_trips() {
    let mut archive = new_archive();
    archive.put("empty", b"").unwrap();
    assert_eq!(archive.get("empty").unwrap(), Vec::<u8>::new());
}

#[test]
fn close_and_reopen_preserves_entries() {
    let file = Cursor::new(Vec::new());
    let mut archive = Archive::init_with(file).unwrap();
    archive.put("persisted", b"still here").unwrap();
    let file = archive.close().unwrap();

    let mut reopened = Archive::open_with(file).unwrap();
    assert_eq!(reopened.get("persisted").unwrap(), b"still here");
}

#[test]
fn name_too_long_is_surfaced_from_put() {
    let mut archive = new_archive();
    let long_name = "n".repeat(crate::record::MAX_NAME_LEN + 1);
    let err = archive.put(&long_name, b"x").unwrap_err();
    assert!(matches!(err, Error::NameTooLong { .. }));
}
