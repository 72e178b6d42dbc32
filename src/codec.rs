//! Canonical-construction Huffman codec with an embedded 256-entry
//! frequency header.
//!
//! Unlike the teacher crate's adaptive coder (`tools::adaptive_huff`),
//! which keeps no header and instead re-derives its tree incrementally as
//! symbols stream past, this codec is static: the encoder builds one tree
//! for the whole buffer and persists its frequency table so the decoder
//! can rebuild an equivalent tree from the table alone. Only the
//! MSB-first bit-packing idiom is carried over (via the same `bit-vec`
//! crate the teacher already depends on).
//!
//! Both encoder and decoder build the tree with the same priority-queue
//! construction, symbols considered in ascending order and ties broken by
//! creation order — the deterministic rule the archive's own design notes
//! call for, since only the frequency table is ever persisted.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use bit_vec::BitVec;
use log::debug;

use crate::Error;

/// Size in bytes of the embedded 256-entry, 32-bit frequency header.
pub const FREQ_TABLE_BYTES: usize = 256 * 4;

enum HuffTree {
    Leaf(u8),
    Internal(Box<HuffTree>, Box<HuffTree>),
}

struct PqEntry {
    freq: u32,
    seq: u32,
    tree: HuffTree,
}

impl PartialEq for PqEntry {
    fn eq(&self, other: &Self) -> bool {
        self.freq == other.freq && self.seq == other.seq
    }
}
impl Eq for PqEntry {}
impl PartialOrd for PqEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PqEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.freq.cmp(&other.freq).then(self.seq.cmp(&other.seq))
    }
}

/// Builds the code tree from a 256-entry frequency table. Returns `None`
/// for an all-zero table (empty input). A table with exactly one nonzero
/// entry yields a bare `Leaf`, which `assign_codes`/`decode` special-case
/// into the one-bit code the spec requires for a single repeated symbol.
fn build_tree(freq: &[u32; 256]) -> Option<HuffTree> {
    let mut heap: BinaryHeap<Reverse<PqEntry>> = BinaryHeap::new();
    let mut seq = 0u32;
    for (symbol, &count) in freq.iter().enumerate() {
        if count > 0 {
            heap.push(Reverse(PqEntry { freq: count, seq, tree: HuffTree::Leaf(symbol as u8) }));
            seq += 1;
        }
    }
    if heap.is_empty() {
        return None;
    }
    while heap.len() > 1 {
        let Reverse(a) = heap.pop().expect("heap has at least two entries in this branch");
        let Reverse(b) = heap.pop().expect("heap has at least two entries in this branch");
        let combined = PqEntry { freq: a.freq + b.freq, seq, tree: HuffTree::Internal(Box::new(a.tree), Box::new(b.tree)) };
        seq += 1;
        heap.push(Reverse(combined));
    }
    heap.pop().map(|Reverse(e)| e.tree)
}

fn assign_codes(tree: &HuffTree, prefix: &mut Vec<bool>, codes: &mut [Option<Vec<bool>>; 256]) {
    match tree {
        HuffTree::Leaf(symbol) => {
            codes[*symbol as usize] = Some(if prefix.is_empty() { vec![false] } else { prefix.clone() });
        }
        HuffTree::Internal(left, right) => {
            prefix.push(false);
            assign_codes(left, prefix, codes);
            prefix.pop();
            prefix.push(true);
            assign_codes(right, prefix, codes);
            prefix.pop();
        }
    }
}

/// Compresses `data` into `[256 x u32 LE frequency header][MSB-first packed
/// code bits, zero-padded in the final byte]`. Never fails short of
/// allocation exhaustion.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut freq = [0u32; 256];
    for &b in data {
        freq[b as usize] += 1;
    }

    let mut out = Vec::with_capacity(FREQ_TABLE_BYTES + data.len());
    for count in freq.iter() {
        out.extend_from_slice(&count.to_le_bytes());
    }

    let tree = build_tree(&freq);
    let mut codes: [Option<Vec<bool>>; 256] = std::array::from_fn(|_| None);
    if let Some(tree) = &tree {
        assign_codes(tree, &mut Vec::new(), &mut codes);
    }

    let mut bits = BitVec::new();
    for &b in data {
        let code = codes[b as usize].as_ref().expect("every symbol in data has an assigned code");
        for &bit in code {
            bits.push(bit);
        }
    }
    out.extend_from_slice(&bits.to_bytes());
    debug!("huffman encode: {} bytes -> {} bytes", data.len(), out.len());
    out
}

/// Inverts `encode`, given the original decoded length. Fails with
/// `CorruptStream` if the bitstream ends before `original_len` symbols
/// have been produced.
pub fn decode(blob: &[u8], original_len: u64) -> Result<Vec<u8>, Error> {
    if blob.len() < FREQ_TABLE_BYTES {
        return Err(Error::CorruptStream);
    }
    if original_len == 0 {
        return Ok(Vec::new());
    }

    let mut freq = [0u32; 256];
    for (i, chunk) in blob[..FREQ_TABLE_BYTES].chunks_exact(4).enumerate() {
        freq[i] = u32::from_le_bytes(chunk.try_into().expect("chunks_exact(4) yields 4-byte slices"));
    }
    let tree = build_tree(&freq).ok_or(Error::CorruptStream)?;
    let body = BitVec::from_bytes(&blob[FREQ_TABLE_BYTES..]);

    let mut out = Vec::with_capacity(original_len as usize);
    let mut pos = 0usize;

    if let HuffTree::Leaf(symbol) = &tree {
        for _ in 0..original_len {
            body.get(pos).ok_or(Error::CorruptStream)?;
            pos += 1;
            out.push(*symbol);
        }
        return Ok(out);
    }

    while (out.len() as u64) < original_len {
        let mut node = &tree;
        loop {
            match node {
                HuffTree::Leaf(symbol) => {
                    out.push(*symbol);
                    break;
                }
                HuffTree::Internal(left, right) => {
                    let bit = body.get(pos).ok_or(Error::CorruptStream)?;
                    pos += 1;
                    node = if bit { right } else { left };
                }
            }
        }
    }
    Ok(out)
}

#[test]
fn round_trips_arbitrary_text() {
    let data = b"I am Sam. Sam I am. I do not like this Sam I am.\n";
    let compressed = encode(data);
    let expanded = decode(&compressed, data.len() as u64).unwrap();
    assert_eq!(expanded, data);
}

#[test]
fn empty_input_is_header_only() {
    let compressed = encode(&[]);
    assert_eq!(compressed.len(), FREQ_TABLE_BYTES);
    assert!(compressed.iter().all(|&b| b == 0));
    let expanded = decode(&compressed, 0).unwrap();
    assert!(expanded.is_empty());
}

#[test]
fn decode_with_zero_length_ignores_body() {
    // a blob with a bogus/truncated body must still decode to nothing
    // when original_len is 0, without inspecting the body at all.
    let mut blob = vec![0u8; FREQ_TABLE_BYTES];
    blob.extend_from_slice(&[0xFF]); // garbage body byte
    assert_eq!(decode(&blob, 0).unwrap(), Vec::<u8>::new());
}

#[test]
fn single_repeated_symbol_uses_one_bit_codes() {
    let data = vec![b'Q'; 4096];
    let compressed = encode(&data);
    let expanded = decode(&compressed, data.len() as u64).unwrap();
    assert_eq!(expanded, data);
    // header + ceil(4096 bits / 8) = header + 512 bytes
    assert_eq!(compressed.len(), FREQ_TABLE_BYTES + 512);
}

#[test]
fn hostile_alternating_pattern_round_trips() {
    let mut data = Vec::with_capacity(4096);
    for i in 0..4096 {
        data.push(if i % 2 == 0 { 0x00 } else { 0xFF });
    }
    let compressed = encode(&data);
    let expanded = decode(&compressed, data.len() as u64).unwrap();
    assert_eq!(expanded, data);
}

#[test]
fn truncated_stream_is_corrupt() {
    let data = b"abcdefghijklmnopqrstuvwxyz".repeat(4);
    let mut compressed = encode(&data);
    compressed.truncate(FREQ_TABLE_BYTES + 1);
    let err = decode(&compressed, data.len() as u64).unwrap_err();
    assert!(matches!(err, Error::CorruptStream));
}

#[test]
fn large_buffer_round_trips() {
    let mut data = Vec::with_capacity(1 << 16);
    let mut x: u32 = 12345;
    for _ in 0..(1 << 16) {
        x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
        data.push((x >> 16) as u8);
    }
    let compressed = encode(&data);
    let expanded = decode(&compressed, data.len() as u64).unwrap();
    assert_eq!(expanded, data);
}

#[test]
fn empty_input_header_matches_expected_hex() {
    // every symbol count is zero; spot-check the first two 32-bit LE
    // counts the way the teacher crate pins expected output with hex
    // literals in its own td0 tests.
    let compressed = encode(&[]);
    assert_eq!(hex::encode(&compressed[0..8]), "0000000000000000");
}
