//! Persistent, offset-addressed red-black tree.
//!
//! The tree is a pointer graph whose edges are byte offsets into the
//! archive file rather than in-memory pointers. Every structural mutation
//! — insert, delete, rotation, recoloring — is expressed as a small
//! sequence of `BlockIo` reads and writes; nothing is assumed cached
//! between them, so rotations re-read a node immediately after any write
//! that could have changed its neighbors.
//!
//! Deletion needs to carry the "double-black" node's parent explicitly
//! alongside the node itself, because that node can be the null sentinel,
//! which has no record on disk to store a parent field in.

use std::cmp::Ordering;
use std::io::{Read, Seek, Write};

use log::debug;

use crate::block_io::BlockIo;
use crate::record::{Color, EntryRecord, Offset, Superblock, TreeNode};
use crate::Error;

/// BST descent comparing by name as unsigned bytes. Returns the matching
/// node's offset, or `None`.
pub fn lookup<F: Read + Write + Seek>(
    io: &mut BlockIo<F>,
    sb: &Superblock,
    name: &[u8],
) -> Result<Option<Offset>, Error> {
    let mut cur = sb.root_offset;
    while !cur.is_null() {
        let node = io.read_node(cur)?;
        match name.cmp(node.entry.name_bytes()) {
            Ordering::Equal => return Ok(Some(cur)),
            Ordering::Less => cur = node.left,
            Ordering::Greater => cur = node.right,
        }
    }
    Ok(None)
}

/// Inserts `entry` into the tree. Rejects the insert *before* allocating
/// any node slot if the name already exists, so a failed insert leaks
/// nothing on disk.
pub fn insert<F: Read + Write + Seek>(
    io: &mut BlockIo<F>,
    sb: &mut Superblock,
    entry: EntryRecord,
) -> Result<Offset, Error> {
    let mut parent_off = Offset::NULL;
    let mut insert_left = false;
    let mut cur = sb.root_offset;
    while !cur.is_null() {
        let node = io.read_node(cur)?;
        match entry.name_bytes().cmp(node.entry.name_bytes()) {
            Ordering::Equal => return Err(Error::DuplicateName(entry.name_display().into_owned())),
            Ordering::Less => {
                parent_off = cur;
                insert_left = true;
                cur = node.left;
            }
            Ordering::Greater => {
                parent_off = cur;
                insert_left = false;
                cur = node.right;
            }
        }
    }

    let new_node = TreeNode {
        entry,
        color: Color::Red,
        left: Offset::NULL,
        right: Offset::NULL,
        parent: parent_off,
    };
    let z = io.append_node(sb, &new_node)?;

    if parent_off.is_null() {
        sb.root_offset = z;
    } else {
        let mut parent = io.read_node(parent_off)?;
        if insert_left {
            parent.left = z;
        } else {
            parent.right = z;
        }
        io.write_node(parent_off, &parent)?;
    }

    insert_fixup(io, sb, z)?;
    debug!("inserted node at {z}, root now {}", sb.root_offset);
    Ok(z)
}

/// Deletes the entry named `name`. Runs full CLRS delete-fixup when the
/// spliced-out color was BLACK.
pub fn delete<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &mut Superblock, name: &[u8]) -> Result<(), Error> {
    let z_off = lookup(io, sb, name)?.ok_or_else(|| Error::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let z = io.read_node(z_off)?;

    let mut y_off = z_off;
    let mut y_original_color = z.color;
    let x_off: Offset;
    let x_parent: Offset;

    if z.left.is_null() {
        x_off = z.right;
        x_parent = z.parent;
        transplant(io, sb, z_off, z.parent, z.right)?;
    } else if z.right.is_null() {
        x_off = z.left;
        x_parent = z.parent;
        transplant(io, sb, z_off, z.parent, z.left)?;
    } else {
        y_off = tree_minimum(io, z.right)?;
        let y = io.read_node(y_off)?;
        y_original_color = y.color;
        x_off = y.right;

        if y.parent == z_off {
            x_parent = y_off;
        } else {
            x_parent = y.parent;
            transplant(io, sb, y_off, y.parent, y.right)?;
            let z_fresh = io.read_node(z_off)?;
            let mut y2 = io.read_node(y_off)?;
            y2.right = z_fresh.right;
            io.write_node(y_off, &y2)?;
            if !z_fresh.right.is_null() {
                let mut zr = io.read_node(z_fresh.right)?;
                zr.parent = y_off;
                io.write_node(z_fresh.right, &zr)?;
            }
        }

        let z_fresh2 = io.read_node(z_off)?;
        transplant(io, sb, z_off, z_fresh2.parent, y_off)?;
        let mut y3 = io.read_node(y_off)?;
        y3.left = z_fresh2.left;
        io.write_node(y_off, &y3)?;
        if !z_fresh2.left.is_null() {
            let mut zl = io.read_node(z_fresh2.left)?;
            zl.parent = y_off;
            io.write_node(z_fresh2.left, &zl)?;
        }
        let mut y4 = io.read_node(y_off)?;
        y4.color = z_fresh2.color;
        io.write_node(y_off, &y4)?;
    }

    if y_original_color == Color::Black {
        delete_fixup(io, sb, x_off, x_parent)?;
    }

    if !sb.root_offset.is_null() {
        set_color(io, sb.root_offset, Color::Black)?;
    }
    debug!("deleted node at {z_off}, root now {}", sb.root_offset);
    Ok(())
}

/// Iterative in-order traversal with an explicit stack (recursion would be
/// O(log n) safe for the tree itself, but a fleet-safe listing walk should
/// not rely on source-level recursion per the archive's own design notes).
pub fn in_order<F: Read + Write + Seek>(
    io: &mut BlockIo<F>,
    sb: &Superblock,
    mut visit: impl FnMut(Offset, &TreeNode),
) -> Result<(), Error> {
    let mut stack: Vec<Offset> = Vec::new();
    let mut cur = sb.root_offset;
    while !cur.is_null() || !stack.is_empty() {
        while !cur.is_null() {
            stack.push(cur);
            cur = io.read_node(cur)?.left;
        }
        let off = stack.pop().expect("stack is non-empty in this branch");
        let node = io.read_node(off)?;
        visit(off, &node);
        cur = node.right;
    }
    Ok(())
}

// --- internal helpers -------------------------------------------------

fn color_of<F: Read + Write + Seek>(io: &mut BlockIo<F>, off: Offset) -> Result<Color, Error> {
    if off.is_null() {
        return Ok(Color::Black);
    }
    Ok(io.read_node(off)?.color)
}

fn set_color<F: Read + Write + Seek>(io: &mut BlockIo<F>, off: Offset, color: Color) -> Result<(), Error> {
    if off.is_null() {
        return Ok(());
    }
    let mut node = io.read_node(off)?;
    node.color = color;
    io.write_node(off, &node)
}

fn tree_minimum<F: Read + Write + Seek>(io: &mut BlockIo<F>, mut off: Offset) -> Result<Offset, Error> {
    loop {
        let node = io.read_node(off)?;
        if node.left.is_null() {
            return Ok(off);
        }
        off = node.left;
    }
}

/// Replaces the subtree rooted at `u` (whose parent is `u_parent`) with the
/// subtree rooted at `v`. `v` may be the null sentinel; its parent field is
/// only written when `v` is not null, since the sentinel has no record.
fn transplant<F: Read + Write + Seek>(
    io: &mut BlockIo<F>,
    sb: &mut Superblock,
    u: Offset,
    u_parent: Offset,
    v: Offset,
) -> Result<(), Error> {
    if u_parent.is_null() {
        sb.root_offset = v;
    } else {
        let mut parent = io.read_node(u_parent)?;
        if parent.left == u {
            parent.left = v;
        } else {
            parent.right = v;
        }
        io.write_node(u_parent, &parent)?;
    }
    if !v.is_null() {
        let mut vn = io.read_node(v)?;
        vn.parent = u_parent;
        io.write_node(v, &vn)?;
    }
    Ok(())
}

fn left_rotate<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &mut Superblock, x_off: Offset) -> Result<(), Error> {
    let mut x = io.read_node(x_off)?;
    let y_off = x.right;
    let mut y = io.read_node(y_off)?;

    x.right = y.left;
    if !y.left.is_null() {
        let mut yl = io.read_node(y.left)?;
        yl.parent = x_off;
        io.write_node(y.left, &yl)?;
    }

    y.parent = x.parent;
    if x.parent.is_null() {
        sb.root_offset = y_off;
    } else {
        let mut p = io.read_node(x.parent)?;
        if p.left == x_off {
            p.left = y_off;
        } else {
            p.right = y_off;
        }
        io.write_node(x.parent, &p)?;
    }

    y.left = x_off;
    x.parent = y_off;
    io.write_node(x_off, &x)?;
    io.write_node(y_off, &y)?;
    Ok(())
}

fn right_rotate<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &mut Superblock, x_off: Offset) -> Result<(), Error> {
    let mut x = io.read_node(x_off)?;
    let y_off = x.left;
    let mut y = io.read_node(y_off)?;

    x.left = y.right;
    if !y.right.is_null() {
        let mut yr = io.read_node(y.right)?;
        yr.parent = x_off;
        io.write_node(y.right, &yr)?;
    }

    y.parent = x.parent;
    if x.parent.is_null() {
        sb.root_offset = y_off;
    } else {
        let mut p = io.read_node(x.parent)?;
        if p.left == x_off {
            p.left = y_off;
        } else {
            p.right = y_off;
        }
        io.write_node(x.parent, &p)?;
    }

    y.right = x_off;
    x.parent = y_off;
    io.write_node(x_off, &x)?;
    io.write_node(y_off, &y)?;
    Ok(())
}

fn insert_fixup<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &mut Superblock, mut z: Offset) -> Result<(), Error> {
    loop {
        let z_node = io.read_node(z)?;
        if z_node.parent.is_null() {
            break;
        }
        let parent = io.read_node(z_node.parent)?;
        if parent.color == Color::Black {
            break;
        }
        let gp_off = parent.parent;
        if gp_off.is_null() {
            // a RED root would violate "root is BLACK"; nothing more to fix here
            break;
        }
        let gp = io.read_node(gp_off)?;

        if gp.left == z_node.parent {
            let uncle = gp.right;
            if color_of(io, uncle)? == Color::Red {
                set_color(io, z_node.parent, Color::Black)?;
                set_color(io, uncle, Color::Black)?;
                set_color(io, gp_off, Color::Red)?;
                z = gp_off;
            } else {
                let mut z_cur = z;
                let parent_fresh = io.read_node(z_node.parent)?;
                if parent_fresh.right == z_cur {
                    z_cur = z_node.parent;
                    left_rotate(io, sb, z_cur)?;
                }
                let z_node2 = io.read_node(z_cur)?;
                let parent2_off = z_node2.parent;
                set_color(io, parent2_off, Color::Black)?;
                let parent2 = io.read_node(parent2_off)?;
                let gp2_off = parent2.parent;
                set_color(io, gp2_off, Color::Red)?;
                right_rotate(io, sb, gp2_off)?;
                z = z_cur;
            }
        } else {
            let uncle = gp.left;
            if color_of(io, uncle)? == Color::Red {
                set_color(io, z_node.parent, Color::Black)?;
                set_color(io, uncle, Color::Black)?;
                set_color(io, gp_off, Color::Red)?;
                z = gp_off;
            } else {
                let mut z_cur = z;
                let parent_fresh = io.read_node(z_node.parent)?;
                if parent_fresh.left == z_cur {
                    z_cur = z_node.parent;
                    right_rotate(io, sb, z_cur)?;
                }
                let z_node2 = io.read_node(z_cur)?;
                let parent2_off = z_node2.parent;
                set_color(io, parent2_off, Color::Black)?;
                let parent2 = io.read_node(parent2_off)?;
                let gp2_off = parent2.parent;
                set_color(io, gp2_off, Color::Red)?;
                left_rotate(io, sb, gp2_off)?;
                z = z_cur;
            }
        }
    }

    if !sb.root_offset.is_null() {
        set_color(io, sb.root_offset, Color::Black)?;
    }
    Ok(())
}

fn delete_fixup<F: Read + Write + Seek>(
    io: &mut BlockIo<F>,
    sb: &mut Superblock,
    mut x: Offset,
    mut x_parent: Offset,
) -> Result<(), Error> {
    while x != sb.root_offset && color_of(io, x)? == Color::Black {
        if x_parent.is_null() {
            break;
        }
        let parent = io.read_node(x_parent)?;

        if parent.left == x {
            let mut w = parent.right;
            if color_of(io, w)? == Color::Red {
                set_color(io, w, Color::Black)?;
                set_color(io, x_parent, Color::Red)?;
                left_rotate(io, sb, x_parent)?;
                let parent2 = io.read_node(x_parent)?;
                w = parent2.right;
            }
            let w_node = io.read_node(w)?;
            let w_left_black = color_of(io, w_node.left)? == Color::Black;
            let w_right_black = color_of(io, w_node.right)? == Color::Black;
            if w_left_black && w_right_black {
                set_color(io, w, Color::Red)?;
                let old_parent = x_parent;
                x = old_parent;
                x_parent = io.read_node(old_parent)?.parent;
            } else {
                let mut w2 = w;
                if w_right_black {
                    set_color(io, w_node.left, Color::Black)?;
                    set_color(io, w2, Color::Red)?;
                    right_rotate(io, sb, w2)?;
                    let parent3 = io.read_node(x_parent)?;
                    w2 = parent3.right;
                }
                let parent4 = io.read_node(x_parent)?;
                let w2_node = io.read_node(w2)?;
                set_color(io, w2, parent4.color)?;
                set_color(io, x_parent, Color::Black)?;
                set_color(io, w2_node.right, Color::Black)?;
                left_rotate(io, sb, x_parent)?;
                x = sb.root_offset;
                x_parent = Offset::NULL;
            }
        } else {
            let mut w = parent.left;
            if color_of(io, w)? == Color::Red {
                set_color(io, w, Color::Black)?;
                set_color(io, x_parent, Color::Red)?;
                right_rotate(io, sb, x_parent)?;
                let parent2 = io.read_node(x_parent)?;
                w = parent2.left;
            }
            let w_node = io.read_node(w)?;
            let w_left_black = color_of(io, w_node.left)? == Color::Black;
            let w_right_black = color_of(io, w_node.right)? == Color::Black;
            if w_left_black && w_right_black {
                set_color(io, w, Color::Red)?;
                let old_parent = x_parent;
                x = old_parent;
                x_parent = io.read_node(old_parent)?.parent;
            } else {
                let mut w2 = w;
                if w_left_black {
                    set_color(io, w_node.right, Color::Black)?;
                    set_color(io, w2, Color::Red)?;
                    left_rotate(io, sb, w2)?;
                    let parent3 = io.read_node(x_parent)?;
                    w2 = parent3.left;
                }
                let parent4 = io.read_node(x_parent)?;
                let w2_node = io.read_node(w2)?;
                set_color(io, w2, parent4.color)?;
                set_color(io, x_parent, Color::Black)?;
                set_color(io, w2_node.left, Color::Black)?;
                right_rotate(io, sb, x_parent)?;
                x = sb.root_offset;
                x_parent = Offset::NULL;
            }
        }
    }
    set_color(io, x, Color::Black)
}

// Validators below are used only by tests to assert the red-black and BST
// properties hold after each mutation (§8's testable properties).

#[cfg(test)]
fn in_order_names<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &Superblock) -> Vec<Vec<u8>> {
    let mut names = Vec::new();
    in_order(io, sb, |_, node| names.push(node.entry.name_bytes().to_vec())).unwrap();
    names
}

#[cfg(test)]
fn assert_bst_order<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &Superblock) {
    let names = in_order_names(io, sb);
    for w in names.windows(2) {
        assert!(w[0] < w[1], "BST order violated: {:?} !< {:?}", w[0], w[1]);
    }
}

/// Returns the black-height if consistent on every path, panics otherwise.
#[cfg(test)]
fn assert_red_black_properties<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &Superblock) -> u32 {
    if sb.root_offset.is_null() {
        return 0;
    }
    assert_eq!(color_of(io, sb.root_offset).unwrap(), Color::Black, "root must be BLACK");
    check_node(io, sb.root_offset)
}

#[cfg(test)]
fn check_node<F: Read + Write + Seek>(io: &mut BlockIo<F>, off: Offset) -> u32 {
    if off.is_null() {
        return 1;
    }
    let node = io.read_node(off).unwrap();
    if node.color == Color::Red {
        assert_eq!(color_of(io, node.left).unwrap(), Color::Black, "red node {off} has a red child");
        assert_eq!(color_of(io, node.right).unwrap(), Color::Black, "red node {off} has a red child");
    }
    let left_bh = check_node(io, node.left);
    let right_bh = check_node(io, node.right);
    assert_eq!(left_bh, right_bh, "unequal black-height under node {off}");
    left_bh + if node.color == Color::Black { 1 } else { 0 }
}

#[cfg(test)]
fn assert_parent_child_consistency<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &Superblock) {
    walk_consistency(io, sb.root_offset);
}

#[cfg(test)]
fn walk_consistency<F: Read + Write + Seek>(io: &mut BlockIo<F>, off: Offset) {
    if off.is_null() {
        return;
    }
    let node = io.read_node(off).unwrap();
    if !node.left.is_null() {
        let left = io.read_node(node.left).unwrap();
        assert_eq!(left.parent, off, "left child's parent pointer is inconsistent");
    }
    if !node.right.is_null() {
        let right = io.read_node(node.right).unwrap();
        assert_eq!(right.parent, off, "right child's parent pointer is inconsistent");
    }
    walk_consistency(io, node.left);
    walk_consistency(io, node.right);
}

#[cfg(test)]
fn new_ctx() -> (BlockIo<Cursor<Vec<u8>>>, Superblock) {
    (BlockIo::new(Cursor::new(Vec::new())), Superblock::fresh())
}

#[cfg(test)]
fn ins<F: Read + Write + Seek>(io: &mut BlockIo<F>, sb: &mut Superblock, name: &str) {
    let entry = EntryRecord::new_file(name, Offset::new(0), 1, 1).unwrap();
    insert(io, sb, entry).unwrap();
}

#[cfg(test)]
use std::io::Cursor;

#[test]
fn empty_tree_has_no_root_and_no_entries() {
    let (mut io, sb) = new_ctx();
    assert!(sb.root_offset.is_null());
    assert!(in_order_names(&mut io, &sb).is_empty());
}

#[test]
fn single_insertion_is_black_root() {
    let (mut io, mut sb) = new_ctx();
    ins(&mut io, &mut sb, "hello");
    assert!(!sb.root_offset.is_null());
    let root = io.read_node(sb.root_offset).unwrap();
    assert_eq!(root.color, Color::Black);
    assert_eq!(root.entry.name_bytes(), b"hello");
}

#[test]
fn duplicate_insert_is_rejected_without_mutating() {
    let (mut io, mut sb) = new_ctx();
    ins(&mut io, &mut sb, "k");
    let before = in_order_names(&mut io, &sb);
    let dup = EntryRecord::new_file("k", Offset::new(0), 1, 1).unwrap();
    let err = insert(&mut io, &mut sb, dup).unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));
    assert_eq!(in_order_names(&mut io, &sb), before);
}

#[test]
fn ten_sequential_inserts_stay_balanced() {
    let (mut io, mut sb) = new_ctx();
    for name in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"] {
        ins(&mut io, &mut sb, name);
        assert_bst_order(&mut io, &sb);
        let bh = assert_red_black_properties(&mut io, &sb);
        assert!(bh >= 1);
        assert_parent_child_consistency(&mut io, &sb);
    }
    let bh = assert_red_black_properties(&mut io, &sb);
    assert!(bh == 2 || bh == 3, "black height {bh} out of expected range for 10 nodes");
    assert_eq!(
        in_order_names(&mut io, &sb),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec(), b"f".to_vec(), b"g".to_vec(), b"h".to_vec(), b"i".to_vec(), b"j".to_vec()]
    );
}

#[test]
fn lookup_finds_and_misses() {
    let (mut io, mut sb) = new_ctx();
    for name in ["m", "b", "z"] {
        ins(&mut io, &mut sb, name);
    }
    assert!(lookup(&mut io, &sb, b"b").unwrap().is_some());
    assert!(lookup(&mut io, &sb, b"nope").unwrap().is_none());
}

#[test]
fn deletion_rebalances_and_preserves_remaining_names() {
    let (mut io, mut sb) = new_ctx();
    for name in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"] {
        ins(&mut io, &mut sb, name);
    }
    for (doomed, expected_remaining) in [
        ("a", 9),
        ("c", 8),
        ("e", 7),
    ] {
        delete(&mut io, &mut sb, doomed.as_bytes()).unwrap();
        assert_bst_order(&mut io, &sb);
        assert_red_black_properties(&mut io, &sb);
        assert_parent_child_consistency(&mut io, &sb);
        let names = in_order_names(&mut io, &sb);
        assert_eq!(names.len(), expected_remaining);
        assert!(!names.contains(&doomed.as_bytes().to_vec()));
    }
    assert_eq!(
        in_order_names(&mut io, &sb),
        vec![b"b".to_vec(), b"d".to_vec(), b"f".to_vec(), b"g".to_vec(), b"h".to_vec(), b"i".to_vec(), b"j".to_vec()]
    );
}

#[test]
fn delete_missing_name_is_not_found() {
    let (mut io, mut sb) = new_ctx();
    ins(&mut io, &mut sb, "only");
    let err = delete(&mut io, &mut sb, b"missing").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn delete_every_node_empties_the_tree() {
    let (mut io, mut sb) = new_ctx();
    let names = ["m", "f", "t", "b", "h", "q", "z", "a", "d", "g", "k"];
    for n in names {
        ins(&mut io, &mut sb, n);
    }
    for n in names {
        delete(&mut io, &mut sb, n.as_bytes()).unwrap();
        assert_bst_order(&mut io, &sb);
        assert_red_black_properties(&mut io, &sb);
        assert_parent_child_consistency(&mut io, &sb);
    }
    assert!(sb.root_offset.is_null());
    assert!(in_order_names(&mut io, &sb).is_empty());
}

#[test]
fn reverse_order_inserts_still_balance() {
    let (mut io, mut sb) = new_ctx();
    let names = ["j", "i", "h", "g", "f", "e", "d", "c", "b", "a"];
    for n in names {
        ins(&mut io, &mut sb, n);
        assert_red_black_properties(&mut io, &sb);
    }
    assert_eq!(
        in_order_names(&mut io, &sb),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec(), b"f".to_vec(), b"g".to_vec(), b"h".to_vec(), b"i".to_vec(), b"j".to_vec()]
    );
}
