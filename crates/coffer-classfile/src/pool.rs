//! Interning constant pool.
//!
//! Entries are deduplicated by `(tag, payload)`: interning the same entry
//! twice returns the same index. Index 0 is reserved for "absent"; `Long`
//! and `Double` entries occupy two consecutive indices as required by the
//! class-file format. Index assignment is stable for a given sequence of
//! `intern` calls.

use std::collections::HashMap;

/// A resolved constant-pool entry. Cross-entry references are pool indices.
///
/// Float and double payloads are stored as raw bits so entries stay `Eq`
/// and `Hash` (NaN payloads intern like any other value).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entry {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref(u16, u16),
    Methodref(u16, u16),
    InterfaceMethodref(u16, u16),
    NameAndType(u16, u16),
    InvokeDynamic(u16, u16),
}

impl Entry {
    /// Class-file tag byte.
    pub fn tag(&self) -> u8 {
        match self {
            Entry::Utf8(_) => 1,
            Entry::Integer(_) => 3,
            Entry::Float(_) => 4,
            Entry::Long(_) => 5,
            Entry::Double(_) => 6,
            Entry::Class(_) => 7,
            Entry::String(_) => 8,
            Entry::Fieldref(..) => 9,
            Entry::Methodref(..) => 10,
            Entry::InterfaceMethodref(..) => 11,
            Entry::NameAndType(..) => 12,
            Entry::InvokeDynamic(..) => 18,
        }
    }

    /// Number of pool indices the entry occupies (2 for long/double).
    pub fn width(&self) -> u16 {
        match self {
            Entry::Long(_) | Entry::Double(_) => 2,
            _ => 1,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Entry::Utf8(s) => {
                out.extend_from_slice(&(s.len() as u16).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Entry::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
            Entry::Float(bits) => out.extend_from_slice(&bits.to_be_bytes()),
            Entry::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
            Entry::Double(bits) => out.extend_from_slice(&bits.to_be_bytes()),
            Entry::Class(i) | Entry::String(i) => out.extend_from_slice(&i.to_be_bytes()),
            Entry::Fieldref(a, b)
            | Entry::Methodref(a, b)
            | Entry::InterfaceMethodref(a, b)
            | Entry::NameAndType(a, b)
            | Entry::InvokeDynamic(a, b) => {
                out.extend_from_slice(&a.to_be_bytes());
                out.extend_from_slice(&b.to_be_bytes());
            }
        }
    }
}

/// The constant pool: entries in assignment order plus a dedup map.
#[derive(Debug, Default)]
pub struct ConstPool {
    /// Entries paired with their assigned index, in assignment order.
    entries: Vec<(u16, Entry)>,
    indices: HashMap<Entry, u16>,
    next: u16,
}

impl ConstPool {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            indices: HashMap::new(),
            next: 1,
        }
    }

    /// Intern an entry, returning its index. Re-interning an identical
    /// entry returns the previously assigned index.
    pub fn intern(&mut self, entry: Entry) -> u16 {
        if let Some(&index) = self.indices.get(&entry) {
            return index;
        }
        let index = self.next;
        self.next += entry.width();
        self.indices.insert(entry.clone(), index);
        self.entries.push((index, entry));
        index
    }

    /// Intern a Utf8 entry.
    pub fn utf8(&mut self, s: &str) -> u16 {
        self.intern(Entry::Utf8(s.to_owned()))
    }

    /// Look up the entry at a given index.
    pub fn entry(&self, index: u16) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, e)| e)
    }

    /// Resolve a `Class` entry's name string, following its Utf8 index.
    pub fn class_name(&self, index: u16) -> Option<&str> {
        match self.entry(index)? {
            Entry::Class(name) => match self.entry(*name)? {
                Entry::Utf8(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    /// Serialized pool: `u16` count (highest index + 1) followed by each
    /// entry. Wide entries are written once; their phantom second slot has
    /// no on-wire representation.
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.next.to_be_bytes());
        for (_, entry) in &self.entries {
            entry.write(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut pool = ConstPool::new();
        let a = pool.utf8("x");
        let b = pool.utf8("x");
        assert_eq!(a, b);
        assert_eq!(a, 1);
        assert_eq!(pool.utf8("y"), 2);
    }

    #[test]
    fn wide_entries_take_two_slots() {
        let mut pool = ConstPool::new();
        let l = pool.intern(Entry::Long(7));
        let after = pool.utf8("next");
        assert_eq!(l, 1);
        assert_eq!(after, 3);
    }

    #[test]
    fn serialization_layout() {
        let mut pool = ConstPool::new();
        pool.utf8("ab");
        pool.intern(Entry::Integer(-1));
        let bytes = pool.bytes();
        // count = 3, Utf8 tag 1 len 2 "ab", Integer tag 3 value -1
        assert_eq!(
            bytes,
            vec![0, 3, 1, 0, 2, b'a', b'b', 3, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn class_name_follows_utf8() {
        let mut pool = ConstPool::new();
        let name = pool.utf8("Foo");
        let class = pool.intern(Entry::Class(name));
        assert_eq!(pool.class_name(class), Some("Foo"));
    }
}
