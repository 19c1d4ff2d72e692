//! Raw class-file serialization.
//!
//! Attributes, field/method infos and the top-level container are plain
//! length-prefixed big-endian records. All index values here are already
//! resolved constant-pool indices.

use crate::pool::ConstPool;

pub const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];
pub const MINOR_VERSION: u16 = 0;
pub const MAJOR_VERSION: u16 = 49;

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

/// A named attribute: `u16 name; u32 length; bytes`.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: u16,
    pub data: Vec<u8>,
}

impl Attribute {
    pub fn new(name: u16, data: Vec<u8>) -> Self {
        Self { name, data }
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.name);
        put_u32(out, self.data.len() as u32);
        out.extend_from_slice(&self.data);
    }
}

/// A field or method record. Both share the same on-wire layout:
/// `u16 flags; u16 name; u16 desc; u16 attr_count; attrs...`.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub flags: u16,
    pub name: u16,
    pub desc: u16,
    pub attrs: Vec<Attribute>,
}

impl MemberInfo {
    pub fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.flags);
        put_u16(out, self.name);
        put_u16(out, self.desc);
        put_u16(out, self.attrs.len() as u16);
        for attr in &self.attrs {
            attr.write(out);
        }
    }
}

/// Top-level class-file container.
#[derive(Debug, Default)]
pub struct ClassFile {
    pub flags: u16,
    pub this: u16,
    pub super_: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<MemberInfo>,
    pub methods: Vec<MemberInfo>,
    pub attrs: Vec<Attribute>,
}

impl ClassFile {
    /// Serialize: magic, version, pool, flags/this/super, then the four
    /// length-prefixed lists.
    pub fn to_bytes(&self, pool: &ConstPool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        put_u16(&mut out, MINOR_VERSION);
        put_u16(&mut out, MAJOR_VERSION);
        out.extend_from_slice(&pool.bytes());
        put_u16(&mut out, self.flags);
        put_u16(&mut out, self.this);
        put_u16(&mut out, self.super_);
        put_u16(&mut out, self.interfaces.len() as u16);
        for &iface in &self.interfaces {
            put_u16(&mut out, iface);
        }
        put_u16(&mut out, self.fields.len() as u16);
        for field in &self.fields {
            field.write(&mut out);
        }
        put_u16(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            method.write(&mut out);
        }
        put_u16(&mut out, self.attrs.len() as u16);
        for attr in &self.attrs {
            attr.write(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Entry;

    #[test]
    fn attribute_layout() {
        let mut out = Vec::new();
        Attribute::new(5, vec![1, 2, 3]).write(&mut out);
        assert_eq!(out, vec![0, 5, 0, 0, 0, 3, 1, 2, 3]);
    }

    #[test]
    fn empty_class_round() {
        let mut pool = ConstPool::new();
        let this_name = pool.utf8("Foo");
        let this = pool.intern(Entry::Class(this_name));
        let class = ClassFile {
            flags: 0x21,
            this,
            super_: 0,
            ..Default::default()
        };
        let bytes = class.to_bytes(&pool);
        assert_eq!(&bytes[..4], &MAGIC);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 49]);
        // Trailing four u16 zero counts: interfaces, fields, methods, attrs.
        assert_eq!(&bytes[bytes.len() - 8..], &[0, 0, 0, 0, 0, 0, 0, 0]);
    }
}
