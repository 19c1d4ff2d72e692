//! Class-file data model shared by the assembler and the CLI.
//!
//! This crate owns the binary shape of a class file:
//! - `pool` - the interning constant pool and its serialization
//! - `flags` - access-flag keyword tables for classes, fields and methods
//! - `raw` - attribute, member and top-level container serialization
//!
//! Everything here is mechanical byte layout; the interesting deferred
//! resolution logic (labelled pool references, branch offsets) lives in
//! `coffer-asm`.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod flags;
pub mod pool;
pub mod raw;

pub use pool::{ConstPool, Entry};
pub use raw::{Attribute, ClassFile, MemberInfo};
