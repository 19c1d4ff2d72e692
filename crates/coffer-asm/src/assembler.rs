//! Class-file assembly from a parsed tree.
//!
//! Scans the top-level items in order: constant bindings populate the pool
//! label table first, then fields, methods, interfaces and finally the
//! class declaration itself resolve their references. The interning order
//! is fixed by this traversal, so identical input produces identical pool
//! layout.

use coffer_classfile::flags::{ACC_INTERFACE, ACC_SUPER};
use coffer_classfile::{Attribute, ClassFile, MemberInfo, flags};

use crate::ast::{ClassUnit, Item, PoolRef};
use crate::code::assemble_code;
use crate::error::{AsmError, AsmResult};
use crate::pool::PoolHandle;

#[derive(Debug, Default, Clone)]
pub struct AssembleOptions {
    /// Emit a `LineNumberTable` per method and a `SourceFile` attribute.
    pub line_numbers: bool,
    /// Jasmin compatibility: add the implicit `SUPER` class flag.
    pub jasmin: bool,
    /// Value for the `SourceFile` attribute.
    pub source_name: Option<String>,
}

fn fold_flags(words: &[String], lookup: fn(&str) -> Option<u16>) -> u16 {
    words
        .iter()
        .filter_map(|w| lookup(w))
        .fold(0, |acc, bit| acc | bit)
}

/// Assemble a parsed class into `(class name, class-file bytes)`.
pub fn assemble(unit: &mut ClassUnit, options: &AssembleOptions) -> AsmResult<(String, Vec<u8>)> {
    let mut pool = PoolHandle::new();

    // Constant bindings first so every later reference can see them.
    for item in &unit.items {
        if let Item::Const { slot, value } = item {
            match slot {
                PoolRef::Label { name, .. } => pool.bind(name.clone(), value.clone()),
                _ => return Err(AsmError::UnsupportedAssignment),
            }
        }
    }

    let mut fields = Vec::new();
    let mut methods = Vec::new();

    for item in &mut unit.items {
        match item {
            Item::Const { .. } => {}
            Item::Field(field) => {
                let flag_bits = fold_flags(&field.flags, flags::field_flag);
                let name = field.name.to_index(&mut pool)?;
                let desc = field.desc.to_index(&mut pool)?;
                let mut attrs = Vec::new();
                if let Some(constant) = &mut field.constant {
                    let index = constant.to_index(&mut pool)?;
                    attrs.push(Attribute::new(
                        pool.utf8("ConstantValue"),
                        index.to_be_bytes().to_vec(),
                    ));
                }
                fields.push(MemberInfo {
                    flags: flag_bits,
                    name,
                    desc,
                    attrs,
                });
            }
            Item::Method(method) => {
                let flag_bits = fold_flags(&method.flags, flags::method_flag);
                let name = method.name.to_index(&mut pool)?;
                let desc = method.desc.to_index(&mut pool)?;
                let mut attrs = Vec::new();
                if let Some(code) =
                    assemble_code(&mut method.body, &mut pool, options.line_numbers)?
                {
                    attrs.push(code);
                }
                methods.push(MemberInfo {
                    flags: flag_bits,
                    name,
                    desc,
                    attrs,
                });
            }
        }
    }

    let mut attrs = Vec::new();
    if options.line_numbers {
        let source = options.source_name.as_deref().unwrap_or("SourceFile");
        let value = pool.utf8(source);
        attrs.push(Attribute::new(
            pool.utf8("SourceFile"),
            value.to_be_bytes().to_vec(),
        ));
    }

    let mut interfaces = Vec::new();
    for interface in &mut unit.interfaces {
        interfaces.push(interface.to_index(&mut pool)?);
    }

    let mut flag_bits = fold_flags(&unit.flags, flags::class_flag);
    if unit.interface {
        flag_bits |= ACC_INTERFACE;
    }
    if options.jasmin {
        flag_bits |= ACC_SUPER;
    }

    let this = unit.this.to_index(&mut pool)?;
    let super_ = unit.super_.to_index(&mut pool)?;

    let class = ClassFile {
        flags: flag_bits,
        this,
        super_,
        interfaces,
        fields,
        methods,
        attrs,
    };
    let name = pool
        .pool()
        .class_name(this)
        .unwrap_or_default()
        .to_owned();
    let bytes = class.to_bytes(pool.pool());
    Ok((name, bytes))
}
