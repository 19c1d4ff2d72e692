//! The assembly tree and deferred constant-pool references.
//!
//! The parser produces a [`ClassUnit`]; the assembler consumes it. Pool
//! references resolve lazily against the [`crate::pool::PoolHandle`] and
//! memoise their index, so a reference shared between statements interns
//! its entry exactly once.

use coffer_classfile::Entry;

use crate::error::AsmResult;
use crate::pool::PoolHandle;

/// A deferred constant-pool reference.
#[derive(Debug, Clone)]
pub enum PoolRef {
    /// Already a concrete index.
    Index(u16),
    /// Names another pool reference via the label table.
    Label { name: String, cached: Option<u16> },
    /// A tagged entry whose sub-references resolve first.
    Item { spec: ItemSpec, cached: Option<u16> },
}

/// Structural pool entry with unresolved sub-references.
#[derive(Debug, Clone)]
pub enum ItemSpec {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(Box<PoolRef>),
    Str(Box<PoolRef>),
    NameAndType(Box<PoolRef>, Box<PoolRef>),
    Fieldref(Box<PoolRef>, Box<PoolRef>),
    Methodref(Box<PoolRef>, Box<PoolRef>),
    InterfaceMethodref(Box<PoolRef>, Box<PoolRef>),
    InvokeDynamic(Box<PoolRef>, Box<PoolRef>),
}

impl PoolRef {
    pub fn label(name: impl Into<String>) -> Self {
        PoolRef::Label {
            name: name.into(),
            cached: None,
        }
    }

    pub fn item(spec: ItemSpec) -> Self {
        PoolRef::Item { spec, cached: None }
    }

    pub fn utf8(s: impl Into<String>) -> Self {
        PoolRef::item(ItemSpec::Utf8(s.into()))
    }

    pub fn class(name: PoolRef) -> Self {
        PoolRef::item(ItemSpec::Class(Box::new(name)))
    }

    pub fn class_of(name: impl Into<String>) -> Self {
        PoolRef::class(PoolRef::utf8(name))
    }

    pub fn name_and_type(name: PoolRef, desc: PoolRef) -> Self {
        PoolRef::item(ItemSpec::NameAndType(Box::new(name), Box::new(desc)))
    }

    pub fn fieldref(class: &str, name: &str, desc: &str) -> Self {
        PoolRef::item(ItemSpec::Fieldref(
            Box::new(PoolRef::class_of(class)),
            Box::new(PoolRef::name_and_type(
                PoolRef::utf8(name),
                PoolRef::utf8(desc),
            )),
        ))
    }

    pub fn methodref(class: &str, name: &str, desc: &str) -> Self {
        PoolRef::item(ItemSpec::Methodref(
            Box::new(PoolRef::class_of(class)),
            Box::new(PoolRef::name_and_type(
                PoolRef::utf8(name),
                PoolRef::utf8(desc),
            )),
        ))
    }

    /// Resolve to a pool index, interning as needed. The result is
    /// memoised: a second call returns the same index without touching
    /// the pool.
    pub fn to_index(&mut self, pool: &mut PoolHandle) -> AsmResult<u16> {
        let mut forbidden = Vec::new();
        self.to_index_inner(pool, &mut forbidden)
    }

    /// Resolution with an explicit forbidden-label path. Labelled
    /// references thread the path through; structural sub-references
    /// restart with an empty one (their resolution is independent).
    pub(crate) fn to_index_inner(
        &mut self,
        pool: &mut PoolHandle,
        forbidden: &mut Vec<String>,
    ) -> AsmResult<u16> {
        match self {
            PoolRef::Index(index) => Ok(*index),
            PoolRef::Label { name, cached } => {
                if let Some(index) = cached {
                    return Ok(*index);
                }
                let index = pool.resolve_label(name, forbidden)?;
                *cached = Some(index);
                Ok(index)
            }
            PoolRef::Item { spec, cached } => {
                if let Some(index) = cached {
                    return Ok(*index);
                }
                let entry = spec.resolve(pool)?;
                let index = pool.intern(entry);
                *cached = Some(index);
                Ok(index)
            }
        }
    }
}

impl ItemSpec {
    fn resolve(&mut self, pool: &mut PoolHandle) -> AsmResult<Entry> {
        Ok(match self {
            ItemSpec::Utf8(s) => Entry::Utf8(s.clone()),
            ItemSpec::Integer(v) => Entry::Integer(*v),
            ItemSpec::Float(v) => Entry::Float(v.to_bits()),
            ItemSpec::Long(v) => Entry::Long(*v),
            ItemSpec::Double(v) => Entry::Double(v.to_bits()),
            ItemSpec::Class(r) => Entry::Class(r.to_index(pool)?),
            ItemSpec::Str(r) => Entry::String(r.to_index(pool)?),
            ItemSpec::NameAndType(a, b) => {
                Entry::NameAndType(a.to_index(pool)?, b.to_index(pool)?)
            }
            ItemSpec::Fieldref(a, b) => Entry::Fieldref(a.to_index(pool)?, b.to_index(pool)?),
            ItemSpec::Methodref(a, b) => Entry::Methodref(a.to_index(pool)?, b.to_index(pool)?),
            ItemSpec::InterfaceMethodref(a, b) => {
                Entry::InterfaceMethodref(a.to_index(pool)?, b.to_index(pool)?)
            }
            ItemSpec::InvokeDynamic(a, b) => {
                Entry::InvokeDynamic(a.to_index(pool)?, b.to_index(pool)?)
            }
        })
    }
}

/// One parsed source file: class declaration plus top-level items.
#[derive(Debug)]
pub struct ClassUnit {
    pub interface: bool,
    pub flags: Vec<String>,
    pub this: PoolRef,
    pub super_: PoolRef,
    pub interfaces: Vec<PoolRef>,
    pub items: Vec<Item>,
}

#[derive(Debug)]
pub enum Item {
    /// `.const [label] = <spec>`
    Const { slot: PoolRef, value: PoolRef },
    Field(FieldDecl),
    Method(MethodDecl),
}

#[derive(Debug)]
pub struct FieldDecl {
    pub flags: Vec<String>,
    pub name: PoolRef,
    pub desc: PoolRef,
    pub constant: Option<PoolRef>,
}

#[derive(Debug)]
pub struct MethodDecl {
    pub flags: Vec<String>,
    pub name: PoolRef,
    pub desc: PoolRef,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
    Directive(Directive),
    /// A code line: optional label, optional instruction.
    Code {
        label: Option<String>,
        instr: Option<Instr>,
    },
}

#[derive(Debug)]
pub enum Directive {
    Catch {
        class: PoolRef,
        from: String,
        to: String,
        using: String,
    },
    LimitStack(u16),
    LimitLocals(u16),
}

/// An instruction operand before emission.
#[derive(Debug)]
pub enum Operand {
    /// Immediate integer, packed per the opcode's format.
    Imm(i64),
    /// Pool reference, resolved to its index at emission.
    Pool(PoolRef),
    /// Code label, substituted with a signed offset.
    Target(String),
}

#[derive(Debug)]
pub enum Instr {
    /// Fixed-layout instruction from the catalogue.
    Plain {
        op: &'static str,
        operands: Vec<Operand>,
    },
    /// `wide` prefix: sub-opcode plus operands widened to u16.
    Wide {
        op: &'static str,
        operands: Vec<u16>,
    },
    TableSwitch {
        low: i32,
        targets: Vec<String>,
        default: String,
    },
    LookupSwitch {
        pairs: Vec<(i32, String)>,
        default: String,
    },
}

impl Instr {
    pub fn plain(op: &'static str, operands: Vec<Operand>) -> Self {
        Instr::Plain { op, operands }
    }
}

/// `.catch` class token spelled `all` (Jasmin compatibility check).
pub fn is_catch_all(class: &PoolRef) -> bool {
    matches!(
        class,
        PoolRef::Item {
            spec: ItemSpec::Class(name),
            ..
        } if matches!(&**name, PoolRef::Item { spec: ItemSpec::Utf8(s), .. } if s == "all")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolHandle;

    #[test]
    fn structural_resolution_interns_bottom_up() {
        let mut pool = PoolHandle::new();
        let mut r = PoolRef::methodref("java/lang/Object", "<init>", "()V");
        let index = r.to_index(&mut pool).unwrap();
        // utf8 name, class, utf8 <init>, utf8 desc, nat, methodref
        assert_eq!(index, 6);
        // Memoised: a second resolution returns the same index.
        assert_eq!(r.to_index(&mut pool).unwrap(), 6);
    }

    #[test]
    fn catch_all_detection() {
        assert!(is_catch_all(&PoolRef::class_of("all")));
        assert!(!is_catch_all(&PoolRef::class_of("java/lang/Exception")));
    }
}
