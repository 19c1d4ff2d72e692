//! Static instruction catalogue.
//!
//! One entry per opcode: the opcode byte is the mnemonic's position in
//! [`MNEMONICS`]. Each fixed-layout opcode has an operand [`Format`] from a
//! closed set; `wide`, `tableswitch` and `lookupswitch` are variable-length
//! and measured by the code assembler instead. The catalogue also records
//! whether an opcode's immediate is a code label and how the parser should
//! read its operands.
//!
//! Built once at startup from this declarative table.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Operand byte layout of a fixed-length instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    None,
    U8,
    I8,
    U16,
    I16,
    I32,
    U8I8,
    U16U8,
}

impl Format {
    /// Encoded operand size in bytes (excluding the opcode byte).
    pub fn size(self) -> usize {
        match self {
            Format::None => 0,
            Format::U8 | Format::I8 => 1,
            Format::U16 | Format::I16 => 2,
            Format::I32 => 4,
            Format::U8I8 => 2,
            Format::U16U8 => 3,
        }
    }
}

/// How the parser reads an instruction's operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseShape {
    /// No operands.
    NoArgs,
    /// One integer literal.
    Int,
    /// Two integer literals (`iinc`).
    IntInt,
    /// One code label.
    Branch,
    /// Field reference: `class name desc` or a `[ref]`.
    FieldRef,
    /// Method reference: `class name desc` or a `[ref]`.
    MethodRef,
    /// Method reference plus a count (`invokeinterface`).
    MethodInt,
    /// Class reference: a name word or a `[ref]`.
    ClassRef,
    /// Class reference plus a dimension count (`multianewarray`).
    ClassInt,
    /// Loadable single-word constant (`ldc`, `ldc_w`).
    Ldc,
    /// Loadable double-word constant (`ldc2_w`).
    Ldc2,
    /// Primitive array type keyword (`newarray`).
    NewArray,
    /// `wide` prefix followed by a widened sub-instruction.
    Wide,
    /// Multi-line `tableswitch` body.
    TableSwitch,
    /// Multi-line `lookupswitch` body.
    LookupSwitch,
}

/// Catalogue record for one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub opcode: u8,
    pub format: Format,
    /// The sole immediate is a code label, substituted with a signed
    /// offset relative to the opcode's start.
    pub branch: bool,
    pub shape: ParseShape,
}

/// Every mnemonic in opcode order: the index is the opcode byte.
pub const MNEMONICS: [&str; 202] = [
    "nop",
    "aconst_null",
    "iconst_m1",
    "iconst_0",
    "iconst_1",
    "iconst_2",
    "iconst_3",
    "iconst_4",
    "iconst_5",
    "lconst_0",
    "lconst_1",
    "fconst_0",
    "fconst_1",
    "fconst_2",
    "dconst_0",
    "dconst_1",
    "bipush",
    "sipush",
    "ldc",
    "ldc_w",
    "ldc2_w",
    "iload",
    "lload",
    "fload",
    "dload",
    "aload",
    "iload_0",
    "iload_1",
    "iload_2",
    "iload_3",
    "lload_0",
    "lload_1",
    "lload_2",
    "lload_3",
    "fload_0",
    "fload_1",
    "fload_2",
    "fload_3",
    "dload_0",
    "dload_1",
    "dload_2",
    "dload_3",
    "aload_0",
    "aload_1",
    "aload_2",
    "aload_3",
    "iaload",
    "laload",
    "faload",
    "daload",
    "aaload",
    "baload",
    "caload",
    "saload",
    "istore",
    "lstore",
    "fstore",
    "dstore",
    "astore",
    "istore_0",
    "istore_1",
    "istore_2",
    "istore_3",
    "lstore_0",
    "lstore_1",
    "lstore_2",
    "lstore_3",
    "fstore_0",
    "fstore_1",
    "fstore_2",
    "fstore_3",
    "dstore_0",
    "dstore_1",
    "dstore_2",
    "dstore_3",
    "astore_0",
    "astore_1",
    "astore_2",
    "astore_3",
    "iastore",
    "lastore",
    "fastore",
    "dastore",
    "aastore",
    "bastore",
    "castore",
    "sastore",
    "pop",
    "pop2",
    "dup",
    "dup_x1",
    "dup_x2",
    "dup2",
    "dup2_x1",
    "dup2_x2",
    "swap",
    "iadd",
    "ladd",
    "fadd",
    "dadd",
    "isub",
    "lsub",
    "fsub",
    "dsub",
    "imul",
    "lmul",
    "fmul",
    "dmul",
    "idiv",
    "ldiv",
    "fdiv",
    "ddiv",
    "irem",
    "lrem",
    "frem",
    "drem",
    "ineg",
    "lneg",
    "fneg",
    "dneg",
    "ishl",
    "lshl",
    "ishr",
    "lshr",
    "iushr",
    "lushr",
    "iand",
    "land",
    "ior",
    "lor",
    "ixor",
    "lxor",
    "iinc",
    "i2l",
    "i2f",
    "i2d",
    "l2i",
    "l2f",
    "l2d",
    "f2i",
    "f2l",
    "f2d",
    "d2i",
    "d2l",
    "d2f",
    "i2b",
    "i2c",
    "i2s",
    "lcmp",
    "fcmpl",
    "fcmpg",
    "dcmpl",
    "dcmpg",
    "ifeq",
    "ifne",
    "iflt",
    "ifge",
    "ifgt",
    "ifle",
    "if_icmpeq",
    "if_icmpne",
    "if_icmplt",
    "if_icmpge",
    "if_icmpgt",
    "if_icmple",
    "if_acmpeq",
    "if_acmpne",
    "goto",
    "jsr",
    "ret",
    "tableswitch",
    "lookupswitch",
    "ireturn",
    "lreturn",
    "freturn",
    "dreturn",
    "areturn",
    "return",
    "getstatic",
    "putstatic",
    "getfield",
    "putfield",
    "invokevirtual",
    "invokespecial",
    "invokestatic",
    "invokeinterface",
    "invokedynamic",
    "new",
    "newarray",
    "anewarray",
    "arraylength",
    "athrow",
    "checkcast",
    "instanceof",
    "monitorenter",
    "monitorexit",
    "wide",
    "multianewarray",
    "ifnull",
    "ifnonnull",
    "goto_w",
    "jsr_w",
];

fn format_of(mnemonic: &str) -> Format {
    match mnemonic {
        "iload" | "lload" | "fload" | "dload" | "aload" | "istore" | "lstore" | "fstore"
        | "dstore" | "astore" | "ret" | "ldc" | "newarray" => Format::U8,
        "bipush" => Format::I8,
        "sipush" | "ifeq" | "ifne" | "iflt" | "ifge" | "ifgt" | "ifle" | "if_icmpeq"
        | "if_icmpne" | "if_icmplt" | "if_icmpge" | "if_icmpgt" | "if_icmple" | "if_acmpeq"
        | "if_acmpne" | "goto" | "jsr" | "ifnull" | "ifnonnull" => Format::I16,
        "ldc_w" | "ldc2_w" | "getstatic" | "putstatic" | "getfield" | "putfield"
        | "invokevirtual" | "invokespecial" | "invokestatic" | "invokedynamic" | "new"
        | "anewarray" | "checkcast" | "instanceof" => Format::U16,
        "iinc" => Format::U8I8,
        "invokeinterface" | "multianewarray" => Format::U16U8,
        "goto_w" | "jsr_w" => Format::I32,
        _ => Format::None,
    }
}

fn is_branch(mnemonic: &str) -> bool {
    matches!(
        mnemonic,
        "ifeq"
            | "ifne"
            | "iflt"
            | "ifge"
            | "ifgt"
            | "ifle"
            | "if_icmpeq"
            | "if_icmpne"
            | "if_icmplt"
            | "if_icmpge"
            | "if_icmpgt"
            | "if_icmple"
            | "if_acmpeq"
            | "if_acmpne"
            | "goto"
            | "jsr"
            | "ifnull"
            | "ifnonnull"
            | "goto_w"
            | "jsr_w"
    )
}

fn shape_of(mnemonic: &str) -> ParseShape {
    if is_branch(mnemonic) {
        return ParseShape::Branch;
    }
    match mnemonic {
        "bipush" | "sipush" | "iload" | "lload" | "fload" | "dload" | "aload" | "istore"
        | "lstore" | "fstore" | "dstore" | "astore" | "ret" => ParseShape::Int,
        "iinc" => ParseShape::IntInt,
        "getstatic" | "putstatic" | "getfield" | "putfield" => ParseShape::FieldRef,
        "invokevirtual" | "invokespecial" | "invokestatic" | "invokedynamic" => {
            ParseShape::MethodRef
        }
        "invokeinterface" => ParseShape::MethodInt,
        "new" | "anewarray" | "checkcast" | "instanceof" => ParseShape::ClassRef,
        "multianewarray" => ParseShape::ClassInt,
        "ldc" | "ldc_w" => ParseShape::Ldc,
        "ldc2_w" => ParseShape::Ldc2,
        "newarray" => ParseShape::NewArray,
        "wide" => ParseShape::Wide,
        "tableswitch" => ParseShape::TableSwitch,
        "lookupswitch" => ParseShape::LookupSwitch,
        _ => ParseShape::NoArgs,
    }
}

/// The process-wide catalogue, keyed by mnemonic.
pub fn catalogue() -> &'static HashMap<&'static str, OpInfo> {
    static TABLE: OnceLock<HashMap<&'static str, OpInfo>> = OnceLock::new();
    TABLE.get_or_init(|| {
        MNEMONICS
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let info = OpInfo {
                    opcode: i as u8,
                    format: format_of(m),
                    branch: is_branch(m),
                    shape: shape_of(m),
                };
                (m, info)
            })
            .collect()
    })
}

/// Catalogue entry for a mnemonic, if it names an instruction.
pub fn info(mnemonic: &str) -> Option<&'static OpInfo> {
    catalogue().get(mnemonic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_bytes_match_positions() {
        assert_eq!(info("nop").unwrap().opcode, 0x00);
        assert_eq!(info("ldc").unwrap().opcode, 0x12);
        assert_eq!(info("bipush").unwrap().opcode, 0x10);
        assert_eq!(info("goto").unwrap().opcode, 0xA7);
        assert_eq!(info("tableswitch").unwrap().opcode, 0xAA);
        assert_eq!(info("lookupswitch").unwrap().opcode, 0xAB);
        assert_eq!(info("wide").unwrap().opcode, 0xC4);
        assert_eq!(info("invokedynamic").unwrap().opcode, 0xBA);
        assert_eq!(info("jsr_w").unwrap().opcode, 0xC9);
    }

    #[test]
    fn formats_and_branches() {
        assert_eq!(info("ldc").unwrap().format, Format::U8);
        assert_eq!(info("ldc_w").unwrap().format, Format::U16);
        assert_eq!(info("goto").unwrap().format, Format::I16);
        assert!(info("goto").unwrap().branch);
        assert!(!info("sipush").unwrap().branch);
        assert_eq!(info("iinc").unwrap().format.size(), 2);
        assert_eq!(info("invokeinterface").unwrap().format.size(), 3);
    }
}
