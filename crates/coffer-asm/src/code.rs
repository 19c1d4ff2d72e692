//! Code-attribute assembly.
//!
//! Two passes over the method body. The layout pass records each label's
//! offset and each instruction's start, advancing by
//! [`instruction_len`] - which takes the current offset, because switch
//! padding depends on it. The emit pass then serializes operands, resolving
//! pool references and substituting label offsets. Both passes compute the
//! same lengths by construction; a mismatch is a bug, caught by a debug
//! assertion rather than surfaced as an error.

use std::collections::HashMap;

use coffer_classfile::Attribute;

use crate::ast::{Directive, Instr, Operand, Statement, is_catch_all};
use crate::codes::{self, Format};
use crate::error::{AsmError, AsmResult};
use crate::pool::PoolHandle;

/// Zero bytes needed before the default-offset field of a switch
/// instruction at `pos` so the field lands 4-byte-aligned.
pub fn switch_padding(pos: usize) -> usize {
    (3 + 4 - (pos % 4)) % 4
}

/// Encoded length of an instruction starting at `pos`.
pub fn instruction_len(instr: &Instr, pos: usize) -> usize {
    match instr {
        Instr::Plain { op, .. } => {
            let info = codes::info(op).expect("mnemonic validated at parse time");
            1 + info.format.size()
        }
        Instr::Wide { operands, .. } => 2 + 2 * operands.len(),
        Instr::TableSwitch { targets, .. } => 13 + switch_padding(pos) + 4 * targets.len(),
        Instr::LookupSwitch { pairs, .. } => 9 + switch_padding(pos) + 8 * pairs.len(),
    }
}

fn label_value(labels: &HashMap<String, usize>, label: &str) -> AsmResult<usize> {
    labels.get(label).copied().ok_or_else(|| {
        let mut known: Vec<String> = labels.keys().cloned().collect();
        known.sort();
        AsmError::UndefinedLabel {
            label: label.to_owned(),
            known,
        }
    })
}

fn label_offset(labels: &HashMap<String, usize>, label: &str, pos: usize) -> AsmResult<i64> {
    Ok(label_value(labels, label)? as i64 - pos as i64)
}

fn resolve_operand(
    operand: &mut Operand,
    labels: &HashMap<String, usize>,
    pos: usize,
    pool: &mut PoolHandle,
) -> AsmResult<i64> {
    match operand {
        Operand::Imm(v) => Ok(*v),
        Operand::Pool(r) => Ok(r.to_index(pool)? as i64),
        Operand::Target(l) => label_offset(labels, l, pos),
    }
}

fn emit_instruction(
    instr: &mut Instr,
    labels: &HashMap<String, usize>,
    pos: usize,
    pool: &mut PoolHandle,
    out: &mut Vec<u8>,
) -> AsmResult<()> {
    match instr {
        Instr::Plain { op, operands } => {
            let info = codes::info(op).expect("mnemonic validated at parse time");
            out.push(info.opcode);
            let mut values = Vec::with_capacity(operands.len());
            for operand in operands.iter_mut() {
                values.push(resolve_operand(operand, labels, pos, pool)?);
            }
            match info.format {
                Format::None => {}
                Format::U8 => out.push(values[0] as u8),
                Format::I8 => out.push(values[0] as i8 as u8),
                Format::U16 => out.extend_from_slice(&(values[0] as u16).to_be_bytes()),
                Format::I16 => out.extend_from_slice(&(values[0] as i16).to_be_bytes()),
                Format::I32 => out.extend_from_slice(&(values[0] as i32).to_be_bytes()),
                Format::U8I8 => {
                    out.push(values[0] as u8);
                    out.push(values[1] as i8 as u8);
                }
                Format::U16U8 => {
                    out.extend_from_slice(&(values[0] as u16).to_be_bytes());
                    out.push(values[1] as u8);
                }
            }
        }
        Instr::Wide { op, operands } => {
            out.push(codes::info("wide").expect("wide in catalogue").opcode);
            out.push(codes::info(op).expect("sub-op validated at parse time").opcode);
            for v in operands.iter() {
                out.extend_from_slice(&v.to_be_bytes());
            }
        }
        Instr::TableSwitch {
            low,
            targets,
            default,
        } => {
            out.push(codes::info("tableswitch").expect("in catalogue").opcode);
            out.extend(std::iter::repeat_n(0u8, switch_padding(pos)));
            let default = label_offset(labels, default, pos)? as i32;
            let high = *low + targets.len() as i32 - 1;
            out.extend_from_slice(&default.to_be_bytes());
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
            for target in targets.iter() {
                let offset = label_offset(labels, target, pos)? as i32;
                out.extend_from_slice(&offset.to_be_bytes());
            }
        }
        Instr::LookupSwitch { pairs, default } => {
            out.push(codes::info("lookupswitch").expect("in catalogue").opcode);
            out.extend(std::iter::repeat_n(0u8, switch_padding(pos)));
            let default = label_offset(labels, default, pos)? as i32;
            out.extend_from_slice(&default.to_be_bytes());
            out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
            let mut sorted: Vec<(i32, i32)> = Vec::with_capacity(pairs.len());
            for (key, target) in pairs.iter() {
                sorted.push((*key, label_offset(labels, target, pos)? as i32));
            }
            sorted.sort_by_key(|&(key, _)| key);
            for (key, offset) in sorted {
                out.extend_from_slice(&key.to_be_bytes());
                out.extend_from_slice(&offset.to_be_bytes());
            }
        }
    }
    Ok(())
}

/// Assemble a method body into its `Code` attribute. Returns `None` when
/// the body has no statements (abstract and native methods).
pub fn assemble_code(
    body: &mut [Statement],
    pool: &mut PoolHandle,
    line_numbers: bool,
) -> AsmResult<Option<Attribute>> {
    if body.is_empty() {
        return Ok(None);
    }

    // Layout pass: label offsets and instruction starts.
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut starts = Vec::new();
    let mut pos = 0usize;
    for stmt in body.iter() {
        if let Statement::Code { label, instr } = stmt {
            if let Some(l) = label {
                labels.insert(l.clone(), pos);
            }
            if let Some(i) = instr {
                starts.push(pos);
                pos += instruction_len(i, pos);
            }
        }
    }

    // Emit pass.
    let mut code = Vec::new();
    for stmt in body.iter_mut() {
        if let Statement::Code {
            instr: Some(instr), ..
        } = stmt
        {
            let start = code.len();
            emit_instruction(instr, &labels, start, pool, &mut code)?;
            debug_assert_eq!(code.len() - start, instruction_len(instr, start));
        }
    }

    // Directives: limits take the minimum, catches build the exception
    // table. A catch type spelled `all` means catch-type index 0.
    let mut max_stack = 65535u16;
    let mut max_locals = 65535u16;
    let mut excepts: Vec<[u16; 4]> = Vec::new();
    for stmt in body.iter_mut() {
        if let Statement::Directive(d) = stmt {
            match d {
                Directive::Catch {
                    class,
                    from,
                    to,
                    using,
                } => {
                    let type_index = if is_catch_all(class) {
                        0
                    } else {
                        class.to_index(pool)?
                    };
                    excepts.push([
                        label_value(&labels, from)? as u16,
                        label_value(&labels, to)? as u16,
                        label_value(&labels, using)? as u16,
                        type_index,
                    ]);
                }
                Directive::LimitStack(n) => max_stack = max_stack.min(*n),
                Directive::LimitLocals(n) => max_locals = max_locals.min(*n),
            }
        }
    }

    let mut attrs: Vec<Attribute> = Vec::new();
    if line_numbers {
        let mut data = Vec::new();
        data.extend_from_slice(&(starts.len() as u16).to_be_bytes());
        for &start in &starts {
            data.extend_from_slice(&(start as u16).to_be_bytes());
            data.extend_from_slice(&(start as u16).to_be_bytes());
        }
        attrs.push(Attribute::new(pool.utf8("LineNumberTable"), data));
    }

    let name = pool.utf8("Code");
    let mut data = Vec::new();
    data.extend_from_slice(&max_stack.to_be_bytes());
    data.extend_from_slice(&max_locals.to_be_bytes());
    data.extend_from_slice(&(code.len() as u32).to_be_bytes());
    data.extend_from_slice(&code);
    data.extend_from_slice(&(excepts.len() as u16).to_be_bytes());
    for except in &excepts {
        for v in except {
            data.extend_from_slice(&v.to_be_bytes());
        }
    }
    data.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    for attr in &attrs {
        attr.write(&mut data);
    }
    Ok(Some(Attribute::new(name, data)))
}
