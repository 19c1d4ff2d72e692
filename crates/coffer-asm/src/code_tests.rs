use crate::ast::{Directive, Instr, Operand, PoolRef, Statement};
use crate::code::{assemble_code, instruction_len, switch_padding};
use crate::pool::PoolHandle;

fn code_stmt(label: Option<&str>, instr: Option<Instr>) -> Statement {
    Statement::Code {
        label: label.map(str::to_owned),
        instr,
    }
}

/// Pull the code array back out of a serialized `Code` attribute.
fn code_bytes(data: &[u8]) -> &[u8] {
    let len = u32::from_be_bytes(data[4..8].try_into().unwrap()) as usize;
    &data[8..8 + len]
}

#[test]
fn ldc_bipush_goto_round() {
    let mut pool = PoolHandle::new();
    // Fill two slots so "x" interns at index 3.
    pool.utf8("filler_a");
    pool.utf8("filler_b");
    pool.bind("s1", PoolRef::utf8("x"));

    let mut body = vec![
        code_stmt(
            Some("L0"),
            Some(Instr::plain(
                "ldc",
                vec![Operand::Pool(PoolRef::label("s1"))],
            )),
        ),
        code_stmt(None, Some(Instr::plain("bipush", vec![Operand::Imm(5)]))),
        code_stmt(
            None,
            Some(Instr::plain(
                "goto",
                vec![Operand::Target("L0".to_owned())],
            )),
        ),
    ];

    let attr = assemble_code(&mut body, &mut pool, false).unwrap().unwrap();
    // goto sits at offset 4, so its offset back to L0 is -4.
    assert_eq!(
        code_bytes(&attr.data),
        &[0x12, 0x03, 0x10, 0x05, 0xA7, 0xFF, 0xFC]
    );
}

#[test]
fn switch_padding_depends_on_position() {
    assert_eq!(switch_padding(0), 3);
    assert_eq!(switch_padding(1), 2);
    assert_eq!(switch_padding(3), 0);
    assert_eq!(switch_padding(4), 3);
}

#[test]
fn tableswitch_at_offset_one_is_nineteen_bytes() {
    let instr = Instr::TableSwitch {
        low: 0,
        targets: vec!["L1".to_owned()],
        default: "L2".to_owned(),
    };
    assert_eq!(instruction_len(&instr, 1), 19);
}

#[test]
fn tableswitch_default_field_is_aligned() {
    let mut pool = PoolHandle::new();
    let mut body = vec![
        code_stmt(Some("L1"), Some(Instr::plain("iconst_0", vec![]))),
        code_stmt(
            None,
            Some(Instr::TableSwitch {
                low: 7,
                targets: vec!["L1".to_owned()],
                default: "L2".to_owned(),
            }),
        ),
        code_stmt(Some("L2"), Some(Instr::plain("return", vec![]))),
    ];
    let attr = assemble_code(&mut body, &mut pool, false).unwrap().unwrap();
    let code = code_bytes(&attr.data);

    // iconst_0 (1 byte), tableswitch opcode at 1, padding 2: default at 4.
    assert_eq!(code[1], 0xAA);
    assert_eq!(&code[2..4], &[0, 0]);
    let default_at = 4;
    assert_eq!(default_at % 4, 0);
    // default jumps from the switch opcode (offset 1) to L2 (offset 20).
    let default = i32::from_be_bytes(code[4..8].try_into().unwrap());
    assert_eq!(default, 19);
    let low = i32::from_be_bytes(code[8..12].try_into().unwrap());
    let high = i32::from_be_bytes(code[12..16].try_into().unwrap());
    assert_eq!((low, high), (7, 7));
}

#[test]
fn lookupswitch_sorts_cases_by_key() {
    let mut pool = PoolHandle::new();
    let mut body = vec![
        code_stmt(
            Some("L0"),
            Some(Instr::LookupSwitch {
                pairs: vec![(10, "L0".to_owned()), (-3, "L0".to_owned())],
                default: "L0".to_owned(),
            }),
        ),
    ];
    let attr = assemble_code(&mut body, &mut pool, false).unwrap().unwrap();
    let code = code_bytes(&attr.data);
    // opcode, 3 padding bytes, default, count = 2, then sorted pairs.
    assert_eq!(code[0], 0xAB);
    let count = i32::from_be_bytes(code[8..12].try_into().unwrap());
    assert_eq!(count, 2);
    let first_key = i32::from_be_bytes(code[12..16].try_into().unwrap());
    let second_key = i32::from_be_bytes(code[20..24].try_into().unwrap());
    assert_eq!((first_key, second_key), (-3, 10));
}

#[test]
fn emit_length_matches_layout_length() {
    let mut pool = PoolHandle::new();
    let mut body = vec![
        code_stmt(Some("start"), Some(Instr::plain("iconst_0", vec![]))),
        code_stmt(None, Some(Instr::plain("sipush", vec![Operand::Imm(300)]))),
        code_stmt(
            None,
            Some(Instr::Wide {
                op: "iinc",
                operands: vec![300, 5],
            }),
        ),
        code_stmt(
            None,
            Some(Instr::LookupSwitch {
                pairs: vec![(1, "start".to_owned())],
                default: "start".to_owned(),
            }),
        ),
        code_stmt(None, Some(Instr::plain("return", vec![]))),
    ];

    // Layout lengths, accumulated the same way the layout pass does.
    let mut expected = 0usize;
    for stmt in &body {
        if let Statement::Code {
            instr: Some(instr), ..
        } = stmt
        {
            expected += instruction_len(instr, expected);
        }
    }

    let attr = assemble_code(&mut body, &mut pool, false).unwrap().unwrap();
    assert_eq!(code_bytes(&attr.data).len(), expected);
}

#[test]
fn undefined_label_lists_known_labels() {
    let mut pool = PoolHandle::new();
    let mut body = vec![
        code_stmt(Some("here"), None),
        code_stmt(
            None,
            Some(Instr::plain(
                "goto",
                vec![Operand::Target("nowhere".to_owned())],
            )),
        ),
    ];
    let err = assemble_code(&mut body, &mut pool, false).unwrap_err();
    match err {
        crate::AsmError::UndefinedLabel { label, known } => {
            assert_eq!(label, "nowhere");
            assert_eq!(known, vec!["here".to_owned()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn catch_all_uses_type_index_zero() {
    let mut pool = PoolHandle::new();
    let mut body = vec![
        code_stmt(Some("a"), Some(Instr::plain("iconst_0", vec![]))),
        code_stmt(Some("b"), Some(Instr::plain("pop", vec![]))),
        code_stmt(Some("h"), Some(Instr::plain("return", vec![]))),
        Statement::Directive(Directive::Catch {
            class: PoolRef::class_of("all"),
            from: "a".to_owned(),
            to: "b".to_owned(),
            using: "h".to_owned(),
        }),
        Statement::Directive(Directive::LimitStack(2)),
        Statement::Directive(Directive::LimitLocals(1)),
    ];
    let attr = assemble_code(&mut body, &mut pool, false).unwrap().unwrap();
    let data = &attr.data;
    assert_eq!(&data[0..2], &[0, 2]); // max_stack
    assert_eq!(&data[2..4], &[0, 1]); // max_locals
    let code_len = u32::from_be_bytes(data[4..8].try_into().unwrap()) as usize;
    let exc = &data[8 + code_len..];
    // count 1, then start=0 end=1 handler=2 type=0
    assert_eq!(&exc[..10], &[0, 1, 0, 0, 0, 1, 0, 2, 0, 0]);
}

#[test]
fn empty_body_has_no_code_attribute() {
    let mut pool = PoolHandle::new();
    assert!(assemble_code(&mut [], &mut pool, false).unwrap().is_none());
}

#[test]
fn line_number_table_maps_starts_to_themselves() {
    let mut pool = PoolHandle::new();
    let mut body = vec![
        code_stmt(None, Some(Instr::plain("iconst_0", vec![]))),
        code_stmt(None, Some(Instr::plain("sipush", vec![Operand::Imm(7)]))),
        code_stmt(None, Some(Instr::plain("return", vec![]))),
    ];
    let attr = assemble_code(&mut body, &mut pool, true).unwrap().unwrap();
    let data = &attr.data;
    let code_len = u32::from_be_bytes(data[4..8].try_into().unwrap()) as usize;
    let rest = &data[8 + code_len..];
    // no exceptions, one attribute
    assert_eq!(&rest[..2], &[0, 0]);
    assert_eq!(&rest[2..4], &[0, 1]);
    // LineNumberTable data: count 3, pairs (0,0) (1,1) (4,4)
    let lnt = &rest[4 + 6..]; // skip attr name (2) + length (4)
    assert_eq!(
        lnt,
        &[0, 3, 0, 0, 0, 0, 0, 1, 0, 1, 0, 4, 0, 4]
    );
}
