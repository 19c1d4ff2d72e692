//! Parser for the assembly language.
//!
//! Line-oriented: each directive, field, method header and instruction
//! statement ends at a newline. Operand shapes come from the instruction
//! catalogue, so the parser knows whether a mnemonic expects an integer, a
//! branch label, a class/field/method reference or a multi-line switch
//! body.

use crate::ast::{
    ClassUnit, Directive, FieldDecl, Instr, Item, ItemSpec, MethodDecl, Operand, PoolRef,
    Statement,
};
use crate::codes::{self, Format, ParseShape};
use crate::lexer::{Token, lex};
use crate::literals;

#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error on line {line}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

/// Parse a full source file into an assembly tree.
pub fn parse(source: &str) -> Result<ClassUnit, ParseError> {
    let tokens = lex(source)?;
    Parser {
        tokens,
        pos: 0,
        line: 1,
    }
    .unit()
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
    line: u32,
}

impl<'src> Parser<'src> {
    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token<'src>> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
            if token == Some(Token::Newline) {
                self.line += 1;
            }
        }
        token
    }

    fn skip_newlines(&mut self) {
        while self.peek() == Some(Token::Newline) {
            self.next();
        }
    }

    fn expect_newline(&mut self) -> Result<(), ParseError> {
        match self.next() {
            Some(Token::Newline) | None => Ok(()),
            Some(other) => Err(self.err(format!("expected end of line, found {other:?}"))),
        }
    }

    fn word(&mut self) -> Result<&'src str, ParseError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            other => Err(self.err(format!("expected a word, found {other:?}"))),
        }
    }

    fn keyword(&mut self, expected: &str) -> Result<(), ParseError> {
        let w = self.word()?;
        if w == expected {
            Ok(())
        } else {
            Err(self.err(format!("expected `{expected}`, found `{w}`")))
        }
    }

    fn int(&mut self) -> Result<i64, ParseError> {
        match self.next() {
            Some(Token::Int(text)) => {
                literals::parse_int(text).map_err(|m| self.err(m))
            }
            other => Err(self.err(format!("expected an integer, found {other:?}"))),
        }
    }

    fn ranged_int(&mut self, min: i64, max: i64) -> Result<i64, ParseError> {
        let v = self.int()?;
        if v < min || v > max {
            return Err(self.err(format!("integer {v} out of range {min}..={max}")));
        }
        Ok(v)
    }

    /// `[3]` is a direct index; `[name]` is a label reference.
    fn pool_token(&self, text: &str) -> Result<PoolRef, ParseError> {
        let inner = &text[1..text.len() - 1];
        if inner.bytes().all(|b| b.is_ascii_digit()) {
            let index = inner
                .parse::<u16>()
                .map_err(|_| self.err(format!("pool index out of range: {inner}")))?;
            Ok(PoolRef::Index(index))
        } else {
            Ok(PoolRef::label(inner))
        }
    }

    /// A class operand: a bare name word or a `[ref]`.
    fn class_ref(&mut self) -> Result<PoolRef, ParseError> {
        match self.next() {
            Some(Token::Word(name)) => Ok(PoolRef::class_of(name)),
            Some(Token::PoolIndex(text)) => self.pool_token(text),
            other => Err(self.err(format!("expected a class name, found {other:?}"))),
        }
    }

    /// A field/method operand: `class name desc` words or a `[ref]`.
    fn member_ref(
        &mut self,
        make: fn(Box<PoolRef>, Box<PoolRef>) -> ItemSpec,
    ) -> Result<PoolRef, ParseError> {
        if let Some(Token::PoolIndex(text)) = self.peek() {
            self.next();
            return self.pool_token(text);
        }
        let class = self.word()?;
        let name = self.word()?;
        let desc = self.word()?;
        Ok(PoolRef::item(make(
            Box::new(PoolRef::class_of(class)),
            Box::new(PoolRef::name_and_type(
                PoolRef::utf8(name),
                PoolRef::utf8(desc),
            )),
        )))
    }

    fn unit(mut self) -> Result<ClassUnit, ParseError> {
        self.skip_newlines();

        let interface = match self.next() {
            Some(Token::Directive(".class")) => false,
            Some(Token::Directive(".interface")) => true,
            other => return Err(self.err(format!("expected .class, found {other:?}"))),
        };
        let mut words = self.words_until_line_end()?;
        let this_name = words
            .pop()
            .ok_or_else(|| self.err("missing class name"))?;
        self.check_flags(&words, coffer_classfile::flags::class_flag)?;
        self.expect_newline()?;
        self.skip_newlines();

        match self.next() {
            Some(Token::Directive(".super")) => {}
            other => return Err(self.err(format!("expected .super, found {other:?}"))),
        }
        let super_name = self.word()?;
        self.expect_newline()?;

        let mut unit = ClassUnit {
            interface,
            flags: words,
            this: PoolRef::class_of(this_name),
            super_: PoolRef::class_of(super_name),
            interfaces: Vec::new(),
            items: Vec::new(),
        };

        loop {
            self.skip_newlines();
            match self.peek() {
                None => break,
                Some(Token::Directive(".implements")) => {
                    self.next();
                    let name = self.word()?;
                    unit.interfaces.push(PoolRef::class_of(name));
                    self.expect_newline()?;
                }
                Some(Token::Directive(".const")) => {
                    self.next();
                    let slot = match self.next() {
                        Some(Token::PoolIndex(text)) => self.pool_token(text)?,
                        other => {
                            return Err(self.err(format!("expected [label], found {other:?}")));
                        }
                    };
                    match self.next() {
                        Some(Token::Equals) => {}
                        other => return Err(self.err(format!("expected =, found {other:?}"))),
                    }
                    let value = self.const_spec()?;
                    self.expect_newline()?;
                    unit.items.push(Item::Const { slot, value });
                }
                Some(Token::Directive(".field")) => {
                    self.next();
                    unit.items.push(Item::Field(self.field()?));
                }
                Some(Token::Directive(".method")) => {
                    self.next();
                    unit.items.push(Item::Method(self.method()?));
                }
                Some(other) => {
                    return Err(self.err(format!("unexpected token at top level: {other:?}")));
                }
            }
        }
        Ok(unit)
    }

    fn words_until_line_end(&mut self) -> Result<Vec<String>, ParseError> {
        let mut words = Vec::new();
        while let Some(Token::Word(w)) = self.peek() {
            self.next();
            words.push(w.to_owned());
        }
        Ok(words)
    }

    fn check_flags(
        &self,
        words: &[String],
        lookup: fn(&str) -> Option<u16>,
    ) -> Result<(), ParseError> {
        for word in words {
            if lookup(word).is_none() {
                return Err(self.err(format!("unknown access flag: {word}")));
            }
        }
        Ok(())
    }

    fn field(&mut self) -> Result<FieldDecl, ParseError> {
        let mut words = self.words_until_line_end()?;
        if words.len() < 2 {
            return Err(self.err(".field needs a name and a descriptor"));
        }
        let desc = words.pop().expect("checked length");
        let name = words.pop().expect("checked length");
        self.check_flags(&words, coffer_classfile::flags::field_flag)?;

        let constant = if self.peek() == Some(Token::Equals) {
            self.next();
            Some(self.field_const()?)
        } else {
            None
        };
        self.expect_newline()?;
        Ok(FieldDecl {
            flags: words,
            name: PoolRef::utf8(name),
            desc: PoolRef::utf8(desc),
            constant,
        })
    }

    /// A field's `ConstantValue`: a literal or a `[ref]`.
    fn field_const(&mut self) -> Result<PoolRef, ParseError> {
        match self.next() {
            Some(Token::Int(text)) => {
                let v = literals::parse_int(text).map_err(|m| self.err(m))?;
                let v = i32::try_from(v)
                    .map_err(|_| self.err(format!("integer constant out of range: {v}")))?;
                Ok(PoolRef::item(ItemSpec::Integer(v)))
            }
            Some(Token::Long(text)) => {
                let v = literals::parse_long(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Long(v)))
            }
            Some(Token::Float(text)) => {
                let v = literals::parse_float(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Float(v)))
            }
            Some(Token::Double(text)) => {
                let v = literals::parse_double(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Double(v)))
            }
            Some(Token::Str(text)) => {
                let s = literals::unescape(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Str(Box::new(PoolRef::utf8(s)))))
            }
            Some(Token::PoolIndex(text)) => self.pool_token(text),
            other => Err(self.err(format!("expected a constant, found {other:?}"))),
        }
    }

    /// A `.const` right-hand side: `[ref]` or a tag keyword with arguments.
    fn const_spec(&mut self) -> Result<PoolRef, ParseError> {
        if let Some(Token::PoolIndex(text)) = self.peek() {
            self.next();
            return self.pool_token(text);
        }
        let tag = self.word()?;
        match tag {
            "Utf8" => {
                let s = match self.next() {
                    Some(Token::Str(text)) => literals::unescape(text).map_err(|m| self.err(m))?,
                    Some(Token::Word(w)) => w.to_owned(),
                    other => {
                        return Err(self.err(format!("expected a string, found {other:?}")));
                    }
                };
                Ok(PoolRef::utf8(s))
            }
            "Int" => {
                let v = self.ranged_int(i32::MIN as i64, u32::MAX as i64)?;
                Ok(PoolRef::item(ItemSpec::Integer(v as i32)))
            }
            "Long" => match self.next() {
                Some(Token::Long(text)) => {
                    let v = literals::parse_long(text).map_err(|m| self.err(m))?;
                    Ok(PoolRef::item(ItemSpec::Long(v)))
                }
                Some(Token::Int(text)) => {
                    let v = literals::parse_int(text).map_err(|m| self.err(m))?;
                    Ok(PoolRef::item(ItemSpec::Long(v)))
                }
                other => Err(self.err(format!("expected a long literal, found {other:?}"))),
            },
            "Float" => match self.next() {
                Some(Token::Float(text)) => {
                    let v = literals::parse_float(text).map_err(|m| self.err(m))?;
                    Ok(PoolRef::item(ItemSpec::Float(v)))
                }
                other => Err(self.err(format!("expected a float literal, found {other:?}"))),
            },
            "Double" => match self.next() {
                Some(Token::Double(text)) => {
                    let v = literals::parse_double(text).map_err(|m| self.err(m))?;
                    Ok(PoolRef::item(ItemSpec::Double(v)))
                }
                other => Err(self.err(format!("expected a double literal, found {other:?}"))),
            },
            "Class" => Ok(PoolRef::class(self.utf8_ref()?)),
            "String" => Ok(PoolRef::item(ItemSpec::Str(Box::new(self.utf8_ref()?)))),
            "NameAndType" => {
                let name = self.utf8_ref()?;
                let desc = self.utf8_ref()?;
                Ok(PoolRef::name_and_type(name, desc))
            }
            "Field" => self.member_spec(ItemSpec::Fieldref),
            "Method" => self.member_spec(ItemSpec::Methodref),
            "InterfaceMethod" => self.member_spec(ItemSpec::InterfaceMethodref),
            other => Err(self.err(format!("unknown constant tag: {other}"))),
        }
    }

    fn member_spec(
        &mut self,
        make: fn(Box<PoolRef>, Box<PoolRef>) -> ItemSpec,
    ) -> Result<PoolRef, ParseError> {
        let class = self.utf8_ref()?;
        let name = self.utf8_ref()?;
        let desc = self.utf8_ref()?;
        Ok(PoolRef::item(make(
            Box::new(PoolRef::class(class)),
            Box::new(PoolRef::name_and_type(name, desc)),
        )))
    }

    /// A Utf8-valued argument: a word, a string literal, or a `[ref]`.
    fn utf8_ref(&mut self) -> Result<PoolRef, ParseError> {
        match self.next() {
            Some(Token::Word(w)) => Ok(PoolRef::utf8(w)),
            Some(Token::Str(text)) => {
                let s = literals::unescape(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::utf8(s))
            }
            Some(Token::PoolIndex(text)) => self.pool_token(text),
            other => Err(self.err(format!("expected a name, found {other:?}"))),
        }
    }

    fn method(&mut self) -> Result<MethodDecl, ParseError> {
        let mut words = self.words_until_line_end()?;
        if words.len() < 2 {
            return Err(self.err(".method needs a name and a descriptor"));
        }
        let desc = words.pop().expect("checked length");
        let name = words.pop().expect("checked length");
        self.check_flags(&words, coffer_classfile::flags::method_flag)?;
        self.expect_newline()?;

        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => return Err(self.err("missing .end method")),
                Some(Token::Directive(".end")) => {
                    self.next();
                    self.keyword("method")?;
                    if self.peek().is_some() {
                        self.expect_newline()?;
                    }
                    break;
                }
                Some(Token::Directive(".limit")) => {
                    self.next();
                    let which = self.word()?;
                    let value = self.ranged_int(0, 65535)? as u16;
                    let directive = match which {
                        "stack" => Directive::LimitStack(value),
                        "locals" => Directive::LimitLocals(value),
                        other => {
                            return Err(self.err(format!("unknown limit: {other}")));
                        }
                    };
                    self.expect_newline()?;
                    body.push(Statement::Directive(directive));
                }
                Some(Token::Directive(".catch")) => {
                    self.next();
                    let class = self.class_ref()?;
                    self.keyword("from")?;
                    let from = self.word()?.to_owned();
                    self.keyword("to")?;
                    let to = self.word()?.to_owned();
                    self.keyword("using")?;
                    let using = self.word()?.to_owned();
                    self.expect_newline()?;
                    body.push(Statement::Directive(Directive::Catch {
                        class,
                        from,
                        to,
                        using,
                    }));
                }
                Some(Token::Word(_)) => {
                    body.push(self.code_line()?);
                }
                Some(other) => {
                    return Err(self.err(format!("unexpected token in method body: {other:?}")));
                }
            }
        }
        Ok(MethodDecl {
            flags: words,
            name: PoolRef::utf8(name),
            desc: PoolRef::utf8(desc),
            body,
        })
    }

    fn code_line(&mut self) -> Result<Statement, ParseError> {
        let first = self.word()?;
        let label = if self.peek() == Some(Token::Colon) {
            self.next();
            Some(first.to_owned())
        } else {
            None
        };

        let mnemonic = if label.is_some() {
            match self.peek() {
                Some(Token::Word(w)) => {
                    self.next();
                    Some(w)
                }
                _ => None,
            }
        } else {
            Some(first)
        };

        let instr = match mnemonic {
            Some(m) => Some(self.instruction(m)?),
            None => None,
        };
        self.expect_newline()?;
        Ok(Statement::Code { label, instr })
    }

    fn instruction(&mut self, mnemonic: &str) -> Result<Instr, ParseError> {
        let Some((op, info)) = codes::catalogue().get_key_value(mnemonic) else {
            return Err(self.err(format!("unknown instruction: {mnemonic}")));
        };
        let op: &'static str = *op;

        let instr = match info.shape {
            ParseShape::NoArgs => Instr::plain(op, vec![]),
            ParseShape::Int => {
                let (min, max) = match info.format {
                    Format::U8 => (0, 255),
                    Format::I8 => (-128, 127),
                    Format::I16 => (-32768, 32767),
                    _ => (0, 65535),
                };
                Instr::plain(op, vec![Operand::Imm(self.ranged_int(min, max)?)])
            }
            ParseShape::IntInt => {
                let index = self.ranged_int(0, 255)?;
                let delta = self.ranged_int(-128, 127)?;
                Instr::plain(op, vec![Operand::Imm(index), Operand::Imm(delta)])
            }
            ParseShape::Branch => {
                Instr::plain(op, vec![Operand::Target(self.word()?.to_owned())])
            }
            ParseShape::FieldRef => {
                Instr::plain(op, vec![Operand::Pool(self.member_ref(ItemSpec::Fieldref)?)])
            }
            ParseShape::MethodRef => Instr::plain(
                op,
                vec![Operand::Pool(self.member_ref(ItemSpec::Methodref)?)],
            ),
            ParseShape::MethodInt => {
                let method = self.member_ref(ItemSpec::InterfaceMethodref)?;
                let count = self.ranged_int(0, 255)?;
                Instr::plain(op, vec![Operand::Pool(method), Operand::Imm(count)])
            }
            ParseShape::ClassRef => Instr::plain(op, vec![Operand::Pool(self.class_ref()?)]),
            ParseShape::ClassInt => {
                let class = self.class_ref()?;
                let dims = self.ranged_int(0, 255)?;
                Instr::plain(op, vec![Operand::Pool(class), Operand::Imm(dims)])
            }
            ParseShape::Ldc | ParseShape::Ldc2 => {
                let wide = info.shape == ParseShape::Ldc2;
                Instr::plain(op, vec![Operand::Pool(self.loadable(wide)?)])
            }
            ParseShape::NewArray => {
                let kind = self.word()?;
                let code = match kind {
                    "boolean" => 4,
                    "char" => 5,
                    "float" => 6,
                    "double" => 7,
                    "byte" => 8,
                    "short" => 9,
                    "int" => 10,
                    "long" => 11,
                    other => {
                        return Err(self.err(format!("unknown array type: {other}")));
                    }
                };
                Instr::plain(op, vec![Operand::Imm(code)])
            }
            ParseShape::Wide => self.wide()?,
            ParseShape::TableSwitch => self.tableswitch()?,
            ParseShape::LookupSwitch => self.lookupswitch()?,
        };
        Ok(instr)
    }

    /// A loadable constant operand for the `ldc` family.
    fn loadable(&mut self, wide: bool) -> Result<PoolRef, ParseError> {
        match self.next() {
            Some(Token::PoolIndex(text)) => self.pool_token(text),
            Some(Token::Int(text)) if !wide => {
                let v = literals::parse_int(text).map_err(|m| self.err(m))?;
                let v = i32::try_from(v)
                    .map_err(|_| self.err(format!("ldc integer out of range: {v}")))?;
                Ok(PoolRef::item(ItemSpec::Integer(v)))
            }
            Some(Token::Float(text)) if !wide => {
                let v = literals::parse_float(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Float(v)))
            }
            Some(Token::Str(text)) if !wide => {
                let s = literals::unescape(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Str(Box::new(PoolRef::utf8(s)))))
            }
            Some(Token::Long(text)) if wide => {
                let v = literals::parse_long(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Long(v)))
            }
            Some(Token::Int(text)) if wide => {
                let v = literals::parse_int(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Long(v)))
            }
            Some(Token::Double(text)) if wide => {
                let v = literals::parse_double(text).map_err(|m| self.err(m))?;
                Ok(PoolRef::item(ItemSpec::Double(v)))
            }
            other => Err(self.err(format!("expected a loadable constant, found {other:?}"))),
        }
    }

    fn wide(&mut self) -> Result<Instr, ParseError> {
        let sub = self.word()?;
        let Some((op, info)) = codes::catalogue().get_key_value(sub) else {
            return Err(self.err(format!("unknown instruction after wide: {sub}")));
        };
        let op: &'static str = *op;
        let operands = match info.shape {
            ParseShape::Int => vec![self.ranged_int(0, 65535)? as u16],
            ParseShape::IntInt => {
                let index = self.ranged_int(0, 65535)? as u16;
                let delta = self.ranged_int(-32768, 32767)? as i16;
                vec![index, delta as u16]
            }
            _ => {
                return Err(self.err(format!("instruction cannot be widened: {sub}")));
            }
        };
        Ok(Instr::Wide { op, operands })
    }

    fn tableswitch(&mut self) -> Result<Instr, ParseError> {
        let low = self.ranged_int(i32::MIN as i64, i32::MAX as i64)? as i32;
        self.expect_newline()?;
        let mut targets = Vec::new();
        loop {
            let w = self.word()?;
            if w == "default" {
                match self.next() {
                    Some(Token::Colon) => {}
                    other => return Err(self.err(format!("expected :, found {other:?}"))),
                }
                let default = self.word()?.to_owned();
                return Ok(Instr::TableSwitch {
                    low,
                    targets,
                    default,
                });
            }
            targets.push(w.to_owned());
            self.expect_newline()?;
        }
    }

    fn lookupswitch(&mut self) -> Result<Instr, ParseError> {
        self.expect_newline()?;
        let mut pairs = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Word("default")) => {
                    self.next();
                    match self.next() {
                        Some(Token::Colon) => {}
                        other => return Err(self.err(format!("expected :, found {other:?}"))),
                    }
                    let default = self.word()?.to_owned();
                    return Ok(Instr::LookupSwitch { pairs, default });
                }
                Some(Token::Int(_)) => {
                    let key = self.ranged_int(i32::MIN as i64, i32::MAX as i64)? as i32;
                    match self.next() {
                        Some(Token::Colon) => {}
                        other => return Err(self.err(format!("expected :, found {other:?}"))),
                    }
                    let target = self.word()?.to_owned();
                    pairs.push((key, target));
                    self.expect_newline()?;
                }
                other => {
                    return Err(self.err(format!("expected a switch case, found {other:?}")));
                }
            }
        }
    }
}
