//! Tokenizer for the assembly language.
//!
//! Newlines are significant (statements are line-oriented), so only spaces,
//! tabs and `;` comments are skipped. Literal tokens keep their source text;
//! the parser converts them via [`crate::literals`].

use logos::Logos;

use crate::parser::ParseError;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r]+")]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
pub enum Token<'src> {
    #[token("\n")]
    Newline,

    #[token(":")]
    Colon,

    #[token("=")]
    Equals,

    /// `.class`, `.method`, `.limit`, ...
    #[regex(r"\.[a-zA-Z]+", |lex| lex.slice(), priority = 10)]
    Directive(&'src str),

    /// `[3]` or `[label]`: a direct pool index or a pool label reference.
    #[regex(r"\[[0-9a-zA-Z_]+\]", |lex| lex.slice(), priority = 10)]
    PoolIndex(&'src str),

    /// String literal with optional raw-mode prefix and standard escapes.
    #[regex(r#"[rR]?"([^"\\]*(\\.[^"\\]*)*)""#, |lex| lex.slice(), priority = 10)]
    Str(&'src str),

    /// Decimal or `0x` hex integer.
    #[regex(r"-?(0[xX][0-9a-fA-F]+|[0-9]+)", |lex| lex.slice(), priority = 5)]
    Int(&'src str),

    /// Integer literal with `l`/`L` suffix.
    #[regex(r"-?(0[xX][0-9a-fA-F]+|[0-9]+)[lL]", |lex| lex.slice(), priority = 6)]
    Long(&'src str),

    /// `NaN`, `Inf`, decimal or hex-float double literal.
    #[regex(
        r"NaN|[-+]?(Inf|[0-9]+\.[0-9]+([eE]-?[0-9]+)?|0[xX][0-9a-fA-F]*\.[0-9a-fA-F]+[pP]-?[0-9]+)",
        |lex| lex.slice(),
        priority = 8
    )]
    Double(&'src str),

    /// Double literal with `f`/`F` suffix.
    #[regex(
        r"(NaN|[-+]?(Inf|[0-9]+\.[0-9]+([eE]-?[0-9]+)?|0[xX][0-9a-fA-F]*\.[0-9a-fA-F]+[pP]-?[0-9]+))[fF]",
        |lex| lex.slice(),
        priority = 9
    )]
    Float(&'src str),

    /// Anything else that is not whitespace or punctuation: mnemonics,
    /// flag keywords, class names, code labels.
    #[regex(r#"[^\s:="]+"#, |lex| lex.slice(), priority = 1)]
    Word(&'src str),
}

/// Tokenize a full source file. Fails on the first unlexable character,
/// reporting its line.
pub fn lex(source: &str) -> Result<Vec<Token<'_>>, ParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(source);
    let mut line = 1u32;
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => {
                if token == Token::Newline {
                    line += 1;
                }
                tokens.push(token);
            }
            Err(()) => {
                return Err(ParseError {
                    line,
                    message: format!("unexpected character: {:?}", lexer.slice()),
                });
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        lex(source).unwrap()
    }

    #[test]
    fn directives_and_words() {
        let tokens = kinds(".class public Foo\n");
        assert_eq!(
            tokens,
            vec![
                Token::Directive(".class"),
                Token::Word("public"),
                Token::Word("Foo"),
                Token::Newline,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let tokens = kinds("iconst_0 ; push zero\n");
        assert_eq!(tokens, vec![Token::Word("iconst_0"), Token::Newline]);
    }

    #[test]
    fn literal_kinds() {
        assert_eq!(kinds("5"), vec![Token::Int("5")]);
        assert_eq!(kinds("5L"), vec![Token::Long("5L")]);
        assert_eq!(kinds("1.5"), vec![Token::Double("1.5")]);
        assert_eq!(kinds("1.5f"), vec![Token::Float("1.5f")]);
        assert_eq!(kinds("NaN"), vec![Token::Double("NaN")]);
        assert_eq!(kinds("-0x10"), vec![Token::Int("-0x10")]);
        assert_eq!(kinds("[c1]"), vec![Token::PoolIndex("[c1]")]);
        assert_eq!(kinds(r#""hi there""#), vec![Token::Str(r#""hi there""#)]);
    }

    #[test]
    fn labels_lex_as_word_colon() {
        let tokens = kinds("L0: goto L0\n");
        assert_eq!(
            tokens,
            vec![
                Token::Word("L0"),
                Token::Colon,
                Token::Word("goto"),
                Token::Word("L0"),
                Token::Newline,
            ]
        );
    }
}
