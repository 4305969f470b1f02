//! Lexer for the Braid language.
//!
//! Tokenization is total: malformed input becomes [`Token::Error`] with
//! its position, consumed downstream by the parser as a diagnostic. The
//! lexer itself never fails.

use logos::Logos;
use serde::{Deserialize, Serialize};

use crate::diag::SourcePos;

/// How many times a ket pattern repeats: a literal count or the name of
/// a constant resolved later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KetRepeat {
    Count(u32),
    Binding(String),
}

/// A parsed ket literal: `|0⟩`, `|0b101⟩`, `|0'n⟩`, `|0b1'4⟩`.
///
/// The pattern is a basis-state bit string of `width` bits holding
/// `value`; an optional repeat concatenates the pattern with itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KetLit {
    /// The pattern value.
    pub value: u64,
    /// Width of the pattern in bits.
    pub width: u32,
    /// Optional repeat count.
    pub repeat: Option<KetRepeat>,
}

fn parse_ket(slice: &str) -> Option<KetLit> {
    let body = slice.strip_prefix('|')?;
    let body = body
        .strip_suffix('⟩')
        .or_else(|| body.strip_suffix('>'))?;

    let (value_str, repeat) = match body.split_once('\'') {
        Some((v, r)) => {
            let repeat = match r.parse::<u32>() {
                Ok(n) => KetRepeat::Count(n),
                Err(_) => KetRepeat::Binding(r.to_string()),
            };
            (v, Some(repeat))
        }
        None => (body, None),
    };

    let (value, width) = if let Some(bits) = value_str.strip_prefix("0b") {
        (
            u64::from_str_radix(bits, 2).ok()?,
            u32::try_from(bits.len()).ok()?,
        )
    } else {
        let value = value_str.parse::<u64>().ok()?;
        (value, (64 - value.leading_zeros()).max(1))
    };

    Some(KetLit {
        value,
        width,
        repeat,
    })
}

/// Tokens of the Braid language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // Keywords
    #[token("operation")]
    Operation,

    #[token("program")]
    Program,

    #[token("extern")]
    Extern,

    #[token("func")]
    Func,

    #[token("for")]
    For,

    #[token("each")]
    Each,

    #[token("in")]
    In,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("qif")]
    Qif,

    #[token("ctrl")]
    Ctrl,

    #[token("with")]
    With,

    #[token("measure")]
    Measure,

    #[token("let")]
    Let,

    #[token("shot")]
    Shot,

    #[token("and")]
    And,

    #[token("or")]
    Or,

    #[token("not")]
    Not,

    #[token("true")]
    True,

    #[token("false")]
    False,

    // Type names
    #[token("Int", priority = 3)]
    TyInt,

    #[token("Bits", priority = 3)]
    TyBits,

    // Literals
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r"0x[0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[2..], 16).ok())]
    #[regex(r"0b[01]+", |lex| i64::from_str_radix(&lex.slice()[2..], 2).ok())]
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    IntLiteral(i64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    StringLiteral(String),

    #[regex(r"\|(0b[01]+|[0-9]+)('([a-zA-Z_][a-zA-Z0-9_]*|[0-9]+))?(⟩|>)", |lex| parse_ket(lex.slice()))]
    Ket(KetLit),

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Sigils
    #[token("$")]
    Dollar,

    #[token("&")]
    Amp,

    #[token("?")]
    Question,

    // Operators and punctuation
    #[token("!")]
    Bang,

    #[token("@")]
    At,

    #[token(".")]
    Dot,

    #[token("..")]
    DotDot,

    #[token("<-")]
    BindArrow,

    #[token("->")]
    Arrow,

    #[token("|")]
    Pipe,

    #[token("**")]
    Power,

    #[token("<<")]
    Shl,

    #[token(">>")]
    Shr,

    #[token("^")]
    Caret,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<")]
    Lt,

    #[token("<=")]
    LtEq,

    #[token(">")]
    Gt,

    #[token(">=")]
    GtEq,

    #[token("=")]
    Eq,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    /// Malformed input; never produced by a grammar rule. Carries the
    /// offending slice for the parser's diagnostic. The catch-all
    /// pattern loses every dispute, so it only fires on bytes nothing
    /// else matches.
    #[regex(r".", |lex| lex.slice().to_string(), priority = 0)]
    Error(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Operation => write!(f, "operation"),
            Token::Program => write!(f, "program"),
            Token::Extern => write!(f, "extern"),
            Token::Func => write!(f, "func"),
            Token::For => write!(f, "for"),
            Token::Each => write!(f, "each"),
            Token::In => write!(f, "in"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::Qif => write!(f, "qif"),
            Token::Ctrl => write!(f, "ctrl"),
            Token::With => write!(f, "with"),
            Token::Measure => write!(f, "measure"),
            Token::Let => write!(f, "let"),
            Token::Shot => write!(f, "shot"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::TyInt => write!(f, "Int"),
            Token::TyBits => write!(f, "Bits"),
            Token::FloatLiteral(v) => write!(f, "{v}"),
            Token::IntLiteral(v) => write!(f, "{v}"),
            Token::StringLiteral(s) => write!(f, "\"{s}\""),
            Token::Ket(k) => write!(f, "|{}⟩", k.value),
            Token::Identifier(s) => write!(f, "{s}"),
            Token::Dollar => write!(f, "$"),
            Token::Amp => write!(f, "&"),
            Token::Question => write!(f, "?"),
            Token::Bang => write!(f, "!"),
            Token::At => write!(f, "@"),
            Token::Dot => write!(f, "."),
            Token::DotDot => write!(f, ".."),
            Token::BindArrow => write!(f, "<-"),
            Token::Arrow => write!(f, "->"),
            Token::Pipe => write!(f, "|"),
            Token::Power => write!(f, "**"),
            Token::Shl => write!(f, "<<"),
            Token::Shr => write!(f, ">>"),
            Token::Caret => write!(f, "^"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Eq => write!(f, "="),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
            Token::Error(s) => write!(f, "{s}"),
        }
    }
}

/// A token with its source position.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub pos: SourcePos,
}

/// Byte-offset to line/column mapping for one source string.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pos(&self, offset: usize) -> SourcePos {
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        SourcePos::new(
            (line + 1) as u32,
            (offset - self.line_starts[line] + 1) as u32,
        )
    }
}

/// Tokenize a Braid source string.
///
/// Total: malformed input is emitted as [`Token::Error`] rather than
/// stopping the scan, so every token in the file is still produced.
pub fn tokenize(source: &str) -> Vec<SpannedToken> {
    let index = LineIndex::new(source);
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let pos = index.pos(span.start);
        let token = match result {
            Ok(token) => token,
            Err(()) => Token::Error(source[span].to_string()),
        };
        tokens.push(SpannedToken { token, pos });
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_operation_header() {
        let tokens = kinds("operation Foo($psi: 2) {");
        assert_eq!(tokens[0], Token::Operation);
        assert!(matches!(tokens[1], Token::Identifier(ref s) if s == "Foo"));
        assert_eq!(tokens[2], Token::LParen);
        assert_eq!(tokens[3], Token::Dollar);
        assert!(matches!(tokens[4], Token::Identifier(ref s) if s == "psi"));
        assert_eq!(tokens[5], Token::Colon);
        assert_eq!(tokens[6], Token::IntLiteral(2));
    }

    #[test]
    fn test_ket_literals() {
        let tokens = kinds("|0⟩ |0b101⟩ |0'n⟩ |0b1'4⟩");
        assert_eq!(
            tokens[0],
            Token::Ket(KetLit {
                value: 0,
                width: 1,
                repeat: None,
            })
        );
        assert_eq!(
            tokens[1],
            Token::Ket(KetLit {
                value: 5,
                width: 3,
                repeat: None,
            })
        );
        assert_eq!(
            tokens[2],
            Token::Ket(KetLit {
                value: 0,
                width: 1,
                repeat: Some(KetRepeat::Binding("n".to_string())),
            })
        );
        assert_eq!(
            tokens[3],
            Token::Ket(KetLit {
                value: 1,
                width: 1,
                repeat: Some(KetRepeat::Count(4)),
            })
        );
    }

    #[test]
    fn test_ascii_ket_fallback() {
        let tokens = kinds("|1>");
        assert_eq!(
            tokens[0],
            Token::Ket(KetLit {
                value: 1,
                width: 1,
                repeat: None,
            })
        );
    }

    #[test]
    fn test_range_does_not_lex_as_float() {
        let tokens = kinds("[0..3]");
        assert_eq!(tokens[1], Token::IntLiteral(0));
        assert_eq!(tokens[2], Token::DotDot);
        assert_eq!(tokens[3], Token::IntLiteral(3));
    }

    #[test]
    fn test_gate_modifiers() {
        let tokens = kinds("H! @ 2 . X");
        assert!(matches!(tokens[0], Token::Identifier(ref s) if s == "H"));
        assert_eq!(tokens[1], Token::Bang);
        assert_eq!(tokens[2], Token::At);
        assert_eq!(tokens[3], Token::IntLiteral(2));
        assert_eq!(tokens[4], Token::Dot);
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("H $q;\nX $q;");
        assert_eq!(tokens[0].pos, SourcePos::new(1, 1));
        assert_eq!(tokens[1].pos, SourcePos::new(1, 3));
        assert_eq!(tokens[4].pos, SourcePos::new(2, 1));
    }

    #[test]
    fn test_comments_stripped() {
        let tokens = kinds("H $q; // apply hadamard\nX $q;");
        assert_eq!(tokens.len(), 8);
    }

    #[test]
    fn test_malformed_input_yields_error_token() {
        let tokens = kinds("H \u{7f} $q;");
        assert!(tokens.iter().any(|t| matches!(t, Token::Error(_))));
        // Scanning continues past the bad byte.
        assert!(tokens.iter().any(|t| matches!(t, Token::Semicolon)));
    }

    #[test]
    fn test_binary_and_hex_ints() {
        let tokens = kinds("0b101 0x1f 42");
        assert_eq!(tokens[0], Token::IntLiteral(5));
        assert_eq!(tokens[1], Token::IntLiteral(31));
        assert_eq!(tokens[2], Token::IntLiteral(42));
    }
}
