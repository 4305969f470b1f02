//! Parser for the Braid language.
//!
//! Recursive descent with error recovery: a failed construct produces
//! one diagnostic at the offending token, then the parser resynchronizes
//! at the next `;`, block close, or declaration keyword, so independent
//! errors in one file are all reported in a single pass.

mod expression;
mod statement;

use crate::ast::{
    ClassicalType, Decl, ExternFuncDecl, OperationDecl, ParamDecl, ProgramDecl, SizeSpec, Stmt,
    Unit,
};
use crate::diag::{Diagnostic, SourcePos};
use crate::lexer::{SpannedToken, Token, tokenize};

/// Result of one grammar rule; the diagnostic is pushed by the caller
/// that performs recovery.
pub(crate) type PResult<T> = Result<T, Diagnostic>;

/// Parse a source string into a compilation unit.
///
/// Never fails: syntax problems are returned as diagnostics alongside
/// whatever declarations parsed cleanly.
pub fn parse(source: &str, path: &str) -> (Unit, Vec<Diagnostic>) {
    let mut parser = Parser::new(source, path);
    let unit = parser.parse_unit();
    (unit, parser.diags)
}

/// Parser state.
pub(super) struct Parser {
    pub(super) tokens: Vec<SpannedToken>,
    pub(super) pos: usize,
    pub(super) path: String,
    pub(super) diags: Vec<Diagnostic>,
}

impl Parser {
    fn new(source: &str, path: &str) -> Self {
        Self {
            tokens: tokenize(source),
            pos: 0,
            path: path.to_string(),
            diags: Vec::new(),
        }
    }

    /// Check if we've reached the end.
    pub(super) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Peek at the current token.
    pub(super) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Peek one token past the current one.
    pub(super) fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|t| &t.token)
    }

    /// Position of the current token, or of the last token at EOF.
    pub(super) fn peek_pos(&self) -> SourcePos {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or_else(|| SourcePos::new(1, 1), |t| t.pos)
    }

    /// Advance and return the current token.
    pub(super) fn advance(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }
        let token = self.tokens[self.pos].token.clone();
        self.pos += 1;
        Some(token)
    }

    /// Build an error diagnostic at the given position.
    pub(super) fn err(&self, pos: SourcePos, message: impl Into<String>) -> Diagnostic {
        Diagnostic::error(&self.path, pos, message)
    }

    /// Expect a specific token kind.
    #[allow(clippy::needless_pass_by_value)]
    pub(super) fn expect(&mut self, expected: Token) -> PResult<()> {
        let pos = self.peek_pos();
        let found = self
            .advance()
            .ok_or_else(|| self.err(pos, format!("expected '{expected}', found end of input")))?;

        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(self.err(pos, format!("expected '{expected}', found '{found}'")));
        }
        Ok(())
    }

    /// Check if the current token matches a kind.
    pub(super) fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    /// Consume the current token if it matches a kind.
    pub(super) fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Parse an identifier.
    pub(super) fn parse_identifier(&mut self) -> PResult<String> {
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::Identifier(s)) => Ok(s),
            Some(other) => Err(self.err(pos, format!("expected identifier, found '{other}'"))),
            None => Err(self.err(pos, "expected identifier, found end of input")),
        }
    }

    /// Parse the whole unit, recovering at declaration boundaries.
    fn parse_unit(&mut self) -> Unit {
        let mut decls = Vec::new();
        while !self.is_eof() {
            let result = match self.peek() {
                Some(Token::Operation) => self.parse_operation().map(Decl::Operation),
                Some(Token::Program) => self.parse_program().map(Decl::Program),
                Some(Token::Extern) => self.parse_extern().map(Decl::ExternFunc),
                Some(Token::Error(_)) => {
                    let pos = self.peek_pos();
                    let message = match self.advance() {
                        Some(Token::Error(slice)) => format!("unrecognized character '{slice}'"),
                        _ => "unrecognized character".to_string(),
                    };
                    self.diags.push(self.err(pos, message));
                    continue;
                }
                Some(other) => {
                    let msg = format!("expected declaration, found '{other}'");
                    let pos = self.peek_pos();
                    self.advance();
                    Err(self.err(pos, msg))
                }
                None => break,
            };
            match result {
                Ok(decl) => decls.push(decl),
                Err(diag) => {
                    self.diags.push(diag);
                    self.recover_to_decl();
                }
            }
        }
        Unit { decls }
    }

    /// Skip forward to the next declaration keyword.
    fn recover_to_decl(&mut self) {
        while let Some(token) = self.peek() {
            if matches!(token, Token::Operation | Token::Program | Token::Extern) {
                break;
            }
            self.advance();
        }
    }

    /// `operation Name(params) { body }`
    fn parse_operation(&mut self) -> PResult<OperationDecl> {
        let pos = self.peek_pos();
        self.expect(Token::Operation)?;
        let name = self.parse_identifier()?;
        self.expect(Token::LParen)?;
        let params = self.parse_param_list()?;
        self.expect(Token::RParen)?;
        let body = self.parse_block()?;
        Ok(OperationDecl {
            name,
            params,
            body,
            pos,
        })
    }

    /// `program Name [(params)] [shot N] { body }`
    fn parse_program(&mut self) -> PResult<ProgramDecl> {
        let pos = self.peek_pos();
        self.expect(Token::Program)?;
        let name = self.parse_identifier()?;
        let params = if self.consume(&Token::LParen) {
            let params = self.parse_param_list()?;
            self.expect(Token::RParen)?;
            params
        } else {
            Vec::new()
        };
        let shots = if self.consume(&Token::Shot) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(ProgramDecl {
            name,
            params,
            shots,
            body,
            pos,
        })
    }

    /// `extern func name(types) -> type;`
    fn parse_extern(&mut self) -> PResult<ExternFuncDecl> {
        let pos = self.peek_pos();
        self.expect(Token::Extern)?;
        self.expect(Token::Func)?;
        let name = self.parse_identifier()?;
        self.expect(Token::LParen)?;
        let mut param_types = Vec::new();
        if !self.check(&Token::RParen) {
            param_types.push(self.parse_type()?);
            while self.consume(&Token::Comma) {
                param_types.push(self.parse_type()?);
            }
        }
        self.expect(Token::RParen)?;
        let return_type = if self.consume(&Token::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;
        Ok(ExternFuncDecl {
            name,
            param_types,
            return_type,
            pos,
        })
    }

    fn parse_param_list(&mut self) -> PResult<Vec<ParamDecl>> {
        let mut params = Vec::new();
        if self.check(&Token::RParen) {
            return Ok(params);
        }
        params.push(self.parse_param()?);
        while self.consume(&Token::Comma) {
            params.push(self.parse_param()?);
        }
        Ok(params)
    }

    fn parse_param(&mut self) -> PResult<ParamDecl> {
        let pos = self.peek_pos();
        if self.consume(&Token::Dollar) {
            let name = self.parse_identifier()?;
            let size = self.parse_optional_size()?;
            return Ok(ParamDecl::Quantum {
                name,
                borrowed: false,
                size,
                pos,
            });
        }
        if self.consume(&Token::Amp) {
            let name = self.parse_identifier()?;
            let size = self.parse_optional_size()?;
            return Ok(ParamDecl::Quantum {
                name,
                borrowed: true,
                size,
                pos,
            });
        }
        let name = self.parse_identifier()?;
        self.expect(Token::Colon)?;
        let ty = self.parse_type()?;
        Ok(ParamDecl::Classical { name, ty, pos })
    }

    /// Size after a qubit parameter name; defaults to a single qubit.
    fn parse_optional_size(&mut self) -> PResult<SizeSpec> {
        if !self.consume(&Token::Colon) {
            return Ok(SizeSpec::Literal(1));
        }
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::IntLiteral(v)) => {
                let size = u32::try_from(v)
                    .ok()
                    .filter(|&s| s > 0)
                    .ok_or_else(|| self.err(pos, format!("invalid register size {v}")))?;
                Ok(SizeSpec::Literal(size))
            }
            Some(Token::Identifier(name)) => Ok(SizeSpec::Bound(name)),
            Some(Token::Question) => {
                if let Some(Token::Identifier(_)) = self.peek() {
                    let name = self.parse_identifier()?;
                    Ok(SizeSpec::Inferred(Some(name)))
                } else {
                    Ok(SizeSpec::Inferred(None))
                }
            }
            Some(other) => Err(self.err(pos, format!("expected register size, found '{other}'"))),
            None => Err(self.err(pos, "expected register size, found end of input")),
        }
    }

    fn parse_type(&mut self) -> PResult<ClassicalType> {
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::TyInt) => Ok(ClassicalType::Int),
            Some(Token::TyBits) => Ok(ClassicalType::Bits),
            Some(Token::LBracket) => {
                self.expect(Token::TyInt)?;
                self.expect(Token::RBracket)?;
                Ok(ClassicalType::IntList)
            }
            Some(other) => Err(self.err(pos, format!("expected type, found '{other}'"))),
            None => Err(self.err(pos, "expected type, found end of input")),
        }
    }

    /// Parse `{ stmt* }`, recovering inside the block at `;` boundaries.
    pub(super) fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.is_eof() && !self.check(&Token::RBrace) {
            match self.parse_statement() {
                Ok(stmt) => stmts.push(stmt),
                Err(diag) => {
                    self.diags.push(diag);
                    self.recover_to_stmt();
                }
            }
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    /// Skip to just after the next `;` at the current block depth, or
    /// stop before the block's closing brace.
    fn recover_to_stmt(&mut self) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token {
                Token::Semicolon if depth == 0 => {
                    self.advance();
                    break;
                }
                Token::LBrace => depth += 1,
                Token::RBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;

    #[test]
    fn test_parse_operation_header() {
        let source = "operation Foo(n: Int, $psi: n, &anc: 2) { }";
        let (unit, diags) = parse(source, "test.bd");
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(unit.decls.len(), 1);
        let Decl::Operation(op) = &unit.decls[0] else {
            panic!("expected operation");
        };
        assert_eq!(op.name, "Foo");
        assert_eq!(op.params.len(), 3);
        assert!(matches!(
            &op.params[1],
            ParamDecl::Quantum { size: SizeSpec::Bound(n), borrowed: false, .. } if n == "n"
        ));
        assert!(matches!(
            &op.params[2],
            ParamDecl::Quantum {
                size: SizeSpec::Literal(2),
                borrowed: true,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_inferred_size() {
        let source = "operation Grow($psi: ?n) { }";
        let (unit, diags) = parse(source, "test.bd");
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Operation(op) = &unit.decls[0] else {
            panic!("expected operation");
        };
        assert!(matches!(
            &op.params[0],
            ParamDecl::Quantum { size: SizeSpec::Inferred(Some(n)), .. } if n == "n"
        ));
    }

    #[test]
    fn test_parse_program_with_shots() {
        let source = "program Main shot 2048 { H |0'2⟩; }";
        let (unit, diags) = parse(source, "test.bd");
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::Program(prog) = &unit.decls[0] else {
            panic!("expected program");
        };
        assert_eq!(prog.name, "Main");
        assert!(prog.shots.is_some());
        assert_eq!(prog.body.len(), 1);
    }

    #[test]
    fn test_parse_extern() {
        let source = "extern func f(Int, Bits) -> Int;";
        let (unit, diags) = parse(source, "test.bd");
        assert!(diags.is_empty(), "{diags:?}");
        let Decl::ExternFunc(f) = &unit.decls[0] else {
            panic!("expected extern func");
        };
        assert_eq!(f.name, "f");
        assert_eq!(
            f.param_types,
            vec![ClassicalType::Int, ClassicalType::Bits]
        );
        assert_eq!(f.return_type, Some(ClassicalType::Int));
    }

    #[test]
    fn test_error_recovery_reports_multiple_errors() {
        let source = "operation A($q) { H $q; X ; Y $q; }\noperation B($q) { Z $$; H $q; }";
        let (unit, diags) = parse(source, "test.bd");
        // Both operations survive, both bad statements are reported.
        assert_eq!(unit.decls.len(), 2);
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].line, 1);
        assert_eq!(diags[1].line, 2);
    }

    #[test]
    fn test_good_statements_survive_recovery() {
        let source = "operation A($q) { H $q; X ; Y $q; }";
        let (unit, _) = parse(source, "test.bd");
        let Decl::Operation(op) = &unit.decls[0] else {
            panic!("expected operation");
        };
        assert_eq!(op.body.len(), 2);
        assert!(matches!(op.body[0].kind, StmtKind::GateApply { .. }));
    }
}
