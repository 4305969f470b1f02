//! Statement, gate-term, target, and predicate parsing.
//!
//! The gate grammar is separate from the classical expression grammar:
//! dagger (`!`) binds tighter than tensor power (`@`), which binds
//! tighter than concat (`.`); juxtaposition of gate terms is looser than
//! all three. Targets (`$psi[i]`, kets) belong to the target-reference
//! grammar, not the gate grammar.

use super::{PResult, Parser};
use crate::ast::{
    Comprehension, GateExpr, IndexSpec, Predicate, Stmt, StmtKind, TargetRef,
};
use crate::lexer::Token;

impl Parser {
    /// Parse one statement.
    pub(super) fn parse_statement(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        match self.peek() {
            Some(Token::Qif) => self.parse_qif(),
            Some(Token::With) => self.parse_with(),
            Some(Token::For) => self.parse_for(),
            Some(Token::Each) => self.parse_each(),
            Some(Token::Let) => self.parse_let(),
            Some(Token::Measure) => self.parse_measure(),
            Some(Token::Error(_)) => {
                let message = match self.advance() {
                    Some(Token::Error(slice)) => format!("unrecognized character '{slice}'"),
                    _ => "unrecognized character".to_string(),
                };
                Err(self.err(pos, message))
            }
            Some(_) => self.parse_gate_apply(true),
            None => Err(self.err(pos, "expected statement, found end of input")),
        }
    }

    /// `qif P { … } [else { … }]`
    fn parse_qif(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        self.expect(Token::Qif)?;
        let predicate = self.parse_predicate()?;
        let then_body = self.parse_block()?;
        let else_body = if self.consume(&Token::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt {
            kind: StmtKind::Qif {
                predicate,
                then_body,
                else_body,
            },
            pos,
        })
    }

    /// `with SETUP { body }` — the setup is a plain gate application
    /// terminated by the opening brace, with no trailing modifiers.
    fn parse_with(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        self.expect(Token::With)?;
        let setup = self.parse_gate_apply(false)?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::With {
                setup: Box::new(setup),
                body,
            },
            pos,
        })
    }

    /// `for i in [a:b] { … }`
    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        self.expect(Token::For)?;
        let variable = self.parse_identifier()?;
        self.expect(Token::In)?;
        let range = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::For {
                variable,
                range,
                body,
            },
            pos,
        })
    }

    /// `each i in xs { … }`
    fn parse_each(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        self.expect(Token::Each)?;
        let variable = self.parse_identifier()?;
        self.expect(Token::In)?;
        let source = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(Stmt {
            kind: StmtKind::Each {
                variable,
                source,
                body,
            },
            pos,
        })
    }

    /// `let x = expr;` or `let $x = |ket⟩;`
    fn parse_let(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        self.expect(Token::Let)?;
        if self.consume(&Token::Dollar) {
            let name = self.parse_identifier()?;
            self.expect(Token::Eq)?;
            let ket_pos = self.peek_pos();
            let init = match self.advance() {
                Some(Token::Ket(lit)) => lit,
                Some(other) => {
                    return Err(self.err(
                        ket_pos,
                        format!("expected ket literal after 'let ${name} =', found '{other}'"),
                    ));
                }
                None => {
                    return Err(self.err(ket_pos, "expected ket literal, found end of input"));
                }
            };
            self.expect(Token::Semicolon)?;
            return Ok(Stmt {
                kind: StmtKind::LetQuantum { name, init },
                pos,
            });
        }
        let name = self.parse_identifier()?;
        self.expect(Token::Eq)?;
        let value = self.parse_expression()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt {
            kind: StmtKind::Let { name, value },
            pos,
        })
    }

    /// `measure[slice]? target;`
    fn parse_measure(&mut self) -> PResult<Stmt> {
        let pos = self.peek_pos();
        self.expect(Token::Measure)?;
        let slice = if self.consume(&Token::LBracket) {
            let spec = self.parse_index_spec()?;
            self.expect(Token::RBracket)?;
            Some(spec)
        } else {
            None
        };
        let target = self.parse_target()?;
        self.expect(Token::Semicolon)?;
        Ok(Stmt {
            kind: StmtKind::Measure { slice, target },
            pos,
        })
    }

    /// A gate application: gate terms, targets, optional `ctrl` and
    /// comprehension modifiers. When `terminated` is false this is a
    /// `with`-setup: no modifiers, and parsing stops before `{`.
    fn parse_gate_apply(&mut self, terminated: bool) -> PResult<Stmt> {
        let pos = self.peek_pos();

        let mut gates = Vec::new();
        while matches!(self.peek(), Some(Token::Identifier(_) | Token::LParen)) {
            gates.push(self.parse_gate_concat()?);
        }
        if gates.is_empty() {
            let found = self
                .peek()
                .map_or_else(|| "end of input".to_string(), |t| format!("'{t}'"));
            return Err(self.err(pos, format!("expected statement, found {found}")));
        }

        let mut targets = vec![self.parse_target()?];
        while self.consume(&Token::Comma) {
            targets.push(self.parse_target()?);
        }

        let mut ctrl = None;
        let mut comprehension = None;
        if terminated {
            loop {
                if ctrl.is_none() && self.consume(&Token::Ctrl) {
                    ctrl = Some(self.parse_predicate()?);
                } else if comprehension.is_none() && self.check(&Token::Pipe) {
                    let comp_pos = self.peek_pos();
                    self.advance();
                    let variable = self.parse_identifier()?;
                    self.expect(Token::BindArrow)?;
                    let source = self.parse_expression()?;
                    comprehension = Some(Comprehension {
                        variable,
                        source,
                        pos: comp_pos,
                    });
                } else {
                    break;
                }
            }
            self.expect(Token::Semicolon)?;
        }

        Ok(Stmt {
            kind: StmtKind::GateApply {
                gates,
                targets,
                ctrl,
                comprehension,
            },
            pos,
        })
    }

    /// `G1 . G2 . … . Gk` — matrix composition.
    fn parse_gate_concat(&mut self) -> PResult<GateExpr> {
        let mut parts = vec![self.parse_gate_tensor()?];
        while self.consume(&Token::Dot) {
            parts.push(self.parse_gate_tensor()?);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(GateExpr::Concat(parts))
        }
    }

    /// `G @ n` — tensor power; left-associative.
    fn parse_gate_tensor(&mut self) -> PResult<GateExpr> {
        let mut base = self.parse_gate_postfix()?;
        while self.consume(&Token::At) {
            let exponent = self.parse_expression()?;
            base = GateExpr::TensorPower {
                base: Box::new(base),
                exponent,
            };
        }
        Ok(base)
    }

    /// `G!` — postfix dagger.
    fn parse_gate_postfix(&mut self) -> PResult<GateExpr> {
        let mut base = self.parse_gate_primary()?;
        while self.consume(&Token::Bang) {
            base = GateExpr::Dagger(Box::new(base));
        }
        Ok(base)
    }

    fn parse_gate_primary(&mut self) -> PResult<GateExpr> {
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::Identifier(name)) => {
                let args = if self.consume(&Token::LParen) {
                    let args = self.parse_expression_list()?;
                    self.expect(Token::RParen)?;
                    args
                } else {
                    Vec::new()
                };
                Ok(GateExpr::Named { name, args, pos })
            }
            Some(Token::LParen) => {
                let inner = self.parse_gate_concat()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(other) => Err(self.err(pos, format!("expected gate, found '{other}'"))),
            None => Err(self.err(pos, "expected gate, found end of input")),
        }
    }

    /// `$name[spec]?`, `&name[spec]?`, or a ket literal.
    pub(super) fn parse_target(&mut self) -> PResult<TargetRef> {
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::Dollar | Token::Amp) => {
                let name = self.parse_identifier()?;
                let index = if self.consume(&Token::LBracket) {
                    let spec = self.parse_index_spec()?;
                    self.expect(Token::RBracket)?;
                    Some(spec)
                } else {
                    None
                };
                Ok(TargetRef::Register { name, index, pos })
            }
            Some(Token::Ket(lit)) => Ok(TargetRef::Ket { lit, pos }),
            Some(other) => Err(self.err(pos, format!("expected target, found '{other}'"))),
            None => Err(self.err(pos, "expected target, found end of input")),
        }
    }

    /// Index forms inside `[...]`: single, multi, `a:b`, `a..b`.
    pub(super) fn parse_index_spec(&mut self) -> PResult<IndexSpec> {
        let first = self.parse_expression()?;
        if self.consume(&Token::Colon) {
            let end = self.parse_expression()?;
            return Ok(IndexSpec::Range {
                start: first,
                end,
                inclusive: false,
            });
        }
        if self.consume(&Token::DotDot) {
            let end = self.parse_expression()?;
            return Ok(IndexSpec::Range {
                start: first,
                end,
                inclusive: true,
            });
        }
        if self.check(&Token::Comma) {
            let mut indices = vec![first];
            while self.consume(&Token::Comma) {
                indices.push(self.parse_expression()?);
            }
            return Ok(IndexSpec::Multi(indices));
        }
        Ok(IndexSpec::Single(first))
    }

    /// Predicate grammar: `or` < `and` < `not` < primary.
    pub(super) fn parse_predicate(&mut self) -> PResult<Predicate> {
        let mut left = self.parse_predicate_and()?;
        while self.consume(&Token::Or) {
            let right = self.parse_predicate_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_predicate_and(&mut self) -> PResult<Predicate> {
        let mut left = self.parse_predicate_not()?;
        while self.consume(&Token::And) {
            let right = self.parse_predicate_not()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_predicate_not(&mut self) -> PResult<Predicate> {
        if self.consume(&Token::Not) {
            let inner = self.parse_predicate_not()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_predicate_primary()
    }

    fn parse_predicate_primary(&mut self) -> PResult<Predicate> {
        let pos = self.peek_pos();
        match self.advance() {
            Some(Token::Amp) => {
                let register = self.parse_identifier()?;
                let index = if self.consume(&Token::LBracket) {
                    let spec = self.parse_index_spec()?;
                    self.expect(Token::RBracket)?;
                    Some(spec)
                } else {
                    None
                };
                Ok(Predicate::Basis {
                    register,
                    index,
                    pos,
                })
            }
            Some(Token::LParen) => {
                let inner = self.parse_predicate()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(other) => Err(self.err(
                pos,
                format!("expected basis reference '&reg', found '{other}'"),
            )),
            None => Err(self.err(pos, "expected basis reference, found end of input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{Decl, GateExpr, Predicate, StmtKind, TargetRef};
    use crate::parser::parse;

    fn body_of(source: &str) -> Vec<crate::ast::Stmt> {
        let (unit, diags) = parse(source, "test.bd");
        assert!(diags.is_empty(), "{diags:?}");
        match unit.decls.into_iter().next() {
            Some(Decl::Operation(op)) => op.body,
            Some(Decl::Program(p)) => p.body,
            other => panic!("expected operation or program, got {other:?}"),
        }
    }

    #[test]
    fn test_gate_sequence_and_target() {
        let body = body_of("operation A($psi: 2) { Z Y X $psi[0]; }");
        let StmtKind::GateApply { gates, targets, .. } = &body[0].kind else {
            panic!("expected gate apply");
        };
        assert_eq!(gates.len(), 3);
        assert!(matches!(&gates[0], GateExpr::Named { name, .. } if name == "Z"));
        assert!(matches!(&gates[2], GateExpr::Named { name, .. } if name == "X"));
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_gate_modifier_precedence() {
        // `!` > `@` > `.`: H! @ 2 . X parses as (Dagger(H) tensor 2) concat X.
        let body = body_of("operation A($psi: 2) { H! @ 2 . X $psi; }");
        let StmtKind::GateApply { gates, .. } = &body[0].kind else {
            panic!("expected gate apply");
        };
        assert_eq!(gates.len(), 1);
        let GateExpr::Concat(parts) = &gates[0] else {
            panic!("expected concat, got {:?}", gates[0]);
        };
        assert_eq!(parts.len(), 2);
        let GateExpr::TensorPower { base, .. } = &parts[0] else {
            panic!("expected tensor power");
        };
        assert!(matches!(**base, GateExpr::Dagger(_)));
    }

    #[test]
    fn test_ctrl_modifier() {
        let body = body_of("operation Foo($psi: 2) { X $psi[0] ctrl &psi[1]; }");
        let StmtKind::GateApply { ctrl, .. } = &body[0].kind else {
            panic!("expected gate apply");
        };
        assert!(matches!(ctrl, Some(Predicate::Basis { register, .. }) if register == "psi"));
    }

    #[test]
    fn test_comprehension_modifier() {
        let body = body_of("operation A($psi: 4) { X $psi[i] | i <- [0:4]; }");
        let StmtKind::GateApply { comprehension, .. } = &body[0].kind else {
            panic!("expected gate apply");
        };
        let comp = comprehension.as_ref().expect("comprehension");
        assert_eq!(comp.variable, "i");
    }

    #[test]
    fn test_qif_else() {
        let body = body_of(
            "operation A($psi: 2, &c: 1) { qif &c[0] { X $psi[0]; } else { Y $psi[0]; } }",
        );
        let StmtKind::Qif {
            predicate,
            then_body,
            else_body,
        } = &body[0].kind
        else {
            panic!("expected qif");
        };
        assert!(matches!(predicate, Predicate::Basis { .. }));
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_predicate_precedence() {
        let body = body_of(
            "operation A($q: 1, &a: 2) { qif not &a[0] and &a[1] { X $q[0]; } }",
        );
        let StmtKind::Qif { predicate, .. } = &body[0].kind else {
            panic!("expected qif");
        };
        // not binds tighter than and.
        let Predicate::And(left, _) = predicate else {
            panic!("expected and at the top, got {predicate:?}");
        };
        assert!(matches!(**left, Predicate::Not(_)));
    }

    #[test]
    fn test_with_block() {
        let body = body_of("operation A($q: 2) { with H $q[0] { X $q[1]; } }");
        let StmtKind::With { setup, body: inner } = &body[0].kind else {
            panic!("expected with");
        };
        assert!(matches!(setup.kind, StmtKind::GateApply { .. }));
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn test_for_and_each() {
        let body = body_of(
            "operation A($q: 4) { for i in [0:4] { X $q[i]; } each j in [1, 3] { Z $q[j]; } }",
        );
        assert!(matches!(body[0].kind, StmtKind::For { .. }));
        assert!(matches!(body[1].kind, StmtKind::Each { .. }));
    }

    #[test]
    fn test_measure_with_slice() {
        let body = body_of("program Main { let $q = |0'4⟩; measure[0:2] $q; }");
        assert!(matches!(body[0].kind, StmtKind::LetQuantum { .. }));
        let StmtKind::Measure { slice, target } = &body[1].kind else {
            panic!("expected measure");
        };
        assert!(slice.is_some());
        assert!(matches!(target, TargetRef::Register { name, .. } if name == "q"));
    }

    #[test]
    fn test_multi_index_target() {
        let body = body_of("operation A($q: 4) { SWAP $q[0, 3]; }");
        let StmtKind::GateApply { targets, .. } = &body[0].kind else {
            panic!("expected gate apply");
        };
        assert!(matches!(
            &targets[0],
            TargetRef::Register {
                index: Some(crate::ast::IndexSpec::Multi(v)),
                ..
            } if v.len() == 2
        ));
    }

    #[test]
    fn test_operation_call_with_args() {
        let body = body_of("operation A($q: 4) { Rot(3, 1.5) $q[0:2], $q[2..3]; }");
        let StmtKind::GateApply { gates, targets, .. } = &body[0].kind else {
            panic!("expected gate apply");
        };
        assert!(matches!(&gates[0], GateExpr::Named { name, args, .. }
            if name == "Rot" && args.len() == 2));
        assert_eq!(targets.len(), 2);
    }
}
