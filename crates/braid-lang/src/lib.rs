//! Frontend for the Braid quantum circuit language.
//!
//! The frontend turns `.bd` source text into a lowered
//! [`braid_ir::Module`] in three passes: a total lexer ([`lexer`]), a
//! recovering recursive-descent parser ([`parser`]), and semantic
//! analysis ([`analysis`]) covering name resolution, constant folding,
//! register-size inference, and lowering to flat instructions. Every
//! pass reports problems as [`Diagnostic`] values instead of failing;
//! an input that lexes is always carried as far as it can go.
//!
//! ```
//! let source = r#"
//! program Bell {
//!     let $q = |0'2>;
//!     H $q[0];
//!     CNOT $q[0], $q[1];
//!     measure $q;
//! }
//! "#;
//! let (module, diags) = braid_lang::build_module(source, "bell.bd");
//! assert!(diags.is_empty());
//! let bell = module.program("Bell").unwrap();
//! assert_eq!(bell.body.len(), 3);
//! ```

pub mod analysis;
pub mod ast;
pub mod diag;
pub mod lexer;
pub mod parser;

pub use analysis::analyze;
pub use analysis::resolve::Value;
pub use diag::{Diagnostic, Severity, SourcePos};
pub use lexer::{tokenize, Token};
pub use parser::parse;

/// Parse and analyze source text into a lowered module.
///
/// Parse diagnostics come first, then analysis diagnostics in
/// declaration order. The module omits any declaration that failed.
pub fn build_module(source: &str, path: &str) -> (braid_ir::Module, Vec<Diagnostic>) {
    let (unit, mut diags) = parse(source, path);
    let (module, analysis_diags) = analyze(&unit, path);
    diags.extend(analysis_diags);
    (module, diags)
}
