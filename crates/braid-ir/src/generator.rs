//! The backend contract.

use crate::error::IrResult;
use crate::module::{ResolvedOperation, ResolvedProgram};

/// A code generator renders a lowered module into one target artifact.
///
/// [`Module::dump_code`](crate::Module::dump_code) drives the generator:
/// `begin_module` once, then every operation and program in name order,
/// then `finish`, which yields the rendered text.
///
/// Implementations must be total over the gate algebra. A construct the
/// target cannot express is reported as
/// [`IrError::Unsupported`](crate::IrError::Unsupported), never silently
/// dropped.
pub trait CodeGenerator {
    /// Start a new module.
    fn begin_module(&mut self) -> IrResult<()>;

    /// Render one lowered operation.
    fn operation(&mut self, op: &ResolvedOperation) -> IrResult<()>;

    /// Render one lowered program.
    fn program(&mut self, prog: &ResolvedProgram) -> IrResult<()>;

    /// Finish the module and return the rendered artifact.
    fn finish(&mut self) -> IrResult<String>;
}
