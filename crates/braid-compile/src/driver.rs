//! The compile driver.
//!
//! Orchestrates read, parse, analysis, and code generation for one
//! source file. Each invocation owns all of its state, so independent
//! compilations are freely parallel.

use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument};

use braid_ir::Module;
use braid_lang::{build_module, Diagnostic, SourcePos};

use crate::config::{Config, ConfigMap};

/// Extension required on Braid source files.
pub const SOURCE_EXTENSION: &str = "bd";

/// The outcome of one compilation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileResult {
    /// Paths of the artifacts written, one per configured target.
    pub targets: Vec<String>,
    /// Diagnostics in discovery order: all parse errors precede all
    /// semantic errors, which precede generation errors.
    pub errors: Vec<Diagnostic>,
}

impl CompileResult {
    /// Check that no error-severity diagnostic was produced.
    pub fn is_success(&self) -> bool {
        !self.errors.iter().any(Diagnostic::is_error)
    }

    fn failed(errors: Vec<Diagnostic>) -> Self {
        Self {
            targets: Vec::new(),
            errors,
        }
    }
}

/// Compile one source file and write the configured target artifacts.
///
/// Every failure mode surfaces as a diagnostic in the returned result;
/// nothing panics across this boundary. If any error-severity
/// diagnostic exists, `targets` is empty and no artifact is written.
/// Warnings and notes never block generation.
#[instrument(skip(config))]
pub fn compile(path: &str, config: &ConfigMap) -> CompileResult {
    // Config problems are reported before the source is even read.
    let resolved = match Config::resolve(config) {
        Ok(resolved) => resolved,
        Err(err) => {
            return CompileResult::failed(vec![Diagnostic::error(
                path,
                SourcePos::none(),
                err.to_string(),
            )]);
        }
    };

    if Path::new(path).extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION) {
        return CompileResult::failed(vec![Diagnostic::error(
            path,
            SourcePos::none(),
            format!("source file must have a .{SOURCE_EXTENSION} extension"),
        )]);
    }

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            return CompileResult::failed(vec![Diagnostic::error(
                path,
                SourcePos::none(),
                format!("cannot read '{path}': {err}"),
            )]);
        }
    };

    info!(path, targets = resolved.targets.len(), "compiling");
    let (module, mut errors) = build_module(&source, path);
    if errors.iter().any(Diagnostic::is_error) {
        debug!(count = errors.len(), "stopping before code generation");
        return CompileResult::failed(errors);
    }

    // Render every artifact before writing any, so one failed target
    // never leaves a partial artifact set behind.
    let mut rendered = Vec::with_capacity(resolved.targets.len());
    for target in &resolved.targets {
        match render(&module, target) {
            Ok(text) => rendered.push((target.clone(), text)),
            Err(message) => errors.push(Diagnostic::error(path, SourcePos::none(), message)),
        }
    }
    if errors.iter().any(Diagnostic::is_error) {
        return CompileResult::failed(errors);
    }

    let mut targets = Vec::with_capacity(rendered.len());
    for (target, text) in rendered {
        if let Err(err) = fs::write(&target, text) {
            errors.push(Diagnostic::error(
                path,
                SourcePos::none(),
                format!("cannot write '{target}': {err}"),
            ));
            return CompileResult::failed(errors);
        }
        debug!(target, "artifact written");
        targets.push(target);
    }

    info!(targets = targets.len(), "compilation finished");
    CompileResult { targets, errors }
}

/// Render the module for one target, dispatching on the path extension.
fn render(module: &Module, target: &str) -> Result<String, String> {
    match Path::new(target).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext == braid_qvm::FILE_EXTENSION => braid_qvm::generate(module)
            .map_err(|err| format!("cannot render '{target}': {err}")),
        Some(ext) if ext == braid_qasm3::FILE_EXTENSION => braid_qasm3::generate(module)
            .map_err(|err| format!("cannot render '{target}': {err}")),
        _ => Err(format!("target '{target}' has no backend for its extension")),
    }
}
