//! End-to-end driver tests: source file through configuration, frontend
//! passes, and artifact writing.

use std::fs;
use std::path::Path;

use braid_compile::{compile, CompileResult, ConfigMap, Severity};
use tempfile::TempDir;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write `source` as a `.bd` file in a fresh directory and compile it
/// with a single `.qvm` target.
fn compile_source(source: &str) -> (TempDir, String, CompileResult) {
    init_logging();
    let dir = TempDir::new().unwrap();
    let src_path = dir.path().join("main.bd");
    fs::write(&src_path, source).unwrap();
    let out_path = dir.path().join("out.qvm");

    let mut config = ConfigMap::new();
    config.insert(
        "targets".to_string(),
        vec![out_path.to_str().unwrap().to_string()],
    );

    let result = compile(src_path.to_str().unwrap(), &config);
    let out = out_path.to_str().unwrap().to_string();
    (dir, out, result)
}

#[test]
fn well_formed_program_yields_an_artifact() {
    let (_dir, out, result) = compile_source(
        r"
program Bell {
    let $q = |0'2>;
    H $q[0];
    CNOT $q[0], $q[1];
    measure $q;
}
",
    );
    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(result.targets, [out.clone()]);
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("prog Bell shots 1024"));
    assert!(text.contains("push H q[0]"));
    assert!(text.contains("push CNOT q[0], q[1]"));
    assert!(text.contains("measure q[0], q[1]"));
}

#[test]
fn undefined_symbol_blocks_generation() {
    let (_dir, out, result) = compile_source(
        r"
operation Foo($psi: 1) {
    Frob $psi;
}
",
    );
    assert!(result.targets.is_empty());
    assert!(!Path::new(&out).exists());
    let err = result
        .errors
        .iter()
        .find(|d| d.is_error() && d.message.contains("Frob"))
        .expect("no diagnostic names the symbol");
    assert!(err.line > 0 && err.column > 0);
}

#[test]
fn ctrl_modifier_compiles_and_renders() {
    let (_dir, out, result) = compile_source(
        r"
operation Foo($psi: 2) {
    X $psi[0] ctrl &psi[1];
}
",
    );
    assert!(result.is_success(), "{:?}", result.errors);
    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("ctrl psi[1]"));
    assert!(text.contains("push X psi[0]"));
    assert!(text.contains("endctrl"));
}

#[test]
fn out_of_range_index_blocks_generation() {
    let (_dir, _out, result) = compile_source(
        r"
operation Foo($psi: 2) {
    X $psi[5];
}
",
    );
    assert!(!result.is_success());
    assert!(result.targets.is_empty());
    assert!(result
        .errors
        .iter()
        .any(|d| d.message.contains("out of range")));
}

#[test]
fn missing_config_key_fails_before_parsing() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let src_path = dir.path().join("broken.bd");
    // Not even valid Braid; the config check must come first.
    fs::write(&src_path, "operation {{{{").unwrap();

    let result = compile(src_path.to_str().unwrap(), &ConfigMap::new());
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("targets"));
    assert!(result.targets.is_empty());
}

#[test]
fn unreadable_source_is_a_single_error() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.bd");
    let mut config = ConfigMap::new();
    config.insert("targets".to_string(), vec!["out.qvm".to_string()]);

    let result = compile(missing.to_str().unwrap(), &config);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("cannot read"));
    assert!(result.targets.is_empty());
}

#[test]
fn wrong_source_extension_is_rejected() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let src_path = dir.path().join("main.txt");
    fs::write(&src_path, "program P { let $q = |0>; H $q; }").unwrap();
    let mut config = ConfigMap::new();
    config.insert("targets".to_string(), vec!["out.qvm".to_string()]);

    let result = compile(src_path.to_str().unwrap(), &config);
    assert!(result.errors.iter().any(|d| d.message.contains(".bd")));
    assert!(result.targets.is_empty());
}

#[test]
fn unknown_target_extension_is_rejected() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let src_path = dir.path().join("main.bd");
    fs::write(&src_path, "program P { let $q = |0>; H $q; }").unwrap();
    let out_path = dir.path().join("out.xyz");
    let mut config = ConfigMap::new();
    config.insert(
        "targets".to_string(),
        vec![out_path.to_str().unwrap().to_string()],
    );

    let result = compile(src_path.to_str().unwrap(), &config);
    assert!(result
        .errors
        .iter()
        .any(|d| d.is_error() && d.message.contains("no backend")));
    assert!(result.targets.is_empty());
    assert!(!out_path.exists());
}

#[test]
fn warnings_do_not_block_generation() {
    let (_dir, out, result) = compile_source(
        r"
operation H($q: 1) {
    X $q[0];
}
program P {
    let $q = |0>;
    X $q;
}
",
    );
    assert!(result.is_success(), "{:?}", result.errors);
    assert!(result
        .errors
        .iter()
        .any(|d| d.severity == Severity::Warning && d.message.contains("shadows")));
    assert_eq!(result.targets, [out.clone()]);
    assert!(Path::new(&out).exists());
}

#[test]
fn multiple_targets_are_all_written() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let src_path = dir.path().join("main.bd");
    fs::write(&src_path, "program P { let $q = |0>; H $q; measure $q; }").unwrap();
    let a = dir.path().join("a.qvm");
    let b = dir.path().join("b.qvm");
    let mut config = ConfigMap::new();
    config.insert(
        "targets".to_string(),
        vec![
            a.to_str().unwrap().to_string(),
            b.to_str().unwrap().to_string(),
        ],
    );

    let result = compile(src_path.to_str().unwrap(), &config);
    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(result.targets.len(), 2);
    assert_eq!(
        fs::read_to_string(&a).unwrap(),
        fs::read_to_string(&b).unwrap()
    );
}

#[test]
fn qvm_and_qasm_backends_both_render() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let src_path = dir.path().join("main.bd");
    fs::write(
        &src_path,
        r"
program Bell {
    let $q = |0'2>;
    H $q[0];
    CNOT $q[0], $q[1];
    measure $q;
}
",
    )
    .unwrap();
    let qvm = dir.path().join("out.qvm");
    let qasm = dir.path().join("out.qasm");
    let mut config = ConfigMap::new();
    config.insert(
        "targets".to_string(),
        vec![
            qvm.to_str().unwrap().to_string(),
            qasm.to_str().unwrap().to_string(),
        ],
    );

    let result = compile(src_path.to_str().unwrap(), &config);
    assert!(result.is_success(), "{:?}", result.errors);
    assert_eq!(result.targets.len(), 2);

    let qvm_text = fs::read_to_string(&qvm).unwrap();
    assert!(qvm_text.contains("prog Bell shots 1024"));
    assert!(qvm_text.contains("push CNOT q[0], q[1]"));

    let qasm_text = fs::read_to_string(&qasm).unwrap();
    assert!(qasm_text.starts_with("OPENQASM 3.0;"));
    assert!(qasm_text.contains("def Bell() {"));
    assert!(qasm_text.contains("qubit[2] q;"));
    assert!(qasm_text.contains("h q[0];"));
    assert!(qasm_text.contains("cx q[0], q[1];"));
}

#[test]
fn compilation_is_deterministic() {
    let source = r"
operation Grow($psi: ?n) {
    X $psi[2];
    H $psi[n - 1];
}
program P {
    let $q = |0'3>;
    Grow $q;
    measure $q;
}
";
    let (_d1, out1, first) = compile_source(source);
    let (_d2, out2, second) = compile_source(source);
    assert_eq!(first.errors, second.errors);
    assert_eq!(
        fs::read_to_string(&out1).unwrap(),
        fs::read_to_string(&out2).unwrap()
    );
}
