//! End-to-end frontend tests: source text through parse, analysis, and
//! lowering to the instruction level.

use braid_ir::{ControlRef, Gate, Instruction, Module, QubitRef};
use braid_lang::{build_module, Diagnostic};

fn build(source: &str) -> (Module, Vec<Diagnostic>) {
    build_module(source, "test.bd")
}

fn assert_clean(diags: &[Diagnostic]) {
    assert!(diags.iter().all(|d| !d.is_error()), "unexpected errors: {diags:?}");
}

fn assert_error_containing(diags: &[Diagnostic], needle: &str) {
    assert!(
        diags.iter().any(|d| d.is_error() && d.message.contains(needle)),
        "no error containing {needle:?} in {diags:?}"
    );
}

#[test]
fn bell_program_lowers() {
    let (module, diags) = build(
        r"
program Bell {
    let $q = |0'2>;
    H $q[0];
    CNOT $q[0], $q[1];
    measure $q;
}
",
    );
    assert_clean(&diags);
    let bell = module.program("Bell").unwrap();
    assert_eq!(bell.shots, 1024);
    assert_eq!(bell.registers.len(), 1);
    assert_eq!(bell.registers[0].name, "q");
    assert_eq!(bell.registers[0].size, 2);
    assert_eq!(bell.registers[0].init, Some(0));
    assert_eq!(bell.body.len(), 3);
    assert!(bell.body[2].is_measure());
    assert_eq!(bell.body[2].targets().len(), 2);
}

#[test]
fn ctrl_modifier_becomes_control_set() {
    let (module, diags) = build(
        r"
operation Foo($psi: 2) {
    X $psi[0] ctrl &psi[1];
}
",
    );
    assert_clean(&diags);
    let op = module.operation("Foo").unwrap();
    assert_eq!(op.body.len(), 1);
    let Instruction::Gate { gate, targets } = &op.body[0] else {
        panic!("expected gate instruction");
    };
    let Gate::Controlled(base, controls) = gate else {
        panic!("expected controlled gate, got {gate}");
    };
    assert_eq!(base.as_ref(), &Gate::named("X"));
    assert_eq!(
        controls.as_slice(),
        [ControlRef::positive(QubitRef::new("psi", 1))]
    );
    assert_eq!(targets.as_slice(), [QubitRef::new("psi", 0)]);
}

#[test]
fn out_of_range_index_is_an_error() {
    let (module, diags) = build(
        r"
operation Foo($psi: 2) {
    X $psi[5];
}
",
    );
    assert_error_containing(&diags, "out of range");
    assert!(module.operation("Foo").is_none());
    let err = diags.iter().find(|d| d.is_error()).unwrap();
    assert!(err.line > 0 && err.column > 0);
}

#[test]
fn huge_index_is_an_error_not_a_dropped_statement() {
    let (module, diags) = build(
        r"
operation Foo($q: 1) {
    X $q[2 ** 32];
}
",
    );
    assert_error_containing(&diags, "too large");
    // the statement must not vanish silently
    assert!(module.operation("Foo").is_none());
}

#[test]
fn unknown_gate_is_undefined_symbol() {
    let (_, diags) = build(
        r"
operation Foo($psi: 1) {
    Frob $psi;
}
",
    );
    assert_error_containing(&diags, "undefined symbol 'Frob'");
}

#[test]
fn inferred_size_from_indices() {
    let (module, diags) = build(
        r"
operation Grow($psi: ?n) {
    X $psi[2];
    H $psi[n - 1];
}
",
    );
    assert_clean(&diags);
    let op = module.operation("Grow").unwrap();
    assert_eq!(op.registers[0].size, 3);
    assert_eq!(op.body.len(), 2);
    // n resolved to 3, so the second statement lands on psi[2] too
    assert_eq!(op.body[1].targets(), [QubitRef::new("psi", 2)]);
}

#[test]
fn inferred_size_unifies_with_callee() {
    let (module, diags) = build(
        r"
operation Inner($a: 3) {
    X $a[0];
}
operation Outer($b: ?) {
    Inner $b;
}
",
    );
    assert_clean(&diags);
    let outer = module.operation("Outer").unwrap();
    assert_eq!(outer.registers[0].size, 3);
    assert_eq!(outer.body.len(), 1);
    let Instruction::Gate { gate, targets } = &outer.body[0] else {
        panic!("expected gate instruction");
    };
    assert_eq!(gate, &Gate::named("Inner"));
    assert_eq!(targets.len(), 3);
}

#[test]
fn classical_arguments_specialize_the_callee() {
    let (module, diags) = build(
        r"
operation Rot(k: Int, $q: 1) {
    Rz(pi / 2 ** k) $q;
}
program Main {
    let $q = |0>;
    Rot(1) $q;
    Rot(2) $q;
}
",
    );
    assert_clean(&diags);
    assert!(module.operation("Rot").is_none());
    assert!(module.operation("Rot$1").is_some());
    assert!(module.operation("Rot$2").is_some());
    let main = module.program("Main").unwrap();
    assert_eq!(main.body.len(), 2);
    assert_eq!(main.body[0].as_gate(), Some(&Gate::named("Rot$1")));
    assert_eq!(main.body[1].as_gate(), Some(&Gate::named("Rot$2")));
}

#[test]
fn comprehension_expands_per_item() {
    let (module, diags) = build(
        r"
program Sweep {
    let $q = |0'4>;
    H $q[i] | i <- [0:4];
}
",
    );
    assert_clean(&diags);
    let prog = module.program("Sweep").unwrap();
    assert_eq!(prog.body.len(), 4);
    for (i, instr) in prog.body.iter().enumerate() {
        assert_eq!(
            instr.targets(),
            [QubitRef::new("q", u32::try_from(i).unwrap())]
        );
    }
}

#[test]
fn with_appends_inverted_setup() {
    let (module, diags) = build(
        r"
operation Wrapped($q: 2) {
    with H $q[0] {
        X $q[1];
    }
}
",
    );
    assert_clean(&diags);
    let op = module.operation("Wrapped").unwrap();
    assert_eq!(op.body.len(), 3);
    assert_eq!(op.body[0].as_gate(), Some(&Gate::named("H")));
    assert_eq!(op.body[1].as_gate(), Some(&Gate::named("X")));
    assert_eq!(op.body[2].as_gate(), Some(&Gate::named("H").dagger()));
    assert_eq!(op.body[2].targets(), op.body[0].targets());
}

#[test]
fn qif_else_flips_control_polarity() {
    let (module, diags) = build(
        r"
operation Branch($q: 2, &c: 1) {
    qif &c[0] {
        X $q[0];
    } else {
        Z $q[1];
    }
}
",
    );
    assert_clean(&diags);
    let op = module.operation("Branch").unwrap();
    assert_eq!(op.body.len(), 2);
    let Some(Gate::Controlled(_, then_controls)) = op.body[0].as_gate() else {
        panic!("then arm is not controlled");
    };
    let Some(Gate::Controlled(_, else_controls)) = op.body[1].as_gate() else {
        panic!("else arm is not controlled");
    };
    assert_eq!(
        then_controls.as_slice(),
        [ControlRef::positive(QubitRef::new("c", 0))]
    );
    assert_eq!(
        else_controls.as_slice(),
        [ControlRef::negative(QubitRef::new("c", 0))]
    );
}

#[test]
fn disjunctive_predicate_is_rejected() {
    let (_, diags) = build(
        r"
operation Bad($q: 1, &c: 2) {
    qif &c[0] or &c[1] {
        X $q;
    }
}
",
    );
    assert_error_containing(&diags, "disjunction");
}

#[test]
fn measurement_under_qif_is_rejected() {
    let (_, diags) = build(
        r"
operation Bad($q: 1, &c: 1) {
    qif &c[0] {
        measure $q;
    }
}
",
    );
    assert_error_containing(&diags, "measurement cannot appear");
}

#[test]
fn recursion_is_rejected() {
    let (_, diags) = build(
        r"
operation Loop($q: 1) {
    Loop $q;
}
",
    );
    assert_error_containing(&diags, "recursive call");
}

#[test]
fn forward_use_of_inferred_size_is_rejected() {
    let (_, diags) = build(
        r"
operation A($q: 1) {
    B $q;
}
operation B($q: ?) {
    X $q[0];
}
",
    );
    assert_error_containing(&diags, "used before its size is known");
}

#[test]
fn forward_call_with_explicit_size_is_fine() {
    let (module, diags) = build(
        r"
operation A($q: 2) {
    B $q;
}
operation B($q: 2) {
    X $q[0];
}
",
    );
    assert_clean(&diags);
    assert!(module.operation("A").is_some());
    assert!(module.operation("B").is_some());
}

#[test]
fn shot_count_overrides_default() {
    let (module, diags) = build(
        r"
program P shot 64 {
    let $q = |0>;
    H $q;
}
",
    );
    assert_clean(&diags);
    assert_eq!(module.program("P").unwrap().shots, 64);
}

#[test]
fn duplicate_definitions_are_reported_once() {
    let (module, diags) = build(
        r"
operation Foo($q: 1) {
    X $q[0];
}
operation Foo($q: 1) {
    Z $q[0];
}
",
    );
    assert_error_containing(&diags, "duplicate definition of 'Foo'");
    // the first definition wins
    let op = module.operation("Foo").unwrap();
    assert_eq!(op.body[0].as_gate(), Some(&Gate::named("X")));
}

#[test]
fn extern_call_fails_where_a_value_is_demanded() {
    let (_, diags) = build(
        r"
extern func f(Int) -> Int;
operation A($q: 1) {
    for i in [0:f(3)] {
        X $q[0];
    }
}
",
    );
    assert_error_containing(&diags, "value must be statically known here");
}

#[test]
fn ket_target_allocates_anonymous_register() {
    let (module, diags) = build(
        r"
operation A($q: 1) {
    CNOT $q[0], |1>;
}
",
    );
    assert_clean(&diags);
    let op = module.operation("A").unwrap();
    assert_eq!(op.registers.len(), 2);
    assert_eq!(op.registers[1].name, "k0");
    assert_eq!(op.registers[1].size, 1);
    assert_eq!(op.registers[1].init, Some(1));
    assert_eq!(
        op.body[0].targets(),
        [QubitRef::new("q", 0), QubitRef::new("k0", 0)]
    );
}

#[test]
fn gate_sequence_applies_left_to_right() {
    let (module, diags) = build(
        r"
operation Seq($q: 1) {
    H X Z $q;
}
",
    );
    assert_clean(&diags);
    let op = module.operation("Seq").unwrap();
    let names: Vec<_> = op
        .body
        .iter()
        .filter_map(|i| i.as_gate().and_then(Gate::base_name))
        .collect();
    assert_eq!(names, ["H", "X", "Z"]);
}

#[test]
fn measure_slice_selects_qubits() {
    let (module, diags) = build(
        r"
program P {
    let $q = |0'3>;
    measure[0:2] $q;
}
",
    );
    assert_clean(&diags);
    let prog = module.program("P").unwrap();
    assert_eq!(prog.body.len(), 1);
    assert_eq!(
        prog.body[0].targets(),
        [QubitRef::new("q", 0), QubitRef::new("q", 1)]
    );
}

#[test]
fn tensor_power_spans_the_whole_register() {
    let (module, diags) = build(
        r"
operation Spread($q: ?) {
    H @ 4 $q;
}
",
    );
    assert_clean(&diags);
    let op = module.operation("Spread").unwrap();
    assert_eq!(op.registers[0].size, 4);
    assert_eq!(
        op.body[0].as_gate(),
        Some(&Gate::named("H").tensor_power(4))
    );
}

#[test]
fn operation_without_qubit_parameters_is_rejected() {
    let (module, diags) = build(
        r"
operation Nothing() {
    let x = 1;
}
",
    );
    assert_error_containing(&diags, "at least one qubit parameter");
    assert!(module.operation("Nothing").is_none());
}

#[test]
fn program_parameters_are_rejected() {
    let (_, diags) = build(
        r"
program P(n: Int) {
    let $q = |0>;
    H $q;
}
",
    );
    assert_error_containing(&diags, "cannot declare parameters");
}
