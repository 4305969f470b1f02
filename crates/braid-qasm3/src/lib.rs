//! OpenQASM 3 backend: renders a lowered module as QASM source for
//! tooling that speaks the open interchange format.

mod generator;

pub use generator::{generate, Qasm3Generator, FILE_EXTENSION};
