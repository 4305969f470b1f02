//! QVM assembly backend.
//!
//! Renders a lowered [`braid_ir::Module`] as QVM assembly, a flat
//! line-oriented format executed by stack-style quantum virtual
//! machines. Operations and programs become `op`/`prog` blocks holding
//! `reg` declarations and `push` instructions; structured gates unwind
//! into `dagger`/`enddagger` and `ctrl`/`nctrl`/`endctrl` framing.

mod generator;

pub use generator::{generate, QvmGenerator, FILE_EXTENSION};
