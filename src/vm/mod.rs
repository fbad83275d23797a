//! Type Virtual Machine
//!
//! Bytecode compiler and stack-based VM that evaluate the types of a source
//! file and collect its diagnostics.

pub mod opcodes;
pub mod bytecode;
pub mod program;
pub mod compiler;
pub mod machine;
pub mod disasm;

pub use bytecode::{Bytecode, DecodeError, Module};
pub use compiler::Compiler;
pub use machine::{VmError, VM};
pub use program::{BuildError, Program};
