pub mod lexer;
pub mod ast;
pub mod parser;
pub mod types;
pub mod diagnostics;
pub mod config;
pub mod logging;
pub mod vm;

use thiserror::Error;

use config::CheckerOptions;
use diagnostics::Diagnostic;
use parser::{parse_source, FrontendError};
use vm::{BuildError, Bytecode, Compiler, VmError, VM};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Frontend(#[from] FrontendError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Vm(#[from] VmError),
}

/// Parse, compile and link one source file
pub fn compile_source(source: &str, filename: &str) -> Result<Bytecode, CheckError> {
    let file = parse_source(source, filename)?;
    let program = Compiler::new(filename).compile(&file);
    Ok(program.build()?)
}

/// Compile and run one source file on a fresh VM
pub fn check_source(source: &str, filename: &str, options: &CheckerOptions) -> Result<Vec<Diagnostic>, CheckError> {
    let bytecode = compile_source(source, filename)?;
    let mut vm = VM::new().with_options(options.clone());
    vm.run(&bytecode)?;
    Ok(vm.diagnostics().to_vec())
}
