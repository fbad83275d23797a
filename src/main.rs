use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser as ClapParser, Subcommand};
use tracing::{debug, info};

use typevm::ast::SourceFile;
use typevm::config::CheckerOptions;
use typevm::diagnostics::{JsonCatalog, MessageCatalog};
use typevm::lexer::Lexer;
use typevm::logging;
use typevm::parser::Parser;
use typevm::vm::disasm::disassemble;
use typevm::vm::{Bytecode, Compiler, VM};

#[derive(ClapParser)]
#[command(name = "typevm", version, about = "Bytecode type checker for a TypeScript subset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct RunOptions {
    /// Checker options as JSON
    #[arg(long)]
    config: Option<PathBuf>,
    /// Maximum generic instantiation depth (1 to 1000)
    #[arg(long)]
    max_depth: Option<usize>,
    /// Abort after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,
    /// Message catalog (JSON object of message key to template)
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Print diagnostics as JSON
    #[arg(long)]
    json: bool,
    /// Run the program this many times on fresh VMs
    #[arg(long, default_value_t = 1)]
    runs: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the token stream (debug)
    Tokenize {
        /// Path to .ts file
        file: PathBuf,
    },
    /// Parse and display the syntax tree
    Parse {
        /// Path to .ts file
        file: PathBuf,
    },
    /// Type-check a source file
    Check {
        /// Path to .ts file
        file: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Print the bytecode of a source file or a built blob
    Disasm {
        /// Path to .ts file or .tyvm blob
        file: PathBuf,
    },
    /// Compile a source file into a bytecode blob
    Build {
        /// Path to .ts file
        file: PathBuf,
        /// Output path (defaults to the input with a .tyvm extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Execute a previously built blob
    Run {
        /// Path to .tyvm blob
        file: PathBuf,
        #[command(flatten)]
        options: RunOptions,
    },
}

fn main() {
    logging::init_tracing();
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Tokenize { file } => cmd_tokenize(&file),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Check { file, options } => cmd_check(&file, &options),
        Commands::Disasm { file } => cmd_disasm(&file),
        Commands::Build { file, output } => cmd_build(&file, output.as_deref()),
        Commands::Run { file, options } => cmd_run(&file, &options),
    };
    process::exit(exit_code);
}

const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB
const BLOB_MAGIC: &[u8] = b"TYVM";

fn check_size(path: &Path) -> Result<String, i32> {
    let filename = path.to_string_lossy().to_string();
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > MAX_SOURCE_SIZE => {
            eprintln!(
                "Error: file {} is too large ({} bytes, max {} bytes)",
                filename,
                meta.len(),
                MAX_SOURCE_SIZE
            );
            Err(1)
        }
        Ok(_) => Ok(filename),
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            Err(1)
        }
    }
}

fn read_source(path: &Path) -> Result<(String, String), i32> {
    let filename = check_size(path)?;
    match std::fs::read_to_string(path) {
        Ok(source) => Ok((source, filename)),
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            Err(1)
        }
    }
}

fn read_blob(path: &Path) -> Result<Bytecode, i32> {
    let filename = check_size(path)?;
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            return Err(1);
        }
    };
    Bytecode::from_bytes(bytes).map_err(|e| {
        eprintln!("Error: {} is not a valid bytecode blob: {}", filename, e);
        1
    })
}

fn lex_and_parse(path: &Path) -> Result<(SourceFile, String), i32> {
    let (source, filename) = read_source(path)?;

    let tokens = match Lexer::new(&source, &filename).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            return Err(1);
        }
    };

    let file = match Parser::new(tokens, &filename).parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Parse error: {}", e);
            return Err(1);
        }
    };

    Ok((file, filename))
}

fn compile_file(path: &Path) -> Result<Bytecode, i32> {
    let (file, filename) = lex_and_parse(path)?;
    let program = Compiler::new(&filename).compile(&file);
    program.build().map_err(|e| {
        eprintln!("Build error: {}", e);
        1
    })
}

fn cmd_tokenize(path: &Path) -> i32 {
    let (source, filename) = match read_source(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let tokens = match Lexer::new(&source, &filename).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            return 1;
        }
    };

    for tok in &tokens {
        println!("{}", tok);
    }
    0
}

fn cmd_parse(path: &Path) -> i32 {
    match lex_and_parse(path) {
        Ok((file, _)) => {
            for stmt in &file.statements {
                println!("{:#?}", stmt);
            }
            0
        }
        Err(code) => code,
    }
}

fn load_options(options: &RunOptions) -> Result<CheckerOptions, i32> {
    let mut checker = match &options.config {
        Some(path) => CheckerOptions::from_json_file(path).map_err(|e| {
            eprintln!("Error: {}", e);
            1
        })?,
        None => CheckerOptions::default(),
    };
    if let Some(depth) = options.max_depth {
        checker.max_instantiation_depth = depth;
    }
    if options.max_steps.is_some() {
        checker.max_steps = options.max_steps;
    }
    checker.validate().map_err(|e| {
        eprintln!("Error: {}", e);
        1
    })?;
    Ok(checker)
}

fn build_vm(options: &RunOptions) -> Result<VM, i32> {
    let checker = load_options(options)?;
    let mut vm = VM::new().with_options(checker);
    if let Some(path) = &options.catalog {
        let catalog = JsonCatalog::from_file(path).map_err(|e| {
            eprintln!("Error: {}", e);
            1
        })?;
        debug!(entries = catalog.len(), "loaded message catalog");
        vm = vm.with_catalog(Arc::new(catalog) as Arc<dyn MessageCatalog>);
    }
    Ok(vm)
}

fn execute(bytecode: &Bytecode, options: &RunOptions) -> i32 {
    let runs = options.runs.max(1);
    let mut first: Option<Vec<String>> = None;

    for run in 0..runs {
        // Fresh VM per run
        let mut vm = match build_vm(options) {
            Ok(vm) => vm,
            Err(code) => return code,
        };
        if let Err(e) = vm.run(bytecode) {
            eprintln!("Internal error: {}", e);
            return 2;
        }

        let rendered = vm.errors();
        match &first {
            None => {
                vm.report();
                if options.json {
                    match serde_json::to_string_pretty(vm.diagnostics()) {
                        Ok(text) => println!("{}", text),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            return 2;
                        }
                    }
                } else {
                    for line in &rendered {
                        println!("{}", line);
                    }
                }
                first = Some(rendered);
            }
            Some(expected) if *expected != rendered => {
                eprintln!("Error: run {} produced different diagnostics", run + 1);
                return 2;
            }
            Some(_) => {}
        }
    }

    let count = first.map_or(0, |d| d.len());
    info!(runs, diagnostics = count, "check finished");
    if !options.json {
        if count == 0 {
            println!("No errors.");
        } else {
            println!("Found {} error{}.", count, if count == 1 { "" } else { "s" });
        }
    }
    if count > 0 {
        1
    } else {
        0
    }
}

fn cmd_check(path: &Path, options: &RunOptions) -> i32 {
    match compile_file(path) {
        Ok(bytecode) => execute(&bytecode, options),
        Err(code) => code,
    }
}

fn cmd_run(path: &Path, options: &RunOptions) -> i32 {
    match read_blob(path) {
        Ok(bytecode) => execute(&bytecode, options),
        Err(code) => code,
    }
}

fn cmd_disasm(path: &Path) -> i32 {
    let is_blob = std::fs::read(path)
        .map(|bytes| bytes.starts_with(BLOB_MAGIC))
        .unwrap_or(false);
    let bytecode = if is_blob { read_blob(path) } else { compile_file(path) };
    let bytecode = match bytecode {
        Ok(b) => b,
        Err(code) => return code,
    };
    match disassemble(&bytecode) {
        Ok(text) => {
            print!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_build(path: &Path, output: Option<&Path>) -> i32 {
    let bytecode = match compile_file(path) {
        Ok(b) => b,
        Err(code) => return code,
    };
    let out = output.map_or_else(|| path.with_extension("tyvm"), Path::to_path_buf);
    match std::fs::write(&out, bytecode.as_bytes()) {
        Ok(()) => {
            println!("Wrote {} ({} bytes, sha256 {})", out.display(), bytecode.len(), bytecode.digest_hex());
            0
        }
        Err(e) => {
            eprintln!("Error: cannot write {}: {}", out.display(), e);
            1
        }
    }
}
