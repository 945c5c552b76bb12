//! # Main entry point for the tide interpreter
//!
//! Uses the `clap` crate to parse command line arguments and then calls
//! the appropriate function to either run the REPL or run a file.
//! Not specifying a file will run the REPL, otherwise the file is
//! compiled and executed.

use std::{io::Write, path::PathBuf};

use clap::Parser;

use vm::{InterpretResult, VM};

mod ast;
mod chunk;
mod compiler;
mod config;
mod heap;
mod object;
mod parser;
mod scanner;
mod types;
mod value;
mod vm;

#[derive(Parser, Debug)]
#[command(version, about = "The tide interpreter")]
struct Args {
    file: Option<PathBuf>,

    /// Force a garbage collection before every instruction and print
    /// collection statistics on exit.
    #[arg(long)]
    gc_stress: bool,
}

pub fn main() {
    let args = Args::parse();

    match args.file {
        Some(file) => run_file(file, args.gc_stress),
        None => repl(args.gc_stress),
    }
}

/// Run the REPL.
///
/// This function will loop, reading a line from stdin and passing it to
/// the VM for interpretation. Each line has to be fully valid by itself.
///
/// # Panics
///
/// If stdout can not be flushed or if `read_line` returns an error.
pub fn repl(gc_stress: bool) {
    let mut vm = VM::new(gc_stress);
    loop {
        print!("> ");
        std::io::stdout().flush().unwrap();
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).unwrap() > 0 {
            vm.interpret(line.as_bytes());
        } else {
            println!();
            break;
        }
    }
}

/// Run a file.
///
/// Reads the whole file into memory and passes it to the VM. Compile and
/// runtime errors exit with the appropriate error code; otherwise the
/// script's own numeric result becomes the exit code.
pub fn run_file(file: PathBuf, gc_stress: bool) {
    match std::fs::read(&file) {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(74);
        }
        Ok(contents) => {
            let mut vm = VM::new(gc_stress);
            let result = vm.interpret(&contents);
            if gc_stress {
                vm.shutdown();
                let (allocated, freed) = vm.gc_statistics();
                println!("[GC] Allocated objects: {allocated}");
                println!("[GC] Freed objects: {freed}");
            }
            match result {
                InterpretResult::CompileError => std::process::exit(65),
                InterpretResult::RuntimeError => std::process::exit(70),
                InterpretResult::Ok(code) => std::process::exit(code),
            }
        }
    }
}
