#![deny(clippy::all)]

use anyhow::Context;
use cvm::{allocate, compile, execute};
use std::{fs, path::PathBuf, process};
use structopt::StructOpt;

/// The sub-command to execute.
#[derive(Debug, StructOpt)]
enum Command {
    /// Parse and compile source code, reporting any diagnostics, without
    /// running anything.
    #[structopt(name = "compile")]
    Compile {
        /// Path to the source code file
        #[structopt(parse(from_os_str), long = "source", short = "s")]
        source_path: PathBuf,
    },

    /// Compile and execute source code.
    #[structopt(name = "run")]
    Run {
        /// Path to the source code file
        #[structopt(parse(from_os_str), long = "source", short = "s")]
        source_path: PathBuf,
    },
}

/// CVM executable, for compiling and executing CVM programs
#[derive(Debug, StructOpt)]
#[structopt(name = "cvm")]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

fn read_file(path: &PathBuf) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file {:?}", path))
}

fn run(opt: Opt) -> anyhow::Result<()> {
    match opt.cmd {
        Command::Compile { source_path } => {
            let source = read_file(&source_path)?;
            compile(source)?;
        }

        Command::Run { source_path } => {
            let source = read_file(&source_path)?;
            let compiled = compile(source)?;
            let env = allocate(compiled);
            execute(&env)?;
        }
    }
    Ok(())
}

fn main() {
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
