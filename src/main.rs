use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use clap_stdin::FileOrStdin;
use log::{debug, LevelFilter};

use spcc::driver::{self, Input, Options};

/// Compiles a subset of C to x86-64 and links it with the system toolchain.
#[derive(Parser, Debug)]
#[command(name = "spcc", version)]
struct Cli {
    /// Source files, `-` for standard input
    #[arg(required = true)]
    inputs: Vec<FileOrStdin>,

    /// Output file name
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Compile only: write assembly and stop
    #[arg(short = 'S')]
    compile_only: bool,

    /// Assemble but do not link
    #[arg(short = 'c')]
    assemble_only: bool,

    /// Print the AST of every function
    #[arg(short = 'T', long)]
    dump_ast: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Assembler program
    #[arg(long, env = "SPCC_AS", default_value = "as")]
    assembler: String,

    /// Compiler driver used for linking
    #[arg(long, env = "SPCC_CC", default_value = "cc")]
    linker: String,
}

impl Cli {
    fn into_options(self) -> Result<Options, clap_stdin::StdinError> {
        let inputs = self
            .inputs
            .into_iter()
            .map(|input| {
                let name = if input.is_stdin() {
                    "-".to_string()
                } else {
                    input.filename().to_string()
                };
                input.contents().map(|source| Input { name, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Options {
            inputs,
            output: self.output,
            compile_only: self.compile_only,
            assemble_only: self.assemble_only,
            dump_ast: self.dump_ast,
            assembler: self.assembler,
            linker: self.linker,
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::new();
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    } else {
        logger.filter_level(LevelFilter::Warn).parse_default_env();
    }
    logger.init();

    let options = match cli.into_options() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("spcc: {}", e);
            return ExitCode::FAILURE;
        }
    };
    debug!("{} input(s), output {:?}", options.inputs.len(), options.output);

    match driver::run(&options) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("spcc: {}", e);
            ExitCode::FAILURE
        }
    }
}
