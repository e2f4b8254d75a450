use std::{
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, info};

use crate::{
    compile_with,
    error::{CompileError, Result},
    CompileOptions,
};

/// One source file, already read. `name` is `-` for standard input.
#[derive(Clone, Debug)]
pub struct Input {
    pub name: String,
    pub source: String,
}

/// What the driver should produce.
#[derive(Clone, Debug)]
pub struct Options {
    pub inputs: Vec<Input>,
    pub output: Option<PathBuf>,
    /// Stop after writing assembly.
    pub compile_only: bool,
    /// Stop after assembling object files.
    pub assemble_only: bool,
    pub dump_ast: bool,
    pub assembler: String,
    pub linker: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: None,
            compile_only: false,
            assemble_only: false,
            dump_ast: false,
            assembler: "as".to_string(),
            linker: "cc".to_string(),
        }
    }
}

/// Base name for the files derived from an input.
fn stem(input: &Input) -> PathBuf {
    match Path::new(&input.name).file_stem() {
        Some(stem) if input.name != "-" => PathBuf::from(stem),
        _ => PathBuf::from("stdin"),
    }
}

/// Runs `program` and fails if it exits unsuccessfully.
fn run_tool<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    debug!("running {:?}", command);
    let status = command.status()?;
    if !status.success() {
        return Err(CompileError::Toolchain {
            program: program.to_string(),
            status,
        });
    }
    Ok(())
}

pub fn assemble(assembler: &str, assembly: &Path, object: &Path) -> Result<()> {
    run_tool(assembler, [OsStr::new("-o"), object.as_os_str(), assembly.as_os_str()])
}

pub fn link(linker: &str, objects: &[PathBuf], output: &Path) -> Result<()> {
    let mut args = vec![OsStr::new("-no-pie"), OsStr::new("-o"), output.as_os_str()];
    args.extend(objects.iter().map(|object| object.as_os_str()));
    run_tool(linker, args)
}

/// Compiles every input and runs the requested toolchain stages. Returns
/// the files that were produced.
///
/// Files that are only steps towards the requested output live in a
/// private directory that is removed on return. Inputs with the same stem
/// therefore never overwrite each other.
pub fn run(options: &Options) -> Result<Vec<PathBuf>> {
    // An explicit output name only makes sense for a single intermediate file.
    let single = options.inputs.len() == 1;
    let scratch = tempfile::Builder::new().prefix("spcc").tempdir()?;
    debug!("intermediate files in {}", scratch.path().display());
    let mut objects = Vec::new();
    let mut produced = Vec::new();

    for (index, input) in options.inputs.iter().enumerate() {
        info!("compiling {}", input.name);
        let compilation = compile_with(
            &input.source,
            &CompileOptions {
                dump_ast: options.dump_ast,
            },
        )?;
        if let Some(dump) = &compilation.ast_dump {
            print!("{}", dump);
        }

        let stem = stem(input);
        let intermediate = |extension: &str| {
            let mut name = OsString::from(format!("{}-", index));
            name.push(stem.with_extension(extension));
            scratch.path().join(name)
        };

        let assembly = match &options.output {
            Some(output) if options.compile_only && single => output.clone(),
            _ if options.compile_only => stem.with_extension("s"),
            _ => intermediate("s"),
        };
        fs::write(&assembly, &compilation.assembly)?;
        if options.compile_only {
            produced.push(assembly);
            continue;
        }

        let object = match &options.output {
            Some(output) if options.assemble_only && single => output.clone(),
            _ if options.assemble_only => stem.with_extension("o"),
            _ => intermediate("o"),
        };
        assemble(&options.assembler, &assembly, &object)?;
        objects.push(object);
    }

    if options.compile_only {
        return Ok(produced);
    }
    if options.assemble_only {
        return Ok(objects);
    }

    let executable = options
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("a.out"));
    link(&options.linker, &objects, &executable)?;
    Ok(vec![executable])
}
