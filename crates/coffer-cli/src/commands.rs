//! Command implementations.

use std::fs;
use std::path::{Path, PathBuf};

use coffer_asm::{AsmError, AssembleOptions, ParseError, assemble, parse};

use crate::cli::{Cli, Command};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Asm(#[from] AsmError),
}

pub fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Asm {
            input,
            output,
            line_numbers,
            jasmin,
        } => asm(&input, output, line_numbers, jasmin),
    }
}

fn asm(
    input: &Path,
    output: Option<PathBuf>,
    line_numbers: bool,
    jasmin: bool,
) -> Result<(), CliError> {
    let source = fs::read_to_string(input)?;
    let mut unit = parse(&source)?;

    let options = AssembleOptions {
        line_numbers,
        jasmin,
        source_name: input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
    };
    let (class_name, bytes) = assemble(&mut unit, &options)?;

    let path = output.unwrap_or_else(|| default_output(input, &class_name));
    fs::write(&path, bytes)?;
    println!("wrote {}", path.display());
    Ok(())
}

/// `<classname>.class` next to the input, using only the class name's
/// final path segment.
fn default_output(input: &Path, class_name: &str) -> PathBuf {
    let simple = class_name.rsplit('/').next().unwrap_or(class_name);
    let file = format!("{simple}.class");
    match input.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file),
        _ => PathBuf::from(file),
    }
}
