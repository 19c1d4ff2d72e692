//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "coffer", version, about = "Assemble textual bytecode into class files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Assemble a `.j` source file into a `.class` file.
    Asm {
        /// Assembly source file.
        input: PathBuf,
        /// Output path; defaults to `<classname>.class` next to the input.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emit LineNumberTable and SourceFile debug attributes.
        #[arg(long)]
        line_numbers: bool,
        /// Jasmin compatibility mode (implicit SUPER class flag).
        #[arg(long)]
        jasmin: bool,
    },
}
