//! Build script rendering the `claimkb` man pages into `OUT_DIR`.
//!
//! Produces `claimkb.1` plus one `claimkb-<subcommand>.1` page per
//! subcommand so packaging can install them alongside the binary.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: Command, out_dir: &Path, file_name: &str) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    fs::write(out_dir.join(file_name), buffer)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = PathBuf::from(
        env::var_os("OUT_DIR")
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?,
    );

    let command = Cli::command();
    for subcommand in command.get_subcommands() {
        let file_name = format!("claimkb-{}.1", subcommand.get_name());
        render(subcommand.clone(), &out_dir, &file_name)?;
    }
    render(command, &out_dir, "claimkb.1")?;

    Ok(())
}
