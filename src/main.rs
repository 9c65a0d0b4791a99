//! Entry point for the atomld linker.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Verify every input file exists.
//! 3. Map and parse the inputs, then link them with the ARM backend.
//! 4. Write the image only once linking has succeeded.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use tracing_subscriber::EnvFilter;

use atomld::arch::arm::Arm;
use atomld::config::Config;
use atomld::linker::Linker;
use atomld::writer::write_image;

fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let missing: Vec<_> = config.inputs.iter().filter(|path| !path.exists()).collect();
    if !missing.is_empty() {
        for path in missing {
            eprintln!("input file not found: {}", path.display());
        }
        std::process::exit(1);
    }

    let mut linker = Linker::new(Arm);
    for path in &config.inputs {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;
        linker.add_bytes(path.display().to_string(), &mmap)?;
    }

    let linked = linker.link()?;
    write_image(&config.output, linked.image())?;

    if config.print_map {
        for (address, atom) in linked.map() {
            println!("{:#010x} {:>8} {}", address, atom.size(), atom.name);
        }
    }

    tracing::info!(
        "Linked {} bytes to {}",
        linked.image().len(),
        config.output.display()
    );
    Ok(())
}
