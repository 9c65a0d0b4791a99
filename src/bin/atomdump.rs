//! Prints the contents of Atom object files.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use std::path::PathBuf;

use atomld::atom::{AtomKind, ObjectFile, ReferenceTarget};
use atomld::reader::read_object;

#[derive(Parser, Debug)]
#[command(author, version, about = "Dump Atom object files", long_about = None)]
struct Args {
    /// Object files to dump
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,
}

fn dump(file: &ObjectFile) {
    match file.origin {
        Some(origin) => println!("  origin: {:#x}", origin),
        None => println!("  origin: unspecified"),
    }
    for (id, atom) in file.iter() {
        let mut flags = String::new();
        flags.push(if atom.is_defined { 'D' } else { 'U' });
        flags.push(if atom.is_global { 'G' } else { 'L' });
        if atom.is_main() {
            flags.push('M');
        }
        println!("  {:>4} {:<9} {:<3} {:>8} {}", id.index(), atom.kind_name(), flags, atom.size(), atom.name);

        match &atom.kind {
            AtomKind::Procedure(proc) => {
                for reference in &proc.references {
                    let target = match reference.target {
                        ReferenceTarget::Global(target) => match file.get(target) {
                            Some(target) => format!("'{}'", target.name),
                            None => format!("<missing {}>", target),
                        },
                        ReferenceTarget::Local(offset) => format!("+{:#x}", offset),
                    };
                    println!(
                        "         {:#06x} {:?} -> {}",
                        reference.address, reference.address_type, target
                    );
                }
            }
            AtomKind::String(content) => println!("         {:?}", content),
            AtomKind::Data(_) => {}
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    for path in &args.inputs {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to map {}", path.display()))?;
        let object = read_object(&mmap).with_context(|| format!("failed to parse {}", path.display()))?;
        println!("{}:", path.display());
        dump(&object);
    }
    Ok(())
}
