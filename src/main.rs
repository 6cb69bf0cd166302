//! Entry point for the peload driver.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap` and set up `tracing`.
//! 2. Map the input file into memory and parse its headers.
//! 3. Load it into a fresh 32-bit workspace, optionally installing import stubs.
//! 4. Report the module, its regions and its imports.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use memmap2::Mmap;
use std::fs::File;
use tracing_subscriber::EnvFilter;

use peload::config::Config;
use peload::hook::x86::PushRetInstaller;
use peload::image::Bitness;
use peload::utils::hexdump;
use peload::workspace::memory::MemoryWorkspace;
use peload::workspace::Workspace;
use peload::Loader;

const DUMP_LEN: u64 = 0x40;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let file = File::open(&config.input)
        .with_context(|| format!("failed to open {}", config.input.display()))?;
    let mmap = unsafe { Mmap::map(&file)? };

    let name = config.module_name();
    let mut loader = Loader::parse(&name, &mmap)
        .with_context(|| format!("failed to parse {}", config.input.display()))?
        .with_config(config.loader_config());
    if config.hooks {
        loader = loader.with_hooks(PushRetInstaller::new(config.dispatch_address));
    }

    let mut ws = MemoryWorkspace::new(Bitness::Bits32);
    let module = loader
        .load(&mut ws)
        .with_context(|| format!("failed to load {name}"))?;

    println!("module: {}", module.name);
    println!("  base:  0x{:08x}", module.base_address);
    println!("  entry: 0x{:08x}", module.entry_point);
    println!("  size:  0x{:x}", module.size);

    println!("regions:");
    for region in &module.regions {
        println!(
            "  0x{:08x}-0x{:08x}  {}",
            region.start,
            region.end(),
            region.label
        );
        if config.dump {
            let bytes = ws.read_memory(region.start, DUMP_LEN.min(region.length))?;
            print!("{}", hexdump(&bytes, region.start));
        }
    }

    println!("dependencies: {}", module.dependencies.join(", "));

    println!("imports:");
    for import in &module.imports {
        match import.stub {
            Some(stub) => println!("  0x{:08x}  {}  -> 0x{:08x}", import.slot, import, stub),
            None => println!("  0x{:08x}  {}", import.slot, import),
        }
    }

    Ok(())
}
