//! Workspace abstraction.
//!
//! This module defines the `Workspace` trait, the virtual address space and module registry
//! that the loader populates. The loader only ever talks to this trait; `memory` provides the
//! in-process implementation used by the driver and the tests.

use crate::error::{Error, Result};
use crate::symbol::Import;

pub mod memory;

/// A contiguous mapping in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRegion {
    pub start: u64,
    pub length: u64,
    /// Diagnostic label such as `app.exe/.text`.
    pub label: String,
}

impl MappedRegion {
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn contains(&self, va: u64) -> bool {
        va >= self.start && va < self.end()
    }
}

/// An image loaded into a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedModule {
    pub name: String,
    /// Fixed at load time. Images are never relocated.
    pub base_address: u64,
    pub entry_point: u64,
    /// Extent of the module's address range starting at `base_address`.
    pub size: u64,
    pub regions: Vec<MappedRegion>,
    /// Names from the import directory in descriptor order, including modules that contribute
    /// no imports.
    pub dependencies: Vec<String>,
    pub imports: Vec<Import>,
}

impl LoadedModule {
    pub fn new(name: &str, base_address: u64, entry_point: u64) -> Self {
        Self {
            name: name.to_string(),
            base_address,
            entry_point,
            size: 0,
            regions: Vec::new(),
            dependencies: Vec::new(),
            imports: Vec::new(),
        }
    }

    /// Translates an RVA into a virtual address.
    pub fn va(&self, rva: u64) -> u64 {
        self.base_address + rva
    }

    pub fn end(&self) -> u64 {
        self.base_address + self.size
    }

    pub fn contains(&self, va: u64) -> bool {
        va >= self.base_address && va < self.end()
    }

    /// Finds the import whose thunk slot lives at `slot`.
    pub fn import_at(&self, slot: u64) -> Option<&Import> {
        self.imports.iter().find(|i| i.slot == slot)
    }
}

/// Virtual memory and module registry consumed by the loader.
///
/// All calls are synchronous. The workspace is single-writer during a load.
pub trait Workspace {
    /// Width of a pointer in the emulated address space.
    fn pointer_size(&self) -> usize;

    /// Reserves a zero-initialized, page-aligned region.
    fn map_memory(&mut self, start: u64, length: u64, label: &str) -> Result<()>;

    /// Releases the region that starts exactly at `start`.
    fn unmap_memory(&mut self, start: u64) -> Result<()>;

    fn read_memory(&self, address: u64, length: u64) -> Result<Vec<u8>>;

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()>;

    /// Number of contiguously mapped bytes starting at `address`, capped at `max`.
    fn mapped_len(&self, address: u64, max: u64) -> u64;

    /// Adds a module to the registry. Fails if its range overlaps a registered module.
    fn register_module(&mut self, module: LoadedModule) -> Result<()>;

    fn read_u16(&self, address: u64) -> Result<u16> {
        let buf = self.read_memory(address, 2)?;
        Ok(u16::from_le_bytes([buf[0], buf[1]]))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        let buf = self.read_memory(address, 4)?;
        Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
    }

    /// Reads a little-endian value of `pointer_size()` bytes.
    fn read_pointer(&self, address: u64) -> Result<u64> {
        match self.pointer_size() {
            4 => self.read_u32(address).map(u64::from),
            8 => {
                let buf = self.read_memory(address, 8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf);
                Ok(u64::from_le_bytes(raw))
            }
            n => Err(Error::UnsupportedFormat(format!("{n}-byte pointers"))),
        }
    }
}
