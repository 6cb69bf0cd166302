//! Import hook abstraction.
//!
//! This module defines the `ImportHookInstaller` trait, which produces the call-stub an emulator
//! needs in place of each resolved import. The thunk resolver decides where stubs go and patches
//! the thunk slots; the installer only decides what bytes a stub contains, so an emulator backend
//! can be swapped out (or faked in tests) without touching the loader.

use crate::error::Result;
use crate::symbol::Import;

pub mod x86;

/// A target-specific generator of import call-stubs.
pub trait ImportHookInstaller {
    /// Bytes reserved for every stub. `stub` must never return more than this.
    fn stub_size(&self) -> usize;

    /// Returns the stub for `import`, to be written at virtual address `target`.
    ///
    /// # Arguments
    /// * `import` - The resolved import, including the VA of its thunk slot.
    /// * `target` - The VA the stub will be written to.
    fn stub(&self, import: &Import, target: u64) -> Result<Vec<u8>>;
}
