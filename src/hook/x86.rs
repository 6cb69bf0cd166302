//! x86 stub backend.
//!
//! Implements the `ImportHookInstaller` trait for 32-bit x86 emulation. Every stub is
//!
//! ```text
//! 68 <slot>      push slot        ; identifies the import
//! 68 <dispatch>  push dispatch
//! C3             ret              ; "returns" into the dispatcher
//! ```
//!
//! A `jmp rel32` would need the stub's own address folded into the displacement; push/ret is
//! position independent. The dispatcher pops the slot VA, looks the import up with
//! `LoadedModule::import_at` and finishes with a plain `ret` back to the caller.

use super::ImportHookInstaller;
use crate::error::{Error, Result};
use crate::symbol::Import;

const OP_PUSH_IMM32: u8 = 0x68;
const OP_RET: u8 = 0xC3;

/// Default VA of the synthetic import dispatcher.
pub const DEFAULT_DISPATCH_ADDRESS: u32 = 0xFEE0_0000;

/// The x86 push/ret stub backend.
pub struct PushRetInstaller {
    dispatch: u32,
}

impl PushRetInstaller {
    pub fn new(dispatch: u32) -> Self {
        Self { dispatch }
    }

    pub fn dispatch(&self) -> u32 {
        self.dispatch
    }
}

impl Default for PushRetInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_ADDRESS)
    }
}

impl ImportHookInstaller for PushRetInstaller {
    fn stub_size(&self) -> usize {
        16
    }

    fn stub(&self, import: &Import, _target: u64) -> Result<Vec<u8>> {
        let slot = u32::try_from(import.slot).map_err(|_| {
            Error::UnsupportedFormat(format!("thunk slot 0x{:x} above 4GiB", import.slot))
        })?;

        let mut code = Vec::with_capacity(11);
        code.push(OP_PUSH_IMM32);
        code.extend_from_slice(&slot.to_le_bytes());
        code.push(OP_PUSH_IMM32);
        code.extend_from_slice(&self.dispatch.to_le_bytes());
        code.push(OP_RET);
        Ok(code)
    }
}
