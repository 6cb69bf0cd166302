//! Thunk table resolution and import hook installation.
//!
//! A thunk table is an array of 32-bit slots ending at a zero slot. Each slot either carries an
//! ordinal (bit 31 set) or the RVA of a hint/name structure. Once every table is resolved,
//! [`install_hooks`] can redirect the slots to emulator call-stubs.

use tracing::{debug, trace};

use crate::error::{malformed_error, Error, Result};
use crate::hook::ImportHookInstaller;
use crate::imports::read_name;
use crate::symbol::{Import, ImportedSymbol, ThunkEntry};
use crate::utils::{align_up, page_span, PAGE_SIZE};
use crate::workspace::{LoadedModule, MappedRegion, Workspace};

const THUNK_SIZE: u64 = 4;

/// Decodes the `IMAGE_IMPORT_BY_NAME` structure at `rva`: a little-endian hint followed by the
/// NUL-terminated name.
fn read_import_by_name<W: Workspace + ?Sized>(
    ws: &W,
    module: &LoadedModule,
    rva: u32,
    max_name_len: usize,
) -> Result<ImportedSymbol> {
    let address = module.va(u64::from(rva));
    match ws.mapped_len(address, 2) {
        0 => return Err(Error::MemoryAccess { address, length: 2 }),
        1 => {
            return Err(malformed_error!(
                "name import at 0x{:x} is shorter than its hint",
                address
            ))
        }
        _ => {}
    }
    let hint = ws.read_u16(address)?;
    let name = read_name(ws, address + 2, max_name_len)?;
    Ok(ImportedSymbol::Name { name, hint })
}

/// Resolves the thunk table at `table_rva`, whose imports come from module `dll`.
pub fn resolve_thunk_table<W: Workspace + ?Sized>(
    ws: &W,
    module: &LoadedModule,
    dll: &str,
    table_rva: u32,
    max_name_len: usize,
) -> Result<Vec<Import>> {
    let mut imports = Vec::new();
    let mut slot = module.va(u64::from(table_rva));

    loop {
        if ws.mapped_len(slot, THUNK_SIZE) < THUNK_SIZE {
            if imports.is_empty() {
                return Err(Error::MemoryAccess {
                    address: slot,
                    length: THUNK_SIZE,
                });
            }
            return Err(malformed_error!(
                "thunk table for {} at rva 0x{:x} runs off mapped memory at 0x{:x}",
                dll,
                table_rva,
                slot
            ));
        }

        let raw = ws.read_pointer(slot)? as u32;
        trace!("thunk 0x{slot:x}: 0x{raw:08x}");

        let symbol = match ThunkEntry::from_raw(raw) {
            None => break,
            Some(ThunkEntry::Ordinal(ordinal)) => ImportedSymbol::Ordinal(ordinal),
            Some(ThunkEntry::NameImport(rva)) => {
                read_import_by_name(ws, module, rva, max_name_len)?
            }
        };
        debug!("  import {dll}!{symbol} at 0x{slot:x}");

        imports.push(Import {
            module: dll.to_string(),
            symbol,
            slot,
            stub: None,
        });
        slot += THUNK_SIZE;
    }

    Ok(imports)
}

/// Writes a call-stub for every import of `module` and points its thunk slot at the stub.
///
/// Stubs live in one region mapped on the first page after the module's current extent, which
/// then grows to cover it. Returns the region, or `None` if the module imports nothing.
pub fn install_hooks<W: Workspace + ?Sized>(
    ws: &mut W,
    module: &mut LoadedModule,
    installer: &dyn ImportHookInstaller,
) -> Result<Option<MappedRegion>> {
    if module.imports.is_empty() {
        return Ok(None);
    }

    let stub_size = installer.stub_size() as u64;
    let start = align_up(module.end(), PAGE_SIZE);
    let length = page_span(stub_size * module.imports.len() as u64);
    let label = format!("{}/.stubs", module.name);

    ws.map_memory(start, length, &label)?;
    let region = MappedRegion {
        start,
        length,
        label,
    };
    module.regions.push(region.clone());
    module.size = region.end() - module.base_address;

    for (i, import) in module.imports.iter_mut().enumerate() {
        let target = start + i as u64 * stub_size;
        let code = installer.stub(import, target)?;
        if code.len() as u64 > stub_size {
            return Err(Error::MemoryAccess {
                address: target,
                length: code.len() as u64,
            });
        }
        let pointer = u32::try_from(target).map_err(|_| {
            Error::UnsupportedFormat(format!("stub address 0x{target:x} above 4GiB"))
        })?;

        ws.write_memory(target, &code)?;
        ws.write_memory(import.slot, &pointer.to_le_bytes())?;
        import.stub = Some(target);
        trace!("hooked {import} via stub at 0x{target:x}");
    }

    debug!(
        "installed {} import stubs at 0x{:x}",
        module.imports.len(),
        region.start
    );
    Ok(Some(region))
}
