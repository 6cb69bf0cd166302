//! Image loading.
//!
//! This module contains the `Loader` struct, which orchestrates a load:
//! 1. Validation: only 32-bit images into 32-bit workspaces.
//! 2. Section mapping: every section at `ImageBase + RVA`, page aligned.
//! 3. Import resolution: the import directory is read back from the mapped sections.
//! 4. Hooks: optionally, thunk slots are redirected to emulator call-stubs.
//! 5. Registration: the module joins the workspace's registry.
//!
//! The order is fixed because the import tables live inside section memory. Images always load
//! at their preferred base, so base relocations are never applied.

use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::error::{Error, Result};
use crate::hook::ImportHookInstaller;
use crate::image::{Bitness, ImageHeader, IMAGE_DIRECTORY_ENTRY_BASERELOC};
use crate::imports::walk_import_directory;
use crate::layout::map_section;
use crate::thunk::install_hooks;
use crate::workspace::{LoadedModule, Workspace};

pub struct Loader<'a> {
    name: String,
    header: ImageHeader,
    file: &'a [u8],
    config: LoaderConfig,
    hooks: Option<Box<dyn ImportHookInstaller + 'a>>,
}

impl<'a> Loader<'a> {
    /// Creates a loader for an already parsed image. `file` holds the section bytes.
    pub fn new(name: &str, header: ImageHeader, file: &'a [u8]) -> Self {
        Self {
            name: name.to_string(),
            header,
            file,
            config: LoaderConfig::default(),
            hooks: None,
        }
    }

    /// Parses the headers of `file` and creates a loader for it.
    pub fn parse(name: &str, file: &'a [u8]) -> Result<Self> {
        Ok(Self::new(name, ImageHeader::parse(file)?, file))
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs a call-stub for every resolved import.
    pub fn with_hooks(mut self, installer: impl ImportHookInstaller + 'a) -> Self {
        self.hooks = Some(Box::new(installer));
        self
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Loads the image into `ws` and returns the registered module.
    ///
    /// The first error aborts the load. With `rollback_on_failure` set, regions mapped before the
    /// failure are released again; otherwise they stay in the workspace.
    pub fn load<W: Workspace + ?Sized>(&self, ws: &mut W) -> Result<LoadedModule> {
        self.validate(ws)?;

        let base = self.header.image_base;
        let entry = base + u64::from(self.header.entry_rva);
        let mut module = LoadedModule::new(&self.name, base, entry);
        info!(
            "loading {} at 0x{:x}, entry 0x{:x}, {} sections",
            module.name,
            base,
            module.entry_point,
            self.header.sections.len()
        );

        if let Err(err) = self.populate(ws, &mut module) {
            if self.config.rollback_on_failure {
                rollback(ws, &module);
            }
            return Err(err);
        }

        info!(
            "loaded {}: {} regions, {} imports",
            module.name,
            module.regions.len(),
            module.imports.len()
        );
        Ok(module)
    }

    fn validate<W: Workspace + ?Sized>(&self, ws: &W) -> Result<()> {
        if self.header.bitness != Bitness::Bits32 {
            return Err(Error::UnsupportedFormat(format!(
                "{:?} image; only 32-bit images are supported",
                self.header.bitness
            )));
        }
        if ws.pointer_size() != Bitness::Bits32.pointer_size() {
            return Err(Error::UnsupportedFormat(format!(
                "{}-byte workspace pointers; a 32-bit workspace is required",
                ws.pointer_size()
            )));
        }
        Ok(())
    }

    fn populate<W: Workspace + ?Sized>(&self, ws: &mut W, module: &mut LoadedModule) -> Result<()> {
        for section in &self.header.sections {
            map_section(ws, module, section, self.file)?;
        }
        module.size = module
            .regions
            .iter()
            .map(|r| r.end())
            .max()
            .map_or(0, |end| end - module.base_address);

        if self
            .header
            .data_directory(IMAGE_DIRECTORY_ENTRY_BASERELOC)
            .is_some_and(|d| !d.is_empty())
        {
            debug!("ignoring base relocations, {} stays at its preferred base", module.name);
        }

        match self.header.import_directory() {
            Some(directory) => {
                let max_name_len = self.config.max_name_len;
                for dll in walk_import_directory(&*ws, module, directory, max_name_len)? {
                    module.dependencies.push(dll.name);
                    module.imports.extend(dll.imports);
                }
            }
            None => debug!("{} has no import directory", module.name),
        }

        if let Some(installer) = &self.hooks {
            install_hooks(ws, module, installer.as_ref())?;
        }

        ws.register_module(module.clone())
    }
}

/// Releases every region `module` mapped, newest first.
fn rollback<W: Workspace + ?Sized>(ws: &mut W, module: &LoadedModule) {
    for region in module.regions.iter().rev() {
        match ws.unmap_memory(region.start) {
            Ok(()) => debug!("rolled back {}", region.label),
            Err(err) => warn!("failed to roll back {}: {}", region.label, err),
        }
    }
}
