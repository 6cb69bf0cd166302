//! PE Image Loader Library.
//!
//! This library loads 32-bit Windows images into an emulated address space so an emulator can
//! run or inspect them without an operating system. It is organized into several modules:
//! - `image`: Parsed header metadata and the PE header parser.
//! - `workspace`: The virtual memory and module registry the loader populates.
//! - `loader`: The load orchestration.
//! - `layout`: Page-aligned section mapping.
//! - `imports`: Import directory walking.
//! - `thunk`: Thunk table resolution and import hook installation.
//! - `symbol`: Import identities.
//! - `hook`: Pluggable import call-stub backends.
//! - `strings`: Bounded ASCII and UTF-16LE decoders.
//! - `config`: Loader options and CLI configuration.

pub mod config;
pub mod error;
pub mod hook;
pub mod image;
pub mod imports;
pub mod layout;
pub mod loader;
pub mod strings;
pub mod symbol;
pub mod thunk;
pub mod utils;
pub mod workspace;

pub use error::{Error, Result};
pub use loader::Loader;
