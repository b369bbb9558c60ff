//! dgm-core: merges mod packages into a decompiled D&DG source tree
//!
//! The surface is small and batch-oriented:
//! - Manifest loading with recursive key normalization (`manifest`)
//! - Contiguous id allocation per category across mods (`ids`)
//! - Built-in and mod-supplied template rendering (`render`)
//! - Append-only sprite atlas packing with `.tres` bookkeeping (`atlas`)
//! - Table-entry injection and line-pattern patching without a parser (`table`, `patch`, `rooms`)
//! - The run itself, from tree reset to cosmetic patches (`pipeline`)
//!
pub mod atlas;
pub mod config;
pub mod error;
pub mod ids;
pub mod manifest;
pub mod patch;
pub mod pipeline;
pub mod render;
pub mod rooms;
pub mod scaffold;
pub mod table;

pub use config::{IdBases, Layout, PatchOpts, UnmatchedPolicy};
pub use error::{PatchError, Result};
pub use manifest::{ModManifest, ModPackage, load_manifest, load_package};
pub use patch::{PatchDirective, PatchOutcome, Payload, Position};
pub use pipeline::{ModReport, PatchReport, Pipeline, reset_working_tree};
pub use scaffold::{ScaffoldOpts, scaffold_mod};

use std::fs;
use std::path::{Path, PathBuf};

pub fn is_mod_dir(p: &Path) -> bool { p.is_dir() && p.join(manifest::MANIFEST_FILE).exists() }

/// Mod directories in lexicographic path order. This order decides id
/// allocation, so it is sorted rather than left to the filesystem.
pub fn list_mods(root: &Path) -> Result<Vec<PathBuf>> {
    let rd = fs::read_dir(root).map_err(PatchError::io(root))?;
    let mut out = Vec::new();
    for e in rd.flatten() {
        let p = e.path();
        if is_mod_dir(&p) { out.push(p); }
    }
    out.sort(); Ok(out)
}
