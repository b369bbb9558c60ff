// Blank mod creation.
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result, write};
use crate::manifest::{CARDS_FILE, ENCOUNTERS_FILE, MANIFEST_FILE};

#[derive(Debug, Clone)]
pub struct ScaffoldOpts {
    pub name: String,
    pub creator: String,
    /// Directory name; derived from `name` when absent.
    pub slug: Option<String>,
    pub description: String,
    pub version: String,
    pub export_cards: bool,
    pub export_encounters: bool,
}

impl ScaffoldOpts {
    pub fn new(name: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            creator: creator.into(),
            slug: None,
            description: "A DnDG Mod".to_string(),
            version: "0.1.0".to_string(),
            export_cards: true,
            export_encounters: false,
        }
    }
}

#[derive(Serialize)]
struct ManifestDoc<'a> {
    name: &'a str,
    description: &'a str,
    creator: &'a str,
    version: &'a str,
    exports: Vec<&'static str>,
}

/// Terminal-friendly directory name: lower-case ASCII, punctuation dropped,
/// whitespace and hyphen runs collapsed to one `-`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    out.trim_matches(|c| c == '-' || c == '_').to_string()
}

/// Create `<mods_dir>/<slug>` with a manifest, `res/`, `src/` and placeholder documents.
pub fn scaffold_mod(mods_dir: &Path, opts: &ScaffoldOpts) -> Result<PathBuf> {
    let slug = opts.slug.clone().unwrap_or_else(|| slugify(&opts.name));
    let dir = mods_dir.join(&slug);
    if slug.is_empty() || dir.exists() {
        return Err(PatchError::Io {
            path: dir,
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a new mod cannot be created there",
            ),
        });
    }
    fs::create_dir_all(&dir).map_err(PatchError::io(&dir))?;

    let mut exports = Vec::new();
    if opts.export_cards {
        exports.push("cards");
    }
    if opts.export_encounters {
        exports.push("encounters");
    }
    let doc = ManifestDoc {
        name: &opts.name,
        description: &opts.description,
        creator: &opts.creator,
        version: &opts.version,
        exports,
    };
    let manifest_path = dir.join(MANIFEST_FILE);
    let yaml = serde_yaml::to_string(&doc).map_err(|source| PatchError::Yaml {
        path: manifest_path.clone(),
        source,
    })?;
    write(&manifest_path, yaml)?;

    for sub in ["res", "src"] {
        let p = dir.join(sub);
        fs::create_dir(&p).map_err(PatchError::io(&p))?;
    }
    write(&dir.join(CARDS_FILE), "# Add your cards here!\n")?;
    write(&dir.join(ENCOUNTERS_FILE), "# Add your encounters here!\n")?;
    tracing::info!(name = %opts.name, dir = %dir.display(), "created mod");
    Ok(dir)
}
