use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, PatchError>;

/// Everything that can abort a patch run.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: invalid YAML: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("template `{name}` failed: {source}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("mod `{mod_name}`: {message}")]
    InvalidModManifest { mod_name: String, message: String },

    #[error("{entity} `{name}` in mod `{mod_name}` is invalid: {message}")]
    InvalidDefinition {
        mod_name: String,
        entity: &'static str,
        name: String,
        message: String,
    },

    #[error("{entity} `{name}` in mod `{mod_name}` is missing the `{field}` property")]
    MissingRequiredField {
        mod_name: String,
        entity: &'static str,
        name: String,
        field: &'static str,
    },

    #[error("card `{card}` in mod `{mod_name}` declares unknown trigger `{trigger}`")]
    InvalidTrigger {
        mod_name: String,
        card: String,
        trigger: String,
    },

    #[error("{entity} `{name}` in mod `{mod_name}` references unknown identifier `{identifier}`")]
    UnresolvedIdentifier {
        mod_name: String,
        entity: &'static str,
        name: String,
        identifier: String,
    },

    #[error("identifier `{identifier}` in mod `{mod_name}` is already taken by id {existing}")]
    DuplicateIdentifier {
        mod_name: String,
        identifier: String,
        existing: u32,
    },

    #[error("patch pattern {pattern:?} not found in {}", path.display())]
    PatchNotApplied { path: PathBuf, pattern: String },

    #[error("patch target {} must be a relative path inside the source tree", path.display())]
    InvalidPatchPath { path: PathBuf },

    #[error("no room block for location `{location}` in {}", path.display())]
    UnknownLocation { path: PathBuf, location: String },

    #[error("{}: table has no closing brace", path.display())]
    MalformedTable { path: PathBuf },

    #[error("{}: {message}", path.display())]
    MalformedDescriptor { path: PathBuf, message: String },

    #[error("working dir {} must not overlap source dir {}", working.display(), source_dir.display())]
    InvalidWorkingDir { working: PathBuf, source_dir: PathBuf },
}

impl PatchError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> PatchError + '_ {
        move |source| PatchError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn image(path: &Path) -> impl FnOnce(image::ImageError) -> PatchError + '_ {
        move |source| PatchError::Image {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn template(name: &str) -> impl FnOnce(minijinja::Error) -> PatchError + '_ {
        move |source| PatchError::Template {
            name: name.to_string(),
            source,
        }
    }
}

pub(crate) fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(PatchError::io(path))
}

pub(crate) fn write(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    std::fs::write(path, contents).map_err(PatchError::io(path))
}
