// Line-pattern patching of arbitrary text files in the working tree.
//
// A directive finds the first line whose trimmed content equals its pattern and
// inserts its payload before/after that line, or replaces it. Later occurrences
// are left alone. Application reports an explicit outcome; a directive whose
// pattern is absent leaves the file untouched and the caller decides policy.
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{PatchError, Result, read_to_string, write};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Line(String),
    Lines(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    #[serde(alias = "Before", alias = "BEFORE")]
    Before,
    #[default]
    #[serde(alias = "After", alias = "AFTER")]
    After,
    #[serde(alias = "At", alias = "AT")]
    At,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchDirective {
    /// Relative to the working tree root.
    pub path: PathBuf,
    /// A single source line, already trimmed.
    pub pattern: String,
    pub payload: Payload,
    pub position: Position,
    pub match_indent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatchOutcome {
    /// 1-based line number of the matched line in the original text.
    Applied { line: usize },
    NotFound,
}

impl PatchDirective {
    /// Apply to in-memory text. Returns `None` for the text when nothing matched.
    pub fn apply_to_text(&self, text: &str) -> (Option<String>, PatchOutcome) {
        let pattern = self.pattern.trim();
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let Some(idx) = lines.iter().position(|l| l.trim() == pattern) else {
            return (None, PatchOutcome::NotFound);
        };
        let matched = lines[idx];
        let indent = if self.match_indent {
            "\t".repeat(matched.len() - matched.trim_start_matches('\t').len())
        } else {
            String::new()
        };
        let mut block = String::new();
        match &self.payload {
            Payload::Line(line) => {
                block.push_str(&indent);
                block.push_str(line);
                block.push('\n');
            }
            Payload::Lines(lines) => {
                for line in lines {
                    block.push_str(&indent);
                    block.push_str(line);
                    block.push('\n');
                }
            }
        }

        let mut out = String::with_capacity(text.len() + block.len() + 1);
        for (i, line) in lines.iter().enumerate() {
            if i != idx {
                out.push_str(line);
                continue;
            }
            match self.position {
                Position::Before => {
                    out.push_str(&block);
                    out.push_str(line);
                }
                Position::After => {
                    out.push_str(line);
                    if !line.ends_with('\n') {
                        out.push('\n');
                    }
                    out.push_str(&block);
                }
                Position::At => out.push_str(&block),
            }
        }
        (Some(out), PatchOutcome::Applied { line: idx + 1 })
    }

    /// Apply to `root/self.path`, writing only when the pattern matched.
    pub fn apply_in(&self, root: &Path) -> Result<PatchOutcome> {
        let target = resolve_in_tree(root, &self.path)?;
        let text = read_to_string(&target)?;
        let (patched, outcome) = self.apply_to_text(&text);
        if let Some(patched) = patched {
            write(&target, patched)?;
        }
        Ok(outcome)
    }
}

/// Join a mod-supplied relative path onto the tree root, refusing anything that
/// could escape it.
pub fn resolve_in_tree(root: &Path, rel: &Path) -> Result<PathBuf> {
    let escapes = rel.as_os_str().is_empty()
        || rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(PatchError::InvalidPatchPath {
            path: rel.to_path_buf(),
        });
    }
    Ok(root.join(rel))
}

/// Plain substring replacement over a whole file. Returns the number of replacements.
pub fn replace_in_file(path: &Path, old: &str, new: &str) -> Result<usize> {
    let text = read_to_string(path)?;
    let count = text.matches(old).count();
    if count > 0 {
        write(path, text.replace(old, new))?;
    }
    Ok(count)
}
