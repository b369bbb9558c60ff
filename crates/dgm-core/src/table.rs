// Dictionary-literal table files (CardList.gd, DeckList.gd, EncounterList.gd).
//
// The table is the last thing in its file, so the final `}` closes it. A file
// splits into the text before that brace (existing entries included), the
// whitespace gap, and the footer starting at the brace. New entries go between
// the body and the footer, so every single injection leaves a closed table
// that the next injection can split again.
use std::path::Path;

use crate::error::{PatchError, Result, read_to_string, write};

#[derive(Debug, Clone)]
pub struct TableFile {
    body: String,
    gap: String,
    footer: String,
    has_entries: bool,
    new_entries: Vec<String>,
}

impl TableFile {
    pub fn parse(text: &str) -> Option<TableFile> {
        let close = text.rfind('}')?;
        let body = text[..close].trim_end();
        if !body.contains('{') {
            return None;
        }
        Some(TableFile {
            has_entries: !body.ends_with('{'),
            body: body.to_string(),
            gap: text[body.len()..close].to_string(),
            footer: text[close..].to_string(),
            new_entries: Vec::new(),
        })
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.new_entries.push(entry.into());
    }

    pub fn render(&self) -> String {
        if self.new_entries.is_empty() {
            return format!("{}{}{}", self.body, self.gap, self.footer);
        }
        let mut out = self.body.clone();
        let mut filled = self.has_entries;
        for entry in &self.new_entries {
            if filled && !out.ends_with(',') {
                out.push(',');
            }
            out.push('\n');
            out.push_str(entry.trim_end_matches('\n'));
            filled = true;
        }
        out.push('\n');
        out.push_str(&self.footer);
        out
    }
}

/// Insert one rendered entry before the table's closing brace and write the file back.
pub fn inject_entry(path: &Path, entry: &str) -> Result<()> {
    let text = read_to_string(path)?;
    let mut table = TableFile::parse(&text).ok_or_else(|| PatchError::MalformedTable {
        path: path.to_path_buf(),
    })?;
    table.push(entry);
    write(path, table.render())
}
