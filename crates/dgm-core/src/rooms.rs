// Registering encounters with their location in RoomList.gd.
//
// Each location owns an enum-like dictionary `var <Location>Rooms = { ... }`
// and one random pool per difficulty `var <location>_<difficulty>_random_encounters = [ ... ]`.
// Both are found by pattern and extended right after their last item.
use regex::Regex;
use std::path::Path;

use crate::error::{PatchError, Result, read_to_string, write};
use crate::manifest::Difficulty;

/// Words of a display name reduced to ASCII alphanumerics; everything else
/// separates words or is dropped, so the result is always a valid identifier part.
fn words(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .map(|w| w.chars().filter(char::is_ascii_alphanumeric).collect::<String>())
        .filter(|w| !w.is_empty())
}

/// `dark forest` -> `DarkForest`
pub fn room_prefix(location: &str) -> String {
    words(location)
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect()
}

/// `Mr. Bones` -> `mr_bones`
fn snake(s: &str) -> String {
    words(s).collect::<Vec<_>>().join("_").to_ascii_lowercase()
}

/// Whether `name` and `location` both keep at least one identifier character.
pub fn is_registrable(location: &str, name: &str) -> bool {
    words(location).next().is_some() && words(name).next().is_some()
}

/// `ENCOUNTER_<NAME>`
pub fn encounter_const(name: &str) -> String {
    format!("ENCOUNTER_{}", snake(name).to_uppercase())
}

/// `<location>_<name>`, the value stored in the room dictionary and the key of the encounter table.
pub fn encounter_key(location: &str, name: &str) -> String {
    format!("{}_{}", snake(location), snake(name))
}

/// Add the encounter to its location's room dictionary and difficulty pool.
pub fn register_in_text(
    text: &str,
    location: &str,
    name: &str,
    difficulty: Difficulty,
) -> Option<String> {
    let prefix = room_prefix(location);
    let constant = encounter_const(name);

    let room = Regex::new(&format!(
        r#"var {}Rooms = \{{(\s*[A-Z0-9_]+ = "[a-z0-9_]+",?)+"#,
        regex::escape(&prefix)
    ))
    .ok()?;
    let text = insert_after(
        text,
        &room,
        &format!("\n\t{} = \"{}\"", constant, encounter_key(location, name)),
    )?;

    let pool = Regex::new(&format!(
        r#"var {}_{}_random_encounters = \[(\s*[A-Za-z0-9_.]+,?)+"#,
        regex::escape(&snake(location)),
        difficulty.as_str()
    ))
    .ok()?;
    insert_after(&text, &pool, &format!("\n\t{}Rooms.{}", prefix, constant))
}

fn insert_after(text: &str, re: &Regex, item: &str) -> Option<String> {
    let m = re.find(text)?;
    let sep = if m.as_str().ends_with(',') { "" } else { "," };
    Some(format!("{}{}{}{}", &text[..m.end()], sep, item, &text[m.end()..]))
}

pub fn register_encounter(
    path: &Path,
    location: &str,
    name: &str,
    difficulty: Difficulty,
) -> Result<()> {
    let text = read_to_string(path)?;
    let patched = register_in_text(&text, location, name, difficulty).ok_or_else(|| {
        PatchError::UnknownLocation {
            path: path.to_path_buf(),
            location: location.to_string(),
        }
    })?;
    write(path, patched)
}
