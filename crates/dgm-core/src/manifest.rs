// Mod package documents: mod.yaml, cards.yaml, decks.yaml, encounters.yaml, patches.yaml.
//
// YAML is converted to serde_json values (insertion ordered) with every map key
// lower-cased, trimmed and space->underscore normalized, then deserialized into
// the typed definitions below. Entity names (the top-level keys of the entity
// documents) are display strings and keep their spelling.
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as J};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result, read_to_string};
use crate::patch::{Payload, PatchDirective, Position};

pub const MANIFEST_FILE: &str = "mod.yaml";
pub const CARDS_FILE: &str = "cards.yaml";
pub const DECKS_FILE: &str = "decks.yaml";
pub const ENCOUNTERS_FILE: &str = "encounters.yaml";
pub const PATCHES_FILE: &str = "patches.yaml";

pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(' ', "_")
}

/// Convert a YAML value to JSON, normalizing keys at every depth.
pub fn normalize(value: serde_yaml::Value) -> J {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => J::Null,
        Y::Bool(b) => J::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                J::from(i)
            } else if let Some(u) = n.as_u64() {
                J::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(J::Number)
                    .unwrap_or(J::Null)
            }
        }
        Y::String(s) => J::String(s),
        Y::Sequence(seq) => J::Array(seq.into_iter().map(normalize).collect()),
        Y::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let Some(key) = key_string(k) else { continue };
                out.insert(normalize_key(&key), normalize(v));
            }
            J::Object(out)
        }
        Y::Tagged(tagged) => normalize(tagged.value),
    }
}

fn key_string(key: serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(s) => Some(s),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn read_yaml(path: &Path) -> Result<serde_yaml::Value> {
    let text = read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|source| PatchError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Export {
    Cards,
    Decks,
    Encounters,
    Patches,
}

impl Export {
    pub const ALL: [Export; 4] = [Export::Cards, Export::Decks, Export::Encounters, Export::Patches];

    pub fn as_str(self) -> &'static str {
        match self {
            Export::Cards => "cards",
            Export::Decks => "decks",
            Export::Encounters => "encounters",
            Export::Patches => "patches",
        }
    }

    pub fn parse(s: &str) -> Option<Export> {
        Export::ALL.into_iter().find(|e| e.as_str() == normalize_key(s))
    }
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ModManifest {
    pub name: String,
    pub creator: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub exports: BTreeSet<Export>,
    pub enabled: bool,
}

#[derive(Deserialize)]
struct RawManifest {
    name: Option<String>,
    creator: Option<String>,
    version: Option<J>,
    description: Option<String>,
    #[serde(default)]
    exports: Vec<String>,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Load `mod.yaml`. Exports are only validated for enabled mods, so a disabled
/// mod is skipped no matter what else its manifest declares.
pub fn load_manifest(mod_dir: &Path) -> Result<ModManifest> {
    let path = mod_dir.join(MANIFEST_FILE);
    let fallback = mod_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw: RawManifest = serde_json::from_value(normalize(read_yaml(&path)?)).map_err(|e| {
        PatchError::InvalidModManifest {
            mod_name: fallback.clone(),
            message: e.to_string(),
        }
    })?;
    let name = raw.name.unwrap_or(fallback);
    let mut manifest = ModManifest {
        name,
        creator: raw.creator,
        version: raw.version.map(|v| match v {
            J::String(s) => s,
            other => other.to_string(),
        }),
        description: raw.description,
        exports: BTreeSet::new(),
        enabled: raw.enabled,
    };
    if !manifest.enabled {
        return Ok(manifest);
    }
    for export in &raw.exports {
        let Some(e) = Export::parse(export) else {
            return Err(PatchError::InvalidModManifest {
                mod_name: manifest.name,
                message: format!(
                    "cannot export `{}`; valid exports are cards, decks, encounters, patches",
                    export
                ),
            });
        };
        manifest.exports.insert(e);
    }
    Ok(manifest)
}

/// A reference to another entity: a vanilla numeric id or a mod `identifier`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Id(u32),
    Identifier(String),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "{}", id),
            EntityRef::Identifier(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSource {
    File(PathBuf),
    WithArgs { filename: PathBuf, args: Map<String, J> },
}

impl TriggerSource {
    pub fn filename(&self) -> &Path {
        match self {
            TriggerSource::File(f) => f,
            TriggerSource::WithArgs { filename, .. } => filename,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub name: String,
    pub source: TriggerSource,
}

#[derive(Debug, Clone)]
pub struct CardDefinition {
    pub name: String,
    pub description: String,
    pub value: i64,
    pub suit: String,
    pub attributes: Vec<String>,
    pub flexible: Option<bool>,
    pub keywords: Option<Vec<String>>,
    pub identifier: Option<String>,
    pub image: PathBuf,
    pub foil: Option<PathBuf>,
    pub triggers: Vec<Trigger>,
}

#[derive(Deserialize)]
struct RawCard {
    description: Option<String>,
    value: Option<i64>,
    #[serde(default = "default_suit")]
    suit: String,
    #[serde(default = "default_attributes")]
    attributes: Vec<String>,
    flexible: Option<bool>,
    keywords: Option<Vec<String>>,
    identifier: Option<String>,
    image: Option<PathBuf>,
    foil: Option<PathBuf>,
    #[serde(default)]
    triggers: Map<String, J>,
}

fn default_suit() -> String {
    "special".to_string()
}

fn default_attributes() -> Vec<String> {
    vec!["REWARD".to_string()]
}

#[derive(Debug, Clone)]
pub struct DeckDefinition {
    pub name: String,
    pub description: String,
    pub identifier: Option<String>,
    pub cover_card: EntityRef,
    pub cards: Vec<EntityRef>,
}

#[derive(Deserialize)]
struct RawDeck {
    #[serde(default)]
    description: String,
    identifier: Option<String>,
    #[serde(alias = "cover_card_id")]
    cover_card: Option<EntityRef>,
    #[serde(alias = "deck_list")]
    cards: Option<Vec<EntityRef>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    #[serde(alias = "Easy", alias = "EASY")]
    Easy,
    #[serde(alias = "Hard", alias = "HARD")]
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncounterDefinition {
    pub name: String,
    pub location: String,
    pub difficulty: Difficulty,
    pub deck: EntityRef,
    pub hard_deck: Option<EntityRef>,
    pub health: u32,
    pub chips: u32,
    pub start_dialogue: String,
    pub end_dialogue: String,
    pub sprite: PathBuf,
    pub foil_cards: Vec<EntityRef>,
}

#[derive(Deserialize)]
struct RawEncounter {
    location: Option<String>,
    #[serde(default)]
    difficulty: Difficulty,
    deck: Option<EntityRef>,
    hard_deck: Option<EntityRef>,
    #[serde(default = "default_health", alias = "hp", alias = "health_points")]
    health: u32,
    #[serde(default, alias = "chip_reward")]
    chips: u32,
    #[serde(default)]
    start_dialogue: String,
    #[serde(default)]
    end_dialogue: String,
    #[serde(alias = "image")]
    sprite: Option<PathBuf>,
    #[serde(default, alias = "foil")]
    foil_cards: Vec<EntityRef>,
}

fn default_health() -> u32 {
    21
}

#[derive(Deserialize)]
struct RawPatch {
    path: Option<PathBuf>,
    pattern: Option<String>,
    payload: Option<Payload>,
    #[serde(default)]
    position: Position,
    #[serde(default = "default_true")]
    match_indent: bool,
}

#[derive(Debug, Clone)]
pub struct ModPackage {
    pub dir: PathBuf,
    pub manifest: ModManifest,
    pub cards: Vec<CardDefinition>,
    pub decks: Vec<DeckDefinition>,
    pub encounters: Vec<EncounterDefinition>,
    pub patches: Vec<(String, PatchDirective)>,
}

impl ModPackage {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn res_dir(&self) -> PathBuf {
        self.dir.join("res")
    }

    pub fn src_dir(&self) -> PathBuf {
        self.dir.join("src")
    }
}

/// Load every document the manifest exports, in declaration order.
pub fn load_package(mod_dir: &Path, manifest: ModManifest) -> Result<ModPackage> {
    let mut pkg = ModPackage {
        dir: mod_dir.to_path_buf(),
        manifest,
        cards: Vec::new(),
        decks: Vec::new(),
        encounters: Vec::new(),
        patches: Vec::new(),
    };
    let exports = pkg.manifest.exports.clone();
    let mod_name = pkg.manifest.name.clone();
    for export in exports {
        match export {
            Export::Cards => {
                for (name, raw) in load_entities::<RawCard>(mod_dir, CARDS_FILE, &mod_name, "card")? {
                    pkg.cards.push(card_from_raw(&mod_name, name, raw)?);
                }
            }
            Export::Decks => {
                for (name, raw) in load_entities::<RawDeck>(mod_dir, DECKS_FILE, &mod_name, "deck")? {
                    pkg.decks.push(deck_from_raw(&mod_name, name, raw)?);
                }
            }
            Export::Encounters => {
                for (name, raw) in
                    load_entities::<RawEncounter>(mod_dir, ENCOUNTERS_FILE, &mod_name, "encounter")?
                {
                    pkg.encounters.push(encounter_from_raw(&mod_name, name, raw)?);
                }
            }
            Export::Patches => {
                for (name, raw) in load_entities::<RawPatch>(mod_dir, PATCHES_FILE, &mod_name, "patch")? {
                    let directive = patch_from_raw(&mod_name, &name, raw)?;
                    pkg.patches.push((name, directive));
                }
            }
        }
    }
    Ok(pkg)
}

fn load_entities<T: DeserializeOwned>(
    mod_dir: &Path,
    file: &str,
    mod_name: &str,
    entity: &'static str,
) -> Result<Vec<(String, T)>> {
    let path = mod_dir.join(file);
    let doc = match read_yaml(&path)? {
        // A freshly scaffolded document holds only a comment.
        serde_yaml::Value::Null => return Ok(Vec::new()),
        serde_yaml::Value::Mapping(map) => map,
        _ => {
            return Err(PatchError::InvalidModManifest {
                mod_name: mod_name.to_string(),
                message: format!("{} must map {} names to definitions", file, entity),
            });
        }
    };
    let mut out = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        let Some(name) = key_string(key) else { continue };
        // Null bodies ("Name:") deserialize like empty maps so missing
        // fields are reported by name instead of as a type error.
        let body = match normalize(value) {
            J::Null => J::Object(Map::new()),
            other => other,
        };
        let raw = serde_json::from_value(body).map_err(|e| PatchError::InvalidDefinition {
            mod_name: mod_name.to_string(),
            entity,
            name: name.clone(),
            message: e.to_string(),
        })?;
        out.push((name, raw));
    }
    Ok(out)
}

fn require<T>(
    v: Option<T>,
    mod_name: &str,
    entity: &'static str,
    name: &str,
    field: &'static str,
) -> Result<T> {
    v.ok_or_else(|| PatchError::MissingRequiredField {
        mod_name: mod_name.to_string(),
        entity,
        name: name.to_string(),
        field,
    })
}

fn card_from_raw(mod_name: &str, name: String, raw: RawCard) -> Result<CardDefinition> {
    let mut triggers = Vec::with_capacity(raw.triggers.len());
    for (trigger, source) in raw.triggers {
        let source = match source {
            J::String(file) => TriggerSource::File(PathBuf::from(file)),
            J::Object(mut map) => {
                let filename = match map.remove("filename") {
                    Some(J::String(f)) => PathBuf::from(f),
                    _ => {
                        return Err(PatchError::MissingRequiredField {
                            mod_name: mod_name.to_string(),
                            entity: "card",
                            name,
                            field: "filename",
                        });
                    }
                };
                TriggerSource::WithArgs { filename, args: map }
            }
            other => {
                return Err(PatchError::InvalidDefinition {
                    mod_name: mod_name.to_string(),
                    entity: "card",
                    name,
                    message: format!("trigger `{}` must be a filename or a map, got {}", trigger, other),
                });
            }
        };
        triggers.push(Trigger { name: trigger, source });
    }
    Ok(CardDefinition {
        description: require(raw.description, mod_name, "card", &name, "description")?,
        value: require(raw.value, mod_name, "card", &name, "value")?,
        image: require(raw.image, mod_name, "card", &name, "image")?,
        suit: raw.suit,
        attributes: raw.attributes,
        flexible: raw.flexible,
        keywords: raw.keywords,
        identifier: raw.identifier,
        foil: raw.foil,
        triggers,
        name,
    })
}

fn deck_from_raw(mod_name: &str, name: String, raw: RawDeck) -> Result<DeckDefinition> {
    Ok(DeckDefinition {
        cover_card: require(raw.cover_card, mod_name, "deck", &name, "cover_card")?,
        cards: require(raw.cards, mod_name, "deck", &name, "cards")?,
        description: raw.description,
        identifier: raw.identifier,
        name,
    })
}

fn encounter_from_raw(mod_name: &str, name: String, raw: RawEncounter) -> Result<EncounterDefinition> {
    Ok(EncounterDefinition {
        location: require(raw.location, mod_name, "encounter", &name, "location")?,
        deck: require(raw.deck, mod_name, "encounter", &name, "deck")?,
        sprite: require(raw.sprite, mod_name, "encounter", &name, "sprite")?,
        difficulty: raw.difficulty,
        hard_deck: raw.hard_deck,
        health: raw.health,
        chips: raw.chips,
        start_dialogue: raw.start_dialogue,
        end_dialogue: raw.end_dialogue,
        foil_cards: raw.foil_cards,
        name,
    })
}

fn patch_from_raw(mod_name: &str, name: &str, raw: RawPatch) -> Result<PatchDirective> {
    Ok(PatchDirective {
        path: require(raw.path, mod_name, "patch", name, "path")?,
        pattern: require(raw.pattern, mod_name, "patch", name, "pattern")?
            .trim()
            .to_string(),
        payload: require(raw.payload, mod_name, "patch", name, "payload")?,
        position: raw.position,
        match_indent: raw.match_indent,
    })
}
