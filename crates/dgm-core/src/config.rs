// Run configuration: directories, fixed in-tree paths, ID bases and policies.
// Every struct deserializes with per-field defaults so a YAML config only
// needs the keys it overrides.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result, read_to_string};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchOpts {
    /// Pristine decompiled tree; never written to.
    pub source_dir: PathBuf,
    /// Output tree, wiped and recopied from `source_dir` on every run.
    pub working_dir: PathBuf,
    /// One sub-directory per mod package.
    pub mods_dir: PathBuf,
    /// Engine-bundled art (default foil, branding, font sheet).
    pub assets_dir: PathBuf,
    pub layout: Layout,
    pub bases: IdBases,
    pub unmatched_patch: UnmatchedPolicy,
    pub strict_triggers: bool,
}

impl Default for PatchOpts {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            working_dir: PathBuf::from("modified_src"),
            mods_dir: PathBuf::from("mods"),
            assets_dir: PathBuf::from("assets"),
            layout: Layout::default(),
            bases: IdBases::default(),
            unmatched_patch: UnmatchedPolicy::Warn,
            strict_triggers: false,
        }
    }
}

impl PatchOpts {
    /// Same layout and policies, rooted at `data_dir` (`src/`, `modified_src/`, `mods/`, `assets/`).
    pub fn rooted_at(data_dir: &Path) -> Self {
        Self {
            source_dir: data_dir.join("src"),
            working_dir: data_dir.join("modified_src"),
            mods_dir: data_dir.join("mods"),
            assets_dir: data_dir.join("assets"),
            ..Self::default()
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|source| PatchError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// What to do when a line patch finds no matching line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    Warn,
    Abort,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct IdBases {
    pub first_card: u32,
    pub first_deck: u32,
    pub first_encounter: u32,
}

impl Default for IdBases {
    fn default() -> Self {
        Self {
            first_card: 313,
            first_deck: 18,
            first_encounter: 100,
        }
    }
}

/// Paths relative to the source/working tree root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Layout {
    pub card_table: PathBuf,
    pub deck_table: PathBuf,
    pub encounter_table: PathBuf,
    pub room_table: PathBuf,
    pub effect_dir: PathBuf,
    pub card_atlas: AtlasLayout,
    pub foil_atlas: AtlasLayout,
    pub portrait_atlas: AtlasLayout,
    pub choice_ui: PathBuf,
    pub fonts_script: PathBuf,
    pub font_sheet: PathBuf,
    pub id_card: PathBuf,
    pub splash_screen: PathBuf,
    pub standalone_flag_files: Vec<PathBuf>,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            card_table: "singletons/CardList.gd".into(),
            deck_table: "singletons/DeckList.gd".into(),
            encounter_table: "singletons/EncounterList.gd".into(),
            room_table: "singletons/RoomList.gd".into(),
            effect_dir: "card_effect_resources".into(),
            card_atlas: AtlasLayout {
                bitmap: "assets/art/card_sprite_sheet.png".into(),
                descriptor: "assets/art/card_art_sprite_frames.tres".into(),
                cell_width: 57,
                cell_height: 89,
            },
            foil_atlas: AtlasLayout {
                bitmap: "assets/art/card_visual_effects/foil_card_assets/card_foil_mapping.png".into(),
                descriptor: "assets/art/card_visual_effects/foil_card_assets/FoilMapping.tres".into(),
                cell_width: 57,
                cell_height: 89,
            },
            portrait_atlas: AtlasLayout {
                bitmap: "assets/art/opponent_sprite_sheet.png".into(),
                descriptor: "assets/art/opponent_sprite_frames.tres".into(),
                cell_width: 64,
                cell_height: 64,
            },
            choice_ui: "ChoiceUI.gd".into(),
            fonts_script: "singletons/Fonts.gd".into(),
            font_sheet: "assets/fonts/font_sheet_3_5.png".into(),
            id_card: "assets/art/id_card.png".into(),
            splash_screen: "assets/logo/splash_screen.png".into(),
            standalone_flag_files: vec![
                "singletons/SystemParameters.gd".into(),
                "TitleScreen.gd".into(),
                "events/EventPlayerLost.gd".into(),
                "singletons/MetaProgression.gd".into(),
                "MacroController.gd".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasLayout {
    pub bitmap: PathBuf,
    pub descriptor: PathBuf,
    pub cell_width: u32,
    pub cell_height: u32,
}

// Engine-bundled asset file names, relative to `PatchOpts::assets_dir`.
pub const DEFAULT_FOIL: &str = "default_foil.png";
pub const FONT_SHEET: &str = "new_font_sheet_3_5.png";
pub const ID_CARD: &str = "roaxial_id_card.png";
pub const SPLASH_SCREEN: &str = "dndgmod_splash_screen.png";
