// The patch run.
//
//   Reset -> built-in hooks -> for each mod (sorted):
//       validate -> allocate -> render -> patch -> stage art
//   -> finalize atlases -> cosmetic patches
//
// Any error aborts the run. The working tree may then be half patched; the next
// run starts from a fresh copy anyway.
use minijinja::context;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::atlas::{AtlasReport, SpriteAtlas};
use crate::config::{self, PatchOpts, UnmatchedPolicy};
use crate::error::{PatchError, Result, write};
use crate::ids::{IdSpace, IdentifierTable};
use crate::manifest::{EntityRef, ModPackage, load_manifest, load_package};
use crate::patch::{PatchDirective, PatchOutcome, Payload, Position, replace_in_file, resolve_in_tree};
use crate::render::{FragmentTables, Renderer, tres_path};
use crate::rooms::{encounter_key, is_registrable, register_encounter};
use crate::table::inject_entry;

const COLLECTION_ENTRY_BASE: u32 = 42000;

#[derive(Debug, Clone, Serialize)]
pub struct Allocated {
    pub name: String,
    pub id: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchRecord {
    pub name: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: PatchOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModReport {
    pub name: String,
    pub dir: PathBuf,
    pub cards: Vec<Allocated>,
    pub decks: Vec<Allocated>,
    pub encounters: Vec<Allocated>,
    /// Generated effect scripts/resources, relative to the working tree.
    pub effects: Vec<PathBuf>,
    pub patches: Vec<PatchRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatchReport {
    pub builtin_patches: Vec<PatchRecord>,
    pub mods: Vec<ModReport>,
    pub skipped: Vec<String>,
    pub atlases: Vec<AtlasReport>,
    pub ids: IdSpace,
}

/// State threaded through the mods of one run.
struct RunState {
    ids: IdSpace,
    card_ids: IdentifierTable,
    deck_ids: IdentifierTable,
    cards: SpriteAtlas,
    foils: SpriteAtlas,
    portraits: SpriteAtlas,
}

/// Everything one mod contributes, rendered but not yet written.
#[derive(Default)]
struct Rendered {
    card_entries: Vec<String>,
    effect_files: Vec<(PathBuf, String)>,
    deck_entries: Vec<String>,
    encounter_entries: Vec<String>,
}

pub struct Pipeline {
    opts: PatchOpts,
    renderer: Renderer,
}

impl Pipeline {
    pub fn new(opts: PatchOpts) -> Self {
        Self {
            opts,
            renderer: Renderer::new(),
        }
    }

    pub fn run(&self) -> Result<PatchReport> {
        let opts = &self.opts;
        let work = &opts.working_dir;
        info!(source = %opts.source_dir.display(), working = %work.display(), "resetting working tree");
        reset_working_tree(&opts.source_dir, work)?;

        info!("applying built-in hooks");
        let builtin_patches = vec![self.apply_directive("deck_selection", &deck_selection_hook(opts))?];

        let mut state = RunState {
            ids: IdSpace::new(&opts.bases),
            card_ids: IdentifierTable::default(),
            deck_ids: IdentifierTable::default(),
            cards: SpriteAtlas::new(work, &opts.layout.card_atlas),
            foils: SpriteAtlas::new(work, &opts.layout.foil_atlas),
            portraits: SpriteAtlas::new(work, &opts.layout.portrait_atlas),
        };
        let mut mods = Vec::new();
        let mut skipped = Vec::new();
        for dir in crate::list_mods(&opts.mods_dir)? {
            let manifest = load_manifest(&dir)?;
            if !manifest.enabled {
                info!(mod_name = %manifest.name, "mod disabled, skipping");
                skipped.push(manifest.name);
                continue;
            }
            info!(mod_name = %manifest.name, exports = ?manifest.exports, "patching mod");
            let pkg = load_package(&dir, manifest)?;
            mods.push(self.apply_mod(&pkg, &mut state)?);
        }

        let mut atlases = Vec::new();
        for (label, atlas) in [
            ("card art", &mut state.cards),
            ("foil map", &mut state.foils),
            ("opponent portraits", &mut state.portraits),
        ] {
            if atlas.staged_len() == 0 {
                continue;
            }
            info!(atlas = label, sprites = atlas.staged_len(), "packing sprite atlas");
            if let Some(report) = atlas.finalize(&self.renderer)? {
                atlases.push(report);
            }
        }

        info!("applying cosmetic patches");
        self.apply_cosmetic_patches()?;

        Ok(PatchReport {
            builtin_patches,
            mods,
            skipped,
            atlases,
            ids: state.ids,
        })
    }

    fn apply_mod(&self, pkg: &ModPackage, state: &mut RunState) -> Result<ModReport> {
        let mod_name = pkg.name();

        // Allocate: cards first so decks and encounters can reference them.
        let (card_ids, next) = state.ids.cards.allocate(pkg.cards.len());
        state.ids.cards = next;
        state.card_ids.register_all(
            mod_name,
            card_ids.iter().copied().zip(pkg.cards.iter().map(|c| c.identifier.as_deref())),
        )?;
        let (deck_ids, next) = state.ids.decks.allocate(pkg.decks.len());
        state.ids.decks = next;
        state.deck_ids.register_all(
            mod_name,
            deck_ids.iter().copied().zip(pkg.decks.iter().map(|d| d.identifier.as_deref())),
        )?;
        let (encounter_ids, next) = state.ids.encounters.allocate(pkg.encounters.len());
        state.ids.encounters = next;

        let rendered = self.render_mod(pkg, state, &card_ids, &deck_ids, &encounter_ids)?;

        // Patch
        let work = &self.opts.working_dir;
        let layout = &self.opts.layout;
        let mut effects = Vec::with_capacity(rendered.effect_files.len());
        if !rendered.effect_files.is_empty() {
            let dir = work.join(&layout.effect_dir);
            fs::create_dir_all(&dir).map_err(PatchError::io(&dir))?;
        }
        for (rel, contents) in &rendered.effect_files {
            write(&work.join(rel), contents)?;
            effects.push(rel.clone());
        }
        for entry in &rendered.card_entries {
            inject_entry(&work.join(&layout.card_table), entry)?;
        }
        for entry in &rendered.deck_entries {
            inject_entry(&work.join(&layout.deck_table), entry)?;
        }
        for (enc, entry) in pkg.encounters.iter().zip(&rendered.encounter_entries) {
            inject_entry(&work.join(&layout.encounter_table), entry)?;
            register_encounter(&work.join(&layout.room_table), &enc.location, &enc.name, enc.difficulty)?;
        }
        let mut patches = Vec::with_capacity(pkg.patches.len());
        for (name, directive) in &pkg.patches {
            patches.push(self.apply_directive(name, directive)?);
        }

        // Stage art
        let res = pkg.res_dir();
        let default_foil = self.opts.assets_dir.join(config::DEFAULT_FOIL);
        for (card, &id) in pkg.cards.iter().zip(&card_ids) {
            state.cards.add_art(id, resolve_in_tree(&res, &card.image)?);
            match &card.foil {
                Some(foil) => state.foils.add_art(id, resolve_in_tree(&res, foil)?),
                None => {
                    debug!(card = %card.name, "no foil art, using the default foil map");
                    state.foils.add_art(id, default_foil.clone());
                }
            }
        }
        for (enc, &id) in pkg.encounters.iter().zip(&encounter_ids) {
            state.portraits.add_art(id, resolve_in_tree(&res, &enc.sprite)?);
        }

        Ok(ModReport {
            name: mod_name.to_string(),
            dir: pkg.dir.clone(),
            cards: allocated(pkg.cards.iter().map(|c| &c.name), &card_ids),
            decks: allocated(pkg.decks.iter().map(|d| &d.name), &deck_ids),
            encounters: allocated(pkg.encounters.iter().map(|e| &e.name), &encounter_ids),
            effects,
            patches,
        })
    }

    fn render_mod(
        &self,
        pkg: &ModPackage,
        state: &RunState,
        card_ids: &[u32],
        deck_ids: &[u32],
        encounter_ids: &[u32],
    ) -> Result<Rendered> {
        let mod_name = pkg.name();
        let layout = &self.opts.layout;
        let resolve = |table: &IdentifierTable, r: &EntityRef, entity: &'static str, name: &str| {
            table.resolve(r).ok_or_else(|| PatchError::UnresolvedIdentifier {
                mod_name: mod_name.to_string(),
                entity,
                name: name.to_string(),
                identifier: r.to_string(),
            })
        };

        // Validate every reference before anything is rendered.
        let mut decks = Vec::with_capacity(pkg.decks.len());
        for deck in &pkg.decks {
            let cover = resolve(&state.card_ids, &deck.cover_card, "deck", &deck.name)?;
            let cards = deck
                .cards
                .iter()
                .map(|c| resolve(&state.card_ids, c, "deck", &deck.name))
                .collect::<Result<Vec<_>>>()?;
            decks.push((cover, cards));
        }
        let mut encounters = Vec::with_capacity(pkg.encounters.len());
        for enc in &pkg.encounters {
            if !is_registrable(&enc.location, &enc.name) {
                return Err(PatchError::InvalidDefinition {
                    mod_name: mod_name.to_string(),
                    entity: "encounter",
                    name: enc.name.clone(),
                    message: "name and location need at least one ASCII letter or digit".to_string(),
                });
            }
            let deck = resolve(&state.deck_ids, &enc.deck, "encounter", &enc.name)?;
            let hard_deck = enc
                .hard_deck
                .as_ref()
                .map(|d| resolve(&state.deck_ids, d, "encounter", &enc.name))
                .transpose()?;
            let foils = enc
                .foil_cards
                .iter()
                .map(|c| resolve(&state.card_ids, c, "encounter", &enc.name))
                .collect::<Result<Vec<_>>>()?;
            encounters.push((deck, hard_deck, foils));
        }

        let mut out = Rendered::default();
        let tables = FragmentTables {
            cards: &state.card_ids,
            decks: &state.deck_ids,
        };
        for (card, &id) in pkg.cards.iter().zip(card_ids) {
            debug!(card = %card.name, id, "rendering card");
            let effect = self.renderer.card_effect(
                pkg,
                card,
                id,
                &tables,
                &layout.effect_dir,
                self.opts.strict_triggers,
            )?;
            let effect_res = match effect {
                Some(effect) => {
                    let script = layout.effect_dir.join(format!("CardEffect{}.gd", id));
                    let resource = layout.effect_dir.join(format!("card_effect_{}.tres", id));
                    let res_path = format!("res://{}", tres_path(&resource));
                    out.effect_files.push((script, effect.script));
                    out.effect_files.push((resource, effect.resource));
                    Some(res_path)
                }
                None => None,
            };
            out.card_entries.push(self.renderer.render_builtin(
                "card_entry.gd.j2",
                context! {
                    id => id,
                    name => &card.name,
                    value => card.value,
                    suit => &card.suit,
                    description => &card.description,
                    attributes => &card.attributes,
                    flexible => card.flexible,
                    keywords => &card.keywords,
                    effect => effect_res,
                    collection_entry => COLLECTION_ENTRY_BASE + id,
                },
            )?);
        }
        for ((deck, &id), (cover, cards)) in pkg.decks.iter().zip(deck_ids).zip(decks) {
            debug!(deck = %deck.name, id, "rendering deck");
            out.deck_entries.push(self.renderer.render_builtin(
                "deck_entry.gd.j2",
                context! {
                    id => id,
                    name => &deck.name,
                    description => &deck.description,
                    cover_card => cover,
                    cards => cards,
                },
            )?);
        }
        for ((enc, &id), (deck, hard_deck, foils)) in pkg.encounters.iter().zip(encounter_ids).zip(encounters) {
            debug!(encounter = %enc.name, id, "rendering encounter");
            out.encounter_entries.push(self.renderer.render_builtin(
                "encounter_entry.gd.j2",
                context! {
                    key => encounter_key(&enc.location, &enc.name),
                    id => id,
                    name => &enc.name,
                    location => &enc.location,
                    difficulty => enc.difficulty.as_str(),
                    deck => deck,
                    hard_deck => hard_deck,
                    health => enc.health,
                    chips => enc.chips,
                    start_dialogue => &enc.start_dialogue,
                    end_dialogue => &enc.end_dialogue,
                    foil_cards => foils,
                },
            )?);
        }
        Ok(out)
    }

    fn apply_directive(&self, name: &str, directive: &PatchDirective) -> Result<PatchRecord> {
        let outcome = directive.apply_in(&self.opts.working_dir)?;
        match outcome {
            PatchOutcome::Applied { line } => {
                info!(patch = name, path = %directive.path.display(), line, "patch applied");
            }
            PatchOutcome::NotFound => match self.opts.unmatched_patch {
                UnmatchedPolicy::Warn => {
                    warn!(patch = name, path = %directive.path.display(), pattern = %directive.pattern, "patch pattern not found, nothing changed");
                }
                UnmatchedPolicy::Abort => {
                    return Err(PatchError::PatchNotApplied {
                        path: directive.path.clone(),
                        pattern: directive.pattern.clone(),
                    });
                }
            },
        }
        Ok(PatchRecord {
            name: name.to_string(),
            path: directive.path.clone(),
            outcome,
        })
    }

    fn apply_cosmetic_patches(&self) -> Result<()> {
        let work = &self.opts.working_dir;
        let assets = &self.opts.assets_dir;
        let layout = &self.opts.layout;

        copy_asset(&assets.join(config::FONT_SHEET), &work.join(&layout.font_sheet))?;
        replace_in_file(
            &work.join(&layout.fonts_script),
            "var three_five_chars = \"012/\"",
            "var three_five_chars = \"0123456789/\"",
        )?;

        copy_asset(&assets.join(config::ID_CARD), &work.join(&layout.id_card))?;
        copy_asset(&assets.join(config::SPLASH_SCREEN), &work.join(&layout.splash_screen))?;

        let mut seen = Vec::with_capacity(layout.standalone_flag_files.len());
        for rel in &layout.standalone_flag_files {
            if seen.contains(&rel) {
                continue;
            }
            seen.push(rel);
            let n = replace_in_file(&work.join(rel), "OS.has_feature(\"standalone\")", "false")?;
            debug!(path = %rel.display(), replaced = n, "disabled standalone feature check");
        }
        Ok(())
    }
}

/// Lets the starting-deck choice resolve any deck in `DeckList.starting_deck_dictionary` by name.
fn deck_selection_hook(opts: &PatchOpts) -> PatchDirective {
    PatchDirective {
        path: opts.layout.choice_ui.clone(),
        pattern: "macro_controller.player_starting_deck = starting_deck_string".to_string(),
        payload: Payload::Lines(vec![
            "for deck in DeckList.starting_deck_dictionary:".to_string(),
            "\tif card_choice.card_name == DeckList.starting_deck_dictionary[deck].name:".to_string(),
            "\t\tstarting_deck_string = deck".to_string(),
        ]),
        position: Position::Before,
        match_indent: true,
    }
}

fn allocated<'a>(names: impl Iterator<Item = &'a String>, ids: &[u32]) -> Vec<Allocated> {
    names
        .zip(ids)
        .map(|(name, &id)| Allocated { name: name.clone(), id })
        .collect()
}

fn copy_asset(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(PatchError::io(parent))?;
    }
    fs::copy(from, to).map_err(PatchError::io(from))?;
    Ok(())
}

/// Delete `working` and recopy `source` into it verbatim.
pub fn reset_working_tree(source: &Path, working: &Path) -> Result<()> {
    let src = source.canonicalize().map_err(PatchError::io(source))?;
    let work = if working.exists() {
        working.canonicalize().map_err(PatchError::io(working))?
    } else {
        std::path::absolute(working).map_err(PatchError::io(working))?
    };
    if work.starts_with(&src) || src.starts_with(&work) {
        return Err(PatchError::InvalidWorkingDir {
            working: working.to_path_buf(),
            source_dir: source.to_path_buf(),
        });
    }
    if working.exists() {
        fs::remove_dir_all(working).map_err(PatchError::io(working))?;
    }
    for entry in WalkDir::new(&src).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.clone());
            PatchError::Io {
                path,
                source: e.into(),
            }
        })?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(&src) else { continue };
        let dest = working.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(PatchError::io(&dest))?;
        } else {
            fs::copy(path, &dest).map_err(PatchError::io(path))?;
        }
    }
    Ok(())
}
