use dgm_core::pipeline::PatchReport;
use dgm_core::{PatchError, PatchOpts, PatchOutcome, Pipeline, UnmatchedPolicy};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

const CHOICE_UI: &str = "extends Node\n\nfunc _on_choice(card_choice):\n\tif true:\n\t\tvar starting_deck_string = \"default\"\n\t\tmacro_controller.player_starting_deck = starting_deck_string\n";
const ROOMS: &str = "var ForestRooms = {\n\tENCOUNTER_WOLF = \"forest_wolf\"\n}\n\nvar forest_easy_random_encounters = [\n\tForestRooms.ENCOUNTER_WOLF\n]\n";
const STANDALONE: &str = "func _ready():\n\tif OS.has_feature(\"standalone\"):\n\t\tpass\n";

fn save_png(path: &Path, w: u32, h: u32, color: Rgba<u8>) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(w, h, color).save(path).unwrap();
}

fn put(path: &Path, text: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn sprite_frames(texture: &str, w: u32, h: u32) -> String {
    format!(
        "[gd_resource type=\"SpriteFrames\" load_steps=3 format=2]\n\n\
         [ext_resource path=\"res://{}\" type=\"Texture\" id=1]\n\n\
         [sub_resource type=\"AtlasTexture\" id=1]\n\
         atlas = ExtResource( 1 )\n\
         region = Rect2( 0, 0, {}, {} )\n\n\
         [resource]\n\
         animations = [ {{\n\"frames\": [ SubResource( 1 ) ],\n\"loop\": true,\n\"name\": \"default\",\n\"speed\": 5.0\n}} ]\n",
        texture, w, h
    )
}

/// A data directory with a minimal pristine tree, engine assets and an empty mods dir.
struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let src = root.join("src");

        put(&src.join("ChoiceUI.gd"), CHOICE_UI);
        put(&src.join("singletons/CardList.gd"), "extends Node\n\nvar card_list = {\n}\n");
        put(&src.join("singletons/DeckList.gd"), "extends Node\n\nvar starting_deck_dictionary = {\n}\n");
        put(&src.join("singletons/EncounterList.gd"), "extends Node\n\nvar encounter_list = {\n}\n");
        put(&src.join("singletons/RoomList.gd"), ROOMS);
        put(&src.join("singletons/Fonts.gd"), "var three_five_chars = \"012/\"\n");
        for rel in [
            "singletons/SystemParameters.gd",
            "TitleScreen.gd",
            "events/EventPlayerLost.gd",
            "singletons/MetaProgression.gd",
            "MacroController.gd",
        ] {
            put(&src.join(rel), STANDALONE);
        }

        let art = src.join("assets/art");
        save_png(&art.join("card_sprite_sheet.png"), 57 * 13, 89, BLUE);
        put(
            &art.join("card_art_sprite_frames.tres"),
            &sprite_frames("assets/art/card_sprite_sheet.png", 57, 89),
        );
        let foil = art.join("card_visual_effects/foil_card_assets");
        save_png(&foil.join("card_foil_mapping.png"), 57 * 13, 89, BLUE);
        put(
            &foil.join("FoilMapping.tres"),
            &sprite_frames("assets/art/card_visual_effects/foil_card_assets/card_foil_mapping.png", 57, 89),
        );
        save_png(&art.join("opponent_sprite_sheet.png"), 64 * 13, 64, BLUE);
        put(
            &art.join("opponent_sprite_frames.tres"),
            &sprite_frames("assets/art/opponent_sprite_sheet.png", 64, 64),
        );
        save_png(&src.join("assets/fonts/font_sheet_3_5.png"), 8, 8, BLUE);
        save_png(&art.join("id_card.png"), 8, 8, BLUE);
        save_png(&src.join("assets/logo/splash_screen.png"), 8, 8, BLUE);

        let assets = root.join("assets");
        save_png(&assets.join("default_foil.png"), 57, 89, GREEN);
        save_png(&assets.join("new_font_sheet_3_5.png"), 8, 8, GREEN);
        save_png(&assets.join("roaxial_id_card.png"), 8, 8, GREEN);
        save_png(&assets.join("dndgmod_splash_screen.png"), 8, 8, GREEN);

        fs::create_dir_all(root.join("mods")).unwrap();
        Fixture { _dir: dir, root }
    }

    fn opts(&self) -> PatchOpts {
        PatchOpts::rooted_at(&self.root)
    }

    fn run(&self) -> dgm_core::Result<PatchReport> {
        Pipeline::new(self.opts()).run()
    }

    fn add_mod(&self, slug: &str, manifest: &str) -> PathBuf {
        let dir = self.root.join("mods").join(slug);
        put(&dir.join("mod.yaml"), manifest);
        dir
    }

    fn src(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join("src").join(rel)).unwrap()
    }

    fn work(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join("modified_src").join(rel)).unwrap()
    }

    fn work_path(&self, rel: &str) -> PathBuf {
        self.root.join("modified_src").join(rel)
    }
}

fn two_card_mod(fx: &Fixture, slug: &str, names: [&str; 2]) -> PathBuf {
    let dir = fx.add_mod(slug, &format!("Name: {}\nExports: [Cards]\n", slug));
    put(
        &dir.join("cards.yaml"),
        &format!(
            "{}:\n  Description: First card\n  Value: 3\n  Image: art/a.png\n\
             {}:\n  Description: Second card\n  Value: 7\n  Suit: hearts\n  Image: art/b.png\n",
            names[0], names[1]
        ),
    );
    save_png(&dir.join("res/art/a.png"), 57, 89, RED);
    save_png(&dir.join("res/art/b.png"), 57, 89, RED);
    dir
}

#[test]
fn plain_cards_get_consecutive_ids_and_no_effects() {
    let fx = Fixture::new();
    two_card_mod(&fx, "alpha", ["Pebble", "Stone"]);

    let report = fx.run().unwrap();
    assert_eq!(report.mods.len(), 1);
    let ids: Vec<u32> = report.mods[0].cards.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![313, 314]);
    assert!(report.mods[0].effects.is_empty());
    assert!(!fx.work_path("card_effect_resources").exists());

    let cards = fx.work("singletons/CardList.gd");
    assert!(cards.contains("\t313: {\n\t\t\"name\": \"Pebble\",\n\t\t\"value\": 3,"));
    assert!(cards.contains("\t\t\"suit\": \"hearts\","));
    // Second injection extends the table the first one closed.
    assert!(cards.contains("\t},\n\t314: {"));
    assert!(cards.ends_with("\t}\n}\n"));
    assert!(!cards.contains("\"effect\""));
    assert_eq!(cards.matches('{').count(), cards.matches('}').count());
}

#[test]
fn play_and_discarded_triggers_generate_an_effect() {
    let fx = Fixture::new();
    let dir = fx.add_mod("burner", "name: Burner\nexports: [cards]\n");
    put(
        &dir.join("cards.yaml"),
        "Ember:\n  description: Burns on discard\n  value: 2\n  image: ember.png\n  triggers:\n    play: play.gd\n    discarded:\n      filename: discard.gd\n      amount: 3\n",
    );
    put(&dir.join("src/play.gd"), "print(\"played\")\n");
    put(&dir.join("src/discard.gd"), "print({{ args.amount }})\nprint({{ card_id }})\n");
    save_png(&dir.join("res/ember.png"), 57, 89, RED);

    let report = fx.run().unwrap();
    assert_eq!(
        report.mods[0].effects,
        vec![
            PathBuf::from("card_effect_resources/CardEffect313.gd"),
            PathBuf::from("card_effect_resources/card_effect_313.tres"),
        ]
    );
    let script = fx.work("card_effect_resources/CardEffect313.gd");
    assert!(script.starts_with("extends CardEffect\n"));
    assert!(script.contains(
        "func play(card):\n\tprint(\"played\")\n\tcard.connect(\"discarded\", self, \"discarded\", [card])\n"
    ));
    assert!(script.contains("func discarded(card):\n\tprint(3)\n\tprint(313)\n"));
    let resource = fx.work("card_effect_resources/card_effect_313.tres");
    assert!(resource.contains("res://card_effect_resources/CardEffect313.gd"));
    let cards = fx.work("singletons/CardList.gd");
    assert!(cards.contains("\"effect\": preload(\"res://card_effect_resources/card_effect_313.tres\"),"));
}

#[test]
fn unmatched_patch_leaves_file_untouched() {
    let fx = Fixture::new();
    let dir = fx.add_mod("patcher", "name: Patcher\nexports: [patches]\n");
    put(
        &dir.join("patches.yaml"),
        "Missing hook:\n  path: TitleScreen.gd\n  pattern: \"func does_not_exist():\"\n  payload: pass\n\
         Ready hook:\n  path: MacroController.gd\n  pattern: \"func _ready():\"\n  payload: 'print(\"modded\")'\n",
    );

    let report = fx.run().unwrap();
    let patches = &report.mods[0].patches;
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].outcome, PatchOutcome::NotFound);
    assert_eq!(patches[1].outcome, PatchOutcome::Applied { line: 1 });
    // Only the cosmetic flag rewrite touched TitleScreen.gd.
    assert_eq!(
        fx.work("TitleScreen.gd"),
        fx.src("TitleScreen.gd").replace("OS.has_feature(\"standalone\")", "false")
    );
    assert!(fx.work("MacroController.gd").starts_with("func _ready():\nprint(\"modded\")\n"));
}

#[test]
fn unmatched_patch_aborts_under_abort_policy() {
    let fx = Fixture::new();
    let dir = fx.add_mod("patcher", "name: Patcher\nexports: [patches]\n");
    put(
        &dir.join("patches.yaml"),
        "Missing hook:\n  path: TitleScreen.gd\n  pattern: \"func does_not_exist():\"\n  payload: pass\n",
    );
    let mut opts = fx.opts();
    opts.unmatched_patch = UnmatchedPolicy::Abort;
    let err = Pipeline::new(opts).run().unwrap_err();
    assert!(matches!(err, PatchError::PatchNotApplied { .. }), "{err}");
}

#[test]
fn patch_paths_cannot_escape_the_tree() {
    let fx = Fixture::new();
    let dir = fx.add_mod("patcher", "name: Patcher\nexports: [patches]\n");
    put(
        &dir.join("patches.yaml"),
        "Escape:\n  path: ../src/TitleScreen.gd\n  pattern: \"func _ready():\"\n  payload: pass\n",
    );
    let err = fx.run().unwrap_err();
    assert!(matches!(err, PatchError::InvalidPatchPath { .. }), "{err}");
    assert_eq!(fx.src("TitleScreen.gd"), STANDALONE);
}

#[test]
fn mods_allocate_in_directory_order() {
    let fx = Fixture::new();
    two_card_mod(&fx, "b_second", ["Gamma", "Delta"]);
    two_card_mod(&fx, "a_first", ["Alpha", "Beta"]);

    let report = fx.run().unwrap();
    let names: Vec<&str> = report.mods.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["a_first", "b_second"]);
    let ids: Vec<(String, u32)> = report
        .mods
        .iter()
        .flat_map(|m| m.cards.iter().map(|c| (c.name.clone(), c.id)))
        .collect();
    assert_eq!(
        ids,
        vec![
            ("Alpha".to_string(), 313),
            ("Beta".to_string(), 314),
            ("Gamma".to_string(), 315),
            ("Delta".to_string(), 316),
        ]
    );
    assert_eq!(report.ids.cards.next_id(), 317);
}

#[test]
fn disabled_mods_are_skipped() {
    let fx = Fixture::new();
    fx.add_mod("off", "name: Off\nenabled: false\nexports: [spells]\n");
    two_card_mod(&fx, "on", ["One", "Two"]);

    let report = fx.run().unwrap();
    assert_eq!(report.skipped, vec!["Off".to_string()]);
    assert_eq!(report.mods.len(), 1);
    assert_eq!(report.mods[0].cards[0].id, 313);
}

#[test]
fn invalid_export_is_rejected() {
    let fx = Fixture::new();
    fx.add_mod("bad", "name: Bad\nexports: [cards, spells]\n");
    let err = fx.run().unwrap_err();
    assert!(matches!(err, PatchError::InvalidModManifest { .. }), "{err}");
}

#[test]
fn missing_required_field_names_the_field() {
    let fx = Fixture::new();
    let dir = fx.add_mod("bad", "name: Bad\nexports: [cards]\n");
    put(&dir.join("cards.yaml"), "Blank:\n  description: no value\n  image: x.png\n");
    match fx.run().unwrap_err() {
        PatchError::MissingRequiredField { field, name, .. } => {
            assert_eq!(field, "value");
            assert_eq!(name, "Blank");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn runs_are_deterministic() {
    let fx = Fixture::new();
    two_card_mod(&fx, "alpha", ["Pebble", "Stone"]);
    two_card_mod(&fx, "beta", ["Rock", "Boulder"]);

    let snapshot = |root: &Path| {
        walkdir::WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().strip_prefix(root).unwrap().to_path_buf(),
                    fs::read(e.path()).unwrap(),
                )
            })
            .collect::<Vec<_>>()
    };
    fx.run().unwrap();
    let first = snapshot(&fx.work_path(""));
    fx.run().unwrap();
    let second = snapshot(&fx.work_path(""));
    assert_eq!(first, second);
}

#[test]
fn atlas_growth_is_append_only() {
    let fx = Fixture::new();
    two_card_mod(&fx, "alpha", ["Pebble", "Stone"]);

    let report = fx.run().unwrap();
    let sheet = image::open(fx.work_path("assets/art/card_sprite_sheet.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(sheet.dimensions(), (57 * 13, 89 * 2));
    assert_eq!(*sheet.get_pixel(0, 0), BLUE);
    assert_eq!(*sheet.get_pixel(57 * 12, 88), BLUE);
    assert_eq!(*sheet.get_pixel(0, 89), RED);
    assert_eq!(*sheet.get_pixel(57, 89), RED);
    assert_eq!(sheet.get_pixel(57 * 2, 89)[3], 0);

    // Cards without foil art use the default foil map.
    let foil = image::open(fx.work_path(
        "assets/art/card_visual_effects/foil_card_assets/card_foil_mapping.png",
    ))
    .unwrap()
    .to_rgba8();
    assert_eq!(*foil.get_pixel(0, 89), GREEN);

    let card_atlas = report
        .atlases
        .iter()
        .find(|a| a.bitmap.ends_with("card_sprite_sheet.png"))
        .unwrap();
    assert_eq!(card_atlas.old_size, (57 * 13, 89));
    let origins: Vec<(u32, u32, u32)> = card_atlas.placements.iter().map(|p| (p.id, p.x, p.y)).collect();
    assert_eq!(origins, vec![(313, 0, 89), (314, 57, 89)]);

    let tres = fx.work("assets/art/card_art_sprite_frames.tres");
    assert!(tres.starts_with("[gd_resource type=\"SpriteFrames\" load_steps=5 format=2]"));
    assert!(tres.contains("[sub_resource type=\"AtlasTexture\" id=2]\natlas = ExtResource( 1 )\nregion = Rect2( 0, 89, 57, 89 )"));
    assert!(tres.contains("[sub_resource type=\"AtlasTexture\" id=3]\natlas = ExtResource( 1 )\nregion = Rect2( 57, 89, 57, 89 )"));
    assert!(tres.contains("\"frames\": [ SubResource( 1 ), SubResource( 2 ), SubResource( 3 ) ],"));
    let marker = tres.find("[resource]").unwrap();
    assert!(tres.rfind("[sub_resource").unwrap() < marker);
}

#[test]
fn decks_and_encounters_resolve_identifiers() {
    let fx = Fixture::new();
    let dir = fx.add_mod("campaign", "name: Campaign\nexports: [cards, decks, encounters]\n");
    put(
        &dir.join("cards.yaml"),
        "Fireball:\n  identifier: fireball\n  description: Hot\n  value: 5\n  image: fireball.png\n",
    );
    put(
        &dir.join("decks.yaml"),
        "Pyro Deck:\n  identifier: pyro\n  description: All fire\n  cover card: fireball\n  cards: [fireball, fireball, 1]\n",
    );
    put(
        &dir.join("encounters.yaml"),
        "Old Troll:\n  location: forest\n  deck: pyro\n  health: 30\n  chips: 4\n  sprite: troll.png\n  foil cards: [fireball]\n",
    );
    save_png(&dir.join("res/fireball.png"), 57, 89, RED);
    save_png(&dir.join("res/troll.png"), 80, 80, RED);

    let report = fx.run().unwrap();
    let m = &report.mods[0];
    assert_eq!(m.decks[0].id, 18);
    assert_eq!(m.encounters[0].id, 100);

    let decks = fx.work("singletons/DeckList.gd");
    assert!(decks.contains("\t18: {\n\t\t\"name\": \"Pyro Deck\","));
    assert!(decks.contains("\"cover_card_id\": 313,"));
    assert!(decks.contains("\"deck_list\": [313, 313, 1]"));

    let encounters = fx.work("singletons/EncounterList.gd");
    assert!(encounters.contains("\t\"forest_old_troll\": {\n\t\t\"id\": 100,"));
    assert!(encounters.contains("\"deck\": 18,"));
    assert!(encounters.contains("\"hard_deck\": null,"));
    assert!(encounters.contains("\"health\": 30,"));
    assert!(encounters.contains("\"foil_cards\": [313]"));

    let rooms = fx.work("singletons/RoomList.gd");
    assert!(rooms.contains("ENCOUNTER_WOLF = \"forest_wolf\",\n\tENCOUNTER_OLD_TROLL = \"forest_old_troll\""));
    assert!(rooms.contains("ForestRooms.ENCOUNTER_WOLF,\n\tForestRooms.ENCOUNTER_OLD_TROLL"));

    // Oversized portraits are cropped to one cell.
    let portraits = image::open(fx.work_path("assets/art/opponent_sprite_sheet.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(portraits.dimensions(), (64 * 13, 128));
    assert_eq!(*portraits.get_pixel(63, 127), RED);
    assert_eq!(portraits.get_pixel(64, 64)[3], 0);
}

#[test]
fn identifiers_are_visible_to_later_mods() {
    let fx = Fixture::new();
    let a = fx.add_mod("a_cards", "name: Cards\nexports: [cards]\n");
    put(&a.join("cards.yaml"), "Spark:\n  identifier: spark\n  description: Zap\n  value: 1\n  image: s.png\n");
    save_png(&a.join("res/s.png"), 57, 89, RED);
    let b = fx.add_mod("b_decks", "name: Decks\nexports: [decks]\n");
    put(&b.join("decks.yaml"), "Sparky:\n  cover_card: spark\n  cards: [spark]\n");

    fx.run().unwrap();
    assert!(fx.work("singletons/DeckList.gd").contains("\"deck_list\": [313]"));
}

#[test]
fn unknown_identifier_fails_before_writing_entries() {
    let fx = Fixture::new();
    let dir = fx.add_mod("broken", "name: Broken\nexports: [decks]\n");
    put(&dir.join("decks.yaml"), "Ghost Deck:\n  cover_card: nope\n  cards: [1]\n");

    match fx.run().unwrap_err() {
        PatchError::UnresolvedIdentifier { identifier, entity, .. } => {
            assert_eq!(identifier, "nope");
            assert_eq!(entity, "deck");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fx.work("singletons/DeckList.gd").contains("Ghost Deck"));
}

#[test]
fn duplicate_identifiers_are_rejected() {
    let fx = Fixture::new();
    for slug in ["a", "b"] {
        let dir = fx.add_mod(slug, &format!("name: {}\nexports: [cards]\n", slug));
        put(&dir.join("cards.yaml"), "Twin:\n  identifier: twin\n  description: x\n  value: 1\n  image: t.png\n");
        save_png(&dir.join("res/t.png"), 57, 89, RED);
    }
    let err = fx.run().unwrap_err();
    assert!(matches!(err, PatchError::DuplicateIdentifier { existing: 313, .. }), "{err}");
}

#[test]
fn builtin_and_cosmetic_patches_apply_without_mods() {
    let fx = Fixture::new();
    let report = fx.run().unwrap();
    assert!(report.mods.is_empty());
    assert!(report.atlases.is_empty());
    assert_eq!(report.builtin_patches[0].outcome, PatchOutcome::Applied { line: 6 });

    assert!(fx.work("ChoiceUI.gd").contains(
        "\t\tfor deck in DeckList.starting_deck_dictionary:\n\
         \t\t\tif card_choice.card_name == DeckList.starting_deck_dictionary[deck].name:\n\
         \t\t\t\tstarting_deck_string = deck\n\
         \t\tmacro_controller.player_starting_deck = starting_deck_string\n"
    ));
    assert_eq!(fx.work("singletons/Fonts.gd"), "var three_five_chars = \"0123456789/\"\n");
    assert_eq!(fx.work("events/EventPlayerLost.gd"), "func _ready():\n\tif false:\n\t\tpass\n");
    let id_card = image::open(fx.work_path("assets/art/id_card.png")).unwrap().to_rgba8();
    assert_eq!(*id_card.get_pixel(0, 0), GREEN);
    // The pristine tree is never written.
    assert_eq!(fx.src("ChoiceUI.gd"), CHOICE_UI);
    // Atlases without staged art are left alone.
    let sheet = image::open(fx.work_path("assets/art/card_sprite_sheet.png")).unwrap();
    assert_eq!((sheet.width(), sheet.height()), (57 * 13, 89));
}

#[test]
fn reset_discards_previous_output() {
    let fx = Fixture::new();
    fx.run().unwrap();
    put(&fx.work_path("stale.gd"), "leftover");
    fx.run().unwrap();
    assert!(!fx.work_path("stale.gd").exists());
}

#[test]
fn working_tree_inside_source_is_refused() {
    let fx = Fixture::new();
    let mut opts = fx.opts();
    opts.working_dir = fx.root.join("src/out");
    let err = Pipeline::new(opts).run().unwrap_err();
    assert!(matches!(err, PatchError::InvalidWorkingDir { .. }), "{err}");
    assert!(fx.root.join("src/ChoiceUI.gd").exists());
}

#[test]
fn scaffolded_mods_are_listed_and_load() {
    let fx = Fixture::new();
    let mods = fx.root.join("mods");
    let mut opts = dgm_core::ScaffoldOpts::new("Zeta Pack", "someone");
    opts.export_encounters = true;
    let zeta = dgm_core::scaffold_mod(&mods, &opts).unwrap();
    let alpha = dgm_core::scaffold_mod(&mods, &dgm_core::ScaffoldOpts::new("Alpha Pack", "someone")).unwrap();
    fs::create_dir_all(mods.join("not_a_mod")).unwrap();

    assert_eq!(dgm_core::list_mods(&mods).unwrap(), vec![alpha.clone(), zeta.clone()]);
    assert!(dgm_core::scaffold_mod(&mods, &opts).is_err());

    let manifest = dgm_core::load_manifest(&zeta).unwrap();
    assert_eq!(manifest.name, "Zeta Pack");
    let pkg = dgm_core::load_package(&zeta, manifest).unwrap();
    assert!(pkg.cards.is_empty() && pkg.encounters.is_empty());

    // Empty placeholder documents patch cleanly.
    let report = fx.run().unwrap();
    assert_eq!(report.mods.len(), 2);
}

fn trigger_mod(fx: &Fixture) {
    let dir = fx.add_mod("lamps", "name: Lamps\nexports: [cards]\n");
    put(
        &dir.join("cards.yaml"),
        "Torch:\n  description: Lights up\n  value: 4\n  image: torch.png\n  triggers:\n    play: play.gd\n    on_fire: fire.gd\n\
         Dud:\n  description: Does nothing\n  value: 1\n  image: dud.png\n  triggers:\n    on_fire: fire.gd\n",
    );
    put(&dir.join("src/play.gd"), "print(\"lit\")\n");
    put(&dir.join("src/fire.gd"), "print(\"burning\")\n");
    save_png(&dir.join("res/torch.png"), 57, 89, RED);
    save_png(&dir.join("res/dud.png"), 57, 89, RED);
}

#[test]
fn unknown_triggers_are_skipped() {
    let fx = Fixture::new();
    trigger_mod(&fx);

    let report = fx.run().unwrap();
    let m = &report.mods[0];
    assert_eq!((m.cards[0].id, m.cards[1].id), (313, 314));
    // Only the card with a known trigger gets effect files.
    assert_eq!(
        m.effects,
        vec![
            PathBuf::from("card_effect_resources/CardEffect313.gd"),
            PathBuf::from("card_effect_resources/card_effect_313.tres"),
        ]
    );
    let script = fx.work("card_effect_resources/CardEffect313.gd");
    assert!(script.contains("func play(card):\n\tprint(\"lit\")\n"));
    assert!(!script.contains("on_fire"));
    assert!(!script.contains("burning"));
    assert!(!fx.work_path("card_effect_resources/CardEffect314.gd").exists());

    let cards = fx.work("singletons/CardList.gd");
    let dud = &cards[cards.find("\t314: {").unwrap()..];
    assert!(!dud.contains("\"effect\""));
}

#[test]
fn unknown_trigger_fails_when_strict() {
    let fx = Fixture::new();
    trigger_mod(&fx);
    let mut opts = fx.opts();
    opts.strict_triggers = true;

    match Pipeline::new(opts).run().unwrap_err() {
        PatchError::InvalidTrigger { card, trigger, .. } => {
            assert_eq!(card, "Torch");
            assert_eq!(trigger, "on_fire");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn punctuated_encounter_names_register_cleanly() {
    let fx = Fixture::new();
    let dir = fx.add_mod("crypt", "name: Crypt\nexports: [encounters]\n");
    put(
        &dir.join("encounters.yaml"),
        "Mr. Bones:\n  location: forest\n  deck: 1\n  sprite: bones.png\n\
         Ogre:\n  location: forest\n  deck: 1\n  sprite: ogre.png\n",
    );
    save_png(&dir.join("res/bones.png"), 64, 64, RED);
    save_png(&dir.join("res/ogre.png"), 64, 64, RED);

    fx.run().unwrap();
    let rooms = fx.work("singletons/RoomList.gd");
    assert!(rooms.contains(
        "\tENCOUNTER_WOLF = \"forest_wolf\",\n\tENCOUNTER_MR_BONES = \"forest_mr_bones\",\n\tENCOUNTER_OGRE = \"forest_ogre\"\n}"
    ));
    assert!(rooms.contains(
        "\tForestRooms.ENCOUNTER_WOLF,\n\tForestRooms.ENCOUNTER_MR_BONES,\n\tForestRooms.ENCOUNTER_OGRE\n]"
    ));
    let encounters = fx.work("singletons/EncounterList.gd");
    assert!(encounters.contains("\t\"forest_mr_bones\": {"));
    assert!(encounters.contains("\t\t\"name\": \"Mr. Bones\","));
}

#[test]
fn encounter_without_identifier_characters_is_rejected() {
    let fx = Fixture::new();
    let dir = fx.add_mod("odd", "name: Odd\nexports: [encounters]\n");
    put(&dir.join("encounters.yaml"), "\"???\":\n  location: forest\n  deck: 1\n  sprite: q.png\n");
    let err = fx.run().unwrap_err();
    assert!(matches!(err, PatchError::InvalidDefinition { entity: "encounter", .. }), "{err}");
    assert_eq!(fx.work("singletons/RoomList.gd"), ROOMS);
}
