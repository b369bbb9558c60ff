// Template rendering: built-in entry/effect templates plus mod-supplied
// trigger fragments.
//
// Fragments are reindented one level (every newline gains a tab so the code
// nests inside the generated `func` body) and then rendered with the id tables,
// the trigger's own arguments and the engine helpers in scope. Undefined names
// are errors, so a fragment that looks up an unknown identifier fails loudly.
use minijinja::{AutoEscape, Environment, UndefinedBehavior, context};
use serde::Serialize;
use serde_json::{Map, Value as J};
use std::path::Path;

use crate::error::{PatchError, Result, read_to_string};
use crate::ids::IdentifierTable;
use crate::manifest::{CardDefinition, ModPackage, TriggerSource};
use crate::patch::resolve_in_tree;

pub const VALID_TRIGGERS: [&str; 9] = [
    "play",
    "clicked",
    "bust_limit_exceeded",
    "stand",
    "start_of_turn",
    "sleeve_played",
    "another_card_drawn",
    "card_instanced",
    "discarded",
];

const PLAY: &str = "play";
const DISCARDED: &str = "discarded";

const BUILTINS: [(&str, &str); 6] = [
    ("card_effect.gd.j2", include_str!("../templates/card_effect.gd.j2")),
    ("card_effect.tres.j2", include_str!("../templates/card_effect.tres.j2")),
    ("card_entry.gd.j2", include_str!("../templates/card_entry.gd.j2")),
    ("deck_entry.gd.j2", include_str!("../templates/deck_entry.gd.j2")),
    ("encounter_entry.gd.j2", include_str!("../templates/encounter_entry.gd.j2")),
    ("atlas_region.tres.j2", include_str!("../templates/atlas_region.tres.j2")),
];

/// GDScript string literal.
pub fn gd_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Suspend until `source` emits `signal`.
fn wait_for(signal: String, source: Option<String>) -> String {
    format!("yield({}, {})", source.as_deref().unwrap_or("self"), gd_string(&signal))
}

/// Route `signal` from `source` to the effect method `handler`, passing the card along.
fn on_event(signal: String, handler: String, source: Option<String>) -> String {
    format!(
        "{}.connect({}, self, {}, [card])",
        source.as_deref().unwrap_or("card"),
        gd_string(&signal),
        gd_string(&handler)
    )
}

pub fn reindent(source: &str) -> String {
    source.trim_end().replace("\r\n", "\n").replace('\n', "\n\t")
}

#[derive(Debug, Clone, Serialize)]
struct Event {
    trigger: String,
    body: String,
}

/// Generated script and resource for one card.
#[derive(Debug, Clone)]
pub struct CardEffect {
    pub script: String,
    pub resource: String,
}

pub struct Renderer {
    env: Environment<'static>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.add_filter("gd_string", |s: String| gd_string(&s));
        env.add_function("wait_for", wait_for);
        env.add_function("on_event", on_event);
        for (name, source) in BUILTINS {
            // Embedded at build time, so a syntax error is a defect in this crate.
            env.add_template(name, source)
                .unwrap_or_else(|e| panic!("built-in template {name} does not compile: {e}"));
        }
        Self { env }
    }

    pub fn render_builtin<S: Serialize>(&self, name: &str, ctx: S) -> Result<String> {
        let tmpl = self.env.get_template(name).map_err(PatchError::template(name))?;
        tmpl.render(ctx).map_err(PatchError::template(name))
    }

    /// Render a mod fragment that was already reindented.
    pub fn render_fragment<S: Serialize>(&self, name: &str, source: &str, ctx: S) -> Result<String> {
        self.env
            .render_str(source, ctx)
            .map_err(PatchError::template(name))
    }

    /// Build the effect script/resource for a card, or `None` when the card has
    /// no usable triggers and stays a plain stat entry.
    pub fn card_effect(
        &self,
        pkg: &ModPackage,
        card: &CardDefinition,
        id: u32,
        tables: &FragmentTables<'_>,
        effect_dir: &Path,
        strict_triggers: bool,
    ) -> Result<Option<CardEffect>> {
        let mut events: Vec<Event> = Vec::with_capacity(card.triggers.len() + 1);
        for trigger in &card.triggers {
            if !VALID_TRIGGERS.contains(&trigger.name.as_str()) {
                if strict_triggers {
                    return Err(PatchError::InvalidTrigger {
                        mod_name: pkg.name().to_string(),
                        card: card.name.clone(),
                        trigger: trigger.name.clone(),
                    });
                }
                tracing::warn!(
                    mod_name = pkg.name(),
                    card = %card.name,
                    trigger = %trigger.name,
                    "skipping unknown trigger"
                );
                continue;
            }
            let path = resolve_in_tree(&pkg.src_dir(), trigger.source.filename())?;
            let source = reindent(&read_to_string(&path)?);
            let empty = Map::new();
            let args = match &trigger.source {
                TriggerSource::File(_) => &empty,
                TriggerSource::WithArgs { args, .. } => args,
            };
            let body = self.render_fragment(
                &path.display().to_string(),
                &source,
                context! {
                    card_ids => tables.cards.as_map(),
                    deck_ids => tables.decks.as_map(),
                    args => J::Object(args.clone()),
                    card_id => id,
                    card_name => &card.name,
                },
            )?;
            events.push(Event {
                trigger: trigger.name.clone(),
                body,
            });
        }
        if events.is_empty() {
            return Ok(None);
        }
        attach_discard_hook(&mut events);

        let script = self.render_builtin("card_effect.gd.j2", context! { events => &events })?;
        let resource = self.render_builtin(
            "card_effect.tres.j2",
            context! { id => id, effect_dir => tres_path(effect_dir) },
        )?;
        Ok(Some(CardEffect { script, resource }))
    }
}

/// The id tables a fragment can see.
pub struct FragmentTables<'a> {
    pub cards: &'a IdentifierTable,
    pub decks: &'a IdentifierTable,
}

/// A `discarded` handler is only reachable once `play` connects it: append the
/// connection to `play`, or synthesize a `play` that does nothing else.
fn attach_discard_hook(events: &mut Vec<Event>) {
    if !events.iter().any(|e| e.trigger == DISCARDED) {
        return;
    }
    let hook = on_event(DISCARDED.to_string(), DISCARDED.to_string(), None);
    match events.iter_mut().find(|e| e.trigger == PLAY) {
        Some(play) => {
            play.body.push_str("\n\t");
            play.body.push_str(&hook);
        }
        None => events.insert(
            0,
            Event {
                trigger: PLAY.to_string(),
                body: hook,
            },
        ),
    }
}

/// `res://` paths always use forward slashes.
pub fn tres_path(p: &Path) -> String {
    p.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
