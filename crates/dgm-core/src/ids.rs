// Numeric id allocation across mods.
//
// Each category (cards, decks, encounters) owns a contiguous range starting at a
// fixed base. The cursor is a plain value: every allocation consumes the
// previous cursor and returns the next one, so the order of calls is the only
// thing that decides ids.
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::IdBases;
use crate::error::{PatchError, Result};
use crate::manifest::EntityRef;

/// The next id a category will hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HighWater {
    next: u32,
}

impl HighWater {
    pub fn starting_at(base: u32) -> Self {
        Self { next: base }
    }

    pub fn next_id(self) -> u32 {
        self.next
    }

    /// Last id handed out, if any id below `next` exists.
    pub fn last_id(self) -> Option<u32> {
        self.next.checked_sub(1)
    }

    /// Reserve `count` consecutive ids in declaration order.
    pub fn allocate(self, count: usize) -> (Vec<u32>, HighWater) {
        let count = count as u32;
        let ids = (self.next..self.next + count).collect();
        (ids, HighWater { next: self.next + count })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdSpace {
    pub cards: HighWater,
    pub decks: HighWater,
    pub encounters: HighWater,
}

impl IdSpace {
    pub fn new(bases: &IdBases) -> Self {
        Self {
            cards: HighWater::starting_at(bases.first_card),
            decks: HighWater::starting_at(bases.first_deck),
            encounters: HighWater::starting_at(bases.first_encounter),
        }
    }
}

/// `identifier` -> id for every entity of one category processed so far.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct IdentifierTable {
    map: BTreeMap<String, u32>,
}

impl IdentifierTable {
    pub fn register(&mut self, mod_name: &str, identifier: &str, id: u32) -> Result<()> {
        if let Some(&existing) = self.map.get(identifier) {
            return Err(PatchError::DuplicateIdentifier {
                mod_name: mod_name.to_string(),
                identifier: identifier.to_string(),
                existing,
            });
        }
        self.map.insert(identifier.to_string(), id);
        Ok(())
    }

    /// Register the optional identifiers of freshly allocated entities.
    pub fn register_all<'a>(
        &mut self,
        mod_name: &str,
        entries: impl IntoIterator<Item = (u32, Option<&'a str>)>,
    ) -> Result<()> {
        for (id, identifier) in entries {
            if let Some(identifier) = identifier {
                self.register(mod_name, identifier, id)?;
            }
        }
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<u32> {
        self.map.get(identifier).copied()
    }

    pub fn resolve(&self, r: &EntityRef) -> Option<u32> {
        match r {
            EntityRef::Id(id) => Some(*id),
            EntityRef::Identifier(s) => self.get(s),
        }
    }

    pub fn as_map(&self) -> &BTreeMap<String, u32> {
        &self.map
    }
}
