// Sprite atlases: fixed-size cells on a shared bitmap plus a Godot `.tres`
// descriptor listing one AtlasTexture region per cell.
//
// Growth is append-only. New rows are added below the existing canvas and
// nothing already on it moves, so every previously recorded region stays valid.
use image::{RgbaImage, imageops};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::AtlasLayout;
use crate::error::{PatchError, Result, read_to_string, write};
use crate::render::Renderer;

pub const COLUMNS: u32 = 13;
pub const RESOURCE_MARKER: &str = "[resource]";

static EXT_RESOURCE: OnceLock<Regex> = OnceLock::new();
static EXT_RESOURCE_PATH: OnceLock<Regex> = OnceLock::new();
static RESOURCE_ID: OnceLock<Regex> = OnceLock::new();
static SUB_RESOURCE_ID: OnceLock<Regex> = OnceLock::new();
static LOAD_STEPS: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub id: u32,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtlasReport {
    pub bitmap: PathBuf,
    pub old_size: (u32, u32),
    pub new_size: (u32, u32),
    pub placements: Vec<Placement>,
}

/// Pixel origin of the `rank`-th new cell when the existing canvas is `base_height` tall.
pub fn origin(rank: usize, cell_width: u32, cell_height: u32, base_height: u32) -> (u32, u32) {
    let rank = rank as u32;
    (
        (rank % COLUMNS) * cell_width,
        base_height + (rank / COLUMNS) * cell_height,
    )
}

#[derive(Debug)]
pub struct SpriteAtlas {
    bitmap: PathBuf,
    descriptor: PathBuf,
    cell_width: u32,
    cell_height: u32,
    staged: BTreeMap<u32, PathBuf>,
}

impl SpriteAtlas {
    /// Atlas whose bitmap and descriptor live under the working tree `root`.
    pub fn new(root: &Path, layout: &AtlasLayout) -> Self {
        Self {
            bitmap: root.join(&layout.bitmap),
            descriptor: root.join(&layout.descriptor),
            cell_width: layout.cell_width,
            cell_height: layout.cell_height,
            staged: BTreeMap::new(),
        }
    }

    /// Remember art for `id`; nothing touches disk until `finalize`.
    pub fn add_art(&mut self, id: u32, art: impl Into<PathBuf>) {
        self.staged.insert(id, art.into());
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Composite staged art onto the bitmap and register the new regions in the
    /// descriptor. A no-op returning `None` when nothing was staged.
    pub fn finalize(&mut self, renderer: &Renderer) -> Result<Option<AtlasReport>> {
        if self.staged.is_empty() {
            return Ok(None);
        }
        let existing = image::open(&self.bitmap)
            .map_err(PatchError::image(&self.bitmap))?
            .to_rgba8();
        let (width, height) = existing.dimensions();
        let rows = (self.staged.len() as u32).div_ceil(COLUMNS);
        let new_width = width.max(COLUMNS * self.cell_width);
        let new_height = height + rows * self.cell_height;

        let mut canvas = RgbaImage::new(new_width, new_height);
        imageops::replace(&mut canvas, &existing, 0, 0);

        let mut placements = Vec::with_capacity(self.staged.len());
        for (rank, (&id, art_path)) in self.staged.iter().enumerate() {
            let art = image::open(art_path)
                .map_err(PatchError::image(art_path))?
                .to_rgba8();
            let cell = imageops::crop_imm(
                &art,
                0,
                0,
                art.width().min(self.cell_width),
                art.height().min(self.cell_height),
            )
            .to_image();
            let (x, y) = origin(rank, self.cell_width, self.cell_height, height);
            imageops::replace(&mut canvas, &cell, i64::from(x), i64::from(y));
            tracing::debug!(id, x, y, art = %art_path.display(), "placed sprite");
            placements.push(Placement { id, x, y });
        }
        canvas.save(&self.bitmap).map_err(PatchError::image(&self.bitmap))?;

        let texture = self
            .bitmap
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        update_descriptor(
            &self.descriptor,
            &texture,
            &placements,
            self.cell_width,
            self.cell_height,
            renderer,
        )?;
        self.staged.clear();
        Ok(Some(AtlasReport {
            bitmap: self.bitmap.clone(),
            old_size: (width, height),
            new_size: (new_width, new_height),
            placements,
        }))
    }
}

/// Id of the `[ext_resource]` whose path names the bitmap file `texture`.
fn texture_id(text: &str, texture: &str) -> Option<u32> {
    let ext_re = EXT_RESOURCE.get_or_init(|| {
        Regex::new(r"\[ext_resource [^\]]*\]").expect("EXT_RESOURCE pattern is invalid")
    });
    let path_re = EXT_RESOURCE_PATH.get_or_init(|| {
        Regex::new(r#"\bpath="([^"]*)""#).expect("EXT_RESOURCE_PATH pattern is invalid")
    });
    let id_re = RESOURCE_ID.get_or_init(|| {
        Regex::new(r"\bid=(\d+)").expect("RESOURCE_ID pattern is invalid")
    });
    ext_re.find_iter(text).find_map(|tag| {
        let tag = tag.as_str();
        let path = path_re.captures(tag)?;
        let file = path[1].rsplit('/').next()?;
        if file != texture {
            return None;
        }
        id_re.captures(tag)?[1].parse().ok()
    })
}

/// Insert one AtlasTexture sub-resource per placement right before `[resource]`,
/// append them to the `"frames"` list when there is one, and recount `load_steps`.
/// Regions point at the ext_resource whose path ends in the file name `texture`.
pub fn update_descriptor(
    path: &Path,
    texture: &str,
    placements: &[Placement],
    cell_width: u32,
    cell_height: u32,
    renderer: &Renderer,
) -> Result<()> {
    let malformed = |message: &str| PatchError::MalformedDescriptor {
        path: path.to_path_buf(),
        message: message.to_string(),
    };
    let text = read_to_string(path)?;
    let marker = find_marker(&text).ok_or_else(|| malformed("no [resource] section"))?;

    let sub_re = SUB_RESOURCE_ID.get_or_init(|| {
        Regex::new(r#"\[sub_resource [^\]]*\bid=(\d+)"#).expect("SUB_RESOURCE_ID pattern is invalid")
    });
    let texture_res = texture_id(&text, texture)
        .ok_or_else(|| malformed(&format!("no ext_resource for {}", texture)))?;
    let mut next_sub = sub_re
        .captures_iter(&text)
        .filter_map(|c| c[1].parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1;

    let mut blocks = String::new();
    let mut refs = Vec::with_capacity(placements.len());
    for p in placements {
        blocks.push_str(&renderer.render_builtin(
            "atlas_region.tres.j2",
            minijinja::context! {
                sub_id => next_sub,
                texture => texture_res,
                x => p.x,
                y => p.y,
                width => cell_width,
                height => cell_height,
            },
        )?);
        blocks.push_str("\n\n");
        refs.push(format!("SubResource( {} )", next_sub));
        next_sub += 1;
    }

    let (head, resource) = text.split_at(marker);
    let mut out = String::with_capacity(text.len() + blocks.len());
    out.push_str(head);
    out.push_str(&blocks);
    out.push_str(&append_frames(resource, &refs));

    let total = out.matches("[ext_resource ").count() + out.matches("[sub_resource ").count() + 1;
    let steps_re = LOAD_STEPS.get_or_init(|| {
        Regex::new(r"load_steps=\d+").expect("LOAD_STEPS pattern is invalid")
    });
    let out = steps_re
        .replace(&out, format!("load_steps={}", total).as_str())
        .into_owned();
    write(path, out)
}

fn find_marker(text: &str) -> Option<usize> {
    if text.starts_with(RESOURCE_MARKER) {
        return Some(0);
    }
    text.find(&format!("\n{}", RESOURCE_MARKER)).map(|i| i + 1)
}

/// Append refs to the first `"frames": [ ... ]` list of the resource section.
fn append_frames(resource: &str, refs: &[String]) -> String {
    const FRAMES: &str = "\"frames\": [";
    let Some(start) = resource.find(FRAMES).map(|i| i + FRAMES.len()) else {
        return resource.to_string();
    };
    let Some(len) = resource[start..].find(']') else {
        return resource.to_string();
    };
    let end = start + len;
    let current = resource[start..end].trim();
    let mut list: Vec<&str> = if current.is_empty() {
        Vec::new()
    } else {
        vec![current]
    };
    list.extend(refs.iter().map(String::as_str));
    format!("{} {} {}", &resource[..start], list.join(", "), &resource[end..])
}
