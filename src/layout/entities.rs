use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

use crate::assets::{IconCatalog, IconGeometry, PlacementSupport};
use crate::config::{LayoutConfig, ReceptacleConfig};
use crate::error::Result;
use crate::ir::Episode;
use crate::theme::Theme;

use super::text::readable_base;

/// States that get a badge on objects and a text line under receptacles.
pub(crate) const DISPLAYED_STATES: [&str; 3] = ["is_clean", "is_filled", "is_powered_on"];

pub(crate) const FLOOR_PREFIX: &str = "floor_";

/// Receptacle footprint in layout units, derived from its icon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ReceptacleSize {
    pub width: f32,
    pub height: f32,
    pub icon_width: f32,
    pub top_height: f32,
    pub center_height: f32,
}

pub(crate) fn receptacle_size(icon: IconGeometry, config: &ReceptacleConfig) -> ReceptacleSize {
    let scale = if icon.height > 0.0 {
        config.target_height / icon.height
    } else {
        1.0
    };
    let icon_width = (icon.width * scale).floor();
    ReceptacleSize {
        width: icon_width + 2.0 * config.horizontal_margin,
        height: (icon.height * scale).floor(),
        icon_width,
        top_height: icon.top_height * scale,
        center_height: icon.center_height * scale,
    }
}

/// Room footprint; `room_*` is the drawn box, the rest adds outer margins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RoomSize {
    pub width: f32,
    pub height: f32,
    pub room_width: f32,
    pub room_height: f32,
    pub bottom_pad: f32,
}

#[derive(Debug, Clone)]
pub(crate) struct SceneObject {
    pub id: String,
    pub room: Option<usize>,
    pub states: BTreeMap<String, bool>,
    pub previous_states: BTreeMap<String, bool>,
    pub is_on_floor: bool,
    pub color: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SceneReceptacle {
    pub id: String,
    pub room: usize,
    pub size: ReceptacleSize,
    pub support: PlacementSupport,
    pub icon_path: Option<String>,
    pub states: BTreeMap<String, bool>,
    pub previous_states: BTreeMap<String, bool>,
    pub plot_top: bool,
    pub plot_center: bool,
    /// State attributes printed under the icon for the current row.
    pub shown_states: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct SceneRoom {
    pub id: String,
    pub receptacles: Vec<usize>,
    pub in_proposition: bool,
    pub plot_placeholder: bool,
    pub num_state_lines: usize,
    size: Cell<Option<RoomSize>>,
}

/// Per-render color assignment. Nothing global survives between renders.
#[derive(Debug, Clone)]
pub(crate) struct RenderContext {
    palette: Vec<String>,
    object_colors: HashMap<String, String>,
}

impl RenderContext {
    pub fn new(theme: &Theme) -> Self {
        let palette = if theme.object_palette.is_empty() {
            vec![theme.line_color.clone()]
        } else {
            theme.object_palette.clone()
        };
        Self {
            palette,
            object_colors: HashMap::new(),
        }
    }

    /// Stable color for an object, assigned in first-request order.
    pub fn object_color(&mut self, id: &str) -> String {
        let next = self.object_colors.len();
        self.object_colors
            .entry(id.to_string())
            .or_insert_with(|| self.palette[next % self.palette.len()].clone())
            .clone()
    }

    pub fn proposition_color(&self, index: usize) -> String {
        // Offset so the first connector does not share the first object's color.
        let shift = self.palette.len() / 2;
        self.palette[(index + shift) % self.palette.len()].clone()
    }
}

/// Mutable world state for one episode. Sole owner of rooms, objects and receptacles.
#[derive(Debug, Clone)]
pub(crate) struct Scene {
    pub rooms: Vec<SceneRoom>,
    pub objects: Vec<SceneObject>,
    pub receptacles: Vec<SceneReceptacle>,
    pub object_to_recep: BTreeMap<String, String>,
    pub object_to_room: BTreeMap<String, String>,
    pub instruction: String,
    room_index: HashMap<String, usize>,
    object_index: HashMap<String, usize>,
    receptacle_index: HashMap<String, usize>,
}

impl Scene {
    pub fn build(
        episode: &Episode,
        catalog: &IconCatalog,
        config: &LayoutConfig,
        ctx: &mut RenderContext,
    ) -> Result<Self> {
        let room_ids = sort_rooms_by_relevance(episode);
        let room_index: HashMap<String, usize> = room_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.clone(), idx))
            .collect();
        let mut rooms: Vec<SceneRoom> = room_ids
            .iter()
            .map(|id| SceneRoom {
                id: id.clone(),
                receptacles: Vec::new(),
                in_proposition: false,
                plot_placeholder: false,
                num_state_lines: 0,
                size: Cell::new(None),
            })
            .collect();

        let mut receptacles = Vec::new();
        let mut receptacle_index = HashMap::new();
        for (recep_id, room_id) in &episode.recep_to_room {
            let Some(&room) = room_index.get(room_id) else {
                tracing::debug!(receptacle = %recep_id, room = %room_id, "receptacle room not in scene");
                continue;
            };
            let states = episode
                .object_to_states
                .get(recep_id)
                .cloned()
                .unwrap_or_default();
            receptacle_index.insert(recep_id.clone(), receptacles.len());
            rooms[room].receptacles.push(receptacles.len());
            receptacles.push(SceneReceptacle {
                id: recep_id.clone(),
                room,
                size: receptacle_size(catalog.geometry(recep_id)?, &config.receptacle),
                support: catalog.placement(recep_id),
                icon_path: catalog
                    .path(recep_id)
                    .map(|path| path.display().to_string()),
                previous_states: states.clone(),
                states,
                plot_top: false,
                plot_center: false,
                shown_states: Vec::new(),
            });
        }

        let mut objects = Vec::new();
        let mut object_index = HashMap::new();
        for (object_id, room_id) in &episode.object_to_room {
            let room = room_index.get(room_id).copied();
            if room.is_none() {
                tracing::debug!(object = %object_id, room = %room_id, "object room not in scene");
            }
            let states = episode
                .object_to_states
                .get(object_id)
                .cloned()
                .unwrap_or_default();
            object_index.insert(object_id.clone(), objects.len());
            objects.push(SceneObject {
                id: object_id.clone(),
                room,
                previous_states: states.clone(),
                states,
                is_on_floor: false,
                color: ctx.object_color(object_id),
            });
        }

        Ok(Self {
            rooms,
            objects,
            receptacles,
            object_to_recep: episode.object_to_recep.clone(),
            object_to_room: episode.object_to_room.clone(),
            instruction: episode.instruction.clone(),
            room_index,
            object_index,
            receptacle_index,
        })
    }

    pub fn room_idx(&self, id: &str) -> Option<usize> {
        self.room_index.get(id).copied()
    }

    pub fn object_idx(&self, id: &str) -> Option<usize> {
        self.object_index.get(id).copied()
    }

    pub fn receptacle_idx(&self, id: &str) -> Option<usize> {
        self.receptacle_index.get(id).copied()
    }

    pub fn objects_in_room(&self, room: usize) -> impl Iterator<Item = usize> + '_ {
        self.objects
            .iter()
            .enumerate()
            .filter(move |(_, obj)| obj.room == Some(room))
            .map(|(idx, _)| idx)
    }

    /// The receptacle an object is stacked on, if it is in the object's room.
    pub fn stacked_on(&self, object: usize) -> Option<usize> {
        let obj = &self.objects[object];
        let recep_id = self.object_to_recep.get(&obj.id)?;
        if recep_id.starts_with(FLOOR_PREFIX) {
            return None;
        }
        let recep = self.receptacle_idx(recep_id)?;
        if Some(self.receptacles[recep].room) == obj.room {
            Some(recep)
        } else {
            tracing::debug!(object = %obj.id, receptacle = %recep_id, "receptacle outside object room, placing as free object");
            None
        }
    }

    pub fn free_objects(&self, room: usize) -> Vec<usize> {
        self.objects_in_room(room)
            .filter(|&obj| self.stacked_on(obj).is_none())
            .collect()
    }

    pub fn stacked_objects(&self, receptacle: usize) -> Vec<usize> {
        let room = self.receptacles[receptacle].room;
        self.objects_in_room(room)
            .filter(|&obj| self.stacked_on(obj) == Some(receptacle))
            .collect()
    }

    pub fn move_object(&mut self, object: usize, room: usize) {
        if let Some(prev) = self.objects[object].room {
            self.rooms[prev].size.set(None);
        }
        self.rooms[room].size.set(None);
        self.objects[object].room = Some(room);
    }

    pub fn invalidate_sizes(&self) {
        for room in &self.rooms {
            room.size.set(None);
        }
    }

    pub fn set_state_lines(&mut self, room: usize, lines: usize) {
        if self.rooms[room].num_state_lines != lines {
            self.rooms[room].num_state_lines = lines;
            self.rooms[room].size.set(None);
        }
    }

    /// Memoized natural size of a room.
    pub fn room_size(&self, room: usize, config: &LayoutConfig) -> RoomSize {
        if let Some(size) = self.rooms[room].size.get() {
            return size;
        }
        let size = super::room::measure_room(self, room, config);
        self.rooms[room].size.set(Some(size));
        size
    }
}

/// Rooms ordered by how many instruction words mention them or their contents.
pub(crate) fn sort_rooms_by_relevance(episode: &Episode) -> Vec<String> {
    let keywords: Vec<String> = episode
        .instruction
        .split_whitespace()
        .map(|word| word.to_lowercase().trim_matches('.').to_string())
        .collect();
    let score = |id: &str| -> usize {
        let base = readable_base(id);
        if base.is_empty() {
            return 0;
        }
        keywords.iter().filter(|kw| kw.contains(&base)).count()
    };

    let mut scored: Vec<(usize, &String)> = episode
        .rooms
        .iter()
        .map(|room| {
            let receptacles = episode
                .recep_to_room
                .iter()
                .filter(|(_, r)| *r == room)
                .map(|(id, _)| score(id));
            let objects = episode
                .object_to_room
                .iter()
                .filter(|(_, r)| *r == room)
                .map(|(id, _)| score(id));
            (score(room) + receptacles.sum::<usize>() + objects.sum::<usize>(), room)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().map(|(_, room)| room.clone()).collect()
}
