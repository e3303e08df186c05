use std::collections::BTreeSet;

use crate::config::LayoutConfig;
use crate::error::SchemaError;
use crate::ir::{Episode, Proposition, PropositionKind};

use super::entities::{FLOOR_PREFIX, RenderContext, Scene};
use super::propagation::{Assignment, narrow_same_args, propagate};
use super::routing::route_level;
use super::rows::{pack_rows, room_order};
use super::types::LevelLayout;

/// Groups proposition indices into topological generations (Kahn), each sorted.
/// Propositions no edge mentions have no predecessors and land in generation 0.
pub fn toposort_levels(count: usize, edges: &[(usize, usize)]) -> Result<Vec<Vec<usize>>, SchemaError> {
    let mut indegree = vec![0usize; count];
    let mut successors = vec![Vec::new(); count];
    for &(from, to) in edges {
        for index in [from, to] {
            if index >= count {
                return Err(SchemaError::PropositionIndexOutOfRange { index, count });
            }
        }
        successors[from].push(to);
        indegree[to] += 1;
    }

    let mut levels = Vec::new();
    let mut current: Vec<usize> = (0..count).filter(|&i| indegree[i] == 0).collect();
    let mut seen = 0;
    while !current.is_empty() {
        current.sort_unstable();
        let mut next = Vec::new();
        for &node in &current {
            for &succ in &successors[node] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    next.push(succ);
                }
            }
        }
        seen += current.len();
        levels.push(std::mem::replace(&mut current, next));
    }

    if seen != count {
        let stuck = (0..count).filter(|&i| indegree[i] > 0).collect();
        return Err(SchemaError::TemporalCycle(stuck));
    }
    Ok(levels)
}

/// Rooms that hold anything the propositions mention, plus rooms named directly.
pub(super) fn mentioned_rooms(scene: &Scene, propositions: &[&Proposition]) -> BTreeSet<usize> {
    let mut rooms = BTreeSet::new();
    for prop in propositions {
        if prop.kind == PropositionKind::IsNextTo {
            continue;
        }
        rooms.extend(prop.args.room_names.iter().filter_map(|r| scene.room_idx(r)));
        for object in &prop.args.object_names {
            if let Some(room) = scene.object_idx(object).and_then(|o| scene.objects[o].room) {
                rooms.insert(room);
            }
        }
        for recep in &prop.args.receptacle_names {
            if let Some(r) = scene.receptacle_idx(recep) {
                rooms.insert(scene.receptacles[r].room);
            }
        }
    }
    rooms
}

/// Resets and sets the per-level drawing flags: placeholders, floor outlines
/// and which rooms take part in the level.
pub(super) fn apply_level_flags(scene: &mut Scene, propositions: &[&Proposition]) {
    for room in &mut scene.rooms {
        room.plot_placeholder = false;
        room.in_proposition = false;
    }
    for recep in &mut scene.receptacles {
        recep.plot_top = false;
        recep.plot_center = false;
    }
    for obj in &mut scene.objects {
        obj.is_on_floor = false;
    }

    let mut involved = BTreeSet::new();
    for prop in propositions {
        match prop.kind {
            PropositionKind::IsOnTop | PropositionKind::IsInside => {
                for recep in &prop.args.receptacle_names {
                    let Some(r) = scene.receptacle_idx(recep) else {
                        continue;
                    };
                    let recep = &mut scene.receptacles[r];
                    if prop.kind == PropositionKind::IsOnTop {
                        recep.plot_top = true;
                    } else {
                        recep.plot_center = true;
                    }
                    involved.insert(recep.room);
                }
            }
            PropositionKind::IsInRoom => {
                for room in &prop.args.room_names {
                    if let Some(idx) = scene.room_idx(room) {
                        scene.rooms[idx].plot_placeholder = true;
                        involved.insert(idx);
                    }
                }
            }
            PropositionKind::IsOnFloor => {
                for object in &prop.args.object_names {
                    if let Some(o) = scene.object_idx(object) {
                        scene.objects[o].is_on_floor = true;
                    }
                }
            }
            _ => continue,
        }
        for object in &prop.args.object_names {
            if let Some(room) = scene.object_idx(object).and_then(|o| scene.objects[o].room) {
                involved.insert(room);
            }
        }
    }
    for room in involved {
        scene.rooms[room].in_proposition = true;
    }
}

/// is_clean / is_filled / is_powered_on set the state; is_powered_off clears is_powered_on.
pub(super) fn apply_state_changes(scene: &mut Scene, propositions: &[&Proposition]) {
    for prop in propositions {
        let (state, value) = match prop.kind {
            PropositionKind::IsClean => ("is_clean", true),
            PropositionKind::IsFilled => ("is_filled", true),
            PropositionKind::IsPoweredOn => ("is_powered_on", true),
            PropositionKind::IsPoweredOff => ("is_powered_on", false),
            _ => continue,
        };
        for object in &prop.args.object_names {
            if let Some(o) = scene.object_idx(object) {
                scene.objects[o].states.insert(state.to_string(), value);
            }
        }
        for recep in &prop.args.receptacle_names {
            if let Some(r) = scene.receptacle_idx(recep) {
                scene.receptacles[r].states.insert(state.to_string(), value);
            }
        }
    }
}

/// Moves objects to the rooms their new receptacle or room assignment implies.
/// Receptacle placement wins over a conflicting room assignment.
pub(super) fn migrate(scene: &mut Scene, assignment: Assignment) {
    let mut object_to_room = assignment.object_to_room;
    for (object, recep) in &assignment.object_to_recep {
        let room = match recep.strip_prefix(FLOOR_PREFIX) {
            Some(room_id) => scene.room_idx(room_id),
            None => scene.receptacle_idx(recep).map(|r| scene.receptacles[r].room),
        };
        if let Some(room) = room {
            object_to_room.insert(object.clone(), scene.rooms[room].id.clone());
        }
    }
    for (object, room_id) in &object_to_room {
        let (Some(o), Some(room)) = (scene.object_idx(object), scene.room_idx(room_id)) else {
            continue;
        };
        if scene.objects[o].room != Some(room) {
            tracing::debug!(object = %object, room = %room_id, "moving object");
            scene.move_object(o, room);
        }
    }
    scene.object_to_recep = assignment.object_to_recep;
    scene.object_to_room = object_to_room;
    scene.invalidate_sizes();
}

/// Lays out every level in order, carrying the scene state from one level to the next.
///
/// With `separate` each level starts at y = 0; otherwise levels stack downward
/// with `temporal_scene_margin` between bands.
pub(super) fn run_levels(
    scene: &mut Scene,
    episode: &Episode,
    levels: &[Vec<usize>],
    config: &LayoutConfig,
    ctx: &RenderContext,
    separate: bool,
) -> Vec<LevelLayout> {
    let all: Vec<&Proposition> = episode.propositions.iter().collect();
    let order = room_order(scene, &mentioned_rooms(scene, &all));
    let same_args: Vec<_> = episode.same_arg_constraints().collect();
    let margin = config.scene.temporal_scene_margin;

    let mut out = Vec::with_capacity(levels.len());
    let mut min_lower = 0.0_f32;
    for (k, level) in levels.iter().enumerate() {
        let props: Vec<(usize, &Proposition)> = level
            .iter()
            .filter_map(|&i| episode.propositions.get(i).map(|p| (i, p)))
            .collect();
        let refs: Vec<&Proposition> = props.iter().map(|(_, p)| *p).collect();

        apply_level_flags(scene, &refs);
        apply_state_changes(scene, &refs);

        let offset = if separate { 0.0 } else { min_lower };
        let pass = pack_rows(scene, &order, offset, config);
        let connectors = route_level(&pass.rooms, &props, offset, &config.arrow, ctx);
        tracing::debug!(level = k, lower = pass.lower, upper = pass.upper, rooms = pass.rooms.len(), "packed level");
        min_lower = min_lower.min(pass.lower - margin);

        let mut narrowed: Vec<(usize, Proposition)> =
            props.iter().map(|&(i, p)| (i, p.clone())).collect();
        narrow_same_args(&mut narrowed, &same_args);
        let narrowed: Vec<Proposition> = narrowed.into_iter().map(|(_, p)| p).collect();
        let assignment = propagate(&scene.object_to_recep, &scene.object_to_room, &narrowed);
        let unplaced: Vec<String> = assignment.unplaced.iter().cloned().collect();
        if !unplaced.is_empty() {
            tracing::warn!(episode_id = %episode.episode_id, level = k, ?unplaced, "objects left without a placement");
        }
        migrate(scene, assignment);

        out.push(LevelLayout {
            index: k,
            propositions: level.clone(),
            lower: pass.lower,
            upper: pass.upper,
            rooms: pass.rooms,
            connectors,
            unplaced,
            objects: Vec::new(),
            receptacles: Vec::new(),
        });
    }
    out
}
