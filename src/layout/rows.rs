use std::collections::BTreeSet;

use crate::config::LayoutConfig;

use super::entities::{DISPLAYED_STATES, Scene};
use super::room::{RoomSlot, layout_room};
use super::types::{Point, RoomLayout};

/// Output of one packing pass: positioned rooms and the vertical extent they use.
#[derive(Debug, Clone)]
pub(super) struct RowPass {
    pub rooms: Vec<RoomLayout>,
    pub lower: f32,
    pub upper: f32,
    pub width: f32,
}

/// Mentioned rooms first, each group in scene (relevance) order.
pub(super) fn room_order(scene: &Scene, mentioned: &BTreeSet<usize>) -> Vec<usize> {
    let all = 0..scene.rooms.len();
    all.clone()
        .filter(|idx| mentioned.contains(idx))
        .chain(all.filter(|idx| !mentioned.contains(idx)))
        .collect()
}

/// Greedy first-fit rows under `scene.target_width`, stacking downward from `offset`.
pub(super) fn pack_rows(
    scene: &mut Scene,
    order: &[usize],
    offset: f32,
    config: &LayoutConfig,
) -> RowPass {
    let target = config.scene.target_width;
    let mut pass = RowPass {
        rooms: Vec::with_capacity(order.len()),
        lower: offset,
        upper: offset,
        width: 0.0,
    };
    let mut row: Vec<usize> = Vec::new();
    let mut row_width = 0.0;
    for &room in order {
        let width = scene.room_size(room, config).width;
        if !row.is_empty() && row_width + width > target {
            flush_row(scene, &row, &mut pass, config);
            row.clear();
            row_width = 0.0;
        }
        if row.is_empty() && width > target {
            tracing::debug!(room = %scene.rooms[room].id, width, target, "room wider than target row");
        }
        row.push(room);
        row_width += width;
    }
    if !row.is_empty() {
        flush_row(scene, &row, &mut pass, config);
    }
    pass
}

fn flush_row(scene: &mut Scene, row: &[usize], pass: &mut RowPass, config: &LayoutConfig) {
    diff_receptacle_states(scene, row);

    let sizes: Vec<_> = row.iter().map(|&room| scene.room_size(room, config)).collect();
    let max_height = sizes.iter().map(|s| s.height).fold(0.0_f32, f32::max);
    let max_room_height = sizes.iter().map(|s| s.room_height).fold(0.0_f32, f32::max);
    let natural_total: f32 = sizes.iter().map(|s| s.width).sum();
    pass.lower -= max_height;

    let mut x = 0.0;
    for (&room, size) in row.iter().zip(&sizes) {
        let share = if natural_total > 0.0 {
            config.scene.target_width * size.width / natural_total
        } else {
            config.scene.target_width / row.len() as f32
        };
        let layout = layout_room(
            scene,
            room,
            RoomSlot {
                origin: Point::new(x, pass.lower),
                target_width: Some(share),
                room_height: Some(max_room_height),
            },
            config,
        );
        x += layout.rect.width;
        pass.rooms.push(layout);
    }
    pass.width = pass.width.max(x);
}

/// Counts receptacle state attributes that changed anywhere in the row; every
/// room of the row reserves that many text lines.
fn diff_receptacle_states(scene: &mut Scene, row: &[usize]) {
    let mut changed = [false; DISPLAYED_STATES.len()];
    for &room in row {
        for &r in &scene.rooms[room].receptacles {
            let recep = &scene.receptacles[r];
            for (flag, state) in changed.iter_mut().zip(DISPLAYED_STATES) {
                if let Some(value) = recep.states.get(state)
                    && recep.previous_states.get(state) != Some(value)
                {
                    *flag = true;
                }
            }
        }
    }
    let lines = changed.iter().filter(|&&flag| flag).count();

    for &room in row {
        scene.set_state_lines(room, lines);
        let receptacles = scene.rooms[room].receptacles.clone();
        for r in receptacles {
            let recep = &mut scene.receptacles[r];
            recep.previous_states = recep.states.clone();
            for (flag, state) in changed.iter().zip(DISPLAYED_STATES) {
                if *flag && !recep.shown_states.iter().any(|s| s == state) {
                    recep.shown_states.push(state.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{IconCatalog, IconGeometry};
    use crate::ir::Episode;
    use crate::layout::entities::RenderContext;
    use crate::theme::Theme;

    fn scene_with_rooms(names: &[&str], config: &LayoutConfig) -> Scene {
        let episode = Episode {
            rooms: names.iter().map(|s| s.to_string()).collect(),
            recep_to_room: [("tv_0".to_string(), names[0].to_string())]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let catalog = IconCatalog::with_geometry([("tv_0", IconGeometry::solid(100.0, 100.0))]);
        Scene::build(&episode, &catalog, config, &mut RenderContext::new(&Theme::dark())).unwrap()
    }

    #[test]
    fn rows_respect_target_width() {
        let mut config = LayoutConfig::default();
        config.scene.target_width = 800.0;
        let mut scene = scene_with_rooms(&["a_0", "b_0", "c_0", "d_0", "e_0"], &config);
        let order: Vec<usize> = (0..5).collect();
        let pass = pack_rows(&mut scene, &order, 0.0, &config);
        assert_eq!(pass.rooms.len(), 5);
        let mut rows: Vec<(f32, f32)> = Vec::new();
        for room in &pass.rooms {
            match rows.iter_mut().find(|(y, _)| *y == room.rect.y) {
                Some(row) => row.1 += room.rect.width,
                None => rows.push((room.rect.y, room.rect.width)),
            }
        }
        assert!(rows.len() > 1);
        for (_, width) in rows {
            assert!(width <= config.scene.target_width + 1e-3);
        }
        assert!(pass.lower < pass.upper);
    }

    #[test]
    fn oversized_room_gets_its_own_row() {
        let mut config = LayoutConfig::default();
        config.scene.target_width = 100.0;
        let mut scene = scene_with_rooms(&["a_0", "b_0"], &config);
        let pass = pack_rows(&mut scene, &[0, 1], -50.0, &config);
        assert_eq!(pass.rooms.len(), 2);
        assert!(pass.rooms[1].rect.y < pass.rooms[0].rect.y);
        assert_eq!(pass.upper, -50.0);
    }

    #[test]
    fn rooms_in_a_row_share_height() {
        let config = LayoutConfig::default();
        let mut scene = scene_with_rooms(&["a_0", "b_0"], &config);
        let pass = pack_rows(&mut scene, &[0, 1], 0.0, &config);
        assert_eq!(pass.rooms[0].rect.height, pass.rooms[1].rect.height);
        assert_eq!(pass.rooms[0].rect.y, pass.lower);
    }

    #[test]
    fn receptacle_state_change_adds_a_line() {
        let config = LayoutConfig::default();
        let mut scene = scene_with_rooms(&["a_0", "b_0"], &config);
        scene.receptacles[0].states.insert("is_powered_on".into(), true);
        let before = scene.room_size(1, &config).height;
        let pass = pack_rows(&mut scene, &[0, 1], 0.0, &config);
        assert_eq!(scene.rooms[1].num_state_lines, 1);
        assert_eq!(
            pass.rooms[1].rect.height,
            before + config.room.per_receptacle_state_padding
        );
        assert_eq!(pass.rooms[0].receptacles[0].state_lines.len(), 1);
    }

    #[test]
    fn mentioned_rooms_lead() {
        let config = LayoutConfig::default();
        let scene = scene_with_rooms(&["a_0", "b_0", "c_0"], &config);
        let mentioned: BTreeSet<usize> = [2].into_iter().collect();
        assert_eq!(room_order(&scene, &mentioned), vec![2, 0, 1]);
    }
}
