use crate::config::LayoutConfig;

use super::entities::{DISPLAYED_STATES, RoomSize, Scene};
use super::text::{LINE_HEIGHT_RATIO, label, wrap_text};
use super::types::{
    ObjectLayout, PlaceholderKind, PlaceholderLayout, Point, ReceptacleLayout, Rect, RoomLayout,
    StateBadge, StateLine, TextLayout,
};

pub(super) fn measure_room(scene: &Scene, room: usize, config: &LayoutConfig) -> RoomSize {
    let cfg = &config.room;
    let increment = config.object.stack_increment();
    let free = scene.free_objects(room);
    let receptacles = &scene.rooms[room].receptacles;

    let free_width = free.len() as f32 * config.object.width;
    let receptacle_width: f32 = receptacles
        .iter()
        .map(|&r| scene.receptacles[r].size.width)
        .sum();
    let min_width = cfg.min_width.max(free_width * cfg.min_width_per_object);
    let room_width = min_width.max(receptacle_width) + cfg.left_pad + cfg.right_pad;

    let base = if free.is_empty() {
        cfg.min_height
    } else {
        cfg.min_height * 2.0
    };
    let tallest_stack = receptacles
        .iter()
        .map(|&r| {
            let stacked = scene.stacked_objects(r).len() as f32;
            scene.receptacles[r].size.height + stacked * increment
        })
        .fold(0.0_f32, f32::max);
    let bottom_pad =
        cfg.bottom_pad + cfg.per_receptacle_state_padding * scene.rooms[room].num_state_lines as f32;
    let room_height = base.max(tallest_stack) + bottom_pad + cfg.top_pad;

    RoomSize {
        width: room_width + 2.0 * cfg.horizontal_margin,
        height: room_height + 2.0 * cfg.vertical_margin,
        room_width,
        room_height,
        bottom_pad,
    }
}

/// Where a room goes inside its row.
#[derive(Debug, Clone, Copy)]
pub(super) struct RoomSlot {
    /// Lower-left corner of the outer box.
    pub origin: Point,
    pub target_width: Option<f32>,
    /// Row-normalized inner height; the room's own height when `None`.
    pub room_height: Option<f32>,
}

pub(super) fn layout_room(
    scene: &mut Scene,
    room: usize,
    slot: RoomSlot,
    config: &LayoutConfig,
) -> RoomLayout {
    let cfg = &config.room;
    let size = scene.room_size(room, config);
    let room_height = slot.room_height.unwrap_or(size.room_height);
    let extra_pad = slot
        .target_width
        .map(|target| ((target - size.room_width - 2.0 * cfg.horizontal_margin) / 2.0).max(0.0))
        .unwrap_or(0.0);
    let room_width = size.room_width + 2.0 * extra_pad;
    let inner_origin = slot.origin.offset(cfg.horizontal_margin, cfg.vertical_margin);

    let receptacle_ids = scene.rooms[room].receptacles.clone();
    let total_width: f32 = receptacle_ids
        .iter()
        .map(|&r| scene.receptacles[r].size.width)
        .sum();
    let margin = cfg.receptacle_horizontal_margin_fraction * room_width;
    let spacing = (room_width - 2.0 * margin - total_width) / (receptacle_ids.len() as f32 + 1.0);
    let mut x = inner_origin.x + margin + spacing;
    let mut receptacles = Vec::with_capacity(receptacle_ids.len());
    let mut cursors = Vec::with_capacity(receptacle_ids.len());
    for &r in &receptacle_ids {
        let origin = Point::new(x, inner_origin.y + size.bottom_pad);
        let (layout, cursor) = layout_receptacle(scene, r, origin, config);
        x += scene.receptacles[r].size.width + spacing;
        receptacles.push(layout);
        cursors.push((r, cursor));
    }

    let lines = wrap_text(&scene.rooms[room].id, cfg.max_chars_per_line, false);
    let line_height = cfg.text_size * LINE_HEIGHT_RATIO;
    // Bottom of the label block sits in the lower quarter of the bottom pad.
    let label_bottom = inner_origin.y + size.bottom_pad / 4.0 / lines.len().max(1) as f32;
    let room_label = TextLayout {
        anchor: Point::new(
            inner_origin.x + room_width / 2.0,
            label_bottom + lines.len() as f32 * line_height / 2.0,
        ),
        lines,
        size: cfg.text_size,
        line_height,
    };

    let free = scene.free_objects(room);
    let free_width = free.len() as f32 * config.object.width;
    let margin = cfg.object_horizontal_margin_fraction * room_width;
    let spacing = (room_width - 2.0 * margin - free_width) / (free.len() as f32 + 1.0);
    let mut x = inner_origin.x + margin + spacing;
    let free_y = inner_origin.y + room_height * cfg.objects_height;
    let increment = config.object.stack_increment();

    let members: Vec<usize> = scene.objects_in_room(room).collect();
    let mut objects = Vec::with_capacity(members.len());
    for obj in members {
        let origin = match scene.stacked_on(obj) {
            Some(r) => {
                let Some(cursor) = cursors.iter_mut().find(|(idx, _)| *idx == r) else {
                    continue;
                };
                let origin = cursor.1;
                cursor.1.y += increment;
                origin
            }
            None => {
                let origin = Point::new(x, free_y);
                x += config.object.width + spacing;
                origin
            }
        };
        objects.push(layout_object(scene, obj, origin, config));
    }

    let anchor = Point::new(
        inner_origin.x + room_width / 2.0,
        inner_origin.y + cfg.placeholder_height * room_height,
    );
    let state = &scene.rooms[room];
    let placeholder = state.plot_placeholder.then(|| PlaceholderLayout {
        kind: PlaceholderKind::Center,
        rect: centered(anchor, cfg.placeholder.width, cfg.placeholder.height),
        visible: true,
    });

    RoomLayout {
        id: state.id.clone(),
        rect: Rect::new(
            slot.origin.x,
            slot.origin.y,
            room_width + 2.0 * cfg.horizontal_margin,
            room_height + 2.0 * cfg.vertical_margin,
        ),
        inner: Rect::new(inner_origin.x, inner_origin.y, room_width, room_height),
        label: room_label,
        in_proposition: state.in_proposition,
        bordered: state.in_proposition && !cfg.disable_in_proposition_room_border,
        anchor,
        placeholder,
        receptacles,
        objects,
    }
}

fn centered(center: Point, width: f32, height: f32) -> Rect {
    Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height)
}

/// Lays out one receptacle at `origin` and returns the first stacking position.
pub(super) fn layout_receptacle(
    scene: &Scene,
    receptacle: usize,
    origin: Point,
    config: &LayoutConfig,
) -> (ReceptacleLayout, Point) {
    let cfg = &config.receptacle;
    let recep = &scene.receptacles[receptacle];
    let size = recep.size;
    let ph = &cfg.placeholder;
    let mid_x = origin.x + size.width / 2.0;

    let center_rect = centered(
        Point::new(mid_x, origin.y + size.center_height),
        ph.width,
        ph.height,
    );
    let top_rect = centered(
        Point::new(mid_x, origin.y + size.top_height + cfg.placeholder_margin),
        ph.width,
        ph.height,
    );

    let (mut want_top, mut want_center) = (recep.plot_top, recep.plot_center);
    if want_top && recep.support.is_same {
        want_top = false;
        want_center = true;
    }
    let top_visible = want_top && recep.support.is_on_top;
    let center_visible = want_center && recep.support.is_inside;

    let mut cursor = Point::new(
        top_rect.x,
        top_rect.y + config.object.text_margin.abs() + config.object.bottom_text_extra_margin,
    );
    if top_visible {
        cursor.y += ph.height;
    }

    let state_lines = recep
        .shown_states
        .iter()
        .filter_map(|state| {
            recep.states.get(state).map(|&value| StateLine {
                state: state.clone(),
                value,
            })
        })
        .collect();

    let layout = ReceptacleLayout {
        id: recep.id.clone(),
        rect: Rect::new(origin.x, origin.y, size.width, size.height),
        icon: Rect::new(origin.x + cfg.horizontal_margin, origin.y, size.icon_width, size.height),
        icon_path: recep.icon_path.clone(),
        label: label(
            &recep.id,
            config.object.max_chars_per_line,
            Point::new(mid_x, origin.y - cfg.text_size * 1.5),
            cfg.text_size,
        ),
        top: PlaceholderLayout {
            kind: PlaceholderKind::Top,
            rect: top_rect,
            visible: top_visible,
        },
        center: PlaceholderLayout {
            kind: PlaceholderKind::Center,
            rect: center_rect,
            visible: center_visible,
        },
        state_lines,
    };
    (layout, cursor)
}

/// Places an object box and records which displayed states changed since last drawn.
pub(super) fn layout_object(
    scene: &mut Scene,
    object: usize,
    origin: Point,
    config: &LayoutConfig,
) -> ObjectLayout {
    let cfg = &config.object;
    let obj = &mut scene.objects[object];
    let rect = Rect::new(origin.x, origin.y, cfg.width, cfg.height);
    let center = rect.center();

    let badge_w = cfg.state_rect_ratio * cfg.width;
    let badge_h = cfg.state_rect_ratio * cfg.height;
    let badge_gap = 0.1 * cfg.height;
    let shown: Vec<(&str, bool)> = DISPLAYED_STATES
        .iter()
        .filter_map(|&state| obj.states.get(state).map(|&value| (state, value)))
        .collect();
    let total = shown.len() as f32 * badge_h + (shown.len() as f32 - 1.0).max(0.0) * badge_gap;
    let mut y = center.y - total / 2.0;
    let mut states = Vec::with_capacity(shown.len());
    for (state, value) in shown {
        states.push(StateBadge {
            state: state.to_string(),
            value,
            changed: obj.previous_states.get(state) != Some(&value),
            rect: Rect::new(origin.x + cfg.width + badge_w / 2.0, y, badge_w, badge_h),
        });
        y += badge_h + badge_gap;
    }
    obj.previous_states = obj.states.clone();

    ObjectLayout {
        id: obj.id.clone(),
        rect,
        center,
        color: obj.color.clone(),
        label: label(
            &obj.id,
            cfg.max_chars_per_line,
            center.offset(0.0, cfg.text_margin),
            cfg.text_size,
        ),
        on_floor: obj.is_on_floor,
        states,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{IconCatalog, IconGeometry};
    use crate::ir::Episode;
    use crate::layout::entities::RenderContext;
    use crate::theme::Theme;
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn scene(episode: &Episode, config: &LayoutConfig) -> Scene {
        let catalog = IconCatalog::with_geometry([
            ("counter_0", IconGeometry::solid(200.0, 100.0)),
            ("table_0", IconGeometry::solid(100.0, 100.0)),
        ]);
        let mut ctx = RenderContext::new(&Theme::dark());
        Scene::build(episode, &catalog, config, &mut ctx).unwrap()
    }

    fn small_config() -> LayoutConfig {
        let mut config = LayoutConfig::default();
        config.room.min_height = 100.0;
        config.receptacle.target_height = 120.0;
        config
    }

    #[test]
    fn empty_room_is_minimum_size() {
        let config = LayoutConfig::default();
        let episode = Episode {
            rooms: vec!["hall_0".into()],
            ..Default::default()
        };
        let scene = scene(&episode, &config);
        let size = scene.room_size(0, &config);
        let room = &config.room;
        assert_eq!(size.room_width, room.min_width + room.left_pad + room.right_pad);
        assert_eq!(
            size.room_height,
            room.min_height + room.bottom_pad + room.top_pad
        );
        assert_eq!(size.height, size.room_height + 2.0 * room.vertical_margin);
    }

    #[test]
    fn one_stacked_object_adds_one_increment() {
        let config = small_config();
        let episode = Episode {
            rooms: vec!["kitchen_0".into()],
            recep_to_room: map(&[("counter_0", "kitchen_0")]),
            object_to_room: map(&[("apple_0", "kitchen_0")]),
            object_to_recep: map(&[("apple_0", "counter_0")]),
            ..Default::default()
        };
        let scene = scene(&episode, &config);
        let size = scene.room_size(0, &config);
        let expected = 120.0 + config.object.stack_increment();
        assert_eq!(
            size.room_height,
            expected + config.room.bottom_pad + config.room.top_pad
        );
    }

    #[test]
    fn free_object_doubles_base_height() {
        let config = LayoutConfig::default();
        let episode = Episode {
            rooms: vec!["kitchen_0".into()],
            object_to_room: map(&[("apple_0", "kitchen_0")]),
            object_to_recep: map(&[("apple_0", "floor_kitchen_0")]),
            ..Default::default()
        };
        let scene = scene(&episode, &config);
        assert_eq!(scene.free_objects(0), vec![0]);
        let size = scene.room_size(0, &config);
        assert_eq!(
            size.room_height,
            2.0 * config.room.min_height + config.room.bottom_pad + config.room.top_pad
        );
    }

    #[test]
    fn width_covers_receptacles() {
        let mut config = small_config();
        config.room.min_width = 50.0;
        let episode = Episode {
            rooms: vec!["kitchen_0".into()],
            recep_to_room: map(&[("counter_0", "kitchen_0"), ("table_0", "kitchen_0")]),
            ..Default::default()
        };
        let scene = scene(&episode, &config);
        let size = scene.room_size(0, &config);
        let receptacles: f32 = scene.receptacles.iter().map(|r| r.size.width).sum();
        assert_eq!(
            size.room_width,
            receptacles + config.room.left_pad + config.room.right_pad
        );
    }

    #[test]
    fn stacked_object_sits_above_top_placeholder() {
        let config = small_config();
        let episode = Episode {
            rooms: vec!["kitchen_0".into()],
            recep_to_room: map(&[("counter_0", "kitchen_0")]),
            object_to_room: map(&[("apple_0", "kitchen_0")]),
            object_to_recep: map(&[("apple_0", "counter_0")]),
            ..Default::default()
        };
        let mut scene = scene(&episode, &config);
        scene.receptacles[0].plot_top = true;
        let layout = layout_room(
            &mut scene,
            0,
            RoomSlot {
                origin: Point::new(0.0, 0.0),
                target_width: None,
                room_height: None,
            },
            &config,
        );
        let recep = &layout.receptacles[0];
        assert!(recep.top.visible);
        let apple = &layout.objects[0];
        let expected_y = recep.top.rect.y
            + config.object.text_margin.abs()
            + config.object.bottom_text_extra_margin
            + config.receptacle.placeholder.height;
        assert_eq!(apple.rect.y, expected_y);
        assert_eq!(recep.rect.y, layout.inner.y + config.room.bottom_pad);
    }

    #[test]
    fn target_width_pads_symmetrically() {
        let config = LayoutConfig::default();
        let episode = Episode {
            rooms: vec!["hall_0".into()],
            ..Default::default()
        };
        let mut scene = scene(&episode, &config);
        let natural = scene.room_size(0, &config);
        let layout = layout_room(
            &mut scene,
            0,
            RoomSlot {
                origin: Point::new(0.0, 0.0),
                target_width: Some(natural.width + 100.0),
                room_height: None,
            },
            &config,
        );
        assert_eq!(layout.rect.width, natural.width + 100.0);
        assert_eq!(layout.inner.width, natural.room_width + 100.0);
    }

    #[test]
    fn state_badges_flag_changes_once() {
        let config = LayoutConfig::default();
        let mut states = BTreeMap::new();
        states.insert(
            "cup_0".to_string(),
            [("is_clean".to_string(), false)].into_iter().collect(),
        );
        let episode = Episode {
            rooms: vec!["kitchen_0".into()],
            object_to_room: map(&[("cup_0", "kitchen_0")]),
            object_to_states: states,
            ..Default::default()
        };
        let mut scene = scene(&episode, &config);
        scene.objects[0].states.insert("is_clean".into(), true);
        let first = layout_object(&mut scene, 0, Point::new(0.0, 0.0), &config);
        assert!(first.states[0].changed);
        let second = layout_object(&mut scene, 0, Point::new(0.0, 0.0), &config);
        assert!(!second.states[0].changed);
    }
}
