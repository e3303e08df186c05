mod entities;
mod legend;
mod propagation;
mod room;
mod routing;
mod rows;
mod temporal;
mod text;
pub(crate) mod types;

pub use propagation::{Assignment, narrow_same_args, propagate};
pub use routing::{Curve, quadratic_curve};
pub use temporal::toposort_levels;
pub use types::*;

use std::collections::HashMap;

use crate::assets::IconCatalog;
use crate::config::LayoutConfig;
use crate::error::{Result, SchemaError};
use crate::ir::{Episode, Proposition};
use crate::theme::Theme;

use entities::{RenderContext, Scene};
use legend::{LegendBound, LegendGraph};
use room::{RoomSlot, layout_object, layout_receptacle, layout_room};

/// Lays out an episode: one diagram with every level stacked, or one diagram
/// per level when `single_image` is false and the episode has several levels.
pub fn compute_layout(
    episode: &Episode,
    catalog: &IconCatalog,
    config: &LayoutConfig,
    theme: &Theme,
    single_image: bool,
) -> Result<Vec<DiagramLayout>> {
    layout_episode(episode, catalog, config, theme, single_image)
        .map_err(|err| err.in_episode(&episode.episode_id))
}

fn layout_episode(
    episode: &Episode,
    catalog: &IconCatalog,
    config: &LayoutConfig,
    theme: &Theme,
    single_image: bool,
) -> Result<Vec<DiagramLayout>> {
    let mut ctx = RenderContext::new(theme);
    let mut scene = Scene::build(episode, catalog, config, &mut ctx)?;

    let count = episode.propositions.len();
    let mut levels = match episode.temporal_edges() {
        Some(edges) => toposort_levels(count, edges)?,
        None => vec![(0..count).collect()],
    };
    if levels.is_empty() {
        levels.push(Vec::new());
    }
    let separate = !single_image && levels.len() > 1;
    tracing::debug!(
        episode_id = %episode.episode_id,
        levels = levels.len(),
        separate,
        "computing layout"
    );

    let level_layouts = temporal::run_levels(&mut scene, episode, &levels, config, &ctx, separate);

    let mut level_legends: Vec<(usize, LegendGraph)> = Vec::new();
    for level in &level_layouts {
        let props: Vec<&Proposition> = level
            .propositions
            .iter()
            .filter_map(|&i| episode.propositions.get(i))
            .collect();
        if let Some(graph) = legend::next_to_graph(&props)? {
            level_legends.push((level.index, graph));
        }
    }
    let same: Vec<_> = episode.same_arg_constraints().collect();
    let different: Vec<_> = episode.different_arg_constraints().collect();
    let scene_legends: Vec<LegendGraph> = [
        legend::arg_graph(LegendKind::SameArg, &same),
        legend::arg_graph(LegendKind::DifferentArg, &different),
    ]
    .into_iter()
    .flatten()
    .collect();

    let images: Vec<Vec<LevelLayout>> = if separate {
        level_layouts.into_iter().map(|level| vec![level]).collect()
    } else {
        vec![level_layouts]
    };
    let mut diagrams = Vec::with_capacity(images.len());
    for (k, levels) in images.into_iter().enumerate() {
        let legends: Vec<(LegendBound, &LegendGraph)> = level_legends
            .iter()
            .filter(|(index, _)| levels.iter().any(|level| level.index == *index))
            .map(|(index, graph)| (LegendBound::Level(*index), graph))
            .chain(scene_legends.iter().map(|graph| (LegendBound::Scene, graph)))
            .collect();
        let step = separate.then_some(k + 1);
        diagrams.push(compose(&scene, levels, &legends, step, config, &mut ctx));
    }
    Ok(diagrams)
}

/// A lone object box, as drawn inside a room.
pub fn layout_single_object(
    object_id: &str,
    config: &LayoutConfig,
    theme: &Theme,
) -> Result<DiagramLayout> {
    let episode = Episode {
        object_to_room: [(object_id.to_string(), String::new())].into_iter().collect(),
        ..Default::default()
    };
    let mut ctx = RenderContext::new(theme);
    let mut scene = Scene::build(&episode, &IconCatalog::default(), config, &mut ctx)?;
    let object = layout_object(&mut scene, 0, Point::default(), config);
    let level = preview_level(object.rect, Vec::new(), vec![object], Vec::new());
    Ok(compose(&scene, vec![level], &[], None, config, &mut ctx))
}

/// A lone receptacle icon with both placeholders shown.
pub fn layout_single_receptacle(
    receptacle_id: &str,
    catalog: &IconCatalog,
    config: &LayoutConfig,
    theme: &Theme,
) -> Result<DiagramLayout> {
    const PREVIEW_ROOM: &str = "preview_room_0";
    let episode = Episode {
        rooms: vec![PREVIEW_ROOM.to_string()],
        recep_to_room: [(receptacle_id.to_string(), PREVIEW_ROOM.to_string())]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let mut ctx = RenderContext::new(theme);
    let mut scene = Scene::build(&episode, catalog, config, &mut ctx)?;
    for recep in &mut scene.receptacles {
        recep.plot_top = true;
        recep.plot_center = true;
    }
    let (receptacle, _) = layout_receptacle(&scene, 0, Point::default(), config);
    let level = preview_level(receptacle.rect, Vec::new(), Vec::new(), vec![receptacle]);
    Ok(compose(&scene, vec![level], &[], None, config, &mut ctx))
}

/// One room of an episode with its receptacles and the objects that start in it.
pub fn layout_single_room(
    episode: &Episode,
    room_id: &str,
    catalog: &IconCatalog,
    config: &LayoutConfig,
    theme: &Theme,
) -> Result<DiagramLayout> {
    if !episode.rooms.iter().any(|room| room == room_id) {
        return Err(SchemaError::UnknownHandle {
            kind: "room",
            handle: room_id.to_string(),
        }
        .into());
    }
    let in_room = |map: &std::collections::BTreeMap<String, String>| {
        map.iter()
            .filter(|(_, room)| *room == room_id)
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect()
    };
    let episode = Episode {
        episode_id: episode.episode_id.clone(),
        rooms: vec![room_id.to_string()],
        object_to_room: in_room(&episode.object_to_room),
        recep_to_room: in_room(&episode.recep_to_room),
        object_to_recep: episode.object_to_recep.clone(),
        object_to_states: episode.object_to_states.clone(),
        ..Default::default()
    };
    let mut ctx = RenderContext::new(theme);
    let mut scene = Scene::build(&episode, catalog, config, &mut ctx)?;
    let room = layout_room(
        &mut scene,
        0,
        RoomSlot {
            origin: Point::default(),
            target_width: None,
            room_height: None,
        },
        config,
    );
    let level = preview_level(room.rect, vec![room], Vec::new(), Vec::new());
    Ok(compose(&scene, vec![level], &[], None, config, &mut ctx))
}

fn preview_level(
    extent: Rect,
    rooms: Vec<RoomLayout>,
    objects: Vec<ObjectLayout>,
    receptacles: Vec<ReceptacleLayout>,
) -> LevelLayout {
    LevelLayout {
        index: 0,
        propositions: Vec::new(),
        lower: extent.y,
        upper: extent.top(),
        rooms,
        connectors: Vec::new(),
        unplaced: Vec::new(),
        objects,
        receptacles,
    }
}

/// Places legends next to the rooms, then sizes the canvas and adds the
/// dividers, the instruction and the step badge.
fn compose(
    scene: &Scene,
    levels: Vec<LevelLayout>,
    legends: &[(LegendBound, &LegendGraph)],
    step: Option<usize>,
    config: &LayoutConfig,
    ctx: &mut RenderContext,
) -> DiagramLayout {
    let scene_width = levels
        .iter()
        .flat_map(|level| level.rooms.iter().map(|room| room.rect.right()))
        .fold(0.0_f32, f32::max);

    let mut bands: HashMap<LegendBound, (f32, f32)> = HashMap::new();
    let mut lower = f32::INFINITY;
    let mut upper = f32::NEG_INFINITY;
    for level in &levels {
        bands.insert(LegendBound::Level(level.index), (level.lower, level.upper));
        lower = lower.min(level.lower);
        upper = upper.max(level.upper);
    }
    if lower <= upper {
        bands.insert(LegendBound::Scene, (lower, upper));
    }

    let legend_cfg = &config.legend;
    let slots: Vec<(LegendBound, f32)> = legends
        .iter()
        .map(|(bound, graph)| (*bound, graph.outer_height(config)))
        .collect();
    let origins = legend::arrange_columns(
        &slots,
        &bands,
        scene_width + legend_cfg.column_gap,
        legend_cfg.width + 2.0 * legend_cfg.horizontal_margin,
    );
    let legends: Vec<LegendLayout> = legends
        .iter()
        .zip(origins)
        .map(|((_, graph), origin)| legend::layout_legend(graph, origin, scene, config, ctx))
        .collect();

    let mut extent: Option<Rect> = None;
    let mut include = |rect: Rect| {
        extent = Some(match extent {
            Some(current) => current.union(&rect),
            None => rect,
        });
    };
    for level in &levels {
        level.rooms.iter().for_each(|room| include(room.rect));
        for object in &level.objects {
            include(object.rect);
            include(text_box(&object.label, object.rect.width));
        }
        for recep in &level.receptacles {
            include(recep.rect);
            include(text_box(&recep.label, recep.rect.width));
        }
    }
    legends.iter().for_each(|legend| include(legend.rect));
    let mut bounds = extent.unwrap_or_default();

    let margin = config.scene.temporal_scene_margin;
    let dividers = levels
        .iter()
        .take(levels.len().saturating_sub(1))
        .map(|level| Divider {
            y: level.lower - margin / 2.0,
            x1: bounds.x,
            x2: bounds.right(),
        })
        .collect();

    let scene_cfg = &config.scene;
    let instruction = (!scene.instruction.trim().is_empty()).then(|| {
        let lines = text::wrap_text(&scene.instruction, scene_cfg.max_chars_per_line, false);
        let height = lines.len() as f32 * scene_cfg.instruction_line_height;
        TextLayout {
            anchor: Point::new(
                bounds.x + bounds.width / 2.0,
                bounds.top() + scene_cfg.instruction_margin + height / 2.0,
            ),
            lines,
            size: scene_cfg.instruction_text_size,
            line_height: scene_cfg.instruction_line_height,
        }
    });
    if let Some(text) = &instruction {
        let height = text.lines.len() as f32 * text.line_height;
        bounds = bounds.union(&Rect::new(
            bounds.x,
            bounds.top(),
            bounds.width,
            scene_cfg.instruction_margin + height,
        ));
    }

    let step = step.map(|number| {
        let size = scene_cfg.step_badge_size;
        StepBadge {
            number,
            rect: Rect::new(
                bounds.x - size - scene_cfg.instruction_margin,
                bounds.top() - size,
                size,
                size,
            ),
        }
    });
    if let Some(badge) = &step {
        bounds = bounds.union(&badge.rect);
    }

    DiagramLayout {
        width: bounds.width,
        height: bounds.height,
        bounds,
        levels,
        legends,
        dividers,
        instruction,
        step,
    }
}

/// Box taken by a text block centered on its anchor.
fn text_box(text: &TextLayout, min_width: f32) -> Rect {
    let height = text.lines.len() as f32 * text.line_height;
    let widest = text
        .lines
        .iter()
        .map(|line| line.chars().count())
        .max()
        .unwrap_or(0) as f32;
    let width = min_width.max(widest * text.size * 0.6);
    Rect::new(
        text.anchor.x - width / 2.0,
        text.anchor.y - height / 2.0,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::IconGeometry;
    use crate::ir::{Constraint, EntityRef};
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn catalog() -> IconCatalog {
        IconCatalog::with_geometry([
            ("counter_0", IconGeometry::solid(200.0, 100.0)),
            ("fridge_0", IconGeometry::solid(100.0, 200.0).with_top(180.0)),
            ("table_0", IconGeometry::solid(100.0, 100.0)),
        ])
    }

    // The counter stands taller than the room minimum, so stacked objects
    // drive the room height in these tests.
    fn config() -> LayoutConfig {
        let mut config = LayoutConfig::default();
        config.room.min_height = 100.0;
        config.receptacle.target_height = 120.0;
        config
    }

    fn kitchen(with_apple: bool) -> Episode {
        let mut episode = Episode {
            episode_id: "1".into(),
            rooms: vec!["kitchen_0".into()],
            recep_to_room: map(&[("counter_0", "kitchen_0")]),
            propositions: vec![Proposition::on_top(&["apple_0"], &["counter_0"], 1)],
            ..Default::default()
        };
        if with_apple {
            episode.object_to_room = map(&[("apple_0", "kitchen_0")]);
            episode.object_to_recep = map(&[("apple_0", "counter_0")]);
        }
        episode
    }

    #[test]
    fn apple_on_counter_adds_one_stack_increment() {
        let config = config();
        let theme = Theme::dark();
        let with = compute_layout(&kitchen(true), &catalog(), &config, &theme, true).unwrap();
        let without = compute_layout(&kitchen(false), &catalog(), &config, &theme, true).unwrap();
        assert_eq!(with.len(), 1);

        let room = &with[0].levels[0].rooms[0];
        let baseline = &without[0].levels[0].rooms[0];
        let grown = room.inner.height - baseline.inner.height;
        assert!((grown - config.object.stack_increment()).abs() < 1e-3);

        let apple = &room.objects[0];
        let counter = &room.receptacles[0];
        assert!(apple.rect.y > counter.rect.top());

        let connectors = &with[0].levels[0].connectors;
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].style, crate::ir::LineStyle::Solid);
        assert!(connectors[0].label.is_none());
        assert_eq!(connectors[0].to, counter.top.center());
    }

    #[test]
    fn room_minimum_absorbs_a_short_stack() {
        let mut config = config();
        config.room.min_height = 1000.0;
        let theme = Theme::dark();
        let with = compute_layout(&kitchen(true), &catalog(), &config, &theme, true).unwrap();
        let without = compute_layout(&kitchen(false), &catalog(), &config, &theme, true).unwrap();
        let room = &with[0].levels[0].rooms[0];
        let baseline = &without[0].levels[0].rooms[0];
        assert!((room.inner.height - baseline.inner.height).abs() < 1e-3);
    }

    #[test]
    fn next_to_legend_sits_right_of_the_rooms() {
        let episode = Episode {
            episode_id: "2".into(),
            rooms: vec!["kitchen_0".into()],
            recep_to_room: map(&[("fridge_0", "kitchen_0")]),
            object_to_room: map(&[("apple_0", "kitchen_0"), ("pear_0", "kitchen_0")]),
            propositions: vec![
                Proposition::inside(&["apple_0", "pear_0"], &["fridge_0"], 2),
                Proposition::next_to(
                    vec![EntityRef::object("apple_0")],
                    vec![EntityRef::object("pear_0")],
                    1,
                ),
            ],
            ..Default::default()
        };
        let config = config();
        let diagrams = compute_layout(&episode, &catalog(), &config, &Theme::dark(), true).unwrap();
        let diagram = &diagrams[0];
        assert_eq!(diagram.legends.len(), 1);
        let legend = &diagram.legends[0];
        assert_eq!(legend.kind, LegendKind::NextTo);
        assert_eq!(legend.vertices.len(), 2);
        assert_eq!(legend.edges.len(), 1);
        let rooms_right = diagram.levels[0].rooms[0].rect.right();
        assert!(legend.rect.x >= rooms_right + config.legend.column_gap);
        assert!(diagram.bounds.right() >= legend.rect.right());
        // Both objects bound by is_inside: two solid connectors labelled "2".
        let connectors = &diagram.levels[0].connectors;
        assert_eq!(connectors.len(), 2);
        assert!(connectors.iter().all(|c| c.label.as_ref().map(|(_, n)| n.as_str()) == Some("2")));
    }

    #[test]
    fn separate_images_get_step_badges() {
        let mut episode = kitchen(true);
        episode.recep_to_room = map(&[("counter_0", "kitchen_0"), ("table_0", "kitchen_0")]);
        episode.propositions.push(Proposition::on_top(&["apple_0"], &["table_0"], 1));
        episode.constraints = vec![Constraint::Temporal {
            dag_edges: vec![(0, 1)],
        }];
        let config = config();
        let separate = compute_layout(&episode, &catalog(), &config, &Theme::dark(), false).unwrap();
        assert_eq!(separate.len(), 2);
        assert_eq!(separate[1].step.map(|s| s.number), Some(2));
        assert!(separate.iter().all(|d| d.dividers.is_empty()));

        let single = compute_layout(&episode, &catalog(), &config, &Theme::dark(), true).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].levels.len(), 2);
        assert_eq!(single[0].dividers.len(), 1);
        assert!(single[0].step.is_none());
    }

    #[test]
    fn instruction_sits_above_the_rooms() {
        let mut episode = kitchen(true);
        episode.instruction = "Put the apple on the counter.".into();
        let config = config();
        let diagrams = compute_layout(&episode, &catalog(), &config, &Theme::dark(), true).unwrap();
        let diagram = &diagrams[0];
        let text = diagram.instruction.as_ref().unwrap();
        let room_top = diagram.levels[0].rooms[0].rect.top();
        assert!(text.anchor.y > room_top);
        assert!(diagram.bounds.top() >= text.anchor.y);
    }

    #[test]
    fn cyclic_temporal_constraint_fails() {
        let mut episode = kitchen(true);
        episode.propositions.push(Proposition::on_floor(&["apple_0"]));
        episode.constraints = vec![Constraint::Temporal {
            dag_edges: vec![(0, 1), (1, 0)],
        }];
        let err = compute_layout(&episode, &catalog(), &config(), &Theme::dark(), true).unwrap_err();
        assert_eq!(err.episode_id(), Some(episode.episode_id.as_str()));
        assert!(matches!(
            err.kind(),
            crate::error::PredivizError::Schema(SchemaError::TemporalCycle(_))
        ));
    }

    #[test]
    fn single_room_preview_keeps_its_contents() {
        let episode = kitchen(true);
        let diagram =
            layout_single_room(&episode, "kitchen_0", &catalog(), &config(), &Theme::dark()).unwrap();
        let room = &diagram.levels[0].rooms[0];
        assert_eq!(room.receptacles.len(), 1);
        assert_eq!(room.objects.len(), 1);
        assert!(layout_single_room(&episode, "attic_0", &catalog(), &config(), &Theme::dark()).is_err());
    }

    #[test]
    fn single_entity_previews() {
        let config = config();
        let object = layout_single_object("apple_0", &config, &Theme::dark()).unwrap();
        assert_eq!(object.levels[0].objects.len(), 1);
        assert!(object.width >= config.object.width);

        let recep =
            layout_single_receptacle("fridge_0", &catalog(), &config, &Theme::dark()).unwrap();
        let drawn = &recep.levels[0].receptacles[0];
        assert!(drawn.top.visible && drawn.center.visible);
        assert!(layout_single_receptacle("sofa_0", &catalog(), &config, &Theme::dark()).is_err());
    }
}
