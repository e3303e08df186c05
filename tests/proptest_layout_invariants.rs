//! Property-based invariant tests for the diagram layout engine.
//!
//! 1. Stacking another object on a receptacle never shrinks its room.
//! 2. A row holding more than one room never exceeds the target width.
//! 3. Every temporal edge goes from an earlier level to a later one.
//! 4. Propagating a level's propositions twice changes nothing.
//! 5. Every is_next_to legend edge joins the two legend columns.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use prediviz::assets::{IconCatalog, IconGeometry};
use prediviz::config::LayoutConfig;
use prediviz::ir::{EntityRef, Episode, Proposition};
use prediviz::layout::{DiagramLayout, LegendKind, compute_layout, propagate, toposort_levels};
use prediviz::theme::Theme;
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn map(pairs: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}

fn single_image(episode: &Episode, catalog: &IconCatalog) -> DiagramLayout {
    let mut diagrams = compute_layout(
        episode,
        catalog,
        &LayoutConfig::default(),
        &Theme::dark(),
        true,
    )
    .expect("layout failed");
    assert_eq!(diagrams.len(), 1);
    diagrams.remove(0)
}

fn stacked_kitchen(apples: usize) -> Episode {
    let ids: Vec<String> = (0..apples).map(|i| format!("apple_{i}")).collect();
    Episode {
        episode_id: "stack".into(),
        rooms: vec!["kitchen_0".into()],
        object_to_room: map(ids.iter().map(|id| (id.clone(), "kitchen_0".to_string()))),
        recep_to_room: map([("counter_0".to_string(), "kitchen_0".to_string())]),
        object_to_recep: map(ids.iter().map(|id| (id.clone(), "counter_0".to_string()))),
        propositions: vec![Proposition::on_top(&["apple_0"], &["counter_0"], 1)],
        ..Default::default()
    }
}

/// Random DAG: edges only run from a lower index to a higher one.
fn dag_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|n| {
        let edge = (0..n - 1).prop_flat_map(move |from| (Just(from), from + 1..n));
        (Just(n), prop::collection::vec(edge, 0..20))
    })
}

fn placement_strategy() -> impl Strategy<Value = Proposition> {
    let objects = ["apple_0", "cup_0", "book_0", "toy_0"];
    let receptacles = ["table_0", "shelf_0", "sink_0"];
    let rooms = ["kitchen_0", "bedroom_0"];
    prop_oneof![
        (0..objects.len(), 0..receptacles.len())
            .prop_map(move |(o, r)| Proposition::on_top(&[objects[o]], &[receptacles[r]], 1)),
        (0..objects.len(), 0..receptacles.len())
            .prop_map(move |(o, r)| Proposition::inside(&[objects[o]], &[receptacles[r]], 1)),
        (0..objects.len(), 0..rooms.len())
            .prop_map(move |(o, r)| Proposition::in_room(&[objects[o]], &[rooms[r]], 1)),
        (0..objects.len()).prop_map(move |o| Proposition::on_floor(&[objects[o]])),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Sizing monotonicity
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn stacking_never_shrinks_the_room(apples in 1usize..7) {
        let catalog = IconCatalog::with_geometry([("counter_0", IconGeometry::solid(120.0, 90.0))]);
        let height = |n: usize| {
            let diagram = single_image(&stacked_kitchen(n), &catalog);
            diagram.levels[0].rooms[0].inner.height
        };
        prop_assert!(height(apples + 1) >= height(apples));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Row width bound
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn shared_rows_fit_the_target_width(
        rooms in prop::collection::vec(prop::collection::vec(40.0f32..400.0, 0..4), 1..8),
    ) {
        let mut episode = Episode {
            episode_id: "rows".into(),
            ..Default::default()
        };
        let mut icons = Vec::new();
        for (r, widths) in rooms.iter().enumerate() {
            let room = format!("room_{r}");
            episode.rooms.push(room.clone());
            episode.object_to_room.insert(format!("ball_{r}"), room.clone());
            for (i, &width) in widths.iter().enumerate() {
                let id = format!("bench_{r}_{i}");
                episode.recep_to_room.insert(id.clone(), room.clone());
                icons.push((id, IconGeometry::solid(width, 80.0)));
            }
        }
        let catalog = IconCatalog::with_geometry(icons);
        let diagram = single_image(&episode, &catalog);

        let target = LayoutConfig::default().scene.target_width;
        let mut rows: HashMap<u32, (usize, f32)> = HashMap::new();
        for room in &diagram.levels[0].rooms {
            let row = rows.entry(room.rect.y.to_bits()).or_insert((0, 0.0));
            row.0 += 1;
            row.1 += room.rect.width;
        }
        for (count, width) in rows.values() {
            if *count > 1 {
                prop_assert!(*width <= target + 0.5, "row of {} rooms is {} wide", count, width);
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Level ordering
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn edges_point_to_later_levels((n, edges) in dag_strategy()) {
        let levels = toposort_levels(n, &edges).expect("acyclic by construction");
        let mut level_of = vec![usize::MAX; n];
        for (depth, level) in levels.iter().enumerate() {
            for &index in level {
                prop_assert_eq!(level_of[index], usize::MAX, "index {} listed twice", index);
                level_of[index] = depth;
            }
        }
        prop_assert!(level_of.iter().all(|&depth| depth != usize::MAX));
        for &(from, to) in &edges {
            prop_assert!(level_of[from] < level_of[to]);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Propagation idempotence
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn propagation_is_idempotent(
        propositions in prop::collection::vec(placement_strategy(), 0..8),
    ) {
        let recep = map([
            ("apple_0".to_string(), "table_0".to_string()),
            ("book_0".to_string(), "shelf_0".to_string()),
        ]);
        let room = map([
            ("apple_0".to_string(), "kitchen_0".to_string()),
            ("cup_0".to_string(), "kitchen_0".to_string()),
            ("book_0".to_string(), "bedroom_0".to_string()),
            ("toy_0".to_string(), "bedroom_0".to_string()),
        ]);
        let once = propagate(&recep, &room, &propositions);
        let twice = propagate(&once.object_to_recep, &once.object_to_room, &propositions);
        prop_assert_eq!(&once.object_to_recep, &twice.object_to_recep);
        prop_assert_eq!(&once.object_to_room, &twice.object_to_room);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Bipartite invariant
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn next_to_edges_cross_sides(
        pairs in prop::collection::vec((0usize..4, 0usize..4), 1..10),
    ) {
        // Pairs always join a "left_" object to a "right_" object, so the
        // graph is bipartite by construction.
        let mut objects = BTreeSet::new();
        let propositions: Vec<Proposition> = pairs
            .iter()
            .map(|&(a, b)| {
                let left = format!("left_{a}");
                let right = format!("right_{b}");
                objects.insert(left.clone());
                objects.insert(right.clone());
                Proposition::next_to(vec![EntityRef::object(left)], vec![EntityRef::object(right)], 1)
            })
            .collect();
        let episode = Episode {
            episode_id: "pairs".into(),
            rooms: vec!["hall_0".into()],
            object_to_room: map(objects.iter().map(|id| (id.clone(), "hall_0".to_string()))),
            propositions,
            ..Default::default()
        };
        let diagram = single_image(&episode, &IconCatalog::default());
        let legend = diagram
            .legends
            .iter()
            .find(|legend| legend.kind == LegendKind::NextTo)
            .expect("next_to legend");
        prop_assert_eq!(legend.vertices.len(), objects.len());
        for edge in &legend.edges {
            prop_assert_ne!(legend.vertices[edge.from].side, legend.vertices[edge.to].side);
        }
    }
}
