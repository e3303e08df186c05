use std::collections::{HashMap, VecDeque};

use crate::config::LayoutConfig;
use crate::error::GeometryError;
use crate::ir::{ArgConstraint, EntityKind, EntityRef, LineStyle, Proposition, PropositionKind};

use super::entities::{RenderContext, Scene};
use super::text::label;
use super::types::{LegendEdge, LegendKind, LegendLayout, LegendSide, LegendVertex, Point, Rect, TextLayout};

/// Vertical band a legend is centered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(super) enum LegendBound {
    Level(usize),
    Scene,
}

/// Unpositioned legend: two vertex columns and the edges between them.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct LegendGraph {
    pub kind: LegendKind,
    pub vertices: Vec<(EntityRef, LegendSide)>,
    pub edges: Vec<LegendEdge>,
}

impl LegendGraph {
    fn side_count(&self, side: LegendSide) -> usize {
        self.vertices.iter().filter(|(_, s)| *s == side).count()
    }

    /// Height of the vertex area.
    pub fn height(&self, config: &LayoutConfig) -> f32 {
        let left = self.side_count(LegendSide::Left) as f32;
        let right = self.side_count(LegendSide::Right) as f32;
        (3.0 * left + 2.0).max(3.0 * right + 2.0) * config.object.height
    }

    /// Height of the whole box including the title pad.
    pub fn outer_height(&self, config: &LayoutConfig) -> f32 {
        self.height(config) + config.legend.top_pad + config.legend.bottom_pad
    }
}

/// Builds the is_next_to legend of one level, splitting every connected
/// component into two sides by BFS 2-coloring.
pub(super) fn next_to_graph(
    propositions: &[&Proposition],
) -> Result<Option<LegendGraph>, GeometryError> {
    let mut ids: Vec<EntityRef> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut intern = |entity: &EntityRef, ids: &mut Vec<EntityRef>| -> usize {
        *index.entry(entity.id.clone()).or_insert_with(|| {
            ids.push(entity.clone());
            ids.len() - 1
        })
    };

    let mut edges: Vec<(usize, usize, LineStyle)> = Vec::new();
    for prop in propositions.iter().filter(|p| p.kind == PropositionKind::IsNextTo) {
        let style = LineStyle::for_partial(prop.is_partial());
        for a in &prop.args.entities_a {
            intern(a, &mut ids);
        }
        for b in &prop.args.entities_b {
            let vb = intern(b, &mut ids);
            for a in &prop.args.entities_a {
                let va = intern(a, &mut ids);
                match edges
                    .iter_mut()
                    .find(|(x, y, _)| (*x, *y) == (va, vb) || (*x, *y) == (vb, va))
                {
                    Some(edge) => edge.2 = style,
                    None => edges.push((va, vb, style)),
                }
            }
        }
    }
    if ids.is_empty() {
        return Ok(None);
    }

    let mut adjacency = vec![Vec::new(); ids.len()];
    for &(a, b, _) in &edges {
        adjacency[a].push(b);
        adjacency[b].push(a);
    }
    let mut side: Vec<Option<LegendSide>> = vec![None; ids.len()];
    for start in 0..ids.len() {
        if side[start].is_some() {
            continue;
        }
        side[start] = Some(LegendSide::Left);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            let here = side[node];
            let opposite = match here {
                Some(LegendSide::Left) => LegendSide::Right,
                _ => LegendSide::Left,
            };
            for &next in &adjacency[node] {
                match side[next] {
                    None => {
                        side[next] = Some(opposite);
                        queue.push_back(next);
                    }
                    Some(s) if Some(s) == here => {
                        return Err(GeometryError::NotBipartite {
                            first: ids[node].id.clone(),
                            second: ids[next].id.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
    }

    Ok(Some(assemble(
        LegendKind::NextTo,
        ids.into_iter()
            .zip(side)
            .map(|(entity, side)| (entity, side.unwrap_or(LegendSide::Left)))
            .collect(),
        edges,
    )))
}

/// Builds one same-argument or different-argument legend. Each constraint is
/// its own section; the anchors of every entry go left, their corresponding
/// entities right.
pub(super) fn arg_graph(kind: LegendKind, constraints: &[&ArgConstraint]) -> Option<LegendGraph> {
    let mut vertices: Vec<(EntityRef, LegendSide)> = Vec::new();
    let mut edges: Vec<(usize, usize, LineStyle)> = Vec::new();
    for constraint in constraints {
        let mut section: HashMap<(LegendSide, String), usize> = HashMap::new();
        let mut intern =
            |entity: &EntityRef, side: LegendSide, vertices: &mut Vec<(EntityRef, LegendSide)>| {
                *section.entry((side, entity.id.clone())).or_insert_with(|| {
                    vertices.push((entity.clone(), side));
                    vertices.len() - 1
                })
            };
        for entry in &constraint.entries {
            for anchor in &entry.anchors {
                let a = intern(anchor, LegendSide::Left, &mut vertices);
                for other in &entry.corresponding {
                    let b = intern(other, LegendSide::Right, &mut vertices);
                    if !edges.iter().any(|&(x, y, _)| (x, y) == (a, b)) {
                        edges.push((a, b, entry.style));
                    }
                }
            }
        }
    }
    if vertices.is_empty() {
        return None;
    }

    Some(assemble(kind, vertices, edges))
}

fn assemble(
    kind: LegendKind,
    vertices: Vec<(EntityRef, LegendSide)>,
    edges: Vec<(usize, usize, LineStyle)>,
) -> LegendGraph {
    LegendGraph {
        kind,
        vertices,
        edges: edges
            .into_iter()
            .map(|(from, to, style)| LegendEdge { from, to, style })
            .collect(),
    }
}

/// Legend origins (lower-left of the column slot) for every legend, in input order.
///
/// Legends sharing a bound are spread over `ceil(total / budget)` columns,
/// each going to the currently shortest one, and every column is centered in
/// the band with even gaps. Scene-bound legends use columns after the ones
/// level-bound legends take.
pub(super) fn arrange_columns(
    legends: &[(LegendBound, f32)],
    bands: &HashMap<LegendBound, (f32, f32)>,
    first_x: f32,
    column_width: f32,
) -> Vec<Point> {
    let mut origins = vec![Point::default(); legends.len()];
    let mut bounds: Vec<LegendBound> = legends.iter().map(|(b, _)| *b).collect();
    bounds.sort();
    bounds.dedup();

    let mut level_columns = 0usize;
    for bound in bounds {
        let members: Vec<usize> = (0..legends.len())
            .filter(|&i| legends[i].0 == bound)
            .collect();
        let (lower, upper) = bands.get(&bound).copied().unwrap_or((0.0, 0.0));
        let budget = (upper - lower).max(f32::EPSILON);
        let total: f32 = members.iter().map(|&i| legends[i].1).sum();
        let count = ((total / budget).ceil() as usize).clamp(1, members.len());

        let mut columns: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut used = vec![0.0_f32; count];
        for &i in &members {
            let shortest = (0..count)
                .min_by(|&a, &b| used[a].total_cmp(&used[b]))
                .unwrap_or(0);
            columns[shortest].push(i);
            used[shortest] += legends[i].1;
        }

        let base = match bound {
            LegendBound::Level(_) => 0,
            LegendBound::Scene => level_columns,
        };
        for (c, column) in columns.iter().enumerate() {
            let gap = ((budget - used[c]) / (column.len() + 1) as f32).max(0.0);
            let x = first_x + (base + c) as f32 * column_width;
            let mut top = upper;
            for &i in column {
                top -= gap + legends[i].1;
                origins[i] = Point::new(x, top);
            }
        }
        if let LegendBound::Level(_) = bound {
            level_columns = level_columns.max(count);
        }
    }
    origins
}

/// Places a legend graph with its column slot's lower-left corner at `origin`.
pub(super) fn layout_legend(
    graph: &LegendGraph,
    origin: Point,
    scene: &Scene,
    config: &LayoutConfig,
    ctx: &mut RenderContext,
) -> LegendLayout {
    let legend = &config.legend;
    let height = graph.height(config);
    let rect = Rect::new(
        origin.x + legend.horizontal_margin,
        origin.y,
        legend.width,
        graph.outer_height(config),
    );
    let vertex_top = rect.y + legend.bottom_pad + height;

    let mut vertices = Vec::with_capacity(graph.vertices.len());
    for side in [LegendSide::Left, LegendSide::Right] {
        let column_x = match side {
            LegendSide::Left => rect.x + legend.width / 4.0,
            LegendSide::Right => rect.x + 3.0 * legend.width / 4.0,
        };
        let count = graph.side_count(side).max(1);
        let spacing = height / count as f32;
        let members = graph.vertices.iter().enumerate().filter(|(_, (_, s))| *s == side);
        for (slot, (idx, (entity, _))) in members.enumerate() {
            let center = Point::new(column_x, vertex_top - spacing / 2.0 - slot as f32 * spacing);
            vertices.push((idx, glyph(entity, side, center, scene, config, ctx)));
        }
    }
    vertices.sort_by_key(|(idx, _)| *idx);

    LegendLayout {
        kind: graph.kind,
        title: TextLayout {
            lines: vec![graph.kind.title().to_string()],
            anchor: Point::new(rect.x + legend.width / 2.0, rect.top() - legend.top_pad / 2.0),
            size: legend.text_size,
            line_height: legend.text_size * super::text::LINE_HEIGHT_RATIO,
        },
        rect,
        vertices: vertices.into_iter().map(|(_, v)| v).collect(),
        edges: graph.edges.clone(),
    }
}

fn glyph(
    entity: &EntityRef,
    side: LegendSide,
    center: Point,
    scene: &Scene,
    config: &LayoutConfig,
    ctx: &mut RenderContext,
) -> LegendVertex {
    let object = &config.object;
    let boxed = |w: f32, h: f32| Rect::new(center.x - w / 2.0, center.y - h / 2.0, w, h);
    let (rect, anchor, color, icon_path, max_chars, size) = match entity.kind {
        EntityKind::Object => (
            boxed(object.width, object.height),
            center,
            Some(ctx.object_color(&entity.id)),
            None,
            object.max_chars_per_line,
            object.text_size,
        ),
        EntityKind::Receptacle => {
            let height = 2.0 * object.height;
            match scene.receptacle_idx(&entity.id).map(|r| &scene.receptacles[r]) {
                Some(recep) if recep.size.height > 0.0 => {
                    let scale = height / recep.size.height;
                    let rect = boxed(recep.size.icon_width * scale, height);
                    let anchor = Point::new(center.x, rect.y + recep.size.center_height * scale);
                    (rect, anchor, None, recep.icon_path.clone(), object.max_chars_per_line, object.text_size)
                }
                _ => (boxed(height, height), center, None, None, object.max_chars_per_line, object.text_size),
            }
        }
        EntityKind::Room => {
            let tiny = &config.tiny_room;
            (
                boxed(tiny.width, tiny.height),
                center,
                None,
                None,
                config.room.max_chars_per_line,
                tiny.text_size,
            )
        }
    };
    let label_anchor = match entity.kind {
        EntityKind::Room => Point::new(center.x, center.y + config.tiny_room.text_margin),
        _ => Point::new(center.x, rect.y - size),
    };
    LegendVertex {
        entity: entity.clone(),
        side,
        rect,
        anchor,
        color,
        icon_path,
        label: label(&entity.id, max_chars, label_anchor, size),
    }
}
