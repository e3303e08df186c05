use std::collections::HashMap;

use crate::config::ArrowConfig;
use crate::ir::{LineStyle, Proposition, PropositionKind};

use super::entities::RenderContext;
use super::types::{ConnectorLayout, Point, RoomLayout};

/// Geometry of one quadratic connector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    pub control: Point,
    pub direction: Point,
    pub head_base: Point,
    pub midpoint: Point,
}

/// Bends the curve sideways for steep connectors and upward for flat ones,
/// never letting the control point rise above `upper`.
pub fn quadratic_curve(from: Point, to: Point, upper: f32, head_length: f32) -> Curve {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let mid = Point::new((from.x + to.x) / 2.0, (from.y + to.y) / 2.0);
    let control = if dy.abs() > dx.abs() {
        let sign = if dx > 0.0 { 1.0 } else { -1.0 };
        Point::new(mid.x + sign * dy.abs() / 2.0, mid.y.min(upper))
    } else {
        Point::new(mid.x, (mid.y + dx.abs() / 2.0).min(upper))
    };

    // B'(1) = 2 (P2 - P1)
    let direction = to
        .sub(control)
        .scale(2.0)
        .normalized()
        .or_else(|| to.sub(from).normalized())
        .unwrap_or(Point::new(0.0, -1.0));
    let head_base = to.sub(direction.scale(head_length));
    // B(0.5) = P0/4 + P1/2 + P2/4
    let midpoint = Point::new(
        0.25 * from.x + 0.5 * control.x + 0.25 * to.x,
        0.25 * from.y + 0.5 * control.y + 0.25 * to.y,
    );
    Curve {
        control,
        direction,
        head_base,
        midpoint,
    }
}

#[derive(Default)]
struct Anchors {
    objects: HashMap<String, Point>,
    top: HashMap<String, Point>,
    center: HashMap<String, Point>,
    rooms: HashMap<String, Point>,
}

impl Anchors {
    fn collect(rooms: &[RoomLayout]) -> Self {
        let mut anchors = Self::default();
        for room in rooms {
            anchors.rooms.insert(room.id.clone(), room.anchor);
            for recep in &room.receptacles {
                anchors.top.insert(recep.id.clone(), recep.top.center());
                anchors.center.insert(recep.id.clone(), recep.center.center());
            }
            for obj in &room.objects {
                anchors.objects.insert(obj.id.clone(), obj.center);
            }
        }
        anchors
    }
}

/// One connector per (object, target) pair of every is_on_top / is_inside /
/// is_in_room proposition of a level.
pub(super) fn route_level(
    rooms: &[RoomLayout],
    propositions: &[(usize, &Proposition)],
    upper: f32,
    config: &ArrowConfig,
    ctx: &RenderContext,
) -> Vec<ConnectorLayout> {
    let anchors = Anchors::collect(rooms);
    let mut connectors = Vec::new();
    for &(index, prop) in propositions {
        let (targets, lookup) = match prop.kind {
            PropositionKind::IsOnTop => (&prop.args.receptacle_names, &anchors.top),
            PropositionKind::IsInside => (&prop.args.receptacle_names, &anchors.center),
            PropositionKind::IsInRoom => (&prop.args.room_names, &anchors.rooms),
            _ => continue,
        };
        let style = LineStyle::for_partial(prop.args.number < prop.args.object_names.len());
        let color = ctx.proposition_color(index);
        for object in &prop.args.object_names {
            let Some(&from) = anchors.objects.get(object) else {
                tracing::debug!(object = %object, proposition = index, "object not drawn, skipping connector");
                continue;
            };
            for target in targets {
                let Some(&to) = lookup.get(target) else {
                    continue;
                };
                let curve = quadratic_curve(from, to, upper, config.head_length);
                connectors.push(ConnectorLayout {
                    proposition: index,
                    kind: prop.kind,
                    source: object.clone(),
                    target: target.clone(),
                    from,
                    control: curve.control,
                    to,
                    direction: curve.direction,
                    head_base: curve.head_base,
                    style,
                    color: color.clone(),
                    label: (prop.args.number > 1)
                        .then(|| (curve.midpoint, prop.args.number.to_string())),
                });
            }
        }
    }
    connectors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steep_connector_bends_sideways() {
        let curve = quadratic_curve(Point::new(0.0, 0.0), Point::new(10.0, -200.0), 0.0, 20.0);
        assert_eq!(curve.control, Point::new(105.0, -100.0));
    }

    #[test]
    fn vertical_connector_bends_left() {
        let curve = quadratic_curve(Point::new(0.0, 0.0), Point::new(0.0, -100.0), 0.0, 20.0);
        assert_eq!(curve.control.x, -50.0);
    }

    #[test]
    fn flat_connector_is_capped_at_upper() {
        let curve = quadratic_curve(Point::new(0.0, -100.0), Point::new(400.0, -100.0), -50.0, 20.0);
        assert_eq!(curve.control, Point::new(200.0, -50.0));
    }

    #[test]
    fn arrowhead_follows_end_tangent() {
        let from = Point::new(0.0, 0.0);
        let to = Point::new(100.0, 0.0);
        let curve = quadratic_curve(from, to, 1000.0, 10.0);
        // control (50, 50): tangent at t=1 is (50, -50)
        let expected = Point::new(1.0, -1.0).normalized().unwrap();
        assert!((curve.direction.x - expected.x).abs() < 1e-6);
        assert!((curve.direction.y - expected.y).abs() < 1e-6);
        let back = to.sub(curve.head_base).length();
        assert!((back - 10.0).abs() < 1e-4);
    }

    #[test]
    fn degenerate_connector_points_down() {
        let p = Point::new(5.0, 5.0);
        let curve = quadratic_curve(p, p, 5.0, 10.0);
        assert_eq!(curve.direction, Point::new(0.0, -1.0));
    }
}
