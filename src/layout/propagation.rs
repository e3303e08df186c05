use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{ArgConstraint, ArgName, EntityKind, EntityRef, Proposition, PropositionKind};

/// Object placement after a level's propositions have been satisfied.
///
/// An object placed on or in a receptacle has no room entry here; its room
/// follows from the receptacle when `temporal::migrate` applies the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    pub object_to_recep: BTreeMap<String, String>,
    pub object_to_room: BTreeMap<String, String>,
    /// Objects whose is_next_to partners share no receptacle and no room and
    /// that no other proposition of the level placed. Never in either map.
    pub unplaced: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct Candidates {
    receptacles: BTreeMap<String, BTreeSet<String>>,
    rooms: BTreeMap<String, BTreeSet<String>>,
    touched: BTreeSet<String>,
    unplaced: BTreeSet<String>,
}

impl Candidates {
    fn receptacles_of(&self, object: &str, prior: &BTreeMap<String, String>) -> BTreeSet<String> {
        current_or_prior(&self.receptacles, object, prior)
    }

    fn rooms_of(&self, object: &str, prior: &BTreeMap<String, String>) -> BTreeSet<String> {
        current_or_prior(&self.rooms, object, prior)
    }
}

fn current_or_prior(
    sets: &BTreeMap<String, BTreeSet<String>>,
    object: &str,
    prior: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    match sets.get(object) {
        Some(set) => set.clone(),
        None => prior.get(object).cloned().into_iter().collect(),
    }
}

/// Derives the object -> receptacle / room maps that hold once `propositions`
/// are satisfied, starting from the prior maps.
pub fn propagate(
    object_to_recep: &BTreeMap<String, String>,
    object_to_room: &BTreeMap<String, String>,
    propositions: &[Proposition],
) -> Assignment {
    let mut cand = Candidates::default();

    for prop in propositions {
        match prop.kind {
            PropositionKind::IsInside | PropositionKind::IsOnTop => {
                for object in prop.bound_objects() {
                    cand.receptacles
                        .entry(object.clone())
                        .or_default()
                        .extend(prop.args.receptacle_names.iter().cloned());
                    cand.touched.insert(object.clone());
                }
            }
            PropositionKind::IsInRoom => {
                for object in prop.bound_objects() {
                    cand.rooms
                        .entry(object.clone())
                        .or_default()
                        .extend(prop.args.room_names.iter().cloned());
                    cand.touched.insert(object.clone());
                }
            }
            PropositionKind::IsNextTo => {
                let number = prop.args.number.min(prop.args.entities_a.len());
                let side_a = prop.args.entities_a[..number]
                    .iter()
                    .filter(|e| e.kind == EntityKind::Object);
                for a in side_a {
                    for b in prop
                        .args
                        .entities_b
                        .iter()
                        .filter(|e| e.kind == EntityKind::Object)
                    {
                        join_next_to(&mut cand, &a.id, &b.id, object_to_recep, object_to_room);
                    }
                }
            }
            PropositionKind::IsOnFloor => {
                for object in &prop.args.object_names {
                    cand.receptacles.insert(object.clone(), BTreeSet::new());
                    cand.rooms.insert(object.clone(), BTreeSet::new());
                    cand.touched.insert(object.clone());
                }
            }
            PropositionKind::IsClean
            | PropositionKind::IsFilled
            | PropositionKind::IsPoweredOn
            | PropositionKind::IsPoweredOff => {}
        }
    }

    let object_to_recep = resolve(object_to_recep, &cand.receptacles, &cand);
    let object_to_room = resolve(object_to_room, &cand.rooms, &cand);
    let unplaced = cand
        .unplaced
        .into_iter()
        .filter(|object| {
            !object_to_recep.contains_key(object) && !object_to_room.contains_key(object)
        })
        .collect();
    Assignment {
        object_to_recep,
        object_to_room,
        unplaced,
    }
}

fn join_next_to(
    cand: &mut Candidates,
    a: &str,
    b: &str,
    object_to_recep: &BTreeMap<String, String>,
    object_to_room: &BTreeMap<String, String>,
) {
    let receptacles: BTreeSet<String> = cand
        .receptacles_of(a, object_to_recep)
        .intersection(&cand.receptacles_of(b, object_to_recep))
        .cloned()
        .collect();
    let rooms: BTreeSet<String> = cand
        .rooms_of(a, object_to_room)
        .intersection(&cand.rooms_of(b, object_to_room))
        .cloned()
        .collect();

    if receptacles.is_empty() && rooms.is_empty() {
        tracing::debug!(first = a, second = b, "is_next_to pair shares no placement");
        for object in [a, b] {
            cand.receptacles.insert(object.to_string(), BTreeSet::new());
            cand.rooms.insert(object.to_string(), BTreeSet::new());
            cand.touched.insert(object.to_string());
            cand.unplaced.insert(object.to_string());
        }
        return;
    }
    for object in [a, b] {
        cand.receptacles.insert(object.to_string(), receptacles.clone());
        cand.rooms.insert(object.to_string(), rooms.clone());
        cand.touched.insert(object.to_string());
        cand.unplaced.remove(object);
    }
}

fn resolve(
    prior: &BTreeMap<String, String>,
    sets: &BTreeMap<String, BTreeSet<String>>,
    cand: &Candidates,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let names: BTreeSet<&String> = prior.keys().chain(sets.keys()).collect();
    for name in names {
        let choice = if cand.touched.contains(name) {
            sets.get(name).and_then(|set| set.iter().next()).cloned()
        } else {
            prior.get(name).cloned()
        };
        if let Some(choice) = choice {
            out.insert(name.clone(), choice);
        }
    }
    out
}

/// Restricts the arguments shared through same-argument constraints to the
/// values every referenced proposition of the level agrees on.
///
/// `level` holds `(global index, proposition)` pairs.
pub fn narrow_same_args(level: &mut [(usize, Proposition)], constraints: &[&ArgConstraint]) {
    for constraint in constraints {
        let members: Vec<(usize, ArgName)> = constraint
            .proposition_indices
            .iter()
            .copied()
            .zip(constraint.arg_names.iter().copied())
            .filter(|(idx, _)| level.iter().any(|(global, _)| global == idx))
            .collect();
        if members.len() < 2 {
            continue;
        }

        let mut common: Option<Vec<EntityRef>> = None;
        for &(idx, arg) in &members {
            let Some((_, prop)) = level.iter().find(|(global, _)| *global == idx) else {
                continue;
            };
            let values = arg_values(prop, arg);
            common = Some(match common {
                None => values,
                Some(acc) => acc.into_iter().filter(|v| values.contains(v)).collect(),
            });
        }
        let Some(common) = common.filter(|c| !c.is_empty()) else {
            continue;
        };
        for &(idx, arg) in &members {
            if let Some((_, prop)) = level.iter_mut().find(|(global, _)| *global == idx) {
                set_arg_values(prop, arg, &common);
            }
        }
    }
}

fn arg_values(prop: &Proposition, arg: ArgName) -> Vec<EntityRef> {
    let tag = |names: &[String], kind: EntityKind| -> Vec<EntityRef> {
        names.iter().map(|n| EntityRef::new(n.clone(), kind)).collect()
    };
    match arg {
        ArgName::ObjectHandles => tag(&prop.args.object_names, EntityKind::Object),
        ArgName::ReceptacleHandles => tag(&prop.args.receptacle_names, EntityKind::Receptacle),
        ArgName::RoomIds => tag(&prop.args.room_names, EntityKind::Room),
        ArgName::EntityHandlesA => prop.args.entities_a.clone(),
        ArgName::EntityHandlesB => prop.args.entities_b.clone(),
    }
}

fn set_arg_values(prop: &mut Proposition, arg: ArgName, values: &[EntityRef]) {
    let ids = || values.iter().map(|v| v.id.clone()).collect::<Vec<_>>();
    match arg {
        ArgName::ObjectHandles => prop.args.object_names = ids(),
        ArgName::ReceptacleHandles => prop.args.receptacle_names = ids(),
        ArgName::RoomIds => prop.args.room_names = ids(),
        ArgName::EntityHandlesA => prop.args.entities_a = values.to_vec(),
        ArgName::EntityHandlesB => prop.args.entities_b = values.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn inside_moves_object_to_receptacle() {
        let recep = map(&[("apple_0", "counter_0")]);
        let room = map(&[("apple_0", "kitchen_0")]);
        let out = propagate(&recep, &room, &[Proposition::inside(&["apple_0"], &["fridge_0"], 1)]);
        assert_eq!(out.object_to_recep["apple_0"], "fridge_0");
        // The room comes from the fridge once the level is migrated.
        assert!(!out.object_to_room.contains_key("apple_0"));
        assert!(out.unplaced.is_empty());
    }

    #[test]
    fn later_placement_clears_unplaced() {
        let recep = map(&[("a_0", "table_0"), ("b_0", "bed_0")]);
        let room = map(&[("a_0", "kitchen_0"), ("b_0", "bedroom_0")]);
        let props = [
            Proposition::next_to(
                vec![EntityRef::object("a_0")],
                vec![EntityRef::object("b_0")],
                1,
            ),
            Proposition::on_top(&["a_0"], &["shelf_0"], 1),
        ];
        let out = propagate(&recep, &room, &props);
        assert_eq!(out.object_to_recep["a_0"], "shelf_0");
        assert_eq!(out.unplaced, ["b_0".to_string()].into_iter().collect());
        for object in &out.unplaced {
            assert!(!out.object_to_recep.contains_key(object));
            assert!(!out.object_to_room.contains_key(object));
        }
    }

    #[test]
    fn only_first_number_objects_are_bound() {
        let recep = map(&[("a_0", "shelf_0"), ("b_0", "shelf_0")]);
        let out = propagate(
            &recep,
            &BTreeMap::new(),
            &[Proposition::on_top(&["a_0", "b_0"], &["table_0", "bed_0"], 1)],
        );
        // Lexicographically smallest candidate.
        assert_eq!(out.object_to_recep["a_0"], "bed_0");
        assert_eq!(out.object_to_recep["b_0"], "shelf_0");
    }

    #[test]
    fn on_floor_clears_receptacle_and_room() {
        let recep = map(&[("cup_0", "table_0")]);
        let room = map(&[("cup_0", "kitchen_0")]);
        let out = propagate(&recep, &room, &[Proposition::on_floor(&["cup_0"])]);
        assert!(!out.object_to_recep.contains_key("cup_0"));
        assert!(!out.object_to_room.contains_key("cup_0"));
    }

    #[test]
    fn next_to_intersects_candidates() {
        let recep = map(&[("a_0", "table_0"), ("b_0", "shelf_0")]);
        let room = map(&[("a_0", "kitchen_0"), ("b_0", "kitchen_0")]);
        let props = [
            Proposition::on_top(&["a_0"], &["table_0", "shelf_0"], 1),
            Proposition::next_to(
                vec![EntityRef::object("a_0")],
                vec![EntityRef::object("b_0")],
                1,
            ),
        ];
        let out = propagate(&recep, &room, &props);
        assert_eq!(out.object_to_recep["a_0"], "shelf_0");
        assert_eq!(out.object_to_recep["b_0"], "shelf_0");
        assert_eq!(out.object_to_room["a_0"], "kitchen_0");
    }

    #[test]
    fn disjoint_next_to_pair_is_unplaced() {
        let recep = map(&[("a_0", "table_0"), ("b_0", "bed_0")]);
        let room = map(&[("a_0", "kitchen_0"), ("b_0", "bedroom_0")]);
        let props = [Proposition::next_to(
            vec![EntityRef::object("a_0")],
            vec![EntityRef::object("b_0")],
            1,
        )];
        let out = propagate(&recep, &room, &props);
        assert_eq!(
            out.unplaced,
            ["a_0".to_string(), "b_0".to_string()].into_iter().collect()
        );
        assert!(out.object_to_recep.is_empty());
        assert!(out.object_to_room.is_empty());
    }

    #[test]
    fn propagation_is_idempotent() {
        let recep = map(&[("apple_0", "counter_0")]);
        let room = map(&[("apple_0", "kitchen_0")]);
        let props = [Proposition::inside(&["apple_0"], &["fridge_0"], 1)];
        let once = propagate(&recep, &room, &props);
        let twice = propagate(&once.object_to_recep, &once.object_to_room, &props);
        assert_eq!(once, twice);
    }

    #[test]
    fn same_arg_narrows_to_shared_receptacles() {
        let mut level = vec![
            (0, Proposition::on_top(&["a_0"], &["table_0", "shelf_0"], 1)),
            (1, Proposition::on_top(&["b_0"], &["shelf_0", "bed_0"], 1)),
        ];
        let constraint = ArgConstraint {
            proposition_indices: vec![0, 1],
            arg_names: vec![ArgName::ReceptacleHandles, ArgName::ReceptacleHandles],
            entries: Vec::new(),
        };
        narrow_same_args(&mut level, &[&constraint]);
        assert_eq!(level[0].1.args.receptacle_names, vec!["shelf_0"]);
        assert_eq!(level[1].1.args.receptacle_names, vec!["shelf_0"]);
    }

    #[test]
    fn empty_same_arg_intersection_leaves_arguments() {
        let mut level = vec![
            (0, Proposition::on_top(&["a_0"], &["table_0"], 1)),
            (1, Proposition::on_top(&["b_0"], &["bed_0"], 1)),
        ];
        let constraint = ArgConstraint {
            proposition_indices: vec![0, 1],
            arg_names: vec![ArgName::ReceptacleHandles, ArgName::ReceptacleHandles],
            entries: Vec::new(),
        };
        narrow_same_args(&mut level, &[&constraint]);
        assert_eq!(level[0].1.args.receptacle_names, vec!["table_0"]);
        assert_eq!(level[1].1.args.receptacle_names, vec!["bed_0"]);
    }
}
