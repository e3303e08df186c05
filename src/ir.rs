use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Object,
    Receptacle,
    Room,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Receptacle => "receptacle",
            Self::Room => "room",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityRef {
    pub id: String,
    pub kind: EntityKind,
}

impl EntityRef {
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn object(id: impl Into<String>) -> Self {
        Self::new(id, EntityKind::Object)
    }

    pub fn receptacle(id: impl Into<String>) -> Self {
        Self::new(id, EntityKind::Receptacle)
    }

    pub fn room(id: impl Into<String>) -> Self {
        Self::new(id, EntityKind::Room)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropositionKind {
    IsOnTop,
    IsInside,
    IsOnFloor,
    IsInRoom,
    IsNextTo,
    IsClean,
    IsFilled,
    IsPoweredOn,
    IsPoweredOff,
}

impl PropositionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IsOnTop => "is_on_top",
            Self::IsInside => "is_inside",
            Self::IsOnFloor => "is_on_floor",
            Self::IsInRoom => "is_in_room",
            Self::IsNextTo => "is_next_to",
            Self::IsClean => "is_clean",
            Self::IsFilled => "is_filled",
            Self::IsPoweredOn => "is_powered_on",
            Self::IsPoweredOff => "is_powered_off",
        }
    }

    pub fn is_state_change(self) -> bool {
        matches!(
            self,
            Self::IsClean | Self::IsFilled | Self::IsPoweredOn | Self::IsPoweredOff
        )
    }

    /// Drawn as a connector inside the room rows (not as a legend).
    pub fn is_routed(self) -> bool {
        matches!(self, Self::IsOnTop | Self::IsInside | Self::IsInRoom)
    }
}

impl FromStr for PropositionKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "is_on_top" => Ok(Self::IsOnTop),
            "is_inside" => Ok(Self::IsInside),
            "is_on_floor" => Ok(Self::IsOnFloor),
            "is_in_room" => Ok(Self::IsInRoom),
            "is_next_to" => Ok(Self::IsNextTo),
            "is_clean" => Ok(Self::IsClean),
            "is_filled" => Ok(Self::IsFilled),
            "is_powered_on" => Ok(Self::IsPoweredOn),
            "is_powered_off" => Ok(Self::IsPoweredOff),
            other => Err(SchemaError::UnsupportedPropositionKind(other.to_string())),
        }
    }
}

impl fmt::Display for PropositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PropositionArgs {
    pub object_names: Vec<String>,
    pub receptacle_names: Vec<String>,
    pub room_names: Vec<String>,
    pub entities_a: Vec<EntityRef>,
    pub entities_b: Vec<EntityRef>,
    pub number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proposition {
    pub kind: PropositionKind,
    pub args: PropositionArgs,
}

impl Proposition {
    pub fn on_top(objects: &[&str], receptacles: &[&str], number: usize) -> Self {
        Self::placement(PropositionKind::IsOnTop, objects, receptacles, number)
    }

    pub fn inside(objects: &[&str], receptacles: &[&str], number: usize) -> Self {
        Self::placement(PropositionKind::IsInside, objects, receptacles, number)
    }

    pub fn in_room(objects: &[&str], rooms: &[&str], number: usize) -> Self {
        Self {
            kind: PropositionKind::IsInRoom,
            args: PropositionArgs {
                object_names: owned(objects),
                room_names: owned(rooms),
                number,
                ..Default::default()
            },
        }
    }

    pub fn on_floor(objects: &[&str]) -> Self {
        Self {
            kind: PropositionKind::IsOnFloor,
            args: PropositionArgs {
                object_names: owned(objects),
                number: objects.len(),
                ..Default::default()
            },
        }
    }

    pub fn next_to(entities_a: Vec<EntityRef>, entities_b: Vec<EntityRef>, number: usize) -> Self {
        Self {
            kind: PropositionKind::IsNextTo,
            args: PropositionArgs {
                entities_a,
                entities_b,
                number,
                ..Default::default()
            },
        }
    }

    pub fn state(kind: PropositionKind, objects: &[&str], receptacles: &[&str]) -> Self {
        Self {
            kind,
            args: PropositionArgs {
                object_names: owned(objects),
                receptacle_names: owned(receptacles),
                number: objects.len().max(receptacles.len()),
                ..Default::default()
            },
        }
    }

    fn placement(
        kind: PropositionKind,
        objects: &[&str],
        receptacles: &[&str],
        number: usize,
    ) -> Self {
        Self {
            kind,
            args: PropositionArgs {
                object_names: owned(objects),
                receptacle_names: owned(receptacles),
                number,
                ..Default::default()
            },
        }
    }

    /// The first `number` named objects: the ones the proposition binds.
    pub fn bound_objects(&self) -> &[String] {
        let n = self.args.number.min(self.args.object_names.len());
        &self.args.object_names[..n]
    }

    /// "Any `number` of these" rather than "all of these".
    pub fn is_partial(&self) -> bool {
        match self.kind {
            PropositionKind::IsNextTo => {
                self.args.number < self.args.entities_a.len()
                    || self.args.number < self.args.entities_b.len()
            }
            _ => self.args.number < self.args.object_names.len(),
        }
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStyle {
    Solid,
    Dotted,
}

impl LineStyle {
    pub fn for_partial(partial: bool) -> Self {
        if partial { Self::Dotted } else { Self::Solid }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgName {
    ObjectHandles,
    ReceptacleHandles,
    RoomIds,
    EntityHandlesA,
    EntityHandlesB,
}

impl ArgName {
    pub fn parse(name: &str, constraint: &'static str) -> Result<Self, SchemaError> {
        match name {
            "object_handles" => Ok(Self::ObjectHandles),
            "receptacle_handles" => Ok(Self::ReceptacleHandles),
            "room_ids" => Ok(Self::RoomIds),
            "entity_handles_a" => Ok(Self::EntityHandlesA),
            "entity_handles_b" => Ok(Self::EntityHandlesB),
            other => Err(SchemaError::UnsupportedArgName {
                constraint,
                arg: other.to_string(),
            }),
        }
    }
}

/// One proposition's contribution to a same/different-argument legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgEntry {
    /// The entities the constraint is about (shared or differing).
    pub anchors: Vec<EntityRef>,
    pub corresponding: Vec<EntityRef>,
    pub style: LineStyle,
    pub proposition: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgConstraint {
    pub proposition_indices: Vec<usize>,
    pub arg_names: Vec<ArgName>,
    pub entries: Vec<ArgEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Constraint {
    Temporal { dag_edges: Vec<(usize, usize)> },
    SameArg(ArgConstraint),
    DifferentArg(ArgConstraint),
    TerminalSatisfaction { proposition_indices: Vec<usize> },
}

/// A fully resolved episode: everything the layout engine needs.
#[derive(Debug, Clone, Default)]
pub struct Episode {
    pub episode_id: String,
    pub instruction: String,
    pub rooms: Vec<String>,
    pub object_to_room: BTreeMap<String, String>,
    pub recep_to_room: BTreeMap<String, String>,
    pub object_to_recep: BTreeMap<String, String>,
    pub object_to_states: BTreeMap<String, BTreeMap<String, bool>>,
    pub propositions: Vec<Proposition>,
    pub constraints: Vec<Constraint>,
}

impl Episode {
    pub fn temporal_edges(&self) -> Option<&[(usize, usize)]> {
        self.constraints.iter().find_map(|c| match c {
            Constraint::Temporal { dag_edges } => Some(dag_edges.as_slice()),
            _ => None,
        })
    }

    pub fn same_arg_constraints(&self) -> impl Iterator<Item = &ArgConstraint> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::SameArg(arg) => Some(arg),
            _ => None,
        })
    }

    pub fn different_arg_constraints(&self) -> impl Iterator<Item = &ArgConstraint> {
        self.constraints.iter().filter_map(|c| match c {
            Constraint::DifferentArg(arg) => Some(arg),
            _ => None,
        })
    }
}
