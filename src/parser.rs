use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::SchemaError;
use crate::ir::{
    ArgConstraint, ArgEntry, ArgName, Constraint, EntityKind, EntityRef, Episode, LineStyle,
    Proposition, PropositionArgs, PropositionKind,
};

/// Per-episode scene metadata (`episode_<id>.json`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EpisodeRecord {
    pub rooms: Vec<String>,
    pub object_to_room: BTreeMap<String, String>,
    pub recep_to_room: BTreeMap<String, String>,
    #[serde(default)]
    pub recep_to_description: BTreeMap<String, String>,
    #[serde(default)]
    pub object_to_handle: BTreeMap<String, String>,
    #[serde(default)]
    pub recep_to_handle: BTreeMap<String, String>,
    #[serde(default)]
    pub room_to_id: BTreeMap<String, String>,
    #[serde(default)]
    pub object_to_recep: BTreeMap<String, String>,
    #[serde(default)]
    pub object_to_states: BTreeMap<String, BTreeMap<String, bool>>,
    #[serde(default)]
    pub instruction: String,
}

/// The evaluation part of a run record for one episode.
#[derive(Debug, Clone, Deserialize)]
pub struct RunEpisode {
    #[serde(deserialize_with = "string_or_number")]
    pub episode_id: String,
    #[serde(default)]
    pub scene_id: Option<String>,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub evaluation_propositions: Vec<RawProposition>,
    #[serde(default)]
    pub evaluation_constraints: Vec<RawConstraint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProposition {
    pub function_name: String,
    #[serde(default)]
    pub args: RawArgs,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawArgs {
    pub object_handles: Option<Vec<String>>,
    pub receptacle_handles: Option<Vec<String>>,
    pub room_ids: Option<Vec<String>>,
    pub entity_handles_a: Option<Vec<String>>,
    pub entity_handles_b: Option<Vec<String>>,
    pub object_names: Option<Vec<String>>,
    pub receptacle_names: Option<Vec<String>>,
    pub room_names: Option<Vec<String>>,
    pub number: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawConstraint {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub args: RawConstraintArgs,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConstraintArgs {
    pub dag_edges: Option<Vec<(usize, usize)>>,
    pub proposition_indices: Option<Vec<usize>>,
    pub arg_names: Option<Vec<String>>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

pub fn load_episode_record(dir: &Path, episode_id: &str, prefix: &str) -> anyhow::Result<EpisodeRecord> {
    let path = dir.join(format!("{prefix}{episode_id}.json"));
    let contents = std::fs::read_to_string(&path)
        .map_err(|err| anyhow::anyhow!("failed to read {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Reads the episode ids of every `<prefix><id>.json` file in `dir`, numerically sorted.
pub fn list_episode_ids(dir: &Path, prefix: &str) -> anyhow::Result<Vec<String>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(id) = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
        {
            ids.push(id.to_string());
        }
    }
    ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    Ok(ids)
}

pub fn find_run_episode(run: &Value, episode_id: &str) -> Result<RunEpisode, SchemaError> {
    let episodes = run
        .get("episodes")
        .and_then(|e| e.as_array())
        .ok_or_else(|| SchemaError::EpisodeNotFound(episode_id.to_string()))?;
    for episode in episodes {
        let id = match episode.get("episode_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if id == episode_id {
            return serde_json::from_value(episode.clone())
                .map_err(|err| SchemaError::MalformedRecord {
                    episode_id: episode_id.to_string(),
                    reason: err.to_string(),
                });
        }
    }
    Err(SchemaError::EpisodeNotFound(episode_id.to_string()))
}

struct HandleMaps {
    object: HashMap<String, String>,
    receptacle: HashMap<String, String>,
    room: HashMap<String, String>,
}

impl HandleMaps {
    fn new(record: &EpisodeRecord) -> Self {
        let invert = |map: &BTreeMap<String, String>| {
            map.iter()
                .map(|(k, v)| (v.clone(), k.clone()))
                .collect::<HashMap<_, _>>()
        };
        Self {
            object: invert(&record.object_to_handle),
            receptacle: invert(&record.recep_to_handle),
            room: invert(&record.room_to_id),
        }
    }

    fn resolve(
        map: &HashMap<String, String>,
        kind: &'static str,
        handles: &[String],
    ) -> Result<Vec<String>, SchemaError> {
        handles
            .iter()
            .map(|handle| {
                map.get(handle)
                    .cloned()
                    .ok_or_else(|| SchemaError::UnknownHandle {
                        kind,
                        handle: handle.clone(),
                    })
            })
            .collect()
    }

    fn entity(&self, handle: &str) -> Result<EntityRef, SchemaError> {
        if let Some(name) = self.object.get(handle) {
            return Ok(EntityRef::object(name.clone()));
        }
        if let Some(name) = self.receptacle.get(handle) {
            return Ok(EntityRef::receptacle(name.clone()));
        }
        Err(SchemaError::UnknownHandle {
            kind: "entity",
            handle: handle.to_string(),
        })
    }
}

/// Resolves handles to names and types every proposition and constraint.
pub fn parse_episode(record: &EpisodeRecord, run: &RunEpisode) -> Result<Episode, SchemaError> {
    let handles = HandleMaps::new(record);
    let propositions = run
        .evaluation_propositions
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_proposition(index, raw, &handles))
        .collect::<Result<Vec<_>, _>>()?;

    let mut constraints = Vec::with_capacity(run.evaluation_constraints.len());
    for raw in &run.evaluation_constraints {
        constraints.push(parse_constraint(raw, &propositions, &run.episode_id)?);
    }

    Ok(Episode {
        episode_id: run.episode_id.clone(),
        instruction: run
            .instruction
            .clone()
            .unwrap_or_else(|| record.instruction.clone()),
        rooms: record.rooms.clone(),
        object_to_room: record.object_to_room.clone(),
        recep_to_room: record.recep_to_room.clone(),
        object_to_recep: record.object_to_recep.clone(),
        object_to_states: record.object_to_states.clone(),
        propositions,
        constraints,
    })
}

fn parse_proposition(
    index: usize,
    raw: &RawProposition,
    handles: &HandleMaps,
) -> Result<Proposition, SchemaError> {
    let kind: PropositionKind = raw.function_name.parse()?;
    let missing = |argument: &'static str| SchemaError::MissingArgument {
        index,
        function: raw.function_name.clone(),
        argument,
    };
    let a = &raw.args;

    let objects = match (&a.object_handles, &a.object_names) {
        (Some(h), _) => Some(HandleMaps::resolve(&handles.object, "object", h)?),
        (None, Some(names)) => Some(names.clone()),
        (None, None) => None,
    };
    let receptacles = match (&a.receptacle_handles, &a.receptacle_names) {
        (Some(h), _) => Some(HandleMaps::resolve(&handles.receptacle, "receptacle", h)?),
        (None, Some(names)) => Some(names.clone()),
        (None, None) => None,
    };
    let rooms = match (&a.room_ids, &a.room_names) {
        (Some(h), _) => Some(HandleMaps::resolve(&handles.room, "room", h)?),
        (None, Some(names)) => Some(names.clone()),
        (None, None) => None,
    };

    let mut args = PropositionArgs::default();
    match kind {
        PropositionKind::IsOnTop | PropositionKind::IsInside => {
            args.object_names = objects.ok_or_else(|| missing("object_handles"))?;
            args.receptacle_names = receptacles.ok_or_else(|| missing("receptacle_handles"))?;
            args.number = a.number.ok_or_else(|| missing("number"))?;
        }
        PropositionKind::IsInRoom => {
            args.object_names = objects.ok_or_else(|| missing("object_handles"))?;
            args.room_names = rooms.ok_or_else(|| missing("room_ids"))?;
            args.number = a.number.ok_or_else(|| missing("number"))?;
        }
        PropositionKind::IsOnFloor => {
            args.object_names = objects.ok_or_else(|| missing("object_handles"))?;
            args.number = a.number.unwrap_or(args.object_names.len());
        }
        PropositionKind::IsNextTo => {
            let side_a = a
                .entity_handles_a
                .as_ref()
                .ok_or_else(|| missing("entity_handles_a"))?;
            let side_b = a
                .entity_handles_b
                .as_ref()
                .ok_or_else(|| missing("entity_handles_b"))?;
            args.entities_a = side_a
                .iter()
                .map(|h| handles.entity(h))
                .collect::<Result<_, _>>()?;
            args.entities_b = side_b
                .iter()
                .map(|h| handles.entity(h))
                .collect::<Result<_, _>>()?;
            args.number = a.number.ok_or_else(|| missing("number"))?;
        }
        PropositionKind::IsClean
        | PropositionKind::IsFilled
        | PropositionKind::IsPoweredOn
        | PropositionKind::IsPoweredOff => {
            if objects.is_none() && receptacles.is_none() {
                return Err(missing("object_handles"));
            }
            args.object_names = objects.unwrap_or_default();
            args.receptacle_names = receptacles.unwrap_or_default();
            args.number = a
                .number
                .unwrap_or(args.object_names.len().max(args.receptacle_names.len()));
        }
    }
    Ok(Proposition { kind, args })
}

fn parse_constraint(
    raw: &RawConstraint,
    propositions: &[Proposition],
    episode_id: &str,
) -> Result<Constraint, SchemaError> {
    let count = propositions.len();
    let check_index = |index: usize| {
        if index < count {
            Ok(index)
        } else {
            Err(SchemaError::PropositionIndexOutOfRange { index, count })
        }
    };
    match raw.kind.as_str() {
        "TemporalConstraint" => {
            let dag_edges = raw.args.dag_edges.clone().unwrap_or_default();
            for &(from, to) in &dag_edges {
                check_index(from)?;
                check_index(to)?;
            }
            Ok(Constraint::Temporal { dag_edges })
        }
        "TerminalSatisfactionConstraint" => {
            let proposition_indices = raw.args.proposition_indices.clone().unwrap_or_default();
            let unique: BTreeSet<usize> = proposition_indices.iter().copied().collect();
            if unique.len() != count {
                tracing::warn!(
                    episode_id,
                    propositions = count,
                    terminal = unique.len(),
                    "terminal constraints do not cover every proposition"
                );
            }
            Ok(Constraint::TerminalSatisfaction {
                proposition_indices,
            })
        }
        "SameArgConstraint" => Ok(Constraint::SameArg(parse_arg_constraint(
            raw,
            propositions,
            "SameArgConstraint",
        )?)),
        "DifferentArgConstraint" => Ok(Constraint::DifferentArg(parse_arg_constraint(
            raw,
            propositions,
            "DifferentArgConstraint",
        )?)),
        other => Err(SchemaError::UnsupportedConstraintType(other.to_string())),
    }
}

fn parse_arg_constraint(
    raw: &RawConstraint,
    propositions: &[Proposition],
    constraint: &'static str,
) -> Result<ArgConstraint, SchemaError> {
    let indices = raw.args.proposition_indices.clone().unwrap_or_default();
    let names = raw.args.arg_names.clone().unwrap_or_default();
    let mut arg_names = Vec::with_capacity(names.len());
    let mut entries = Vec::with_capacity(names.len());

    for (&index, name) in indices.iter().zip(names.iter()) {
        let prop = propositions
            .get(index)
            .ok_or(SchemaError::PropositionIndexOutOfRange {
                index,
                count: propositions.len(),
            })?;
        let arg = ArgName::parse(name, constraint)?;
        let tag = |ids: &[String], kind: EntityKind| -> Vec<EntityRef> {
            ids.iter().map(|id| EntityRef::new(id.clone(), kind)).collect()
        };
        let objects = tag(&prop.args.object_names, EntityKind::Object);
        let (anchors, corresponding) = match arg {
            ArgName::ObjectHandles => {
                let other = if !prop.args.receptacle_names.is_empty() {
                    tag(&prop.args.receptacle_names, EntityKind::Receptacle)
                } else if !prop.args.room_names.is_empty() {
                    tag(&prop.args.room_names, EntityKind::Room)
                } else {
                    return Err(SchemaError::MissingArgument {
                        index,
                        function: prop.kind.to_string(),
                        argument: "receptacle_handles",
                    });
                };
                (objects, other)
            }
            ArgName::ReceptacleHandles => (
                tag(&prop.args.receptacle_names, EntityKind::Receptacle),
                objects,
            ),
            ArgName::RoomIds => (tag(&prop.args.room_names, EntityKind::Room), objects),
            ArgName::EntityHandlesA => (prop.args.entities_a.clone(), prop.args.entities_b.clone()),
            ArgName::EntityHandlesB => (prop.args.entities_b.clone(), prop.args.entities_a.clone()),
        };
        arg_names.push(arg);
        entries.push(ArgEntry {
            anchors,
            corresponding,
            style: LineStyle::for_partial(prop.is_partial()),
            proposition: index,
        });
    }

    Ok(ArgConstraint {
        proposition_indices: indices,
        arg_names,
        entries,
    })
}
