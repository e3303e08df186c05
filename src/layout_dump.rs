use crate::ir::LineStyle;
use crate::layout::{DiagramLayout, LegendSide, LevelLayout, Rect};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub episode_id: String,
    pub images: Vec<ImageDump>,
}

#[derive(Debug, Serialize)]
pub struct ImageDump {
    pub step: Option<usize>,
    pub width: f32,
    pub height: f32,
    pub instruction_lines: Vec<String>,
    pub levels: Vec<LevelDump>,
    pub legends: Vec<LegendDump>,
}

#[derive(Debug, Serialize)]
pub struct LevelDump {
    pub index: usize,
    pub propositions: Vec<usize>,
    pub lower: f32,
    pub upper: f32,
    pub rooms: Vec<BoxDump>,
    pub receptacles: Vec<BoxDump>,
    pub objects: Vec<BoxDump>,
    pub connectors: Vec<ConnectorDump>,
    pub unplaced: Vec<String>,
}

/// Any placed entity: `room` is the containing room, if there is one.
#[derive(Debug, Serialize)]
pub struct BoxDump {
    pub id: String,
    pub room: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct ConnectorDump {
    pub proposition: usize,
    pub kind: String,
    pub from: String,
    pub to: String,
    pub dotted: bool,
    pub label: Option<String>,
    pub points: Vec<[f32; 2]>,
}

#[derive(Debug, Serialize)]
pub struct LegendDump {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub edges: Vec<[String; 2]>,
}

fn boxed(id: &str, room: Option<&str>, rect: Rect) -> BoxDump {
    BoxDump {
        id: id.to_string(),
        room: room.map(str::to_string),
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    }
}

impl LevelDump {
    fn from_level(level: &LevelLayout) -> Self {
        let mut receptacles = Vec::new();
        let mut objects = Vec::new();
        for room in &level.rooms {
            let owner = Some(room.id.as_str());
            receptacles.extend(room.receptacles.iter().map(|r| boxed(&r.id, owner, r.rect)));
            objects.extend(room.objects.iter().map(|o| boxed(&o.id, owner, o.rect)));
        }
        receptacles.extend(level.receptacles.iter().map(|r| boxed(&r.id, None, r.rect)));
        objects.extend(level.objects.iter().map(|o| boxed(&o.id, None, o.rect)));

        let connectors = level
            .connectors
            .iter()
            .map(|c| ConnectorDump {
                proposition: c.proposition,
                kind: c.kind.to_string(),
                from: c.source.clone(),
                to: c.target.clone(),
                dotted: c.style == LineStyle::Dotted,
                label: c.label.as_ref().map(|(_, text)| text.clone()),
                points: [c.from, c.control, c.to].iter().map(|p| [p.x, p.y]).collect(),
            })
            .collect();

        LevelDump {
            index: level.index,
            propositions: level.propositions.clone(),
            lower: level.lower,
            upper: level.upper,
            rooms: level.rooms.iter().map(|r| boxed(&r.id, None, r.rect)).collect(),
            receptacles,
            objects,
            connectors,
            unplaced: level.unplaced.clone(),
        }
    }
}

impl LayoutDump {
    pub fn from_layouts(episode_id: &str, diagrams: &[DiagramLayout]) -> Self {
        let images = diagrams
            .iter()
            .map(|diagram| ImageDump {
                step: diagram.step.map(|s| s.number),
                width: diagram.width,
                height: diagram.height,
                instruction_lines: diagram
                    .instruction
                    .as_ref()
                    .map(|text| text.lines.clone())
                    .unwrap_or_default(),
                levels: diagram.levels.iter().map(LevelDump::from_level).collect(),
                legends: diagram
                    .legends
                    .iter()
                    .map(|legend| {
                        let side = |s: LegendSide| -> Vec<String> {
                            legend
                                .vertices
                                .iter()
                                .filter(|v| v.side == s)
                                .map(|v| v.entity.id.clone())
                                .collect()
                        };
                        let id = |idx: usize| {
                            legend
                                .vertices
                                .get(idx)
                                .map(|v| v.entity.id.clone())
                                .unwrap_or_default()
                        };
                        LegendDump {
                            kind: legend.kind.title().to_string(),
                            x: legend.rect.x,
                            y: legend.rect.y,
                            width: legend.rect.width,
                            height: legend.rect.height,
                            left: side(LegendSide::Left),
                            right: side(LegendSide::Right),
                            edges: legend.edges.iter().map(|e| [id(e.from), id(e.to)]).collect(),
                        }
                    })
                    .collect(),
            })
            .collect();
        LayoutDump {
            episode_id: episode_id.to_string(),
            images,
        }
    }
}

pub fn write_layout_dump(path: &Path, episode_id: &str, diagrams: &[DiagramLayout]) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = LayoutDump::from_layouts(episode_id, diagrams);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
