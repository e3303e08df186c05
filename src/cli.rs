use crate::assets::IconCatalog;
use crate::config::{Config, load_config};
use crate::layout::{
    DiagramLayout, compute_layout, layout_single_object, layout_single_receptacle,
    layout_single_room,
};
use crate::layout_dump::write_layout_dump;
use crate::parser::{find_run_episode, list_episode_ids, load_episode_record, parse_episode};
use crate::render::{render_svg, write_output_png, write_output_svg};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "prediviz",
    version,
    about = "Renders household rearrangement tasks as diagrams"
)]
pub struct Args {
    /// Run record holding the evaluation propositions of every episode
    #[arg(long = "run-json")]
    pub run_json: Option<PathBuf>,

    /// Directory of per-episode scene records
    #[arg(long = "episode-data-dir")]
    pub episode_data_dir: Option<PathBuf>,

    /// Render only this episode
    #[arg(long = "episode-id")]
    pub episode_id: Option<String>,

    /// File name prefix of the episode records
    #[arg(long = "episode-file-prefix", default_value = "episode_")]
    pub episode_file_prefix: String,

    /// Preview a single object
    #[arg(long = "object-id")]
    pub object_id: Option<String>,

    /// Preview a single receptacle
    #[arg(long = "receptacle-id")]
    pub receptacle_id: Option<String>,

    /// Preview a single room (needs --episode-id)
    #[arg(long = "room-id")]
    pub room_id: Option<String>,

    /// Output directory
    #[arg(long = "save-path", default_value = "visualizations")]
    pub save_path: PathBuf,

    /// Render this many episodes, at most one per scene until every scene is used
    #[arg(long = "sample-size")]
    pub sample_size: Option<usize>,

    /// Seed for the scene order when sampling
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Stack every level into one image instead of one image per level
    #[arg(long = "single-image")]
    pub single_image: bool,

    /// Directory of receptacle icons
    #[arg(long = "icon-dir", default_value = "receptacles")]
    pub icon_dir: PathBuf,

    /// Config JSON/JSON5 file overriding layout sizes and colors
    #[arg(short = 'c', long = "config-file")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'e', long = "output-format", value_enum, default_value = "svg")]
    pub output_format: OutputFormat,

    /// Also write a JSON dump of the computed layout next to each episode
    #[arg(long = "dump-layout")]
    pub dump_layout: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Svg,
    Png,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

#[derive(Debug, Serialize)]
struct EpisodeRun {
    episode_id: String,
    viz_paths: BTreeMap<usize, String>,
}

/// Written next to the save dir: the layout config the run used and the
/// images each episode produced.
#[derive(Debug, Serialize)]
struct RunData {
    config: Value,
    episodes: Vec<EpisodeRun>,
}

impl RunData {
    fn new(config: &Config, episodes: Vec<EpisodeRun>) -> Result<Self> {
        Ok(Self {
            config: serde_json::to_value(&config.layout)?,
            episodes,
        })
    }
}

pub fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    std::fs::create_dir_all(&args.save_path)
        .with_context(|| format!("failed to create {}", args.save_path.display()))?;

    if let Some(object_id) = &args.object_id {
        let diagram = layout_single_object(object_id, &config.layout, &config.theme)?;
        return write_preview(&args, &config, object_id, &diagram);
    }
    if let Some(receptacle_id) = &args.receptacle_id {
        let catalog = IconCatalog::load(&args.icon_dir, [receptacle_id.as_str()])?;
        let diagram =
            layout_single_receptacle(receptacle_id, &catalog, &config.layout, &config.theme)?;
        return write_preview(&args, &config, receptacle_id, &diagram);
    }
    if let Some(room_id) = &args.room_id {
        let episode_id = args
            .episode_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--room-id needs --episode-id"))?;
        let (run, data_dir) = batch_inputs(&args)?;
        let record = load_episode_record(data_dir, episode_id, &args.episode_file_prefix)?;
        let episode = parse_episode(&record, &find_run_episode(&run, episode_id)?)?;
        let catalog = IconCatalog::load(
            &args.icon_dir,
            episode.recep_to_room.keys().map(String::as_str),
        )?;
        let diagram =
            layout_single_room(&episode, room_id, &catalog, &config.layout, &config.theme)?;
        return write_preview(&args, &config, room_id, &diagram);
    }

    let (run, data_dir) = batch_inputs(&args)?;
    let episode_ids = select_episodes(&args, &run, data_dir)?;
    tracing::info!(count = episode_ids.len(), "rendering episodes");

    let mut episodes = Vec::new();
    let target = args.sample_size.unwrap_or(usize::MAX);
    for episode_id in &episode_ids {
        if episodes.len() >= target {
            break;
        }
        match render_episode(&args, &config, &run, data_dir, episode_id) {
            Ok(viz_paths) => episodes.push(EpisodeRun {
                episode_id: episode_id.clone(),
                viz_paths,
            }),
            Err(err) => {
                tracing::error!(
                    episode_id = %episode_id,
                    error = %error_chain(&err),
                    "skipping episode"
                );
            }
        }
    }
    if episodes.len() < target && args.sample_size.is_some() {
        tracing::warn!(
            rendered = episodes.len(),
            requested = target,
            "not enough episodes rendered"
        );
    }

    let run_data = RunData::new(&config, episodes)?;
    let run_data_path = run_data_path(&args.save_path);
    std::fs::write(&run_data_path, serde_json::to_string_pretty(&run_data)?)
        .with_context(|| format!("failed to write {}", run_data_path.display()))?;
    tracing::info!(path = %run_data_path.display(), "wrote run data");
    Ok(())
}

/// One-line rendering of an error and every cause beneath it.
fn error_chain(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

fn batch_inputs(args: &Args) -> Result<(Value, &Path)> {
    let run_json = args
        .run_json
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--run-json is required"))?;
    let data_dir = args
        .episode_data_dir
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--episode-data-dir is required"))?;
    let contents = std::fs::read_to_string(run_json)
        .with_context(|| format!("failed to read {}", run_json.display()))?;
    Ok((serde_json::from_str(&contents)?, data_dir))
}

fn select_episodes(args: &Args, run: &Value, data_dir: &Path) -> Result<Vec<String>> {
    if let Some(episode_id) = &args.episode_id {
        return Ok(vec![episode_id.clone()]);
    }
    let ids = list_episode_ids(data_dir, &args.episode_file_prefix)?;
    if args.sample_size.is_none() {
        return Ok(ids);
    }
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    Ok(sample_order(&ids, &scene_ids(run), &mut rng))
}

fn scene_ids(run: &Value) -> BTreeMap<String, String> {
    let mut scenes = BTreeMap::new();
    let Some(episodes) = run.get("episodes").and_then(Value::as_array) else {
        return scenes;
    };
    for episode in episodes {
        let id = match episode.get("episode_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        if let Some(scene) = episode.get("scene_id").and_then(Value::as_str) {
            scenes.insert(id, scene.to_string());
        }
    }
    scenes
}

/// Orders episodes so that every scene appears once before any scene repeats.
/// Scenes are visited in a random order; episodes keep their order within a scene.
fn sample_order(ids: &[String], scenes: &BTreeMap<String, String>, rng: &mut StdRng) -> Vec<String> {
    let mut by_scene: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
    for id in ids {
        let scene = scenes.get(id).map(String::as_str).unwrap_or("");
        by_scene.entry(scene).or_default().push(id);
    }
    let mut groups: Vec<Vec<&String>> = by_scene.into_values().collect();
    groups.shuffle(rng);

    let mut order = Vec::with_capacity(ids.len());
    let mut round = 0;
    loop {
        let before = order.len();
        for group in &groups {
            if let Some(id) = group.get(round) {
                order.push((*id).clone());
            }
        }
        if order.len() == before {
            break;
        }
        round += 1;
    }
    order
}

fn render_episode(
    args: &Args,
    config: &Config,
    run: &Value,
    data_dir: &Path,
    episode_id: &str,
) -> Result<BTreeMap<usize, String>> {
    let record = load_episode_record(data_dir, episode_id, &args.episode_file_prefix)?;
    let episode = parse_episode(&record, &find_run_episode(run, episode_id)?)?;
    let catalog = IconCatalog::load(
        &args.icon_dir,
        episode.recep_to_room.keys().map(String::as_str),
    )?;
    let diagrams = compute_layout(
        &episode,
        &catalog,
        &config.layout,
        &config.theme,
        args.single_image,
    )?;

    let dir = args.save_path.join(format!("viz_{episode_id}"));
    std::fs::create_dir_all(&dir)?;
    let mut viz_paths = BTreeMap::new();
    for (idx, diagram) in diagrams.iter().enumerate() {
        let path = dir.join(format!("step_{idx}.{}", args.output_format.extension()));
        write_diagram(args.output_format, config, diagram, &path)?;
        viz_paths.insert(idx, path.display().to_string());
    }

    let source = data_dir.join(format!("{}{episode_id}.json", args.episode_file_prefix));
    std::fs::copy(&source, dir.join(format!("episode_data_{episode_id}.json")))
        .with_context(|| format!("failed to copy {}", source.display()))?;
    if args.dump_layout {
        write_layout_dump(&dir.join("layout.json"), episode_id, &diagrams)?;
    }
    tracing::info!(episode_id, images = diagrams.len(), "rendered episode");
    Ok(viz_paths)
}

fn write_preview(args: &Args, config: &Config, id: &str, diagram: &DiagramLayout) -> Result<()> {
    let path = args
        .save_path
        .join(format!("viz_{id}.{}", args.output_format.extension()));
    write_diagram(args.output_format, config, diagram, &path)?;
    tracing::info!(path = %path.display(), "wrote preview");
    Ok(())
}

fn write_diagram(
    format: OutputFormat,
    config: &Config,
    diagram: &DiagramLayout,
    path: &Path,
) -> Result<()> {
    let svg = render_svg(diagram, &config.theme, &config.layout);
    match format {
        OutputFormat::Svg => write_output_svg(&svg, Some(path)),
        OutputFormat::Png => write_output_png(&svg, path, &config.render),
    }
}

fn run_data_path(save_path: &Path) -> PathBuf {
    let mut name = save_path.as_os_str().to_os_string();
    name.push("_run_data.json");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn sampling_visits_each_scene_before_repeating() {
        let episodes = ids(&["1", "2", "3", "4", "5"]);
        let scenes: BTreeMap<String, String> = [
            ("1", "a"),
            ("2", "a"),
            ("3", "b"),
            ("4", "c"),
            ("5", "a"),
        ]
        .into_iter()
        .map(|(e, s)| (e.to_string(), s.to_string()))
        .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let order = sample_order(&episodes, &scenes, &mut rng);
        assert_eq!(order.len(), 5);

        let first_round: Vec<&str> = order[..3].iter().map(|id| scenes[id].as_str()).collect();
        let mut sorted = first_round.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c"]);
        // Scene "a" keeps its episode order.
        let a: Vec<&String> = order.iter().filter(|id| scenes[*id] == "a").collect();
        assert_eq!(a, vec!["1", "2", "5"]);
    }

    #[test]
    fn sampling_is_reproducible_with_a_seed() {
        let episodes = ids(&["1", "2", "3", "4"]);
        let scenes: BTreeMap<String, String> = episodes
            .iter()
            .map(|id| (id.clone(), format!("scene_{id}")))
            .collect();
        let first = sample_order(&episodes, &scenes, &mut StdRng::seed_from_u64(3));
        let second = sample_order(&episodes, &scenes, &mut StdRng::seed_from_u64(3));
        assert_eq!(first, second);
    }

    #[test]
    fn scene_ids_accept_numeric_episode_ids() {
        let run = serde_json::json!({
            "episodes": [
                {"episode_id": 12, "scene_id": "102344049"},
                {"episode_id": "13"}
            ]
        });
        let scenes = scene_ids(&run);
        assert_eq!(scenes.get("12").map(String::as_str), Some("102344049"));
        assert!(!scenes.contains_key("13"));
    }

    #[test]
    fn run_data_sits_next_to_the_save_dir() {
        assert_eq!(
            run_data_path(Path::new("out/viz")),
            PathBuf::from("out/viz_run_data.json")
        );
    }

    #[test]
    fn skipped_episode_log_keeps_the_root_cause() {
        let err = anyhow::Error::from(crate::error::PredivizError::from(
            crate::error::SchemaError::TemporalCycle(vec![0, 1]),
        ))
        .context("failed to render episode 7");
        let line = error_chain(&err);
        assert!(line.starts_with("failed to render episode 7: "), "{line}");
        assert!(line.contains("cycle through propositions [0, 1]"), "{line}");
    }

    #[test]
    fn run_data_records_the_effective_layout_config() {
        let mut config = Config::default();
        config.layout.scene.target_width = 1600.0;
        let run_data = RunData::new(
            &config,
            vec![EpisodeRun {
                episode_id: "7".into(),
                viz_paths: BTreeMap::from([(0, "out/viz_7/step_0.png".to_string())]),
            }],
        )
        .unwrap();
        let written = serde_json::to_value(&run_data).unwrap();
        assert_eq!(written["config"]["scene"]["target_width"], 1600.0);
        assert!(written["config"]["legend"].is_object());
        assert_eq!(written["episodes"][0]["viz_paths"]["0"], "out/viz_7/step_0.png");
    }

    #[test]
    fn parses_batch_flags() {
        let args = Args::try_parse_from([
            "prediviz",
            "--run-json",
            "run.json",
            "--episode-data-dir",
            "episodes",
            "--sample-size",
            "3",
            "--seed",
            "1",
            "--output-format",
            "png",
            "--single-image",
        ])
        .unwrap();
        assert_eq!(args.sample_size, Some(3));
        assert_eq!(args.output_format, OutputFormat::Png);
        assert!(args.single_image);
        assert_eq!(args.episode_file_prefix, "episode_");
    }
}
