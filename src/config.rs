use crate::theme::Theme;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub width: f32,
    pub height: f32,
    /// Label offset from the object center; negative puts the label below.
    pub text_margin: f32,
    pub bottom_text_extra_margin: f32,
    pub extra_space_between_objects: f32,
    pub rounding_size: f32,
    pub on_floor_padding_ratio: f32,
    pub state_rect_ratio: f32,
    pub max_chars_per_line: usize,
    pub text_size: f32,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            width: 60.0,
            height: 60.0,
            text_margin: -45.0,
            bottom_text_extra_margin: 10.0,
            extra_space_between_objects: 10.0,
            rounding_size: 10.0,
            on_floor_padding_ratio: 0.1,
            state_rect_ratio: 0.4,
            max_chars_per_line: 12,
            text_size: 10.0,
        }
    }
}

impl ObjectConfig {
    /// Vertical room taken by one object stacked on a receptacle.
    pub fn stack_increment(&self) -> f32 {
        self.text_margin.abs() + 2.0 * self.height + self.extra_space_between_objects
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceholderConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            width: 60.0,
            height: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptacleConfig {
    pub target_height: f32,
    pub horizontal_margin: f32,
    pub placeholder_margin: f32,
    pub placeholder: PlaceholderConfig,
    pub text_size: f32,
}

impl Default for ReceptacleConfig {
    fn default() -> Self {
        Self {
            target_height: 160.0,
            horizontal_margin: 20.0,
            placeholder_margin: 10.0,
            placeholder: PlaceholderConfig::default(),
            text_size: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub min_width: f32,
    pub min_height: f32,
    pub min_width_per_object: f32,
    pub left_pad: f32,
    pub right_pad: f32,
    pub top_pad: f32,
    pub bottom_pad: f32,
    pub horizontal_margin: f32,
    pub vertical_margin: f32,
    pub per_receptacle_state_padding: f32,
    pub object_horizontal_margin_fraction: f32,
    pub receptacle_horizontal_margin_fraction: f32,
    /// Fraction of the inner room height where free objects are drawn.
    pub objects_height: f32,
    /// Fraction of the inner room height where the room anchor sits.
    pub placeholder_height: f32,
    pub placeholder: PlaceholderConfig,
    pub border_width: f32,
    pub disable_in_proposition_room_border: bool,
    pub max_chars_per_line: usize,
    pub text_size: f32,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            min_width: 300.0,
            min_height: 260.0,
            min_width_per_object: 1.5,
            left_pad: 20.0,
            right_pad: 20.0,
            top_pad: 20.0,
            bottom_pad: 70.0,
            horizontal_margin: 10.0,
            vertical_margin: 10.0,
            per_receptacle_state_padding: 30.0,
            object_horizontal_margin_fraction: 0.1,
            receptacle_horizontal_margin_fraction: 0.05,
            objects_height: 0.7,
            placeholder_height: 0.8,
            placeholder: PlaceholderConfig::default(),
            border_width: 5.0,
            disable_in_proposition_room_border: false,
            max_chars_per_line: 20,
            text_size: 14.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TinyRoomConfig {
    pub width: f32,
    pub height: f32,
    pub text_margin: f32,
    pub text_size: f32,
}

impl Default for TinyRoomConfig {
    fn default() -> Self {
        Self {
            width: 120.0,
            height: 60.0,
            text_margin: 0.0,
            text_size: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrowConfig {
    pub linewidth: f32,
    pub head_length: f32,
    pub head_width: f32,
    pub overhang: f32,
    pub label_fontsize: f32,
}

impl Default for ArrowConfig {
    fn default() -> Self {
        Self {
            linewidth: 3.0,
            head_length: 20.0,
            head_width: 16.0,
            overhang: 0.0,
            label_fontsize: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegendConfig {
    pub width: f32,
    pub horizontal_margin: f32,
    pub top_pad: f32,
    pub bottom_pad: f32,
    /// Gap between the room area and the first legend column.
    pub column_gap: f32,
    pub linewidth: f32,
    pub endpoint_size: f32,
    pub text_size: f32,
}

impl Default for LegendConfig {
    fn default() -> Self {
        Self {
            width: 400.0,
            horizontal_margin: 150.0,
            top_pad: 60.0,
            bottom_pad: 40.0,
            column_gap: 300.0,
            linewidth: 3.0,
            endpoint_size: 6.0,
            text_size: 14.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    pub target_width: f32,
    pub temporal_scene_margin: f32,
    pub divider_linewidth: f32,
    pub max_chars_per_line: usize,
    pub instruction_text_size: f32,
    pub instruction_line_height: f32,
    pub instruction_margin: f32,
    pub step_badge_size: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            target_width: 2200.0,
            temporal_scene_margin: 100.0,
            divider_linewidth: 4.0,
            max_chars_per_line: 80,
            instruction_text_size: 26.0,
            instruction_line_height: 40.0,
            instruction_margin: 40.0,
            step_badge_size: 110.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub object: ObjectConfig,
    pub receptacle: ReceptacleConfig,
    pub room: RoomConfig,
    pub tiny_room: TinyRoomConfig,
    pub scene: SceneConfig,
    pub arrow: ArrowConfig,
    pub legend: LegendConfig,
}

impl LayoutConfig {
    /// Checks the invariants the layout engine relies on. Run once at load time.
    pub fn validate(&self) -> anyhow::Result<()> {
        let positive = [
            ("object.width", self.object.width),
            ("object.height", self.object.height),
            ("receptacle.targetHeight", self.receptacle.target_height),
            ("room.minWidth", self.room.min_width),
            ("room.minHeight", self.room.min_height),
            ("tinyRoom.width", self.tiny_room.width),
            ("tinyRoom.height", self.tiny_room.height),
            ("scene.targetWidth", self.scene.target_width),
            ("legend.width", self.legend.width),
            ("arrow.headLength", self.arrow.head_length),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(anyhow::anyhow!("{name} must be positive, got {value}"));
            }
        }
        let fractions = [
            (
                "room.objectHorizontalMarginFraction",
                self.room.object_horizontal_margin_fraction,
            ),
            (
                "room.receptacleHorizontalMarginFraction",
                self.room.receptacle_horizontal_margin_fraction,
            ),
        ];
        for (name, value) in fractions {
            if !(0.0..0.5).contains(&value) {
                return Err(anyhow::anyhow!("{name} must be in [0, 0.5), got {value}"));
            }
        }
        if self.scene.max_chars_per_line == 0 || self.room.max_chars_per_line == 0 {
            return Err(anyhow::anyhow!("maxCharsPerLine must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    pub scale: f32,
    pub background: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            background: "#222222".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub theme: Theme,
    pub layout: LayoutConfig,
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        let theme = Theme::dark();
        let render = RenderConfig {
            background: theme.background.clone(),
            ..Default::default()
        };
        Self {
            theme,
            layout: LayoutConfig::default(),
            render,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ObjectConfigFile {
    width: Option<f32>,
    height: Option<f32>,
    text_margin: Option<f32>,
    bottom_text_extra_margin: Option<f32>,
    extra_space_between_objects: Option<f32>,
    max_chars_per_line: Option<usize>,
    text_size: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReceptacleConfigFile {
    target_height: Option<f32>,
    horizontal_margin: Option<f32>,
    placeholder_margin: Option<f32>,
    placeholder_width: Option<f32>,
    placeholder_height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RoomConfigFile {
    min_width: Option<f32>,
    min_height: Option<f32>,
    min_width_per_object: Option<f32>,
    left_pad: Option<f32>,
    right_pad: Option<f32>,
    top_pad: Option<f32>,
    bottom_pad: Option<f32>,
    horizontal_margin: Option<f32>,
    vertical_margin: Option<f32>,
    per_receptacle_state_padding: Option<f32>,
    object_horizontal_margin_fraction: Option<f32>,
    receptacle_horizontal_margin_fraction: Option<f32>,
    objects_height: Option<f32>,
    placeholder_height: Option<f32>,
    disable_in_proposition_room_border: Option<bool>,
    max_chars_per_line: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SceneConfigFile {
    target_width: Option<f32>,
    temporal_scene_margin: Option<f32>,
    max_chars_per_line: Option<usize>,
    instruction_line_height: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LegendConfigFile {
    width: Option<f32>,
    horizontal_margin: Option<f32>,
    top_pad: Option<f32>,
    bottom_pad: Option<f32>,
    column_gap: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ArrowConfigFile {
    linewidth: Option<f32>,
    head_length: Option<f32>,
    head_width: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    theme: Option<String>,
    object: Option<ObjectConfigFile>,
    receptacle: Option<ReceptacleConfigFile>,
    room: Option<RoomConfigFile>,
    scene: Option<SceneConfigFile>,
    legend: Option<LegendConfigFile>,
    arrow: Option<ArrowConfigFile>,
    render_scale: Option<f32>,
}

macro_rules! merge {
    ($target:expr, $source:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(v) = $source.$field {
                $target.$field = v;
            }
        )+
    };
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = json5::from_str(&contents)?;
    apply_config_file(&mut config, parsed);
    config.layout.validate()?;
    Ok(config)
}

fn apply_config_file(config: &mut Config, parsed: ConfigFile) {
    if let Some(theme_name) = parsed.theme.as_deref() {
        if theme_name == "light" {
            config.theme = Theme::light();
        } else if theme_name == "dark" || theme_name == "default" {
            config.theme = Theme::dark();
        }
        config.render.background = config.theme.background.clone();
    }

    let layout = &mut config.layout;
    if let Some(object) = parsed.object {
        merge!(
            layout.object,
            object,
            width,
            height,
            text_margin,
            bottom_text_extra_margin,
            extra_space_between_objects,
            max_chars_per_line,
            text_size,
        );
    }
    if let Some(receptacle) = parsed.receptacle {
        merge!(
            layout.receptacle,
            receptacle,
            target_height,
            horizontal_margin,
            placeholder_margin,
        );
        if let Some(v) = receptacle.placeholder_width {
            layout.receptacle.placeholder.width = v;
        }
        if let Some(v) = receptacle.placeholder_height {
            layout.receptacle.placeholder.height = v;
        }
    }
    if let Some(room) = parsed.room {
        merge!(
            layout.room,
            room,
            min_width,
            min_height,
            min_width_per_object,
            left_pad,
            right_pad,
            top_pad,
            bottom_pad,
            horizontal_margin,
            vertical_margin,
            per_receptacle_state_padding,
            object_horizontal_margin_fraction,
            receptacle_horizontal_margin_fraction,
            objects_height,
            placeholder_height,
            disable_in_proposition_room_border,
            max_chars_per_line,
        );
    }
    if let Some(scene) = parsed.scene {
        merge!(
            layout.scene,
            scene,
            target_width,
            temporal_scene_margin,
            max_chars_per_line,
            instruction_line_height,
        );
    }
    if let Some(legend) = parsed.legend {
        merge!(
            layout.legend,
            legend,
            width,
            horizontal_margin,
            top_pad,
            bottom_pad,
            column_gap,
        );
    }
    if let Some(arrow) = parsed.arrow {
        merge!(layout.arrow, arrow, linewidth, head_length, head_width);
    }
    if let Some(scale) = parsed.render_scale {
        config.render.scale = scale;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(LayoutConfig::default().validate().is_ok());
    }

    #[test]
    fn config_file_overrides_only_named_fields() {
        let parsed: ConfigFile = json5::from_str(
            r#"{
                // comments are allowed
                theme: "light",
                room: { minWidth: 420, bottomPad: 90 },
                scene: { targetWidth: 1600 },
            }"#,
        )
        .unwrap();
        let mut config = Config::default();
        apply_config_file(&mut config, parsed);
        assert_eq!(config.layout.room.min_width, 420.0);
        assert_eq!(config.layout.room.bottom_pad, 90.0);
        assert_eq!(config.layout.room.top_pad, RoomConfig::default().top_pad);
        assert_eq!(config.layout.scene.target_width, 1600.0);
        assert_eq!(config.theme.background, Theme::light().background);
        assert_eq!(config.render.background, Theme::light().background);
    }

    #[test]
    fn validate_rejects_bad_fraction() {
        let mut config = LayoutConfig::default();
        config.room.object_horizontal_margin_fraction = 0.7;
        assert!(config.validate().is_err());
        config.room.object_horizontal_margin_fraction = 0.1;
        config.object.width = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn stack_increment_uses_abs_text_margin() {
        let object = ObjectConfig {
            text_margin: -30.0,
            height: 50.0,
            extra_space_between_objects: 5.0,
            ..Default::default()
        };
        assert_eq!(object.stack_increment(), 30.0 + 100.0 + 5.0);
    }
}
