use serde::{Deserialize, Serialize};

const OBJECT_PALETTE: [&str; 12] = [
    "#E5A149", "#5FB3E8", "#E8726A", "#8FCB6B", "#B88AE8", "#F2D25C",
    "#4FC7B0", "#E88AC0", "#9DA7F2", "#D99A6C", "#6CD3E0", "#C4E06C",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateColors {
    pub on: String,
    pub off: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Theme {
    pub font_family: String,
    pub font_size: f32,
    pub background: String,
    pub room_color: String,
    pub room_border: String,
    pub legend_background: String,
    pub tiny_room_color: String,
    pub line_color: String,
    pub text_color: String,
    pub placeholder_color: String,
    pub divider_color: String,
    pub object_palette: Vec<String>,
    pub clean: StateColors,
    pub filled: StateColors,
    pub powered: StateColors,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 13.0,
            background: "#222222".to_string(),
            room_color: "#3E4C60".to_string(),
            room_border: "#FFFFFF".to_string(),
            legend_background: "#2D3541".to_string(),
            tiny_room_color: "#3E4C60".to_string(),
            line_color: "#FFFFFF".to_string(),
            text_color: "#FFFFFF".to_string(),
            placeholder_color: "#FFFFFF".to_string(),
            divider_color: "#FFFFFF".to_string(),
            object_palette: OBJECT_PALETTE.iter().map(|c| c.to_string()).collect(),
            clean: StateColors {
                on: "#7ED8F5".to_string(),
                off: "#8A6F4D".to_string(),
            },
            filled: StateColors {
                on: "#4A90E2".to_string(),
                off: "#9AA5B1".to_string(),
            },
            powered: StateColors {
                on: "#F5D547".to_string(),
                off: "#5B5B5B".to_string(),
            },
        }
    }

    pub fn light() -> Self {
        Self {
            background: "#FFFFFF".to_string(),
            room_color: "#E6ECF5".to_string(),
            room_border: "#1C2430".to_string(),
            legend_background: "#F2F4F8".to_string(),
            tiny_room_color: "#C7D2E5".to_string(),
            line_color: "#1C2430".to_string(),
            text_color: "#1C2430".to_string(),
            placeholder_color: "#7A8AA6".to_string(),
            divider_color: "#7A8AA6".to_string(),
            ..Self::dark()
        }
    }

    pub fn state_colors(&self, state: &str) -> Option<&StateColors> {
        match state {
            "is_clean" => Some(&self.clean),
            "is_filled" => Some(&self.filled),
            "is_powered_on" => Some(&self.powered),
            _ => None,
        }
    }
}
