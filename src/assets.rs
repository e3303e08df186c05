use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AssetError;

#[cfg(feature = "png")]
const PROPERTIES_FILE: &str = "receptacle_properties.json";

/// Pixel measurements of one receptacle icon, before scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IconGeometry {
    pub width: f32,
    pub height: f32,
    /// Rows from the bottom of the icon up to its first opaque middle pixel.
    pub top_height: f32,
    pub center_height: f32,
}

impl IconGeometry {
    /// A fully opaque rectangle of the given size.
    pub fn solid(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            top_height: height,
            center_height: height / 2.0,
        }
    }

    pub fn with_top(mut self, top_height: f32) -> Self {
        self.top_height = top_height;
        self.center_height = top_height / 2.0;
        self
    }
}

/// Which placeholders a receptacle type supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PlacementSupport {
    #[serde(default = "enabled")]
    pub is_on_top: bool,
    #[serde(default = "enabled")]
    pub is_inside: bool,
    /// Top and inside are the same surface; a top request becomes a center one.
    #[serde(default)]
    pub is_same: bool,
}

fn enabled() -> bool {
    true
}

impl Default for PlacementSupport {
    fn default() -> Self {
        Self {
            is_on_top: true,
            is_inside: true,
            is_same: false,
        }
    }
}

/// Receptacle id to icon lookup, resolved once per episode before layout.
#[derive(Debug, Clone, Default)]
pub struct IconCatalog {
    icons: HashMap<String, IconGeometry>,
    paths: HashMap<String, PathBuf>,
    properties: HashMap<String, PlacementSupport>,
}

/// `fridge_2` -> `fridge`, `kitchen_counter_0` -> `kitchen_counter`.
pub fn base_type(id: &str) -> &str {
    match id.rsplit_once('_') {
        Some((base, suffix)) if !base.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => {
            base
        }
        _ => id,
    }
}

pub fn icon_path(dir: &Path, receptacle_id: &str) -> PathBuf {
    dir.join(format!("{}@2x.png", base_type(receptacle_id)))
}

impl IconCatalog {
    /// Fixed geometry for every listed receptacle; no files involved.
    pub fn with_geometry<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, IconGeometry)>,
        S: Into<String>,
    {
        Self {
            icons: entries
                .into_iter()
                .map(|(id, geometry)| (id.into(), geometry))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_properties(mut self, base: impl Into<String>, support: PlacementSupport) -> Self {
        self.properties.insert(base.into(), support);
        self
    }

    /// Reads the icon of every receptacle. Any missing file fails the whole episode.
    #[cfg(feature = "png")]
    pub fn load<'a, I>(dir: &Path, receptacles: I) -> Result<Self, AssetError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut catalog = Self {
            properties: load_properties(dir)?,
            ..Default::default()
        };
        let mut cache: HashMap<PathBuf, IconGeometry> = HashMap::new();
        for id in receptacles {
            let path = icon_path(dir, id);
            if !path.is_file() {
                return Err(AssetError::MissingIcon {
                    receptacle: id.to_string(),
                    path,
                });
            }
            let geometry = match cache.get(&path) {
                Some(geometry) => *geometry,
                None => {
                    let geometry = read_geometry(&path)?;
                    cache.insert(path.clone(), geometry);
                    geometry
                }
            };
            tracing::debug!(receptacle = id, path = %path.display(), "loaded icon");
            catalog.icons.insert(id.to_string(), geometry);
            catalog.paths.insert(id.to_string(), path);
        }
        Ok(catalog)
    }

    pub fn geometry(&self, receptacle_id: &str) -> Result<IconGeometry, AssetError> {
        self.icons
            .get(receptacle_id)
            .copied()
            .ok_or_else(|| AssetError::Unregistered(receptacle_id.to_string()))
    }

    pub fn path(&self, receptacle_id: &str) -> Option<&Path> {
        self.paths.get(receptacle_id).map(PathBuf::as_path)
    }

    pub fn placement(&self, receptacle_id: &str) -> PlacementSupport {
        self.properties
            .get(base_type(receptacle_id))
            .copied()
            .unwrap_or_default()
    }
}

#[cfg(feature = "png")]
fn load_properties(dir: &Path) -> Result<HashMap<String, PlacementSupport>, AssetError> {
    let path = dir.join(PROPERTIES_FILE);
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let decode = |reason: String| AssetError::Decode {
        path: path.clone(),
        reason,
    };
    let contents = std::fs::read_to_string(&path).map_err(|err| decode(err.to_string()))?;
    serde_json::from_str(&contents).map_err(|err| decode(err.to_string()))
}

#[cfg(feature = "png")]
fn read_geometry(path: &Path) -> Result<IconGeometry, AssetError> {
    let pixmap = resvg::tiny_skia::Pixmap::load_png(path).map_err(|err| AssetError::Decode {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let width = pixmap.width();
    let height = pixmap.height();
    let middle = width / 2;
    let first_opaque = (0..height).find(|&row| {
        pixmap
            .pixel(middle, row)
            .is_some_and(|pixel| pixel.alpha() != 0)
    });
    let top_height = match first_opaque {
        Some(row) => (height - row) as f32,
        None => height as f32,
    };
    Ok(IconGeometry::solid(width as f32, height as f32).with_top(top_height))
}
