/// Gallery settings
///
/// Settings live in `settings.json` under the user's config directory:
/// - Linux: ~/.config/post-gallery/settings.json
/// - macOS: ~/Library/Application Support/post-gallery/settings.json
/// - Windows: %APPDATA%\post-gallery\settings.json
///
/// Every field has a default, so a partial or missing file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;
use crate::layout::masonry::MasonryConfig;
use crate::state::filters::FilterStateStore;

const APP_DIR: &str = "post-gallery";
const CONFIG_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "gallery.db";
const FILTERS_FILE: &str = "filters.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    /// Groups per page on regular screens (halved on narrow ones)
    pub page_limit: usize,
    /// Viewport widths below this are treated as mobile
    pub mobile_breakpoint: f32,
    pub masonry: MasonryConfig,
    /// How far below the visible area the sentinel may be and still count
    pub sentinel_margin: f32,
    /// Height of the pinned generation card
    pub static_item_height: f32,
    /// Padding around the window content; the grid gets what is left
    pub padding: f32,
    /// Window width before the first resize event arrives
    pub initial_viewport_width: f32,
    pub initial_viewport_height: f32,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            page_limit: 50,
            mobile_breakpoint: 768.0,
            masonry: MasonryConfig::default(),
            sentinel_margin: 200.0,
            static_item_height: 420.0,
            padding: 24.0,
            initial_viewport_width: 1280.0,
            initial_viewport_height: 800.0,
        }
    }
}

impl GalleryConfig {
    /// Page size for a viewport of `viewport_width`
    pub fn page_limit_for(&self, viewport_width: f32) -> usize {
        if viewport_width < self.mobile_breakpoint {
            (self.page_limit / 2).max(1)
        } else {
            self.page_limit.max(1)
        }
    }

    /// Width available to the grid inside a window of `window_width`
    pub fn grid_width(&self, window_width: f32) -> f32 {
        (window_width - 2.0 * self.padding).max(0.0)
    }
}

fn app_dir(base: Option<PathBuf>) -> Option<PathBuf> {
    base.map(|mut path| {
        path.push(APP_DIR);
        path
    })
}

/// Default location of `settings.json`
pub fn default_config_path() -> Option<PathBuf> {
    app_dir(dirs::config_dir()).map(|dir| dir.join(CONFIG_FILE))
}

/// Where the local catalog database lives
pub fn default_database_path() -> Option<PathBuf> {
    app_dir(dirs::data_dir().or_else(dirs::home_dir)).map(|dir| dir.join(DATABASE_FILE))
}

/// Where the user's filter selections are kept between runs
pub fn default_filters_path() -> Option<PathBuf> {
    app_dir(dirs::config_dir()).map(|dir| dir.join(FILTERS_FILE))
}

/// Load settings from the default location, falling back to defaults
pub fn load() -> GalleryConfig {
    let Some(path) = default_config_path() else {
        return GalleryConfig::default();
    };
    if !path.exists() {
        return GalleryConfig::default();
    }
    match load_from_path(&path) {
        Ok(config) => {
            info!(path = %path.display(), "⚙️  Settings loaded");
            config
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "⚠️  Ignoring unreadable settings");
            GalleryConfig::default()
        }
    }
}

pub fn load_from_path(path: &Path) -> Result<GalleryConfig> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

pub fn save_to_path(config: &GalleryConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(config)?)?;
    Ok(())
}

/// Restore saved filter selections; a missing file gives an empty store
pub fn load_filters(path: &Path) -> Result<FilterStateStore> {
    if !path.exists() {
        return Ok(FilterStateStore::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(FilterStateStore::from_json(&content)?)
}

pub fn save_filters(store: &FilterStateStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, store.to_json()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalleryError;
    use crate::state::filters::{keys, FilterPatch, FilterScope, FilterSet, ImageSort};
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let mut config = GalleryConfig::default();
        config.page_limit = 20;
        config.masonry.max_column_count = 3;

        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        save_to_path(&config, &path).unwrap();

        assert_eq!(load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"page_limit": 10, "masonry": {"column_width": 250.0}}"#).unwrap();

        let config = load_from_path(&path).unwrap();
        assert_eq!(config.page_limit, 10);
        assert_eq!(config.masonry.column_width, 250.0);
        assert_eq!(config.masonry.max_item_height, 600.0);
        assert_eq!(config.sentinel_margin, 200.0);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "not json").unwrap();

        assert!(matches!(load_from_path(&path), Err(GalleryError::Config(_))));
    }

    #[test]
    fn test_page_limit_halves_on_mobile() {
        let config = GalleryConfig::default();
        assert_eq!(config.page_limit_for(1280.0), 50);
        assert_eq!(config.page_limit_for(500.0), 25);
    }

    #[test]
    fn test_filters_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join(FILTERS_FILE);
        assert_eq!(load_filters(&path).unwrap().get(FilterScope::ModelImages), FilterSet::new());

        let mut store = FilterStateStore::new();
        store.set(FilterScope::ModelImages, FilterPatch::new().set(keys::SORT, ImageSort::MostComments));
        save_filters(&store, &path).unwrap();

        let restored = load_filters(&path).unwrap();
        assert_eq!(restored.get(FilterScope::ModelImages).sort(), Some(ImageSort::MostComments));
    }

    #[test]
    fn test_grid_width_excludes_padding() {
        let config = GalleryConfig::default();
        assert_eq!(config.grid_width(1024.0), 976.0);
        assert_eq!(config.grid_width(30.0), 0.0);
    }
}
