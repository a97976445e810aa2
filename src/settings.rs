//! User configuration, stored as YAML under the config directory

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::ink::Color;
use crate::markers::MarkerStyle;
use crate::render::RenderConfig;
use crate::viewer::ViewerConfig;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pageink";

const SETTINGS_HEADER: &str = "\
# pageink configuration
# Colours are #RRGGBB or #RRGGBBAA. Widths are pixels at scale 1.0.
";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: u32,

    pub default_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,

    pub pen_color: Color,
    pub pen_width: f32,
    pub eraser_width: f32,

    /// Pointer distance, in pixels, that still hits a marker
    pub marker_hit_radius: f32,

    /// Percent of page height the revealed answer text sits above its control
    pub answer_text_offset: f32,
    pub answer_font_size: f32,
    pub answer_color: Color,

    /// Minimum spacing of captured stroke points; roughly one display frame
    pub min_point_interval_ms: u64,

    pub surface_cache_size: usize,
    pub notification_secs: u64,

    /// Editor mode: markers can be dragged with the pointer
    pub editable: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            default_scale: 1.0,
            min_scale: 0.25,
            max_scale: 5.0,
            pen_color: Color::rgba(0xE5, 0x39, 0x35, 0xFF),
            pen_width: 3.0,
            eraser_width: 20.0,
            marker_hit_radius: 14.0,
            answer_text_offset: 10.0,
            answer_font_size: 16.0,
            answer_color: Color::rgba(0x1E, 0x88, 0xE5, 0xFF),
            min_point_interval_ms: 16,
            surface_cache_size: crate::render::DEFAULT_CACHE_SIZE,
            notification_secs: 5,
            editable: false,
        }
    }
}

impl Settings {
    /// `<config dir>/pageink/config.yaml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
    }

    /// Load from the default location, writing defaults there on first run
    #[must_use]
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            if let Err(e) = settings.save_to(&path) {
                error!("{e:#}");
            }
            return settings;
        }
        Self::load_from(&path)
    }

    /// Load from `path`. Unreadable or malformed files fall back to defaults.
    #[must_use]
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read settings file {path:?}: {e}");
                return Self::default();
            }
        };
        let mut settings = match serde_yaml::from_str::<Settings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                return Self::default();
            }
        };
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            settings.migrate();
            if let Err(e) = settings.save_to(path) {
                error!("{e:#}");
            }
        }
        settings.sanitize();
        settings
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
        let body = serde_yaml::to_string(self).context("Failed to serialize settings")?;
        fs::write(path, format!("{SETTINGS_HEADER}{body}"))
            .with_context(|| format!("Failed to save settings to {path:?}"))?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    fn migrate(&mut self) {
        info!(
            "Migrating settings from v{} to v{}",
            self.version, CURRENT_VERSION
        );
        // Version 0 files predate the scale range; anything the user set
        // outside it is pulled back in by sanitize().
        self.version = CURRENT_VERSION;
    }

    /// Replace values the engine cannot work with
    fn sanitize(&mut self) {
        let defaults = Self::default();
        let positive = |v: f32, fallback: f32| if v.is_finite() && v > 0.0 { v } else { fallback };

        self.min_scale = positive(self.min_scale, defaults.min_scale);
        self.max_scale = positive(self.max_scale, defaults.max_scale).max(self.min_scale);
        self.default_scale = positive(self.default_scale, defaults.default_scale)
            .clamp(self.min_scale, self.max_scale);
        self.pen_width = positive(self.pen_width, defaults.pen_width);
        self.eraser_width = positive(self.eraser_width, defaults.eraser_width);
        self.marker_hit_radius = positive(self.marker_hit_radius, defaults.marker_hit_radius);
        self.answer_font_size = positive(self.answer_font_size, defaults.answer_font_size);
        if !self.answer_text_offset.is_finite() {
            self.answer_text_offset = defaults.answer_text_offset;
        }
        self.surface_cache_size = self.surface_cache_size.max(1);
    }

    #[must_use]
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            initial_scale: self.default_scale,
            min_scale: self.min_scale,
            max_scale: self.max_scale,
            cache_size: self.surface_cache_size,
            ..RenderConfig::default()
        }
    }

    #[must_use]
    pub fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            render: self.render_config(),
            pen_color: self.pen_color,
            pen_width: self.pen_width,
            eraser_width: self.eraser_width,
            marker_hit_radius: self.marker_hit_radius,
            marker_style: MarkerStyle {
                answer_color: self.answer_color,
                answer_font_size: self.answer_font_size,
                answer_text_offset: self.answer_text_offset,
            },
            min_point_interval: Duration::from_millis(self.min_point_interval_ms),
            notification_duration: Duration::from_secs(self.notification_secs),
            editable: self.editable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 1\npen_width: 5.5\neditable: true\n").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.pen_width, 5.5);
        assert!(settings.editable);
        assert_eq!(settings.max_scale, 5.0);
        assert_eq!(settings.pen_color, Color::rgba(0xE5, 0x39, 0x35, 0xFF));
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let settings = Settings {
            pen_color: Color::rgba(1, 2, 3, 4),
            marker_hit_radius: 20.0,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# pageink configuration"));
        assert!(content.contains("#01020304"));
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "pen_color: [not, a, colour]\n").unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn old_version_is_migrated_and_out_of_range_values_fixed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\ndefault_scale: 40.0\nmin_scale: -1\n").unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.version, CURRENT_VERSION);
        assert_eq!(settings.min_scale, 0.25);
        assert_eq!(settings.default_scale, 5.0);

        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("version: 1"));
    }

    #[test]
    #[serial]
    fn default_path_lives_under_the_config_dir() {
        let dir = TempDir::new().unwrap();
        let previous = std::env::var_os("XDG_CONFIG_HOME");
        // SAFETY: tests touching the environment are serialized
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };

        let path = Settings::default_path();

        match previous {
            Some(value) => unsafe { std::env::set_var("XDG_CONFIG_HOME", value) },
            None => unsafe { std::env::remove_var("XDG_CONFIG_HOME") },
        }
        let path = path.unwrap();
        assert!(path.ends_with("pageink/config.yaml"));
        if cfg!(target_os = "linux") {
            assert!(path.starts_with(dir.path()));
        }
    }
}
