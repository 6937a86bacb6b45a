//! Viewer tuning knobs.
//!
//! Defaults match a continuous-scroll reader on a typical laptop screen.
//! Every value can be overridden programmatically or from the environment:
//! - `READSHELF_RENDER_SCALE`: paint scale for pages (default: 1.2)
//! - `READSHELF_DEBOUNCE_MS`: delay before a page change is persisted (default: 200)
//! - `READSHELF_JUMP_SETTLE_MS`: tracker lock after a programmatic jump (default: 300)
//! - `READSHELF_PROXIMITY_PX`: lookahead margin for lazy rendering (default: 400)
//! - `READSHELF_ZOOM`: `fixed` or `fit-width` opening scale (default: fixed)

use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {0}")]
    InvalidValue(String),
}

/// Smallest and largest scale reachable through zoom.
pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;
/// Fit-width never opens larger than this.
pub const MAX_FIT_SCALE: f32 = 1.5;
/// Share of the viewport width a fit-width page may take.
const FIT_WIDTH_SHARE: f32 = 0.8;

/// How the opening scale is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoomMode {
    /// Open at `render_scale`.
    #[default]
    Fixed,
    /// Fit the first page into the viewport width, capped at [`MAX_FIT_SCALE`].
    FitWidth,
}

impl FromStr for ZoomMode {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "fit-width" | "fit_width" => Ok(Self::FitWidth),
            _ => Err(ConfigError::InvalidValue(raw.to_owned())),
        }
    }
}

/// Scale at which a page `page_width_pt` wide fills the usable viewport width.
pub fn fit_width_scale(viewport_width_px: f32, page_width_pt: f32) -> f32 {
    if viewport_width_px <= 0.0 || page_width_pt <= 0.0 {
        return 1.0;
    }

    (viewport_width_px * FIT_WIDTH_SHARE / page_width_pt).clamp(MIN_SCALE, MAX_FIT_SCALE)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Scale applied to the page's natural size when painting.
    pub render_scale: f32,
    pub zoom_mode: ZoomMode,
    /// Minimum visible fraction for a page to count as current.
    pub visibility_threshold: f32,
    pub debounce: Duration,
    pub jump_settle: Duration,
    pub proximity_margin_px: f32,
    pub min_placeholder_height_px: f32,
    pub page_spacing_px: f32,
    pub viewport_width_px: f32,
    pub viewport_height_px: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            render_scale: 1.2,
            zoom_mode: ZoomMode::Fixed,
            visibility_threshold: 0.5,
            debounce: Duration::from_millis(200),
            jump_settle: Duration::from_millis(300),
            proximity_margin_px: 400.0,
            min_placeholder_height_px: 400.0,
            page_spacing_px: 16.0,
            viewport_width_px: 1280.0,
            viewport_height_px: 800.0,
        }
    }
}

impl ViewerConfig {
    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_jump_settle(mut self, settle: Duration) -> Self {
        self.jump_settle = settle;
        self
    }

    pub fn with_proximity_margin(mut self, px: f32) -> Self {
        self.proximity_margin_px = px;
        self
    }

    pub fn with_zoom_mode(mut self, mode: ZoomMode) -> Self {
        self.zoom_mode = mode;
        self
    }

    pub fn with_viewport_width(mut self, px: f32) -> Self {
        self.viewport_width_px = px;
        self
    }

    pub fn with_viewport_height(mut self, px: f32) -> Self {
        self.viewport_height_px = px;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(scale) = env_value::<f32>("READSHELF_RENDER_SCALE")? {
            if scale <= 0.0 {
                return Err(ConfigError::InvalidValue("READSHELF_RENDER_SCALE".to_owned()));
            }
            config.render_scale = scale;
        }
        if let Some(ms) = env_value::<u64>("READSHELF_DEBOUNCE_MS")? {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = env_value::<u64>("READSHELF_JUMP_SETTLE_MS")? {
            config.jump_settle = Duration::from_millis(ms);
        }
        if let Some(px) = env_value::<f32>("READSHELF_PROXIMITY_PX")? {
            config.proximity_margin_px = px.max(0.0);
        }
        if let Some(mode) = env_value::<ZoomMode>("READSHELF_ZOOM")? {
            config.zoom_mode = mode;
        }

        Ok(config)
    }
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_owned())),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 5] = [
        "READSHELF_RENDER_SCALE",
        "READSHELF_DEBOUNCE_MS",
        "READSHELF_JUMP_SETTLE_MS",
        "READSHELF_PROXIMITY_PX",
        "READSHELF_ZOOM",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = ViewerConfig::default()
            .with_render_scale(2.0)
            .with_debounce(Duration::from_millis(50))
            .with_proximity_margin(100.0);

        assert_eq!(config.render_scale, 2.0);
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.proximity_margin_px, 100.0);
        assert_eq!(config.jump_settle, Duration::from_millis(300));
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        clear_env();
        std::env::set_var("READSHELF_DEBOUNCE_MS", "150");
        std::env::set_var("READSHELF_RENDER_SCALE", "1.5");

        let config = ViewerConfig::from_env();
        clear_env();

        let config = config.expect("config should parse");
        assert_eq!(config.debounce, Duration::from_millis(150));
        assert_eq!(config.render_scale, 1.5);
    }

    #[test]
    #[serial]
    fn from_env_reads_zoom_mode() {
        clear_env();
        std::env::set_var("READSHELF_ZOOM", "Fit-Width");

        let config = ViewerConfig::from_env();
        clear_env();

        assert_eq!(config.expect("config should parse").zoom_mode, ZoomMode::FitWidth);
    }

    #[test]
    fn fit_width_caps_and_floors_the_scale() {
        assert_eq!(fit_width_scale(1280.0, 612.0), MAX_FIT_SCALE);
        assert_eq!(fit_width_scale(500.0, 500.0), 0.8);
        assert_eq!(fit_width_scale(100.0, 2000.0), MIN_SCALE);
        assert_eq!(fit_width_scale(0.0, 612.0), 1.0);
    }

    #[test]
    #[serial]
    fn from_env_rejects_garbage() {
        clear_env();
        std::env::set_var("READSHELF_JUMP_SETTLE_MS", "soon");

        let result = ViewerConfig::from_env();
        clear_env();

        assert_eq!(result, Err(ConfigError::InvalidValue("READSHELF_JUMP_SETTLE_MS".to_owned())));
    }

    #[test]
    #[serial]
    fn from_env_rejects_non_positive_scale() {
        clear_env();
        std::env::set_var("READSHELF_RENDER_SCALE", "0");

        let result = ViewerConfig::from_env();
        clear_env();

        assert!(result.is_err());
    }
}
