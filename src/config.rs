use crate::ir::Direction;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub direction: Direction,
    /// Written to `elk.layered.spacing.baseValue`; also the sibling gap used
    /// by the built-in solver.
    pub spacing_base: f32,
    /// Gap between layers, as a multiple of `spacing_base`.
    pub rank_spacing_factor: f32,
    /// Inner padding of containers whose measured size carries none.
    pub container_padding: f32,
    /// Distance between stacked self-loops on the same node.
    pub self_loop_spacing: f32,
    pub prioritize_initial_edges: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Vertical,
            spacing_base: 25.0,
            rank_spacing_factor: 2.0,
            container_padding: 12.0,
            self_loop_spacing: 10.0,
            prioritize_initial_edges: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub debounce_ms: u64,
    pub max_wait_ms: u64,
    pub probe_trailing_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            max_wait_ms: 5000,
            probe_trailing_ms: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewportConfig {
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub zoom_step: f32,
    pub wheel_divisor: f32,
    pub padding_factor: f32,
    pub default_container_width: f32,
    pub default_container_height: f32,
    pub resize_debounce_ms: u64,
    pub resize_max_wait_ms: u64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.2,
            max_zoom: 5.0,
            zoom_step: 0.3,
            wheel_divisor: 20.0,
            padding_factor: 1.2,
            default_container_width: 750.0,
            default_container_height: 1000.0,
            resize_debounce_ms: 20,
            resize_max_wait_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MeasureConfig {
    pub font_family: String,
    pub font_size: f32,
    pub line_height: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub min_state_width: f32,
    pub min_transition_width: f32,
    /// Header band reserved at the top of compound states.
    pub header_height: f32,
    pub container_padding: f32,
    /// Average advance in ems when no font can be loaded.
    pub fallback_char_width: f32,
    /// Resolve fonts through the system font database.
    pub system_fonts: bool,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            font_family: "Inter, Helvetica, Arial, sans-serif".to_string(),
            font_size: 14.0,
            line_height: 1.5,
            padding_x: 12.0,
            padding_y: 8.0,
            min_state_width: 80.0,
            min_transition_width: 40.0,
            header_height: 32.0,
            container_padding: 16.0,
            fallback_char_width: 0.56,
            system_fonts: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub layout: LayoutConfig,
    pub scheduler: SchedulerConfig,
    pub viewport: ViewportConfig,
    pub measure: MeasureConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    direction: Option<String>,
    layout: Option<LayoutConfig>,
    scheduler: Option<SchedulerConfig>,
    viewport: Option<ViewportConfig>,
    measure: Option<MeasureConfig>,
}

fn parse_config_file(contents: &str) -> anyhow::Result<ConfigFile> {
    match serde_json::from_str(contents) {
        Ok(parsed) => Ok(parsed),
        Err(json_err) => json5::from_str(contents).map_err(|json5_err| {
            anyhow::anyhow!("invalid config: {json_err} (json5: {json5_err})")
        }),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = Config::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed = parse_config_file(&contents)?;

    if let Some(layout) = parsed.layout {
        config.layout = layout;
    }
    if let Some(direction) = parsed.direction.as_deref() {
        match Direction::from_token(direction) {
            Some(direction) => config.layout.direction = direction,
            None => tracing::warn!(direction, "unknown direction in config, keeping default"),
        }
    }
    if let Some(scheduler) = parsed.scheduler {
        config.scheduler = scheduler;
    }
    if let Some(viewport) = parsed.viewport {
        config.viewport = viewport;
    }
    if let Some(measure) = parsed.measure {
        config.measure = measure;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_sections_keep_defaults() {
        let parsed = parse_config_file(r#"{"layout": {"spacingBase": 40}}"#).unwrap();
        let layout = parsed.layout.unwrap();
        assert_eq!(layout.spacing_base, 40.0);
        assert!(layout.prioritize_initial_edges);
        assert_eq!(layout.direction, Direction::Vertical);
    }

    #[test]
    fn accepts_json5() {
        let parsed = parse_config_file("{ direction: 'horizontal', scheduler: { debounceMs: 5, } }")
            .unwrap();
        assert_eq!(parsed.direction.as_deref(), Some("horizontal"));
        assert_eq!(parsed.scheduler.unwrap().debounce_ms, 5);
    }

    #[test]
    fn missing_path_yields_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.scheduler.max_wait_ms, 5000);
        assert_eq!(config.viewport.max_zoom, 5.0);
    }
}
