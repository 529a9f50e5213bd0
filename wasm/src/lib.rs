use serde::Deserialize;
use statechart_layout::config::{LayoutConfig, MeasureConfig};
use statechart_layout::ir::Direction;
use statechart_layout::layout::{LayeredSolver, LayoutNode, SizeMap, build_layout_request, flatten};
use statechart_layout::measure::Measurer;
use statechart_layout::parser::parse_flow;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutRequestOptions {
    direction: Option<String>,
    spacing_base: Option<f32>,
    prioritize_initial_edges: Option<bool>,
    font_size: Option<f32>,
}

impl LayoutRequestOptions {
    fn parse(raw: Option<String>) -> Result<Self, JsValue> {
        match raw {
            Some(raw) => serde_json::from_str(&raw).map_err(to_js),
            None => Ok(Self::default()),
        }
    }

    fn layout_config(&self) -> LayoutConfig {
        let mut config = LayoutConfig::default();
        if let Some(direction) = self.direction.as_deref().and_then(Direction::from_token) {
            config.direction = direction;
        }
        if let Some(spacing) = self.spacing_base {
            config.spacing_base = spacing;
        }
        if let Some(prioritize) = self.prioritize_initial_edges {
            config.prioritize_initial_edges = prioritize;
        }
        config
    }

    fn measure_config(&self) -> MeasureConfig {
        let mut config = MeasureConfig {
            system_fonts: false,
            ..MeasureConfig::default()
        };
        if let Some(font_size) = self.font_size {
            config.font_size = font_size;
        }
        config
    }
}

fn to_js(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_sizes(raw: &str) -> Result<SizeMap, JsValue> {
    serde_json::from_str(raw).map_err(to_js)
}

/// Solver request for `flow_json` given the sizes reported so far.
#[wasm_bindgen]
pub fn build_layout_graph(
    flow_json: &str,
    sizes_json: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    let options = LayoutRequestOptions::parse(options_json)?;
    let flow = parse_flow(flow_json).map_err(to_js)?;
    let sizes = parse_sizes(sizes_json)?;
    let request = build_layout_request(&flow, &sizes, &options.layout_config());
    serde_json::to_string(&request).map_err(to_js)
}

/// Flattens a solved tree, e.g. one produced by elkjs, into a position map.
#[wasm_bindgen]
pub fn flatten_layout(sizes_json: &str, solved_json: &str) -> Result<String, JsValue> {
    let sizes = parse_sizes(sizes_json)?;
    let solved: LayoutNode = serde_json::from_str(solved_json).map_err(to_js)?;
    serde_json::to_string(&flatten(&sizes, &solved)).map_err(to_js)
}

/// Measures, builds, solves and flattens in one call. Reported sizes in
/// `sizes_json` take precedence over estimated ones.
#[wasm_bindgen]
pub fn layout_flow(
    flow_json: &str,
    sizes_json: Option<String>,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    let options = LayoutRequestOptions::parse(options_json)?;
    let flow = parse_flow(flow_json).map_err(to_js)?;
    let mut sizes = Measurer::new(options.measure_config()).size_map(&flow);
    if let Some(raw) = sizes_json {
        sizes.extend(parse_sizes(&raw)?);
    }
    let config = options.layout_config();
    let request = build_layout_request(&flow, &sizes, &config);
    let solved = LayeredSolver::new(config).solve(request).map_err(to_js)?;
    serde_json::to_string(&flatten(&sizes, &solved)).map_err(to_js)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW: &str = r#"{
        "id": "f",
        "states": {
            "s1": {"name": "Outer", "type": "compound", "initialState": "s2"},
            "s2": {"name": "Start", "parent": "s1", "transitions": [{"event": "go", "target": "s3"}]},
            "s3": {"name": "End", "parent": "s1"}
        },
        "metadata": {"events": {"go": {"name": "go"}}}
    }"#;

    #[test]
    fn lays_out_a_flow_end_to_end() {
        let positions = layout_flow(FLOW, None, Some(r#"{"direction": "horizontal"}"#.to_string())).unwrap();
        let positions: serde_json::Value = serde_json::from_str(&positions).unwrap();
        for key in ["state:s1", "state:s2", "state:s3", "transition:s2:0:s3", "state:root"] {
            assert!(positions.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn graph_request_is_elk_shaped() {
        let graph = build_layout_graph(FLOW, "{}", None).unwrap();
        let graph: serde_json::Value = serde_json::from_str(&graph).unwrap();
        assert_eq!(graph["id"], "state:root");
        assert!(graph["layoutOptions"]["elk.algorithm"].is_string());
    }
}
