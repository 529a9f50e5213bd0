use once_cell::sync::Lazy;
use regex::Regex;

use super::graph::LayoutOptions;
use super::types::Padding;
use crate::config::LayoutConfig;
use crate::ir::Direction;

pub const HIERARCHY_HANDLING: &str = "elk.hierarchyHandling";
pub const ALGORITHM: &str = "elk.algorithm";
pub const CONSIDER_MODEL_ORDER: &str = "elk.layered.considerModelOrder";
pub const WRAPPING_STRATEGY: &str = "elk.layered.wrapping.strategy";
pub const ASPECT_RATIO: &str = "elk.aspectRatio";
pub const DIRECTION: &str = "elk.direction";
pub const SPACING_BASE: &str = "elk.layered.spacing.baseValue";
pub const ALIGNMENT: &str = "elk.alignment";
pub const SELF_LOOP_ORDERING: &str = "elk.layered.edgeRouting.selfLoopOrdering";
pub const SELF_LOOP_DISTRIBUTION: &str = "elk.layered.edgeRouting.selfLoopDistribution";
pub const PADDING: &str = "elk.padding";
pub const PORT_BORDER_OFFSET: &str = "elk.port.borderOffset";
pub const PRIORITY_DIRECTION: &str = "elk.layered.priority.direction";
pub const EDGE_LABELS_INLINE: &str = "elk.edgeLabels.inline";
pub const EDGE_LABELS_PLACEMENT: &str = "elk.edgeLabels.placement";
pub const CENTER_LABEL_STRATEGY: &str = "elk.edgeLabels.centerLabelPlacementStrategy";

static PADDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(top|bottom|left|right)\s*=\s*(-?[0-9]+(?:\.[0-9]+)?)").unwrap());

fn aspect_ratio(direction: Direction) -> &'static str {
    match direction {
        Direction::Vertical => "0.5",
        Direction::Horizontal => "2",
    }
}

pub fn direction_token(direction: Direction) -> &'static str {
    match direction {
        Direction::Vertical => "DOWN",
        Direction::Horizontal => "RIGHT",
    }
}

/// Option values are strings; whole numbers print without a fraction.
pub(crate) fn format_number(value: f32) -> String {
    format!("{value}")
}

/// Profile for the synthetic root: hierarchy-aware layered layout.
pub fn root_profile(direction: Direction, config: &LayoutConfig) -> LayoutOptions {
    let mut options = LayoutOptions::new();
    options.insert(HIERARCHY_HANDLING.into(), "INCLUDE_CHILDREN".into());
    options.insert(ALGORITHM.into(), "layered".into());
    options.insert(CONSIDER_MODEL_ORDER.into(), "NODES_AND_EDGES".into());
    options.insert(WRAPPING_STRATEGY.into(), "MULTI_EDGE".into());
    options.insert(ASPECT_RATIO.into(), aspect_ratio(direction).into());
    options.insert(DIRECTION.into(), direction_token(direction).into());
    options.insert(SPACING_BASE.into(), format_number(config.spacing_base));
    options
}

/// Profile for every other container, tuned for small self-loop bundles.
pub fn node_profile(direction: Direction, config: &LayoutConfig) -> LayoutOptions {
    let mut options = LayoutOptions::new();
    options.insert(ALIGNMENT.into(), "CENTER".into());
    options.insert(ASPECT_RATIO.into(), aspect_ratio(direction).into());
    options.insert(DIRECTION.into(), direction_token(direction).into());
    options.insert(SELF_LOOP_ORDERING.into(), "SEQUENCED".into());
    options.insert(SELF_LOOP_DISTRIBUTION.into(), "EQUALLY".into());
    options.insert(SPACING_BASE.into(), format_number(config.spacing_base));
    options
}

pub fn format_padding(padding: &Padding) -> String {
    format!(
        "[top={}, bottom={}, left={}, right={}]",
        padding.top, padding.bottom, padding.left, padding.right
    )
}

/// Parses `[top=.., bottom=.., left=.., right=..]`; missing sides are zero.
pub fn parse_padding(raw: &str) -> Option<Padding> {
    let mut padding = Padding::default();
    let mut found = false;
    for caps in PADDING_RE.captures_iter(raw) {
        let Ok(value) = caps[2].parse::<f32>() else {
            continue;
        };
        found = true;
        match &caps[1] {
            "top" => padding.top = value,
            "bottom" => padding.bottom = value,
            "left" => padding.left = value,
            _ => padding.right = value,
        }
    }
    found.then_some(padding)
}

pub fn parse_direction(options: &LayoutOptions) -> Option<Direction> {
    options
        .get(DIRECTION)
        .and_then(|token| Direction::from_token(token))
}

pub fn parse_f32(options: &LayoutOptions, key: &str) -> Option<f32> {
    options.get(key).and_then(|raw| raw.trim().parse::<f32>().ok())
}
