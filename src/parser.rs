use crate::error::{LayoutError, Result};
use crate::ir::Flow;
use crate::xstate::machine_json_to_flow;
use serde::{Deserialize, Serialize};

const MAX_FLOW_NAME_CHARS: usize = 200;
const TRUNCATED_FLOW_NAME_CHARS: usize = 197;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum InputFormat {
    /// Flow document; JSON5 is accepted as well.
    #[default]
    Json,
    Json5,
    /// XState machine definition (`{"definition": …}` or the bare definition).
    Xstate,
}

pub fn parse_input(input: &str, format: InputFormat) -> Result<Flow> {
    match format {
        InputFormat::Json => parse_flow(input),
        InputFormat::Json5 => {
            let flow = json5::from_str(input).map_err(|err| LayoutError::Parse(err.to_string()))?;
            Ok(normalize_flow(flow))
        }
        InputFormat::Xstate => machine_json_to_flow(input),
    }
}

/// Parses a flow document, trying strict JSON first and JSON5 second.
pub fn parse_flow(input: &str) -> Result<Flow> {
    let flow: Flow = match serde_json::from_str(input) {
        Ok(flow) => flow,
        Err(json_err) => json5::from_str(input).map_err(|json5_err| {
            LayoutError::Parse(format!("{json_err} (json5: {json5_err})"))
        })?,
    };
    Ok(normalize_flow(flow))
}

pub fn normalize_flow(mut flow: Flow) -> Flow {
    if let Some(name) = flow.name.as_mut()
        && name.chars().count() > MAX_FLOW_NAME_CHARS
    {
        tracing::warn!(flow = %flow.id, "flow name too long, truncating");
        let mut truncated: String = name.chars().take(TRUNCATED_FLOW_NAME_CHARS).collect();
        truncated.push_str("...");
        *name = truncated;
    }
    flow
}
