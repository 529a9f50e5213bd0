use crate::ir::{Direction, FlowId};
use crate::layout::{Connector, Padding, PositionMap, PositionedItemKind};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flat layout as written by the CLI, with entries grouped by kind and sorted
/// by id so dumps diff cleanly.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDump {
    pub flow_id: String,
    pub direction: Direction,
    pub width: f32,
    pub height: f32,
    pub states: Vec<ItemDump>,
    pub transitions: Vec<ItemDump>,
    pub connectors: Vec<ItemDump>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDump {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<Padding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector: Option<Connector>,
}

impl LayoutDump {
    pub fn from_positions(flow_id: &FlowId, direction: Direction, positions: &PositionMap) -> Self {
        let mut entries: Vec<_> = positions.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut dump = LayoutDump {
            flow_id: flow_id.to_string(),
            direction,
            width: 0.0,
            height: 0.0,
            states: Vec::new(),
            transitions: Vec::new(),
            connectors: Vec::new(),
        };

        for (id, info) in entries {
            dump.width = dump.width.max(info.x + info.width);
            dump.height = dump.height.max(info.y + info.height);
            let item = ItemDump {
                id: id.to_string(),
                x: info.x,
                y: info.y,
                width: info.width,
                height: info.height,
                padding: info.padding,
                connector: info.connector.clone(),
            };
            match id.kind() {
                PositionedItemKind::State => dump.states.push(item),
                PositionedItemKind::Connector => dump.connectors.push(item),
                PositionedItemKind::Transition | PositionedItemKind::Other => {
                    dump.transitions.push(item)
                }
            }
        }
        dump
    }
}

pub fn write_layout_dump(
    path: &Path,
    flow_id: &FlowId,
    direction: Direction,
    positions: &PositionMap,
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let dump = LayoutDump::from_positions(flow_id, direction, positions);
    serde_json::to_writer_pretty(&mut writer, &dump)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{PositionInfo, PositionedItemId};

    fn info(x: f32, y: f32, width: f32, height: f32) -> PositionInfo {
        PositionInfo {
            x,
            y,
            width,
            height,
            connector: None,
            padding: None,
        }
    }

    #[test]
    fn groups_and_sorts_entries() {
        let mut positions = PositionMap::new();
        positions.insert(PositionedItemId::from_raw("state:b"), info(0.0, 50.0, 40.0, 20.0));
        positions.insert(PositionedItemId::from_raw("state:a"), info(0.0, 0.0, 40.0, 20.0));
        positions.insert(
            PositionedItemId::from_raw("transition:a:0:b"),
            info(10.0, 25.0, 100.0, 10.0),
        );
        positions.insert(
            PositionedItemId::from_raw("edge:in:transition:a:0:b"),
            info(0.0, 0.0, 0.0, 0.0),
        );

        let dump = LayoutDump::from_positions(&FlowId::new("f"), Direction::Vertical, &positions);
        let ids: Vec<_> = dump.states.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["state:a", "state:b"]);
        assert_eq!(dump.transitions.len(), 1);
        assert_eq!(dump.connectors.len(), 1);
        assert_eq!(dump.width, 110.0);
        assert_eq!(dump.height, 70.0);
    }
}
