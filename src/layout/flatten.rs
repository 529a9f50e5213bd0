use super::graph::{LayoutEdge, LayoutNode};
use super::types::{is_synthetic_ref, Connector, PositionInfo, PositionMap, SizeMap};

/// Collapses a solved tree into one map keyed by positioned item id.
///
/// Coordinates are copied as the solver reported them; callers are expected to
/// use a solver that answers in a single frame. Values the solver left unset
/// read as zero.
pub fn flatten(sizes: &SizeMap, root: &LayoutNode) -> PositionMap {
    let mut map = PositionMap::new();
    flatten_into(sizes, root, &mut map);
    map
}

fn flatten_into(sizes: &SizeMap, node: &LayoutNode, map: &mut PositionMap) {
    for edge in &node.edges {
        for label in &edge.labels {
            map.insert(
                edge.id.clone(),
                PositionInfo {
                    x: label.x.unwrap_or_default(),
                    y: label.y.unwrap_or_default(),
                    width: label.width.unwrap_or_default(),
                    height: label.height.unwrap_or_default(),
                    connector: Some(connector(edge)),
                    padding: None,
                },
            );
        }
    }

    map.insert(
        node.id.clone(),
        PositionInfo {
            x: node.x.unwrap_or_default(),
            y: node.y.unwrap_or_default(),
            width: node.width.unwrap_or_default(),
            height: node.height.unwrap_or_default(),
            connector: None,
            padding: sizes.get(&node.id).and_then(|size| size.padding),
        },
    );

    for child in &node.children {
        flatten_into(sizes, child, map);
    }
}

fn connector(edge: &LayoutEdge) -> Connector {
    Connector {
        transition_id: edge.data.transition_id.clone(),
        container: edge.data.container.clone(),
        source_is_event: edge.sources.iter().any(|s| is_synthetic_ref(s)),
        target_is_event: edge.targets.iter().any(|t| is_synthetic_ref(t)),
        points: edge.sections.iter().flat_map(|section| section.points()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::StateId;
    use crate::layout::graph::{EdgeData, EdgeSection, LayoutLabel};
    use crate::layout::types::{Padding, Point, PositionedItemId, Size};

    fn edge(id: &str, sources: &str, targets: &str, sections: Vec<EdgeSection>) -> LayoutEdge {
        LayoutEdge {
            id: PositionedItemId::from_raw(id),
            sources: vec![sources.to_string()],
            targets: vec![targets.to_string()],
            labels: vec![LayoutLabel {
                x: Some(5.0),
                y: Some(6.0),
                width: Some(10.0),
                height: Some(4.0),
                ..LayoutLabel::default()
            }],
            sections,
            layout_options: Default::default(),
            data: EdgeData {
                transition_id: PositionedItemId::from_raw("transition:a:0:b"),
                source: StateId::new("a"),
                target: StateId::new("b"),
                container: Some(StateId::new("p")),
            },
        }
    }

    #[test]
    fn records_nodes_and_edge_labels() {
        let mut root = LayoutNode::new(PositionedItemId::from_raw("state:root"));
        root.width = Some(100.0);
        root.height = Some(80.0);
        let mut child = LayoutNode::new(PositionedItemId::from_raw("state:p"));
        child.x = Some(10.0);
        child.y = Some(12.0);
        child.edges.push(edge(
            "edge:in:transition:a:0:b",
            "port:source:transition:a:0:b",
            "synth:target:transition:a:0:b",
            vec![EdgeSection {
                id: "s0".into(),
                start_point: Point::new(0.0, 0.0),
                bend_points: vec![Point::new(0.0, 5.0)],
                end_point: Point::new(5.0, 5.0),
            }],
        ));
        child.edges.push(edge(
            "edge:out:transition:a:0:b",
            "synth:source:transition:a:0:b",
            "port:transition:a:0:b",
            Vec::new(),
        ));
        root.children.push(child);

        let mut sizes = SizeMap::new();
        sizes.insert(
            PositionedItemId::from_raw("state:p"),
            Size::new(1.0, 1.0).with_padding(Padding::uniform(3.0)),
        );

        let map = flatten(&sizes, &root);
        assert_eq!(map.len(), 4);
        let p = &map[&PositionedItemId::from_raw("state:p")];
        assert_eq!((p.x, p.y, p.width), (10.0, 12.0, 0.0));
        assert_eq!(p.padding, Some(Padding::uniform(3.0)));

        let incoming = map[&PositionedItemId::from_raw("edge:in:transition:a:0:b")]
            .connector
            .clone()
            .unwrap();
        assert_eq!(incoming.points.len(), 3);
        assert!(!incoming.source_is_event);
        assert!(incoming.target_is_event);
        assert_eq!(incoming.container, Some(StateId::new("p")));

        let outgoing = map[&PositionedItemId::from_raw("edge:out:transition:a:0:b")]
            .connector
            .clone()
            .unwrap();
        assert!(outgoing.points.is_empty());
        assert!(outgoing.source_is_event);
    }
}
