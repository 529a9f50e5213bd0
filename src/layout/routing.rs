//! Port placement and edge geometry for the built-in layered solver.

use super::types::Point;
use crate::ir::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum EdgeSide {
    Left,
    Right,
    Top,
    Bottom,
}

/// Which way an edge leaves or enters a node through a port.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum PortRole {
    Incoming,
    Outgoing,
    /// Source port of an edge ending inside its own container; sits `depth`
    /// below the border so it clears the header band.
    Interior { depth: f32 },
    LoopOut { index: usize, count: usize },
    LoopIn { index: usize, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(super) struct Rect {
    pub(super) x: f32,
    pub(super) y: f32,
    pub(super) width: f32,
    pub(super) height: f32,
}

impl Rect {
    pub(super) fn right(&self) -> f32 {
        self.x + self.width
    }

    pub(super) fn bottom(&self) -> f32 {
        self.y + self.height
    }
}

pub(super) fn incoming_side(direction: Direction) -> EdgeSide {
    match direction {
        Direction::Vertical => EdgeSide::Top,
        Direction::Horizontal => EdgeSide::Left,
    }
}

pub(super) fn outgoing_side(direction: Direction) -> EdgeSide {
    match direction {
        Direction::Vertical => EdgeSide::Bottom,
        Direction::Horizontal => EdgeSide::Right,
    }
}

/// Self-loops hang off the side parallel to the layering direction.
pub(super) fn loop_side(direction: Direction) -> EdgeSide {
    match direction {
        Direction::Vertical => EdgeSide::Right,
        Direction::Horizontal => EdgeSide::Bottom,
    }
}

/// Point on `side` of a `width`×`height` box, `fraction` of the way along it,
/// relative to the box origin.
pub(super) fn side_point(width: f32, height: f32, side: EdgeSide, fraction: f32) -> Point {
    match side {
        EdgeSide::Top => Point::new(width * fraction, 0.0),
        EdgeSide::Bottom => Point::new(width * fraction, height),
        EdgeSide::Left => Point::new(0.0, height * fraction),
        EdgeSide::Right => Point::new(width, height * fraction),
    }
}

/// Relative port positions for one node, in the order of `roles`.
pub(super) fn place_ports(width: f32, height: f32, direction: Direction, roles: &[PortRole]) -> Vec<Point> {
    let count = |wanted: fn(&PortRole) -> bool| roles.iter().filter(|r| wanted(r)).count();
    let incoming_total = count(|r| matches!(r, PortRole::Incoming));
    let outgoing_total = count(|r| matches!(r, PortRole::Outgoing));
    let interior_total = count(|r| matches!(r, PortRole::Interior { .. }));
    let (mut incoming_seen, mut outgoing_seen, mut interior_seen) = (0, 0, 0);

    let spread = |seen: usize, total: usize| (seen + 1) as f32 / (total + 1) as f32;

    roles
        .iter()
        .map(|role| match *role {
            PortRole::Incoming => {
                incoming_seen += 1;
                side_point(
                    width,
                    height,
                    incoming_side(direction),
                    spread(incoming_seen - 1, incoming_total),
                )
            }
            PortRole::Outgoing => {
                outgoing_seen += 1;
                side_point(
                    width,
                    height,
                    outgoing_side(direction),
                    spread(outgoing_seen - 1, outgoing_total),
                )
            }
            PortRole::Interior { depth } => {
                interior_seen += 1;
                let x = width * spread(interior_seen - 1, interior_total);
                Point::new(x, depth.clamp(0.0, height))
            }
            PortRole::LoopOut { index, count } => {
                side_point(width, height, loop_side(direction), loop_fraction(index, count).0)
            }
            PortRole::LoopIn { index, count } => {
                side_point(width, height, loop_side(direction), loop_fraction(index, count).1)
            }
        })
        .collect()
}

/// Exit and entry fractions along the loop side for loop `index` of `count`.
fn loop_fraction(index: usize, count: usize) -> (f32, f32) {
    let slots = (2 * count + 1) as f32;
    ((2 * index + 1) as f32 / slots, (2 * index + 2) as f32 / slots)
}

/// Orthogonal elbow between two port positions, bending halfway along the
/// layering axis.
pub(super) fn elbow_bends(start: Point, end: Point, direction: Direction) -> Vec<Point> {
    match direction {
        Direction::Vertical => {
            if (start.x - end.x).abs() < 0.5 {
                return Vec::new();
            }
            let mid = (start.y + end.y) / 2.0;
            vec![Point::new(start.x, mid), Point::new(end.x, mid)]
        }
        Direction::Horizontal => {
            if (start.y - end.y).abs() < 0.5 {
                return Vec::new();
            }
            let mid = (start.x + end.x) / 2.0;
            vec![Point::new(mid, start.y), Point::new(mid, end.y)]
        }
    }
}

/// Bend points of loop `index`: out from the loop side, along it, and back.
pub(super) fn self_loop_bends(
    frame: &Rect,
    direction: Direction,
    start: Point,
    end: Point,
    index: usize,
    spacing: f32,
) -> Vec<Point> {
    let reach = spacing * (index + 1) as f32;
    match loop_side(direction) {
        EdgeSide::Right => {
            let x = frame.right() + reach;
            vec![Point::new(x, start.y), Point::new(x, end.y)]
        }
        _ => {
            let y = frame.bottom() + reach;
            vec![Point::new(start.x, y), Point::new(end.x, y)]
        }
    }
}

/// Extra room a node needs next to it for `labels.len()` stacked self-loops
/// and their labels.
pub(super) fn self_loop_reserve(
    width: f32,
    height: f32,
    direction: Direction,
    labels: &[(f32, f32)],
    spacing: f32,
) -> (f32, f32) {
    if labels.is_empty() {
        return (0.0, 0.0);
    }
    let gap = spacing / 2.0;
    let loops = spacing * labels.len() as f32;
    let max_width = labels.iter().map(|l| l.0).fold(0.0, f32::max);
    let stacked = labels.iter().map(|l| l.1).sum::<f32>() + gap * (labels.len() - 1) as f32;
    match loop_side(direction) {
        EdgeSide::Right => (loops + gap + max_width, (stacked - height).max(0.0)),
        _ => ((max_width - width).max(0.0), loops + gap + stacked),
    }
}

/// Top-left corner of the label of loop `index`, inside the reserved band.
pub(super) fn self_loop_label_origin(
    frame: &Rect,
    direction: Direction,
    labels: &[(f32, f32)],
    index: usize,
    spacing: f32,
) -> Point {
    let gap = spacing / 2.0;
    let loops = spacing * labels.len() as f32;
    let above: f32 = labels.iter().take(index).map(|l| l.1 + gap).sum();
    match loop_side(direction) {
        EdgeSide::Right => Point::new(frame.right() + loops + gap, frame.y + above),
        _ => Point::new(frame.x, frame.bottom() + loops + gap + above),
    }
}

/// Midpoint of a route, used to anchor labels on ordinary edges.
pub(super) fn route_midpoint(start: Point, bends: &[Point], end: Point) -> Point {
    match bends {
        [first, .., last] => Point::new((first.x + last.x) / 2.0, (first.y + last.y) / 2.0),
        [only] => *only,
        [] => Point::new((start.x + end.x) / 2.0, (start.y + end.y) / 2.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_spread_along_their_sides() {
        let roles = [
            PortRole::Incoming,
            PortRole::Incoming,
            PortRole::Outgoing,
            PortRole::Interior { depth: 30.0 },
        ];
        let points = place_ports(90.0, 60.0, Direction::Vertical, &roles);
        assert_eq!(points[0], Point::new(30.0, 0.0));
        assert_eq!(points[1], Point::new(60.0, 0.0));
        assert_eq!(points[2], Point::new(45.0, 60.0));
        assert_eq!(points[3], Point::new(45.0, 30.0));
    }

    #[test]
    fn loops_nest_outward() {
        let frame = Rect {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
        };
        let first = self_loop_bends(&frame, Direction::Vertical, Point::new(50.0, 10.0), Point::new(50.0, 20.0), 0, 10.0);
        let second = self_loop_bends(&frame, Direction::Vertical, Point::new(50.0, 30.0), Point::new(50.0, 40.0), 1, 10.0);
        assert_eq!(first[0].x, 60.0);
        assert_eq!(second[0].x, 70.0);
    }

    #[test]
    fn loop_labels_fit_inside_reserve() {
        let labels = [(40.0, 12.0), (25.0, 12.0)];
        let (extra_w, _) = self_loop_reserve(50.0, 50.0, Direction::Vertical, &labels, 10.0);
        let frame = Rect {
            x: 0.0,
            y: 0.0,
            width: 50.0,
            height: 50.0,
        };
        let origin = self_loop_label_origin(&frame, Direction::Vertical, &labels, 0, 10.0);
        assert!(origin.x + labels[0].0 <= frame.right() + extra_w);
        let second = self_loop_label_origin(&frame, Direction::Vertical, &labels, 1, 10.0);
        assert_eq!(second.y, 17.0);
    }

    #[test]
    fn straight_edges_have_no_bends() {
        assert!(elbow_bends(Point::new(5.0, 0.0), Point::new(5.0, 40.0), Direction::Vertical).is_empty());
        let bends = elbow_bends(Point::new(0.0, 0.0), Point::new(10.0, 40.0), Direction::Vertical);
        assert_eq!(bends, vec![Point::new(0.0, 20.0), Point::new(10.0, 20.0)]);
    }
}
