//! Deterministic layering used when dagre cannot place a container.
//!
//! Nodes are identified by their index in declaration order, which is also the
//! tie-break everywhere a choice has to be made.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::types::Point;
use crate::ir::Direction;

/// Longest-path ranks over a topological order. Cycles are broken by taking
/// the earliest declared remaining node as the next source.
pub(super) fn compute_ranks(count: usize, edges: &[(usize, usize)]) -> Vec<usize> {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut indeg = vec![0usize; count];
    for &(from, to) in edges {
        if from < count && to < count && from != to {
            adj[from].push(to);
            indeg[to] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..count)
        .filter(|&idx| indeg[idx] == 0)
        .map(Reverse)
        .collect();
    let mut processed = vec![false; count];
    let mut order = Vec::with_capacity(count);
    loop {
        while let Some(Reverse(idx)) = ready.pop() {
            if processed[idx] {
                continue;
            }
            processed[idx] = true;
            order.push(idx);
            for &next in &adj[idx] {
                if processed[next] {
                    continue;
                }
                indeg[next] = indeg[next].saturating_sub(1);
                if indeg[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        if order.len() >= count {
            break;
        }
        match (0..count).find(|&idx| !processed[idx]) {
            Some(idx) => ready.push(Reverse(idx)),
            None => break,
        }
    }

    let mut position = vec![0usize; count];
    for (pos, &idx) in order.iter().enumerate() {
        position[idx] = pos;
    }
    let mut ranks = vec![0usize; count];
    for &idx in &order {
        let rank = ranks[idx];
        for &next in &adj[idx] {
            if position[next] > position[idx] {
                ranks[next] = ranks[next].max(rank + 1);
            }
        }
    }
    ranks
}

/// Median-heuristic sweeps reducing crossings between adjacent ranks.
pub(super) fn order_rank_nodes(rank_nodes: &mut [Vec<usize>], edges: &[(usize, usize)], passes: usize) {
    if rank_nodes.len() <= 1 {
        return;
    }
    let mut incoming: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut outgoing: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(from, to) in edges {
        outgoing.entry(from).or_default().push(to);
        incoming.entry(to).or_default().push(from);
    }

    let mut positions: HashMap<usize, usize> = HashMap::new();
    let update_positions = |rank_nodes: &[Vec<usize>], positions: &mut HashMap<usize, usize>| {
        positions.clear();
        for bucket in rank_nodes {
            for (pos, &idx) in bucket.iter().enumerate() {
                positions.insert(idx, pos);
            }
        }
    };
    update_positions(rank_nodes, &mut positions);

    let sort_bucket = |bucket: &mut Vec<usize>,
                       neighbors: &HashMap<usize, Vec<usize>>,
                       positions: &HashMap<usize, usize>| {
        let current: HashMap<usize, usize> =
            bucket.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();
        bucket.sort_by(|a, b| {
            let a_score = median_position(*a, neighbors, positions, &current);
            let b_score = median_position(*b, neighbors, positions, &current);
            a_score
                .partial_cmp(&b_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| current[a].cmp(&current[b]))
        });
    };

    for _ in 0..passes.max(1) {
        for rank in 1..rank_nodes.len() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], &incoming, &positions);
                update_positions(rank_nodes, &mut positions);
            }
        }
        for rank in (0..rank_nodes.len() - 1).rev() {
            if rank_nodes[rank].len() > 1 {
                sort_bucket(&mut rank_nodes[rank], &outgoing, &positions);
                update_positions(rank_nodes, &mut positions);
            }
        }
    }
}

fn median_position(
    idx: usize,
    neighbors: &HashMap<usize, Vec<usize>>,
    positions: &HashMap<usize, usize>,
    current: &HashMap<usize, usize>,
) -> f32 {
    let fallback = current.get(&idx).copied().unwrap_or(0) as f32;
    let Some(list) = neighbors.get(&idx) else {
        return fallback;
    };
    let mut values: Vec<f32> = list
        .iter()
        .filter_map(|n| positions.get(n).map(|p| *p as f32))
        .collect();
    if values.is_empty() {
        return fallback;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) * 0.5
    }
}

/// Top-left corners for boxes of the given sizes, ranks stacked along the
/// layout direction and each rank centered on the cross axis.
pub(super) fn place_ranked(
    sizes: &[(f32, f32)],
    edges: &[(usize, usize)],
    direction: Direction,
    node_spacing: f32,
    rank_spacing: f32,
) -> Vec<Point> {
    let ranks = compute_ranks(sizes.len(), edges);
    let rank_count = ranks.iter().copied().max().map_or(0, |max| max + 1);
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (idx, &rank) in ranks.iter().enumerate() {
        buckets[rank].push(idx);
    }
    order_rank_nodes(&mut buckets, edges, 4);

    let primary = |&(w, h): &(f32, f32)| match direction {
        Direction::Vertical => h,
        Direction::Horizontal => w,
    };
    let cross = |&(w, h): &(f32, f32)| match direction {
        Direction::Vertical => w,
        Direction::Horizontal => h,
    };

    let mut out = vec![Point::default(); sizes.len()];
    let mut offset = 0.0;
    for bucket in &buckets {
        let thickness = bucket.iter().map(|&i| primary(&sizes[i])).fold(0.0, f32::max);
        let span: f32 = bucket.iter().map(|&i| cross(&sizes[i])).sum::<f32>()
            + node_spacing * bucket.len().saturating_sub(1) as f32;
        let mut along = -span / 2.0;
        for &idx in bucket {
            let lead = offset + (thickness - primary(&sizes[idx])) / 2.0;
            out[idx] = match direction {
                Direction::Vertical => Point::new(along, lead),
                Direction::Horizontal => Point::new(lead, along),
            };
            along += cross(&sizes[idx]) + node_spacing;
        }
        offset += thickness + rank_spacing;
    }
    out
}
