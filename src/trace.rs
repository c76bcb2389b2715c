use crate::im::MaskIm;
use std::collections::{HashMap, HashSet};

/// Endpoints closer than this (in pixels) are treated as a closed loop.
pub const CLOSE_DISTANCE: f64 = 1.8;

/// Extra score granted to edges the walk has not traversed yet. The dot
/// product term is in [-1, 1], so an unused edge always outranks a used one
/// and straightness only ranks within each group.
const UNUSED_EDGE_BONUS: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dist(&self, other: &PointF) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Neighbor visit order. This is part of the walk's tie-break behavior:
/// the first candidate in this order wins equal scores, so reordering it
/// changes traced paths.
const NEIGHBOR_OFFSETS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

struct SkeletonGraph {
    pixels: Vec<(i32, i32)>,
    adjacency: Vec<Vec<usize>>,
}

impl SkeletonGraph {
    fn build(skeleton: &MaskIm) -> Self {
        let mut pixels: Vec<(i32, i32)> = Vec::new();
        let mut index_of: HashMap<(i32, i32), usize> = HashMap::new();

        for y in 0..skeleton.h {
            for x in 0..skeleton.w {
                if skeleton.at(x, y) != 0 {
                    index_of.insert((x as i32, y as i32), pixels.len());
                    pixels.push((x as i32, y as i32));
                }
            }
        }

        let adjacency = pixels
            .iter()
            .map(|&(px, py)| {
                NEIGHBOR_OFFSETS
                    .iter()
                    .filter_map(|&(dx, dy)| index_of.get(&(px + dx, py + dy)).copied())
                    .collect()
            })
            .collect();

        Self { pixels, adjacency }
    }
}

/// Walk state: the greedy step is a pure function of this plus the graph.
struct Walk {
    current: usize,
    previous: Option<usize>,
    used: HashSet<(usize, usize)>,
}

impl Walk {
    fn edge_key(a: usize, b: usize) -> (usize, usize) {
        (a.min(b), a.max(b))
    }

    /// Pick the best forward candidate: exclude the immediate predecessor,
    /// score by straightness plus the unused-edge bonus, first-listed wins
    /// ties (strict > comparison).
    fn next(&self, graph: &SkeletonGraph) -> Option<usize> {
        let (cx, cy) = graph.pixels[self.current];
        let dir_in = self.previous.map(|p| {
            let (px, py) = graph.pixels[p];
            let dx = (cx - px) as f64;
            let dy = (cy - py) as f64;
            let len = (dx * dx + dy * dy).sqrt();
            (dx / len, dy / len)
        });

        let mut best: Option<(usize, f64)> = None;
        for &cand in &graph.adjacency[self.current] {
            if Some(cand) == self.previous {
                continue;
            }

            let (nx, ny) = graph.pixels[cand];
            let dx = (nx - cx) as f64;
            let dy = (ny - cy) as f64;
            let len = (dx * dx + dy * dy).sqrt();
            let straightness = match dir_in {
                Some((ix, iy)) => ix * dx / len + iy * dy / len,
                None => 0.0,
            };

            let mut score = straightness;
            if !self.used.contains(&Self::edge_key(self.current, cand)) {
                score += UNUSED_EDGE_BONUS;
            }

            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((cand, score)),
            }
        }

        best.map(|(i, _)| i)
    }

    fn advance(&mut self, next: usize) {
        self.used.insert(Self::edge_key(self.current, next));
        self.previous = Some(self.current);
        self.current = next;
    }
}

fn walk_from(graph: &SkeletonGraph, start: usize, forced_first: Option<usize>) -> Vec<usize> {
    let mut path = vec![start];
    let mut walk = Walk {
        current: start,
        previous: None,
        used: HashSet::new(),
    };

    let step_bound = graph.pixels.len().saturating_mul(8);
    for step in 0..step_bound {
        let next = if step == 0 && forced_first.is_some() {
            forced_first
        } else {
            walk.next(graph)
        };
        let Some(next) = next else { break };

        path.push(next);
        walk.advance(next);

        if next == start {
            break;
        }
    }

    path
}

/// Trace the skeleton's pixels into one ordered path.
///
/// Starts at the first degree-1 pixel (row-major discovery order) when any
/// exists; otherwise the loop has no natural endpoint, so both initial
/// directions from the lexicographically smallest pixel are walked and the
/// longer result kept. Endpoints within [`CLOSE_DISTANCE`] are closed by
/// appending the first point.
pub fn trace_path(skeleton: &MaskIm) -> Vec<PointF> {
    let graph = SkeletonGraph::build(skeleton);
    if graph.pixels.is_empty() {
        return Vec::new();
    }

    let path = match graph.adjacency.iter().position(|adj| adj.len() == 1) {
        Some(endpoint) => walk_from(&graph, endpoint, None),
        None => {
            let start = (0..graph.pixels.len())
                .min_by_key(|&i| graph.pixels[i])
                .unwrap_or(0);

            let mut candidates = graph.adjacency[start].iter().take(2);
            let first = candidates.next().copied();
            let second = candidates.next().copied();

            let walk_a = walk_from(&graph, start, first);
            match second {
                Some(n) => {
                    let walk_b = walk_from(&graph, start, Some(n));
                    if walk_b.len() > walk_a.len() { walk_b } else { walk_a }
                }
                None => walk_a,
            }
        }
    };

    let mut points: Vec<PointF> = path
        .iter()
        .map(|&i| {
            let (x, y) = graph.pixels[i];
            PointF::new(x as f64, y as f64)
        })
        .collect();

    if points.len() >= 3 {
        let first = points[0];
        let last = points[points.len() - 1];
        if first != last && first.dist(&last) <= CLOSE_DISTANCE {
            points.push(first);
        }
    }

    points
}
