use crate::trace::{CLOSE_DISTANCE, PointF};

/// Perpendicular distance from `p` to the line through `a` and `b`.
/// When `a` and `b` coincide, falls back to point distance.
fn perpendicular_distance(p: &PointF, a: &PointF, b: &PointF) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.dist(a);
    }
    let cross = dx * (a.y - p.y) - dy * (a.x - p.x);
    cross.abs() / len_sq.sqrt()
}

/// Ramer-Douglas-Peucker over an open point run. Iterative with an explicit
/// segment stack: traced paths can run to tens of thousands of points and
/// recursion depth would track the worst split chain.
fn rdp_keep(points: &[PointF], epsilon: f64, kept: &mut [bool]) {
    kept[0] = true;
    kept[points.len() - 1] = true;

    let mut stack: Vec<(usize, usize)> = vec![(0, points.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }

        let mut max_dist = 0.0;
        let mut max_idx = start;
        for i in (start + 1)..end {
            let d = perpendicular_distance(&points[i], &points[start], &points[end]);
            if d > max_dist {
                max_dist = d;
                max_idx = i;
            }
        }

        if max_dist > epsilon {
            kept[max_idx] = true;
            stack.push((start, max_idx));
            stack.push((max_idx, end));
        }
    }
}

fn lexicographic_min_index(points: &[PointF]) -> usize {
    let mut best = 0;
    for (i, p) in points.iter().enumerate().skip(1) {
        let b = &points[best];
        if (p.x, p.y) < (b.x, b.y) {
            best = i;
        }
    }
    best
}

/// Reduce the path to its salient vertices.
///
/// Closed loops (endpoints within [`CLOSE_DISTANCE`]) are first rotated to
/// start at the lexicographically smallest point so the result does not
/// depend on where the trace happened to start, then re-closed.
pub fn simplify(points: &[PointF], epsilon: f64) -> Vec<PointF> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];
    let closed = first == last || first.dist(&last) <= CLOSE_DISTANCE;

    if closed {
        // Drop the duplicate closing point before rotating, if present.
        let ring = if first == last {
            &points[..points.len() - 1]
        } else {
            points
        };
        if ring.len() < 3 {
            return points.to_vec();
        }

        let pivot = lexicographic_min_index(ring);
        let mut rotated: Vec<PointF> = Vec::with_capacity(ring.len());
        rotated.extend_from_slice(&ring[pivot..]);
        rotated.extend_from_slice(&ring[..pivot]);

        let mut kept = vec![false; rotated.len()];
        rdp_keep(&rotated, epsilon, &mut kept);

        let mut out: Vec<PointF> = rotated
            .iter()
            .zip(&kept)
            .filter(|&(_, k)| *k)
            .map(|(&p, _)| p)
            .collect();
        out.push(out[0]);
        out
    } else {
        let mut kept = vec![false; points.len()];
        rdp_keep(points, epsilon, &mut kept);
        points
            .iter()
            .zip(&kept)
            .filter(|&(_, k)| *k)
            .map(|(&p, _)| p)
            .collect()
    }
}

/// Resample the simplified path to near-uniform spacing.
///
/// Emits `max(min_points, floor(total_length / spacing))` points at equal
/// arc-length increments, interpolating linearly between vertices. Closed
/// paths get the first point duplicated at the end.
pub fn resample(points: &[PointF], spacing: f64, min_points: usize) -> Vec<PointF> {
    if points.len() < 2 {
        return points.to_vec();
    }

    let closed = points[0] == points[points.len() - 1];

    // Cumulative arc length per vertex.
    let mut cum: Vec<f64> = Vec::with_capacity(points.len());
    cum.push(0.0);
    for pair in points.windows(2) {
        let d = pair[0].dist(&pair[1]);
        cum.push(cum[cum.len() - 1] + d);
    }
    let total = cum[cum.len() - 1];
    if total <= 0.0 {
        return points.to_vec();
    }

    let n = min_points.max((total / spacing).floor() as usize).max(2);
    let step = if closed {
        total / n as f64
    } else {
        total / (n - 1) as f64
    };

    let mut out: Vec<PointF> = Vec::with_capacity(n + 1);
    let mut seg = 0usize;
    for i in 0..n {
        let target = (i as f64 * step).min(total);
        while seg + 2 < cum.len() && cum[seg + 1] < target {
            seg += 1;
        }
        let seg_len = cum[seg + 1] - cum[seg];
        let t = if seg_len > 0.0 {
            (target - cum[seg]) / seg_len
        } else {
            0.0
        };
        let a = &points[seg];
        let b = &points[seg + 1];
        out.push(PointF::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t));
    }

    if closed {
        out.push(out[0]);
    }
    out
}
