use crate::error::ConvertError;
use crate::trace::PointF;
use tracing::debug;

pub type Cell = (i32, i32);

/// Tracks shorter than this are not drivable; the classifier needs room for
/// distinct start and finish pieces plus actual corners.
pub const MIN_CELLS: usize = 24;

/// Scale fitting stops once actual/desired is within this ratio.
const FIT_TOLERANCE: f64 = 0.015;

/// Hard cap on re-quantize rounds. The loop is not guaranteed to converge;
/// callers accept whatever scale stands when the cap is hit.
const FIT_MAX_ITERATIONS: usize = 4;

#[derive(Debug, Clone)]
pub struct GridOutcome {
    pub cells: Vec<Cell>,
    pub scale: f64,
    pub fit_iterations: usize,
}

fn centroid(points: &[PointF]) -> PointF {
    let n = points.len().max(1) as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    PointF::new(sx / n, sy / n)
}

/// Connect two cells with unit cardinal steps: always advance along the axis
/// with the larger remaining absolute delta, ties prefer x. Never emits
/// diagonal moves.
fn cardinal_steps(from: Cell, to: Cell, out: &mut Vec<Cell>) {
    let (mut x, mut y) = from;
    while (x, y) != to {
        let dx = to.0 - x;
        let dy = to.1 - y;
        if dx.abs() >= dy.abs() {
            x += dx.signum();
        } else {
            y += dy.signum();
        }
        out.push((x, y));
    }
}

/// Drop immediate A->B->A oscillations (and consecutive duplicates) that
/// rounding can introduce around near-diagonal runs.
fn collapse_oscillations(cells: &[Cell]) -> Vec<Cell> {
    let mut out: Vec<Cell> = Vec::with_capacity(cells.len());
    for &c in cells {
        if out.last() == Some(&c) {
            continue;
        }
        if out.len() >= 2 && out[out.len() - 2] == c {
            out.pop();
            continue;
        }
        out.push(c);
    }
    out
}

/// Center the path on its centroid, scale, snap to integer cells, and
/// connect everything with cardinal-only unit steps.
///
/// For closed paths the returned cell list has the duplicate final cell
/// dropped: the closure is implied, and the wraparound pair is also
/// connected with cardinal steps.
pub fn quantize(points: &[PointF], scale: f64, closed: bool) -> Vec<Cell> {
    if points.is_empty() {
        return Vec::new();
    }

    // Exclude the duplicate closing point from the centroid so it doesn't
    // double-weight the loop's start.
    let ring = if closed && points.len() >= 2 && points[0] == points[points.len() - 1] {
        &points[..points.len() - 1]
    } else {
        points
    };
    let c = centroid(ring);

    let mut snapped: Vec<Cell> = Vec::with_capacity(ring.len());
    for p in ring {
        let cell = (
            ((p.x - c.x) * scale).round() as i32,
            ((p.y - c.y) * scale).round() as i32,
        );
        if snapped.last() != Some(&cell) {
            snapped.push(cell);
        }
    }
    if snapped.is_empty() {
        return Vec::new();
    }

    let mut stepped: Vec<Cell> = Vec::with_capacity(snapped.len() * 2);
    stepped.push(snapped[0]);
    for pair in snapped.windows(2) {
        cardinal_steps(pair[0], pair[1], &mut stepped);
    }
    if closed {
        // Walk back to the start so the loop is complete, then drop the
        // duplicated start cell for the list representation.
        cardinal_steps(stepped[stepped.len() - 1], snapped[0], &mut stepped);
    }

    let mut cells = collapse_oscillations(&stepped);
    if closed && cells.len() >= 2 && cells[0] == cells[cells.len() - 1] {
        cells.pop();
    }
    cells
}

fn segment_count(cells: &[Cell], closed: bool) -> usize {
    if closed {
        cells.len()
    } else {
        cells.len().saturating_sub(1)
    }
}

fn ensure_min_cells(cells: &[Cell]) -> Result<(), ConvertError> {
    if cells.len() < MIN_CELLS {
        return Err(ConvertError::GridTooShort { cells: cells.len() });
    }
    Ok(())
}

/// Quantize at a fixed scale (one-to-one or manual ratio modes).
pub fn quantize_checked(
    points: &[PointF],
    scale: f64,
    closed: bool,
) -> Result<GridOutcome, ConvertError> {
    let cells = quantize(points, scale, closed);
    ensure_min_cells(&cells)?;
    Ok(GridOutcome {
        cells,
        scale,
        fit_iterations: 0,
    })
}

/// Quantize while fitting the cell count toward `desired_segments`.
///
/// Recomputes scale as desired/actual and re-quantizes, up to
/// [`FIT_MAX_ITERATIONS`] rounds or until the ratio is within
/// [`FIT_TOLERANCE`]. The cap is deliberate: convergence is not guaranteed
/// and the result after the cap stands.
pub fn fit_to_target(
    points: &[PointF],
    desired_segments: usize,
    closed: bool,
    initial_scale: f64,
) -> Result<GridOutcome, ConvertError> {
    let desired = desired_segments.max(1) as f64;
    let mut scale = initial_scale.max(f64::MIN_POSITIVE);
    let mut cells = quantize(points, scale, closed);
    let mut iterations = 0usize;

    for _ in 0..FIT_MAX_ITERATIONS {
        let actual = segment_count(&cells, closed);
        if actual == 0 {
            break;
        }
        let ratio = actual as f64 / desired;
        if (ratio - 1.0).abs() <= FIT_TOLERANCE {
            break;
        }
        scale *= desired / actual as f64;
        cells = quantize(points, scale, closed);
        iterations += 1;
    }

    debug!(
        cells = cells.len(),
        scale, iterations, desired_segments, "grid fit"
    );

    ensure_min_cells(&cells)?;
    Ok(GridOutcome {
        cells,
        scale,
        fit_iterations: iterations,
    })
}
