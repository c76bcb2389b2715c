use crate::im::MaskIm;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct ThinParams {
    /// Hard cap on thinning iterations; each iteration runs both sub-passes.
    pub max_iterations: usize,
    /// Endpoint-trimming passes applied after thinning.
    pub trim_passes: usize,
}

impl Default for ThinParams {
    fn default() -> Self {
        Self {
            max_iterations: 80,
            trim_passes: 1,
        }
    }
}

/// 8-neighborhood ring p2..p9, clockwise from north. Out-of-bounds reads as 0.
#[inline]
fn ring(mask: &MaskIm, x: usize, y: usize) -> [u8; 8] {
    let w = mask.w as isize;
    let h = mask.h as isize;
    let at = |dx: isize, dy: isize| -> u8 {
        let nx = x as isize + dx;
        let ny = y as isize + dy;
        if nx < 0 || ny < 0 || nx >= w || ny >= h {
            0
        } else if mask.at(nx as usize, ny as usize) != 0 {
            1
        } else {
            0
        }
    };
    [
        at(0, -1),  // p2 N
        at(1, -1),  // p3 NE
        at(1, 0),   // p4 E
        at(1, 1),   // p5 SE
        at(0, 1),   // p6 S
        at(-1, 1),  // p7 SW
        at(-1, 0),  // p8 W
        at(-1, -1), // p9 NW
    ]
}

/// Number of 0->1 transitions around the ring p2,p3,...,p9,p2.
#[inline]
fn transitions(p: &[u8; 8]) -> u32 {
    let mut a = 0;
    for i in 0..8 {
        if p[i] == 0 && p[(i + 1) % 8] == 1 {
            a += 1;
        }
    }
    a
}

/// One Zhang-Suen sub-pass. Candidates are gathered against the unmodified
/// mask and deleted as a batch afterwards; interleaving reads and writes
/// breaks the algorithm's connectivity guarantees.
fn thin_subpass(mask: &mut MaskIm, second: bool) -> usize {
    let mut doomed: Vec<(usize, usize)> = Vec::new();

    for y in 0..mask.h {
        for x in 0..mask.w {
            if mask.at(x, y) == 0 {
                continue;
            }
            let p = ring(mask, x, y);
            let b: u32 = p.iter().map(|&v| v as u32).sum();
            if !(2..=6).contains(&b) {
                continue;
            }
            if transitions(&p) != 1 {
                continue;
            }
            let (p2, p4, p6, p8) = (p[0], p[2], p[4], p[6]);
            let ok = if second {
                p2 * p4 * p8 == 0 && p2 * p6 * p8 == 0
            } else {
                p2 * p4 * p6 == 0 && p4 * p6 * p8 == 0
            };
            if ok {
                doomed.push((x, y));
            }
        }
    }

    for &(x, y) in &doomed {
        mask.set(x, y, 0);
    }
    doomed.len()
}

/// Zhang-Suen thinning: reduce the mask to a 1-pixel-wide skeleton.
///
/// Runs mirrored sub-pass pairs until an iteration removes nothing or
/// `max_iterations` is hit. Output is always a subset of the input, and
/// re-running on a converged mask changes nothing.
pub fn thin(src: &MaskIm, params: &ThinParams) -> MaskIm {
    let mut mask = src.clone();

    for iter in 0..params.max_iterations {
        let removed = thin_subpass(&mut mask, false) + thin_subpass(&mut mask, true);
        if removed == 0 {
            debug!(iterations = iter, on = mask.count_on(), "thinning converged");
            break;
        }
    }

    mask
}

/// Thin to a 1-pixel skeleton, then prune spurs: the full stage as the
/// pipeline runs it.
pub fn skeletonize(src: &MaskIm, params: &ThinParams) -> MaskIm {
    trim_endpoints(&thin(src, params), params.trim_passes)
}

/// Remove pixels with at most one active neighbor, `passes` times.
///
/// Prunes the short spurs thinning leaves at stroke junctions. Each pass
/// gathers candidates against the unmodified mask, so a long tail loses one
/// pixel per pass.
pub fn trim_endpoints(src: &MaskIm, passes: usize) -> MaskIm {
    let mut mask = src.clone();

    for _ in 0..passes {
        let mut doomed: Vec<(usize, usize)> = Vec::new();
        for y in 0..mask.h {
            for x in 0..mask.w {
                if mask.at(x, y) == 0 {
                    continue;
                }
                let p = ring(&mask, x, y);
                let b: u32 = p.iter().map(|&v| v as u32).sum();
                if b <= 1 {
                    doomed.push((x, y));
                }
            }
        }
        if doomed.is_empty() {
            break;
        }
        for &(x, y) in &doomed {
            mask.set(x, y, 0);
        }
    }

    mask
}
