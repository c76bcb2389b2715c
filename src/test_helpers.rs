use crate::grid::Cell;
use crate::im::MaskIm;
use crate::mask::RasterImage;

/// Build a mask from an ascii grid: '#' = on, anything else = off.
pub fn mask_from_ascii(grid: &str) -> MaskIm {
    let rows: Vec<&str> = grid
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    let h = rows.len();
    assert!(h > 0, "grid must have at least one non-empty row");
    let w = rows[0].len();
    assert!(w > 0, "grid rows must be non-empty");
    for r in &rows {
        assert_eq!(r.len(), w, "all rows must have equal length");
    }

    let mut mask = MaskIm::new(w, h);
    for (y, row) in rows.iter().enumerate() {
        for (x, ch) in row.chars().enumerate() {
            if ch == '#' {
                mask.set(x, y, 255);
            }
        }
    }
    mask
}

pub fn mask_to_ascii(mask: &MaskIm) -> String {
    let mut out = String::new();
    for y in 0..mask.h {
        for x in 0..mask.w {
            out.push(if mask.at(x, y) != 0 { '#' } else { '.' });
        }
        out.push('\n');
    }
    out
}

/// Opaque grayscale raster: each value fills r, g, and b.
pub fn raster_from_gray(w: usize, h: usize, gray: &[u8]) -> RasterImage {
    assert_eq!(gray.len(), w * h, "gray buffer must be w*h");
    let mut rgba = Vec::with_capacity(w * h * 4);
    for &v in gray {
        rgba.extend_from_slice(&[v, v, v, 255]);
    }
    RasterImage::new(w, h, rgba)
}

/// White square image with a black ring: pixels whose distance from
/// (cx, cy) is within `half_width` of `radius` are black.
pub fn raster_ring(size: usize, cx: f64, cy: f64, radius: f64, half_width: f64) -> RasterImage {
    let mut gray = vec![255u8; size * size];
    for y in 0..size {
        for x in 0..size {
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            let d = (dx * dx + dy * dy).sqrt();
            if (d - radius).abs() <= half_width {
                gray[y * size + x] = 0;
            }
        }
    }
    raster_from_gray(size, size, &gray)
}

/// Clockwise rectangular loop of perimeter cells starting at (0, 0):
/// east along the top, south down the right edge, west along the bottom,
/// north back up the left edge.
pub fn rectangle_loop_cells(w: i32, h: i32) -> Vec<Cell> {
    assert!(w >= 2 && h >= 2, "rectangle must be at least 2x2");
    let mut cells: Vec<Cell> = Vec::with_capacity((2 * (w + h) - 4) as usize);
    for x in 0..w {
        cells.push((x, 0));
    }
    for y in 1..h {
        cells.push((w - 1, y));
    }
    for x in (0..w - 1).rev() {
        cells.push((x, h - 1));
    }
    for y in (1..h - 1).rev() {
        cells.push((0, y));
    }
    cells
}
