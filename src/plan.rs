use crate::error::ConvertError;
use crate::grid::Cell;
use crate::track::{
    BLOCK_FINISH, BLOCK_ROAD, BLOCK_START, BLOCK_TURN_LEFT, BLOCK_TURN_RIGHT,
};
use std::collections::HashMap;
use tracing::debug;

// Heading
// -----------------------------------------------------------------------------

/// Cardinal travel direction on the grid, y growing downward. The u8 ids
/// double as piece rotations on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heading {
    East,
    South,
    West,
    North,
}

impl Heading {
    pub fn id(self) -> u8 {
        match self {
            Heading::East => 0,
            Heading::South => 1,
            Heading::West => 2,
            Heading::North => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Heading::East),
            1 => Some(Heading::South),
            2 => Some(Heading::West),
            3 => Some(Heading::North),
            _ => None,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Heading::East => (1, 0),
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
            Heading::North => (0, -1),
        }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (1, 0) => Some(Heading::East),
            (0, 1) => Some(Heading::South),
            (-1, 0) => Some(Heading::West),
            (0, -1) => Some(Heading::North),
            _ => None,
        }
    }

    /// Clockwise in screen coordinates (E -> S -> W -> N).
    pub fn rotate_cw(self) -> Self {
        Heading::from_id((self.id() + 1) % 4).unwrap_or(self)
    }

    pub fn rotate_ccw(self) -> Self {
        Heading::from_id((self.id() + 3) % 4).unwrap_or(self)
    }
}

// Piece classification
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub cell: Cell,
    pub inbound: Heading,
    pub outbound: Heading,
    pub block_type: u8,
    pub rotation: u8,
    pub start_order: Option<u32>,
    pub checkpoint_order: Option<u16>,
}

fn heading_between(from: Cell, to: Cell) -> Heading {
    Heading::from_delta(to.0 - from.0, to.1 - from.1)
        .unwrap_or_else(|| panic!("non-cardinal step {from:?} -> {to:?}"))
}

/// Classify the quantized centerline into typed, rotated pieces.
///
/// First cell becomes the start (rotation = outbound, start order 0); the
/// designated finish index is the midpoint for closed loops and the last
/// cell otherwise. Straights keep their heading; the turn rotations are
/// asymmetric on purpose — a right turn stores the inbound heading, a left
/// turn stores the inbound advanced one step — to match the game's piece
/// geometry.
pub fn classify_pieces(cells: &[Cell], closed: bool) -> Vec<Piece> {
    let n = cells.len();
    let finish_idx = if closed { n / 2 } else { n - 1 };

    let mut pieces: Vec<Piece> = Vec::with_capacity(n);
    for i in 0..n {
        let cell = cells[i];

        let inbound_from_prev = if closed {
            Some(heading_between(cells[(i + n - 1) % n], cell))
        } else if i > 0 {
            Some(heading_between(cells[i - 1], cell))
        } else {
            None
        };
        let outbound_to_next = if closed {
            Some(heading_between(cell, cells[(i + 1) % n]))
        } else if i + 1 < n {
            Some(heading_between(cell, cells[i + 1]))
        } else {
            None
        };

        // Edge-bounded ends mirror the one heading they have.
        let inbound = inbound_from_prev
            .or(outbound_to_next)
            .unwrap_or_else(|| panic!("isolated cell at index {i}"));
        let outbound = outbound_to_next.unwrap_or(inbound);

        let piece = if i == 0 {
            Piece {
                cell,
                inbound,
                outbound,
                block_type: BLOCK_START,
                rotation: outbound.id(),
                start_order: Some(0),
                checkpoint_order: None,
            }
        } else if i == finish_idx {
            Piece {
                cell,
                inbound,
                outbound,
                block_type: BLOCK_FINISH,
                rotation: outbound.id(),
                start_order: None,
                checkpoint_order: None,
            }
        } else if inbound == outbound {
            Piece {
                cell,
                inbound,
                outbound,
                block_type: BLOCK_ROAD,
                rotation: outbound.id(),
                start_order: None,
                checkpoint_order: None,
            }
        } else if outbound == inbound.rotate_cw() {
            Piece {
                cell,
                inbound,
                outbound,
                block_type: BLOCK_TURN_RIGHT,
                rotation: inbound.id(),
                start_order: None,
                checkpoint_order: None,
            }
        } else if outbound == inbound.rotate_ccw() {
            Piece {
                cell,
                inbound,
                outbound,
                block_type: BLOCK_TURN_LEFT,
                rotation: inbound.rotate_cw().id(),
                start_order: None,
                checkpoint_order: None,
            }
        } else {
            panic!("reversal at cell {cell:?}; oscillation collapse should prevent this");
        };
        pieces.push(piece);
    }

    pieces
}

// Heading votes
// -----------------------------------------------------------------------------

/// Per-cell heading tally. The winner is the most-voted heading; ties go to
/// the heading whose first vote arrived earliest, which keeps expansion
/// independent of map iteration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadingTally {
    counts: [u32; 4],
    // Vote sequence number + 1 of the first vote per heading; 0 = none yet.
    first_seen: [u32; 4],
}

impl HeadingTally {
    fn vote(&mut self, heading: Heading, seq: u32) {
        let i = heading.id() as usize;
        self.counts[i] += 1;
        if self.first_seen[i] == 0 {
            self.first_seen[i] = seq + 1;
        }
    }

    pub fn winner(&self) -> Heading {
        let mut best = 0usize;
        for i in 1..4 {
            let better = self.counts[i] > self.counts[best]
                || (self.counts[i] == self.counts[best]
                    && self.first_seen[i] != 0
                    && (self.first_seen[best] == 0 || self.first_seen[i] < self.first_seen[best]));
            if better {
                best = i;
            }
        }
        Heading::from_id(best as u8).unwrap_or(Heading::East)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CellMap {
    cells: HashMap<Cell, HeadingTally>,
}

impl CellMap {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains_key(&cell)
    }

    fn vote(&mut self, cell: Cell, heading: Heading, seq: &mut u32) {
        self.cells.entry(cell).or_default().vote(heading, *seq);
        *seq += 1;
    }

    /// Cells with their winning headings, in (x, y) order. This is the
    /// deterministic emission order for part placement.
    pub fn sorted_winners(&self) -> Vec<(Cell, Heading)> {
        let mut out: Vec<(Cell, Heading)> = self
            .cells
            .iter()
            .map(|(&cell, tally)| (cell, tally.winner()))
            .collect();
        out.sort_unstable_by_key(|&(cell, _)| cell);
        out
    }
}

// Width / border synthesis
// -----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrackPlan {
    pub pieces: Vec<Piece>,
    pub road: CellMap,
    pub border: CellMap,
}

/// Expand the centerline to `width_tiles` and derive the border ring.
///
/// Every centerline cell casts its heading at itself and at `radius` cells
/// to each side, perpendicular to its travel direction. Border cells are the
/// 4-neighbors of road cells that are not road themselves; their vote is the
/// adjacent road cell's heading rotated clockwise. Road and border are
/// checked disjoint on every build.
pub fn synthesize_plan(
    pieces: Vec<Piece>,
    width_tiles: usize,
    border_enabled: bool,
) -> Result<TrackPlan, ConvertError> {
    let radius = if width_tiles > 1 {
        (((width_tiles - 1) as f64) / 2.0).round() as i32
    } else {
        0
    };

    let mut road = CellMap::default();
    let mut seq = 0u32;
    for piece in &pieces {
        let h = piece.outbound;
        road.vote(piece.cell, h, &mut seq);

        let left = h.rotate_ccw().delta();
        let right = h.rotate_cw().delta();
        for d in 1..=radius {
            road.vote((piece.cell.0 + left.0 * d, piece.cell.1 + left.1 * d), h, &mut seq);
            road.vote(
                (piece.cell.0 + right.0 * d, piece.cell.1 + right.1 * d),
                h,
                &mut seq,
            );
        }
    }

    let mut border = CellMap::default();
    if border_enabled {
        let mut seq = 0u32;
        for (cell, heading) in road.sorted_winners() {
            let tangent = heading.rotate_cw();
            for h in [Heading::East, Heading::South, Heading::West, Heading::North] {
                let (dx, dy) = h.delta();
                let neighbor = (cell.0 + dx, cell.1 + dy);
                if !road.contains(neighbor) {
                    border.vote(neighbor, tangent, &mut seq);
                }
            }
        }
    }

    for (cell, _) in border.sorted_winners() {
        if road.contains(cell) {
            return Err(ConvertError::InvariantViolation {
                what: format!("cell {cell:?} is in both the road and border maps"),
            });
        }
    }

    debug!(
        pieces = pieces.len(),
        road = road.len(),
        border = border.len(),
        width_tiles,
        "plan synthesized"
    );

    Ok(TrackPlan {
        pieces,
        road,
        border,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::rectangle_loop_cells;
    use crate::track::{BLOCK_FINISH, BLOCK_START, BLOCK_TURN_RIGHT};

    #[test]
    fn heading_rotations_cycle() {
        assert_eq!(Heading::East.rotate_cw(), Heading::South);
        assert_eq!(Heading::North.rotate_cw(), Heading::East);
        assert_eq!(Heading::East.rotate_ccw(), Heading::North);
        for id in 0..4 {
            let h = Heading::from_id(id).unwrap();
            assert_eq!(h.rotate_cw().rotate_ccw(), h);
            assert_eq!(Heading::from_delta(h.delta().0, h.delta().1), Some(h));
        }
    }

    #[test]
    fn closed_loop_classifies_start_finish_and_turns() {
        // 8x6 clockwise rectangle: 24 cells, every corner is a right turn.
        let cells = rectangle_loop_cells(8, 6);
        assert_eq!(cells.len(), 24);

        let pieces = classify_pieces(&cells, true);
        assert_eq!(pieces.len(), 24);

        let starts: Vec<_> = pieces.iter().filter(|p| p.block_type == BLOCK_START).collect();
        let finishes: Vec<_> = pieces
            .iter()
            .filter(|p| p.block_type == BLOCK_FINISH)
            .collect();
        assert_eq!(starts.len(), 1);
        assert_eq!(finishes.len(), 1);
        assert_eq!(starts[0].start_order, Some(0));
        assert_eq!(starts[0].cell, cells[0]);
        assert_eq!(finishes[0].cell, cells[12]);

        // Start heads east along the top edge.
        assert_eq!(starts[0].rotation, Heading::East.id());

        // The free corners are right turns storing the inbound heading.
        let corner = pieces.iter().find(|p| p.cell == (7, 0)).unwrap();
        assert_eq!(corner.block_type, BLOCK_TURN_RIGHT);
        assert_eq!(corner.rotation, Heading::East.id());

        let corner = pieces.iter().find(|p| p.cell == (0, 5)).unwrap();
        assert_eq!(corner.block_type, BLOCK_TURN_RIGHT);
        assert_eq!(corner.rotation, Heading::West.id());
    }

    #[test]
    fn left_turn_rotation_is_inbound_advanced_one_step() {
        // Counterclockwise rectangle: same cells walked in reverse order.
        let mut cells = rectangle_loop_cells(8, 6);
        cells[1..].reverse();

        let pieces = classify_pieces(&cells, true);
        let corner = pieces.iter().find(|p| p.cell == (7, 0)).unwrap();
        assert_eq!(corner.block_type, crate::track::BLOCK_TURN_LEFT);
        // inbound North, advanced one step (cw) -> East.
        assert_eq!(corner.inbound, Heading::North);
        assert_eq!(corner.rotation, Heading::East.id());
    }

    #[test]
    fn open_path_finishes_at_the_last_cell() {
        let cells: Vec<Cell> = (0..30).map(|x| (x, 0)).collect();
        let pieces = classify_pieces(&cells, false);
        assert_eq!(pieces[0].block_type, BLOCK_START);
        assert_eq!(pieces[29].block_type, BLOCK_FINISH);
        assert_eq!(pieces[29].rotation, Heading::East.id());
        assert!(pieces[1..29].iter().all(|p| p.block_type == BLOCK_ROAD));
    }

    #[test]
    fn width_one_road_matches_centerline() {
        let cells = rectangle_loop_cells(8, 6);
        let pieces = classify_pieces(&cells, true);
        let plan = synthesize_plan(pieces, 1, true).unwrap();
        assert_eq!(plan.road.len(), 24);
        for piece in &plan.pieces {
            assert!(plan.road.contains(piece.cell));
        }
    }

    #[test]
    fn wider_road_strictly_grows_and_stays_disjoint_from_border() {
        let cells = rectangle_loop_cells(10, 8);
        let pieces = classify_pieces(&cells, true);

        let narrow = synthesize_plan(pieces.clone(), 1, true).unwrap();
        let wide = synthesize_plan(pieces, 5, true).unwrap();

        assert!(wide.road.len() > narrow.road.len());

        for (cell, _) in wide.border.sorted_winners() {
            assert!(!wide.road.contains(cell));
        }
    }

    #[test]
    fn border_cells_hug_the_road() {
        let cells = rectangle_loop_cells(8, 6);
        let pieces = classify_pieces(&cells, true);
        let plan = synthesize_plan(pieces, 1, true).unwrap();

        assert!(!plan.border.is_empty());
        for (cell, _) in plan.border.sorted_winners() {
            let adjacent = [(1, 0), (0, 1), (-1, 0), (0, -1)]
                .iter()
                .any(|&(dx, dy)| plan.road.contains((cell.0 + dx, cell.1 + dy)));
            assert!(adjacent, "border cell {cell:?} does not touch the road");
        }
    }

    #[test]
    fn border_can_be_disabled() {
        let cells = rectangle_loop_cells(8, 6);
        let pieces = classify_pieces(&cells, true);
        let plan = synthesize_plan(pieces, 3, false).unwrap();
        assert!(plan.border.is_empty());
    }

    #[test]
    fn tally_tie_break_is_earliest_vote() {
        let mut tally = HeadingTally::default();
        tally.vote(Heading::South, 0);
        tally.vote(Heading::East, 1);
        // One vote each: South arrived first.
        assert_eq!(tally.winner(), Heading::South);

        tally.vote(Heading::East, 2);
        assert_eq!(tally.winner(), Heading::East);
    }
}
