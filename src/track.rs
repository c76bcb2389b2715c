use serde::Deserialize;
use std::collections::BTreeMap;

// Block palette
// -----------------------------------------------------------------------------
// Fixed game-side identifiers. The checkpoint-ordered and start-ordered sets
// below are wire-format constants: they decide which parts carry an extra
// order field, so they must match the game byte for byte.

pub const BLOCK_ROAD: u8 = 0;
pub const BLOCK_TURN_LEFT: u8 = 1;
pub const BLOCK_TURN_RIGHT: u8 = 2;
pub const BLOCK_BORDER: u8 = 3;
pub const BLOCK_FINISH: u8 = 4;
pub const BLOCK_START: u8 = 5;
pub const BLOCK_FINISH_MARKER: u8 = 6;

/// The minimal piece set used in strict mode.
pub const REFERENCE_PALETTE: [u8; 7] = [
    BLOCK_ROAD,
    BLOCK_TURN_LEFT,
    BLOCK_TURN_RIGHT,
    BLOCK_BORDER,
    BLOCK_FINISH,
    BLOCK_START,
    BLOCK_FINISH_MARKER,
];

/// Block types whose parts carry a little-endian u16 checkpoint order.
pub const CHECKPOINT_ORDERED: [u8; 1] = [BLOCK_FINISH_MARKER];

/// Block types whose parts carry a little-endian u32 start order.
pub const START_ORDERED: [u8; 1] = [BLOCK_START];

pub fn is_checkpoint_ordered(block_type: u8) -> bool {
    CHECKPOINT_ORDERED.contains(&block_type)
}

pub fn is_start_ordered(block_type: u8) -> bool {
    START_ORDERED.contains(&block_type)
}

pub fn in_reference_palette(block_type: u8) -> bool {
    REFERENCE_PALETTE.contains(&block_type)
}

/// One tile spans this many world-distance units per horizontal axis.
pub const TILE_WORLD_UNITS: i32 = 4;

// Environment
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "EnvironmentRepr")]
pub enum Environment {
    Summer,
    Winter,
    Desert,
    Night,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Summer
    }
}

impl Environment {
    pub fn id(self) -> u8 {
        match self {
            Environment::Summer => 0,
            Environment::Winter => 1,
            Environment::Desert => 2,
            Environment::Night => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Environment::Summer),
            1 => Some(Environment::Winter),
            2 => Some(Environment::Desert),
            3 => Some(Environment::Night),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "summer" => Some(Environment::Summer),
            "winter" => Some(Environment::Winter),
            "desert" => Some(Environment::Desert),
            "night" => Some(Environment::Night),
            _ => None,
        }
    }
}

/// Config accepts either the environment name or its integer id.
#[derive(Deserialize)]
#[serde(untagged)]
enum EnvironmentRepr {
    Id(u8),
    Name(String),
}

impl TryFrom<EnvironmentRepr> for Environment {
    type Error = String;

    fn try_from(repr: EnvironmentRepr) -> Result<Self, Self::Error> {
        match repr {
            EnvironmentRepr::Id(id) => {
                Environment::from_id(id).ok_or_else(|| format!("environment id {id} out of range"))
            }
            EnvironmentRepr::Name(name) => Environment::from_name(&name)
                .ok_or_else(|| format!("unknown environment {name:?}")),
        }
    }
}

// Track data
// -----------------------------------------------------------------------------

/// One placed part in world units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub rotation: u8,
    pub rotation_axis: u8,
    pub color: u8,
    pub checkpoint_order: Option<u16>,
    pub start_order: Option<u32>,
}

impl Part {
    /// A part at tile coordinates with the default orientation fields.
    pub fn at_tile(tx: i32, tz: i32, rotation: u8) -> Self {
        Self {
            x: tx * TILE_WORLD_UNITS,
            y: 0,
            z: tz * TILE_WORLD_UNITS,
            rotation,
            rotation_axis: 0,
            color: 0,
            checkpoint_order: None,
            start_order: None,
        }
    }
}

/// The full serializable track: everything the codec reads and writes.
///
/// Parts are keyed by block type in a BTreeMap because the wire format
/// requires ascending type order; iterating the map IS the wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackData {
    pub name: String,
    pub author: String,
    pub environment_id: u8,
    pub color_rep: u8,
    pub parts_by_block: BTreeMap<u8, Vec<Part>>,
}

impl TrackData {
    pub fn push_part(&mut self, block_type: u8, part: Part) {
        self.parts_by_block.entry(block_type).or_default().push(part);
    }

    pub fn part_count(&self) -> usize {
        self.parts_by_block.values().map(|v| v.len()).sum()
    }

    /// First block type outside the reference palette, if any. The strict
    /// pre-emit check in the pipeline turns this into an error.
    pub fn off_palette_block(&self) -> Option<u8> {
        self.parts_by_block
            .keys()
            .copied()
            .find(|&b| !in_reference_palette(b))
    }
}
