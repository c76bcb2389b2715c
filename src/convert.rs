use crate::codec::ShareCodec;
use crate::error::ConvertError;
use crate::grid;
use crate::im::{MaskIm, keep_largest_component};
use crate::mask::{MaskParams, RasterImage, extract_mask};
use crate::plan::{TrackPlan, classify_pieces, synthesize_plan};
use crate::simplify::{resample, simplify};
use crate::skeleton::{ThinParams, skeletonize};
use crate::trace::{PointF, trace_path};
use crate::track::{
    BLOCK_BORDER, BLOCK_FINISH, BLOCK_FINISH_MARKER, BLOCK_ROAD, Environment, Part, TrackData,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

// Configuration
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScaleMode {
    OneToOne,
    Manual,
    BestFit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Km,
    M,
    Mi,
}

impl LengthUnit {
    pub fn to_meters(self, value: f64) -> f64 {
        match self {
            LengthUnit::Km => value * 1000.0,
            LengthUnit::M => value,
            LengthUnit::Mi => value * 1609.344,
        }
    }
}

/// Every knob of the pipeline in one place, with the documented defaults.
/// Deserializable so host tools can ship configs as JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub name: String,
    pub author: String,
    pub threshold: u8,
    pub invert: bool,
    pub alpha_cutoff: u8,
    pub max_thin_iterations: usize,
    pub trim_passes: usize,
    pub simplify_epsilon: f64,
    pub sample_spacing: f64,
    pub min_resample_points: usize,
    pub width_tiles: usize,
    pub close_loop: bool,
    pub target_length: f64,
    pub length_unit: LengthUnit,
    pub scale_mode: ScaleMode,
    pub scale_ratio: f64,
    pub meters_per_tile: f64,
    pub environment: Environment,
    pub color_rep: u8,
    pub border_enabled: bool,
    pub strict_palette: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            name: "Imported Track".to_string(),
            author: String::new(),
            threshold: 140,
            invert: false,
            alpha_cutoff: 16,
            max_thin_iterations: 80,
            trim_passes: 1,
            simplify_epsilon: 1.1,
            sample_spacing: 2.4,
            min_resample_points: 64,
            width_tiles: 1,
            close_loop: true,
            target_length: 25.0,
            length_unit: LengthUnit::Km,
            scale_mode: ScaleMode::BestFit,
            scale_ratio: 1.0,
            meters_per_tile: 16.0,
            environment: Environment::Summer,
            color_rep: 0,
            border_enabled: true,
            strict_palette: true,
        }
    }
}

pub fn parse_config_json(json_text: &str) -> Result<ConvertConfig, serde_json::Error> {
    serde_json::from_str(json_text)
}

// Output
// -----------------------------------------------------------------------------

/// Per-stage counts for host-side reporting. These mirror what the stages
/// log at debug level.
#[derive(Debug, Clone, Default)]
pub struct StageCounts {
    pub mask_pixels: usize,
    pub component_pixels: usize,
    pub skeleton_pixels: usize,
    pub traced_points: usize,
    pub simplified_points: usize,
    pub resampled_points: usize,
    pub centerline_cells: usize,
    pub scale_used: f64,
    pub fit_iterations: usize,
}

#[derive(Debug, Clone)]
pub struct TrackMetrics {
    pub centerline_tiles: usize,
    pub meters: f64,
    pub kilometers: f64,
    pub miles: f64,
}

impl TrackMetrics {
    fn from_tiles(tiles: usize, meters_per_tile: f64) -> Self {
        let meters = tiles as f64 * meters_per_tile;
        Self {
            centerline_tiles: tiles,
            meters,
            kilometers: meters / 1000.0,
            miles: meters / 1609.344,
        }
    }
}

impl fmt::Display for TrackMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles ({:.2} km / {:.2} mi)",
            self.centerline_tiles, self.kilometers, self.miles
        )
    }
}

/// Intermediate stage outputs, kept for visualization only.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    pub mask: MaskIm,
    pub component: MaskIm,
    pub skeleton: MaskIm,
    pub traced: Vec<PointF>,
    pub simplified: Vec<PointF>,
    pub resampled: Vec<PointF>,
}

#[derive(Debug)]
pub struct ConvertOutput {
    pub name: String,
    pub share_code: String,
    pub track: TrackData,
    pub plan: TrackPlan,
    pub metrics: TrackMetrics,
    pub diagnostics: StageCounts,
    pub debug: DebugArtifacts,
}

// Converter
// -----------------------------------------------------------------------------

/// Owns the share codec and runs the whole pipeline.
///
/// The codec is injected rather than read from any process-wide handle;
/// converting without one bound fails with [`ConvertError::EncoderUnbound`].
pub struct TrackConverter {
    codec: Option<ShareCodec>,
}

impl Default for TrackConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackConverter {
    pub fn new() -> Self {
        Self { codec: None }
    }

    pub fn with_codec(codec: ShareCodec) -> Self {
        Self { codec: Some(codec) }
    }

    pub fn bind_codec(&mut self, codec: ShareCodec) {
        self.codec = Some(codec);
    }

    /// Run the full pipeline: image -> mask -> skeleton -> path -> grid ->
    /// plan -> track -> share code. Pure function of its inputs; any stage
    /// failure aborts with no partial result.
    pub fn convert(
        &self,
        img: &RasterImage,
        config: &ConvertConfig,
    ) -> Result<ConvertOutput, ConvertError> {
        let codec = self.codec.as_ref().ok_or(ConvertError::EncoderUnbound)?;

        let mask = extract_mask(
            img,
            &MaskParams {
                threshold: config.threshold,
                invert: config.invert,
                alpha_cutoff: config.alpha_cutoff,
            },
        )?;

        let component = keep_largest_component(&mask);

        let skeleton = skeletonize(
            &component,
            &ThinParams {
                max_iterations: config.max_thin_iterations,
                trim_passes: config.trim_passes,
            },
        );

        let traced = trace_path(&skeleton);
        if traced.len() < 8 {
            return Err(ConvertError::TraceFailed {
                points: traced.len(),
            });
        }

        let simplified = simplify(&traced, config.simplify_epsilon);
        let resampled = resample(&simplified, config.sample_spacing, config.min_resample_points);

        let geo_closed =
            resampled.len() >= 2 && resampled[0] == resampled[resampled.len() - 1];
        let closed = config.close_loop && geo_closed;

        let outcome = match config.scale_mode {
            ScaleMode::OneToOne => grid::quantize_checked(&resampled, 1.0, closed)?,
            ScaleMode::Manual => grid::quantize_checked(&resampled, config.scale_ratio, closed)?,
            ScaleMode::BestFit => {
                let target_meters = config.length_unit.to_meters(config.target_length);
                let desired = (target_meters / config.meters_per_tile).round().max(1.0) as usize;
                let path_length = polyline_length(&resampled);
                let initial_scale = desired as f64 / path_length.max(1.0);
                grid::fit_to_target(&resampled, desired, closed, initial_scale)?
            }
        };

        let pieces = classify_pieces(&outcome.cells, closed);
        let plan = synthesize_plan(pieces, config.width_tiles.max(1), config.border_enabled)?;
        let track = build_track_data(&plan, config);

        let share_code = if config.strict_palette {
            codec.encode_strict(&track)?
        } else {
            codec.encode(&track)
        };

        let diagnostics = StageCounts {
            mask_pixels: mask.count_on(),
            component_pixels: component.count_on(),
            skeleton_pixels: skeleton.count_on(),
            traced_points: traced.len(),
            simplified_points: simplified.len(),
            resampled_points: resampled.len(),
            centerline_cells: outcome.cells.len(),
            scale_used: outcome.scale,
            fit_iterations: outcome.fit_iterations,
        };
        debug!(
            cells = diagnostics.centerline_cells,
            scale = diagnostics.scale_used,
            code_len = share_code.len(),
            "conversion complete"
        );

        let metrics = TrackMetrics::from_tiles(outcome.cells.len(), config.meters_per_tile);

        Ok(ConvertOutput {
            name: config.name.clone(),
            share_code,
            track,
            plan,
            metrics,
            diagnostics,
            debug: DebugArtifacts {
                mask,
                component,
                skeleton,
                traced,
                simplified,
                resampled,
            },
        })
    }
}

fn polyline_length(points: &[PointF]) -> f64 {
    points.windows(2).map(|pair| pair[0].dist(&pair[1])).sum()
}

/// Place every planned cell as a world-space part.
///
/// Centerline pieces keep their classified types and orders; the remaining
/// road cells become plain road parts with their voted heading; border
/// cells become border parts. One finish marker lands on the finish cell
/// with checkpoint order 0.
fn build_track_data(plan: &TrackPlan, config: &ConvertConfig) -> TrackData {
    let mut track = TrackData {
        name: config.name.clone(),
        author: config.author.clone(),
        environment_id: config.environment.id(),
        color_rep: config.color_rep,
        ..TrackData::default()
    };

    let mut centerline_cells: HashSet<(i32, i32)> = HashSet::new();
    for piece in &plan.pieces {
        centerline_cells.insert(piece.cell);
        track.push_part(
            piece.block_type,
            Part {
                checkpoint_order: piece.checkpoint_order,
                start_order: piece.start_order,
                ..Part::at_tile(piece.cell.0, piece.cell.1, piece.rotation)
            },
        );

        if piece.block_type == BLOCK_FINISH {
            track.push_part(
                BLOCK_FINISH_MARKER,
                Part {
                    checkpoint_order: Some(0),
                    ..Part::at_tile(piece.cell.0, piece.cell.1, piece.rotation)
                },
            );
        }
    }

    for (cell, heading) in plan.road.sorted_winners() {
        if centerline_cells.contains(&cell) {
            continue;
        }
        track.push_part(BLOCK_ROAD, Part::at_tile(cell.0, cell.1, heading.id()));
    }

    for (cell, heading) in plan.border.sorted_winners() {
        track.push_part(BLOCK_BORDER, Part::at_tile(cell.0, cell.1, heading.id()));
    }

    track
}
