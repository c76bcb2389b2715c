// Library crate root.
//
// The crate is a pure library: image in, track plan + share code out. CLI
// front-ends, preview renderers, and the procedural generator live in
// downstream crates.

pub mod im;
pub mod mask;
pub mod skeleton;
pub mod trace;
pub mod simplify;
pub mod grid;
pub mod plan;
pub mod track;
pub mod codec;
pub mod convert;
pub mod error;

#[cfg(test)]
pub mod test_helpers;

pub use codec::{Compressor, Flate2Compressor, SHARE_CODE_PREFIX, ShareCodec};
pub use convert::{ConvertConfig, ConvertOutput, TrackConverter, parse_config_json};
pub use error::{ConvertError, DecodeError};
pub use track::TrackData;
