pub mod core;
#[allow(unused_imports)]
pub use core::{Im, MaskIm, RGBAIm, copy_mask_im_to_rgba_im};

pub mod label;
#[allow(unused_imports)]
pub use label::{LabelIm, LabelInfo, keep_largest_component, label_im};

// Optional extras
// -----------------------------------------------------------------------------

#[cfg(feature = "im-io")]
pub mod io;
