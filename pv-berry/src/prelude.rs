//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::{Grid, LabelVolume, NiftiHeaderAttr, ReferenceSpace};

pub use crate::label::{Classification, LabelClassifier, LabelTable, Role, Tissue};

pub use crate::extract::{extract_structures, Extracted};

pub use crate::resample::{
    read_flirt_matrix, struct2ref_from_flirt, AffineResampler, Interpolation, Resampler,
};

pub use crate::cortex::{CortexEstimator, PrecomputedCortex, SurfacePaths};

pub use crate::compose::{compose, volumetric_csf, StructurePvs};

pub use crate::output::{split_output_paths, write_pvs, OutputLayout};

pub use crate::pipeline::{compose_partial_volumes, PvError, PvPipeline};
