//! 从分割标签到参考网格上部分容积的完整流程.

use std::collections::BTreeMap;

use nalgebra::Matrix4;
use ndarray::{stack, Array1, Array2, Array3, Array4, ArrayView3, Axis, ShapeError};
use thiserror::Error;

use crate::consts::PV_CHANNELS;
use crate::compose::{compose, volumetric_csf, CompositionError, StructurePvs};
use crate::cortex::{CortexError, CortexEstimator, SurfacePaths};
use crate::extract::{extract_structures, mask_to_f32};
use crate::label::{LabelClassifier, TableError};
use crate::output::{to_volume, FormatError};
use crate::resample::{AffineResampler, FlirtError, Interpolation, ResampleError, Resampler};
use crate::{DataError, Grid, GridError, LabelVolume, NiftiHeaderAttr};

/// 流程中任一环节的错误.
#[derive(Debug, Error)]
pub enum PvError {
    /// 读写 NIfTI.
    #[error(transparent)]
    Data(#[from] DataError),

    /// 网格无效.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// 查找表无效.
    #[error(transparent)]
    Table(#[from] TableError),

    /// 重采样.
    #[error(transparent)]
    Resample(#[from] ResampleError),

    /// FLIRT 矩阵导入.
    #[error(transparent)]
    Flirt(#[from] FlirtError),

    /// 皮层估计.
    #[error(transparent)]
    Cortex(#[from] CortexError),

    /// 合成.
    #[error(transparent)]
    Composition(#[from] CompositionError),

    /// 输出格式.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// 数组拼接.
    #[error("array shape: {0}")]
    Shape(#[from] ShapeError),
}

/// 一次流程运行的结果.
#[derive(Debug, Clone)]
pub struct PvOutput {
    /// 参考网格上的 `(x, y, z, 3)` 部分容积, 通道顺序 (GM, WM, CSF).
    pub pvs: Array4<f32>,

    /// 无法分类且不在忽略集中的标签.
    pub unknown: Vec<i32>,
}

/// 部分容积流程. 持有分类器与两个协作者.
#[derive(Debug, Clone)]
pub struct PvPipeline<R, C> {
    classifier: LabelClassifier,
    resampler: R,
    cortex: C,
    cores: usize,
}

impl<R: Resampler, C: CortexEstimator> PvPipeline<R, C> {
    /// 使用 FreeSurfer 默认查找表, 单线程.
    pub fn new(resampler: R, cortex: C) -> Self {
        Self {
            classifier: LabelClassifier::freesurfer(),
            resampler,
            cortex,
            cores: 1,
        }
    }

    /// 替换标签分类器.
    pub fn with_classifier(mut self, classifier: LabelClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// 重采样与皮层估计可使用的线程数.
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    /// 当前分类器.
    #[inline]
    pub fn classifier(&self) -> &LabelClassifier {
        &self.classifier
    }

    /// 运行完整流程.
    ///
    /// `struct2ref` 为标签体积所在结构像空间到参考空间的世界坐标变换,
    /// 它被原样传给皮层估计器.
    pub fn run(
        &self,
        labels: &LabelVolume,
        surfaces: &SurfacePaths,
        reference: &Grid,
        struct2ref: &Matrix4<f64>,
    ) -> Result<PvOutput, PvError> {
        let src = labels.grid()?;
        let shape = reference.shape();
        let n = reference.size();

        log::info!("estimating cortex PVs on reference grid {shape:?}");
        let cortex = self
            .cortex
            .estimate_cortex(reference, struct2ref, self.cores, surfaces)?;
        let cortex = flatten_cortex(cortex, reference)?;

        let extracted = extract_structures(labels.data(), &self.classifier);

        log::info!("resampling generic GM/WM onto reference grid");
        let generic_gm = mask_to_f32(extracted.gm.view());
        let generic_wm = mask_to_f32(extracted.wm.view());
        let generic = stack(Axis(3), &[generic_gm.view(), generic_wm.view()])?;
        let generic = self.resampler.apply_to_array(
            generic.view(),
            &src,
            reference,
            Interpolation::Linear,
            self.cores,
        )?;
        let vol_csf = volumetric_csf(
            generic.index_axis(Axis(3), 0),
            generic.index_axis(Axis(3), 1),
        );
        let vol_csf = flatten(vol_csf.view());

        log::info!(
            "resampling {} named structure(s) onto reference grid",
            extracted.structures.len()
        );
        let named = self.resample_structures(&extracted.structures, &src, reference)?;
        let wm_order = self.classifier.table().wm_like.as_slice();
        let structures = StructurePvs::partition(named, wm_order);

        let pvs = compose(vol_csf.view(), cortex.view(), &structures)?;
        debug_assert_eq!(pvs.nrows(), n);
        let pvs = to_volume(pvs, shape)?;
        Ok(PvOutput {
            pvs,
            unknown: extracted.unknown,
        })
    }

    /// 把全部结构掩膜拼成一个四维体积一次性重采样, 再拆回展平的单个结构.
    fn resample_structures(
        &self,
        masks: &BTreeMap<String, Array3<bool>>,
        src: &Grid,
        reference: &Grid,
    ) -> Result<BTreeMap<String, Array1<f32>>, PvError> {
        if masks.is_empty() {
            return Ok(BTreeMap::new());
        }
        let volumes: Vec<_> = masks.values().map(|m| mask_to_f32(m.view())).collect();
        let views: Vec<_> = volumes.iter().map(|v| v.view()).collect();
        let stacked = stack(Axis(3), &views)?;
        let resampled = self.resampler.apply_to_array(
            stacked.view(),
            src,
            reference,
            Interpolation::Linear,
            self.cores,
        )?;
        Ok(masks
            .keys()
            .cloned()
            .zip(resampled.axis_iter(Axis(3)).map(flatten))
            .collect())
    }
}

/// 检查皮层估计的形状并展平为 `N x 3`.
fn flatten_cortex(cortex: Array4<f32>, reference: &Grid) -> Result<Array2<f32>, PvError> {
    let (x, y, z, c) = cortex.dim();
    if (x, y, z) != reference.shape() {
        return Err(CortexError::GridMismatch {
            expected: reference.shape(),
            found: (x, y, z),
        }
        .into());
    }
    if c != PV_CHANNELS {
        return Err(CortexError::Channels(c).into());
    }
    let cortex = cortex.as_standard_layout().into_owned();
    Ok(cortex.into_shape((x * y * z, c))?)
}

/// 按 C 顺序展平三维体积.
fn flatten(v: ArrayView3<f32>) -> Array1<f32> {
    v.iter().copied().collect()
}

/// 默认流程: FreeSurfer 查找表, 以 `struct2ref` (缺省为单位变换) 驱动的
/// [`AffineResampler`], 由调用方提供皮层估计器.
///
/// 返回参考网格上的 `(x, y, z, 3)` 部分容积.
pub fn compose_partial_volumes<C: CortexEstimator>(
    labels: &LabelVolume,
    surfaces: &SurfacePaths,
    reference: &Grid,
    struct2ref: Option<Matrix4<f64>>,
    cortex: C,
    cores: usize,
) -> Result<Array4<f32>, PvError> {
    let struct2ref = struct2ref.unwrap_or_else(Matrix4::identity);
    let resampler = AffineResampler::new(struct2ref)?;
    let out = PvPipeline::new(resampler, cortex)
        .with_cores(cores)
        .run(labels, surfaces, reference, &struct2ref)?;
    Ok(out.pvs)
}
