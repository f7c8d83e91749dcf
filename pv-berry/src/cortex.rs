//! 皮层部分容积估计.
//!
//! 基于表面的皮层 PV 估计本身是外部协作者. 这里只定义接口,
//! 并提供读取外部估计结果的默认实现.

use std::path::{Path, PathBuf};

use nalgebra::Matrix4;
use ndarray::{Array4, Axis};
use thiserror::Error;

use crate::consts::PV_CHANNELS;
use crate::{open_volume4, DataError, Grid, Idx3d};

/// 皮层估计错误.
#[derive(Debug, Error)]
pub enum CortexError {
    /// 表面文件不存在.
    #[error("{which} surface `{}` does not exist", path.display())]
    MissingSurface {
        /// 表面简称 (`lws`, `lps`, `rws`, `rps`).
        which: &'static str,
        /// 文件路径.
        path: PathBuf,
    },

    /// 读取估计体积失败.
    #[error("cortex estimate: {0}")]
    Data(#[from] DataError),

    /// 估计的网格与参考网格不一致.
    #[error("cortex estimate grid {found:?} does not match reference grid {expected:?}")]
    GridMismatch {
        /// 参考网格形状.
        expected: Idx3d,
        /// 估计体积形状.
        found: Idx3d,
    },

    /// 通道数不是 3 (GM, WM, 非脑).
    #[error("cortex estimate has {0} channels, expected 3")]
    Channels(usize),
}

/// 左右半球的白质表面与软脑膜表面.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfacePaths {
    /// 左白质表面.
    pub lws: PathBuf,

    /// 左软脑膜表面.
    pub lps: PathBuf,

    /// 右白质表面.
    pub rws: PathBuf,

    /// 右软脑膜表面.
    pub rps: PathBuf,
}

impl SurfacePaths {
    /// 构造.
    pub fn new<P: Into<PathBuf>>(lws: P, lps: P, rws: P, rps: P) -> Self {
        Self {
            lws: lws.into(),
            lps: lps.into(),
            rws: rws.into(),
            rps: rps.into(),
        }
    }

    /// 以 `(简称, 路径)` 形式列出全部四个表面.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Path)> + '_ {
        [
            ("lws", self.lws.as_path()),
            ("lps", self.lps.as_path()),
            ("rws", self.rws.as_path()),
            ("rps", self.rps.as_path()),
        ]
        .into_iter()
    }

    /// 检查四个表面文件都存在.
    pub fn check_exist(&self) -> Result<(), CortexError> {
        match self.iter().find(|(_, p)| !p.is_file()) {
            Some((which, path)) => Err(CortexError::MissingSurface {
                which,
                path: path.to_path_buf(),
            }),
            None => Ok(()),
        }
    }
}

/// 皮层估计协作者. 返回参考网格上 `(x, y, z, 3)` 的 (GM, WM, 非脑) 估计.
pub trait CortexEstimator {
    /// 在参考网格上估计皮层 PV.
    fn estimate_cortex(
        &self,
        reference: &Grid,
        struct2ref: &Matrix4<f64>,
        cores: usize,
        surfaces: &SurfacePaths,
    ) -> Result<Array4<f32>, CortexError>;
}

/// 读取由外部表面估计器预先写出的四维 NIfTI 估计.
///
/// 该体积应已位于参考网格上, 因此 `struct2ref` 与 `cores` 不参与计算.
#[derive(Clone, Debug)]
pub struct PrecomputedCortex {
    path: PathBuf,
}

impl PrecomputedCortex {
    /// 估计文件位于 `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// 估计文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CortexEstimator for PrecomputedCortex {
    fn estimate_cortex(
        &self,
        reference: &Grid,
        _struct2ref: &Matrix4<f64>,
        _cores: usize,
        surfaces: &SurfacePaths,
    ) -> Result<Array4<f32>, CortexError> {
        surfaces.check_exist()?;
        let (grid, data) = open_volume4(&self.path)?;
        if grid.shape() != reference.shape() {
            return Err(CortexError::GridMismatch {
                expected: reference.shape(),
                found: grid.shape(),
            });
        }
        if !grid.is_same(reference, 1e-3) {
            log::warn!(
                "cortex estimate `{}` has a different affine from the reference grid",
                self.path.display()
            );
        }
        let channels = data.len_of(Axis(3));
        if channels != PV_CHANNELS {
            return Err(CortexError::Channels(channels));
        }
        log::info!("loaded cortex estimate from `{}`", self.path.display());
        Ok(data)
    }
}
