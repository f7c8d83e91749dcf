//! 重采样: 把体素数据从一个网格投影到另一个网格.
//!
//! [`Resampler`] 是外部协作者接口; [`AffineResampler`] 是附带的默认实现,
//! 以世界坐标下的刚体/仿射变换为准, 用超采样近似体素平均.

mod affine;
mod flirt;

pub use affine::AffineResampler;
pub use flirt::{parse_flirt_matrix, read_flirt_matrix, struct2ref_from_flirt, FlirtError};

use ndarray::{Array3, Array4, ArrayView3, ArrayView4, Axis};
use thiserror::Error;

use crate::{Grid, Idx3d};

/// 插值阶数.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// 0 阶, 最近邻.
    Nearest,

    /// 1 阶, 三线性.
    #[default]
    Linear,
}

impl Interpolation {
    /// 数值阶数.
    #[inline]
    pub const fn order(&self) -> u8 {
        match self {
            Interpolation::Nearest => 0,
            Interpolation::Linear => 1,
        }
    }
}

impl TryFrom<u8> for Interpolation {
    type Error = ResampleError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Interpolation::Nearest),
            1 => Ok(Interpolation::Linear),
            other => Err(ResampleError::UnsupportedOrder(other)),
        }
    }
}

/// 重采样错误.
#[derive(Debug, Error)]
pub enum ResampleError {
    /// 不支持的插值阶数.
    #[error("interpolation order {0} is not supported (expected 0 or 1)")]
    UnsupportedOrder(u8),

    /// 输入数据的空间维度与源网格不一致.
    #[error("data shape {found:?} does not match source grid {expected:?}")]
    ShapeMismatch {
        /// 源网格形状.
        expected: Idx3d,
        /// 数据前三维.
        found: Idx3d,
    },

    /// 变换矩阵不可逆.
    #[error("transform is singular")]
    SingularTransform,

    /// 线程池创建失败.
    #[cfg(feature = "rayon")]
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// 重采样协作者.
pub trait Resampler {
    /// 把四维数据 `(x, y, z, c)` 从 `src` 网格重采样到 `reference` 网格,
    /// 各通道独立处理. `cores` 为可使用的线程数.
    fn apply_to_array(
        &self,
        data: ArrayView4<f32>,
        src: &Grid,
        reference: &Grid,
        order: Interpolation,
        cores: usize,
    ) -> Result<Array4<f32>, ResampleError>;

    /// 三维单通道版本的 [`Resampler::apply_to_array`].
    fn apply_to_volume(
        &self,
        data: ArrayView3<f32>,
        src: &Grid,
        reference: &Grid,
        order: Interpolation,
        cores: usize,
    ) -> Result<Array3<f32>, ResampleError> {
        let out = self.apply_to_array(data.insert_axis(Axis(3)), src, reference, order, cores)?;
        Ok(out.index_axis_move(Axis(3), 0))
    }
}

/// 检查数据前三维与网格是否一致.
pub(crate) fn check_shape(data: &ArrayView4<f32>, grid: &Grid) -> Result<(), ResampleError> {
    let (x, y, z, _) = data.dim();
    if (x, y, z) == grid.shape() {
        Ok(())
    } else {
        Err(ResampleError::ShapeMismatch {
            expected: grid.shape(),
            found: (x, y, z),
        })
    }
}
