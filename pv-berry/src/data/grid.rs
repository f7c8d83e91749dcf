//! 体素网格: 形状 + 体素坐标到世界坐标 (毫米) 的仿射.

use nalgebra::{Matrix3, Matrix4, Point3, Vector3};
use nifti::NiftiHeader;
use thiserror::Error;

use crate::Idx3d;

/// 网格构造错误.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridError {
    /// 仿射矩阵不可逆.
    #[error("voxel-to-world affine is singular")]
    SingularAffine,

    /// 某一维体素个数为 0.
    #[error("grid shape {0:?} has an empty axis")]
    EmptyShape(Idx3d),
}

/// 三维体素网格.
///
/// 数据按 NIfTI 的 `(i, j, k)` 轴顺序组织, 仿射矩阵把体素中心坐标映射到世界坐标.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    shape: Idx3d,
    vox2world: Matrix4<f64>,
    world2vox: Matrix4<f64>,
}

/// 从 header 读取 `(i, j, k)` 方向的体素个数.
#[inline]
pub(crate) fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    let [_, i, j, k, ..] = h.dim;
    (i as usize, j as usize, k as usize)
}

/// 依照 NIfTI 约定, 由四元数参数构造 qform 仿射.
fn qform_affine(h: &NiftiHeader) -> Matrix4<f64> {
    let (b, c, d) = (
        h.quatern_b as f64,
        h.quatern_c as f64,
        h.quatern_d as f64,
    );
    let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
    let rot = Matrix3::new(
        a * a + b * b - c * c - d * d,
        2.0 * (b * c - a * d),
        2.0 * (b * d + a * c),
        2.0 * (b * c + a * d),
        a * a + c * c - b * b - d * d,
        2.0 * (c * d - a * b),
        2.0 * (b * d - a * c),
        2.0 * (c * d + a * b),
        a * a + d * d - b * b - c * c,
    );
    let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
    let scale = Matrix3::from_diagonal(&Vector3::new(
        h.pixdim[1] as f64,
        h.pixdim[2] as f64,
        qfac * h.pixdim[3] as f64,
    ));
    let mut m = (rot * scale).to_homogeneous();
    m[(0, 3)] = h.quatern_x as f64;
    m[(1, 3)] = h.quatern_y as f64;
    m[(2, 3)] = h.quatern_z as f64;
    m
}

/// 读取 header 中的仿射. 优先 sform, 其次 qform, 都没有时退化为按 `pixdim` 缩放.
pub(crate) fn header_affine(h: &NiftiHeader) -> Matrix4<f64> {
    if h.sform_code > 0 {
        let mut m = Matrix4::identity();
        for (r, row) in [h.srow_x, h.srow_y, h.srow_z].iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                m[(r, c)] = *v as f64;
            }
        }
        m
    } else if h.qform_code > 0 {
        qform_affine(h)
    } else {
        let [_, x, y, z, ..] = h.pixdim;
        Matrix4::new_nonuniform_scaling(&Vector3::new(x as f64, y as f64, z as f64))
    }
}

impl Grid {
    /// 由形状和仿射创建网格.
    pub fn new(shape: Idx3d, vox2world: Matrix4<f64>) -> Result<Self, GridError> {
        if shape.0 == 0 || shape.1 == 0 || shape.2 == 0 {
            return Err(GridError::EmptyShape(shape));
        }
        let world2vox = vox2world
            .try_inverse()
            .ok_or(GridError::SingularAffine)?;
        Ok(Self {
            shape,
            vox2world,
            world2vox,
        })
    }

    /// 各向同性/异性的轴对齐网格, 原点位于第一个体素中心.
    pub fn with_voxel_size(shape: Idx3d, [x, y, z]: [f64; 3]) -> Result<Self, GridError> {
        Self::new(
            shape,
            Matrix4::new_nonuniform_scaling(&Vector3::new(x, y, z)),
        )
    }

    /// 从 NIfTI header 读取网格.
    #[inline]
    pub fn from_header(h: &NiftiHeader) -> Result<Self, GridError> {
        Self::new(get_shape_from_header(h), header_affine(h))
    }

    /// 以本网格的几何信息填写一份 NIfTI header. 仿射写入 sform (代码 1), qform 不使用 (代码 0).
    pub fn to_header(&self) -> NiftiHeader {
        let mut h = NiftiHeader::default();
        let (x, y, z) = self.shape;
        h.dim = [3, x as u16, y as u16, z as u16, 1, 1, 1, 1];
        let [px, py, pz] = self.pix_dim();
        h.pixdim = [1.0, px as f32, py as f32, pz as f32, 1.0, 1.0, 1.0, 1.0];
        h.sform_code = 1;
        h.qform_code = 0;
        let row = |r: usize| {
            [
                self.vox2world[(r, 0)] as f32,
                self.vox2world[(r, 1)] as f32,
                self.vox2world[(r, 2)] as f32,
                self.vox2world[(r, 3)] as f32,
            ]
        };
        h.srow_x = row(0);
        h.srow_y = row(1);
        h.srow_z = row(2);
        h
    }

    /// 网格形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        let (x, y, z) = self.shape;
        x * y * z
    }

    /// 体素坐标 -> 世界坐标.
    #[inline]
    pub fn vox2world(&self) -> &Matrix4<f64> {
        &self.vox2world
    }

    /// 世界坐标 -> 体素坐标.
    #[inline]
    pub fn world2vox(&self) -> &Matrix4<f64> {
        &self.world2vox
    }

    /// 三个轴方向的体素尺寸 (毫米), 即仿射前三列的模.
    pub fn pix_dim(&self) -> [f64; 3] {
        let lin = self.vox2world.fixed_view::<3, 3>(0, 0);
        [0, 1, 2].map(|c| lin.column(c).norm())
    }

    /// 仿射线性部分的行列式. 为正时网格是 "神经学" 方向 (x 轴朝右).
    #[inline]
    pub fn determinant(&self) -> f64 {
        self.vox2world.fixed_view::<3, 3>(0, 0).determinant()
    }

    /// 体素 `(i, j, k)` 中心的世界坐标.
    #[inline]
    pub fn voxel_center(&self, (i, j, k): Idx3d) -> Point3<f64> {
        self.vox2world
            .transform_point(&Point3::new(i as f64, j as f64, k as f64))
    }

    /// 两个网格是否相同 (形状一致, 仿射在 `tol` 内一致).
    pub fn is_same(&self, other: &Grid, tol: f64) -> bool {
        self.shape == other.shape
            && self
                .vox2world
                .iter()
                .zip(other.vox2world.iter())
                .all(|(a, b)| (a - b).abs() <= tol)
    }
}
