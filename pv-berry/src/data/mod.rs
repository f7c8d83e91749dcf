//! NIfTI 数据结构: 分割标签体积与参考网格.

use std::ops::Index;
use std::path::Path;

use ndarray::{
    Array, Array3, Array4, ArrayView, ArrayView3, Dimension, Ix3, Ix4, RemoveAxis, ShapeError,
};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiError, NiftiHeader, NiftiObject, ReaderOptions};
use thiserror::Error;

use crate::Idx3d;

mod grid;

pub use grid::{Grid, GridError};

use grid::get_shape_from_header;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 读写体积数据时的错误.
#[derive(Debug, Error)]
pub enum DataError {
    /// 底层 NIfTI 读写错误.
    #[error("nifti: {0}")]
    Nifti(#[from] NiftiError),

    /// 数据维度与预期不符.
    #[error("array shape: {0}")]
    Shape(#[from] ShapeError),

    /// header 中的几何信息无效.
    #[error("grid: {0}")]
    Grid(#[from] GridError),
}

/// NIfTI header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取 `(i, j, k)` 形状.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (i, j, k) = self.shape();
        i * j * k
    }

    /// header 中记录的体素分辨率, 以毫米为单位.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, i, j, k, ..] = self.header().pixdim;
        [i as f64, j as f64, k as f64].map(f64::abs)
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 由 header 构造网格.
    #[inline]
    fn grid(&self) -> Result<Grid, GridError> {
        Grid::from_header(self.header())
    }
}

/// 读取 NIfTI 文件为 `D` 维 `f32` 数组. 缩放参数 (`scl_slope`, `scl_inter`) 已被应用.
fn read_nifti<D: Dimension>(path: &Path) -> Result<(BoxedHeader, Array<f32, D>), DataError> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = Box::new(obj.header().clone());
    let data = obj
        .into_volume()
        .into_ndarray::<f32>()?
        .into_dimensionality::<D>()?;
    Ok((header, data.as_standard_layout().into_owned()))
}

/// 整数分割标签体积 (如 FreeSurfer `aparc+aseg`), 包括 header 和标签. 只读.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    header: BoxedHeader,
    data: Array3<i32>,
}

impl NiftiHeaderAttr for LabelVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for LabelVolume {
    type Output = i32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl LabelVolume {
    /// 打开 nii 文件格式的分割标签. 浮点存储的标签会被四舍五入为整数.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let (header, data) = read_nifti::<Ix3>(path.as_ref())?;
        let data = data.mapv(|v| v.round() as i32);
        Ok(Self { header, data })
    }

    /// 由网格与裸标签数据直接创建. 形状不一致时返回 `None`.
    pub fn from_grid(grid: &Grid, data: Array3<i32>) -> Option<Self> {
        (data.dim() == grid.shape()).then(|| Self {
            header: Box::new(grid.to_header()),
            data,
        })
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView3<'_, i32> {
        self.data.view()
    }
}

/// 参考网格 (ASL 网格下的 T1 空间). 只读取 header, 输出时复用其几何信息.
#[derive(Debug, Clone)]
pub struct ReferenceSpace {
    header: BoxedHeader,
    grid: Grid,
}

impl NiftiHeaderAttr for ReferenceSpace {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl ReferenceSpace {
    /// 读取参考图像的 header. 支持 `.nii` 与 `.nii.gz`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let header = NiftiHeader::from_file(path.as_ref())?;
        let grid = Grid::from_header(&header)?;
        Ok(Self {
            header: Box::new(header),
            grid,
        })
    }

    /// 由网格构造.
    pub fn from_grid(grid: Grid) -> Self {
        Self {
            header: Box::new(grid.to_header()),
            grid,
        }
    }

    /// 参考网格.
    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// 以参考网格的几何信息保存 `data`. `data` 的前三维必须与网格一致.
    pub fn save<D, P>(&self, data: ArrayView<'_, f32, D>, path: P) -> Result<(), DataError>
    where
        D: Dimension + RemoveAxis,
        P: AsRef<Path>,
    {
        let mut header = self.header.as_ref().clone();
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        WriterOptions::new(path.as_ref())
            .reference_header(&header)
            .write_nifti(&data)?;
        Ok(())
    }
}

/// 读取 `(i, j, k, c)` 四维浮点体积, 如皮层 PV 估计.
pub fn open_volume4<P: AsRef<Path>>(path: P) -> Result<(Grid, Array4<f32>), DataError> {
    let (header, data) = read_nifti::<Ix4>(path.as_ref())?;
    Ok((Grid::from_header(&header)?, data))
}
