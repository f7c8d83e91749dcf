//! 输出格式: 把展平的 `N x 3` 部分容积还原为参考网格上的体积并写出.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, Array4, ArrayView4, Axis};
use thiserror::Error;

use crate::consts::PV_CHANNELS;
use crate::label::Tissue;
use crate::{DataError, Idx3d, ReferenceSpace};

/// 输出格式错误.
#[derive(Debug, Error)]
pub enum FormatError {
    /// 体素个数与网格不符.
    #[error("{found} voxels cannot be reshaped to grid {shape:?}")]
    Shape {
        /// 目标网格.
        shape: Idx3d,
        /// 实际体素个数.
        found: usize,
    },

    /// 通道数不是 3.
    #[error("expected 3 channels, found {0}")]
    Channels(usize),

    /// 输出路径没有 (UTF-8) 文件名.
    #[error("output path `{}` has no usable file name", .0.display())]
    BadPath(PathBuf),

    /// 写文件失败.
    #[error("write: {0}")]
    Data(#[from] DataError),
}

/// 输出布局.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// 单个四维文件, 最后一维为 (GM, WM, CSF).
    #[default]
    Stacked,

    /// 三个三维文件, 文件名分别加上 `_GM`, `_WM`, `_CSF` 后缀.
    Split,
}

/// 把 `N x 3` 数组按 C 顺序还原为 `(x, y, z, 3)` 体积.
pub fn to_volume(flat: Array2<f32>, shape: Idx3d) -> Result<Array4<f32>, FormatError> {
    let (n, c) = flat.dim();
    if c != PV_CHANNELS {
        return Err(FormatError::Channels(c));
    }
    let (x, y, z) = shape;
    if n != x * y * z {
        return Err(FormatError::Shape { shape, found: n });
    }
    let flat = flat.as_standard_layout().into_owned();
    flat.into_shape((x, y, z, PV_CHANNELS))
        .map_err(|_| FormatError::Shape { shape, found: n })
}

/// 按 (GM, WM, CSF) 拆分为三个单通道体积.
pub fn split_channels(vol: ArrayView4<f32>) -> Result<[Array3<f32>; 3], FormatError> {
    let c = vol.len_of(Axis(3));
    if c != PV_CHANNELS {
        return Err(FormatError::Channels(c));
    }
    Ok(Tissue::ALL.map(|t| vol.index_axis(Axis(3), t.channel()).to_owned()))
}

/// 拆分输出的三个文件名.
///
/// 文件名在第一个 `.` 处分为主干和扩展名, 后缀插在两者之间:
/// `dir/pvs.nii.gz` -> `dir/pvs_GM.nii.gz`, `dir/pvs_WM.nii.gz`, `dir/pvs_CSF.nii.gz`.
pub fn split_output_paths(path: &Path) -> Result<[PathBuf; 3], FormatError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FormatError::BadPath(path.to_path_buf()))?;
    let (stem, ext) = match name.find('.') {
        Some(i) => name.split_at(i),
        None => (name, ""),
    };
    if stem.is_empty() {
        return Err(FormatError::BadPath(path.to_path_buf()));
    }
    Ok(Tissue::ALL.map(|t| path.with_file_name(format!("{stem}_{}{ext}", t.abbr()))))
}

/// 按 `layout` 写出 `(x, y, z, 3)` 体积, 返回写出的文件.
pub fn write_pvs(
    space: &ReferenceSpace,
    vol: ArrayView4<f32>,
    path: &Path,
    layout: OutputLayout,
) -> Result<Vec<PathBuf>, FormatError> {
    match layout {
        OutputLayout::Stacked => {
            space.save(vol, path)?;
            log::info!("saved PVs to `{}`", path.display());
            Ok(vec![path.to_path_buf()])
        }
        OutputLayout::Split => {
            let paths = split_output_paths(path)?;
            let channels = split_channels(vol)?;
            for (p, data) in paths.iter().zip(channels.iter()) {
                space.save(data.view(), p)?;
                log::info!("saved PV channel to `{}`", p.display());
            }
            Ok(paths.to_vec())
        }
    }
}
