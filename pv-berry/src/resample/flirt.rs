//! FSL FLIRT 配准矩阵的导入.
//!
//! FLIRT 矩阵作用在 "FSL 坐标" 上: 以毫米缩放的体素坐标, 当体素 -> 世界仿射的
//! 行列式为正时 x 轴翻转. 这里把它换算为世界坐标下的变换.

use std::fs;
use std::path::Path;

use nalgebra::{Matrix4, Vector3};
use thiserror::Error;

use crate::Grid;

/// FLIRT 矩阵导入错误.
#[derive(Debug, Error)]
pub enum FlirtError {
    /// 读取文件失败.
    #[error("cannot read FLIRT matrix: {0}")]
    Io(#[from] std::io::Error),

    /// 无法解析的数值.
    #[error("invalid number `{0}` in FLIRT matrix")]
    Parse(String),

    /// 数值个数不是 16.
    #[error("FLIRT matrix must contain 16 numbers, found {0}")]
    WrongCount(usize),

    /// 矩阵或坐标换算不可逆.
    #[error("FLIRT transform is singular")]
    Singular,
}

/// 解析以空白分隔、按行排列的 4x4 FLIRT 矩阵.
pub fn parse_flirt_matrix(text: &str) -> Result<Matrix4<f64>, FlirtError> {
    let values = text
        .split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| FlirtError::Parse(t.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    if values.len() != 16 {
        return Err(FlirtError::WrongCount(values.len()));
    }
    Ok(Matrix4::from_row_slice(&values))
}

/// 从文件读取 FLIRT 矩阵.
pub fn read_flirt_matrix<P: AsRef<Path>>(path: P) -> Result<Matrix4<f64>, FlirtError> {
    parse_flirt_matrix(&fs::read_to_string(path)?)
}

/// 体素坐标 -> FSL 坐标.
fn vox2fsl(grid: &Grid) -> Matrix4<f64> {
    let [px, py, pz] = grid.pix_dim();
    let scale = Matrix4::new_nonuniform_scaling(&Vector3::new(px, py, pz));
    if grid.determinant() > 0.0 {
        let mut flip = Matrix4::identity();
        flip[(0, 0)] = -1.0;
        flip[(0, 3)] = (grid.shape().0 - 1) as f64;
        scale * flip
    } else {
        scale
    }
}

/// 世界坐标 -> FSL 坐标.
#[inline]
fn world2fsl(grid: &Grid) -> Matrix4<f64> {
    vox2fsl(grid) * grid.world2vox()
}

/// 把 `ref2struct` FLIRT 矩阵 (参考 -> 结构像, FSL 坐标) 换算为世界坐标下的
/// `struct2ref` 变换.
pub fn struct2ref_from_flirt(
    ref2struct: &Matrix4<f64>,
    reference: &Grid,
    structural: &Grid,
) -> Result<Matrix4<f64>, FlirtError> {
    let fsl2world_struct = world2fsl(structural)
        .try_inverse()
        .ok_or(FlirtError::Singular)?;
    let ref2struct_world = fsl2world_struct * ref2struct * world2fsl(reference);
    ref2struct_world.try_inverse().ok_or(FlirtError::Singular)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn near(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse() {
        let text = "1 0 0 2\n0 1 0 0\n0 0 1 -3.5\n0 0 0 1\n";
        let m = parse_flirt_matrix(text).unwrap();
        assert_eq!(m[(0, 3)], 2.0);
        assert_eq!(m[(2, 3)], -3.5);
        assert!(matches!(
            parse_flirt_matrix("1 0 0"),
            Err(FlirtError::WrongCount(3))
        ));
        assert!(matches!(
            parse_flirt_matrix("1 0 0 x 0 1 0 0 0 0 1 0 0 0 0 1"),
            Err(FlirtError::Parse(_))
        ));
    }

    #[test]
    fn test_identity_between_same_grids() {
        let mut aff = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 2.0, 3.0));
        aff[(0, 3)] = -40.0;
        let g = Grid::new((20, 20, 10), aff).unwrap();
        let m = struct2ref_from_flirt(&Matrix4::identity(), &g, &g).unwrap();
        assert!(m.iter().zip(Matrix4::<f64>::identity().iter()).all(|(a, b)| near(*a, *b)));
    }

    #[test]
    fn test_translation_radiological_grid() {
        // 行列式为负, FSL 坐标不翻转: fsl = (-x, y, z).
        let g = Grid::new(
            (10, 10, 10),
            Matrix4::new_nonuniform_scaling(&Vector3::new(-2.0, 2.0, 2.0)),
        )
        .unwrap();
        let flirt = Matrix4::new_translation(&Vector3::new(2.0, 0.0, 0.0));
        let struct2ref = struct2ref_from_flirt(&flirt, &g, &g).unwrap();
        // ref -> struct 在世界坐标中是 x - 2, 其逆为 x + 2.
        let p = struct2ref.transform_point(&Point3::new(1.0, 5.0, 7.0));
        assert!(near(p.x, 3.0) && near(p.y, 5.0) && near(p.z, 7.0));
    }

    #[test]
    fn test_translation_neurological_grid() {
        // 行列式为正, FSL 坐标翻转: fsl_x = (n - 1) - x.
        let g = Grid::with_voxel_size((10, 10, 10), [1.0; 3]).unwrap();
        let flirt = Matrix4::new_translation(&Vector3::new(2.0, 0.0, 0.0));
        let struct2ref = struct2ref_from_flirt(&flirt, &g, &g).unwrap();
        let p = struct2ref.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!(near(p.x, 3.0));
    }
}
