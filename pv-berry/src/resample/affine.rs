//! 基于世界坐标仿射的默认重采样实现.

use itertools::iproduct;
use nalgebra::{Matrix4, Point3};
use ndarray::{Array4, ArrayView4, ArrayViewMut1, ArrayViewMut3, Axis, Zip};

use super::{check_shape, Interpolation, ResampleError, Resampler};
use crate::Grid;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

/// 以世界坐标下的 `struct2ref` 变换 (源 -> 参考) 描述两网格关系的重采样器.
///
/// 参考网格的每个体素被划分为 `f_x * f_y * f_z` 个子体素,
/// 其中 `f_a = ceil(参考体素尺寸 / 源体素尺寸)` (至少为 1).
/// 各子体素中心在源网格上插值后取平均. 落在源网格外的采样点读数为 0.
#[derive(Clone, Debug, PartialEq)]
pub struct AffineResampler {
    ref2struct: Matrix4<f64>,
}

impl AffineResampler {
    /// 由 `struct2ref` 变换创建. 变换不可逆时返回 `Err`.
    pub fn new(struct2ref: Matrix4<f64>) -> Result<Self, ResampleError> {
        let ref2struct = struct2ref
            .try_inverse()
            .ok_or(ResampleError::SingularTransform)?;
        Ok(Self { ref2struct })
    }

    /// 两网格处于同一世界坐标系.
    pub fn identity() -> Self {
        Self {
            ref2struct: Matrix4::identity(),
        }
    }

    /// 参考体素坐标 -> 源体素坐标.
    #[inline]
    fn ref_vox2src_vox(&self, src: &Grid, reference: &Grid) -> Matrix4<f64> {
        src.world2vox() * self.ref2struct * reference.vox2world()
    }
}

impl Default for AffineResampler {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

/// 各轴的超采样倍数.
fn supersampling(src: &Grid, reference: &Grid) -> [usize; 3] {
    let s = src.pix_dim();
    let r = reference.pix_dim();
    // 容忍浮点误差, 避免 2.0000001 被取整为 3.
    [0, 1, 2].map(|a| ((r[a] / s[a]) - 1e-6).ceil().max(1.0) as usize)
}

/// 将单位长度 `[-0.5, 0.5)` 均分为 `f` 段, 返回各段中心.
fn sub_offsets(f: usize) -> Vec<f64> {
    (0..f).map(|s| (s as f64 + 0.5) / f as f64 - 0.5).collect()
}

/// 一次重采样任务的只读上下文, 在线程间共享.
struct Task<'a> {
    data: ArrayView4<'a, f32>,
    order: Interpolation,
    affine: Matrix4<f64>,
    offsets: [Vec<f64>; 3],
}

impl Task<'_> {
    /// 计算参考网格中第 `i` 个 `x` 切片.
    fn fill_slab(&self, i: usize, mut slab: ArrayViewMut3<f32>) {
        let n = self.offsets.iter().map(Vec::len).product::<usize>();
        let weight = 1.0 / n as f32;
        let [ox, oy, oz] = &self.offsets;
        Zip::indexed(slab.lanes_mut(Axis(2))).for_each(|(j, k), mut lane| {
            for (dx, dy, dz) in iproduct!(ox, oy, oz) {
                let p = self.affine.transform_point(&Point3::new(
                    i as f64 + dx,
                    j as f64 + dy,
                    k as f64 + dz,
                ));
                self.accumulate(&p, &mut lane, weight);
            }
        });
    }

    /// 在源体素坐标 `p` 处插值, 以 `weight` 为权累加到 `lane` 的各通道.
    fn accumulate(&self, p: &Point3<f64>, lane: &mut ArrayViewMut1<f32>, weight: f32) {
        let (nx, ny, nz, _) = self.data.dim();
        let dims = [nx, ny, nz];
        match self.order {
            Interpolation::Nearest => {
                let inside = (0..3).all(|a| p[a] > -0.5 && p[a] < dims[a] as f64 - 0.5);
                if !inside {
                    return;
                }
                let [x, y, z] = [0, 1, 2].map(|a| p[a].round().max(0.0) as usize);
                lane.zip_mut_with(&self.data.slice(ndarray::s![x, y, z, ..]), |o, &v| {
                    *o += weight * v;
                });
            }
            Interpolation::Linear => {
                let base = [0, 1, 2].map(|a| p[a].floor());
                let frac = [0, 1, 2].map(|a| p[a] - base[a]);
                for (cx, cy, cz) in iproduct!(0..2, 0..2, 0..2) {
                    let corner = [cx, cy, cz];
                    let idx = [0, 1, 2].map(|a| base[a] as i64 + corner[a] as i64);
                    if (0..3).any(|a| idx[a] < 0 || idx[a] >= dims[a] as i64) {
                        continue;
                    }
                    let w = (0..3)
                        .map(|a| if corner[a] == 1 { frac[a] } else { 1.0 - frac[a] })
                        .product::<f64>() as f32;
                    if w == 0.0 {
                        continue;
                    }
                    let [x, y, z] = idx.map(|v| v as usize);
                    lane.zip_mut_with(&self.data.slice(ndarray::s![x, y, z, ..]), |o, &v| {
                        *o += weight * w * v;
                    });
                }
            }
        }
    }
}

impl Resampler for AffineResampler {
    fn apply_to_array(
        &self,
        data: ArrayView4<f32>,
        src: &Grid,
        reference: &Grid,
        order: Interpolation,
        cores: usize,
    ) -> Result<Array4<f32>, ResampleError> {
        check_shape(&data, src)?;
        let (nx, ny, nz) = reference.shape();
        let channels = data.len_of(Axis(3));
        let mut out = Array4::zeros((nx, ny, nz, channels));
        let task = Task {
            data,
            order,
            affine: self.ref_vox2src_vox(src, reference),
            offsets: supersampling(src, reference).map(sub_offsets),
        };
        log::debug!(
            "resampling {:?} x{channels} -> {:?} (order {}, supersampling {:?})",
            src.shape(),
            reference.shape(),
            order.order(),
            task.offsets.iter().map(Vec::len).collect::<Vec<_>>(),
        );

        #[cfg(feature = "rayon")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(cores.max(1))
                .build()?;
            pool.install(|| {
                out.axis_iter_mut(Axis(0))
                    .into_par_iter()
                    .enumerate()
                    .for_each(|(i, slab)| task.fill_slab(i, slab));
            });
        }

        #[cfg(not(feature = "rayon"))]
        {
            let _ = cores;
            out.axis_iter_mut(Axis(0))
                .enumerate()
                .for_each(|(i, slab)| task.fill_slab(i, slab));
        }

        Ok(out)
    }
}
