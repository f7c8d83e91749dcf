//! 由通用 GM/WM 估计推出体积法 CSF.

use ndarray::{Array, ArrayView, Dimension, Zip};

use crate::consts::VOLUMETRIC_CSF_FLOOR;

/// `csf = max(0, 1 - gm - wm)`, 低于阈值的 CSF 置零, 再把 (GM, WM, CSF)
/// 三元组归一化并返回 CSF 通道. 三者全为零的体素 CSF 为 1.
pub fn volumetric_csf<D: Dimension>(
    gm: ArrayView<f32, D>,
    wm: ArrayView<f32, D>,
) -> Array<f32, D> {
    let mut out = Array::zeros(gm.raw_dim());
    Zip::from(&mut out)
        .and(&gm)
        .and(&wm)
        .for_each(|o, &g, &w| {
            let mut csf = (1.0 - g - w).max(0.0);
            if csf < VOLUMETRIC_CSF_FLOOR {
                csf = 0.0;
            }
            let sum = g + w + csf;
            *o = if sum == 0.0 { 1.0 } else { csf / sum };
        });
    out
}
