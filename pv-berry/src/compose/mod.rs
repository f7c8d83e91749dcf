//! 部分容积合成.
//!
//! 输入均已展平到参考网格的 `N` 个体素上: 体积法 CSF (`N`), 皮层估计 (`N x 3`),
//! 以及类白质/类灰质结构的分数掩膜. 输出为 `N x 3` 的 (GM, WM, CSF) 数组.
//!
//! 合成顺序固定:
//!
//! 1. 类白质结构依次叠加到 WM, 并覆盖工作 CSF 估计.
//! 2. CSF 取 `1 - WM`.
//! 3. 皮层估计中 GM 或 WM 非零的体素整体替换为皮层估计.
//! 4. 不与皮层带相交的体素接受更大的体积法 CSF, 随后第一次检查不变量.
//! 5. 类灰质结构按名称字典序叠加到 GM.
//! 6. 截断负值后第二次检查不变量, 再除以行和.
//!
//! 合成是纯函数, 不修改任何输入.

mod error;
mod volumetric;

pub use error::{Checkpoint, CompositionError, Violation, ViolationKind};
pub use volumetric::volumetric_csf;

use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::consts::{CORTEX_GM_THRESHOLD, PV_CHANNELS, PV_TOLERANCE};

/// 重采样到参考网格后的具名结构分数掩膜.
///
/// 类白质结构保持调用方给出的顺序; 类灰质结构按名称字典序处理.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructurePvs {
    /// 类白质结构, 按叠加顺序.
    pub wm_like: Vec<(String, Array1<f32>)>,

    /// 类灰质结构.
    pub gm_like: BTreeMap<String, Array1<f32>>,
}

impl StructurePvs {
    /// 空集合.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 按 `wm_order` 划分具名结构: 列表中的结构按列表顺序成为类白质结构,
    /// 其余均为类灰质结构. 列表中不存在于 `named` 的结构被跳过.
    pub fn partition<S: AsRef<str>>(
        mut named: BTreeMap<String, Array1<f32>>,
        wm_order: &[S],
    ) -> Self {
        let mut wm_like = Vec::with_capacity(wm_order.len());
        for name in wm_order {
            let name = name.as_ref();
            match named.remove_entry(name) {
                Some(entry) => wm_like.push(entry),
                None => log::debug!("WM-like structure `{name}` absent from labels, skipped"),
            }
        }
        Self {
            wm_like,
            gm_like: named,
        }
    }

    /// 检查名称唯一性及体素个数.
    fn validate(&self, n: usize) -> Result<(), CompositionError> {
        let mut seen = BTreeSet::new();
        for (name, _) in &self.wm_like {
            if !seen.insert(name.as_str()) || self.gm_like.contains_key(name) {
                return Err(CompositionError::DuplicateStructure(name.clone()));
            }
        }
        let all = self
            .wm_like
            .iter()
            .map(|(k, v)| (k, v))
            .chain(self.gm_like.iter());
        for (name, pv) in all {
            if pv.len() != n {
                return Err(CompositionError::ShapeMismatch {
                    what: name.clone(),
                    expected: n,
                    found: pv.len(),
                });
            }
        }
        Ok(())
    }
}

/// 合成 `N x 3` 的 (GM, WM, CSF) 部分容积.
///
/// `vol_csf` 为体积法 CSF 估计, `cortex` 为 `N x 3` 的 (GM, WM, 非脑) 皮层估计.
/// 两个检查点中任何一个不变量被破坏都会返回 [`CompositionError::InvariantViolated`].
pub fn compose(
    vol_csf: ArrayView1<f32>,
    cortex: ArrayView2<f32>,
    structures: &StructurePvs,
) -> Result<Array2<f32>, CompositionError> {
    let n = vol_csf.len();
    let (rows, cols) = cortex.dim();
    if cols != PV_CHANNELS {
        return Err(CompositionError::CortexChannels(cols));
    }
    if rows != n {
        return Err(CompositionError::ShapeMismatch {
            what: "cortex".to_string(),
            expected: n,
            found: rows,
        });
    }
    structures.validate(n)?;

    let mut gm = Array1::<f32>::zeros(n);
    let mut wm = Array1::<f32>::zeros(n);
    let mut out_csf = Array1::<f32>::zeros(n);
    let mut csf = vol_csf.to_owned();

    for (_, s) in &structures.wm_like {
        Zip::from(&mut wm)
            .and(&mut csf)
            .and(s)
            .for_each(|w, c, &s| {
                *w = (*w + s).min(1.0);
                if s > 0.0 {
                    *c = (1.0 - s).max(0.0);
                }
            });
    }

    Zip::from(&mut out_csf)
        .and(&wm)
        .for_each(|o, &w| *o = (1.0 - w).max(0.0));

    let ctx_gm = cortex.column(0);
    let ctx_wm = cortex.column(1);
    let ctx_nb = cortex.column(2);
    Zip::from(&mut gm)
        .and(&mut wm)
        .and(&mut out_csf)
        .and(&ctx_gm)
        .and(&ctx_wm)
        .and(&ctx_nb)
        .for_each(|g, w, o, &cg, &cw, &cn| {
            if cg > 0.0 || cw > 0.0 {
                *g = cg;
                *w = cw;
                *o = cn;
            }
        });

    Zip::from(&mut gm)
        .and(&mut wm)
        .and(&mut out_csf)
        .and(&csf)
        .and(&ctx_gm)
        .for_each(|g, w, o, &c, &cg| {
            let in_cortex = cg > CORTEX_GM_THRESHOLD;
            if c > *o && !in_cortex {
                *o = c;
                *g = g.min(1.0 - *o);
                *w = w.min(1.0 - (*o + *g));
            }
        });

    let pvs = stack(&gm, &wm, &out_csf);
    check_invariants(pvs.view(), Checkpoint::CsfBackfill)?;

    let mut gm = pvs.column(0).to_owned();
    let mut wm = pvs.column(1).to_owned();
    let mut out_csf = pvs.column(2).to_owned();
    for s in structures.gm_like.values() {
        Zip::from(&mut gm)
            .and(&mut wm)
            .and(&mut out_csf)
            .and(s)
            .for_each(|g, w, o, &s| {
                if s > 0.0 {
                    *g = (*g + s).min(1.0);
                    *o = o.min(1.0 - *g);
                    *w = (1.0 - (*g + *o)).max(0.0);
                }
            });
    }
    finalize(stack(&gm, &wm, &out_csf))
}

/// 截断负值, 检查不变量, 再除以行和. 除法只做数值修正, 不能掩盖行和偏离.
fn finalize(mut pvs: Array2<f32>) -> Result<Array2<f32>, CompositionError> {
    clip_negative(&mut pvs);
    check_invariants(pvs.view(), Checkpoint::Final)?;
    let fallback = divide_by_sum(&mut pvs);
    if fallback > 0 {
        log::debug!("{fallback} voxel(s) had zero total PV, set to pure CSF");
    }
    Ok(pvs)
}

/// 把三个通道拼成 `N x 3`.
fn stack(gm: &Array1<f32>, wm: &Array1<f32>, csf: &Array1<f32>) -> Array2<f32> {
    let mut out = Array2::zeros((gm.len(), PV_CHANNELS));
    out.column_mut(0).assign(gm);
    out.column_mut(1).assign(wm);
    out.column_mut(2).assign(csf);
    out
}

/// 负值截断为 0, 每行除以行和. 行和恰为 0 的体素被设为纯 CSF `(0, 0, 1)`.
///
/// 返回被设为纯 CSF 的体素个数. 对已归一化的数据再次调用不改变结果.
pub fn normalize(pvs: &mut Array2<f32>) -> usize {
    clip_negative(pvs);
    divide_by_sum(pvs)
}

fn clip_negative(pvs: &mut Array2<f32>) {
    pvs.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
}

fn divide_by_sum(pvs: &mut Array2<f32>) -> usize {
    let mut fallback = 0;
    for mut row in pvs.axis_iter_mut(Axis(0)) {
        let sum = row.sum();
        if sum == 0.0 {
            row.assign(&ndarray::arr1(&[0.0, 0.0, 1.0]));
            fallback += 1;
        } else {
            row.mapv_inplace(|v| v / sum);
        }
    }
    fallback
}

/// 检查每个体素三通道之和为 1, 且每个通道位于 `[0, 1]`, 容差均为 [`PV_TOLERANCE`].
/// NaN 与无穷总是违反.
///
/// 返回的错误携带所有违反的体素.
pub fn check_invariants(
    pvs: ArrayView2<f32>,
    checkpoint: Checkpoint,
) -> Result<(), CompositionError> {
    let mut violations = Vec::new();
    for (voxel, row) in pvs.axis_iter(Axis(0)).enumerate() {
        if row.iter().all(|v| v.is_finite()) {
            let off = (row.sum() - 1.0).abs();
            if off > PV_TOLERANCE {
                violations.push(Violation {
                    voxel,
                    kind: ViolationKind::SumNotOne,
                    magnitude: off,
                });
            }
        }
        for (c, &v) in row.iter().enumerate() {
            if !v.is_finite() {
                violations.push(Violation {
                    voxel,
                    kind: ViolationKind::NotFinite(c),
                    magnitude: v.abs(),
                });
            } else if v < -PV_TOLERANCE {
                violations.push(Violation {
                    voxel,
                    kind: ViolationKind::BelowZero(c),
                    magnitude: -v,
                });
            } else if v > 1.0 + PV_TOLERANCE {
                violations.push(Violation {
                    voxel,
                    kind: ViolationKind::AboveOne(c),
                    magnitude: v - 1.0,
                });
            }
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        log::error!(
            "{} PV invariant violation(s) {checkpoint}",
            violations.len()
        );
        Err(CompositionError::InvariantViolated {
            checkpoint,
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array};

    fn near(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    fn assert_triple(pvs: &Array2<f32>, voxel: usize, expect: [f32; 3]) {
        let row = pvs.row(voxel);
        for (c, e) in expect.iter().enumerate() {
            assert!(
                near(row[c], *e),
                "voxel {voxel}: got {row}, expected {expect:?}"
            );
        }
    }

    /// 非脑皮层估计: `(0, 0, 1)`.
    fn no_cortex(n: usize) -> Array2<f32> {
        let mut c = Array2::zeros((n, 3));
        c.column_mut(2).fill(1.0);
        c
    }

    #[test]
    fn test_untouched_voxel_is_csf() {
        let out = compose(arr1(&[1.0]).view(), no_cortex(1).view(), &StructurePvs::new()).unwrap();
        assert_triple(&out, 0, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_brainstem_fills_wm() {
        let mut s = StructurePvs::new();
        s.wm_like.push(("BrStem".into(), arr1(&[1.0, 0.4])));
        let out = compose(arr1(&[1.0, 1.0]).view(), no_cortex(2).view(), &s).unwrap();
        assert_triple(&out, 0, [0.0, 1.0, 0.0]);
        assert_triple(&out, 1, [0.0, 0.4, 0.6]);
    }

    #[test]
    fn test_cortex_triple_is_kept() {
        let cortex = arr2(&[[0.6, 0.3, 0.1]]);
        let out = compose(arr1(&[0.0]).view(), cortex.view(), &StructurePvs::new()).unwrap();
        assert_triple(&out, 0, [0.6, 0.3, 0.1]);
    }

    #[test]
    fn test_csf_backfill() {
        // 重叠的类白质结构: 工作 CSF 取最后一个结构的 1 - s.
        let mut s = StructurePvs::new();
        s.wm_like.push(("BrStem".into(), arr1(&[0.3, 0.5, 0.5])));
        s.wm_like.push(("L_CerWM".into(), arr1(&[0.3, 0.0, 0.0])));
        let cortex = arr2(&[[0.0, 0.0, 1.0], [0.02, 0.5, 0.48], [0.005, 0.5, 0.495]]);
        let out = compose(arr1(&[0.0, 0.0, 0.0]).view(), cortex.view(), &s).unwrap();
        assert_triple(&out, 0, [0.0, 0.3, 0.7]);
        // 与皮层带相交, 不回填.
        assert_triple(&out, 1, [0.02, 0.5, 0.48]);
        assert_triple(&out, 2, [0.005, 0.495, 0.5]);
    }

    #[test]
    fn test_gm_like_structures_displace_wm() {
        let mut s = StructurePvs::new();
        s.wm_like.push(("BrStem".into(), arr1(&[0.4, 0.0])));
        s.gm_like.insert("L_Accu".into(), arr1(&[0.4, 1.0]));
        let out = compose(arr1(&[1.0, 1.0]).view(), no_cortex(2).view(), &s).unwrap();
        assert_triple(&out, 0, [0.4, 0.0, 0.6]);
        assert_triple(&out, 1, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_invariants_hold_on_mixed_inputs() {
        // 确定性的伪随机输入.
        let mut state = 7u32;
        let mut next = || {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 8) as f32 / (1u32 << 24) as f32
        };
        let n = 500;
        let vol_csf = Array::from_shape_simple_fn(n, &mut next);
        let mut cortex = Array2::zeros((n, 3));
        for mut row in cortex.axis_iter_mut(Axis(0)) {
            let (a, b) = (next(), next());
            if a < 0.5 {
                let (g, w) = (a, b * (1.0 - a));
                row.assign(&arr1(&[g, w, 1.0 - g - w]));
            } else {
                row[2] = 1.0;
            }
        }
        let mut s = StructurePvs::new();
        for name in ["BrStem", "L_CerWM", "R_CerWM"] {
            let pv = Array::from_shape_simple_fn(n, || {
                let v = next();
                if v < 0.7 {
                    0.0
                } else {
                    v
                }
            });
            s.wm_like.push((name.into(), pv));
        }
        for name in ["R_Thal", "L_Puta", "L_Accu"] {
            let pv = Array::from_shape_simple_fn(n, || {
                let v = next();
                if v < 0.6 {
                    0.0
                } else {
                    v
                }
            });
            s.gm_like.insert(name.into(), pv);
        }

        let out = compose(vol_csf.view(), cortex.view(), &s).unwrap();
        assert_eq!(out.dim(), (n, 3));
        assert!(check_invariants(out.view(), Checkpoint::Final).is_ok());
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut pvs = arr2(&[[0.2, 0.2, 0.4], [-0.1, 0.5, 0.5], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert_eq!(normalize(&mut pvs), 1);
        assert_triple(&pvs, 0, [0.25, 0.25, 0.5]);
        assert_triple(&pvs, 1, [0.0, 0.5, 0.5]);
        assert_triple(&pvs, 2, [0.0, 0.0, 1.0]);
        let once = pvs.clone();
        assert_eq!(normalize(&mut pvs), 0);
        assert!(pvs.iter().zip(once.iter()).all(|(a, b)| near(*a, *b)));
    }

    #[test]
    fn test_invariant_violation_is_reported() {
        let cortex = arr2(&[[0.0, 0.0, 1.0], [0.5, 0.5, 0.5], [0.3, 0.0, 0.7]]);
        let err = compose(arr1(&[1.0, 1.0, 1.0]).view(), cortex.view(), &StructurePvs::new())
            .unwrap_err();
        match err {
            CompositionError::InvariantViolated {
                checkpoint,
                violations,
            } => {
                assert_eq!(checkpoint, Checkpoint::CsfBackfill);
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].voxel, 1);
                assert_eq!(violations[0].kind, ViolationKind::SumNotOne);
                assert!(near(violations[0].magnitude, 0.5));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nan_cortex_is_reported() {
        let cortex = arr2(&[[0.0, 0.0, 1.0], [f32::NAN, 0.5, 0.5]]);
        let err = compose(arr1(&[0.0, 0.0]).view(), cortex.view(), &StructurePvs::new())
            .unwrap_err();
        match err {
            CompositionError::InvariantViolated {
                checkpoint,
                violations,
            } => {
                assert_eq!(checkpoint, Checkpoint::CsfBackfill);
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].voxel, 1);
                assert_eq!(violations[0].kind, ViolationKind::NotFinite(0));
            }
            other => panic!("unexpected error: {other}"),
        }

        let pvs = arr2(&[[f32::NAN, f32::NAN, f32::NAN], [f32::INFINITY, 0.0, 0.0]]);
        let kinds: Vec<_> = match check_invariants(pvs.view(), Checkpoint::Final) {
            Err(CompositionError::InvariantViolated { violations, .. }) => {
                violations.iter().map(|v| (v.voxel, v.kind)).collect()
            }
            other => panic!("unexpected result: {other:?}"),
        };
        assert_eq!(
            kinds,
            [
                (0, ViolationKind::NotFinite(0)),
                (0, ViolationKind::NotFinite(1)),
                (0, ViolationKind::NotFinite(2)),
                (1, ViolationKind::NotFinite(0)),
            ]
        );
    }

    #[test]
    fn test_out_of_range_channels_are_reported() {
        // 负的类白质分数: WM 低于 0, CSF 高于 1, 行和仍为 1.
        let mut s = StructurePvs::new();
        s.wm_like.push(("BrStem".into(), arr1(&[0.0, -0.5])));
        let err = compose(arr1(&[0.0, 0.0]).view(), no_cortex(2).view(), &s).unwrap_err();
        match err {
            CompositionError::InvariantViolated {
                checkpoint,
                violations,
            } => {
                assert_eq!(checkpoint, Checkpoint::CsfBackfill);
                let kinds: Vec<_> = violations.iter().map(|v| (v.voxel, v.kind)).collect();
                assert_eq!(
                    kinds,
                    [(1, ViolationKind::BelowZero(1)), (1, ViolationKind::AboveOne(2))]
                );
                assert!(violations.iter().all(|v| near(v.magnitude, 0.5)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_final_check_precedes_division() {
        let out = finalize(arr2(&[[-1e-7, 0.5, 0.5], [0.0, 0.0, 1.0]])).unwrap();
        assert_triple(&out, 0, [0.0, 0.5, 0.5]);

        // 行和偏离 1 的体素在除法之前被发现, 不会被悄悄放大为合法三元组.
        let err = finalize(arr2(&[[0.2, 0.2, 0.2], [-0.5, 1.0, 0.0]])).unwrap_err();
        match err {
            CompositionError::InvariantViolated {
                checkpoint,
                violations,
            } => {
                assert_eq!(checkpoint, Checkpoint::Final);
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].voxel, 0);
                assert_eq!(violations[0].kind, ViolationKind::SumNotOne);
                assert!(near(violations[0].magnitude, 0.4));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_preconditions() {
        let mut s = StructurePvs::new();
        s.wm_like.push(("BrStem".into(), arr1(&[1.0])));
        s.gm_like.insert("BrStem".into(), arr1(&[1.0]));
        assert!(matches!(
            compose(arr1(&[1.0]).view(), no_cortex(1).view(), &s),
            Err(CompositionError::DuplicateStructure(name)) if name == "BrStem"
        ));

        let mut s = StructurePvs::new();
        s.gm_like.insert("L_Accu".into(), arr1(&[1.0, 0.0]));
        assert!(matches!(
            compose(arr1(&[1.0]).view(), no_cortex(1).view(), &s),
            Err(CompositionError::ShapeMismatch { expected: 1, found: 2, .. })
        ));
        assert!(matches!(
            compose(arr1(&[1.0, 1.0]).view(), no_cortex(1).view(), &StructurePvs::new()),
            Err(CompositionError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            compose(arr1(&[1.0]).view(), Array2::zeros((1, 2)).view(), &StructurePvs::new()),
            Err(CompositionError::CortexChannels(2))
        ));
    }

    #[test]
    fn test_partition_keeps_wm_order() {
        let named: BTreeMap<String, Array1<f32>> = ["R_CerWM", "BrStem", "L_Caud"]
            .into_iter()
            .map(|n| (n.to_string(), arr1(&[0.0])))
            .collect();
        let s = StructurePvs::partition(named, &["BrStem", "L_CerWM", "R_CerWM"]);
        let wm: Vec<_> = s.wm_like.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(wm, ["BrStem", "R_CerWM"]);
        assert_eq!(s.gm_like.keys().collect::<Vec<_>>(), ["L_Caud"]);
    }

    #[test]
    fn test_compose_does_not_touch_inputs() {
        let vol_csf = arr1(&[0.2, 1.0]);
        let cortex = no_cortex(2);
        let mut s = StructurePvs::new();
        s.wm_like.push(("BrStem".into(), arr1(&[0.5, 0.0])));
        let before = (vol_csf.clone(), cortex.clone(), s.clone());
        compose(vol_csf.view(), cortex.view(), &s).unwrap();
        assert_eq!((vol_csf, cortex, s), before);
    }
}
