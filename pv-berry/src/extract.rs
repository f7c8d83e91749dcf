//! 从分割标签提取通用组织指示体积与具名结构掩膜.

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array3, ArrayView3, Zip};

use crate::label::{Classification, LabelClassifier, Tissue};

/// 体素中的标签被归入的去向. 仅在提取过程内部使用.
#[derive(Copy, Clone, Debug)]
enum Target {
    Gm,
    Wm,
    Structure(usize),
    Nowhere,
}

/// 结构提取的结果.
///
/// 通用 GM 与 WM 指示体积互斥; 各具名结构掩膜两两不相交.
#[derive(Debug, Clone)]
pub struct Extracted {
    /// 通用灰质指示体积.
    pub gm: Array3<bool>,

    /// 通用白质指示体积. CSF 是隐含的, 不单独给出.
    pub wm: Array3<bool>,

    /// 结构名 -> 掩膜. 同一结构的多个标签取并集.
    pub structures: BTreeMap<String, Array3<bool>>,

    /// 体积中出现但无法分类 (且不在忽略集中) 的标签, 升序.
    pub unknown: Vec<i32>,
}

impl Extracted {
    /// 结构 `name` 的掩膜.
    #[inline]
    pub fn structure(&self, name: &str) -> Option<&Array3<bool>> {
        self.structures.get(name)
    }
}

/// 对 `labels` 中每个不同的标签只分类一次, 然后单遍扫描体积构造各掩膜.
///
/// 不在忽略集中的未知标签会以 `warn` 级别记录, 并通过 [`Extracted::unknown`] 返回.
pub fn extract_structures(labels: ArrayView3<i32>, classifier: &LabelClassifier) -> Extracted {
    let mut codes: Vec<i32> = labels.iter().copied().collect();
    codes.sort_unstable();
    codes.dedup();

    let mut names: Vec<String> = Vec::new();
    let mut unknown = Vec::new();
    let mut targets: HashMap<i32, Target> = HashMap::with_capacity(codes.len());

    for &code in &codes {
        let target = match classifier.classify(code) {
            Classification::Tissue(Tissue::Gm) => Target::Gm,
            Classification::Tissue(Tissue::Wm) => Target::Wm,
            Classification::Tissue(Tissue::Csf) | Classification::Ignored => Target::Nowhere,
            Classification::Structure { name, .. } => {
                let idx = match names.iter().position(|n| n == name) {
                    Some(idx) => idx,
                    None => {
                        names.push(name.to_string());
                        names.len() - 1
                    }
                };
                Target::Structure(idx)
            }
            Classification::Unknown => {
                log::warn!("label {code} is not in the lookup table, voxels left as CSF");
                unknown.push(code);
                Target::Nowhere
            }
        };
        targets.insert(code, target);
    }

    let dim = labels.raw_dim();
    let mut gm = Array3::from_elem(dim, false);
    let mut wm = Array3::from_elem(dim, false);
    let mut masks: Vec<Array3<bool>> = vec![Array3::from_elem(dim, false); names.len()];

    for (idx, code) in labels.indexed_iter() {
        match targets[code] {
            Target::Gm => gm[idx] = true,
            Target::Wm => wm[idx] = true,
            Target::Structure(s) => masks[s][idx] = true,
            Target::Nowhere => {}
        }
    }

    log::debug!(
        "extracted {} distinct labels: {} GM voxels, {} WM voxels, {} structures",
        codes.len(),
        gm.iter().filter(|v| **v).count(),
        wm.iter().filter(|v| **v).count(),
        names.len()
    );

    Extracted {
        gm,
        wm,
        structures: names.into_iter().zip(masks).collect(),
        unknown,
    }
}

/// 把布尔掩膜转换为 `0.0`/`1.0` 浮点体积, 以便重采样.
pub fn mask_to_f32(mask: ArrayView3<bool>) -> Array3<f32> {
    let mut out = Array3::zeros(mask.raw_dim());
    Zip::from(&mut out).and(&mask).for_each(|o, &m| {
        if m {
            *o = 1.0;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{LabelTable, TableEntry};
    use ndarray::Array;

    fn labels(v: Vec<i32>) -> Array3<i32> {
        let n = v.len();
        Array::from_shape_vec((n, 1, 1), v).unwrap()
    }

    #[test]
    fn test_generic_indicators_are_exclusive() {
        let l = labels(vec![2, 3, 0, 1035, 3010, 252, 24, 4]);
        let e = extract_structures(l.view(), &LabelClassifier::freesurfer());
        assert_eq!(
            e.gm.iter().copied().collect::<Vec<_>>(),
            [false, true, false, true, false, false, false, false]
        );
        assert_eq!(
            e.wm.iter().copied().collect::<Vec<_>>(),
            [true, false, false, false, true, true, false, false]
        );
        assert!(Zip::from(&e.gm).and(&e.wm).all(|&g, &w| !(g && w)));
        assert!(e.structures.is_empty());
        assert!(e.unknown.is_empty());
    }

    #[test]
    fn test_many_codes_union_into_one_mask() {
        let l = labels(vec![9, 10, 48, 26, 16, 0]);
        let e = extract_structures(l.view(), &LabelClassifier::freesurfer());
        let names: Vec<_> = e.structures.keys().map(String::as_str).collect();
        assert_eq!(names, ["BrStem", "L_Accu", "L_Thal", "R_Thal"]);
        assert_eq!(
            e.structure("L_Thal").unwrap().iter().copied().collect::<Vec<_>>(),
            [true, true, false, false, false, false]
        );

        // 具名结构掩膜两两不相交.
        let total = e
            .structures
            .values()
            .map(|m| m.iter().filter(|v| **v).count())
            .sum::<usize>();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_unknown_and_ignored_codes() {
        let l = labels(vec![9999, 6, 45, 0, 9999, -3]);
        let e = extract_structures(l.view(), &LabelClassifier::freesurfer());
        assert_eq!(e.unknown, [-3, 9999]);
        assert!(!e.gm.iter().any(|v| *v));
        assert!(!e.wm.iter().any(|v| *v));
    }

    #[test]
    fn test_injected_table_and_f32_mask() {
        let mut table = LabelTable::freesurfer();
        table.exact.insert(9999, TableEntry::Structure("Lesion".into()));
        let c = LabelClassifier::new(table).unwrap();
        let e = extract_structures(labels(vec![9999, 2]).view(), &c);
        assert!(e.unknown.is_empty());
        let m = mask_to_f32(e.structure("Lesion").unwrap().view());
        assert_eq!(m.iter().copied().collect::<Vec<_>>(), [1.0, 0.0]);
    }
}
