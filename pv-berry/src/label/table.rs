//! 标签查找表. 作为不可变配置注入 [`super::LabelClassifier`].

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use itertools::Itertools;
use thiserror::Error;

use crate::consts::aseg::{self, *};
use crate::consts::structure;
use crate::label::Tissue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 精确查找表中的一项: 通用组织或具名结构.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TableEntry {
    /// 通用组织.
    Tissue(Tissue),

    /// 具名结构, 以结构名表示. 多个标签可以对应同一个结构.
    Structure(String),
}

/// 范围回退规则. 标签落在半开区间 `[start, end)` 内时被归为 `tissue`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TissueRange {
    /// 区间下界 (含).
    pub start: i32,

    /// 区间上界 (不含).
    pub end: i32,

    /// 对应的通用组织.
    pub tissue: Tissue,
}

impl TissueRange {
    /// 构造范围规则.
    #[inline]
    pub const fn new(start: i32, end: i32, tissue: Tissue) -> Self {
        Self { start, end, tissue }
    }

    /// 区间视图.
    #[inline]
    pub fn range(&self) -> Range<i32> {
        self.start..self.end
    }

    /// `code` 是否落在区间内.
    #[inline]
    pub fn contains(&self, code: i32) -> bool {
        self.range().contains(&code)
    }
}

/// 查找表校验错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// 同一标签既在精确表中又在忽略集中.
    #[error("label {0} is both mapped and ignored")]
    MappedAndIgnored(i32),

    /// 空区间.
    #[error("range [{start}, {end}) is empty")]
    EmptyRange {
        /// 下界.
        start: i32,
        /// 上界.
        end: i32,
    },

    /// 两个范围规则相交.
    #[error("ranges [{0}, {1}) and [{2}, {3}) overlap")]
    OverlappingRanges(i32, i32, i32, i32),

    /// 类白质结构列表中出现重复名称.
    #[error("WM-like structure `{0}` listed more than once")]
    DuplicateWmLike(String),
}

/// 从分割标签到组织/结构的完整查找配置.
///
/// 分类时依次查询精确表、范围规则, 最后查询忽略集. 所有成员都以有序容器保存,
/// 使得序列化结果和迭代顺序稳定.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LabelTable {
    /// 精确匹配表.
    pub exact: BTreeMap<i32, TableEntry>,

    /// 精确表未命中时的范围回退规则.
    pub ranges: Vec<TissueRange>,

    /// 静默忽略的标签 (保持 CSF 基线, 不报告).
    pub ignore: BTreeSet<i32>,

    /// 类白质结构名, 顺序即合成时的叠加顺序. 不在此列表中的具名结构均视为类灰质.
    pub wm_like: Vec<String>,
}

impl LabelTable {
    /// FreeSurfer `aparc+aseg` 的默认查找表.
    pub fn freesurfer() -> Self {
        use TableEntry::Structure as S;
        use TableEntry::Tissue as T;

        let exact = [
            // 左半球
            (LEFT_CEREBRAL_WM, T(Tissue::Wm)),
            (LEFT_CEREBRAL_CORTEX, T(Tissue::Gm)),
            (LEFT_LATERAL_VENTRICLE, T(Tissue::Csf)),
            (LEFT_INF_LAT_VENT, T(Tissue::Csf)),
            (aseg::LEFT_ACCUMBENS, S(structure::LEFT_ACCUMBENS.into())),
            (aseg::LEFT_AMYGDALA, S(structure::LEFT_AMYGDALA.into())),
            (aseg::LEFT_CAUDATE, S(structure::LEFT_CAUDATE.into())),
            (aseg::LEFT_HIPPOCAMPUS, S(structure::LEFT_HIPPOCAMPUS.into())),
            (aseg::LEFT_PALLIDUM, S(structure::LEFT_PALLIDUM.into())),
            (aseg::LEFT_PUTAMEN, S(structure::LEFT_PUTAMEN.into())),
            (aseg::LEFT_THALAMUS, S(structure::LEFT_THALAMUS.into())),
            (LEFT_THALAMUS_PROPER, S(structure::LEFT_THALAMUS.into())),
            (aseg::CSF, T(Tissue::Csf)),
            (0, T(Tissue::Csf)),
            (THIRD_VENTRICLE, T(Tissue::Csf)),
            (FOURTH_VENTRICLE, T(Tissue::Csf)),
            (WM_HYPOINTENSITIES, T(Tissue::Wm)),
            (LEFT_WM_HYPOINTENSITIES, T(Tissue::Wm)),
            (RIGHT_WM_HYPOINTENSITIES, T(Tissue::Wm)),
            // 右半球
            (RIGHT_CEREBRAL_WM, T(Tissue::Wm)),
            (RIGHT_CEREBRAL_CORTEX, T(Tissue::Gm)),
            (RIGHT_LATERAL_VENTRICLE, T(Tissue::Csf)),
            (RIGHT_INF_LAT_VENT, T(Tissue::Csf)),
            (aseg::RIGHT_ACCUMBENS, S(structure::RIGHT_ACCUMBENS.into())),
            (aseg::RIGHT_AMYGDALA, S(structure::RIGHT_AMYGDALA.into())),
            (aseg::RIGHT_CAUDATE, S(structure::RIGHT_CAUDATE.into())),
            (aseg::RIGHT_HIPPOCAMPUS, S(structure::RIGHT_HIPPOCAMPUS.into())),
            (aseg::RIGHT_PALLIDUM, S(structure::RIGHT_PALLIDUM.into())),
            (aseg::RIGHT_PUTAMEN, S(structure::RIGHT_PUTAMEN.into())),
            (aseg::RIGHT_THALAMUS, S(structure::RIGHT_THALAMUS.into())),
            (RIGHT_THALAMUS_PROPER, S(structure::RIGHT_THALAMUS.into())),
            // 小脑
            (LEFT_CEREBELLUM_WM, S(structure::LEFT_CEREBELLUM_WM.into())),
            (LEFT_CEREBELLUM_CORTEX, S(structure::LEFT_CEREBELLUM_GM.into())),
            (RIGHT_CEREBELLUM_WM, S(structure::RIGHT_CEREBELLUM_WM.into())),
            (RIGHT_CEREBELLUM_CORTEX, S(structure::RIGHT_CEREBELLUM_GM.into())),
            // 脑干
            (aseg::BRAIN_STEM, S(structure::BRAIN_STEM.into())),
        ]
        .into_iter()
        .collect();

        let ranges = vec![
            // 胼胝体
            TissueRange::new(251, 256, Tissue::Wm),
            // 皮层分区
            TissueRange::new(1000, 3000, Tissue::Gm),
            // 皮层分区下的白质
            TissueRange::new(3000, 5000, Tissue::Wm),
        ];

        let ignore = [LEFT_CEREBELLUM_EXTERIOR, RIGHT_CEREBELLUM_EXTERIOR]
            .into_iter()
            .collect();

        let wm_like = [
            structure::BRAIN_STEM,
            structure::LEFT_CEREBELLUM_WM,
            structure::RIGHT_CEREBELLUM_WM,
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            exact,
            ranges,
            ignore,
            wm_like,
        }
    }

    /// 检查配置的自洽性.
    pub fn validate(&self) -> Result<(), TableError> {
        if let Some(code) = self.exact.keys().find(|c| self.ignore.contains(*c)) {
            return Err(TableError::MappedAndIgnored(*code));
        }
        if let Some(r) = self.ranges.iter().find(|r| r.start >= r.end) {
            return Err(TableError::EmptyRange {
                start: r.start,
                end: r.end,
            });
        }
        let sorted = self.ranges.iter().sorted_by_key(|r| r.start);
        for (a, b) in sorted.tuple_windows() {
            if a.end > b.start {
                return Err(TableError::OverlappingRanges(a.start, a.end, b.start, b.end));
            }
        }
        if let Some(name) = self.wm_like.iter().duplicates().next() {
            return Err(TableError::DuplicateWmLike(name.clone()));
        }
        Ok(())
    }

    /// 结构 `name` 是否是类白质结构.
    #[inline]
    pub fn is_wm_like(&self, name: &str) -> bool {
        self.wm_like.iter().any(|n| n == name)
    }

    /// 精确表中出现的所有结构名, 按字典序.
    pub fn structure_names(&self) -> BTreeSet<&str> {
        self.exact
            .values()
            .filter_map(|e| match e {
                TableEntry::Structure(name) => Some(name.as_str()),
                TableEntry::Tissue(_) => None,
            })
            .collect()
    }
}

impl Default for LabelTable {
    #[inline]
    fn default() -> Self {
        Self::freesurfer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freesurfer_table_is_valid() {
        let table = LabelTable::freesurfer();
        assert_eq!(table.validate(), Ok(()));
        assert_eq!(table.structure_names().len(), 19);
        assert!(table.is_wm_like("BrStem"));
        assert!(!table.is_wm_like("L_CerGM"));
    }

    #[test]
    fn test_validate_rejects_inconsistent_tables() {
        let mut t = LabelTable::freesurfer();
        t.ignore.insert(2);
        assert_eq!(t.validate(), Err(TableError::MappedAndIgnored(2)));

        let mut t = LabelTable::freesurfer();
        t.ranges.push(TissueRange::new(2500, 3100, Tissue::Gm));
        assert!(matches!(
            t.validate(),
            Err(TableError::OverlappingRanges(..))
        ));

        let mut t = LabelTable::freesurfer();
        t.ranges.push(TissueRange::new(7000, 7000, Tissue::Wm));
        assert_eq!(
            t.validate(),
            Err(TableError::EmptyRange {
                start: 7000,
                end: 7000
            })
        );

        let mut t = LabelTable::freesurfer();
        t.wm_like.push("BrStem".into());
        assert_eq!(
            t.validate(),
            Err(TableError::DuplicateWmLike("BrStem".into()))
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_table_json_round_trip() {
        let table = LabelTable::freesurfer();
        let text = serde_json::to_string(&table).unwrap();
        let back: LabelTable = serde_json::from_str(&text).unwrap();
        assert_eq!(table, back);
    }
}
