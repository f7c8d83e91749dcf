//! 分割标签分类器.
//!
//! 将 FreeSurfer `aparc+aseg` 的整数标签映射为通用组织 (GM/WM/CSF)、
//! 具名解剖结构, 或未分类. 查找顺序为: 精确表 -> 范围回退 -> 忽略集.
//! 分类结果只依赖标签值本身, 与体素遍历顺序无关.

mod table;

pub use table::{LabelTable, TableEntry, TableError, TissueRange};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 通用组织类型.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Tissue {
    /// 灰质.
    Gm,

    /// 白质.
    Wm,

    /// 脑脊液.
    Csf,
}

impl Tissue {
    /// 按输出通道顺序 (GM, WM, CSF) 排列的全部组织.
    pub const ALL: [Tissue; 3] = [Tissue::Gm, Tissue::Wm, Tissue::Csf];

    /// 在 PV 输出中的通道索引.
    #[inline]
    pub const fn channel(&self) -> usize {
        match self {
            Tissue::Gm => 0,
            Tissue::Wm => 1,
            Tissue::Csf => 2,
        }
    }

    /// 输出文件名后缀使用的简称.
    #[inline]
    pub const fn abbr(&self) -> &'static str {
        match self {
            Tissue::Gm => "GM",
            Tissue::Wm => "WM",
            Tissue::Csf => "CSF",
        }
    }
}

/// 具名结构在合成时的角色.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// 类白质 (脑干, 小脑白质).
    WmLike,

    /// 类灰质 (皮层下核团等其余所有具名结构).
    GmLike,
}

/// 单个标签的分类结果.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Classification<'a> {
    /// 通用组织.
    Tissue(Tissue),

    /// 具名结构.
    Structure {
        /// 结构名.
        name: &'a str,
        /// 合成角色.
        role: Role,
    },

    /// 位于忽略集中, 静默地不做分类.
    Ignored,

    /// 不在任何表中, 需要向调用方报告.
    Unknown,
}

/// 标签分类器. 持有一份不可变的 [`LabelTable`].
#[derive(Clone, Debug)]
pub struct LabelClassifier {
    table: LabelTable,
}

impl LabelClassifier {
    /// 以给定查找表创建分类器. 查找表不自洽时返回 `Err`.
    pub fn new(table: LabelTable) -> Result<Self, TableError> {
        table.validate()?;
        Ok(Self { table })
    }

    /// 使用 FreeSurfer 默认查找表.
    #[inline]
    pub fn freesurfer() -> Self {
        Self {
            table: LabelTable::freesurfer(),
        }
    }

    /// 底层查找表.
    #[inline]
    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    /// 对单个标签分类.
    pub fn classify(&self, code: i32) -> Classification<'_> {
        if let Some(entry) = self.table.exact.get(&code) {
            return match entry {
                TableEntry::Tissue(t) => Classification::Tissue(*t),
                TableEntry::Structure(name) => Classification::Structure {
                    name: name.as_str(),
                    role: self.role_of(name),
                },
            };
        }
        if let Some(r) = self.table.ranges.iter().find(|r| r.contains(code)) {
            return Classification::Tissue(r.tissue);
        }
        if self.table.ignore.contains(&code) {
            Classification::Ignored
        } else {
            Classification::Unknown
        }
    }

    /// 结构 `name` 的合成角色.
    #[inline]
    pub fn role_of(&self, name: &str) -> Role {
        if self.table.is_wm_like(name) {
            Role::WmLike
        } else {
            Role::GmLike
        }
    }
}

impl Default for LabelClassifier {
    #[inline]
    fn default() -> Self {
        Self::freesurfer()
    }
}
