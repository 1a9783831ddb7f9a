//! 目录项排序：名称、大小、时间三种键，目录优先，降序为整体反转。

use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::FsError;
use crate::listing::DirectoryEntry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Time,
}

impl SortKey {
    /// 当前键的升序比较器。
    pub fn compare(self, a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
        match self {
            SortKey::Name => compare_by_name(a, b),
            SortKey::Size => compare_by_size(a, b),
            SortKey::Time => compare_by_time(a, b),
        }
    }
}

impl FromStr for SortKey {
    type Err = FsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Name" => Ok(SortKey::Name),
            "Size" => Ok(SortKey::Size),
            "Time" => Ok(SortKey::Time),
            other => Err(FsError::InvalidSortKey(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            ascending: true,
        }
    }
}

/// 稳定排序；降序时反转整个升序结果（包括目录优先的约定）。
pub fn sort_entries(entries: &mut [DirectoryEntry], spec: SortSpec) {
    entries.sort_by(|a, b| spec.key.compare(a, b));
    if !spec.ascending {
        entries.reverse();
    }
}

/// 目录排在文件之前；同类时返回 `None` 交给具体的键比较。
fn directories_first(a: &DirectoryEntry, b: &DirectoryEntry) -> Option<Ordering> {
    match (a.is_dir, b.is_dir) {
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        _ => None,
    }
}

fn compare_names(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

pub fn compare_by_name(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    directories_first(a, b).unwrap_or_else(|| compare_names(a, b))
}

/// 目录之间按名称，文件之间按字节数。
pub fn compare_by_size(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    directories_first(a, b).unwrap_or_else(|| {
        if a.is_dir {
            compare_names(a, b)
        } else {
            a.size.cmp(&b.size)
        }
    })
}

/// 同类之间最近修改的在前。
pub fn compare_by_time(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    directories_first(a, b).unwrap_or_else(|| b.mod_time.cmp(&a.mod_time))
}
