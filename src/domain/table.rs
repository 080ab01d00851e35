// ==========================================
// 佣金费率系统 - 原始表格模型
// ==========================================
// 职责: 提取阶段的中间产物（字符串网格）与表头映射
// 红线: 不含解析逻辑，不做任何类型推断
// ==========================================

use crate::domain::types::CanonicalField;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 一行原始单元格（未清洗的文本）
pub type RawRow = Vec<String>;

// ==========================================
// TableSegment - 单页/单工作表的表格片段
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableSegment {
    /// 来源标签，如 "page 3" 或 "sheet Komisyon_Oranlari"
    pub label: String,
    pub rows: Vec<RawRow>,
}

impl TableSegment {
    pub fn new(label: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            label: label.into(),
            rows,
        }
    }

    /// 是否不含任何非空单元格
    pub fn is_empty(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.iter().all(|cell| cell.trim().is_empty()))
    }

    /// 最宽一行的列数
    pub fn width(&self) -> usize {
        self.rows.iter().map(|row| row.len()).max().unwrap_or(0)
    }
}

// ==========================================
// RawTable - 一个源文档的全部片段
// ==========================================
// 由提取器产出，规范化阶段只消费一次
#[derive(Debug, Clone, Serialize)]
pub struct RawTable {
    pub source: PathBuf,
    pub engine_used: String,
    pub segments: Vec<TableSegment>,
}

impl RawTable {
    pub fn new(source: PathBuf, engine_used: impl Into<String>, segments: Vec<TableSegment>) -> Self {
        Self {
            source,
            engine_used: engine_used.into(),
            segments,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.segments.iter().map(|s| s.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.is_empty())
    }
}

// ==========================================
// HeaderMapping - 规范字段 → 列序号
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderMapping {
    columns: BTreeMap<CanonicalField, usize>,
}

impl HeaderMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn set(&mut self, field: CanonicalField, column: usize) {
        self.columns.insert(field, column);
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }

    /// 已占用的列（同一列不能映射两个字段）
    pub fn is_column_claimed(&self, column: usize) -> bool {
        self.columns.values().any(|c| *c == column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// 第一个缺失的必填字段
    pub fn first_missing_required(&self) -> Option<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|f| f.is_required() && !self.contains(*f))
    }
}
