// ==========================================
// 佣金费率系统 - 行规范化器
// ==========================================
// 职责: 原始行 → CanonicalRecord（惰性迭代，只消费一次）
// 流程: 跳过重复表头 → 类目/子类目向下填充 → 商品组拆分 → 费率解析
// 红线: 无法解析商品组或费率的行被丢弃并计数，不中断处理
// ==========================================

use crate::domain::{CanonicalField, CanonicalRecord, HeaderMapping, RawRow};
use crate::importer::data_cleaner::DataCleaner;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

// ==========================================
// NormalizeStats - 规范化统计
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    /// 读取的行数（不含完全空白行）
    pub rows_seen: usize,
    /// 产出的记录数
    pub emitted: usize,
    /// 因缺少类目/商品组/费率被丢弃的行数
    pub rejected: usize,
    /// 跳过的重复表头行数
    pub repeated_headers: usize,
}

impl NormalizeStats {
    pub fn merge(&mut self, other: &NormalizeStats) {
        self.rows_seen += other.rows_seen;
        self.emitted += other.emitted;
        self.rejected += other.rejected;
        self.repeated_headers += other.repeated_headers;
    }
}

// ==========================================
// FillState - 向下填充状态
// ==========================================
// 合并单元格在提取后只在首行有值，后续行继承上一个非空值
#[derive(Debug, Clone, Default)]
pub struct FillState {
    category: Option<String>,
    sub_category: Option<String>,
}

impl FillState {
    /// 吸收一行的类目与子类目，返回填充后的值
    ///
    /// # 规则
    /// - 类目变化时清空子类目的填充值
    /// - 子类目列缺失或一直为空时与类目相同
    fn absorb(&mut self, category: Option<String>, sub_category: Option<String>) -> Option<(String, String)> {
        if let Some(category) = category {
            if self.category.as_deref() != Some(category.as_str()) {
                self.sub_category = None;
            }
            self.category = Some(category);
        }
        if let Some(sub) = sub_category {
            self.sub_category = Some(sub);
        }

        let category = self.category.clone()?;
        let sub = self.sub_category.clone().unwrap_or_else(|| category.clone());
        Some((category, sub))
    }
}

// ==========================================
// RowNormalizer - 惰性行规范化迭代器
// ==========================================
pub struct RowNormalizer<I> {
    rows: I,
    mapping: HeaderMapping,
    /// 表头在商品组列与费率列上的标准化文本（识别分页重复的表头）
    header_marker: Option<(String, String)>,
    split_product_groups: bool,
    fill: FillState,
    pending: VecDeque<CanonicalRecord>,
    stats: NormalizeStats,
    cleaner: DataCleaner,
}

impl<I> RowNormalizer<I>
where
    I: Iterator<Item = RawRow>,
{
    /// 创建规范化器
    ///
    /// # 参数
    /// - rows: 表头之后的数据行
    /// - mapping: 表头映射
    /// - header_row: 原表头（用于跳过重复表头），无表头时为 None
    /// - split_product_groups: 是否拆分商品组
    pub fn new(
        rows: I,
        mapping: HeaderMapping,
        header_row: Option<&[String]>,
        split_product_groups: bool,
    ) -> Self {
        let cleaner = DataCleaner;
        let header_marker = header_row.and_then(|header| {
            let pg = cell(header, mapping.get(CanonicalField::ProductGroup));
            let rate = cell(header, mapping.get(CanonicalField::CommissionRate));
            let pg = cleaner.normalize_header(pg);
            let rate = cleaner.normalize_header(rate);
            (!pg.is_empty() && !rate.is_empty()).then_some((pg, rate))
        });

        Self {
            rows,
            mapping,
            header_marker,
            split_product_groups,
            fill: FillState::default(),
            pending: VecDeque::new(),
            stats: NormalizeStats::default(),
            cleaner,
        }
    }

    /// 承接上一段表格的填充状态（跨页续表）
    pub fn with_fill_state(mut self, fill: FillState) -> Self {
        self.fill = fill;
        self
    }

    pub fn stats(&self) -> NormalizeStats {
        self.stats
    }

    pub fn fill_state(&self) -> FillState {
        self.fill.clone()
    }

    fn is_repeated_header(&self, row: &[String]) -> bool {
        let Some((pg_marker, rate_marker)) = &self.header_marker else {
            return false;
        };
        let pg = self
            .cleaner
            .normalize_header(cell(row, self.mapping.get(CanonicalField::ProductGroup)));
        let rate = self
            .cleaner
            .normalize_header(cell(row, self.mapping.get(CanonicalField::CommissionRate)));
        pg == *pg_marker && rate == *rate_marker
    }

    /// 处理一行，产出的记录放入 pending
    fn process(&mut self, row: RawRow) {
        if row.iter().all(|c| c.trim().is_empty()) {
            return;
        }
        self.stats.rows_seen += 1;

        if self.is_repeated_header(&row) {
            self.stats.repeated_headers += 1;
            return;
        }

        let category = self
            .cleaner
            .normalize_null(cell(&row, self.mapping.get(CanonicalField::Category)));
        let sub_category = self
            .mapping
            .get(CanonicalField::SubCategory)
            .and_then(|idx| self.cleaner.normalize_null(cell(&row, Some(idx))));
        let filled = self.fill.absorb(category, sub_category);

        let product_group = self
            .cleaner
            .normalize_null(cell(&row, self.mapping.get(CanonicalField::ProductGroup)));
        let rate = self
            .cleaner
            .parse_rate(cell(&row, self.mapping.get(CanonicalField::CommissionRate)));

        let (Some((category, sub_category)), Some(product_group), Some(rate)) =
            (filled, product_group, rate)
        else {
            trace!(row = ?row, "行缺少类目/商品组/费率，丢弃");
            self.stats.rejected += 1;
            return;
        };

        let groups = if self.split_product_groups {
            self.cleaner.split_product_groups(&product_group)
        } else {
            vec![product_group]
        };

        for group in groups {
            self.pending.push_back(CanonicalRecord::new(
                category.clone(),
                sub_category.clone(),
                group,
                rate,
            ));
        }
    }
}

impl<I> Iterator for RowNormalizer<I>
where
    I: Iterator<Item = RawRow>,
{
    type Item = CanonicalRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                self.stats.emitted += 1;
                return Some(record);
            }
            let row = self.rows.next()?;
            self.process(row);
        }
    }
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
}

/// 去除完全相同的记录（保留首次出现的顺序）
///
/// # 返回
/// - 被移除的记录数
pub fn dedup_exact(records: &mut Vec<CanonicalRecord>) -> usize {
    let before = records.len();
    let mut seen = std::collections::HashSet::new();
    records.retain(|r| seen.insert(r.dedup_key()));
    before - records.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn mapping4() -> HeaderMapping {
        let mut mapping = HeaderMapping::new();
        mapping.set(CanonicalField::Category, 0);
        mapping.set(CanonicalField::SubCategory, 1);
        mapping.set(CanonicalField::ProductGroup, 2);
        mapping.set(CanonicalField::CommissionRate, 3);
        mapping
    }

    #[test]
    fn test_forward_fill_merged_category() {
        let rows = vec![
            row(&["Elektronik", "Telefon", "Cep Telefonu", "8"]),
            row(&["", "", "Kılıf", "12,5"]),
            row(&["", "Bilgisayar", "Laptop", "6"]),
        ];
        let records: Vec<_> = RowNormalizer::new(rows.into_iter(), mapping4(), None, false).collect();

        assert_eq!(records.len(), 3);
        assert_eq!(records[1].category, "Elektronik");
        assert_eq!(records[1].sub_category, "Telefon");
        assert_eq!(records[1].commission_rate, 12.5);
        assert_eq!(records[2].sub_category, "Bilgisayar");
    }

    #[test]
    fn test_category_change_resets_sub_fill() {
        let rows = vec![
            row(&["Elektronik", "Telefon", "Cep Telefonu", "8"]),
            row(&["Kozmetik", "", "Parfüm", "15"]),
        ];
        let records: Vec<_> = RowNormalizer::new(rows.into_iter(), mapping4(), None, false).collect();
        assert_eq!(records[1].category, "Kozmetik");
        assert_eq!(records[1].sub_category, "Kozmetik");
    }

    #[test]
    fn test_flat_table_mirrors_category() {
        let mut mapping = HeaderMapping::new();
        mapping.set(CanonicalField::Category, 0);
        mapping.set(CanonicalField::ProductGroup, 1);
        mapping.set(CanonicalField::CommissionRate, 2);

        let rows = vec![row(&["Kitap", "Roman", "%10"])];
        let records: Vec<_> = RowNormalizer::new(rows.into_iter(), mapping, None, false).collect();
        assert_eq!(records[0].sub_category, "Kitap");
        assert_eq!(records[0].commission_rate, 10.0);
    }

    #[test]
    fn test_rejects_and_counts_bad_rows() {
        let rows = vec![
            row(&["", "", "Yetim", "5"]),          // 无类目可填充
            row(&["Ev", "Mutfak", "Tava", "nan"]), // 费率无效
            row(&["Ev", "Mutfak", "", "7"]),       // 无商品组
            row(&["", "", "", ""]),                // 空行不计数
            row(&["Ev", "Mutfak", "Tencere", "7"]),
        ];
        let mut normalizer = RowNormalizer::new(rows.into_iter(), mapping4(), None, false);
        let records: Vec<_> = normalizer.by_ref().collect();

        assert_eq!(records.len(), 1);
        let stats = normalizer.stats();
        assert_eq!(stats.rejected, 3);
        assert_eq!(stats.rows_seen, 4);
        assert_eq!(stats.emitted, 1);
    }

    #[test]
    fn test_skips_repeated_header() {
        let header = row(&["Kategori", "Alt Kategori", "Ürün Grubu", "Komisyon"]);
        let rows = vec![
            row(&["Ev", "Mutfak", "Tava", "7"]),
            row(&["Kategori", "Alt Kategori", "Ürün Grubu", "Komisyon"]),
            row(&["Ev", "Mutfak", "Tencere", "7"]),
        ];
        let mut normalizer =
            RowNormalizer::new(rows.into_iter(), mapping4(), Some(&header), false);
        let records: Vec<_> = normalizer.by_ref().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(normalizer.stats().repeated_headers, 1);
        assert_eq!(normalizer.stats().rejected, 0);
    }

    #[test]
    fn test_split_product_groups() {
        let rows = vec![row(&["Takı", "Takı", "Kolye, Küpe (Altın, Gümüş)", "20"])];
        let records: Vec<_> = RowNormalizer::new(rows.into_iter(), mapping4(), None, true).collect();
        let groups: Vec<_> = records.iter().map(|r| r.product_group.as_str()).collect();
        assert_eq!(groups, vec!["Kolye", "Küpe (Altın, Gümüş)"]);
    }

    #[test]
    fn test_fill_state_carries_across_segments() {
        let first = vec![row(&["Ev", "Mutfak", "Tava", "7"])];
        let mut normalizer = RowNormalizer::new(first.into_iter(), mapping4(), None, false);
        let _: Vec<_> = normalizer.by_ref().collect();
        let fill = normalizer.fill_state();

        let second = vec![row(&["", "", "Tencere", "8"])];
        let records: Vec<_> = RowNormalizer::new(second.into_iter(), mapping4(), None, false)
            .with_fill_state(fill)
            .collect();
        assert_eq!(records[0].category, "Ev");
        assert_eq!(records[0].sub_category, "Mutfak");
    }

    #[test]
    fn test_dedup_exact() {
        let mut records = vec![
            CanonicalRecord::new("A", "A", "x", 1.0),
            CanonicalRecord::new("A", "A", "x", 1.0),
            CanonicalRecord::new("A", "A", "x", 2.0),
        ];
        assert_eq!(dedup_exact(&mut records), 1);
        assert_eq!(records.len(), 2);
    }
}
