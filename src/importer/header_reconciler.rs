// ==========================================
// 佣金费率系统 - 表头协调器
// ==========================================
// 职责: 源表头 → 规范字段的列映射
// 规则: 候选名按优先级匹配，精确匹配优先于包含匹配，同优先级取最左列
//       已被占用的列不再分配；按名称未命中的字段使用位置回退
// ==========================================

use crate::config::MarketplaceSource;
use crate::domain::{CanonicalField, HeaderMapping, RawRow};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use std::collections::BTreeMap;
use tracing::debug;

/// 判定一行为表头所需的最少命中字段数
const MIN_HEADER_MATCHES: usize = 2;

pub struct HeaderReconciler {
    /// 各字段的候选名（已标准化）
    candidates: Vec<(CanonicalField, Vec<String>)>,
    positional: BTreeMap<CanonicalField, usize>,
    cleaner: DataCleaner,
}

impl HeaderReconciler {
    pub fn new(source: &MarketplaceSource) -> Self {
        let cleaner = DataCleaner;
        let candidates = CanonicalField::ALL
            .iter()
            .map(|field| {
                let names = source
                    .candidates
                    .for_field(*field)
                    .iter()
                    .map(|c| cleaner.normalize_header(c))
                    .filter(|c| !c.is_empty())
                    .collect();
                (*field, names)
            })
            .collect();

        Self {
            candidates,
            positional: source.positional_fallback.clone(),
            cleaner,
        }
    }

    /// 仅按名称匹配（不含位置回退）
    pub fn match_by_name(&self, header_row: &[String]) -> HeaderMapping {
        let normalized: Vec<String> = header_row
            .iter()
            .map(|cell| self.cleaner.normalize_header(cell))
            .collect();

        let mut mapping = HeaderMapping::new();
        for (field, names) in &self.candidates {
            if let Some(column) = self.find_column(&normalized, names, &mapping) {
                mapping.set(*field, column);
            }
        }
        mapping
    }

    fn find_column(
        &self,
        normalized: &[String],
        names: &[String],
        mapping: &HeaderMapping,
    ) -> Option<usize> {
        let free = |idx: &usize| !mapping.is_column_claimed(*idx) && !normalized[*idx].is_empty();

        for name in names {
            let exact = (0..normalized.len())
                .filter(free)
                .find(|idx| normalized[*idx] == *name);
            if exact.is_some() {
                return exact;
            }
            let contains = (0..normalized.len())
                .filter(free)
                .find(|idx| normalized[*idx].contains(name.as_str()));
            if contains.is_some() {
                return contains;
            }
        }
        None
    }

    /// 协调表头: 名称匹配 + 位置回退 + 必填字段校验
    ///
    /// # 返回
    /// - Err(ColumnNotFound): 必填字段（类目、商品组、费率）无法定位
    pub fn reconcile(&self, header_row: &[String]) -> ImportResult<HeaderMapping> {
        let mut mapping = self.match_by_name(header_row);

        for (field, column) in &self.positional {
            if !mapping.contains(*field) && !mapping.is_column_claimed(*column) {
                debug!(field = %field, column = column, "使用位置回退");
                mapping.set(*field, *column);
            }
        }

        if let Some(missing) = mapping.first_missing_required() {
            return Err(ImportError::ColumnNotFound {
                field: missing.to_string(),
            });
        }
        Ok(mapping)
    }

    /// 在前 scan_rows 行中定位表头行
    ///
    /// # 返回
    /// - Some(idx): 第一行按名称命中至少两个字段的行
    pub fn locate_header(&self, rows: &[RawRow], scan_rows: usize) -> Option<usize> {
        rows.iter()
            .take(scan_rows)
            .position(|row| self.match_by_name(row).len() >= MIN_HEADER_MATCHES)
    }

    /// 位置回退是否足以覆盖全部必填字段
    pub fn has_complete_fallback(&self) -> bool {
        CanonicalField::ALL
            .iter()
            .filter(|f| f.is_required())
            .all(|f| self.positional.contains_key(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_sources, FieldCandidates};

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn generic_source() -> MarketplaceSource {
        MarketplaceSource::new(
            "demo",
            "Demo",
            FieldCandidates {
                category: vec!["Ana Kategori".into(), "Kategori".into()],
                sub_category: vec!["Alt Kategori".into()],
                product_group: vec!["Ürün Grubu".into()],
                commission_rate: vec!["Komisyon".into()],
            },
        )
    }

    #[test]
    fn test_reconcile_arbitrary_order() {
        let reconciler = HeaderReconciler::new(&generic_source());
        let mapping = reconciler
            .reconcile(&row(&["Ürün Grubu", "Kategori", "Alt Kategori", "Komisyon(%)"]))
            .unwrap();

        assert_eq!(mapping.get(CanonicalField::Category), Some(1));
        assert_eq!(mapping.get(CanonicalField::SubCategory), Some(2));
        assert_eq!(mapping.get(CanonicalField::ProductGroup), Some(0));
        assert_eq!(mapping.get(CanonicalField::CommissionRate), Some(3));
    }

    #[test]
    fn test_missing_rate_column() {
        let reconciler = HeaderReconciler::new(&generic_source());
        let err = reconciler
            .reconcile(&row(&["Ürün Grubu", "Kategori", "Alt Kategori", "Oran"]))
            .unwrap_err();
        match err {
            ImportError::ColumnNotFound { field } => assert_eq!(field, "commission_rate"),
            other => panic!("期望 ColumnNotFound，实际 {:?}", other),
        }
    }

    #[test]
    fn test_exact_beats_contains_and_no_reuse() {
        let reconciler = HeaderReconciler::new(&generic_source());
        // "Alt Kategori" 包含 "kategori"，但类目应取精确命中的第 1 列
        let mapping = reconciler
            .reconcile(&row(&["Alt Kategori", "Kategori", "Ürün Grubu", "Komisyon"]))
            .unwrap();
        assert_eq!(mapping.get(CanonicalField::Category), Some(1));
        assert_eq!(mapping.get(CanonicalField::SubCategory), Some(0));
    }

    #[test]
    fn test_main_category_preferred_over_sub_category() {
        let trendyol = builtin_sources().into_iter().find(|s| s.id == "trendyol").unwrap();
        let mapping = HeaderReconciler::new(&trendyol)
            .reconcile(&row(&["Sub Category", "Main Category", "Product Group", "Komisyon"]))
            .unwrap();
        assert_eq!(mapping.get(CanonicalField::Category), Some(1));
        assert_eq!(mapping.get(CanonicalField::SubCategory), Some(0));

        // 所有内置平台: 子类目列在前时类目仍取 "Ana Kategori"
        for source in builtin_sources() {
            let mapping = HeaderReconciler::new(&source)
                .reconcile(&row(&["Alt Kategori", "Ana Kategori", "Ürün Grubu", "Komisyon"]))
                .unwrap();
            assert_eq!(mapping.get(CanonicalField::Category), Some(1), "{}", source.id);
        }
    }

    #[test]
    fn test_sub_category_optional() {
        let reconciler = HeaderReconciler::new(&generic_source());
        let mapping = reconciler
            .reconcile(&row(&["Kategori", "Ürün Grubu", "Komisyon Oranı"]))
            .unwrap();
        assert_eq!(mapping.get(CanonicalField::SubCategory), None);
        assert_eq!(mapping.get(CanonicalField::CommissionRate), Some(2));
    }

    #[test]
    fn test_positional_fallback() {
        let mut source = generic_source();
        source.positional_fallback = [
            (CanonicalField::Category, 0),
            (CanonicalField::ProductGroup, 1),
            (CanonicalField::CommissionRate, 2),
        ]
        .into_iter()
        .collect();
        let reconciler = HeaderReconciler::new(&source);
        assert!(reconciler.has_complete_fallback());

        let mapping = reconciler.reconcile(&row(&["A", "B", "C"])).unwrap();
        assert_eq!(mapping.get(CanonicalField::CommissionRate), Some(2));
    }

    #[test]
    fn test_locate_header_skips_title_rows() {
        let reconciler = HeaderReconciler::new(&generic_source());
        let rows = vec![
            row(&["2024 Komisyon Tarifesi"]),
            row(&["Kolon No", "1", "2"]),
            row(&["Kategori", "Ürün Grubu", "Komisyon"]),
            row(&["Elektronik", "Telefon", "8"]),
        ];
        assert_eq!(reconciler.locate_header(&rows, 20), Some(2));
        assert_eq!(reconciler.locate_header(&rows, 2), None);
    }

    #[test]
    fn test_builtin_trendyol_layout() {
        let trendyol = builtin_sources().remove(0);
        let reconciler = HeaderReconciler::new(&trendyol);
        let mapping = reconciler
            .reconcile(&row(&["Ana Kategori", "Kategori", "Ürün Grubu", "Komisyon_%_KDV_Dahil"]))
            .unwrap();
        assert_eq!(mapping.get(CanonicalField::Category), Some(0));
        assert_eq!(mapping.get(CanonicalField::SubCategory), Some(1));
        assert_eq!(mapping.get(CanonicalField::ProductGroup), Some(2));
        assert_eq!(mapping.get(CanonicalField::CommissionRate), Some(3));
    }
}
