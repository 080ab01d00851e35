// ==========================================
// 佣金费率系统 - 佣金表导入管线
// ==========================================
// 职责: 整合更新流程，从源文档到规范 CSV
// 流程: 提取 → 表头定位 → 规范化 → 比例修正 → 去重 → 发布
// ==========================================

use crate::config::{AppConfig, MarketplaceSource, SiteRegistry};
use crate::domain::{CanonicalRecord, EnginePreference, HeaderMapping, RawRow, RawTable};
use crate::importer::data_cleaner::fix_fraction_scale;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::{SourceDocument, TableExtractor};
use crate::importer::header_reconciler::HeaderReconciler;
use crate::importer::publisher::{PublishBatch, PublishOptions, Publisher};
use crate::importer::row_normalizer::{dedup_exact, FillState, NormalizeStats, RowNormalizer};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// UpdateRequest - 一次更新请求
// ==========================================
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub site: String,
    pub document: SourceDocument,
    pub preference: EnginePreference,
    pub page_range: Option<String>,
    /// 覆盖平台默认的输出路径
    pub out_csv: Option<PathBuf>,
    pub backup: bool,
    pub keep_temp: bool,
    /// 只提取与规范化，不发布
    pub dry_run: bool,
}

impl UpdateRequest {
    pub fn new(site: impl Into<String>, document: SourceDocument) -> Self {
        Self {
            site: site.into(),
            document,
            preference: EnginePreference::Auto,
            page_range: None,
            out_csv: None,
            backup: false,
            keep_temp: false,
            dry_run: false,
        }
    }
}

/// 单个片段的失败原因
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFailure {
    pub label: String,
    pub reason: String,
}

// ==========================================
// UpdateSummary - 更新结果摘要
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSummary {
    pub site: String,
    pub engine_used: String,
    pub csv_path: PathBuf,
    pub rows_written: usize,
    pub rejected_count: usize,
    pub repeated_headers: usize,
    pub duplicates_removed: usize,
    pub fraction_scaled: bool,
    pub segments_failed: Vec<SegmentFailure>,
    pub backup_path: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub elapsed_ms: u128,
}

/// 规范化阶段的产出
#[derive(Debug, Clone, Default)]
pub struct NormalizedTable {
    pub records: Vec<CanonicalRecord>,
    pub stats: NormalizeStats,
    pub duplicates_removed: usize,
    pub fraction_scaled: bool,
    pub segments_failed: Vec<SegmentFailure>,
}

// ==========================================
// CommissionImporter - 佣金表导入器
// ==========================================
pub struct CommissionImporter<R>
where
    R: SiteRegistry,
{
    // 平台注册表
    registry: R,

    // 导入组件
    extractor: TableExtractor,
    publisher: Publisher,

    // 表头探测的扫描行数
    header_scan_rows: usize,
}

impl CommissionImporter<AppConfig> {
    /// 以应用配置构造（默认引擎集合）
    pub fn from_config(config: AppConfig) -> Self {
        let publisher = Publisher::new(config.backup_dir(), config.tmp_dir());
        let scan_rows = config.header_scan_rows;
        Self::new(config, TableExtractor::new(), publisher, scan_rows)
    }
}

impl<R> CommissionImporter<R>
where
    R: SiteRegistry,
{
    /// 创建导入器
    ///
    /// # 参数
    /// - registry: 平台注册表
    /// - extractor: 表格提取器
    /// - publisher: 发布器
    /// - header_scan_rows: 表头探测扫描行数
    pub fn new(
        registry: R,
        extractor: TableExtractor,
        publisher: Publisher,
        header_scan_rows: usize,
    ) -> Self {
        Self {
            registry,
            extractor,
            publisher,
            header_scan_rows,
        }
    }

    /// 执行一次更新
    ///
    /// # 返回
    /// - UpdateSummary: 发布结果（dry_run 时不写目标文件）
    #[instrument(skip(self, request), fields(site = %request.site))]
    pub fn run(&self, request: &UpdateRequest) -> ImportResult<UpdateSummary> {
        let start = Instant::now();
        let source = self
            .registry
            .source(&request.site)
            .ok_or_else(|| ImportError::UnknownSite(request.site.clone()))?;

        let target = match &request.out_csv {
            Some(path) => path.clone(),
            None => self
                .registry
                .csv_path(&source.id)
                .ok_or_else(|| ImportError::UnknownSite(request.site.clone()))?,
        };

        // 电子表格未指定工作表时使用平台要求的工作表
        let document = match &request.document {
            SourceDocument::Spreadsheet { path, sheet: None } => SourceDocument::Spreadsheet {
                path: path.clone(),
                sheet: source.required_sheet.clone(),
            },
            other => other.clone(),
        };

        info!(
            document = %document.path().display(),
            preference = %request.preference,
            target = %target.display(),
            "开始更新佣金表"
        );

        // === 步骤 1: 提取 ===
        let raw = self
            .extractor
            .extract(&document, request.preference, request.page_range.as_deref())?;
        debug!(engine = %raw.engine_used, rows = raw.total_rows(), "提取完成");

        // === 步骤 2: 规范化 ===
        let normalized = self.normalize(&raw, source)?;
        info!(
            records = normalized.records.len(),
            rejected = normalized.stats.rejected,
            duplicates = normalized.duplicates_removed,
            "规范化完成"
        );

        let publish_batch = PublishBatch {
            site: &source.id,
            records: &normalized.records,
            rejected_count: normalized.stats.rejected,
            raw_table: Some(&raw),
            meta: serde_json::json!({
                "duplicates_removed": normalized.duplicates_removed,
                "fraction_scaled": normalized.fraction_scaled,
                "repeated_headers": normalized.stats.repeated_headers,
                "segments_failed": normalized.segments_failed,
                "dry_run": request.dry_run,
            }),
        };

        // === 步骤 3: 发布 ===
        let (backup_path, scratch_dir) = if request.dry_run {
            let scratch = if request.keep_temp {
                Some(self.publisher.write_scratch(&publish_batch)?)
            } else {
                None
            };
            info!("dry-run: 跳过发布");
            (None, scratch)
        } else {
            let result = self.publisher.publish(
                &publish_batch,
                &target,
                PublishOptions {
                    backup: request.backup,
                    keep_temp: request.keep_temp,
                },
            )?;
            (result.backup_path, result.scratch_dir)
        };

        let summary = UpdateSummary {
            site: source.id.clone(),
            engine_used: raw.engine_used.clone(),
            csv_path: target,
            rows_written: if request.dry_run { 0 } else { normalized.records.len() },
            rejected_count: normalized.stats.rejected,
            repeated_headers: normalized.stats.repeated_headers,
            duplicates_removed: normalized.duplicates_removed,
            fraction_scaled: normalized.fraction_scaled,
            segments_failed: normalized.segments_failed,
            backup_path,
            scratch_dir,
            dry_run: request.dry_run,
            elapsed_ms: start.elapsed().as_millis(),
        };
        info!(
            rows = summary.rows_written,
            elapsed_ms = summary.elapsed_ms as u64,
            "佣金表更新完成"
        );
        Ok(summary)
    }

    /// 把原始表格规范化为记录
    ///
    /// # 规则
    /// - 带表头的片段开始一张新表；无表头片段视为上一张表的续页
    /// - 第一个片段无表头且位置回退不完整 → 该片段失败
    /// - 所有片段都失败 → 返回第一个片段的错误
    pub fn normalize(&self, raw: &RawTable, source: &MarketplaceSource) -> ImportResult<NormalizedTable> {
        let reconciler = HeaderReconciler::new(source);
        let mut result = NormalizedTable::default();
        let mut current: Option<(HeaderMapping, Option<RawRow>)> = None;
        let mut fill = FillState::default();
        let mut first_error: Option<ImportError> = None;
        let mut any_table = false;

        for segment in raw.segments.iter().filter(|s| !s.is_empty()) {
            let (mapping, header, body): (HeaderMapping, Option<RawRow>, &[RawRow]) =
                match reconciler.locate_header(&segment.rows, self.header_scan_rows) {
                    Some(idx) => match reconciler.reconcile(&segment.rows[idx]) {
                        Ok(mapping) => {
                            fill = FillState::default();
                            let header = segment.rows[idx].clone();
                            current = Some((mapping.clone(), Some(header.clone())));
                            (mapping, Some(header), &segment.rows[idx + 1..])
                        }
                        Err(e) => {
                            warn!(segment = %segment.label, error = %e, "表头不完整，跳过片段");
                            record_failure(&mut result, &mut first_error, &segment.label, e);
                            current = None;
                            continue;
                        }
                    },
                    None => match current.clone() {
                        Some((mapping, header)) => {
                            debug!(segment = %segment.label, "无表头片段，按续页处理");
                            (mapping, header, &segment.rows[..])
                        }
                        None if reconciler.has_complete_fallback() => {
                            let mapping = reconciler.reconcile(&[])?;
                            fill = FillState::default();
                            current = Some((mapping.clone(), None));
                            (mapping, None, &segment.rows[..])
                        }
                        None => {
                            let err = reconciler
                                .reconcile(&segment.rows[0])
                                .err()
                                .unwrap_or_else(|| ImportError::ColumnNotFound {
                                    field: "header".to_string(),
                                });
                            warn!(segment = %segment.label, error = %err, "未找到表头，跳过片段");
                            record_failure(&mut result, &mut first_error, &segment.label, err);
                            continue;
                        }
                    },
                };

            any_table = true;
            let mut normalizer = RowNormalizer::new(
                body.iter().cloned(),
                mapping,
                header.as_deref(),
                source.split_product_groups,
            )
            .with_fill_state(fill);
            result.records.extend(normalizer.by_ref());
            result.stats.merge(&normalizer.stats());
            fill = normalizer.fill_state();
        }

        if !any_table {
            return Err(first_error.unwrap_or_else(|| ImportError::Extraction {
                reason: "没有可规范化的片段".to_string(),
            }));
        }

        result.fraction_scaled = fix_fraction_scale(&mut result.records);
        if result.fraction_scaled {
            info!("费率为小数比例，已乘以 100");
        }
        result.duplicates_removed = dedup_exact(&mut result.records);
        Ok(result)
    }
}

fn record_failure(
    result: &mut NormalizedTable,
    first_error: &mut Option<ImportError>,
    label: &str,
    err: ImportError,
) {
    result.segments_failed.push(SegmentFailure {
        label: label.to_string(),
        reason: err.to_string(),
    });
    if first_error.is_none() {
        *first_error = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldCandidates;
    use crate::domain::TableSegment;
    use tempfile::TempDir;

    fn source() -> MarketplaceSource {
        MarketplaceSource::new(
            "demo",
            "Demo",
            FieldCandidates {
                category: vec!["Kategori".into()],
                sub_category: vec!["Alt Kategori".into()],
                product_group: vec!["Ürün Grubu".into()],
                commission_rate: vec!["Komisyon".into()],
            },
        )
    }

    fn row(cells: &[&str]) -> RawRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn importer(dir: &TempDir) -> CommissionImporter<AppConfig> {
        let mut config = AppConfig::with_data_dir(dir.path());
        config.marketplaces = vec![source()];
        CommissionImporter::from_config(config)
    }

    fn table(segments: Vec<TableSegment>) -> RawTable {
        RawTable::new(PathBuf::from("tarife.pdf"), "lopdf", segments)
    }

    #[test]
    fn test_multi_page_continuation() {
        let dir = TempDir::new().unwrap();
        let importer = importer(&dir);
        let raw = table(vec![
            TableSegment::new(
                "page 1",
                vec![
                    row(&["Komisyon Tarifesi"]),
                    row(&["Kategori", "Alt Kategori", "Ürün Grubu", "Komisyon"]),
                    row(&["Ev", "Mutfak", "Tava", "%12"]),
                ],
            ),
            TableSegment::new("page 2", vec![row(&["", "", "Tencere", "%13"])]),
        ]);

        let out = importer.normalize(&raw, &source()).unwrap();
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[1].category, "Ev");
        assert_eq!(out.records[1].sub_category, "Mutfak");
        assert_eq!(out.records[1].commission_rate, 13.0);
        assert!(out.segments_failed.is_empty());
    }

    #[test]
    fn test_headerless_first_segment_fails_alone() {
        let dir = TempDir::new().unwrap();
        let importer = importer(&dir);
        let raw = table(vec![
            TableSegment::new("page 1", vec![row(&["Ev", "Mutfak", "Tava", "12"])]),
            TableSegment::new(
                "page 2",
                vec![
                    row(&["Kategori", "Alt Kategori", "Ürün Grubu", "Komisyon"]),
                    row(&["Ev", "Mutfak", "Tencere", "13"]),
                ],
            ),
        ]);

        let out = importer.normalize(&raw, &source()).unwrap();
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.segments_failed.len(), 1);
        assert_eq!(out.segments_failed[0].label, "page 1");
    }

    #[test]
    fn test_all_segments_failing_is_error() {
        let dir = TempDir::new().unwrap();
        let importer = importer(&dir);
        let raw = table(vec![TableSegment::new(
            "page 1",
            vec![
                row(&["Ürün Grubu", "Kategori", "Alt Kategori", "Oran"]),
                row(&["Tava", "Ev", "Mutfak", "12"]),
            ],
        )]);

        let err = importer.normalize(&raw, &source()).unwrap_err();
        match err {
            ImportError::ColumnNotFound { field } => assert_eq!(field, "commission_rate"),
            other => panic!("期望 ColumnNotFound，实际 {:?}", other),
        }
    }

    #[test]
    fn test_fraction_scale_and_dedup() {
        let dir = TempDir::new().unwrap();
        let importer = importer(&dir);
        let raw = table(vec![TableSegment::new(
            "sheet Data",
            vec![
                row(&["Kategori", "Ürün Grubu", "Komisyon"]),
                row(&["Ev", "Tava", "0,12"]),
                row(&["Ev", "Tava", "0,12"]),
                row(&["Ev", "Tencere", "0,15"]),
            ],
        )]);

        let out = importer.normalize(&raw, &source()).unwrap();
        assert!(out.fraction_scaled);
        assert_eq!(out.duplicates_removed, 1);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].commission_rate, 12.0);
        assert_eq!(out.records[0].sub_category, "Ev");
    }

    #[test]
    fn test_unknown_site() {
        let dir = TempDir::new().unwrap();
        let importer = importer(&dir);
        let request = UpdateRequest::new(
            "etsy",
            SourceDocument::Pdf(dir.path().join("x.pdf")),
        );
        let err = importer.run(&request).unwrap_err();
        assert!(matches!(err, ImportError::UnknownSite(_)));
    }
}
