// ==========================================
// 佣金费率系统 - 导入层
// ==========================================
// 职责: 平台佣金表（PDF / 电子表格）→ 规范 CSV
// 流程: 提取 → 表头协调 → 行规范化 → 原子发布
// ==========================================

// 模块声明
pub mod data_cleaner;
pub mod engines;
pub mod error;
pub mod file_parser;
pub mod header_reconciler;
pub mod page_range;
pub mod pipeline;
pub mod publisher;
pub mod row_normalizer;

// 重导出核心类型
pub use data_cleaner::{fix_fraction_scale, DataCleaner};
pub use engines::{default_engines, LopdfEngine, PageText, PdfEngine, PdfExtractEngine, PdftotextEngine};
pub use error::{ImportError, ImportResult};
pub use file_parser::{layout_text_to_rows, select_sheet, SourceDocument, TableExtractor};
pub use header_reconciler::HeaderReconciler;
pub use page_range::parse_page_range;
pub use pipeline::{CommissionImporter, NormalizedTable, SegmentFailure, UpdateRequest, UpdateSummary};
pub use publisher::{PublishBatch, PublishOptions, PublishResult, Publisher};
pub use row_normalizer::{dedup_exact, FillState, NormalizeStats, RowNormalizer};
