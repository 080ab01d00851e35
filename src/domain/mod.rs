// ==========================================
// 佣金费率系统 - 领域模型层
// ==========================================
// 职责: 定义规范记录、原始表格与领域类型
// 红线: 不含文件读写逻辑，不含提取引擎逻辑
// ==========================================

pub mod record;
pub mod table;
pub mod types;

// 重导出核心类型
pub use record::{format_rate, CanonicalRecord, CANONICAL_HEADERS};
pub use table::{HeaderMapping, RawRow, RawTable, TableSegment};
pub use types::{CanonicalField, EngineKind, EnginePreference};
