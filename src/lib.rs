// ==========================================
// 佣金费率系统 - 核心库
// ==========================================
// 职责: 电商平台佣金表提取、规范化、发布与查询
// 技术栈: Rust + CSV/Excel/PDF 解析
// 系统定位: 离线更新（命令行）+ 在线只读查询
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 规范记录与原始表格
pub mod domain;

// 配置层 - 应用配置与平台注册表
pub mod config;

// 导入层 - 源文档 → 规范 CSV
pub mod importer;

// 索引层 - 规范 CSV → 内存查询索引
pub mod index;

// API 层 - 查询边界与利润计算
pub mod api;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    CanonicalField, CanonicalRecord, EngineKind, EnginePreference, RawTable, TableSegment,
    CANONICAL_HEADERS,
};

// 配置
pub use config::{AppConfig, MarketplaceSource, SiteRegistry};

// 导入
pub use importer::{
    CommissionImporter, ImportError, ImportResult, SourceDocument, UpdateRequest, UpdateSummary,
};

// 索引
pub use index::{IndexError, IndexSnapshot, MarketplaceIndex};

// API
pub use api::{CommissionApi, ProfitabilityInput, ProfitabilityResult};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "电商平台佣金费率系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(!APP_NAME.is_empty());
    }
}
