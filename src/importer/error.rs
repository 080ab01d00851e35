// ==========================================
// 佣金费率系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use crate::config::ConfigError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .pdf/.xlsx/.xlsm/.xls/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 提取引擎错误 =====
    #[error("提取引擎不可用 ({engine}): {reason}")]
    EngineUnavailable { engine: String, reason: String },

    #[error("提取引擎执行失败 ({engine}): {reason}")]
    EngineFailed { engine: String, reason: String },

    #[error("未能提取到任何表格: {reason}")]
    Extraction { reason: String },

    #[error("工作表不存在: {sheet}（可用: {available}）")]
    SheetNotFound { sheet: String, available: String },

    #[error("页码范围格式错误 ({token}): {reason}")]
    RangeSyntax { token: String, reason: String },

    // ===== 数据映射错误 =====
    #[error("必填列未找到: {field}")]
    ColumnNotFound { field: String },

    // ===== 发布错误 =====
    #[error("发布失败: {0}")]
    Publish(String),

    // ===== 配置错误 =====
    #[error("未知平台: {0}")]
    UnknownSite(String),

    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 稳定的错误类别标识（命令行 JSON 输出使用）
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::FileNotFound(_) => "file_not_found",
            ImportError::UnsupportedFormat(_) => "unsupported_format",
            ImportError::FileReadError(_) => "file_read",
            ImportError::ExcelParseError(_) => "excel_parse",
            ImportError::CsvParseError(_) => "csv_parse",
            ImportError::EngineUnavailable { .. } => "engine_unavailable",
            ImportError::EngineFailed { .. } => "engine_failed",
            ImportError::Extraction { .. } => "extraction",
            ImportError::SheetNotFound { .. } => "sheet_not_found",
            ImportError::RangeSyntax { .. } => "range_syntax",
            ImportError::ColumnNotFound { .. } => "column_not_found",
            ImportError::Publish(_) => "publish",
            ImportError::UnknownSite(_) => "unknown_site",
            ImportError::Config(_) => "config",
            ImportError::InternalError(_) | ImportError::Other(_) => "internal",
        }
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
