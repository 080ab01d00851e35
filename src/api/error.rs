// ==========================================
// 佣金费率系统 - API层错误类型
// ==========================================
// 职责: 把索引层错误转换为查询边界的错误
// 红线: "未找到" 不是错误，由返回值显式表达
// ==========================================

use crate::index::IndexError;
use serde::Serialize;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ===== 输入错误 =====
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("未知平台: {0}")]
    UnknownMarketplace(String),

    // ===== 索引错误 =====
    #[error("索引加载失败: {0}")]
    IndexLoad(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl From<IndexError> for ApiError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::UnknownMarketplace(id) => ApiError::UnknownMarketplace(id),
            e @ IndexError::IndexLoad { .. } => ApiError::IndexLoad(e.to_string()),
            IndexError::LockPoisoned(msg) => ApiError::InternalError(msg),
        }
    }
}

impl ApiError {
    /// 机器可读的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "invalid_input",
            ApiError::UnknownMarketplace(_) => "unknown_marketplace",
            ApiError::IndexLoad(_) => "index_load",
            ApiError::InternalError(_) => "internal",
        }
    }

    /// 结构化错误体，形如 {"kind": .., "message": ..}
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
