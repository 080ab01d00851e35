// ==========================================
// 佣金费率系统 - 索引层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 索引层错误类型
#[derive(Error, Debug)]
pub enum IndexError {
    // ===== 加载错误 =====
    #[error("索引加载失败 ({path}): {reason}")]
    IndexLoad { path: String, reason: String },

    // ===== 查询错误 =====
    #[error("未知平台: {0}")]
    UnknownMarketplace(String),

    // ===== 并发控制错误 =====
    #[error("索引锁获取失败: {0}")]
    LockPoisoned(String),
}

/// Result 类型别名
pub type IndexResult<T> = Result<T, IndexError>;
