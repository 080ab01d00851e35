// ==========================================
// 佣金费率系统 - 索引层
// ==========================================
// 职责: 规范 CSV → 内存查询索引，文件变化时热重载
// ==========================================

pub mod error;
pub mod snapshot;
pub mod store;

pub use error::{IndexError, IndexResult};
pub use snapshot::{IndexSnapshot, ProductGroupRate, SearchHit};
pub use store::{IndexState, MarketplaceIndex};
