// ==========================================
// 佣金费率系统 - API层
// ==========================================
// 职责: 供 HTTP/UI 层调用的只读查询边界与利润计算
// ==========================================

pub mod calculator;
pub mod error;
pub mod query_api;

pub use calculator::{calculate, vat_share, ProfitabilityInput, ProfitabilityResult, VatBreakdown};
pub use error::{ApiError, ApiResult, ErrorBody};
pub use query_api::{CommissionApi, MarketplaceSummary, RateLookup, ReloadResponse};
