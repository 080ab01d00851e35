// ==========================================
// 佣金费率系统 - 配置层
// ==========================================
// 职责: 应用配置加载与平台注册表
// 存储: JSON 配置文件 + 环境变量覆盖
// ==========================================

pub mod app_config;
pub mod site_registry;

// 重导出核心配置类型
pub use app_config::{env_keys, AppConfig, ConfigError, ConfigResult};
pub use site_registry::{builtin_sources, FieldCandidates, MarketplaceSource, SiteRegistry};
