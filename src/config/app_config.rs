// ==========================================
// 佣金费率系统 - 应用配置
// ==========================================
// 职责: 目录布局、查询上限、平台列表
// 来源: 内置默认值 → JSON 配置文件 → 环境变量（后者覆盖前者）
// ==========================================

use crate::config::site_registry::{builtin_sources, MarketplaceSource, SiteRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// 环境变量名
pub mod env_keys {
    pub const DATA_DIR: &str = "COMMISSION_DATA_DIR";
    pub const TMP_DIR: &str = "COMMISSION_TMP_DIR";
    pub const BACKUP_DIR: &str = "COMMISSION_BACKUP_DIR";
    pub const SEARCH_LIMIT: &str = "COMMISSION_SEARCH_LIMIT";
    pub const HEADER_SCAN_ROWS: &str = "COMMISSION_HEADER_SCAN_ROWS";
    /// 单个平台 CSV 路径: `<SITE>_CSV_PATH`，如 TRENDYOL_CSV_PATH
    pub const CSV_PATH_SUFFIX: &str = "_CSV_PATH";
}

const DEFAULT_SEARCH_LIMIT: usize = 50;
const DEFAULT_HEADER_SCAN_ROWS: usize = 20;
const APP_DIR_NAME: &str = "marketplace-commissions";

// ==========================================
// ConfigError - 配置错误
// ==========================================
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置读取失败 (path: {path}): {message}")]
    ConfigReadError { path: String, message: String },

    #[error("配置解析失败: {0}")]
    ConfigParseError(String),

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ==========================================
// AppConfig - 应用配置
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 规范 CSV 所在目录
    pub data_dir: PathBuf,
    /// 临时目录（缺省为 data_dir/tmp）
    pub tmp_dir: Option<PathBuf>,
    /// 备份目录（缺省为 data_dir/backup）
    pub backup_dir: Option<PathBuf>,
    /// 搜索结果上限
    pub search_limit: usize,
    /// 表头探测扫描的最大行数
    pub header_scan_rows: usize,
    pub marketplaces: Vec<MarketplaceSource>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tmp_dir: None,
            backup_dir: None,
            search_limit: DEFAULT_SEARCH_LIMIT,
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
            marketplaces: builtin_sources(),
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// # 参数
    /// - path: JSON 配置文件路径；None 时使用内置默认值
    ///
    /// # 返回
    /// - 已应用环境变量覆盖的配置
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p).map_err(|e| ConfigError::ConfigReadError {
                    path: p.display().to_string(),
                    message: e.to_string(),
                })?;
                info!(path = %p.display(), "读取配置文件");
                Self::from_json_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        debug!(data_dir = %config.data_dir.display(), sites = config.marketplaces.len(), "配置加载完成");
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        serde_json::from_str(text).map_err(|e| ConfigError::ConfigParseError(e.to_string()))
    }

    /// 以数据目录构造默认配置（测试与嵌入式使用）
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// 应用覆盖值
    ///
    /// # 参数
    /// - lookup: 键 → 值 的查找函数（生产环境为 std::env::var）
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = non_empty(lookup(env_keys::DATA_DIR)) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty(lookup(env_keys::TMP_DIR)) {
            self.tmp_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = non_empty(lookup(env_keys::BACKUP_DIR)) {
            self.backup_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = non_empty(lookup(env_keys::SEARCH_LIMIT)) {
            self.search_limit = parse_positive(env_keys::SEARCH_LIMIT, &value)?;
        }
        if let Some(value) = non_empty(lookup(env_keys::HEADER_SCAN_ROWS)) {
            self.header_scan_rows = parse_positive(env_keys::HEADER_SCAN_ROWS, &value)?;
        }

        for source in &mut self.marketplaces {
            let key = format!("{}{}", source.id.to_uppercase(), env_keys::CSV_PATH_SUFFIX);
            if let Some(path) = non_empty(lookup(&key)) {
                debug!(site = %source.id, path = %path, "平台 CSV 路径被覆盖");
                source.csv_file = PathBuf::from(path);
            }
        }
        Ok(())
    }

    fn validate(&self) -> ConfigResult<()> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.marketplaces {
            if source.id.trim().is_empty() {
                return Err(ConfigError::ConfigValueError {
                    key: "marketplaces.id".to_string(),
                    value: source.id.clone(),
                    message: "平台标识不能为空".to_string(),
                });
            }
            if !seen.insert(source.id.to_lowercase()) {
                return Err(ConfigError::ConfigValueError {
                    key: "marketplaces.id".to_string(),
                    value: source.id.clone(),
                    message: "平台标识重复".to_string(),
                });
            }
        }
        if self.search_limit == 0 {
            return Err(ConfigError::ConfigValueError {
                key: "search_limit".to_string(),
                value: "0".to_string(),
                message: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("tmp"))
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("backup"))
    }
}

impl SiteRegistry for AppConfig {
    fn source(&self, id: &str) -> Option<&MarketplaceSource> {
        let wanted = id.trim();
        self.marketplaces
            .iter()
            .find(|s| s.id.eq_ignore_ascii_case(wanted))
    }

    fn site_ids(&self) -> Vec<String> {
        self.marketplaces.iter().map(|s| s.id.clone()).collect()
    }

    fn csv_path(&self, id: &str) -> Option<PathBuf> {
        self.source(id).map(|s| {
            if s.csv_file.is_absolute() {
                s.csv_file.clone()
            } else {
                self.data_dir.join(&s.csv_file)
            }
        })
    }
}

/// 默认数据目录: 当前目录下的 data/ 若存在则使用，否则使用系统数据目录
fn default_data_dir() -> PathBuf {
    let local = PathBuf::from("data");
    if local.is_dir() {
        return local;
    }
    match dirs::data_dir() {
        Some(dir) => dir.join(APP_DIR_NAME),
        None => {
            warn!("无法确定系统数据目录，使用 ./data");
            local
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_positive(key: &str, value: &str) -> ConfigResult<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::ConfigValueError {
            key: key.to_string(),
            value: value.to_string(),
            message: "必须为正整数".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_layout() {
        let config = AppConfig::with_data_dir("/srv/commissions");
        assert_eq!(config.search_limit, 50);
        assert_eq!(config.header_scan_rows, 20);
        assert_eq!(config.tmp_dir(), PathBuf::from("/srv/commissions/tmp"));
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/commissions/backup"));
        assert_eq!(
            config.csv_path("Trendyol"),
            Some(PathBuf::from("/srv/commissions/trendyol_commissions.csv"))
        );
        assert!(config.csv_path("etsy").is_none());
    }

    #[test]
    fn test_overrides() {
        let mut config = AppConfig::with_data_dir("/srv/commissions");
        config
            .apply_overrides(lookup_from(&[
                ("COMMISSION_SEARCH_LIMIT", "10"),
                ("COMMISSION_BACKUP_DIR", "/var/backup"),
                ("N11_CSV_PATH", "/mnt/n11.csv"),
            ]))
            .unwrap();

        assert_eq!(config.search_limit, 10);
        assert_eq!(config.backup_dir(), PathBuf::from("/var/backup"));
        assert_eq!(config.csv_path("n11"), Some(PathBuf::from("/mnt/n11.csv")));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = AppConfig::with_data_dir("/srv/commissions");
        let err = config
            .apply_overrides(lookup_from(&[("COMMISSION_SEARCH_LIMIT", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ConfigValueError { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "data_dir": "/srv/data",
                "search_limit": 5,
                "marketplaces": [
                    {{ "id": "demo", "name": "Demo", "csv_file": "demo.csv" }}
                ]
            }}"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.site_ids(), vec!["demo".to_string()]);
        assert_eq!(config.header_scan_rows, 20);
        let demo = config.source("DEMO").unwrap();
        assert!(demo.candidates.category.is_empty());
        assert!(!demo.split_product_groups);
    }

    #[test]
    fn test_duplicate_site_rejected() {
        let text = r#"{"marketplaces": [
            {"id": "a", "name": "A", "csv_file": "a.csv"},
            {"id": "A", "name": "A2", "csv_file": "a2.csv"}
        ]}"#;
        let config = AppConfig::from_json_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
