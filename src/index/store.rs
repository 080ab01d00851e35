// ==========================================
// 佣金费率系统 - 平台索引存储
// ==========================================
// 职责: 每个平台持有一个当前快照，按文件修改时间惰性重新加载
// 并发: 读者拿到 Arc 快照后无需持锁；重新加载按平台串行
// 红线: 重新加载失败时保留上一个快照，从不暴露半构建状态
// ==========================================

use crate::config::{MarketplaceSource, SiteRegistry};
use crate::index::error::{IndexError, IndexResult};
use crate::index::snapshot::IndexSnapshot;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;
use tracing::{info, instrument, warn};

/// 平台索引状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Unloaded,
    Loaded,
    Stale,
}

struct IndexSlot {
    source: MarketplaceSource,
    path: PathBuf,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
    /// 重新加载锁；内容为最近一次加载失败时的修改时间
    reload_lock: Mutex<Option<Option<SystemTime>>>,
}

impl IndexSlot {
    fn snapshot(&self) -> IndexResult<Option<Arc<IndexSnapshot>>> {
        self.current
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))
    }

    fn replace(&self, snapshot: Arc<IndexSnapshot>) -> IndexResult<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;
        *guard = Some(snapshot);
        Ok(())
    }
}

// ==========================================
// MarketplaceIndex - 全部平台的索引
// ==========================================
pub struct MarketplaceIndex {
    slots: Vec<IndexSlot>,
}

impl MarketplaceIndex {
    /// 按注册表创建（不立即加载，首次查询时加载）
    pub fn new(registry: &dyn SiteRegistry) -> Self {
        let slots = registry
            .site_ids()
            .into_iter()
            .filter_map(|id| {
                let source = registry.source(&id)?.clone();
                let path = registry.csv_path(&id)?;
                Some(IndexSlot {
                    source,
                    path,
                    current: RwLock::new(None),
                    reload_lock: Mutex::new(None),
                })
            })
            .collect();
        Self { slots }
    }

    /// 全部平台标识（注册顺序）
    pub fn marketplace_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.source.id.clone()).collect()
    }

    pub fn source(&self, id: &str) -> IndexResult<&MarketplaceSource> {
        self.slot(id).map(|s| &s.source)
    }

    pub fn csv_path(&self, id: &str) -> IndexResult<&Path> {
        self.slot(id).map(|s| s.path.as_path())
    }

    fn slot(&self, id: &str) -> IndexResult<&IndexSlot> {
        let wanted = id.trim();
        self.slots
            .iter()
            .find(|s| s.source.id.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| IndexError::UnknownMarketplace(id.to_string()))
    }

    /// 当前快照（不触发加载）
    pub fn peek(&self, id: &str) -> IndexResult<Option<Arc<IndexSnapshot>>> {
        self.slot(id)?.snapshot()
    }

    pub fn state(&self, id: &str) -> IndexResult<IndexState> {
        let slot = self.slot(id)?;
        Ok(match slot.snapshot()? {
            None => IndexState::Unloaded,
            Some(snapshot) if snapshot.is_stale(observe_mtime(&slot.path)) => IndexState::Stale,
            Some(_) => IndexState::Loaded,
        })
    }

    /// 获取最新快照
    ///
    /// # 规则
    /// 1. 修改时间未变 → 直接返回当前快照
    /// 2. 修改时间变化或尚未加载 → 重新加载并整体替换
    /// 3. 重新加载失败且已有快照 → 记录警告并返回旧快照（同一修改时间不重复解析）
    ///
    /// # 返回
    /// - Err(IndexLoad): 首次加载失败
    pub fn get(&self, id: &str) -> IndexResult<Arc<IndexSnapshot>> {
        let slot = self.slot(id)?;
        let observed = observe_mtime(&slot.path);

        if let Some(snapshot) = slot.snapshot()? {
            if !snapshot.is_stale(observed) {
                return Ok(snapshot);
            }
        }

        let mut failed_at = slot
            .reload_lock
            .lock()
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;

        // 双重检查: 等锁期间其他线程可能已完成加载
        let observed = observe_mtime(&slot.path);
        let previous = slot.snapshot()?;
        if let Some(snapshot) = &previous {
            if !snapshot.is_stale(observed) {
                return Ok(Arc::clone(snapshot));
            }
            if *failed_at == Some(observed) {
                return Ok(Arc::clone(snapshot));
            }
        }

        match IndexSnapshot::load_csv(&slot.source, &slot.path, observed) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                slot.replace(Arc::clone(&snapshot))?;
                *failed_at = None;
                info!(
                    site = %slot.source.id,
                    records = snapshot.record_count(),
                    skipped = snapshot.skipped_rows(),
                    "索引已加载"
                );
                Ok(snapshot)
            }
            Err(e) => match previous {
                Some(snapshot) => {
                    warn!(site = %slot.source.id, error = %e, "索引重新加载失败，继续使用旧快照");
                    *failed_at = Some(observed);
                    Ok(snapshot)
                }
                None => Err(e),
            },
        }
    }

    /// 强制重新加载（忽略修改时间）
    ///
    /// # 参数
    /// - id: 指定平台；None 表示全部平台
    ///
    /// # 返回
    /// - 指定平台: 加载失败时返回错误
    /// - 全部平台: 失败只记录日志，返回是否至少一个平台加载成功
    #[instrument(skip(self))]
    pub fn force_reload(&self, id: Option<&str>) -> IndexResult<bool> {
        match id {
            Some(id) => {
                let slot = self.slot(id)?;
                self.reload_slot(slot)?;
                Ok(true)
            }
            None => {
                let mut any = false;
                for slot in &self.slots {
                    match self.reload_slot(slot) {
                        Ok(()) => any = true,
                        Err(e) => warn!(site = %slot.source.id, error = %e, "强制重新加载失败"),
                    }
                }
                Ok(any)
            }
        }
    }

    fn reload_slot(&self, slot: &IndexSlot) -> IndexResult<()> {
        let mut failed_at = slot
            .reload_lock
            .lock()
            .map_err(|e| IndexError::LockPoisoned(e.to_string()))?;
        let observed = observe_mtime(&slot.path);
        let snapshot = IndexSnapshot::load_csv(&slot.source, &slot.path, observed)?;
        info!(
            site = %slot.source.id,
            records = snapshot.record_count(),
            "索引已强制重新加载"
        );
        slot.replace(Arc::new(snapshot))?;
        *failed_at = None;
        Ok(())
    }
}

fn observe_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
