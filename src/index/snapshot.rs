// ==========================================
// 佣金费率系统 - 索引快照
// ==========================================
// 职责: 一个平台规范 CSV 的不可变内存视图
// 结构: 类目 → 子类目 → 商品组 → 费率（重复键取最大值）+ 扁平搜索列表
// 红线: 快照构建后只读；重新加载时整体替换，从不原地修改
// ==========================================

use crate::config::MarketplaceSource;
use crate::domain::{CanonicalField, CanonicalRecord, HeaderMapping, CANONICAL_HEADERS};
use crate::importer::{DataCleaner, HeaderReconciler};
use crate::index::error::{IndexError, IndexResult};
use chrono::{DateTime, Local};
use csv::ReaderBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ==========================================
// 层级树节点（键为折叠后的文本，name 为首次出现的原文）
// ==========================================
#[derive(Debug, Clone)]
struct GroupRate {
    name: String,
    rate: f64,
}

#[derive(Debug, Clone)]
struct SubCategoryNode {
    name: String,
    groups: BTreeMap<String, GroupRate>,
}

#[derive(Debug, Clone)]
struct CategoryNode {
    name: String,
    subs: BTreeMap<String, SubCategoryNode>,
}

#[derive(Debug, Clone)]
struct SearchEntry {
    key: (String, String, String),
    category: String,
    sub_category: String,
    product_group: String,
    folded_path: String,
}

/// 搜索命中
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// 展示路径，如 "Elektronik > Telefon > Cep Telefonu"
    pub path: String,
    pub category: String,
    pub sub_category: String,
    pub product_group: String,
    pub rate: f64,
}

/// 商品组及其最大费率
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductGroupRate {
    pub product_group: String,
    pub rate: f64,
}

// ==========================================
// IndexSnapshot - 索引快照
// ==========================================
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    marketplace_id: String,
    source_path: Option<PathBuf>,
    tree: BTreeMap<String, CategoryNode>,
    entries: Vec<SearchEntry>,
    /// 加载到的全部记录（文件顺序，含重复键）
    records: Vec<CanonicalRecord>,
    skipped_rows: usize,
    /// 加载时观察到的文件修改时间（文件不存在时为 None）
    modified: Option<SystemTime>,
    loaded_at: DateTime<Local>,
}

impl IndexSnapshot {
    /// 空索引（文件不存在时使用）
    pub fn empty(marketplace_id: &str) -> Self {
        Self::from_records(marketplace_id, Vec::new(), 0, None)
    }

    /// 由记录构建快照
    ///
    /// # 参数
    /// - records: 规范记录（允许重复键）
    /// - skipped_rows: 加载时被跳过的行数
    /// - modified: 文件修改时间
    pub fn from_records(
        marketplace_id: &str,
        records: Vec<CanonicalRecord>,
        skipped_rows: usize,
        modified: Option<SystemTime>,
    ) -> Self {
        let cleaner = DataCleaner;
        let mut tree: BTreeMap<String, CategoryNode> = BTreeMap::new();
        let mut entries: Vec<SearchEntry> = Vec::new();

        for record in &records {
            let key = (
                cleaner.fold_text(&record.category),
                cleaner.fold_text(&record.sub_category),
                cleaner.fold_text(&record.product_group),
            );

            let category = tree.entry(key.0.clone()).or_insert_with(|| CategoryNode {
                name: record.category.clone(),
                subs: BTreeMap::new(),
            });
            let sub = category
                .subs
                .entry(key.1.clone())
                .or_insert_with(|| SubCategoryNode {
                    name: record.sub_category.clone(),
                    groups: BTreeMap::new(),
                });

            match sub.groups.get_mut(&key.2) {
                Some(existing) => {
                    // 重复键取最大费率
                    if record.commission_rate > existing.rate {
                        existing.rate = record.commission_rate;
                    }
                }
                None => {
                    sub.groups.insert(
                        key.2.clone(),
                        GroupRate {
                            name: record.product_group.clone(),
                            rate: record.commission_rate,
                        },
                    );
                    let path = display_path(&record.category, &record.sub_category, &record.product_group);
                    entries.push(SearchEntry {
                        folded_path: cleaner.fold_text(&path),
                        key,
                        category: record.category.clone(),
                        sub_category: record.sub_category.clone(),
                        product_group: record.product_group.clone(),
                    });
                }
            }
        }

        Self {
            marketplace_id: marketplace_id.to_string(),
            source_path: None,
            tree,
            entries,
            records,
            skipped_rows,
            modified,
            loaded_at: Local::now(),
        }
    }

    /// 从规范 CSV（或旧版表头的 CSV）加载
    ///
    /// # 参数
    /// - source: 平台描述（旧版表头用其候选名协调）
    /// - path: CSV 路径；不存在时返回空索引
    /// - modified: 读取前观察到的修改时间
    ///
    /// # 返回
    /// - Err(IndexLoad): 文件不可读、编码错误或表头无法识别
    pub fn load_csv(
        source: &MarketplaceSource,
        path: &Path,
        modified: Option<SystemTime>,
    ) -> IndexResult<Self> {
        if !path.exists() {
            debug!(site = %source.id, path = %path.display(), "CSV 不存在，使用空索引");
            let mut snapshot = Self::empty(&source.id);
            snapshot.source_path = Some(path.to_path_buf());
            return Ok(snapshot);
        }

        let load_error = |reason: String| IndexError::IndexLoad {
            path: path.display().to_string(),
            reason,
        };

        let bytes = fs::read(path).map_err(|e| load_error(e.to_string()))?;
        let data = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(data);
        let mut rows = reader.records();

        let header: Vec<String> = match rows.next() {
            Some(result) => result
                .map_err(|e| load_error(e.to_string()))?
                .iter()
                .map(|h| h.trim().to_string())
                .collect(),
            None => {
                let mut snapshot = Self::from_records(&source.id, Vec::new(), 0, modified);
                snapshot.source_path = Some(path.to_path_buf());
                return Ok(snapshot);
            }
        };

        let mapping = if is_canonical_header(&header) {
            canonical_mapping()
        } else {
            debug!(site = %source.id, header = ?header, "非规范表头，按候选名协调");
            HeaderReconciler::new(source)
                .reconcile(&header)
                .map_err(|e| load_error(e.to_string()))?
        };

        let cleaner = DataCleaner;
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for result in rows {
            let row = result.map_err(|e| load_error(e.to_string()))?;
            let cell = |field: CanonicalField| {
                mapping
                    .get(field)
                    .and_then(|idx| row.get(idx))
                    .unwrap_or("")
            };

            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }

            let category = cleaner.normalize_null(cell(CanonicalField::Category));
            let sub_category = cleaner.normalize_null(cell(CanonicalField::SubCategory));
            let product_group = cleaner.normalize_null(cell(CanonicalField::ProductGroup));
            let rate = cleaner.parse_rate(cell(CanonicalField::CommissionRate));

            match (category, product_group, rate) {
                (Some(category), Some(product_group), Some(rate)) => {
                    let sub_category = sub_category.unwrap_or_else(|| category.clone());
                    records.push(CanonicalRecord::new(category, sub_category, product_group, rate));
                }
                _ => skipped += 1,
            }
        }

        let mut snapshot = Self::from_records(&source.id, records, skipped, modified);
        snapshot.source_path = Some(path.to_path_buf());
        Ok(snapshot)
    }

    // ==========================================
    // 元信息
    // ==========================================

    pub fn marketplace_id(&self) -> &str {
        &self.marketplace_id
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// 加载到的记录（文件顺序）
    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn loaded_at(&self) -> DateTime<Local> {
        self.loaded_at
    }

    /// 文件修改时间与加载时不同（更新或回退都算过期）
    pub fn is_stale(&self, observed: Option<SystemTime>) -> bool {
        self.modified != observed
    }

    /// 不同商品组的数量（按折叠文本去重）
    pub fn distinct_product_groups(&self) -> usize {
        self.tree
            .values()
            .flat_map(|c| c.subs.values())
            .flat_map(|s| s.groups.keys())
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    // ==========================================
    // 层级枚举
    // ==========================================

    pub fn categories(&self) -> Vec<String> {
        self.tree.values().map(|c| c.name.clone()).collect()
    }

    pub fn sub_categories(&self, category: &str) -> Vec<String> {
        self.category_node(category)
            .map(|c| c.subs.values().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn product_groups(&self, category: &str, sub_category: &str) -> Vec<String> {
        self.sub_node(category, sub_category)
            .map(|s| s.groups.values().map(|g| g.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 精确费率查询（键先 TRIM 再折叠；重复键取最大值）
    pub fn rate(&self, category: &str, sub_category: &str, product_group: &str) -> Option<f64> {
        let cleaner = DataCleaner;
        self.sub_node(category, sub_category)
            .and_then(|s| s.groups.get(&cleaner.fold_text(product_group)))
            .map(|g| g.rate)
    }

    fn category_node(&self, category: &str) -> Option<&CategoryNode> {
        self.tree.get(&DataCleaner.fold_text(category))
    }

    fn sub_node(&self, category: &str, sub_category: &str) -> Option<&SubCategoryNode> {
        self.category_node(category)
            .and_then(|c| c.subs.get(&DataCleaner.fold_text(sub_category)))
    }

    // ==========================================
    // 搜索
    // ==========================================

    /// 子串搜索（折叠后比较），按首次出现顺序返回至多 limit 条
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let needle = DataCleaner.fold_text(query);
        self.entries
            .iter()
            .filter(|e| needle.is_empty() || e.folded_path.contains(&needle))
            .take(limit)
            .map(|e| SearchHit {
                path: display_path(&e.category, &e.sub_category, &e.product_group),
                category: e.category.clone(),
                sub_category: e.sub_category.clone(),
                product_group: e.product_group.clone(),
                rate: self.rate_by_key(&e.key).unwrap_or(0.0),
            })
            .collect()
    }

    /// 商品组 → 最大费率（跨类目合并），按名称排序
    pub fn product_group_rates(&self, query: &str) -> Vec<ProductGroupRate> {
        let needle = DataCleaner.fold_text(query);
        let mut merged: BTreeMap<String, ProductGroupRate> = BTreeMap::new();

        for group in self
            .tree
            .values()
            .flat_map(|c| c.subs.values())
            .flat_map(|s| s.groups.iter())
        {
            let (folded, entry) = group;
            if !needle.is_empty() && !folded.contains(&needle) {
                continue;
            }
            merged
                .entry(folded.clone())
                .and_modify(|existing| {
                    if entry.rate > existing.rate {
                        existing.rate = entry.rate;
                    }
                })
                .or_insert_with(|| ProductGroupRate {
                    product_group: entry.name.clone(),
                    rate: entry.rate,
                });
        }
        merged.into_values().collect()
    }

    fn rate_by_key(&self, key: &(String, String, String)) -> Option<f64> {
        self.tree
            .get(&key.0)
            .and_then(|c| c.subs.get(&key.1))
            .and_then(|s| s.groups.get(&key.2))
            .map(|g| g.rate)
    }

    /// 全部记录的 (折叠键 → 最大费率)，用于调试与测试
    pub fn rate_table(&self) -> HashMap<(String, String, String), f64> {
        self.entries
            .iter()
            .filter_map(|e| self.rate_by_key(&e.key).map(|r| (e.key.clone(), r)))
            .collect()
    }
}

fn display_path(category: &str, sub_category: &str, product_group: &str) -> String {
    if category == sub_category {
        format!("{} > {}", category, product_group)
    } else {
        format!("{} > {} > {}", category, sub_category, product_group)
    }
}

fn is_canonical_header(header: &[String]) -> bool {
    header.len() >= CANONICAL_HEADERS.len()
        && header
            .iter()
            .zip(CANONICAL_HEADERS.iter())
            .all(|(actual, expected)| actual.eq_ignore_ascii_case(expected))
}

fn canonical_mapping() -> HeaderMapping {
    let mut mapping = HeaderMapping::new();
    for (idx, field) in CanonicalField::ALL.iter().enumerate() {
        mapping.set(*field, idx);
    }
    mapping
}
