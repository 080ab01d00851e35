// ==========================================
// 佣金费率系统 - 查询 API
// ==========================================
// 职责: 平台列表 / 重新加载 / 搜索 / 层级枚举 / 费率查询 / 利润计算
// 红线: 只读；"未找到" 返回 found=false，不报错
// ==========================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::api::calculator::{calculate, ProfitabilityInput, ProfitabilityResult};
use crate::api::error::{ApiError, ApiResult};
use crate::config::AppConfig;
use crate::index::{IndexSnapshot, MarketplaceIndex, ProductGroupRate, SearchHit};

// ==========================================
// 响应类型
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceSummary {
    pub id: String,
    pub name: String,
    pub csv_path: String,
    pub exists: bool,
    pub record_count: usize,
    pub product_group_count: usize,
    pub skipped_rows: usize,
    /// 加载失败原因（正常时为空）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateLookup {
    pub value: Option<f64>,
    pub found: bool,
}

// ==========================================
// CommissionApi - 查询服务
// ==========================================
pub struct CommissionApi {
    index: Arc<MarketplaceIndex>,
    search_limit: usize,
}

impl CommissionApi {
    pub fn new(index: Arc<MarketplaceIndex>, search_limit: usize) -> Self {
        Self {
            index,
            search_limit,
        }
    }

    /// 按配置创建（索引惰性加载）
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(MarketplaceIndex::new(config)), config.search_limit)
    }

    pub fn index(&self) -> &Arc<MarketplaceIndex> {
        &self.index
    }

    fn snapshot(&self, marketplace: &str) -> ApiResult<Arc<IndexSnapshot>> {
        if marketplace.trim().is_empty() {
            return Err(ApiError::InvalidInput("平台标识不能为空".to_string()));
        }
        Ok(self.index.get(marketplace)?)
    }

    /// 列出全部平台及其数据概况
    ///
    /// 单个平台加载失败不影响其他平台，失败原因写入 load_error
    pub fn list_marketplaces(&self) -> ApiResult<Vec<MarketplaceSummary>> {
        let mut summaries = Vec::new();
        for id in self.index.marketplace_ids() {
            let source = self.index.source(&id)?;
            let path = self.index.csv_path(&id)?;
            let mut summary = MarketplaceSummary {
                id: source.id.clone(),
                name: source.name.clone(),
                csv_path: path.display().to_string(),
                exists: path.exists(),
                record_count: 0,
                product_group_count: 0,
                skipped_rows: 0,
                load_error: None,
            };
            match self.index.get(&id) {
                Ok(snapshot) => {
                    summary.record_count = snapshot.record_count();
                    summary.product_group_count = snapshot.distinct_product_groups();
                    summary.skipped_rows = snapshot.skipped_rows();
                }
                Err(e) => summary.load_error = Some(e.to_string()),
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// 强制重新加载（None 表示全部平台）
    pub fn reload(&self, marketplace: Option<&str>) -> ApiResult<ReloadResponse> {
        let reloaded = self.index.force_reload(marketplace)?;
        info!(site = ?marketplace, reloaded, "索引重新加载");
        Ok(ReloadResponse { reloaded })
    }

    /// 子串搜索，最多返回 search_limit 条
    pub fn search(&self, marketplace: &str, query: &str) -> ApiResult<Vec<SearchHit>> {
        let snapshot = self.snapshot(marketplace)?;
        let hits = snapshot.search(query, self.search_limit);
        debug!(site = %marketplace, query = %query, hits = hits.len(), "搜索完成");
        Ok(hits)
    }

    pub fn list_categories(&self, marketplace: &str) -> ApiResult<Vec<String>> {
        Ok(self.snapshot(marketplace)?.categories())
    }

    pub fn list_sub_categories(&self, marketplace: &str, category: &str) -> ApiResult<Vec<String>> {
        Ok(self.snapshot(marketplace)?.sub_categories(category))
    }

    pub fn list_product_groups(
        &self,
        marketplace: &str,
        category: &str,
        sub_category: &str,
    ) -> ApiResult<Vec<String>> {
        Ok(self
            .snapshot(marketplace)?
            .product_groups(category, sub_category))
    }

    /// 精确费率查询
    ///
    /// # 返回
    /// - found=false, value=None: 无匹配（不是错误）
    /// - 重复键时返回最大费率
    pub fn get_commission_rate(
        &self,
        marketplace: &str,
        category: &str,
        sub_category: &str,
        product_group: &str,
    ) -> ApiResult<RateLookup> {
        let value = self
            .snapshot(marketplace)?
            .rate(category, sub_category, product_group);
        Ok(RateLookup {
            value,
            found: value.is_some(),
        })
    }

    /// 商品组 → 最大费率
    pub fn product_group_rates(&self, marketplace: &str, query: &str) -> ApiResult<Vec<ProductGroupRate>> {
        Ok(self.snapshot(marketplace)?.product_group_rates(query))
    }

    pub fn calculate(&self, input: &ProfitabilityInput) -> ProfitabilityResult {
        calculate(input)
    }
}
