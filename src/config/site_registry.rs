// ==========================================
// 佣金费率系统 - 平台注册表
// ==========================================
// 职责: 定义每个平台的数据源描述（CSV 文件、表头候选、位置回退）
// 红线: 只读配置，启动后不再变更
// ==========================================

use crate::domain::CanonicalField;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ==========================================
// FieldCandidates - 各规范字段的表头候选名
// ==========================================
// 候选名按优先级排列，匹配时统一做折叠（小写、去重音、标点转空格）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldCandidates {
    pub category: Vec<String>,
    pub sub_category: Vec<String>,
    pub product_group: Vec<String>,
    pub commission_rate: Vec<String>,
}

impl FieldCandidates {
    pub fn for_field(&self, field: CanonicalField) -> &[String] {
        match field {
            CanonicalField::Category => &self.category,
            CanonicalField::SubCategory => &self.sub_category,
            CanonicalField::ProductGroup => &self.product_group,
            CanonicalField::CommissionRate => &self.commission_rate,
        }
    }

    fn from_lists(category: &[&str], sub: &[&str], group: &[&str], rate: &[&str]) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            category: owned(category),
            sub_category: owned(sub),
            product_group: owned(group),
            commission_rate: owned(rate),
        }
    }
}

// ==========================================
// MarketplaceSource - 单个平台的数据源
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketplaceSource {
    /// 平台标识（小写，如 "trendyol"）
    pub id: String,
    /// 展示名称
    pub name: String,
    /// 规范 CSV 文件（相对路径基于 data_dir）
    pub csv_file: PathBuf,
    #[serde(default)]
    pub candidates: FieldCandidates,
    /// 无表头时的列位置回退
    #[serde(default)]
    pub positional_fallback: BTreeMap<CanonicalField, usize>,
    /// 电子表格输入时必须存在的工作表
    #[serde(default)]
    pub required_sheet: Option<String>,
    /// 商品组单元格是否按括号外的分隔符拆分为多条记录
    #[serde(default)]
    pub split_product_groups: bool,
}

impl MarketplaceSource {
    pub fn new(id: &str, name: &str, candidates: FieldCandidates) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            csv_file: PathBuf::from(format!("{}_commissions.csv", id)),
            candidates,
            positional_fallback: BTreeMap::new(),
            required_sheet: None,
            split_product_groups: false,
        }
    }
}

// ==========================================
// SiteRegistry Trait
// ==========================================
// 用途: 导入管线与索引共同依赖的平台查询接口
// 实现者: AppConfig
pub trait SiteRegistry: Send + Sync {
    /// 按标识查找平台（大小写不敏感）
    fn source(&self, id: &str) -> Option<&MarketplaceSource>;

    /// 全部平台标识（配置顺序）
    fn site_ids(&self) -> Vec<String>;

    /// 平台规范 CSV 的绝对路径
    fn csv_path(&self, id: &str) -> Option<PathBuf>;
}

/// 内置的六个平台
pub fn builtin_sources() -> Vec<MarketplaceSource> {
    let mut trendyol = MarketplaceSource::new(
        "trendyol",
        "Trendyol",
        FieldCandidates::from_lists(
            &["Ana Kategori", "Main Category", "Category", "Kategori"],
            &["SubCategory", "Kategori", "Alt Kategori", "Sub Category"],
            &["ProductGroup", "Ürün Grubu", "Urun Grubu", "Urun_Grubu", "Product Group"],
            &["CommissionPercentVatInclusive", "Komisyon_%_KDV_Dahil", "Komisyon Oranı", "Komisyon"],
        ),
    );
    trendyol.split_product_groups = true;
    trendyol.positional_fallback = positional(&[
        (CanonicalField::Category, 0),
        (CanonicalField::SubCategory, 1),
        (CanonicalField::ProductGroup, 2),
        (CanonicalField::CommissionRate, 3),
    ]);

    let hepsiburada = MarketplaceSource::new(
        "hepsiburada",
        "Hepsiburada",
        FieldCandidates::from_lists(
            &["Ana Kategori", "Main Category", "Category", "Kategori"],
            &["SubCategory", "Kategori", "Alt Kategori"],
            &["ProductGroup", "Ürün Grubu", "Urun Grubu", "Urun_Grubu"],
            &[
                "CommissionPercentVatInclusive",
                "Uygulanan_Komisyon_%_KDV_Dahil",
                "Komisyon_%_KDV_Dahil",
                "Komisyon",
            ],
        ),
    );

    let mut n11 = MarketplaceSource::new(
        "n11",
        "N11",
        FieldCandidates::from_lists(
            &["Ana Kategori", "Main Category", "Category", "Kategori"],
            &["SubCategory", "Alt Kategori"],
            &["ProductGroup", "Ürün Grubu", "Urun Grubu", "Urun_Grubu"],
            &["CommissionPercentVatInclusive", "Komisyon_%_KDV_Dahil", "Komisyon"],
        ),
    );
    n11.required_sheet = Some("Komisyon_Oranlari".to_string());

    let amazon = MarketplaceSource::new(
        "amazon",
        "Amazon",
        FieldCandidates::from_lists(
            &["Ana Kategori", "Main Category", "Category", "Kategori"],
            &["SubCategory", "Alt Kategori"],
            &["ProductGroup", "Ürün Grubu", "Kategori"],
            &["CommissionPercentVatInclusive", "Komisyon_%_KDV_Dahil", "Satış Komisyonu (+KDV)", "Komisyon"],
        ),
    );

    let ciceksepeti = MarketplaceSource::new(
        "ciceksepeti",
        "ÇiçekSepeti",
        FieldCandidates::from_lists(
            &["Ana Kategori", "Main Category", "Category", "Kategori"],
            &["SubCategory", "Alt Kategori"],
            &["ProductGroup", "Ürün Grubu", "Kategori"],
            &[
                "CommissionPercentVatInclusive",
                "Komisyon_%_KDV_Dahil",
                "Revize Komisyon Oranı",
                "Komisyon Oranı",
                "Komisyon",
            ],
        ),
    );

    let pttavm = MarketplaceSource::new(
        "pttavm",
        "PTTAVM",
        FieldCandidates::from_lists(
            &["Ana Kategori", "Main Category", "Category", "Kategori"],
            &["SubCategory", "Alt Kategori"],
            &["ProductGroup", "Ürün Grubu", "Alt Kategori", "Kategori"],
            &["CommissionPercentVatInclusive", "Komisyon_%_KDV_Dahil", "Komisyon Oranları", "Komisyon"],
        ),
    );

    vec![trendyol, hepsiburada, n11, amazon, ciceksepeti, pttavm]
}

fn positional(entries: &[(CanonicalField, usize)]) -> BTreeMap<CanonicalField, usize> {
    entries.iter().copied().collect()
}
