// ==========================================
// 佣金费率系统 - 领域类型定义
// ==========================================
// 职责: 规范字段、提取引擎类型与引擎偏好
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 规范字段 (Canonical Field)
// ==========================================
// 顺序即表头匹配顺序: 类目 → 子类目 → 商品组 → 费率
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    Category,
    SubCategory,
    ProductGroup,
    CommissionRate,
}

impl CanonicalField {
    /// 按匹配顺序列出全部字段
    pub const ALL: [CanonicalField; 4] = [
        CanonicalField::Category,
        CanonicalField::SubCategory,
        CanonicalField::ProductGroup,
        CanonicalField::CommissionRate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Category => "category",
            CanonicalField::SubCategory => "sub_category",
            CanonicalField::ProductGroup => "product_group",
            CanonicalField::CommissionRate => "commission_rate",
        }
    }

    /// 子类目可缺省（缺省时与类目相同），其余字段必须存在
    pub fn is_required(&self) -> bool {
        !matches!(self, CanonicalField::SubCategory)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 提取引擎 (Engine Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    Pdftotext,  // 外部 poppler-utils 程序
    Lopdf,      // 纯 Rust 解析
    PdfExtract, // pdf-extract 库（可选特性）
}

impl EngineKind {
    /// auto 模式下的尝试顺序
    pub const AUTO_ORDER: [EngineKind; 3] = [
        EngineKind::Pdftotext,
        EngineKind::Lopdf,
        EngineKind::PdfExtract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Pdftotext => "pdftotext",
            EngineKind::Lopdf => "lopdf",
            EngineKind::PdfExtract => "pdf-extract",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdftotext" => Ok(EngineKind::Pdftotext),
            "lopdf" => Ok(EngineKind::Lopdf),
            "pdf-extract" | "pdf_extract" => Ok(EngineKind::PdfExtract),
            other => Err(format!("未知的提取引擎: {}", other)),
        }
    }
}

// ==========================================
// 引擎偏好 (Engine Preference)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePreference {
    /// 按固定顺序依次尝试，取第一个非空结果
    #[default]
    Auto,
    /// 只使用指定引擎
    Only(EngineKind),
}

impl EnginePreference {
    /// 该偏好下需要尝试的引擎序列
    pub fn candidates(&self) -> Vec<EngineKind> {
        match self {
            EnginePreference::Auto => EngineKind::AUTO_ORDER.to_vec(),
            EnginePreference::Only(kind) => vec![*kind],
        }
    }
}

impl fmt::Display for EnginePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnginePreference::Auto => write!(f, "auto"),
            EnginePreference::Only(kind) => write!(f, "{}", kind),
        }
    }
}

impl FromStr for EnginePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(EnginePreference::Auto);
        }
        s.parse::<EngineKind>().map(EnginePreference::Only)
    }
}
