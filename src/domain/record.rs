// ==========================================
// 佣金费率系统 - 规范记录
// ==========================================
// 职责: 定义发布到规范 CSV 的一行数据
// 格式: Category,SubCategory,ProductGroup,CommissionPercentVatInclusive
// ==========================================

use serde::{Deserialize, Serialize};

/// 规范 CSV 表头（固定顺序）
pub const CANONICAL_HEADERS: [&str; 4] = [
    "Category",
    "SubCategory",
    "ProductGroup",
    "CommissionPercentVatInclusive",
];

// ==========================================
// CanonicalRecord - 规范佣金记录
// ==========================================
// 不变量: 三个文本字段非空; commission_rate 为有限数值（百分数，如 12.5）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub category: String,
    pub sub_category: String,
    pub product_group: String,
    #[serde(rename = "commissionPercentVatInclusive")]
    pub commission_rate: f64,
}

impl CanonicalRecord {
    pub fn new(
        category: impl Into<String>,
        sub_category: impl Into<String>,
        product_group: impl Into<String>,
        commission_rate: f64,
    ) -> Self {
        Self {
            category: category.into(),
            sub_category: sub_category.into(),
            product_group: product_group.into(),
            commission_rate,
        }
    }

    /// 写入 CSV 的字段序列
    pub fn to_csv_fields(&self) -> [String; 4] {
        [
            self.category.clone(),
            self.sub_category.clone(),
            self.product_group.clone(),
            format_rate(self.commission_rate),
        ]
    }

    /// 完全相同（四个字段逐一相等）的判定键
    pub fn dedup_key(&self) -> (String, String, String, u64) {
        (
            self.category.clone(),
            self.sub_category.clone(),
            self.product_group.clone(),
            self.commission_rate.to_bits(),
        )
    }
}

/// 费率的文本形式: 可精确还原的最短十进制表示，不使用指数
///
/// # 示例
/// - 12.5 → "12.5"
/// - 15.0 → "15"
/// - 100.0 / 3.0 → "33.333333333333336"
pub fn format_rate(value: f64) -> String {
    if value == 0.0 {
        // -0 也写成 "0"
        return "0".to_string();
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(12.5), "12.5");
        assert_eq!(format_rate(15.0), "15");
        assert_eq!(format_rate(0.0), "0");
        assert_eq!(format_rate(7.125), "7.125");
        assert_eq!(format_rate(-0.0), "0");
        assert_eq!(format_rate(12.3456789), "12.3456789");
        assert_eq!(format_rate(0.0000001), "0.0000001");

        let third = 100.0 / 3.0;
        assert_eq!(format_rate(third).parse::<f64>().unwrap(), third);
    }

    #[test]
    fn test_json_field_names() {
        let record = CanonicalRecord::new("Elektronik", "Telefon", "Cep Telefonu", 8.0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["subCategory"], "Telefon");
        assert_eq!(json["productGroup"], "Cep Telefonu");
        assert_eq!(json["commissionPercentVatInclusive"], 8.0);
    }
}
