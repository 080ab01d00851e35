// ==========================================
// 佣金费率系统 - 数据清洗器
// ==========================================
// 职责: 单元格 TRIM / 空值标准化 / 文本折叠 / 费率数值解析
// 红线: 纯函数，不读写文件
// ==========================================

use crate::domain::CanonicalRecord;
use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// 被视为空值的占位文本（比较前已小写）
const BLANK_MARKERS: [&str; 5] = ["nan", "none", "null", "-", "--"];

/// 表头折叠时替换为空格的标点
const HEADER_PUNCTUATION: [char; 12] = ['(', ')', '[', ']', '/', '-', '_', '|', ':', ';', ',', '.'];

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d[\d.,]*").expect("valid number regex"))
}

pub struct DataCleaner;

impl DataCleaner {
    /// 去除首尾空白，NBSP 转空格，内部连续空白压缩为一个
    pub fn clean_text(&self, value: &str) -> String {
        value
            .replace('\u{00a0}', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 单元格是否为空（含 nan / - 等占位符）
    pub fn is_blank(&self, value: &str) -> bool {
        let cleaned = self.clean_text(value);
        cleaned.is_empty() || BLANK_MARKERS.contains(&cleaned.to_lowercase().as_str())
    }

    /// 空值标准化: 空白或占位符 → None
    pub fn normalize_null(&self, value: &str) -> Option<String> {
        if self.is_blank(value) {
            None
        } else {
            Some(self.clean_text(value))
        }
    }

    /// 文本折叠: 土耳其语大小写规则 + 小写 + 去除变音符号
    ///
    /// # 示例
    /// - "Ürün Grubu" → "urun grubu"
    /// - "İÇECEK" → "icecek"
    pub fn fold_text(&self, value: &str) -> String {
        let mut lowered = String::with_capacity(value.len());
        for ch in value.chars() {
            match ch {
                'İ' | 'I' | 'ı' => lowered.push('i'),
                _ => lowered.extend(ch.to_lowercase()),
            }
        }
        let stripped: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();
        self.clean_text(&stripped)
    }

    /// 表头标准化: 折叠后把括号与分隔符替换为空格
    ///
    /// # 示例
    /// - "Komisyon_%_KDV_Dahil" → "komisyon % kdv dahil"
    /// - "Komisyon(%)" → "komisyon %"
    pub fn normalize_header(&self, value: &str) -> String {
        let folded = self.fold_text(value);
        let spaced: String = folded
            .chars()
            .map(|c| if HEADER_PUNCTUATION.contains(&c) { ' ' } else { c })
            .collect();
        self.clean_text(&spaced)
    }

    /// 解析费率文本为数值
    ///
    /// # 规则
    /// 1. 去除 % 与空白，取第一个数字片段
    /// 2. 同时含 '.' 与 ',' 时，靠右者为小数点
    /// 3. 只含 ',': 恰好一个且其后不是 3 位数字 → 小数点；否则为千位分隔符
    /// 4. 只含 '.': 多个 → 千位分隔符
    ///
    /// # 返回
    /// - None: 空值或无法解析
    pub fn parse_rate(&self, value: &str) -> Option<f64> {
        if self.is_blank(value) {
            return None;
        }
        let compact: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '%' && *c != '\u{00a0}')
            .collect();
        let token = number_re().find(&compact)?.as_str();
        let token = token.trim_end_matches(['.', ',']);
        normalize_separators(token)
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    /// 按括号外的逗号、分号、竖线、换行拆分商品组
    ///
    /// # 示例
    /// - "Kolye, Küpe (Altın, Gümüş)" → ["Kolye", "Küpe (Altın, Gümüş)"]
    pub fn split_product_groups(&self, value: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut depth = 0usize;
        let mut current = String::new();

        for ch in value.chars() {
            match ch {
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                ',' | ';' | '|' | '\n' | '\r' if depth == 0 => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            }
        }
        parts.push(current);

        parts
            .into_iter()
            .map(|p| self.clean_text(&p))
            .filter(|p| !p.is_empty())
            .collect()
    }
}

fn normalize_separators(token: &str) -> String {
    let (sign, digits) = match token.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", token),
    };

    let body = match (digits.rfind(','), digits.rfind('.')) {
        (Some(comma), Some(dot)) => {
            if comma > dot {
                digits.replace('.', "").replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
        (Some(comma), None) => {
            let fraction_len = digits.len() - comma - 1;
            if digits.matches(',').count() == 1 && fraction_len != 3 {
                digits.replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
        (None, Some(_)) => {
            if digits.matches('.').count() > 1 {
                digits.replace('.', "")
            } else {
                digits.to_string()
            }
        }
        (None, None) => digits.to_string(),
    };

    format!("{}{}", sign, body)
}

/// 比例修正: 若 95 分位费率 ≤ 1，视为小数比例（0.125 = 12.5%），全部乘以 100
///
/// # 返回
/// - true: 已修正
pub fn fix_fraction_scale(records: &mut [CanonicalRecord]) -> bool {
    if records.is_empty() {
        return false;
    }
    let mut rates: Vec<f64> = records.iter().map(|r| r.commission_rate).collect();
    rates.sort_by(|a, b| a.total_cmp(b));
    let idx = ((rates.len() - 1) as f64 * 0.95).round() as usize;
    let p95 = rates[idx.min(rates.len() - 1)];

    if p95 > 0.0 && p95 <= 1.0 {
        for record in records.iter_mut() {
            record.commission_rate = (record.commission_rate * 100.0 * 1e6).round() / 1e6;
        }
        true
    } else {
        false
    }
}
