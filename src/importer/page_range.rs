// ==========================================
// 佣金费率系统 - 页码范围解析
// ==========================================
// 语法: "1-3,5,8-9"（1 起始，闭区间，逗号分隔）
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use std::collections::BTreeSet;

/// 允许的最大页码（区间按页展开，需要上限）
pub const MAX_PAGE: u32 = 10_000;

/// 解析页码范围为有序页码集合
///
/// # 参数
/// - text: 范围文本，如 "1-3,7,10-12"
///
/// # 返回
/// - Ok(BTreeSet<u32>): 去重后的页码（升序）
/// - Err(RangeSyntax): 空片段、非数字、页码为 0 或超过 MAX_PAGE、区间倒置
pub fn parse_page_range(text: &str) -> ImportResult<BTreeSet<u32>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(range_error(text, "范围为空"));
    }

    let mut pages = BTreeSet::new();
    for token in trimmed.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(range_error(text, "存在空片段"));
        }

        match token.split_once('-') {
            Some((start, end)) => {
                let start = parse_page(token, start)?;
                let end = parse_page(token, end)?;
                if start > end {
                    return Err(range_error(token, "起始页大于结束页"));
                }
                pages.extend(start..=end);
            }
            None => {
                pages.insert(parse_page(token, token)?);
            }
        }
    }

    Ok(pages)
}

fn parse_page(token: &str, text: &str) -> ImportResult<u32> {
    let page = text
        .trim()
        .parse::<u32>()
        .map_err(|_| range_error(token, "页码必须为正整数"))?;
    if page == 0 {
        return Err(range_error(token, "页码从 1 开始"));
    }
    if page > MAX_PAGE {
        return Err(range_error(token, &format!("页码不能超过 {}", MAX_PAGE)));
    }
    Ok(page)
}

fn range_error(token: &str, reason: &str) -> ImportError {
    ImportError::RangeSyntax {
        token: token.to_string(),
        reason: reason.to_string(),
    }
}
