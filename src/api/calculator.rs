// ==========================================
// 佣金费率系统 - 利润计算器
// ==========================================
// 职责: 售价/进价/费率 → 平台回款、净利润、利润率
// 约定: 价格均含税；金额输出保留 2 位小数
// 红线: 纯函数，任何数值输入都不报错（负利润率是合法结果）
// ==========================================

use serde::{Deserialize, Serialize};

/// 计算输入（字段名与查询边界的 JSON 一致）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfitabilityInput {
    pub sale_price: f64,
    pub buy_price: f64,
    pub commission_percent: f64,
    pub service_percent: f64,
    pub export_percent: f64,
    pub cargo_price: f64,
    pub vat_percent: f64,
    pub include_vat_deduction: bool,
}

/// 单项金额的含税/税额/不含税拆分
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VatBreakdown {
    pub gross: f64,
    pub vat: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitabilityResult {
    pub total_deduction_percent: f64,
    pub commission_amount: f64,
    pub service_amount: f64,
    pub export_amount: f64,
    pub deduction_amount: f64,
    pub cargo_deduction: f64,

    pub sale_vat: f64,
    pub buy_vat: f64,
    pub commission_vat: f64,
    pub service_vat: f64,
    pub export_vat: f64,
    pub cargo_vat: f64,
    /// 应缴增值税 = max(销项 - 进项, 0)
    pub vat_payable: f64,

    pub payout: f64,
    pub net_profit: f64,
    pub profit_margin: f64,

    pub sale: VatBreakdown,
    pub buy: VatBreakdown,
    pub commission: VatBreakdown,
    pub service: VatBreakdown,
    pub export: VatBreakdown,
    pub cargo: VatBreakdown,
}

/// 计算利润
///
/// # 计算顺序
/// 1. 扣除比例 = 佣金 + 服务费 + 出口费
/// 2. 扣除金额 = 售价 × 扣除比例 ÷ 100
/// 3. 回款 = 售价 - 扣除金额 - 运费
/// 4. 开启增值税抵扣时，回款再减去应缴增值税
/// 5. 净利润 = 回款 - 进价；利润率 = 净利润 ÷ 售价 × 100（售价为 0 时为 0）
pub fn calculate(input: &ProfitabilityInput) -> ProfitabilityResult {
    let vat = input.vat_percent;

    let total_percent = input.commission_percent + input.service_percent + input.export_percent;
    let commission_amount = input.sale_price * input.commission_percent / 100.0;
    let service_amount = input.sale_price * input.service_percent / 100.0;
    let export_amount = input.sale_price * input.export_percent / 100.0;
    let deduction_amount = input.sale_price * total_percent / 100.0;

    let sale = breakdown(input.sale_price, vat);
    let buy = breakdown(input.buy_price, vat);
    let vat_payable = (sale.vat - buy.vat).max(0.0);

    let mut payout = input.sale_price - deduction_amount - input.cargo_price;
    if input.include_vat_deduction {
        payout -= vat_payable;
    }
    let net_profit = payout - input.buy_price;
    let profit_margin = if input.sale_price == 0.0 {
        0.0
    } else {
        net_profit / input.sale_price * 100.0
    };

    let commission = breakdown(commission_amount, vat);
    let service = breakdown(service_amount, vat);
    let export = breakdown(export_amount, vat);
    let cargo = breakdown(input.cargo_price, vat);

    ProfitabilityResult {
        total_deduction_percent: round2(total_percent),
        commission_amount: round2(commission_amount),
        service_amount: round2(service_amount),
        export_amount: round2(export_amount),
        deduction_amount: round2(deduction_amount),
        cargo_deduction: round2(input.cargo_price),
        sale_vat: sale.vat,
        buy_vat: buy.vat,
        commission_vat: commission.vat,
        service_vat: service.vat,
        export_vat: export.vat,
        cargo_vat: cargo.vat,
        vat_payable: round2(vat_payable),
        payout: round2(payout),
        net_profit: round2(net_profit),
        profit_margin: round2(profit_margin),
        sale,
        buy,
        commission,
        service,
        export,
        cargo,
    }
}

/// 含税金额中的税额: amount × v ÷ (100 + v)；税率 ≤ 0 时为 0
pub fn vat_share(amount: f64, vat_percent: f64) -> f64 {
    if vat_percent > 0.0 {
        amount * vat_percent / (100.0 + vat_percent)
    } else {
        0.0
    }
}

fn breakdown(gross: f64, vat_percent: f64) -> VatBreakdown {
    let vat = vat_share(gross, vat_percent);
    VatBreakdown {
        gross: round2(gross),
        vat: round2(vat),
        net: round2(gross - vat),
    }
}

fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // 避免输出 -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_input(include_vat_deduction: bool) -> ProfitabilityInput {
        ProfitabilityInput {
            sale_price: 1000.0,
            buy_price: 700.0,
            commission_percent: 12.5,
            vat_percent: 20.0,
            include_vat_deduction,
            ..Default::default()
        }
    }

    #[test]
    fn test_reference_with_vat_deduction() {
        let result = calculate(&reference_input(true));
        assert_eq!(result.commission_amount, 125.0);
        assert_eq!(result.sale_vat, 166.67);
        assert_eq!(result.buy_vat, 116.67);
        assert_eq!(result.vat_payable, 50.0);
        assert_eq!(result.payout, 825.0);
        assert_eq!(result.net_profit, 125.0);
        assert_eq!(result.profit_margin, 12.5);
    }

    #[test]
    fn test_reference_without_vat_deduction() {
        let result = calculate(&reference_input(false));
        assert_eq!(result.payout, 875.0);
        assert_eq!(result.net_profit, 175.0);
        assert_eq!(result.profit_margin, 17.5);
    }

    #[test]
    fn test_zero_sale_price_margin_is_zero() {
        let result = calculate(&ProfitabilityInput {
            buy_price: 50.0,
            vat_percent: 20.0,
            include_vat_deduction: true,
            ..Default::default()
        });
        assert_eq!(result.profit_margin, 0.0);
        assert_eq!(result.net_profit, -50.0);
        assert_eq!(result.vat_payable, 0.0);
    }

    #[test]
    fn test_negative_margin_and_cargo() {
        let result = calculate(&ProfitabilityInput {
            sale_price: 100.0,
            buy_price: 90.0,
            commission_percent: 20.0,
            service_percent: 5.0,
            cargo_price: 30.0,
            ..Default::default()
        });
        assert_eq!(result.total_deduction_percent, 25.0);
        assert_eq!(result.payout, 45.0);
        assert_eq!(result.net_profit, -45.0);
        assert_eq!(result.profit_margin, -45.0);
        assert_eq!(result.cargo.vat, 0.0);
    }

    #[test]
    fn test_breakdown_splits_gross() {
        let result = calculate(&reference_input(true));
        assert_eq!(result.sale.gross, 1000.0);
        assert_eq!(result.sale.net, 833.33);
        assert_eq!(result.commission.vat, 20.83);
        assert_eq!(vat_share(120.0, 0.0), 0.0);
        assert_eq!(vat_share(120.0, -5.0), 0.0);
    }

    #[test]
    fn test_input_json_field_names() {
        let input: ProfitabilityInput = serde_json::from_str(
            r#"{"salePrice": 10, "cargoPrice": 2, "includeVatDeduction": true}"#,
        )
        .unwrap();
        assert_eq!(input.sale_price, 10.0);
        assert_eq!(input.cargo_price, 2.0);
        assert!(input.include_vat_deduction);
        assert_eq!(input.vat_percent, 0.0);
    }
}
