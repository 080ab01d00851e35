// ==========================================
// 佣金费率系统 - 佣金表更新命令
// ==========================================
// 用法: commission-update --site trendyol --pdf komisyon.pdf --backup
// 输出: 成功时 stdout 打印 JSON 摘要；失败时 stderr 打印 JSON 错误并以 1 退出
// ==========================================

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};
use marketplace_commissions::importer::ImportError;
use marketplace_commissions::{
    logging, AppConfig, CommissionImporter, EnginePreference, SourceDocument, UpdateRequest,
};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "commission-update",
    version,
    about = "提取平台佣金表（PDF / Excel / CSV）并发布为规范 CSV"
)]
#[command(group(ArgGroup::new("input").required(true).args(["pdf", "excel"])))]
struct UpdateCli {
    /// 平台标识（trendyol / hepsiburada / n11 / amazon / ciceksepeti / pttavm）
    #[arg(long)]
    site: String,

    /// PDF 佣金表
    #[arg(long, value_name = "PATH")]
    pdf: Option<PathBuf>,

    /// Excel 佣金表（也接受 .csv 导出）
    #[arg(long, value_name = "PATH")]
    excel: Option<PathBuf>,

    /// 工作表名称（仅 Excel）
    #[arg(long, requires = "excel")]
    sheet: Option<String>,

    /// 页码范围，如 "1-3,7,10-12"（仅 PDF）
    #[arg(long, requires = "pdf")]
    page_range: Option<String>,

    /// 提取引擎: auto / pdftotext / lopdf / pdf-extract
    #[arg(long, default_value = "auto")]
    prefer: EnginePreference,

    /// 覆盖前备份已有 CSV
    #[arg(long)]
    backup: bool,

    /// 保留中间产物
    #[arg(long)]
    keep_temp: bool,

    /// 输出路径（缺省为平台的规范 CSV）
    #[arg(long, value_name = "PATH")]
    out_csv: Option<PathBuf>,

    /// JSON 配置文件
    #[arg(long, env = "COMMISSION_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// 只提取与规范化，不写文件
    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl UpdateCli {
    fn document(&self) -> Result<SourceDocument, ImportError> {
        match (&self.pdf, &self.excel) {
            (Some(pdf), _) => Ok(SourceDocument::Pdf(pdf.clone())),
            (None, Some(excel)) => SourceDocument::from_path(excel.clone(), self.sheet.clone()),
            (None, None) => Err(ImportError::InternalError("缺少输入文件".to_string())),
        }
    }

    fn request(&self) -> Result<UpdateRequest, ImportError> {
        let mut request = UpdateRequest::new(self.site.trim().to_lowercase(), self.document()?);
        request.preference = self.prefer;
        request.page_range = self.page_range.clone();
        request.out_csv = self.out_csv.clone();
        request.backup = self.backup;
        request.keep_temp = self.keep_temp;
        request.dry_run = self.dry_run;
        Ok(request)
    }
}

fn run(cli: &UpdateCli) -> Result<String, ImportError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let importer = CommissionImporter::from_config(config);
    let summary = importer.run(&cli.request()?)?;
    let text = serde_json::to_string_pretty(&summary).context("序列化更新摘要失败")?;
    Ok(text)
}

fn main() -> ExitCode {
    let cli = UpdateCli::parse();

    match cli.log_format {
        LogFormat::Text => logging::init(),
        LogFormat::Json => logging::init_json(),
    }
    tracing::debug!(version = marketplace_commissions::VERSION, "启动佣金表更新");

    match run(&cli) {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "佣金表更新失败");
            let body = json!({ "error": { "kind": e.kind(), "message": e.to_string() } });
            eprintln!("{}", body);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        UpdateCli::command().debug_assert();
    }

    #[test]
    fn test_pdf_and_excel_are_exclusive() {
        let result = UpdateCli::try_parse_from([
            "commission-update",
            "--site",
            "n11",
            "--pdf",
            "a.pdf",
            "--excel",
            "a.xlsx",
        ]);
        assert!(result.is_err());

        let result = UpdateCli::try_parse_from(["commission-update", "--site", "n11"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_request_from_flags() {
        let cli = UpdateCli::try_parse_from([
            "commission-update",
            "--site",
            " Trendyol ",
            "--pdf",
            "komisyon.pdf",
            "--page-range",
            "1-3",
            "--prefer",
            "lopdf",
            "--backup",
            "--dry-run",
        ])
        .unwrap();
        let request = cli.request().unwrap();
        assert_eq!(request.site, "trendyol");
        assert_eq!(request.page_range.as_deref(), Some("1-3"));
        assert!(request.backup);
        assert!(request.dry_run);
        assert!(matches!(request.document, SourceDocument::Pdf(_)));
        assert_ne!(request.preference, EnginePreference::Auto);
    }

    #[test]
    fn test_excel_extension_is_checked() {
        let cli = UpdateCli::try_parse_from([
            "commission-update",
            "--site",
            "n11",
            "--excel",
            "komisyon.txt",
        ])
        .unwrap();
        assert!(matches!(cli.request(), Err(ImportError::UnsupportedFormat(_))));
    }
}
