// ==========================================
// 佣金表导入管线集成测试
// ==========================================
// 测试目标: 源文档 → 规范 CSV → 索引查询 的完整流程
// ==========================================


use marketplace_commissions::config::SiteRegistry;
use marketplace_commissions::domain::EngineKind;
use marketplace_commissions::importer::{
    ImportError, ImportResult, PageText, PdfEngine, Publisher, TableExtractor,
};
use marketplace_commissions::{
    logging, AppConfig, CommissionImporter, EnginePreference, MarketplaceIndex, SourceDocument,
    UpdateRequest,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use test_helpers::{TestWorkspace, CANONICAL_HEADER};

/// 返回固定版面文本的引擎
struct FixedTextEngine {
    pages: Vec<&'static str>,
}

impl PdfEngine for FixedTextEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Pdftotext
    }

    fn extract_pages(&self, _path: &Path, pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
        Ok(self
            .pages
            .iter()
            .enumerate()
            .map(|(i, text)| (i as u32 + 1, text.to_string()))
            .filter(|(page, _)| pages.map_or(true, |set| set.contains(page)))
            .collect())
    }
}

struct MissingEngine(EngineKind);

impl PdfEngine for MissingEngine {
    fn kind(&self) -> EngineKind {
        self.0
    }

    fn extract_pages(&self, _path: &Path, _pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
        Err(ImportError::EngineUnavailable {
            engine: self.0.to_string(),
            reason: "not installed".to_string(),
        })
    }
}

fn importer_with(config: &AppConfig, engines: Vec<Box<dyn PdfEngine>>) -> CommissionImporter<AppConfig> {
    let publisher = Publisher::new(config.backup_dir(), config.tmp_dir());
    CommissionImporter::new(
        config.clone(),
        TableExtractor::with_engines(engines),
        publisher,
        config.header_scan_rows,
    )
}

const TRENDYOL_PAGE_1: &str = "Trendyol Komisyon Oranları\n\n\
Kategori       Alt Kategori     Ürün Grubu                      Komisyon_%_KDV_Dahil\n\
Elektronik     Telefon          Kılıf, Şarj Aleti               %15,5\n\
\x20              Aksesuar         Kulaklık (Kablolu, Kablosuz)    %12\n\
\x20                               Ekran Koruyucu                  %9\n\
Kategori       Alt Kategori     Ürün Grubu                      Komisyon_%_KDV_Dahil\n\
Kitap          Roman            Yabancı Roman                   %10\n";

const TRENDYOL_PAGE_2: &str = "\
Kitap          Roman            Yerli Roman                     bilinmiyor\n\
Kitap          Roman            Klasik                          11\n";

#[test]
fn test_spreadsheet_csv_to_index() {
    logging::init_test();
    let ws = TestWorkspace::new();
    let source = ws.write_source(
        "hepsiburada.csv",
        &[
            "Ürün Grubu,Kategori,Alt Kategori,Komisyon(%)",
            "Tava,Ev,Mutfak,\"12,5\"",
            "Tencere,Ev,Mutfak,%14",
            "Havlu,Ev,Banyo,",
            ",,,",
        ],
    );

    let importer = CommissionImporter::from_config(ws.config.clone());
    let document = SourceDocument::from_path(&source, None).unwrap();
    let summary = importer
        .run(&UpdateRequest::new("hepsiburada", document))
        .expect("update should succeed");

    assert_eq!(summary.site, "hepsiburada");
    assert_eq!(summary.engine_used, "csv");
    assert_eq!(summary.rows_written, 2);
    assert_eq!(summary.rejected_count, 1);
    assert_eq!(summary.csv_path, ws.csv_path("hepsiburada"));
    assert!(summary.backup_path.is_none());

    let written = fs::read_to_string(ws.csv_path("hepsiburada")).unwrap();
    let mut lines = written.lines();
    assert_eq!(lines.next(), Some(CANONICAL_HEADER));
    assert_eq!(lines.next(), Some("Ev,Mutfak,Tava,12.5"));

    let index = MarketplaceIndex::new(&ws.config);
    let snapshot = index.get("hepsiburada").unwrap();
    assert_eq!(snapshot.rate("ev", "MUTFAK", "tava"), Some(12.5));
    assert_eq!(snapshot.rate("Ev", "Mutfak", "Tencere"), Some(14.0));
    assert_eq!(snapshot.record_count(), 2);
}

#[test]
fn test_pdf_pages_with_split_and_forward_fill() {
    logging::init_test();
    let ws = TestWorkspace::new();
    let pdf = ws.write_source("trendyol.pdf", &["%PDF-1.4"]);

    let importer = importer_with(
        &ws.config,
        vec![Box::new(FixedTextEngine {
            pages: vec![TRENDYOL_PAGE_1, TRENDYOL_PAGE_2],
        })],
    );
    let summary = importer
        .run(&UpdateRequest::new("trendyol", SourceDocument::Pdf(pdf)))
        .expect("update should succeed");

    assert_eq!(summary.engine_used, "pdftotext");
    assert_eq!(summary.rows_written, 6);
    assert_eq!(summary.rejected_count, 1);
    assert_eq!(summary.repeated_headers, 1);

    let index = MarketplaceIndex::new(&ws.config);
    let snapshot = index.get("trendyol").unwrap();
    assert_eq!(snapshot.rate("Elektronik", "Telefon", "Kılıf"), Some(15.5));
    assert_eq!(snapshot.rate("Elektronik", "Telefon", "Şarj Aleti"), Some(15.5));
    assert_eq!(
        snapshot.rate("Elektronik", "Aksesuar", "Kulaklık (Kablolu, Kablosuz)"),
        Some(12.0)
    );
    // 类目与子类目均为合并单元格
    assert_eq!(
        snapshot.rate("Elektronik", "Aksesuar", "Ekran Koruyucu"),
        Some(9.0)
    );
    assert_eq!(snapshot.rate("Kitap", "Roman", "Yabancı Roman"), Some(10.0));
    assert_eq!(snapshot.rate("Kitap", "Roman", "Klasik"), Some(11.0));
    assert_eq!(snapshot.rate("Kitap", "Roman", "Yerli Roman"), None);
}

#[test]
fn test_page_range_limits_pages() {
    let ws = TestWorkspace::new();
    let pdf = ws.write_source("trendyol.pdf", &["%PDF-1.4"]);
    let importer = importer_with(
        &ws.config,
        vec![Box::new(FixedTextEngine {
            pages: vec![TRENDYOL_PAGE_1, TRENDYOL_PAGE_2],
        })],
    );

    let mut request = UpdateRequest::new("trendyol", SourceDocument::Pdf(pdf));
    request.page_range = Some("2".to_string());
    let summary = importer.run(&request).unwrap();
    assert_eq!(summary.rows_written, 1);

    request.page_range = Some("3-1".to_string());
    assert!(matches!(
        importer.run(&request),
        Err(ImportError::RangeSyntax { .. })
    ));
}

#[test]
fn test_engine_fallback_and_exhaustion() {
    let ws = TestWorkspace::new();
    let pdf = ws.write_source("trendyol.pdf", &["%PDF-1.4"]);

    // pdftotext 缺失时回退到下一个引擎
    struct LopdfText;
    impl PdfEngine for LopdfText {
        fn kind(&self) -> EngineKind {
            EngineKind::Lopdf
        }
        fn extract_pages(&self, _: &Path, _: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
            Ok(vec![(1, TRENDYOL_PAGE_2.to_string())])
        }
    }
    let importer = importer_with(
        &ws.config,
        vec![Box::new(MissingEngine(EngineKind::Pdftotext)), Box::new(LopdfText)],
    );
    let summary = importer
        .run(&UpdateRequest::new("trendyol", SourceDocument::Pdf(pdf.clone())))
        .unwrap();
    assert_eq!(summary.engine_used, "lopdf");

    // 全部不可用
    let importer = importer_with(
        &ws.config,
        vec![
            Box::new(MissingEngine(EngineKind::Pdftotext)),
            Box::new(MissingEngine(EngineKind::Lopdf)),
        ],
    );
    let err = importer
        .run(&UpdateRequest::new("trendyol", SourceDocument::Pdf(pdf.clone())))
        .unwrap_err();
    assert_eq!(err.kind(), "extraction");

    // 指定单一引擎时返回该引擎自身的错误
    let mut request = UpdateRequest::new("trendyol", SourceDocument::Pdf(pdf));
    request.preference = EnginePreference::Only(EngineKind::Lopdf);
    let err = importer.run(&request).unwrap_err();
    assert_eq!(err.kind(), "engine_unavailable");
}

#[test]
fn test_backup_and_dry_run() {
    let ws = TestWorkspace::new();
    let source = ws.write_source(
        "amazon.csv",
        &[
            "Category,SubCategory,ProductGroup,CommissionPercentVatInclusive",
            "Kitap,Kitap,Roman,10",
        ],
    );
    let importer = CommissionImporter::from_config(ws.config.clone());
    let document = SourceDocument::from_path(&source, None).unwrap();

    let mut request = UpdateRequest::new("amazon", document);
    request.backup = true;
    let first = importer.run(&request).unwrap();
    assert!(first.backup_path.is_none());

    let second = importer.run(&request).unwrap();
    let backup = second.backup_path.expect("second publish should back up");
    assert!(backup.exists());
    assert!(backup.starts_with(ws.config.backup_dir()));

    // dry-run 不触碰目标文件
    let target = ws.csv_path("amazon");
    fs::write(&target, format!("{}\nKitap,Kitap,Roman,99\n", CANONICAL_HEADER)).unwrap();
    request.dry_run = true;
    request.backup = false;
    let dry = importer.run(&request).unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.rows_written, 0);
    assert!(fs::read_to_string(&target).unwrap().contains(",99"));
}

#[test]
fn test_keep_temp_writes_scratch_artifacts() {
    let ws = TestWorkspace::new();
    let source = ws.write_source(
        "pttavm.csv",
        &["Kategori,Alt Kategori,Ürün Grubu,Komisyon Oranları", "Ev,Mutfak,Tava,12"],
    );
    let importer = CommissionImporter::from_config(ws.config.clone());
    let mut request = UpdateRequest::new(
        "pttavm",
        SourceDocument::from_path(&source, None).unwrap(),
    );
    request.keep_temp = true;

    let summary = importer.run(&request).unwrap();
    let scratch = summary.scratch_dir.expect("scratch dir expected");
    assert!(scratch.starts_with(ws.config.tmp_dir()));
    assert!(scratch.join("normalized.csv").exists());
    assert!(scratch.join("engine_meta.json").exists());
}

#[test]
fn test_invalid_workbook_is_reported() {
    let ws = TestWorkspace::new();
    let source = ws.write_source("n11.xlsx", &["not a workbook"]);
    let importer = CommissionImporter::from_config(ws.config.clone());
    let request = UpdateRequest::new("n11", SourceDocument::from_path(&source, None).unwrap());
    let err = importer.run(&request).unwrap_err();
    // 文件不是有效工作簿时在打开阶段失败
    assert_eq!(err.kind(), "excel_parse");
}

#[test]
fn test_missing_rate_column_is_reported() {
    let ws = TestWorkspace::new();
    let source = ws.write_source(
        "amazon.csv",
        &["Kategori,Ürün Grubu,Not", "Kitap,Roman,x"],
    );
    let importer = CommissionImporter::from_config(ws.config.clone());
    let request = UpdateRequest::new("amazon", SourceDocument::from_path(&source, None).unwrap());
    let err = importer.run(&request).unwrap_err();
    assert!(matches!(err, ImportError::ColumnNotFound { .. }));
    assert!(!ws.config.csv_path("amazon").unwrap().exists());
}
