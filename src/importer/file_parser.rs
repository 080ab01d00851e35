// ==========================================
// 佣金费率系统 - 表格提取器
// ==========================================
// 职责: 源文档 → RawTable（字符串网格，按页/工作表分段）
// 支持: PDF（多引擎回退）/ Excel (.xlsx/.xlsm/.xls/.ods) / CSV
// ==========================================

use crate::domain::{EnginePreference, RawRow, RawTable, TableSegment};
use crate::importer::engines::{default_engines, PdfEngine};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::page_range::parse_page_range;
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use regex::Regex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

fn wide_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{3,}").expect("valid gap regex"))
}

fn narrow_gap_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s{2,}").expect("valid gap regex"))
}

// ==========================================
// SourceDocument - 待提取的源文档
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDocument {
    Pdf(PathBuf),
    /// 电子表格（或 CSV），sheet 为空时读取第一个工作表
    Spreadsheet { path: PathBuf, sheet: Option<String> },
}

impl SourceDocument {
    pub fn path(&self) -> &Path {
        match self {
            SourceDocument::Pdf(path) => path,
            SourceDocument::Spreadsheet { path, .. } => path,
        }
    }

    /// 按扩展名判断文档类型
    pub fn from_path(path: impl Into<PathBuf>, sheet: Option<String>) -> ImportResult<Self> {
        let path = path.into();
        let ext = extension_of(&path);
        if ext == "pdf" {
            Ok(SourceDocument::Pdf(path))
        } else if ext == "csv" || SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
            Ok(SourceDocument::Spreadsheet { path, sheet })
        } else {
            Err(ImportError::UnsupportedFormat(ext))
        }
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ==========================================
// TableExtractor - 表格提取器
// ==========================================
pub struct TableExtractor {
    engines: Vec<Box<dyn PdfEngine>>,
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TableExtractor {
    /// 使用默认引擎集合（pdftotext → lopdf → pdf-extract）
    pub fn new() -> Self {
        Self::with_engines(default_engines())
    }

    pub fn with_engines(engines: Vec<Box<dyn PdfEngine>>) -> Self {
        Self { engines }
    }

    /// 提取源文档中的表格
    ///
    /// # 参数
    /// - document: 源文档
    /// - preference: 引擎偏好（仅 PDF 生效）
    /// - page_range: 页码范围（仅 PDF 生效）
    ///
    /// # 返回
    /// - RawTable: 至少包含一个非空片段
    #[instrument(skip(self, document), fields(path = %document.path().display()))]
    pub fn extract(
        &self,
        document: &SourceDocument,
        preference: EnginePreference,
        page_range: Option<&str>,
    ) -> ImportResult<RawTable> {
        let path = document.path();
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        match document {
            SourceDocument::Pdf(path) => self.extract_pdf(path, preference, page_range),
            SourceDocument::Spreadsheet { path, sheet } => {
                if page_range.is_some() {
                    warn!("电子表格输入忽略页码范围");
                }
                read_spreadsheet(path, sheet.as_deref())
            }
        }
    }

    fn extract_pdf(
        &self,
        path: &Path,
        preference: EnginePreference,
        page_range: Option<&str>,
    ) -> ImportResult<RawTable> {
        let pages = page_range.map(parse_page_range).transpose()?;
        let mut attempts = Vec::new();

        for kind in preference.candidates() {
            let Some(engine) = self.engines.iter().find(|e| e.kind() == kind) else {
                attempts.push(format!("{}: 未注册", kind));
                continue;
            };

            match engine.extract_pages(path, pages.as_ref()) {
                Ok(page_texts) => {
                    if let Some(set) = &pages {
                        if page_texts.len() < set.len() {
                            debug!(
                                engine = %kind,
                                requested = set.len(),
                                returned = page_texts.len(),
                                "部分页码超出文档范围或无文本"
                            );
                        }
                    }
                    let segments: Vec<TableSegment> = page_texts
                        .into_iter()
                        .map(|(page, text)| {
                            TableSegment::new(format!("page {}", page), layout_text_to_rows(&text))
                        })
                        .filter(|s| !s.is_empty())
                        .collect();

                    if segments.is_empty() {
                        info!(engine = %kind, "引擎返回空结果");
                        attempts.push(format!("{}: 空结果", kind));
                        continue;
                    }

                    info!(
                        engine = %kind,
                        segments = segments.len(),
                        "PDF 表格提取成功"
                    );
                    return Ok(RawTable::new(path.to_path_buf(), kind.as_str(), segments));
                }
                Err(e) => {
                    warn!(engine = %kind, error = %e, "提取引擎失败");
                    // 指定单一引擎时直接返回该引擎的错误
                    if matches!(preference, EnginePreference::Only(_)) {
                        return Err(e);
                    }
                    attempts.push(format!("{}: {}", kind, e));
                }
            }
        }

        Err(ImportError::Extraction {
            reason: if attempts.is_empty() {
                "没有可用的提取引擎".to_string()
            } else {
                attempts.join("; ")
            },
        })
    }
}

// ==========================================
// 版面文本 → 行
// ==========================================

/// 把保留版面的文本行切分为单元格
///
/// # 规则
/// 1. 含 '|' → 按竖线切分（去掉首尾空单元格）
/// 2. 含制表符 → 按制表符切分
/// 3. 否则按 3 个以上空白切分（行首缩进 3 个以上时补一个空首列）；只得到一列时退回 2 个以上空白
pub fn split_layout_line(line: &str) -> RawRow {
    if line.trim().is_empty() {
        return Vec::new();
    }

    if line.contains('|') {
        let mut cells: Vec<String> = line.split('|').map(|c| c.trim().to_string()).collect();
        if cells.first().is_some_and(|c| c.is_empty()) {
            cells.remove(0);
        }
        if cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
        return cells;
    }

    if line.contains('\t') {
        return line.split('\t').map(|c| c.trim().to_string()).collect();
    }

    let trimmed = line.trim();
    let mut wide: Vec<String> = wide_gap_re()
        .split(trimmed)
        .map(|c| c.trim().to_string())
        .collect();
    if wide.len() > 1 {
        // 行首缩进代表合并单元格留空的首列
        let indent = line.len() - line.trim_start().len();
        if indent >= 3 {
            wide.insert(0, String::new());
        }
        return wide;
    }
    narrow_gap_re()
        .split(trimmed)
        .map(|c| c.trim().to_string())
        .collect()
}

/// 整页文本 → 行（跳过空行）
///
/// 行首缩进的行按最近一条完整行的列起点对齐，
/// 因而类目与子类目同时留空（合并单元格）时各自补为空列
pub fn layout_text_to_rows(text: &str) -> Vec<RawRow> {
    let mut columns: Vec<usize> = Vec::new();
    let mut rows = Vec::new();

    for line in text.lines() {
        let row = split_layout_line(line);
        if row.iter().all(|c| c.is_empty()) {
            continue;
        }
        if line.contains('|') || line.contains('\t') {
            rows.push(row);
            continue;
        }

        let cells = positioned_cells(line);
        let indent = line.len() - line.trim_start().len();
        if cells.len() > 1 && cells.len() >= columns.len() {
            columns = cells.iter().map(|(col, _)| *col).collect();
        } else if indent >= 3 {
            if let Some(aligned) = align_to_columns(&cells, &columns) {
                rows.push(aligned);
                continue;
            }
        }
        rows.push(row);
    }
    rows
}

/// 按宽间隔切分并记录每个单元格的起始字符列
fn positioned_cells(line: &str) -> Vec<(usize, String)> {
    let mut cells = Vec::new();
    let mut last = 0;
    let gaps = wide_gap_re()
        .find_iter(line)
        .map(|m| (m.start(), m.end()))
        .chain(std::iter::once((line.len(), line.len())));

    for (gap_start, gap_end) in gaps {
        let segment = &line[last..gap_start];
        let text = segment.trim();
        if !text.is_empty() {
            let lead = segment.len() - segment.trim_start().len();
            cells.push((line[..last + lead].chars().count(), text.to_string()));
        }
        last = gap_end;
    }
    cells
}

/// 把单元格放到起点最近的列（保持从左到右的顺序）
///
/// # 返回
/// - None: 没有列起点，或单元格数不少于列数
fn align_to_columns(cells: &[(usize, String)], columns: &[usize]) -> Option<RawRow> {
    if cells.is_empty() || cells.len() >= columns.len() {
        return None;
    }

    let mut row = vec![String::new(); columns.len()];
    let mut next = 0;
    for (i, (start, text)) in cells.iter().enumerate() {
        // 后面还有 remaining 个单元格需要各占一列
        let remaining = cells.len() - i - 1;
        let last_allowed = columns.len() - 1 - remaining;
        let target = (next..=last_allowed)
            .min_by_key(|idx| columns[*idx].abs_diff(*start))
            .unwrap_or(next);
        row[target] = text.clone();
        next = target + 1;
    }
    Some(row)
}

// ==========================================
// 电子表格读取
// ==========================================

/// 选择工作表: 精确匹配 → 忽略大小写匹配；未指定时取第一个
///
/// # 返回
/// - Err(SheetNotFound): 指定的工作表不存在
pub fn select_sheet(names: &[String], wanted: Option<&str>) -> ImportResult<String> {
    match wanted {
        Some(wanted) => {
            let target = wanted.trim();
            names
                .iter()
                .find(|n| n.as_str() == target)
                .or_else(|| names.iter().find(|n| n.trim().eq_ignore_ascii_case(target)))
                .cloned()
                .ok_or_else(|| ImportError::SheetNotFound {
                    sheet: target.to_string(),
                    available: names.join(", "),
                })
        }
        None => names
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("工作簿中没有工作表".to_string())),
    }
}

fn read_spreadsheet(path: &Path, sheet: Option<&str>) -> ImportResult<RawTable> {
    let ext = extension_of(path);

    let segment = if ext == "csv" {
        TableSegment::new("csv", read_csv_rows(path)?)
    } else if SPREADSHEET_EXTENSIONS.contains(&ext.as_str()) {
        let mut workbook = open_workbook_auto(path)?;
        let names = workbook.sheet_names().to_vec();
        let sheet_name = select_sheet(&names, sheet)?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let rows: Vec<RawRow> = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect())
            .collect();
        TableSegment::new(format!("sheet {}", sheet_name), rows)
    } else {
        return Err(ImportError::UnsupportedFormat(ext));
    };

    if segment.is_empty() {
        return Err(ImportError::Extraction {
            reason: format!("{} 中没有数据", segment.label),
        });
    }

    info!(segment = %segment.label, rows = segment.rows.len(), "电子表格读取完成");
    let engine = if ext == "csv" { "csv" } else { "calamine" };
    Ok(RawTable::new(path.to_path_buf(), engine, vec![segment]))
}

fn read_csv_rows(path: &Path) -> ImportResult<Vec<RawRow>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result?;
        let mut row: RawRow = record.iter().map(|v| v.trim().to_string()).collect();
        if idx == 0 {
            if let Some(first) = row.first_mut() {
                *first = first.trim_start_matches('\u{feff}').to_string();
            }
        }
        rows.push(row);
    }
    Ok(rows)
}
