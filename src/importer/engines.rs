// ==========================================
// 佣金费率系统 - PDF 提取引擎
// ==========================================
// 职责: 把 PDF 页面转为纯文本（每页一段）
// 引擎: pdftotext（外部程序）/ lopdf（纯 Rust）/ pdf-extract（可选特性）
// 红线: 引擎内部 panic 必须被捕获并转为 EngineFailed
// ==========================================

use crate::domain::EngineKind;
use crate::importer::error::{ImportError, ImportResult};
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// 单页文本: (页码, 文本)，页码从 1 开始
pub type PageText = (u32, String);

// ==========================================
// PdfEngine Trait
// ==========================================
// 实现者: PdftotextEngine / LopdfEngine / PdfExtractEngine
// 测试中以 mock 实现替换
pub trait PdfEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// 提取页面文本
    ///
    /// # 参数
    /// - path: PDF 文件路径
    /// - pages: 仅提取这些页（None 表示全部）；超出文档范围的页码被忽略
    ///
    /// # 返回
    /// - Ok(Vec<PageText>): 按页码升序
    /// - Err(EngineUnavailable): 引擎未安装或未编译
    /// - Err(EngineFailed): 引擎运行失败
    fn extract_pages(&self, path: &Path, pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>>;
}

/// auto 顺序的默认引擎集合
pub fn default_engines() -> Vec<Box<dyn PdfEngine>> {
    vec![
        Box::new(PdftotextEngine),
        Box::new(LopdfEngine),
        Box::new(PdfExtractEngine),
    ]
}

fn wanted(pages: Option<&BTreeSet<u32>>, page: u32) -> bool {
    pages.map_or(true, |set| set.contains(&page))
}

fn failed(kind: EngineKind, reason: impl Into<String>) -> ImportError {
    ImportError::EngineFailed {
        engine: kind.to_string(),
        reason: reason.into(),
    }
}

/// 在 catch_unwind 中运行引擎，panic 转为 EngineFailed
fn guard_panic<T, F>(kind: EngineKind, f: F) -> ImportResult<T>
where
    F: FnOnce() -> ImportResult<T>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(engine = %kind, "提取引擎发生 panic（多为字体解析问题），视为失败");
            Err(failed(kind, "引擎内部 panic"))
        }
    }
}

// ==========================================
// PdftotextEngine - poppler-utils 外部程序
// ==========================================
// 命令: pdftotext -layout -enc UTF-8 [-f N -l M] <file> -
// 输出按换页符 \x0c 分页
pub struct PdftotextEngine;

impl PdfEngine for PdftotextEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Pdftotext
    }

    fn extract_pages(&self, path: &Path, pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
        which::which("pdftotext").map_err(|_| ImportError::EngineUnavailable {
            engine: self.kind().to_string(),
            reason: "未安装 pdftotext（poppler-utils）".to_string(),
        })?;

        let first_page = pages.and_then(|set| set.first().copied()).unwrap_or(1);
        let mut command = Command::new("pdftotext");
        command.args(["-layout", "-enc", "UTF-8"]);
        if let Some(set) = pages {
            if let (Some(first), Some(last)) = (set.first(), set.last()) {
                command.args(["-f", &first.to_string(), "-l", &last.to_string()]);
            }
        }
        command.arg(path).arg("-");

        let output = command
            .output()
            .map_err(|e| failed(self.kind(), format!("无法启动 pdftotext: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(
                self.kind(),
                format!(
                    "退出码 {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let mut result = Vec::new();
        for (offset, page_text) in text.split('\x0c').enumerate() {
            let page = first_page + offset as u32;
            if page_text.trim().is_empty() || !wanted(pages, page) {
                continue;
            }
            result.push((page, page_text.to_string()));
        }

        debug!(engine = "pdftotext", pages = result.len(), "页面文本提取完成");
        Ok(result)
    }
}

// ==========================================
// LopdfEngine - 纯 Rust 解析
// ==========================================
pub struct LopdfEngine;

impl PdfEngine for LopdfEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Lopdf
    }

    fn extract_pages(&self, path: &Path, pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
        let kind = self.kind();
        guard_panic(kind, || {
            let mut document = lopdf::Document::load(path)
                .map_err(|e| failed(kind, format!("PDF 加载失败: {}", e)))?;

            // 无口令加密的文档尝试空口令解密
            if document.is_encrypted() && document.decrypt("").is_err() {
                return Err(failed(kind, "无法解密受口令保护的 PDF"));
            }
            let () = document.decompress();

            let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
            page_numbers.sort_unstable();

            let mut result = Vec::new();
            for page in page_numbers.into_iter().filter(|p| wanted(pages, *p)) {
                match document.extract_text(&[page]) {
                    Ok(text) if !text.trim().is_empty() => result.push((page, text)),
                    Ok(_) => {}
                    Err(e) => {
                        debug!(engine = "lopdf", page = page, error = %e, "单页提取失败，跳过");
                    }
                }
            }
            Ok(result)
        })
    }
}

// ==========================================
// PdfExtractEngine - pdf-extract 库
// ==========================================
pub struct PdfExtractEngine;

impl PdfEngine for PdfExtractEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::PdfExtract
    }

    #[cfg(feature = "pdf_extract")]
    fn extract_pages(&self, path: &Path, pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
        let kind = self.kind();
        let bytes = std::fs::read(path)?;
        guard_panic(kind, || {
            let page_texts = pdf_extract::extract_text_from_mem_by_pages(&bytes)
                .map_err(|e| failed(kind, e.to_string()))?;

            Ok(page_texts
                .into_iter()
                .enumerate()
                .map(|(idx, text)| (idx as u32 + 1, text))
                .filter(|(page, text)| wanted(pages, *page) && !text.trim().is_empty())
                .collect())
        })
    }

    #[cfg(not(feature = "pdf_extract"))]
    fn extract_pages(&self, _path: &Path, _pages: Option<&BTreeSet<u32>>) -> ImportResult<Vec<PageText>> {
        Err(ImportError::EngineUnavailable {
            engine: self.kind().to_string(),
            reason: "编译时未启用 pdf_extract 特性".to_string(),
        })
    }
}
