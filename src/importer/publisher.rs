// ==========================================
// 佣金费率系统 - 规范 CSV 发布器
// ==========================================
// 职责: 原子替换规范 CSV / 可选备份 / 可选保留中间产物
// 流程: 同目录临时文件写入 → fsync → 备份旧文件 → rename 覆盖
// 红线: 读者任何时刻只能看到完整的旧文件或完整的新文件
// ==========================================

use crate::domain::{CanonicalRecord, RawTable, CANONICAL_HEADERS};
use crate::importer::error::{ImportError, ImportResult};
use chrono::Local;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 同一秒内重复备份时的最大尝试次数
const MAX_BACKUP_ATTEMPTS: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// 覆盖前复制旧文件到备份目录
    pub backup: bool,
    /// 保留中间产物（原始片段、规范化结果、引擎元数据）
    pub keep_temp: bool,
}

/// 一次发布的输入
pub struct PublishBatch<'a> {
    pub site: &'a str,
    pub records: &'a [CanonicalRecord],
    pub rejected_count: usize,
    /// 原始表格（仅 keep_temp 时写出）
    pub raw_table: Option<&'a RawTable>,
    /// 写入 engine_meta.json 的附加信息
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub csv_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub rows_written: usize,
    pub rejected_count: usize,
    pub scratch_dir: Option<PathBuf>,
}

// ==========================================
// Publisher - 发布器
// ==========================================
pub struct Publisher {
    backup_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl Publisher {
    pub fn new(backup_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            tmp_dir: tmp_dir.into(),
        }
    }

    /// 发布规范 CSV
    ///
    /// # 参数
    /// - batch: 待发布的记录与元数据
    /// - target: 目标 CSV 路径
    /// - options: 备份 / 保留中间产物
    ///
    /// # 返回
    /// - Err(Publish): 记录为空、临时文件写入失败、备份失败或替换失败；此时目标文件保持原样
    #[instrument(skip(self, batch), fields(site = %batch.site, rows = batch.records.len()))]
    pub fn publish(
        &self,
        batch: &PublishBatch<'_>,
        target: &Path,
        options: PublishOptions,
    ) -> ImportResult<PublishResult> {
        if batch.records.is_empty() {
            return Err(ImportError::Publish("没有可发布的记录，保留现有文件".to_string()));
        }

        let scratch_dir = if options.keep_temp {
            Some(self.write_scratch(batch)?)
        } else {
            None
        };

        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| publish_error("创建目标目录", &parent, e))?;

        // 临时文件与目标同目录，保证 rename 不跨文件系统
        let mut staged = tempfile::Builder::new()
            .prefix(".commissions-")
            .suffix(".csv.tmp")
            .tempfile_in(&parent)
            .map_err(|e| publish_error("创建临时文件", &parent, e))?;
        write_canonical_csv(staged.as_file_mut(), batch.records)?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| publish_error("同步临时文件", staged.path(), e))?;

        let backup_path = if options.backup && target.exists() {
            Some(self.backup_existing(target)?)
        } else {
            None
        };

        staged
            .persist(target)
            .map_err(|e| publish_error("替换目标文件", target, e.error))?;

        info!(
            target = %target.display(),
            rows = batch.records.len(),
            rejected = batch.rejected_count,
            backup = ?backup_path,
            "规范 CSV 已发布"
        );

        Ok(PublishResult {
            csv_path: target.to_path_buf(),
            backup_path,
            rows_written: batch.records.len(),
            rejected_count: batch.rejected_count,
            scratch_dir,
        })
    }

    /// 写出中间产物到 <tmp_dir>/<site>_<时间戳>_<短 id>/
    ///
    /// # 内容
    /// - segment_NN.csv: 每个原始片段
    /// - normalized.csv: 规范化后的记录
    /// - engine_meta.json: 引擎与统计信息
    pub fn write_scratch(&self, batch: &PublishBatch<'_>) -> ImportResult<PathBuf> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let short_id = Uuid::new_v4().simple().to_string();
        let dir = self
            .tmp_dir
            .join(format!("{}_{}_{}", batch.site, stamp, &short_id[..8]));
        fs::create_dir_all(&dir).map_err(|e| publish_error("创建临时目录", &dir, e))?;

        if let Some(raw) = batch.raw_table {
            for (idx, segment) in raw.segments.iter().enumerate() {
                let path = dir.join(format!("segment_{:02}.csv", idx + 1));
                let file = File::create(&path).map_err(|e| publish_error("写入原始片段", &path, e))?;
                let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
                for row in &segment.rows {
                    writer.write_record(row)?;
                }
                writer.flush()?;
            }
        }

        let normalized = dir.join("normalized.csv");
        let file = File::create(&normalized).map_err(|e| publish_error("写入规范化结果", &normalized, e))?;
        write_canonical_csv(file, batch.records)?;

        let mut meta = serde_json::json!({
            "site": batch.site,
            "engine_used": batch.raw_table.map(|r| r.engine_used.clone()),
            "source": batch.raw_table.map(|r| r.source.display().to_string()),
            "segments": batch.raw_table.map(|r| {
                r.segments.iter().map(|s| serde_json::json!({
                    "label": s.label,
                    "rows": s.rows.len(),
                })).collect::<Vec<_>>()
            }),
            "record_count": batch.records.len(),
            "rejected_count": batch.rejected_count,
            "created_at": Local::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION"),
        });
        if let (Some(target), serde_json::Value::Object(extra)) = (meta.as_object_mut(), &batch.meta) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }
        let meta_path = dir.join("engine_meta.json");
        let meta_text = serde_json::to_string_pretty(&meta)
            .map_err(|e| ImportError::InternalError(e.to_string()))?;
        fs::write(&meta_path, meta_text).map_err(|e| publish_error("写入引擎元数据", &meta_path, e))?;

        debug!(dir = %dir.display(), "中间产物已保留");
        Ok(dir)
    }

    /// 复制旧文件到备份目录（只新建，从不覆盖已有备份）
    fn backup_existing(&self, target: &Path) -> ImportResult<PathBuf> {
        fs::create_dir_all(&self.backup_dir)
            .map_err(|e| publish_error("创建备份目录", &self.backup_dir, e))?;
        let stamp = Local::now().format("%Y-%m-%d_%H%M%S").to_string();

        for attempt in 0..MAX_BACKUP_ATTEMPTS {
            let path = self.backup_dir.join(backup_file_name(target, &stamp, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut dest) => {
                    let mut source =
                        File::open(target).map_err(|e| publish_error("读取旧文件", target, e))?;
                    io::copy(&mut source, &mut dest).map_err(|e| publish_error("写入备份", &path, e))?;
                    dest.sync_all().map_err(|e| publish_error("同步备份", &path, e))?;
                    info!(backup = %path.display(), "旧文件已备份");
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(publish_error("创建备份文件", &path, e)),
            }
        }

        warn!(target = %target.display(), "备份文件名全部被占用");
        Err(ImportError::Publish(format!(
            "无法为 {} 生成唯一的备份文件名",
            target.display()
        )))
    }
}

/// 备份文件名: {stem}_{YYYY-MM-DD_HHMMSS}[_{n}]{.ext}
pub fn backup_file_name(target: &Path, stamp: &str, attempt: usize) -> String {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "commissions".to_string());
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    if attempt == 0 {
        format!("{}_{}{}", stem, stamp, ext)
    } else {
        format!("{}_{}_{}{}", stem, stamp, attempt, ext)
    }
}

/// 以规范表头写出记录
pub fn write_canonical_csv<W: Write>(writer: W, records: &[CanonicalRecord]) -> ImportResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CANONICAL_HEADERS)?;
    for record in records {
        csv_writer.write_record(record.to_csv_fields())?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn publish_error(action: &str, path: &Path, err: io::Error) -> ImportError {
    ImportError::Publish(format!("{}失败 ({}): {}", action, path.display(), err))
}
