// ==========================================
// CRM 导入向导 - 文件解析器实现
// ==========================================
// 阶段 0: 上传文件读取与解析
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 输出: 表头 + 按列顺序排列的原始单元格
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::importer_trait::FileParser;
use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    /// 每行单元格与 headers 对齐（缺失补空串，多余截断）
    pub rows: Vec<Vec<String>>,
}

impl ParsedSheet {
    fn new(headers: Vec<String>) -> ImportResult<Self> {
        validate_headers(&headers)?;
        Ok(Self {
            headers,
            rows: Vec::new(),
        })
    }

    fn push_row(&mut self, cells: impl Iterator<Item = String>) {
        let mut row: Vec<String> = cells
            .take(self.headers.len())
            .map(|v| v.trim().to_string())
            .collect();
        row.resize(self.headers.len(), String::new());

        // 跳过完全空白的行
        if row.iter().all(|v| v.is_empty()) {
            return;
        }
        self.rows.push(row);
    }
}

/// 表头校验：非空、不重复（列路径以表头为键）
fn validate_headers(headers: &[String]) -> ImportResult<()> {
    if headers.is_empty() {
        return Err(ImportError::InvalidHeader("file has no header row".to_string()));
    }

    let mut seen = HashSet::new();
    for (idx, header) in headers.iter().enumerate() {
        if header.is_empty() {
            return Err(ImportError::InvalidHeader(format!(
                "column {} has an empty header",
                idx + 1
            )));
        }
        if !seen.insert(header.as_str()) {
            return Err(ImportError::InvalidHeader(format!(
                "duplicate header: {}",
                header
            )));
        }
    }
    Ok(())
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl FileParser for CsvParser {
    fn parse(&self, file_path: &Path) -> ImportResult<ParsedSheet> {
        ensure_exists(file_path)?;

        // 检查扩展名
        if let Some(ext) = file_path.extension() {
            if !ext.eq_ignore_ascii_case("csv") {
                return Err(ImportError::UnsupportedFormat(
                    ext.to_string_lossy().to_string(),
                ));
            }
        }

        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        // 读取表头（去掉 UTF-8 BOM）
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let mut sheet = ParsedSheet::new(headers)?;
        for result in reader.records() {
            let record = result?;
            sheet.push_row(record.iter().map(str::to_string));
        }

        Ok(sheet)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse(&self, file_path: &Path) -> ImportResult<ParsedSheet> {
        ensure_exists(file_path)?;

        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("workbook has no sheets".to_string()))?;

        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::InvalidHeader("file has no header row".to_string()))?;

        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        let mut sheet = ParsedSheet::new(headers)?;
        for data_row in rows {
            sheet.push_row(data_row.iter().map(|cell| cell.to_string()));
        }

        Ok(sheet)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn parse(&self, file_path: &Path) -> ImportResult<ParsedSheet> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "csv" => CsvParser.parse(file_path),
            "xlsx" | "xls" => ExcelParser.parse(file_path),
            _ => Err(ImportError::UnsupportedFormat(ext)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn csv_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut temp_file = Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(temp_file, "{}", line).unwrap();
        }
        temp_file
    }

    #[test]
    fn test_csv_parser_valid_file() {
        let temp_file = csv_file(&["Name,Email", "Ada,ada@example.com", "Grace,grace@example.com"]);

        let sheet = CsvParser.parse(temp_file.path()).unwrap();

        assert_eq!(sheet.headers, vec!["Name", "Email"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0], vec!["Ada", "ada@example.com"]);
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.parse(Path::new("non_existent.csv"));
        assert!(matches!(result, Err(ImportError::FileNotFound(_))));
    }

    #[test]
    fn test_csv_parser_skip_empty_rows_and_pad_short_rows() {
        let temp_file = csv_file(&["Name,Email,Phone", "Ada,ada@example.com", ",,", "Grace"]);

        let sheet = CsvParser.parse(temp_file.path()).unwrap();

        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0], vec!["Ada", "ada@example.com", ""]);
        assert_eq!(sheet.rows[1], vec!["Grace", "", ""]);
    }

    #[test]
    fn test_csv_parser_rejects_duplicate_headers() {
        let temp_file = csv_file(&["Name,Name", "a,b"]);
        let result = CsvParser.parse(temp_file.path());
        assert!(matches!(result, Err(ImportError::InvalidHeader(_))));
    }

    #[test]
    fn test_universal_parser_unsupported_extension() {
        let result = UniversalFileParser.parse(Path::new("contacts.pdf"));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
