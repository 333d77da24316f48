// ==========================================
// CRM 导入向导 - 日期 / 数字格式解析
// ==========================================
// 职责: 地区相关的文本表示 → 规范类型值（纯函数）
// 约定: 解析失败返回 None（不是错误），由校验器区分"缺失"与"无效"
// ==========================================

use crate::domain::types::{DateFormat, NumberFormat};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

// ==========================================
// DateFormat
// ==========================================
// 每种约定一组按顺序尝试的字面模式，首个命中即返回

const ISO_DATE_PATTERNS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];
const ISO_DATETIME_PATTERNS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const EUROPEAN_DATE_PATTERNS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const EUROPEAN_DATETIME_PATTERNS: &[&str] = &[
    "%H:%M:%S %d/%m/%Y",
    "%H:%M %d/%m/%Y",
    "%H:%M:%S %d-%m-%Y",
    "%H:%M %d-%m-%Y",
    "%H:%M:%S %d.%m.%Y",
    "%H:%M %d.%m.%Y",
];

const AMERICAN_DATE_PATTERNS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];
const AMERICAN_DATETIME_PATTERNS: &[&str] = &[
    "%H:%M:%S %m/%d/%Y",
    "%H:%M %m/%d/%Y",
    "%I:%M %p %m/%d/%Y",
    "%H:%M:%S %m-%d-%Y",
    "%H:%M %m-%d-%Y",
];

impl DateFormat {
    pub const ALL: [DateFormat; 3] = [DateFormat::Iso, DateFormat::European, DateFormat::American];

    /// 显示名（校验消息中引用）
    pub fn display_name(&self) -> &'static str {
        match self {
            DateFormat::Iso => "ISO",
            DateFormat::European => "European",
            DateFormat::American => "American",
        }
    }

    pub fn date_example(&self) -> &'static str {
        match self {
            DateFormat::Iso => "2024-05-15",
            DateFormat::European => "15/05/2024",
            DateFormat::American => "05/15/2024",
        }
    }

    pub fn datetime_example(&self) -> &'static str {
        match self {
            DateFormat::Iso => "2024-05-15 16:30:00",
            DateFormat::European => "16:30 15/05/2024",
            DateFormat::American => "16:30 05/15/2024",
        }
    }

    fn date_patterns(&self) -> &'static [&'static str] {
        match self {
            DateFormat::Iso => ISO_DATE_PATTERNS,
            DateFormat::European => EUROPEAN_DATE_PATTERNS,
            DateFormat::American => AMERICAN_DATE_PATTERNS,
        }
    }

    fn datetime_patterns(&self) -> &'static [&'static str] {
        match self {
            DateFormat::Iso => ISO_DATETIME_PATTERNS,
            DateFormat::European => EUROPEAN_DATETIME_PATTERNS,
            DateFormat::American => AMERICAN_DATETIME_PATTERNS,
        }
    }

    /// 解析日期；带时间的输入取其日期部分
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        self.date_patterns()
            .iter()
            .find_map(|p| NaiveDate::parse_from_str(value, p).ok())
            .or_else(|| self.parse_datetime_only(value).map(|dt| dt.date()))
    }

    /// 解析日期时间；纯日期输入视为当天 00:00
    pub fn parse_datetime(&self, raw: &str) -> Option<NaiveDateTime> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        self.parse_datetime_only(value).or_else(|| {
            self.date_patterns()
                .iter()
                .find_map(|p| NaiveDate::parse_from_str(value, p).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
    }

    fn parse_datetime_only(&self, value: &str) -> Option<NaiveDateTime> {
        self.datetime_patterns()
            .iter()
            .find_map(|p| NaiveDateTime::parse_from_str(value, p).ok())
    }

    pub fn format_date(&self, date: NaiveDate) -> String {
        match self {
            DateFormat::Iso => date.format("%Y-%m-%d").to_string(),
            DateFormat::European => date.format("%d/%m/%Y").to_string(),
            DateFormat::American => date.format("%m/%d/%Y").to_string(),
        }
    }

    pub fn format_datetime(&self, dt: NaiveDateTime) -> String {
        match self {
            DateFormat::Iso => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            DateFormat::European => dt.format("%H:%M %d/%m/%Y").to_string(),
            DateFormat::American => dt.format("%H:%M %m/%d/%Y").to_string(),
        }
    }
}

// ==========================================
// NumberFormat
// ==========================================
impl NumberFormat {
    pub fn display_name(&self) -> &'static str {
        match self {
            NumberFormat::Point => "Decimal point",
            NumberFormat::Comma => "Decimal comma",
        }
    }

    pub fn example(&self) -> &'static str {
        match self {
            NumberFormat::Point => "1,234.56",
            NumberFormat::Comma => "1.234,56",
        }
    }

    pub fn decimal_separator(&self) -> char {
        match self {
            NumberFormat::Point => '.',
            NumberFormat::Comma => ',',
        }
    }

    pub fn thousands_separator(&self) -> char {
        match self {
            NumberFormat::Point => ',',
            NumberFormat::Comma => '.',
        }
    }

    /// 解析数字
    ///
    /// 1. 去掉空白（含不换行空格）与千分位分隔符
    /// 2. 小数分隔符统一为 '.'
    /// 3. 数值解析；非有限值视为无法解析
    pub fn parse(&self, raw: &str) -> Option<f64> {
        let thousands = self.thousands_separator();
        let decimal = self.decimal_separator();

        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != thousands)
            .map(|c| if c == decimal { '.' } else { c })
            .collect();

        if normalized.is_empty() {
            return None;
        }

        normalized
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    pub fn format(&self, value: f64) -> String {
        let plain = value.to_string();
        match self {
            NumberFormat::Point => plain,
            NumberFormat::Comma => plain.replace('.', ","),
        }
    }
}
