// ==========================================
// CRM 导入向导 - 列值校验器
// ==========================================
// 职责: 单个原始单元格值 → 0 或 1 个校验错误
// 说明:
// - 校验失败是数据（ValidationError），不是 Err
// - required / nullable 属于存在性规则，由映射阶段处理，这里忽略
// - 空值总是通过
// - 多值字段逐项校验，错误只包含无效项
// ==========================================

use crate::domain::field::{FieldType, ImportField, Rule};
use crate::domain::session::ValidationError;
use crate::i18n::{t, t_with_args};
use crate::importer::column_mapper::FieldColumn;
use crate::importer::normalize::normalize_domain;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// 选项列表在错误消息中最多展示的个数
pub const MAX_LISTED_OPTIONS: usize = 5;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("valid regex"));

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("valid regex")
});

/// 多值拆分: 按逗号切分、去空白、丢弃空项
pub fn split_items(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// 布尔值解析（yes/no, true/false, 1/0，大小写不敏感）
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "yes" | "true" | "1" | "y" => Some(true),
        "no" | "false" | "0" | "n" => Some(false),
        _ => None,
    }
}

pub struct ColumnValidator;

impl ColumnValidator {
    /// 校验一个单元格
    ///
    /// # 参数
    /// - column: 字段列规格（字段定义 + 日期 / 数字格式）
    /// - raw: 原始值（已应用修正）
    ///
    /// # 返回
    /// - None: 通过
    /// - Some(ValidationError): 标量错误或多值逐项错误
    pub fn validate(column: &FieldColumn, raw: &str) -> Option<ValidationError> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        let field = &column.field;
        match field.field_type {
            FieldType::Date => match column.date_format.parse_date(value) {
                Some(_) => None,
                None => Some(ValidationError::message(t_with_args(
                    "validation.invalid_date",
                    &[
                        ("format", column.date_format.display_name()),
                        ("example", column.date_format.date_example()),
                    ],
                ))),
            },
            FieldType::DateTime => match column.date_format.parse_datetime(value) {
                Some(_) => None,
                None => Some(ValidationError::message(t_with_args(
                    "validation.invalid_datetime",
                    &[
                        ("format", column.date_format.display_name()),
                        ("example", column.date_format.datetime_example()),
                    ],
                ))),
            },
            FieldType::Number => match column.number_format.parse(value) {
                Some(number) => {
                    if field.rules.contains(&Rule::Integer) && number.fract() != 0.0 {
                        Some(ValidationError::message(t("validation.integer")))
                    } else {
                        None
                    }
                }
                None => Some(ValidationError::message(t_with_args(
                    "validation.invalid_number",
                    &[
                        ("format", column.number_format.display_name()),
                        ("example", column.number_format.example()),
                    ],
                ))),
            },
            FieldType::Boolean => match parse_bool(value) {
                Some(_) => None,
                None => Some(ValidationError::message(t("validation.invalid_boolean"))),
            },
            FieldType::SingleChoice if field.has_predefined_options() => {
                validate_option(field, value).map(ValidationError::Message)
            }
            FieldType::MultiChoice | FieldType::Tags => validate_items(field, value),
            FieldType::Text | FieldType::SingleChoice => {
                check_rules(field, value).map(ValidationError::Message)
            }
        }
    }
}

/// 单选: 与选项值大小写敏感相等
fn validate_option(field: &ImportField, value: &str) -> Option<String> {
    if field.options.iter().any(|o| o.value == value) {
        return None;
    }

    let mut listed: Vec<&str> = field
        .options
        .iter()
        .take(MAX_LISTED_OPTIONS)
        .map(|o| o.value.as_str())
        .collect();
    if field.options.len() > MAX_LISTED_OPTIONS {
        listed.push("...");
    }

    Some(t_with_args(
        "validation.invalid_option",
        &[("options", &listed.join(", "))],
    ))
}

/// 多值: 逐项校验，错误 map 只包含无效项
fn validate_items(field: &ImportField, value: &str) -> Option<ValidationError> {
    let mut errors = BTreeMap::new();

    for item in split_items(value) {
        let error = if field.has_predefined_options() {
            if field.options.iter().any(|o| o.value == item) {
                None
            } else {
                Some(t("validation.not_a_valid_option"))
            }
        } else {
            check_rules(field, &item)
        };

        if let Some(message) = error {
            errors.entry(item).or_insert(message);
        }
    }

    if errors.is_empty() {
        None
    } else {
        Some(ValidationError::Items(errors))
    }
}

/// 依次应用约束规则，返回首个违反规则的消息
fn check_rules(field: &ImportField, value: &str) -> Option<String> {
    field.constraint_rules().find_map(|rule| check_rule(rule, value))
}

fn check_rule(rule: &Rule, value: &str) -> Option<String> {
    let ok = match rule {
        Rule::Required | Rule::Nullable => true,
        Rule::Email => EMAIL_RE.is_match(value),
        Rule::Url => URL_RE.is_match(value),
        Rule::Domain => DOMAIN_RE.is_match(&normalize_domain(value)),
        Rule::Numeric => value.parse::<f64>().map(f64::is_finite).unwrap_or(false),
        Rule::Integer => value.parse::<i64>().is_ok(),
        Rule::Max(max) => value.chars().count() <= *max,
        Rule::Min(min) => value.chars().count() >= *min,
    };
    if ok {
        return None;
    }

    let message = match rule {
        Rule::Required | Rule::Nullable => return None,
        Rule::Email => t("validation.email"),
        Rule::Url => t("validation.url"),
        Rule::Domain => t("validation.domain"),
        Rule::Numeric => t("validation.numeric"),
        Rule::Integer => t("validation.integer"),
        Rule::Max(max) => t_with_args("validation.max_length", &[("max", &max.to_string())]),
        Rule::Min(min) => t_with_args("validation.min_length", &[("min", &min.to_string())]),
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{DateFormat, NumberFormat};

    fn column(field: ImportField) -> FieldColumn {
        FieldColumn {
            source: field.label.clone(),
            index: 0,
            field,
            date_format: DateFormat::Iso,
            number_format: NumberFormat::Point,
        }
    }

    fn choice_field(count: usize) -> ImportField {
        ImportField::new("stage", "Stage", FieldType::SingleChoice)
            .options((1..=count).map(|i| (format!("opt{}", i), format!("Option {}", i))))
    }

    #[test]
    fn test_text_rules_first_violation() {
        let col = column(
            ImportField::new("email", "Email", FieldType::Text).rules([Rule::Email, Rule::Max(8)]),
        );

        assert!(ColumnValidator::validate(&col, "a@b.co").is_none());
        let err = ColumnValidator::validate(&col, "not-an-email").unwrap();
        assert_eq!(err, ValidationError::message(t("validation.email")));

        let err = ColumnValidator::validate(&col, "long@example.com").unwrap();
        assert!(err.summary().contains('8'));
    }

    #[test]
    fn test_presence_only_rules_always_valid() {
        let col = column(
            ImportField::new("name", "Name", FieldType::Text)
                .required()
                .rules([Rule::Nullable]),
        );
        assert!(ColumnValidator::validate(&col, "anything at all").is_none());
    }

    #[test]
    fn test_blank_is_valid() {
        let col = column(ImportField::new("d", "Date", FieldType::Date));
        assert!(ColumnValidator::validate(&col, "   ").is_none());
    }

    #[test]
    fn test_single_choice_five_options_no_ellipsis() {
        let col = column(choice_field(5));
        let err = ColumnValidator::validate(&col, "nope").unwrap().summary();

        for i in 1..=5 {
            assert!(err.contains(&format!("opt{}", i)));
        }
        assert!(!err.contains("..."));
    }

    #[test]
    fn test_single_choice_six_options_truncated() {
        let col = column(choice_field(6));
        let err = ColumnValidator::validate(&col, "nope").unwrap().summary();

        assert!(err.contains("opt5"));
        assert!(!err.contains("opt6"));
        assert!(err.ends_with("..."));
    }

    #[test]
    fn test_single_choice_is_case_sensitive() {
        let col = column(choice_field(3));
        assert!(ColumnValidator::validate(&col, "opt1").is_none());
        assert!(ColumnValidator::validate(&col, "OPT1").is_some());
    }

    #[test]
    fn test_multi_value_split_is_idempotent() {
        let col = column(ImportField::custom("emails", "Emails", FieldType::Tags).rules([Rule::Email]));

        assert_eq!(
            ColumnValidator::validate(&col, "a@x.co, b@y.co,"),
            ColumnValidator::validate(&col, "a@x.co,b@y.co")
        );
        assert!(ColumnValidator::validate(&col, "a@x.co, b@y.co,").is_none());

        let loose = ColumnValidator::validate(&col, "bad, b@y.co,");
        let tight = ColumnValidator::validate(&col, "bad,b@y.co");
        assert_eq!(loose, tight);
    }

    #[test]
    fn test_multi_value_errors_only_invalid_items() {
        let col = column(ImportField::custom("emails", "Emails", FieldType::Tags).rules([Rule::Email]));

        match ColumnValidator::validate(&col, "ok@x.co, broken, also-broken").unwrap() {
            ValidationError::Items(items) => {
                assert_eq!(items.len(), 2);
                assert!(items.contains_key("broken"));
                assert!(!items.contains_key("ok@x.co"));
            }
            other => panic!("expected item errors, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_choice_predefined_options() {
        let col = column(
            ImportField::custom("tags", "Tags", FieldType::MultiChoice)
                .options([("vip", "VIP"), ("lead", "Lead")]),
        );

        assert!(ColumnValidator::validate(&col, "vip, lead").is_none());
        match ColumnValidator::validate(&col, "vip, partner").unwrap() {
            ValidationError::Items(items) => {
                assert_eq!(items.get("partner").map(String::as_str), Some("Not a valid option"));
                assert_eq!(items.len(), 1);
            }
            other => panic!("expected item errors, got {:?}", other),
        }
    }

    #[test]
    fn test_date_error_names_format() {
        let mut col = column(ImportField::custom("birthday", "Birthday", FieldType::Date));
        col.date_format = DateFormat::European;

        assert!(ColumnValidator::validate(&col, "28/02/1990").is_none());
        let err = ColumnValidator::validate(&col, "31/02/1990").unwrap().summary();
        assert!(err.contains("European"));
    }

    #[test]
    fn test_number_error_names_separator_convention() {
        let mut col = column(ImportField::custom("amount", "Amount", FieldType::Number));
        col.number_format = NumberFormat::Comma;

        assert!(ColumnValidator::validate(&col, "1.234,50").is_none());
        let err = ColumnValidator::validate(&col, "12abc").unwrap().summary();
        assert!(err.contains(NumberFormat::Comma.display_name()));
    }

    #[test]
    fn test_domain_rule_accepts_urls() {
        let col = column(ImportField::custom("domains", "Domains", FieldType::Tags).rules([Rule::Domain]));
        assert!(ColumnValidator::validate(&col, "https://www.acme.com, globex.io").is_none());
        assert!(ColumnValidator::validate(&col, "not a domain").is_some());
    }

    #[test]
    fn test_boolean_values() {
        let col = column(ImportField::new("active", "Active", FieldType::Boolean));
        assert!(ColumnValidator::validate(&col, "Yes").is_none());
        assert!(ColumnValidator::validate(&col, "0").is_none());
        assert!(ColumnValidator::validate(&col, "maybe").is_some());
    }
}
