// ==========================================
// CRM 导入向导 - 可导入字段定义
// ==========================================
// 职责: 字段类型 / 校验规则 / 预定义选项 / 表头猜测词
// 说明: 自定义字段以 custom_fields_ 前缀区分，落库时路由到自定义字段存储
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 自定义字段 key 前缀
pub const CUSTOM_FIELD_PREFIX: &str = "custom_fields_";

/// 字段数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Date,
    DateTime,
    Boolean,
    /// 单选（预定义选项）
    SingleChoice,
    /// 多选（预定义选项）
    MultiChoice,
    /// 多值（任意取值，例如标签/邮箱列表）
    Tags,
}

impl FieldType {
    pub fn is_multi_value(&self) -> bool {
        matches!(self, FieldType::MultiChoice | FieldType::Tags)
    }
}

/// 校验规则
///
/// 字符串形式与表单规则一致: `required`, `email`, `max:255` ...
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    Nullable,
    Email,
    Url,
    Domain,
    Numeric,
    Integer,
    /// 最大长度（字符数）
    Max(usize),
    /// 最小长度（字符数）
    Min(usize),
}

impl Rule {
    /// 是否为存在性规则（由上游处理，校验器忽略）
    pub fn is_presence_rule(&self) -> bool {
        matches!(self, Rule::Required | Rule::Nullable)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Required => f.write_str("required"),
            Rule::Nullable => f.write_str("nullable"),
            Rule::Email => f.write_str("email"),
            Rule::Url => f.write_str("url"),
            Rule::Domain => f.write_str("domain"),
            Rule::Numeric => f.write_str("numeric"),
            Rule::Integer => f.write_str("integer"),
            Rule::Max(n) => write!(f, "max:{}", n),
            Rule::Min(n) => write!(f, "min:{}", n),
        }
    }
}

impl FromStr for Rule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };

        let parse_len = |arg: Option<&str>| -> Result<usize, String> {
            arg.ok_or_else(|| format!("rule {} requires an argument", name))?
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid argument for rule {}: {:?}", name, arg))
        };

        match name {
            "required" => Ok(Rule::Required),
            "nullable" => Ok(Rule::Nullable),
            "email" => Ok(Rule::Email),
            "url" => Ok(Rule::Url),
            "domain" => Ok(Rule::Domain),
            "numeric" => Ok(Rule::Numeric),
            "integer" => Ok(Rule::Integer),
            "max" => Ok(Rule::Max(parse_len(arg)?)),
            "min" => Ok(Rule::Min(parse_len(arg)?)),
            other => Err(format!("unknown rule: {}", other)),
        }
    }
}

/// 预定义选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
}

impl ChoiceOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// 可导入字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportField {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub rules: Vec<Rule>,
    pub options: Vec<ChoiceOption>,
    pub required: bool,
    /// 表头猜测词（小写）
    pub guesses: Vec<String>,
}

impl ImportField {
    pub fn new(key: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            field_type,
            rules: Vec::new(),
            options: Vec::new(),
            required: false,
            guesses: Vec::new(),
        }
    }

    /// 自定义字段（key 自动加前缀）
    pub fn custom(code: &str, label: impl Into<String>, field_type: FieldType) -> Self {
        Self::new(format!("{}{}", CUSTOM_FIELD_PREFIX, code), label, field_type)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.rules.insert(0, Rule::Required);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn options<I, V, L>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<String>,
        L: Into<String>,
    {
        self.options = options
            .into_iter()
            .map(|(value, label)| ChoiceOption::new(value, label))
            .collect();
        self
    }

    pub fn guesses<I, S>(mut self, guesses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.guesses = guesses
            .into_iter()
            .map(|g| g.as_ref().to_lowercase())
            .collect();
        self
    }

    pub fn is_custom(&self) -> bool {
        self.key.starts_with(CUSTOM_FIELD_PREFIX)
    }

    /// 自定义字段 code（去掉前缀）；核心字段返回 None
    pub fn custom_code(&self) -> Option<&str> {
        self.key.strip_prefix(CUSTOM_FIELD_PREFIX)
    }

    /// 去掉存在性规则后的实际约束
    pub fn constraint_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| !r.is_presence_rule())
    }

    pub fn has_predefined_options(&self) -> bool {
        !self.options.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_parse() {
        assert_eq!("max:255".parse::<Rule>().unwrap(), Rule::Max(255));
        assert_eq!(" email ".parse::<Rule>().unwrap(), Rule::Email);
        assert!("max".parse::<Rule>().is_err());
        assert!("max:abc".parse::<Rule>().is_err());
        assert!("regex:/a/".parse::<Rule>().is_err());
    }

    #[test]
    fn test_rule_display_roundtrip() {
        for rule in [Rule::Required, Rule::Max(10), Rule::Min(2), Rule::Domain] {
            assert_eq!(rule.to_string().parse::<Rule>().unwrap(), rule);
        }
    }

    #[test]
    fn test_custom_field_key() {
        let field = ImportField::custom("emails", "Emails", FieldType::Tags);
        assert_eq!(field.key, "custom_fields_emails");
        assert!(field.is_custom());
        assert_eq!(field.custom_code(), Some("emails"));

        let core = ImportField::new("name", "Name", FieldType::Text).required();
        assert!(!core.is_custom());
        assert_eq!(core.constraint_rules().count(), 0);
    }
}
