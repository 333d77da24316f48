// ==========================================
// CRM 导入向导 - 值类型转换
// ==========================================
// 职责: 修正后的字符串 → 类型化 JSON 值
// 约定: 空值 / 无效值 → None（字段不写入；无效值已在评审阶段标出）
// ==========================================

use crate::domain::field::FieldType;
use crate::importer::column_mapper::FieldColumn;
use crate::importer::column_validator::{parse_bool, split_items};
use serde_json::{Number, Value};

pub struct ValueCaster;

impl ValueCaster {
    /// 转换一个单元格
    ///
    /// # 返回
    /// - Some(Value): 可写入的字段值
    /// - None: 空值或无法解析
    pub fn cast(column: &FieldColumn, raw: &str) -> Option<Value> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }

        let field = &column.field;
        match field.field_type {
            FieldType::Text => Some(Value::String(value.to_string())),
            FieldType::Number => column
                .number_format
                .parse(value)
                .and_then(Number::from_f64)
                .map(Value::Number),
            FieldType::Date => column
                .date_format
                .parse_date(value)
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string())),
            FieldType::DateTime => column
                .date_format
                .parse_datetime(value)
                .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string())),
            FieldType::Boolean => parse_bool(value).map(Value::Bool),
            FieldType::SingleChoice => {
                if field.has_predefined_options() && !field.options.iter().any(|o| o.value == value) {
                    None
                } else {
                    Some(Value::String(value.to_string()))
                }
            }
            FieldType::MultiChoice | FieldType::Tags => {
                let items: Vec<Value> = split_items(value)
                    .into_iter()
                    .filter(|item| {
                        !field.has_predefined_options() || field.options.iter().any(|o| &o.value == item)
                    })
                    .map(Value::String)
                    .collect();
                if items.is_empty() {
                    None
                } else {
                    Some(Value::Array(items))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field::ImportField;
    use crate::domain::types::{DateFormat, NumberFormat};
    use serde_json::json;

    fn column(field: ImportField, date_format: DateFormat, number_format: NumberFormat) -> FieldColumn {
        FieldColumn {
            source: field.label.clone(),
            index: 0,
            field,
            date_format,
            number_format,
        }
    }

    #[test]
    fn test_cast_number_with_comma_format() {
        let col = column(
            ImportField::custom("amount", "Amount", FieldType::Number),
            DateFormat::Iso,
            NumberFormat::Comma,
        );
        assert_eq!(ValueCaster::cast(&col, "1.234,5"), Some(json!(1234.5)));
        assert_eq!(ValueCaster::cast(&col, "abc"), None);
    }

    #[test]
    fn test_cast_dates_to_iso() {
        let date = column(
            ImportField::custom("birthday", "Birthday", FieldType::Date),
            DateFormat::American,
            NumberFormat::Point,
        );
        assert_eq!(ValueCaster::cast(&date, "02/28/1990"), Some(json!("1990-02-28")));

        let datetime = column(
            ImportField::custom("due", "Due", FieldType::DateTime),
            DateFormat::European,
            NumberFormat::Point,
        );
        assert_eq!(
            ValueCaster::cast(&datetime, "16:30 15/05/2024"),
            Some(json!("2024-05-15 16:30:00"))
        );
    }

    #[test]
    fn test_cast_multi_and_blank() {
        let col = column(
            ImportField::custom("emails", "Emails", FieldType::Tags),
            DateFormat::Iso,
            NumberFormat::Point,
        );
        assert_eq!(ValueCaster::cast(&col, "a@x.co, b@y.co,"), Some(json!(["a@x.co", "b@y.co"])));
        assert_eq!(ValueCaster::cast(&col, " , "), None);
        assert_eq!(ValueCaster::cast(&col, ""), None);
    }

    #[test]
    fn test_cast_boolean() {
        let col = column(
            ImportField::new("active", "Active", FieldType::Boolean),
            DateFormat::Iso,
            NumberFormat::Point,
        );
        assert_eq!(ValueCaster::cast(&col, "YES"), Some(json!(true)));
        assert_eq!(ValueCaster::cast(&col, "0"), Some(json!(false)));
        assert_eq!(ValueCaster::cast(&col, "perhaps"), None);
    }
}
