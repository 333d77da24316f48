// ==========================================
// CRM 导入向导 - 输入指纹
// ==========================================
// input_hash = SHA-256(列映射 + 值修正 + 行跳过标记)
// 预览任务启动时记录指纹，运行中比对以发现用户已修改输入
// ==========================================

use crate::domain::mapping::{ColumnMapping, ValueCorrection};
use crate::importer::error::ImportResult;
use crate::repository::ImportStore;
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct HashInput<'a> {
    mappings: &'a [ColumnMapping],
    corrections: Vec<&'a ValueCorrection>,
    skipped_rows: &'a [u32],
}

/// 计算输入指纹（十六进制）
///
/// 修正按 (列, 原始值) 排序，保证与写入顺序无关
pub fn compute_input_hash(
    mappings: &[ColumnMapping],
    corrections: &[ValueCorrection],
    skipped_rows: &[u32],
) -> ImportResult<String> {
    let mut sorted: Vec<&ValueCorrection> = corrections.iter().collect();
    sorted.sort_by(|a, b| (&a.column, &a.raw_value).cmp(&(&b.column, &b.raw_value)));

    let input = HashInput {
        mappings,
        corrections: sorted,
        skipped_rows,
    };
    let bytes = serde_json::to_vec(&input)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// 会话当前输入的指纹
pub fn current_input_hash(store: &ImportStore) -> ImportResult<String> {
    compute_input_hash(
        &store.column_mappings()?,
        &store.corrections()?,
        &store.skipped_rows()?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ignores_correction_order() {
        let mappings = vec![ColumnMapping::field("Name", "name")];
        let a = ValueCorrection::replace("Birthday", "x", "2020-01-01");
        let b = ValueCorrection::skip("Phone", "n/a");

        let first = compute_input_hash(&mappings, &[a.clone(), b.clone()], &[]).unwrap();
        let second = compute_input_hash(&mappings, &[b, a], &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_inputs() {
        let mappings = vec![ColumnMapping::field("Name", "name")];
        let base = compute_input_hash(&mappings, &[], &[]).unwrap();

        let remapped = vec![ColumnMapping::field("Full Name", "name")];
        assert_ne!(base, compute_input_hash(&remapped, &[], &[]).unwrap());
        assert_ne!(base, compute_input_hash(&mappings, &[], &[3]).unwrap());
    }
}
