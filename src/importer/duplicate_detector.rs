// ==========================================
// CRM 导入向导 - 同文件重复检测
// ==========================================
// 职责: 检测同一会话内的重复行（首次出现优先）
// - 主匹配键重复（仅查找型匹配字段）→ 后出现的行 Skip
// - 两行更新同一已有记录 → 后出现的行 Skip
// ==========================================

use crate::domain::record::RecordId;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct DuplicateDetector {
    /// 归一化匹配键 → 首次出现的行号
    first_key: HashMap<String, u32>,
    /// 已被更新的记录 → 首次出现的行号
    first_target: HashMap<RecordId, u32>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记匹配键
    ///
    /// # 返回
    /// - Some(首次出现行号): 当前行是重复行
    /// - None: 首次出现（已登记）
    pub fn check_key(&mut self, key: &str, row_number: u32) -> Option<u32> {
        match self.first_key.get(key) {
            Some(&first) if first != row_number => Some(first),
            Some(_) => None,
            None => {
                self.first_key.insert(key.to_string(), row_number);
                None
            }
        }
    }

    /// 登记更新目标
    pub fn check_target(&mut self, record_id: &str, row_number: u32) -> Option<u32> {
        match self.first_target.get(record_id) {
            Some(&first) if first != row_number => Some(first),
            Some(_) => None,
            None => {
                self.first_target.insert(record_id.to_string(), row_number);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_wins() {
        let mut detector = DuplicateDetector::new();

        assert_eq!(detector.check_key("ada@example.com", 1), None);
        assert_eq!(detector.check_key("grace@example.com", 2), None);
        assert_eq!(detector.check_key("ada@example.com", 3), Some(1));
        assert_eq!(detector.check_key("ada@example.com", 4), Some(1));
    }

    #[test]
    fn test_recheck_same_row_is_not_duplicate() {
        let mut detector = DuplicateDetector::new();
        assert_eq!(detector.check_target("rec-1", 5), None);
        assert_eq!(detector.check_target("rec-1", 5), None);
        assert_eq!(detector.check_target("rec-1", 9), Some(5));
    }
}
