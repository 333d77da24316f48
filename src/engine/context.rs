// ==========================================
// CRM 导入向导 - 管道上下文
// ==========================================
// 职责: 显式传递给管道各阶段的运行上下文
// - 会话 id / team id / 导入参数
// - 本次运行内的关联记录去重缓存（行失败时丢弃该行新记住的条目）
// ==========================================

use crate::config::ImportSettings;
use crate::domain::record::RecordId;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ImportContext {
    pub import_id: String,
    pub team_id: String,
    pub settings: ImportSettings,
    /// (EntityLink.key, 归一化取值) → 本次运行新建的记录
    created_links: HashMap<(String, String), RecordId>,
    /// 记住顺序（行级回滚用）
    created_order: Vec<(String, String)>,
}

impl ImportContext {
    pub fn new(
        import_id: impl Into<String>,
        team_id: impl Into<String>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            import_id: import_id.into(),
            team_id: team_id.into(),
            settings,
            created_links: HashMap::new(),
            created_order: Vec::new(),
        }
    }

    /// 本次运行中已为该关联新建的同名记录
    pub fn created_link(&self, link_key: &str, name: &str) -> Option<&RecordId> {
        self.created_links.get(&dedup_key(link_key, name))
    }

    pub fn remember_created_link(&mut self, link_key: &str, name: &str, id: RecordId) {
        let key = dedup_key(link_key, name);
        if self.created_links.insert(key.clone(), id).is_none() {
            self.created_order.push(key);
        }
    }

    /// 行开始前的位置
    pub fn link_mark(&self) -> usize {
        self.created_order.len()
    }

    /// 行回滚: 忘掉 mark 之后记住的关联（对应记录已随保存点回滚）
    pub fn forget_links_since(&mut self, mark: usize) {
        if mark >= self.created_order.len() {
            return;
        }
        for key in self.created_order.drain(mark..) {
            self.created_links.remove(&key);
        }
    }

    pub fn created_link_count(&self) -> usize {
        self.created_links.len()
    }
}

fn dedup_key(link_key: &str, name: &str) -> (String, String) {
    (link_key.to_string(), name.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_ignores_case_and_padding() {
        let mut ctx = ImportContext::new("imp-1", "team-1", ImportSettings::default());
        ctx.remember_created_link("company", "Acme", "c-1".to_string());

        assert_eq!(ctx.created_link("company", "ACME "), Some(&"c-1".to_string()));
        assert_eq!(ctx.created_link("companies", "Acme"), None);
        assert_eq!(ctx.created_link_count(), 1);
    }

    #[test]
    fn test_forget_links_since_mark() {
        let mut ctx = ImportContext::new("imp-1", "team-1", ImportSettings::default());
        ctx.remember_created_link("company", "acme", "c-1".to_string());

        let mark = ctx.link_mark();
        ctx.remember_created_link("company", "globex", "c-2".to_string());
        ctx.forget_links_since(mark);

        assert_eq!(ctx.created_link("company", "acme"), Some(&"c-1".to_string()));
        assert_eq!(ctx.created_link("company", "globex"), None);
        assert_eq!(ctx.created_link_count(), 1);
        assert_eq!(ctx.link_mark(), 1);
    }
}
