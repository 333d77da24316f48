// ==========================================
// CRM 导入向导 - 匹配值归一化
// ==========================================
// 匹配前对表格取值与库内取值做同样处理
// ==========================================

use crate::domain::entity_link::{EntityLink, MatchKind};
use crate::repository::record_repo::Normalizer;

/// 域名归一化: 去协议 / www. / 路径 / 端口，转小写
pub fn normalize_domain(raw: &str) -> String {
    let mut value = raw.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = value.strip_prefix(scheme) {
            value = rest.to_string();
            break;
        }
    }
    if let Some(rest) = value.strip_prefix("www.") {
        value = rest.to_string();
    }
    if let Some(end) = value.find(['/', '?', '#', ':']) {
        value.truncate(end);
    }

    value.trim_end_matches('.').to_string()
}

/// 邮箱 / 名称: 去首尾空白 + 小写
pub fn normalize_text(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// 记录 id: 只去首尾空白
pub fn normalize_id(raw: &str) -> String {
    raw.trim().to_string()
}

/// 匹配语义对应的归一化函数
pub fn normalizer_for(kind: MatchKind) -> Normalizer {
    match kind {
        MatchKind::Id => normalize_id,
        MatchKind::Domain => normalize_domain,
        MatchKind::Email | MatchKind::Name => normalize_text,
    }
}

/// 待新建关联记录的去重取值（按所用匹配字段归一化，未知匹配字段按名称处理）
pub fn link_dedup_value(link: &EntityLink, matcher: &str, raw: &str) -> String {
    let kind = link.matcher(matcher).map_or(MatchKind::Name, |m| m.kind);
    normalizer_for(kind)(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("https://www.Acme.com/about"), "acme.com");
        assert_eq!(normalize_domain(" acme.io "), "acme.io");
        assert_eq!(normalize_domain("http://shop.acme.io:8080"), "shop.acme.io");
        assert_eq!(normalize_domain("acme.com."), "acme.com");
    }

    #[test]
    fn test_normalizer_for_kind() {
        assert_eq!(normalizer_for(MatchKind::Email)(" Ada@Example.COM "), "ada@example.com");
        assert_eq!(normalizer_for(MatchKind::Id)(" AbC "), "AbC");
    }

    #[test]
    fn test_link_dedup_value_follows_matcher() {
        let link = crate::importer::definitions::company_link(
            crate::domain::entity_link::LinkStorage::ForeignKey {
                column: "company_id".to_string(),
            },
        );
        assert_eq!(link_dedup_value(&link, "domain", "https://www.Acme.com/"), "acme.com");
        assert_eq!(link_dedup_value(&link, "domain", "acme.com"), "acme.com");
        assert_eq!(link_dedup_value(&link, "name", " Acme "), "acme");
        assert_eq!(link_dedup_value(&link, "unknown", "Acme"), "acme");
    }
}
