//! Domain id generation
//!
//! Ids use the format `{6-char-hex}-{type}-{slug}`, e.g.
//! `019837-task-check-flight-price`. The hex prefix comes from a v7 UUID so
//! ids sort roughly by creation time.

/// Generate a domain id from a type tag and a human title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let hex_prefix = &uuid.simple().to_string()[..6];
    format!("{}-{}-{}", hex_prefix, domain_type, slugify(title))
}

/// Reduce a title to a short id-safe slug
pub fn slugify(title: &str) -> String {
    let mut slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(5)
        .collect::<Vec<_>>()
        .join("-");
    slug.truncate(40);
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Check the Flight Price"), "check-the-flight-price");
    }

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("what's  new?!"), "what-s-new");
    }

    #[test]
    fn test_slugify_empty() {
        assert_eq!(slugify("!!!"), "untitled");
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("task", "Find cheap hotels in Osaka");
        let parts: Vec<&str> = id.splitn(3, '-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 6);
        assert_eq!(parts[1], "task");
        assert!(parts[2].starts_with("find-cheap-hotels"));
    }

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id("task", "same title");
        let b = generate_id("task", "same title");
        assert_ne!(a, b);
    }
}
