/// Maximum length of the `posts.slug` column
pub const MAX_SLUG_LEN: usize = 255;

/// Longest suffix `with_suffix` can append, `-4294967295`
const MAX_SUFFIX_LEN: usize = 11;

/// URL-safe slug derived from a post title
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return "post".to_string();
    }
    truncate(&slug, MAX_SLUG_LEN)
}

/// Slug with a numeric suffix, still within the column limit
pub fn with_suffix(base: &str, n: u32) -> String {
    let suffix = format!("-{}", n);
    let head = truncate(base, MAX_SLUG_LEN - suffix.len());
    format!("{}{}", head, suffix)
}

/// Prefix shared by `base` and every `with_suffix(base, n)`
pub fn suffix_stem(base: &str) -> String {
    truncate(base, MAX_SLUG_LEN - MAX_SUFFIX_LEN)
}

fn truncate(slug: &str, max: usize) -> String {
    if slug.len() <= max {
        return slug.to_string();
    }
    let mut end = max;
    while !slug.is_char_boundary(end) {
        end -= 1;
    }
    slug[..end].trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust -- async  tips "), "rust-async-tips");
        assert_eq!(slugify("Crème Brûlée"), "crème-brûlée");
        assert_eq!(slugify("???"), "post");
    }

    #[test]
    fn test_length_limits() {
        let long = "a".repeat(400);
        assert_eq!(slugify(&long).len(), MAX_SLUG_LEN);

        let suffixed = with_suffix(&"b".repeat(MAX_SLUG_LEN), 12);
        assert_eq!(suffixed.len(), MAX_SLUG_LEN);
        assert!(suffixed.ends_with("b-12"));
        assert_eq!(with_suffix("intro", 2), "intro-2");
    }

    #[test]
    fn test_suffix_stem_prefixes_candidates() {
        let mut long = "c".repeat(243);
        long.push_str("-dd-");
        long.push_str(&"e".repeat(8));
        for base in [long.as_str(), "intro"] {
            let stem = suffix_stem(base);
            assert!(base.starts_with(&stem));
            for n in [2, 10, 1000, u32::MAX] {
                assert!(with_suffix(base, n).starts_with(&stem), "{} {}", base, n);
            }
        }
        assert_eq!(suffix_stem("intro"), "intro");
    }
}
