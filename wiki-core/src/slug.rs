//! Title-to-slug conversion, used as the default `slug` when creating a page
//! (spec.md §4.5) if the caller doesn't supply one. Ported from the
//! original implementation's `cleanup_page_name`: lowercase, collapse
//! whitespace/non-alphanumerics into single hyphens, trim leading/trailing
//! hyphens.

pub fn slugify(title: &str) -> String {
    slugify_with_limit(title, 0)
}

/// As [`slugify`], but truncates the result to `max_len` characters before
/// trimming a trailing hyphen the cut may have exposed. `0` disables
/// truncation (spec.md SPEC_FULL §B `WikiConfig::max_slug_len`).
pub fn slugify_with_limit(title: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_hyphen = true; // suppress a leading hyphen
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if max_len > 0 && slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_lowercases() {
        assert_eq!(slugify("Getting Started  Guide"), "getting-started-guide");
    }

    #[test]
    fn strips_punctuation() {
        assert_eq!(slugify("FAQ & Troubleshooting!"), "faq-troubleshooting");
    }

    #[test]
    fn trims_leading_and_trailing_hyphens() {
        assert_eq!(slugify("  -- Hello -- "), "hello");
    }

    #[test]
    fn empty_title_yields_empty_slug() {
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn zero_limit_disables_truncation() {
        assert_eq!(slugify_with_limit("a long title here", 0), "a-long-title-here");
    }

    #[test]
    fn truncation_drops_a_trailing_hyphen_exposed_by_the_cut() {
        assert_eq!(slugify_with_limit("getting started guide", 8), "getting");
    }
}
