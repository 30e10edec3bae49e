//! Slug normalization for store resources.
//!
//! Products and catalogs are addressed by slug within a store; bulk import
//! accepts raw names, explicit slugs, or full product URLs and normalizes
//! them all through here.

use url::Url;

/// Normalize free text into a URL-safe slug. Returns an empty string when
/// nothing usable remains, which callers treat as "could not derive a slug".
pub fn generate_slug(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_dash = true;

    for ch in input.trim().to_lowercase().chars() {
        let mapped = match ch {
            'a'..='z' | '0'..='9' => Some(ch),
            'á' => Some('a'),
            'é' => Some('e'),
            'í' => Some('i'),
            'ó' => Some('o'),
            'ú' | 'ü' => Some('u'),
            'ñ' => Some('n'),
            _ => None,
        };

        match mapped {
            Some(c) => {
                slug.push(c);
                last_dash = false;
            }
            None if !last_dash => {
                slug.push('-');
                last_dash = true;
            }
            None => {}
        }
    }

    slug.trim_matches('-').to_string()
}

/// Pull the last path segment out of a product URL, tolerating bare paths
/// and query/fragment suffixes on non-URL input.
pub fn slug_from_url(input: &str) -> String {
    if let Ok(url) = Url::parse(input) {
        return url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or_default()
            .to_string();
    }

    let sanitized = input.split(['?', '#']).next().unwrap_or(input);
    sanitized
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .unwrap_or(sanitized)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_url_safe_slugs() {
        assert_eq!(generate_slug("Café con Leche"), "cafe-con-leche");
        assert_eq!(generate_slug("  Playera   Azul! "), "playera-azul");
        assert_eq!(generate_slug("---"), "");
    }

    #[test]
    fn extracts_slug_from_full_url() {
        assert_eq!(
            slug_from_url("https://shop.example.com/products/playera-azul"),
            "playera-azul"
        );
        assert_eq!(slug_from_url("https://shop.example.com/"), "");
    }

    #[test]
    fn extracts_slug_from_bare_path() {
        assert_eq!(slug_from_url("catalogo/verano/gorra-roja?ref=qr"), "gorra-roja");
        assert_eq!(slug_from_url("gorra-roja"), "gorra-roja");
    }
}
