//! URL identity helpers shared by the crawl engine.

use url::Url;

/// Path fragments that mark listing/archive pages with no standalone content.
pub const NOISE_PATTERNS: &[&str] = &["/blog/tag/", "/blog/category/", "?"];

/// Reduces a URL to `scheme://host/path`, dropping query, fragment and trailing slashes.
///
/// Unparseable input falls back to plain string surgery, so the result may be empty or
/// not a URL at all; callers filter those out with [`is_internal`] and [`is_noise`].
pub fn canonicalize(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => from_url(&url),
        Err(_) => best_effort(raw),
    }
}

/// Canonical form of an already parsed URL.
pub fn from_url(url: &Url) -> String {
    let mut out = String::with_capacity(url.as_str().len());
    out.push_str(url.scheme());
    out.push_str("://");
    if let Some(host) = url.host_str() {
        out.push_str(host);
    }
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    out.trim_end_matches('/').to_string()
}

fn best_effort(raw: &str) -> String {
    let raw = raw.trim();
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    raw[..end].trim_end_matches('/').to_string()
}

/// True when `candidate` is an http(s) URL on the same host as `site`.
///
/// Scheme is ignored, so `http` and `https` pages of one site are both internal. Only an
/// explicitly written port has to match.
pub fn is_internal(candidate: &Url, site: &Url) -> bool {
    matches!(candidate.scheme(), "http" | "https")
        && candidate.host_str().is_some()
        && candidate.host_str() == site.host_str()
        && candidate.port() == site.port()
}

/// True for tag/category archives and any URL carrying a query string.
pub fn is_noise(url: &str) -> bool {
    NOISE_PATTERNS.iter().any(|pattern| url.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_query_fragment_and_trailing_slash() {
        assert_eq!(
            canonicalize("https://x.com/a?b=1#c"),
            canonicalize("https://x.com/a/")
        );
        assert_eq!(canonicalize("https://x.com/a/"), "https://x.com/a");
    }

    #[test]
    fn root_has_no_trailing_slash() {
        assert_eq!(canonicalize("https://revnix.com/"), "https://revnix.com");
        assert_eq!(canonicalize("https://revnix.com"), "https://revnix.com");
    }

    #[test]
    fn keeps_explicit_port() {
        assert_eq!(
            canonicalize("http://localhost:8080/docs/"),
            "http://localhost:8080/docs"
        );
    }

    #[test]
    fn is_idempotent() {
        let inputs = [
            "https://x.com/a?b=1#c",
            "https://X.com/a//",
            "http://localhost:8080/",
            "https://x.com/caf%C3%A9/menu/",
            "/relative/path/?q=1",
            "not a url#frag",
            "",
        ];
        for input in inputs {
            let once = canonicalize(input);
            assert_eq!(canonicalize(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn malformed_input_is_best_effort() {
        assert_eq!(canonicalize("/careers/?page=2"), "/careers");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn internal_requires_same_host() {
        let site = Url::parse("https://revnix.com").unwrap();
        let inside = Url::parse("https://revnix.com/about").unwrap();
        let other = Url::parse("https://blog.revnix.com/post").unwrap();
        let mail = Url::parse("mailto:hr@revnix.com").unwrap();
        assert!(is_internal(&inside, &site));
        assert!(!is_internal(&other, &site));
        assert!(!is_internal(&mail, &site));
    }

    #[test]
    fn internal_ignores_scheme_but_not_explicit_port() {
        let site = Url::parse("http://revnix.com").unwrap();
        let secure = Url::parse("https://revnix.com/about").unwrap();
        let dev = Url::parse("http://revnix.com:8080/about").unwrap();
        assert!(is_internal(&secure, &site));
        assert!(!is_internal(&dev, &site));
    }

    #[test]
    fn noise_patterns_match() {
        assert!(is_noise("https://x.com/blog/tag/rust"));
        assert!(is_noise("https://x.com/blog/category/news/"));
        assert!(is_noise("https://x.com/search?q=1"));
        assert!(!is_noise("https://x.com/blog/launch"));
    }
}
