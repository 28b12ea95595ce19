use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Github,
    Reddit,
    HackerNews,
    V2ex,
    Web,
}

/// Classify a URL by hostname. Unrecognized or unparseable hosts always
/// resolve to `Web`; there is no error path here.
pub fn detect(url: &str) -> Platform {
    let Ok(parsed) = Url::parse(url) else {
        return Platform::Web;
    };
    let Some(host) = parsed.host_str() else {
        return Platform::Web;
    };
    let host = host.to_ascii_lowercase();

    if host_matches(&host, "v2ex.com") {
        Platform::V2ex
    } else if host == "news.ycombinator.com" {
        Platform::HackerNews
    } else if host_matches(&host, "github.com") {
        Platform::Github
    } else if host_matches(&host, "reddit.com") {
        Platform::Reddit
    } else {
        Platform::Web
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_platforms() {
        assert_eq!(
            detect("https://github.com/rust-lang/rust/issues/1"),
            Platform::Github
        );
        assert_eq!(
            detect("https://www.github.com/rust-lang/rust/pull/2"),
            Platform::Github
        );
        assert_eq!(
            detect("https://old.reddit.com/r/rust/comments/abc/x/"),
            Platform::Reddit
        );
        assert_eq!(
            detect("https://news.ycombinator.com/item?id=1"),
            Platform::HackerNews
        );
        assert_eq!(detect("https://www.v2ex.com/t/123"), Platform::V2ex);
    }

    #[test]
    fn unknown_hosts_fall_back_to_web() {
        assert_eq!(detect("https://example.com/page"), Platform::Web);
        assert_eq!(detect("not a url at all"), Platform::Web);
        // Lookalike domains are not platform hosts.
        assert_eq!(detect("https://github.com.evil.example/x"), Platform::Web);
    }
}
