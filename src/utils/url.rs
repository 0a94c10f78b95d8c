//! URL helpers for provider endpoints

/// Remove trailing slashes so endpoint joining never produces `//`.
///
/// ```
/// use palaver::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.example.com/v1///"), "https://api.example.com/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash.
///
/// ```
/// use palaver::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.example.com/v1/", "/chat/completions"),
///     "https://api.example.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{normalized_base}/{endpoint}")
}

/// Catalog URLs may be absolute (a provider's native listing API) or relative
/// to the resolved base URL.
pub fn resolve_endpoint(base_url: &str, endpoint: &str) -> String {
    if is_absolute(endpoint) {
        endpoint.to_string()
    } else {
        construct_api_url(base_url, endpoint)
    }
}

fn is_absolute(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://api.example.com/v1"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.example.com/"),
            "https://api.example.com"
        );
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_api_url() {
        let cases = [
            ("https://api.example.com/v1", "chat/completions"),
            ("https://api.example.com/v1/", "chat/completions"),
            ("https://api.example.com/v1", "/chat/completions"),
            ("https://api.example.com/v1///", "///chat/completions"),
        ];
        for (base, endpoint) in cases {
            assert_eq!(
                construct_api_url(base, endpoint),
                "https://api.example.com/v1/chat/completions",
                "base={base} endpoint={endpoint}"
            );
        }
    }

    #[test]
    fn relative_catalog_urls_join_the_base() {
        assert_eq!(
            resolve_endpoint("https://api.groq.com/openai/v1/", "models"),
            "https://api.groq.com/openai/v1/models"
        );
    }

    #[test]
    fn absolute_catalog_urls_are_kept() {
        assert_eq!(
            resolve_endpoint("http://localhost:11434/v1", "http://localhost:11434/api/tags"),
            "http://localhost:11434/api/tags"
        );
        assert_eq!(
            resolve_endpoint("https://a.example/v1", "HTTPS://b.example/list"),
            "HTTPS://b.example/list"
        );
    }
}
