//! Repository URL parsing and host-aware clone URL derivation.
//!
//! Accepts the forms users paste on the command line (`https://` URLs, scp-like
//! `git@host:owner/repo` URLs, bare `owner/repo` slugs) and resolves them to
//! an `owner/name` identity plus a clone URL.

use std::sync::OnceLock;

use regex_lite::Regex;

use crate::errors::ConfigError;
use crate::models::RepoSlug;

/// A parsed repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    pub slug: RepoSlug,
    pub clone_url: String,
}

fn https_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^https?://[^/\s]+(?:/[^/\s]+)*/([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
            .expect("static regex")
    })
}

fn scp_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:ssh://)?[\w.-]+@[\w.-]+[:/]([^/\s]+)/([^/\s]+?)(?:\.git)?/?$")
            .expect("static regex")
    })
}

fn slug_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([\w.-]+)/([\w.-]+?)(?:\.git)?$").expect("static regex"))
}

/// Parse a user-supplied repository reference.
///
/// Bare `owner/repo` slugs get a clone URL derived from `api_url` (see
/// [`derive_git_remote_url`]); full URLs are used for cloning as given, minus
/// a trailing slash.
pub fn parse_repository_url(input: &str, api_url: &str) -> Result<RepositoryLocation, ConfigError> {
    let trimmed = input.trim();
    let invalid = || ConfigError::InvalidRepositoryUrl(input.to_string());

    if let Some(caps) = https_pattern().captures(trimmed) {
        return Ok(RepositoryLocation {
            slug: RepoSlug::new(&caps[1], &caps[2]),
            clone_url: trimmed.trim_end_matches('/').to_string(),
        });
    }

    if let Some(caps) = scp_pattern().captures(trimmed) {
        return Ok(RepositoryLocation {
            slug: RepoSlug::new(&caps[1], &caps[2]),
            clone_url: trimmed.trim_end_matches('/').to_string(),
        });
    }

    if let Some(caps) = slug_pattern().captures(trimmed) {
        let slug = RepoSlug::new(&caps[1], &caps[2]);
        let clone_url = derive_git_remote_url(api_url, None, &slug.to_string());
        return Ok(RepositoryLocation { slug, clone_url });
    }

    Err(invalid())
}

/// Derive the HTTPS clone URL for a GitHub repository.
///
/// Resolution order:
/// 1. If `git_base_url` is `Some(non-empty)`, use it as the base.
/// 2. Otherwise derive from `api_url`:
///    - `https://api.github.com` → `https://github.com`
///    - `https://<host>/api/v3`  → `https://<host>`
///    - Anything else            → strip trailing slash, use as-is
///
/// The resulting URL is `{base}/{repo}.git` where `repo` is in `owner/name`
/// format.
pub fn derive_git_remote_url(api_url: &str, git_base_url: Option<&str>, repo: &str) -> String {
    let base = derive_git_base_url(api_url, git_base_url);
    format!("{}/{}.git", base, repo)
}

/// Derive just the Git base URL (without repo path).
pub fn derive_git_base_url(api_url: &str, git_base_url: Option<&str>) -> String {
    if let Some(explicit) = git_base_url {
        let trimmed = explicit.trim();
        if !trimmed.is_empty() {
            return trimmed.trim_end_matches('/').to_string();
        }
    }

    let url = api_url.trim().trim_end_matches('/');

    if url.eq_ignore_ascii_case("https://api.github.com") {
        return "https://github.com".to_string();
    }

    // Enterprise: "https://<host>/api/v3" → "https://<host>"
    if let Some(base) = url.strip_suffix("/api/v3") {
        return base.to_string();
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const API: &str = "https://api.github.com";

    #[test]
    fn test_parse_https_url() {
        let loc = parse_repository_url("https://github.com/acme/widgets", API).unwrap();
        assert_eq!(loc.slug, RepoSlug::new("acme", "widgets"));
        assert_eq!(loc.clone_url, "https://github.com/acme/widgets");
    }

    #[test]
    fn test_parse_https_url_with_git_suffix_and_slash() {
        let loc = parse_repository_url("https://github.com/acme/widgets.git/", API).unwrap();
        assert_eq!(loc.slug, RepoSlug::new("acme", "widgets"));
        assert_eq!(loc.clone_url, "https://github.com/acme/widgets.git");
    }

    #[test]
    fn test_parse_scp_url() {
        let loc = parse_repository_url("git@github.com:acme/widgets.git", API).unwrap();
        assert_eq!(loc.slug, RepoSlug::new("acme", "widgets"));
        assert_eq!(loc.clone_url, "git@github.com:acme/widgets.git");
    }

    #[test]
    fn test_parse_bare_slug_derives_clone_url() {
        let loc = parse_repository_url("acme/widgets", API).unwrap();
        assert_eq!(loc.clone_url, "https://github.com/acme/widgets.git");

        let loc = parse_repository_url("org/repo", "https://github.company.com/api/v3").unwrap();
        assert_eq!(loc.clone_url, "https://github.company.com/org/repo.git");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "widgets", "https://github.com/", "not a url/at all"] {
            assert!(
                matches!(
                    parse_repository_url(bad, API),
                    Err(ConfigError::InvalidRepositoryUrl(_))
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_github_com_default() {
        assert_eq!(derive_git_base_url("https://api.github.com/", None), "https://github.com");
        assert_eq!(derive_git_base_url("HTTPS://API.GITHUB.COM", None), "https://github.com");
    }

    #[test]
    fn test_enterprise_api_v3() {
        assert_eq!(
            derive_git_base_url("https://github.company.com/api/v3/", None),
            "https://github.company.com"
        );
    }

    #[test]
    fn test_explicit_git_base_url_overrides() {
        assert_eq!(
            derive_git_base_url(API, Some("https://custom-git.company.com/")),
            "https://custom-git.company.com"
        );
        assert_eq!(derive_git_base_url(API, Some("  ")), "https://github.com");
    }
}
