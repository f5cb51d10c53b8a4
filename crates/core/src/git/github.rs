//! GitHub REST API client: the source of candidate pull requests.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::errors::GitHubError;
use crate::models::{Candidate, CandidateSource, Mergeability, RepoSlug};

const PER_PAGE: usize = 100;
const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub name: String,
    pub full_name: String,
    pub owner: GitHubOwner,
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: Option<String>,
}

impl GitHubRepository {
    pub fn slug(&self) -> RepoSlug {
        RepoSlug::new(&self.owner.login, &self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
    /// `None` when the head repository (typically a fork) was deleted.
    pub repo: Option<GitHubRepository>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub draft: bool,
    pub head: PullRequestRef,
    pub base: PullRequestRef,
    /// Only present on single-PR responses, and `null` while GitHub is still
    /// computing it.
    #[serde(default)]
    pub mergeable: Option<bool>,
}

impl PullRequest {
    /// Snapshot this pull request as a [`Candidate`] against `base_repo`.
    pub fn to_candidate(&self, base_repo: &RepoSlug) -> Candidate {
        let head_repo = self
            .head
            .repo
            .as_ref()
            .map(|r| (r.slug(), r.clone_url.clone()));
        Candidate {
            number: self.number,
            title: self.title.clone(),
            source: CandidateSource::classify(base_repo, head_repo, &self.head.ref_name),
            base_ref: self.base.ref_name.clone(),
            draft: self.draft,
            mergeability: Mergeability::from(self.mergeable),
        }
    }
}

/// Asynchronous GitHub REST API client.
#[derive(Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: impl Into<String>) -> Result<Self, GitHubError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let token = token.into();
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("prconflict/0.1"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        info!(api_url = %api_url, "created GitHubClient");
        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get_repository(&self, repo: &RepoSlug) -> Result<GitHubRepository, GitHubError> {
        let url = format!("{}/repos/{}", self.api_url, repo);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        check_response(&resp)?;
        let info: GitHubRepository = resp
            .json()
            .await
            .map_err(|e| GitHubError::ParseError(e.to_string()))?;
        debug!(default_branch = ?info.default_branch, "fetched repository");
        Ok(info)
    }

    /// All open pull requests, following pagination. When `base` is given the
    /// API filters by target branch server-side.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn list_open_pull_requests(
        &self,
        repo: &RepoSlug,
        base: Option<&str>,
    ) -> Result<Vec<PullRequest>, GitHubError> {
        let url = format!("{}/repos/{}/pulls", self.api_url, repo);
        let per_page = PER_PAGE.to_string();
        let mut all = Vec::new();

        for page in 1..=MAX_PAGES {
            let page_str = page.to_string();
            let mut req = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .query(&[("state", "open"), ("per_page", per_page.as_str()), ("page", page_str.as_str())]);
            if let Some(base) = base {
                req = req.query(&[("base", base)]);
            }
            let resp = req.send().await?;
            check_response(&resp)?;
            let batch: Vec<PullRequest> = resp
                .json()
                .await
                .map_err(|e| GitHubError::ParseError(e.to_string()))?;
            let len = batch.len();
            all.extend(batch);
            if len < PER_PAGE {
                break;
            }
        }

        debug!(count = all.len(), "fetched open pull requests");
        Ok(all)
    }

    /// Get a single pull request, including its `mergeable` flag.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn get_pull_request(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, GitHubError> {
        let url = format!("{}/repos/{}/pulls/{}", self.api_url, repo, number);
        let resp = self.http.get(&url).bearer_auth(&self.token).send().await?;
        check_response(&resp)?;
        let pr: PullRequest = resp
            .json()
            .await
            .map_err(|e| GitHubError::ParseError(e.to_string()))?;
        debug!(number = pr.number, mergeable = ?pr.mergeable, "fetched pull request");
        Ok(pr)
    }

    /// Open pull requests targeting `base` as candidates, with mergeability
    /// filled in for every non-draft one.
    ///
    /// Takes the repository as returned by [`Self::get_repository`]: fork
    /// classification compares against its canonical owner/name, which can
    /// differ from a user-supplied URL after a rename or transfer.
    pub async fn fetch_candidates(
        &self,
        repository: &GitHubRepository,
        base: &str,
    ) -> Result<Vec<Candidate>, GitHubError> {
        let repo = repository.slug();
        let listed = self.list_open_pull_requests(&repo, Some(base)).await?;
        let mut candidates = Vec::with_capacity(listed.len());
        for pr in listed {
            let pr = if pr.draft {
                pr
            } else {
                self.get_pull_request(&repo, pr.number).await?
            };
            candidates.push(pr.to_candidate(&repo));
        }
        info!(count = candidates.len(), base, "fetched candidates");
        Ok(candidates)
    }
}

fn check_response(resp: &reqwest::Response) -> Result<(), GitHubError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        // GitHub signals an exhausted primary rate limit with 403.
        if resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0")
        {
            return Err(rate_limited(resp));
        }
        return Err(GitHubError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    if status.as_u16() == 429 {
        return Err(rate_limited(resp));
    }
    Err(GitHubError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}

fn rate_limited(resp: &reqwest::Response) -> GitHubError {
    let reset = resp
        .headers()
        .get("x-ratelimit-reset")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    GitHubError::RateLimited { reset_at: reset }
}
