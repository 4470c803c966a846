//! Minimal GitHub REST client for commit listings
//!
//! Follows `Link: <...>; rel="next"` pagination until the last page.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, LINK};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

static NEXT_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("next link pattern")
});

#[derive(Debug, Clone, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub commit: CommitInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitInfo {
    pub author: CommitAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitDetail {
    #[serde(default)]
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileChange {
    pub additions: u64,
    pub deletions: u64,
}

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Every commit reachable from `branch`, newest first.
    pub async fn list_commits(&self, owner: &str, repo: &str, branch: &str) -> Result<Vec<CommitSummary>> {
        let base = format!("{}/repos/{}/{}/commits", self.api_base, owner, repo);
        let first = reqwest::Url::parse_with_params(&base, &[("sha", branch)])
            .with_context(|| format!("Invalid commits URL {}", base))?;
        self.get_paginated::<Vec<CommitSummary>>(first.into())
            .await
            .map(|pages| pages.into_iter().flatten().collect())
    }

    /// Files touched by one commit, across all detail pages.
    pub async fn commit_files(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<FileChange>> {
        let first = format!("{}/repos/{}/{}/commits/{}", self.api_base, owner, repo, sha);
        self.get_paginated::<CommitDetail>(first)
            .await
            .map(|pages| pages.into_iter().flat_map(|d| d.files).collect())
    }

    async fn get_paginated<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>> {
        let mut pages = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next {
            let mut request = self
                .http
                .get(&url)
                .header(ACCEPT, "application/vnd.github+json");
            if let Some(token) = &self.token {
                request = request.header(AUTHORIZATION, format!("token {}", token));
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Request to {} failed", url))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                anyhow::bail!("GitHub returned {} for {}: {}", status, url, body.trim());
            }

            next = next_link(response.headers());
            let page = response
                .json::<T>()
                .await
                .with_context(|| format!("Unexpected response body from {}", url))?;
            pages.push(page);
        }
        Ok(pages)
    }
}

fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| NEXT_LINK_RE.captures(v).map(|c| c[1].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                r#"<https://api.github.com/repositories/1/commits?page=2>; rel="next", <https://api.github.com/repositories/1/commits?page=5>; rel="last""#,
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/repositories/1/commits?page=2")
        );

        headers.insert(
            LINK,
            HeaderValue::from_static(r#"<https://api.github.com/x?page=1>; rel="prev""#),
        );
        assert_eq!(next_link(&headers), None);
    }

    #[tokio::test]
    async fn test_list_commits_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let page2 = format!("{}/repos/o/r/commits?sha=dev&page=2", server.url());
        let _first = server
            .mock("GET", "/repos/o/r/commits")
            .match_query(mockito::Matcher::Exact("sha=dev".into()))
            .match_header("authorization", "token secret")
            .with_header("link", &format!(r#"<{}>; rel="next""#, page2))
            .with_body(r#"[{"sha":"a1","commit":{"author":{"name":"Ada"}}}]"#)
            .create_async()
            .await;
        let _second = server
            .mock("GET", "/repos/o/r/commits")
            .match_query(mockito::Matcher::Exact("sha=dev&page=2".into()))
            .with_body(r#"[{"sha":"b2","commit":{"author":{"name":"Lin"}}}]"#)
            .create_async()
            .await;

        let client = GitHubClient::new(server.url(), Some("secret".to_string())).unwrap();
        let commits = client.list_commits("o", "r", "dev").await.unwrap();
        let shas: Vec<_> = commits.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["a1", "b2"]);
    }

    #[tokio::test]
    async fn test_branch_is_query_encoded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/commits")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("sha".into(), "feature/x y&z".into()),
                mockito::Matcher::Regex("^sha=[^&]*$".into()),
            ]))
            .with_body("[]")
            .create_async()
            .await;

        let client = GitHubClient::new(server.url(), None).unwrap();
        let commits = client.list_commits("o", "r", "feature/x y&z").await.unwrap();
        assert!(commits.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_listing_error_is_raised() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .with_body(r#"{"message":"Not Found"}"#)
            .create_async()
            .await;

        let client = GitHubClient::new(server.url(), None).unwrap();
        assert!(client.list_commits("o", "r", "dev").await.is_err());
    }
}
