//! Hub client - repository trees, content URLs, search and cards
//!
//! Only the JSON listing endpoints and the `resolve` content route are used.
//! Directory entries are expanded here so the transfer engine only ever
//! sees file descriptors.

use crate::error::HfmdError;
use futures::future::{self, BoxFuture};
use hfmd_types::{EntryKind, FileDescriptor, RepoKind, RepoRef, RepoSummary, SearchQuery, Settings};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LINK};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// One entry of a `/tree/` listing
#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    lfs: Option<LfsPointer>,
    path: String,
}

#[derive(Debug, Deserialize)]
struct LfsPointer {
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

impl From<TreeEntry> for FileDescriptor {
    fn from(entry: TreeEntry) -> Self {
        let (lfs_oid, lfs_size) = entry
            .lfs
            .map(|lfs| (lfs.oid, lfs.size))
            .unwrap_or((None, None));

        FileDescriptor {
            path: entry.path,
            content_id: lfs_oid.or(entry.oid).unwrap_or_default(),
            size: lfs_size.or(entry.size),
            kind: entry.kind,
        }
    }
}

/// Client for the Hub HTTP API
#[derive(Clone, Debug)]
pub struct HubClient {
    client: Client,
    endpoint: Url,
}

impl HubClient {
    /// Create a client from the persisted settings
    pub fn new(settings: &Settings) -> Result<Self, HfmdError> {
        let client = build_http_client(
            &settings.user_agent,
            Duration::from_secs(settings.connect_timeout_secs),
            settings.token.as_deref(),
        )?;
        Self::with_client(client, &settings.endpoint)
    }

    /// Create a client for an arbitrary endpoint, e.g. a mirror or a test server
    pub fn with_endpoint(endpoint: &str, token: Option<&str>) -> Result<Self, HfmdError> {
        let defaults = Settings::default();
        let client = build_http_client(
            &defaults.user_agent,
            Duration::from_secs(defaults.connect_timeout_secs),
            token,
        )?;
        Self::with_client(client, endpoint)
    }

    fn with_client(client: Client, endpoint: &str) -> Result<Self, HfmdError> {
        let endpoint =
            Url::parse(endpoint).map_err(|e| HfmdError::InvalidUrl(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(HfmdError::InvalidUrl(endpoint.to_string()));
        }
        Ok(Self { client, endpoint })
    }

    /// Shared HTTP client (one connection pool for every transfer)
    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build `endpoint` + the given path segments, percent-encoding each segment
    fn url_with<'s>(&self, segments: impl IntoIterator<Item = &'s str>) -> Result<Url, HfmdError> {
        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| HfmdError::InvalidUrl(self.endpoint.to_string()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// Content URL of a file:
    /// `{endpoint}/[datasets/]{owner}/{name}/resolve/{revision}/{path}`
    pub fn content_url(&self, repo: &RepoRef, path: &str) -> Result<Url, HfmdError> {
        let segments = repo
            .kind
            .url_prefix()
            .into_iter()
            .chain(repo.id.split('/'))
            .chain(["resolve", repo.revision.as_str()])
            .chain(path.split('/').filter(|s| !s.is_empty()));
        self.url_with(segments)
    }

    fn tree_url(&self, repo: &RepoRef, dir: Option<&str>) -> Result<Url, HfmdError> {
        let segments = ["api", repo.kind.api_collection()]
            .into_iter()
            .chain(repo.id.split('/'))
            .chain(["tree", repo.revision.as_str()])
            .chain(dir.into_iter().flat_map(|d| d.split('/')).filter(|s| !s.is_empty()));
        self.url_with(segments)
    }

    /// List every file of a repository, expanding directories recursively
    pub async fn list_tree(&self, repo: &RepoRef) -> Result<Vec<FileDescriptor>, HfmdError> {
        info!("Listing files of {}", repo);
        let mut files = self.list_dir(repo, None).await?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("{} has {} files", repo, files.len());
        Ok(files)
    }

    fn list_dir<'a>(
        &'a self,
        repo: &'a RepoRef,
        dir: Option<String>,
    ) -> BoxFuture<'a, Result<Vec<FileDescriptor>, HfmdError>> {
        Box::pin(async move {
            let mut next = Some(self.tree_url(repo, dir.as_deref())?);
            let mut files = Vec::new();
            let mut subdirs = Vec::new();

            while let Some(url) = next.take() {
                let (entries, next_page) = self.fetch_tree_page(url).await?;
                for entry in entries {
                    match entry.kind {
                        EntryKind::File => files.push(FileDescriptor::from(entry)),
                        EntryKind::Directory => subdirs.push(entry.path),
                    }
                }
                next = next_page;
            }

            // Sibling directories are listed concurrently
            let nested =
                future::try_join_all(subdirs.into_iter().map(|d| self.list_dir(repo, Some(d)))).await?;
            files.extend(nested.into_iter().flatten());

            Ok(files)
        })
    }

    async fn fetch_tree_page(&self, url: Url) -> Result<(Vec<TreeEntry>, Option<Url>), HfmdError> {
        debug!("GET {}", url);
        let response = check_status(self.client.get(url).send().await?)?;
        let next = next_page(response.headers());
        let entries = response.json::<Vec<TreeEntry>>().await?;
        Ok((entries, next))
    }

    /// Search models or datasets
    pub async fn search(
        &self,
        kind: RepoKind,
        query: &SearchQuery,
    ) -> Result<Vec<RepoSummary>, HfmdError> {
        let url = self.url_with(["api", kind.api_collection()])?;

        let mut params: Vec<(&str, String)> = vec![("full", "true".to_string())];
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.to_string()));
        }
        if let Some(author) = query.author.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("author", author.to_string()));
        }
        if let Some(sort) = query.sort.as_deref() {
            params.push(("sort", sort.to_string()));
            if query.descending {
                params.push(("direction", "-1".to_string()));
            }
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }

        debug!("GET {} {:?}", url, params);
        let response = check_status(self.client.get(url).query(&params).send().await?)?;
        Ok(response.json::<Vec<RepoSummary>>().await?)
    }

    /// Fetch the repository card (README.md), `None` when the repository has none
    pub async fn fetch_card(&self, repo: &RepoRef) -> Result<Option<String>, HfmdError> {
        let url = self.content_url(repo, "README.md")?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response)?;
        Ok(Some(response.text().await?))
    }
}

fn build_http_client(
    user_agent: &str,
    connect_timeout: Duration,
    token: Option<&str>,
) -> Result<Client, HfmdError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| HfmdError::Config("access token contains invalid characters".to_string()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    // No overall timeout: a single file can take hours
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(connect_timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| HfmdError::Config(e.to_string()))
}

/// Turn a non-success response into `HfmdError::Status`
pub(crate) fn check_status(response: Response) -> Result<Response, HfmdError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(HfmdError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

/// Parse the `rel="next"` target of a `Link` header
fn next_page(headers: &HeaderMap) -> Option<Url> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| matches!(p.trim(), "rel=\"next\"" | "rel=next"));
        if !is_next {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        Url::parse(target).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hub() -> HubClient {
        HubClient::with_endpoint("https://hf.example", None).unwrap()
    }

    #[test]
    fn model_content_url() {
        let url = hub()
            .content_url(&RepoRef::model("org/model"), "sub/dir/weights.bin")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://hf.example/org/model/resolve/main/sub/dir/weights.bin"
        );
    }

    #[test]
    fn dataset_content_url_encodes_segments() {
        let repo = RepoRef::new(RepoKind::Dataset, "org/data", "refs/pr/1");
        let url = hub().content_url(&repo, "a b/c#d.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://hf.example/datasets/org/data/resolve/refs%2Fpr%2F1/a%20b/c%23d.csv"
        );
    }

    #[test]
    fn tree_url_for_nested_directory() {
        let url = hub()
            .tree_url(&RepoRef::dataset("org/data"), Some("train/shards"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://hf.example/api/datasets/org/data/tree/main/train/shards"
        );
    }

    #[test]
    fn lfs_metadata_wins_over_pointer() {
        let entry: TreeEntry = serde_json::from_str(
            r#"{"type":"file","oid":"blob","size":134,
                "lfs":{"oid":"sha256abc","size":5000,"pointerSize":134},
                "path":"model.safetensors"}"#,
        )
        .unwrap();
        let descriptor = FileDescriptor::from(entry);
        assert_eq!(descriptor.content_id, "sha256abc");
        assert_eq!(descriptor.size, Some(5000));
        assert!(descriptor.is_file());
    }

    #[test]
    fn link_header_next_page() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://hf.example/api/models/a/b/tree/main?cursor=xyz>; rel=\"next\"",
            ),
        );
        let next = next_page(&headers).unwrap();
        assert_eq!(next.query(), Some("cursor=xyz"));

        assert!(next_page(&HeaderMap::new()).is_none());
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            HubClient::with_endpoint("not a url", None),
            Err(HfmdError::InvalidUrl(_))
        ));
    }
}
