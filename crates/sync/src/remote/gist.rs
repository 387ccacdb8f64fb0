use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, LINK, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Container, ContainerFile, RemoteContainer, RemoteResult, RetryPolicy};
use crate::error::RemoteError;

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_PAGE_SIZE: u32 = 100;
/// Pages of the gist listing followed before giving up.
const MAX_LIST_PAGES: usize = 50;

/// GitHub Gist backend over blocking HTTP.
pub struct GistClient {
    http: Client,
    api_base: String,
    token: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

/// Where a file's full content comes from.
#[derive(Debug, PartialEq, Eq)]
enum FileSource {
    Inline(String),
    Raw(String),
}

impl GistFile {
    /// Truncated inline content is never returned as if it were complete.
    fn source(self, filename: &str) -> RemoteResult<FileSource> {
        match (self.content, self.truncated, self.raw_url) {
            (Some(content), false, _) => Ok(FileSource::Inline(content)),
            (_, _, Some(raw_url)) => Ok(FileSource::Raw(raw_url)),
            (None, false, None) => Ok(FileSource::Inline(String::new())),
            (_, true, None) => Err(RemoteError::Decode(format!(
                "{filename} is truncated and has no raw url"
            ))),
        }
    }
}

impl GistClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> RemoteResult<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("ccu/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_GITHUB_JSON)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> RemoteResult<T> {
        self.send_page(operation, build).map(|(value, _)| value)
    }

    /// Like `send_json`, also returning the `rel="next"` link if any.
    fn send_page<T: DeserializeOwned>(
        &self,
        operation: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> RemoteResult<(T, Option<String>)> {
        self.retry.run(operation, || {
            let response = self
                .authorized(build())
                .send()
                .map_err(|err| RemoteError::Transport(err.to_string()))?;
            let response = check_status(response)?;
            let next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_page_url);
            let value = response
                .json::<T>()
                .map_err(|err| RemoteError::Decode(err.to_string()))?;
            Ok((value, next))
        })
    }

    fn fetch_gist(&self, id: &str) -> RemoteResult<GistResponse> {
        let url = format!("{}/gists/{}", self.api_base, id);
        self.send_json("get_gist", || self.http.get(&url))
    }

    fn fetch_raw(&self, raw_url: &str) -> RemoteResult<String> {
        debug!(raw_url, "fetching truncated gist file");
        self.retry.run("get_raw", || {
            let response = self
                .authorized(self.http.get(raw_url))
                .send()
                .map_err(|err| RemoteError::Transport(err.to_string()))?;
            check_status(response)?
                .text()
                .map_err(|err| RemoteError::Decode(err.to_string()))
        })
    }
}

impl RemoteContainer for GistClient {
    fn create_container(
        &self,
        files: &BTreeMap<String, String>,
        description: &str,
    ) -> RemoteResult<String> {
        let files: serde_json::Map<String, Value> = files
            .iter()
            .map(|(name, content)| (name.clone(), json!({ "content": content })))
            .collect();
        let body = json!({
            "description": description,
            "public": false,
            "files": files,
        });
        let url = format!("{}/gists", self.api_base);
        let gist: GistResponse =
            self.send_json("create_gist", || self.http.post(&url).json(&body))?;
        Ok(gist.id)
    }

    fn get_container(&self, id: &str) -> RemoteResult<Container> {
        let gist = self.fetch_gist(id)?;
        Ok(Container {
            id: gist.id,
            description: gist.description.unwrap_or_default(),
            url: gist.html_url,
            created_at: gist.created_at,
            updated_at: gist.updated_at,
            files: gist
                .files
                .into_iter()
                .map(|(name, file)| ContainerFile {
                    name,
                    size: file.size,
                })
                .collect(),
        })
    }

    fn update_container(
        &self,
        id: &str,
        files: &BTreeMap<String, Option<String>>,
    ) -> RemoteResult<()> {
        let files: serde_json::Map<String, Value> = files
            .iter()
            .map(|(name, content)| {
                let value = match content {
                    Some(content) => json!({ "content": content }),
                    None => Value::Null,
                };
                (name.clone(), value)
            })
            .collect();
        let body = json!({ "files": files });
        let url = format!("{}/gists/{}", self.api_base, id);
        let _: GistResponse = self.send_json("update_gist", || self.http.patch(&url).json(&body))?;
        Ok(())
    }

    fn find_by_description(&self, description: &str) -> RemoteResult<Option<String>> {
        let mut url = Some(format!("{}/gists?per_page={}", self.api_base, LIST_PAGE_SIZE));
        let mut pages = 0usize;
        while let Some(page_url) = url.take() {
            pages += 1;
            let (gists, next): (Vec<GistResponse>, _) =
                self.send_page("list_gists", || self.http.get(&page_url))?;
            if let Some(gist) = gists
                .into_iter()
                .find(|gist| gist.description.as_deref() == Some(description))
            {
                return Ok(Some(gist.id));
            }
            if pages >= MAX_LIST_PAGES {
                warn!(pages, "stopped searching gist listing");
                break;
            }
            url = next;
        }
        Ok(None)
    }

    fn get_file_content(&self, id: &str, filename: &str) -> RemoteResult<Option<String>> {
        let mut gist = self.fetch_gist(id)?;
        let Some(file) = gist.files.remove(filename) else {
            return Ok(None);
        };
        match file.source(filename)? {
            FileSource::Inline(content) => Ok(Some(content)),
            FileSource::Raw(raw_url) => self.fetch_raw(&raw_url).map(Some),
        }
    }
}

/// Picks the `rel="next"` target out of an RFC 8288 `Link` header.
fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|target| target.strip_suffix('>'))
            .map(str::to_string)
    })
}

fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after_secs = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    // GitHub reports an exhausted primary rate limit as 403.
    let quota_exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        == Some("0");
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(RemoteError::RateLimited { retry_after_secs }),
        StatusCode::FORBIDDEN if quota_exhausted => {
            Err(RemoteError::RateLimited { retry_after_secs })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RemoteError::InvalidToken(status.as_u16()))
        }
        _ => {
            let message = response.text().unwrap_or_default();
            Err(RemoteError::Http {
                status: status.as_u16(),
                message,
            })
        }
    }
}
