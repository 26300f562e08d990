//! Live remote source backed by the `gh` CLI.
//!
//! Every call is one `gh api` invocation authenticated with the resolved
//! token via `GH_TOKEN`. Listings run with `--include` so the `Link` header
//! can be followed one page at a time; detail lookups let `gh --paginate`
//! walk all pages itself.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::model::{
    Comment, Commit, IssueItem, IssueState, Member, Notification, RawItem, Repository, Review,
    Tag, Target,
};

use super::{
    Cursor, DetailKind, Details, ListQuery, Mutation, Page, RemoteError, RemoteSource, Result,
};

const PER_PAGE: &str = "100";
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// `RemoteSource` that shells out to `gh api`.
#[derive(Debug, Clone)]
pub struct GhRemote {
    token: String,
    timeout: Duration,
}

impl GhRemote {
    /// A client authenticating with `token`, bounding each call by `timeout`.
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            token: token.into(),
            timeout,
        }
    }

    /// Run `gh` with the given args and return stdout.
    ///
    /// The child is killed once the timeout elapses.
    fn gh(&self, args: &[&str]) -> Result<String> {
        let command = args.join(" ");
        debug!(%command, "running gh");

        let mut child = Command::new("gh")
            .args(args)
            .env("GH_TOKEN", &self.token)
            .env("GH_PROMPT_DISABLED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RemoteError::Spawn)?;

        // Drain both pipes off-thread so a chatty child never blocks on a full pipe.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match wait_with_deadline(&mut child, self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = kill_and_reap(&mut child);
                return Err(RemoteError::Timeout {
                    command,
                    timeout: self.timeout,
                });
            }
            Err(e) => {
                let _ = kill_and_reap(&mut child);
                return Err(RemoteError::Spawn(e));
            }
        };

        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if status.success() {
            Ok(stdout)
        } else {
            Err(classify_failure(command, stderr.trim()))
        }
    }

    fn fetch_page(&self, query: &ListQuery, cursor: Option<Cursor>) -> Result<Page> {
        let page = cursor.map_or(1, |c| c.0).to_string();
        let page_param = format!("page={page}");
        let per_page_param = format!("per_page={PER_PAGE}");

        let mut params: Vec<String> = vec![per_page_param, page_param];
        let endpoint = match query {
            ListQuery::Notifications => "notifications".to_string(),
            ListQuery::SearchIssues { query, sort } => {
                params.push(format!("q={query}"));
                if let Some(sort) = sort {
                    params.push(format!("sort={sort}"));
                }
                "search/issues".to_string()
            }
            ListQuery::OrganizationRepositories { organization } => {
                params.push("type=public".to_string());
                format!("orgs/{organization}/repos")
            }
            ListQuery::TeamMembers { team_id } => {
                params.push("role=all".to_string());
                format!("teams/{team_id}/members")
            }
        };

        let mut args = vec!["api", "--include", "--method", "GET", endpoint.as_str()];
        for p in &params {
            args.extend(["-f", p.as_str()]);
        }

        let raw = self.gh(&args)?;
        let (headers, body) = split_response(&raw);
        let next = next_cursor(headers);

        let items = match query {
            ListQuery::Notifications => decode::<Vec<Notification>>(body, &endpoint)?
                .into_iter()
                .map(RawItem::Notification)
                .collect(),
            ListQuery::SearchIssues { .. } => decode::<SearchResults>(body, &endpoint)?
                .items
                .into_iter()
                .map(RawItem::Issue)
                .collect(),
            ListQuery::OrganizationRepositories { .. } => {
                decode::<Vec<Repository>>(body, &endpoint)?
                    .into_iter()
                    .map(RawItem::Repository)
                    .collect()
            }
            ListQuery::TeamMembers { .. } => decode::<Vec<Member>>(body, &endpoint)?
                .into_iter()
                .map(RawItem::Member)
                .collect(),
        };

        Ok(Page { items, next })
    }
}

impl RemoteSource for GhRemote {
    fn list(&self, query: &ListQuery, cursor: Option<Cursor>) -> Result<Page> {
        self.fetch_page(query, cursor)
    }

    fn details(&self, target: &Target, kind: &DetailKind) -> Result<Details> {
        let collection = target.collection();
        let base = format!("repos/{}/{}", collection.owner, collection.name);
        let item = |suffix: &str| -> Result<String> {
            let number = target.number().ok_or(RemoteError::Shape {
                expected: "numbered item",
                got: "repository",
            })?;
            Ok(format!("{base}/{suffix}/{number}"))
        };

        match kind {
            DetailKind::Comments => {
                let endpoint = format!("{}/comments", item("issues")?);
                let json = self.gh(&["api", "--paginate", &endpoint])?;
                decode_pages::<Comment>(&json, &endpoint).map(Details::Comments)
            }
            DetailKind::Reviews => {
                let endpoint = format!("{}/reviews", item("pulls")?);
                let json = self.gh(&["api", "--paginate", &endpoint])?;
                decode_pages::<Review>(&json, &endpoint).map(Details::Reviews)
            }
            DetailKind::IssueState => {
                let endpoint = item("issues")?;
                let json = self.gh(&["api", &endpoint])?;
                let issue: IssueView = decode(&json, &endpoint)?;
                Ok(Details::IssueState(issue.state))
            }
            DetailKind::Tags => {
                let endpoint = format!("{base}/tags");
                let json = self.gh(&["api", "--paginate", &endpoint])?;
                decode_pages::<Tag>(&json, &endpoint).map(Details::Tags)
            }
            DetailKind::Commit { sha } => {
                let endpoint = format!("{base}/git/commits/{sha}");
                let json = self.gh(&["api", &endpoint])?;
                let commit: Commit = decode(&json, &endpoint)?;
                Ok(Details::Commit(Box::new(commit)))
            }
        }
    }

    fn mutate(&self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::MarkThreadRead { thread_id } => {
                let endpoint = format!("notifications/threads/{thread_id}");
                self.gh(&["api", "--method", "PATCH", &endpoint])?;
                Ok(())
            }
        }
    }
}

// ── Response shapes ──

/// JSON shape of `GET /search/issues`.
#[derive(Deserialize)]
struct SearchResults {
    items: Vec<IssueItem>,
}

/// The only field read from `GET /repos/{o}/{r}/issues/{n}`.
#[derive(Deserialize)]
struct IssueView {
    state: IssueState,
}

// ── Helpers ──

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

/// Poll the child until it exits or the deadline passes (`Ok(None)`).
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kill the child if it is still running, then wait so it leaves no zombie.
fn kill_and_reap(child: &mut Child) -> io::Result<ExitStatus> {
    // Fails only if the child already exited, which `wait` handles.
    let _ = child.kill();
    child.wait()
}

/// Map a failed `gh` invocation to an error kind using its stderr.
fn classify_failure(command: String, stderr: &str) -> RemoteError {
    if stderr.contains("HTTP 401") || stderr.contains("Bad credentials") {
        RemoteError::Unauthorized(stderr.to_string())
    } else if stderr.contains("HTTP 404") {
        RemoteError::NotFound(stderr.to_string())
    } else {
        RemoteError::Command {
            command,
            stderr: stderr.to_string(),
        }
    }
}

/// Split `gh api --include` output into (headers, body).
fn split_response(raw: &str) -> (&str, &str) {
    for sep in ["\r\n\r\n", "\n\n"] {
        if let Some((headers, body)) = raw.split_once(sep) {
            return (headers, body);
        }
    }
    ("", raw)
}

/// Extract the page number of the `rel="next"` link, if any.
///
/// `Link: <https://api.github.com/notifications?page=2>; rel="next", <...>; rel="last"`
fn next_cursor(headers: &str) -> Option<Cursor> {
    let link = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim().eq_ignore_ascii_case("link").then_some(value)
    })?;

    link.split(',').find_map(|entry| {
        let (url, rel) = entry.split_once(';')?;
        if !rel.contains("rel=\"next\"") {
            return None;
        }
        let url = url.trim().trim_start_matches('<').trim_end_matches('>');
        let (_, query) = url.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "page").then(|| value.parse::<u32>().ok().map(Cursor)).flatten()
        })
    })
}

fn decode<T: DeserializeOwned>(json: &str, what: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|source| RemoteError::Decode {
        what: what.to_string(),
        source,
    })
}

/// Decode `gh --paginate` output: one JSON array per page, back to back.
fn decode_pages<T: DeserializeOwned>(json: &str, what: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for page in serde_json::Deserializer::from_str(json).into_iter::<Vec<T>>() {
        let page = page.map_err(|source| RemoteError::Decode {
            what: what.to_string(),
            source,
        })?;
        items.extend(page);
    }
    Ok(items)
}
