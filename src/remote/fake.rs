//! Scripted in-memory remote for tests.
//!
//! Listings are scripted page by page, details per (target, kind), and every
//! call is recorded so tests can assert on what reached the remote.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::model::{RawItem, Target};

use super::{
    Cursor, DetailKind, Details, ListQuery, Mutation, Page, RemoteError, RemoteSource, Result,
};

/// A scripted listing page.
#[derive(Debug, Clone)]
pub enum FakePage {
    Items(Vec<RawItem>),
    /// Fails with a recoverable error.
    Fail,
    /// Fails with a fatal (auth) error.
    Unauthorized,
}

#[derive(Debug, Clone)]
enum Reply {
    Ok(Details),
    Fail,
}

#[derive(Default)]
pub struct FakeRemote {
    pages: Mutex<HashMap<ListQuery, Vec<FakePage>>>,
    details: Mutex<HashMap<(Target, DetailKind), Reply>>,
    latency: Mutex<HashMap<Target, Duration>>,
    failing_mutations: Mutex<HashSet<Mutation>>,

    /// Every `list` call: (query, cursor).
    pub list_calls: Mutex<Vec<(ListQuery, Option<Cursor>)>>,
    /// Every `details` call.
    pub detail_calls: Mutex<Vec<(Target, DetailKind)>>,
    /// Every `mutate` call, including failed ones.
    pub mutations: Mutex<Vec<Mutation>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the pages of a listing, in order.
    pub fn set_pages(&self, query: ListQuery, pages: Vec<FakePage>) {
        self.pages.lock().unwrap().insert(query, pages);
    }

    pub fn set_details(&self, target: Target, kind: DetailKind, details: Details) {
        self.details
            .lock()
            .unwrap()
            .insert((target, kind), Reply::Ok(details));
    }

    pub fn fail_details(&self, target: Target, kind: DetailKind) {
        self.details
            .lock()
            .unwrap()
            .insert((target, kind), Reply::Fail);
    }

    /// Delay every detail call for `target`.
    pub fn set_latency(&self, target: Target, latency: Duration) {
        self.latency.lock().unwrap().insert(target, latency);
    }

    pub fn fail_mutation(&self, mutation: Mutation) {
        self.failing_mutations.lock().unwrap().insert(mutation);
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    pub fn detail_call_count(&self) -> usize {
        self.detail_calls.lock().unwrap().len()
    }
}

impl RemoteSource for FakeRemote {
    fn list(&self, query: &ListQuery, cursor: Option<Cursor>) -> Result<Page> {
        self.list_calls
            .lock()
            .unwrap()
            .push((query.clone(), cursor));

        let pages = self.pages.lock().unwrap();
        let Some(pages) = pages.get(query) else {
            return Ok(Page::default());
        };

        let index = cursor.map_or(0, |c| c.0 as usize - 1);
        let next = (index + 1 < pages.len()).then(|| Cursor(u32::try_from(index + 2).unwrap()));

        match pages.get(index) {
            Some(FakePage::Items(items)) => Ok(Page {
                items: items.clone(),
                next,
            }),
            Some(FakePage::Fail) => Err(RemoteError::Command {
                command: format!("list {query:?}"),
                stderr: "gh: Server Error (HTTP 502)".to_string(),
            }),
            Some(FakePage::Unauthorized) => Err(RemoteError::Unauthorized(
                "gh: Bad credentials (HTTP 401)".to_string(),
            )),
            None => Ok(Page::default()),
        }
    }

    fn details(&self, target: &Target, kind: &DetailKind) -> Result<Details> {
        self.detail_calls
            .lock()
            .unwrap()
            .push((target.clone(), kind.clone()));

        let latency = self.latency.lock().unwrap().get(target).copied();
        if let Some(latency) = latency {
            thread::sleep(latency);
        }

        let reply = self
            .details
            .lock()
            .unwrap()
            .get(&(target.clone(), kind.clone()))
            .cloned();

        match reply {
            Some(Reply::Ok(details)) => Ok(details),
            Some(Reply::Fail) => Err(RemoteError::Command {
                command: format!("details {target}"),
                stderr: "gh: Server Error (HTTP 500)".to_string(),
            }),
            None => Err(RemoteError::NotFound(target.to_string())),
        }
    }

    fn mutate(&self, mutation: &Mutation) -> Result<()> {
        self.mutations.lock().unwrap().push(mutation.clone());

        if self.failing_mutations.lock().unwrap().contains(mutation) {
            return Err(RemoteError::Command {
                command: format!("mutate {mutation:?}"),
                stderr: "gh: Forbidden (HTTP 403)".to_string(),
            });
        }
        Ok(())
    }
}
