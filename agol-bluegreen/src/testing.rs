//! In-memory [`Portal`] used by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use eyre::Result;
use serde_json::Value as JsonValue;

use crate::portal::{check_response, Params, Portal};

#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub params: Vec<(String, String)>,
}

impl RecordedPost {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parses a parameter that carries a JSON document.
    pub fn json_param(&self, name: &str) -> JsonValue {
        let raw = self
            .param(name)
            .unwrap_or_else(|| panic!("POST to {} has no \"{}\" parameter", self.url, name));
        serde_json::from_str(raw).unwrap()
    }
}

/// Serves canned responses keyed by URL. When several responses are queued
/// for the same URL they are returned in order, and the last one repeats.
#[derive(Debug, Default)]
pub struct FakePortal {
    gets: RefCell<HashMap<String, VecDeque<JsonValue>>>,
    posts: RefCell<HashMap<String, VecDeque<JsonValue>>>,
    get_log: RefCell<Vec<String>>,
    post_log: RefCell<Vec<RecordedPost>>,
}

impl FakePortal {
    pub fn with_get<S: AsRef<str>>(self, url: S, response: JsonValue) -> Self {
        push(&self.gets, url.as_ref(), response);
        self
    }

    pub fn with_post<S: AsRef<str>>(self, url: S, response: JsonValue) -> Self {
        push(&self.posts, url.as_ref(), response);
        self
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.post_log.borrow().clone()
    }

    pub fn post_urls(&self) -> Vec<String> {
        self.post_log
            .borrow()
            .iter()
            .map(|p| p.url.clone())
            .collect()
    }

    pub fn get_count(&self, url: &str) -> usize {
        self.get_log.borrow().iter().filter(|u| *u == url).count()
    }
}

fn push(map: &RefCell<HashMap<String, VecDeque<JsonValue>>>, url: &str, response: JsonValue) {
    map.borrow_mut()
        .entry(url.to_string())
        .or_default()
        .push_back(response);
}

fn pop(map: &RefCell<HashMap<String, VecDeque<JsonValue>>>, method: &str, url: &str) -> JsonValue {
    let mut map = map.borrow_mut();
    let queue = map
        .get_mut(url)
        .unwrap_or_else(|| panic!("unexpected {} {}", method, url));
    if queue.len() > 1 {
        queue.pop_front().unwrap()
    } else {
        queue.front().cloned().unwrap()
    }
}

impl Portal for FakePortal {
    fn get(&self, url: &str, _query: &Params) -> Result<JsonValue> {
        self.get_log.borrow_mut().push(url.to_string());
        check_response(pop(&self.gets, "GET", url))
    }

    fn post(&self, url: &str, form: &Params) -> Result<JsonValue> {
        self.post_log.borrow_mut().push(RecordedPost {
            url: url.to_string(),
            params: form.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        });
        check_response(pop(&self.posts, "POST", url))
    }
}
