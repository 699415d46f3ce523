//! The request → allow/deny decision core.
//!
//! Each resolution is a stateless transaction against a fresh snapshot of
//! the store: one enumeration supplies both the candidate secret and the
//! filter lists that guard it, so the two can never disagree about store
//! state.

use crate::error::{Dimension, ResolveError, StoreError};
use crate::store::{Entry, StoreClient};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// When a request carries no secret name, look up this entry. Vaults that
/// hold a single secret keep it under this key.
pub const DEFAULT_SECRET_NAME: &str = "value";

/// Reserved entry keys whose values are access-control lists, not secrets.
pub const EVENTS_ENTRY_KEY: &str = "X-Drone-Events";
pub const REPOS_ENTRY_KEY: &str = "X-Drone-Repos";
pub const BRANCHES_ENTRY_KEY: &str = "X-Drone-Branches";

/// Inputs to one resolution, constructed per inbound call.
#[derive(Debug, Clone)]
pub struct SecretRequest {
    pub store_name: String,
    /// May be empty; the effective name then defaults to `"value"`.
    pub secret_name: String,
    pub build_event: String,
    pub repo_slug: String,
    pub target_branch: String,
}

/// A fully validated secret, plus the fixed delivery capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub name: String,
    pub value: String,
    /// Always true at this layer; denying pull-request builds is expressed
    /// through the events filter instead.
    pub pull_request: bool,
    pub pull_request_push: bool,
}

/// An ordered allow-list parsed from one reserved entry's value.
///
/// Tokens are comma-separated, trimmed of ASCII whitespace, and matched by
/// case-sensitive string equality. An empty list allows everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterList(Vec<String>);

impl FilterList {
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Empty filter means no restriction; otherwise the attribute must
    /// equal one of the tokens exactly.
    pub fn permits(&self, attribute: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|token| token == attribute)
    }
}

/// The control entries carved out of one store snapshot.
#[derive(Debug, Clone, Default)]
pub struct Controls {
    pub events: FilterList,
    pub repos: FilterList,
    pub branches: FilterList,
}

/// A parsed snapshot of one store enumeration: plain secrets on one side,
/// the reserved control entries on the other. Control keys are not
/// addressable as secrets.
#[derive(Debug, Clone, Default)]
pub struct StoreView {
    secrets: HashMap<String, String>,
    pub controls: Controls,
}

impl StoreView {
    /// Build the view from an enumeration. Duplicate keys should not occur
    /// within one snapshot; when they do, the last one wins.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let mut view = Self::default();
        for entry in entries {
            match entry.key.as_str() {
                EVENTS_ENTRY_KEY => view.controls.events = FilterList::parse(&entry.value),
                REPOS_ENTRY_KEY => view.controls.repos = FilterList::parse(&entry.value),
                BRANCHES_ENTRY_KEY => view.controls.branches = FilterList::parse(&entry.value),
                _ => {
                    view.secrets.insert(entry.key, entry.value);
                }
            }
        }
        view
    }

    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }
}

/// Maps a [`SecretRequest`] to a value or a denial, one fresh store
/// snapshot per call. Holds no state besides the injected store client.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn StoreClient>,
}

impl Resolver {
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, request: &SecretRequest) -> Result<Resolution, ResolveError> {
        let secret_name = if request.secret_name.is_empty() {
            DEFAULT_SECRET_NAME
        } else {
            request.secret_name.as_str()
        };

        debug!(
            "secret request: store={}, name={}, event={}, repo={}, branch={}",
            request.store_name,
            secret_name,
            request.build_event,
            request.repo_slug,
            request.target_branch
        );

        let entries = self
            .store
            .list_entries(&request.store_name)
            .await
            .map_err(|err| match err {
                StoreError::Timeout { .. } => ResolveError::Timeout,
                other => ResolveError::StoreNotFound { source: other },
            })?;

        let view = StoreView::from_entries(entries);

        let value = view
            .secret(secret_name)
            .ok_or(ResolveError::SecretKeyNotFound)?;

        // Fixed check order; the first failing dimension is the one
        // reported, later checks are not evaluated.
        let checks = [
            (Dimension::Event, &view.controls.events, &request.build_event),
            (Dimension::Repository, &view.controls.repos, &request.repo_slug),
            (Dimension::Branch, &view.controls.branches, &request.target_branch),
        ];
        for (dimension, filter, attribute) in checks {
            if !filter.permits(attribute) {
                return Err(ResolveError::AccessDenied { dimension });
            }
        }

        Ok(Resolution {
            name: secret_name.to_string(),
            value: value.to_string(),
            pull_request: true,
            pull_request_push: true,
        })
    }
}
