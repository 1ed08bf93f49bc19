//! # Author Join
//!
//! Pairs threads and posts with the full record of their author. Lookups
//! are batched by distinct author id, so twenty posts by three people cost
//! three `get_user` calls, issued concurrently.
//!
//! A record whose author cannot be resolved (missing user, failed lookup)
//! is dropped from the joined feed. The same rule applies to every feed.

use std::collections::{BTreeSet, HashMap};

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{Post, Thread, User};
use crate::traits::UserDirectory;

/// A record that names its author.
pub trait Authored {
    fn author_id(&self) -> &str;
}

impl Authored for Thread {
    fn author_id(&self) -> &str {
        &self.author_id
    }
}

impl Authored for Post {
    fn author_id(&self) -> &str {
        &self.author_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithAuthor<T> {
    pub record: T,
    pub author: User,
}

/// Looks up every distinct id once. Unresolved ids are simply absent
/// from the returned map.
pub async fn resolve_authors<'a, D>(
    ids: impl IntoIterator<Item = &'a str>,
    users: &D,
) -> HashMap<String, User>
where
    D: UserDirectory + ?Sized,
{
    let unique: BTreeSet<&str> = ids.into_iter().collect();
    let lookups = unique
        .into_iter()
        .map(|id| async move { (id, users.get_user(id).await) });

    let mut resolved = HashMap::new();
    for (id, result) in join_all(lookups).await {
        match result {
            Ok(Some(user)) => {
                resolved.insert(id.to_string(), user);
            }
            Ok(None) => debug!(author_id = id, "author not found"),
            Err(err) => warn!(author_id = id, error = %err, "author lookup failed"),
        }
    }
    resolved
}

/// Attaches already-resolved authors, keeping input order.
pub fn attach_authors<T: Authored>(
    records: Vec<T>,
    authors: &HashMap<String, User>,
) -> Vec<WithAuthor<T>> {
    records
        .into_iter()
        .filter_map(|record| {
            let author = authors.get(record.author_id())?.clone();
            Some(WithAuthor { record, author })
        })
        .collect()
}

pub async fn join_authors<T, D>(records: Vec<T>, users: &D) -> Vec<WithAuthor<T>>
where
    T: Authored,
    D: UserDirectory + ?Sized,
{
    let authors = resolve_authors(records.iter().map(|r| r.author_id()), users).await;
    attach_authors(records, &authors)
}
