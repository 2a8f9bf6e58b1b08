//! Lazy, page-cached view over a server-side collection.
//!
//! A [`LazyQuery`] fetches nothing until an index is requested. Index `i`
//! lives on page `i / page_size + 1`; fetching a page stores every object it
//! returns at its global index. Fetched pages are never evicted, so iterating
//! the same query twice only hits the network the first time.
//!
//! Each page is a JSON object with one data key, named after the type of the
//! collection, and a `meta` key carrying `total_num_objects`:
//!
//! ```json
//! {"sessions": [{"type": "session", "id": 1}], "meta": {"total_num_objects": 1}}
//! ```

use futures::Stream;
use itertools::Itertools;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    ops::RangeBounds,
};
use tracing::*;
use url::Url;

use crate::{
    client::Client, filter::Filter, masking::mask_url, registry::Materialized, Error, Result,
};

const META_KEYS: [&str; 2] = ["meta", "metadata"];

pub struct LazyQuery {
    client: Client,
    url: Url,
    page_size: usize,
    fetched: HashMap<usize, Materialized>,
    fetched_pages: HashSet<usize>,
    total: Option<usize>,
    type_tag: Option<String>,
}

impl std::fmt::Debug for LazyQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Query {:?}>", mask_url(&self.url).as_str())
    }
}

impl LazyQuery {
    pub fn new(client: &Client, path: &str) -> Result<LazyQuery> {
        let url = client.transport().url_for(path)?;
        Ok(LazyQuery::from_url(client, url, client.page_size()))
    }

    fn from_url(client: &Client, url: Url, page_size: usize) -> LazyQuery {
        LazyQuery {
            client: client.clone(),
            url,
            page_size: page_size.max(1),
            fetched: HashMap::new(),
            fetched_pages: HashSet::new(),
            total: None,
            type_tag: None,
        }
    }

    pub fn page_size(mut self, page_size: usize) -> LazyQuery {
        self.page_size = page_size.max(1);
        self
    }

    /// Appends a `name=value` query parameter.
    pub fn with_param(mut self, name: &str, value: impl Display) -> LazyQuery {
        self.url
            .query_pairs_mut()
            .append_pair(name, &value.to_string());
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Type tag of the collection, known once a page has been fetched.
    pub fn type_tag(&self) -> Option<&str> {
        self.type_tag.as_deref()
    }

    /// Object at `index` if its page has already been fetched.
    pub fn cached(&self, index: usize) -> Option<&Materialized> {
        self.fetched.get(&index)
    }

    /// A new query over the filtered collection. The receiver is unchanged.
    pub fn filter(&self, filter: impl Into<Filter>) -> LazyQuery {
        let mut url = self.url.clone();
        filter.into().apply(&mut url);
        LazyQuery::from_url(&self.client, url, self.page_size)
    }

    /// Total number of objects as reported by the server. Fetches at most the
    /// first page.
    pub async fn len(&mut self) -> Result<usize> {
        if self.total.is_none() {
            self.fetch_page(1).await?;
        }
        self.total.ok_or_else(|| {
            Error::UnexpectedResponse("query page carries no total_num_objects".to_string())
        })
    }

    pub async fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Object at `index`; negative indices count from the end.
    pub async fn get(&mut self, index: i64) -> Result<Materialized> {
        let resolved = if index < 0 {
            let len = self.len().await?;
            let back = index.unsigned_abs() as usize;
            if back > len {
                return Err(Error::IndexOutOfRange { index, len });
            }
            len - back
        } else {
            index as usize
        };

        match self.try_fetch_index(resolved).await? {
            Some(item) => Ok(item.clone()),
            None => Err(Error::IndexOutOfRange {
                index,
                len: self.total.unwrap_or(self.fetched.len()),
            }),
        }
    }

    /// Always fails: a slice would silently skip unfetched pages.
    pub fn slice(&self, _range: impl RangeBounds<i64>) -> Result<Vec<Materialized>> {
        Err(Error::Unsupported("slicing a lazy query"))
    }

    /// Cursor starting at index 0.
    pub fn iter(&mut self) -> QueryIter<'_> {
        QueryIter {
            query: self,
            next: 0,
        }
    }

    /// Stream of every object starting at index 0.
    pub fn stream(&mut self) -> impl Stream<Item = Result<Materialized>> + '_ {
        futures::stream::try_unfold((self, 0usize), |(query, index)| async move {
            let item = match query.try_fetch_index(index).await? {
                Some(item) => item.clone(),
                None => return Ok(None),
            };
            Ok(Some((item, (query, index + 1))))
        })
    }

    /// Object at `index`, `None` once past the end of the collection.
    async fn try_fetch_index(&mut self, index: usize) -> Result<Option<&Materialized>> {
        if !self.fetched.contains_key(&index) {
            let page = index / self.page_size + 1;
            if !self.fetched_pages.contains(&page) {
                self.fetch_page(page).await?;
            }
        }
        Ok(self.fetched.get(&index))
    }

    async fn fetch_page(&mut self, page: usize) -> Result<()> {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("page_size", &self.page_size.to_string());
        debug!("fetching page {page} of {:?}", self);

        let Value::Object(mut body) = self.client.transport().get_url(&url).await? else {
            return Err(Error::UnexpectedResponse(
                "query page is not a JSON object".to_string(),
            ));
        };

        let metas: Vec<Value> = META_KEYS.iter().filter_map(|key| body.remove(*key)).collect();
        if let Some(total) = metas
            .iter()
            .find_map(|meta| meta.get("total_num_objects").and_then(Value::as_u64))
        {
            self.total = Some(total as usize);
        }

        if body.len() > 1 {
            return Err(Error::MultipleDataKeys(body.keys().join(", ")));
        }
        let Some((tag, items)) = body.into_iter().next() else {
            return Err(Error::UnexpectedResponse(
                "query page has no data key".to_string(),
            ));
        };

        match &self.type_tag {
            Some(expected) if *expected != tag => {
                return Err(Error::InconsistentQueryType {
                    expected: expected.clone(),
                    found: tag,
                });
            }
            Some(_) => {}
            None => self.type_tag = Some(tag),
        }

        let Value::Array(items) = items else {
            return Err(Error::UnexpectedResponse(
                "query page data is not a list".to_string(),
            ));
        };
        let offset = (page - 1) * self.page_size;
        for (local, item) in items.into_iter().enumerate() {
            self.fetched
                .insert(offset + local, self.client.materialize(item));
        }
        self.fetched_pages.insert(page);
        Ok(())
    }
}

/// Explicit cursor over a [`LazyQuery`].
pub struct QueryIter<'a> {
    query: &'a mut LazyQuery,
    next: usize,
}

impl QueryIter<'_> {
    pub async fn next(&mut self) -> Option<Result<Materialized>> {
        match self.query.try_fetch_index(self.next).await {
            Ok(Some(item)) => {
                let item = item.clone();
                self.next += 1;
                Some(Ok(item))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
