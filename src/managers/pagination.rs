use crate::constants::pagination::{ITEMS_FIELD, NEXT_LINK_FIELD};
use crate::errors::{ToolError, ToolErrorKind};
use async_trait::async_trait;
use serde_json::Value;

/// Fetches one continuation page through the authenticated dispatch path.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Value, ToolError>;
}

pub fn next_link(page: &Value) -> Option<&str> {
    page.get(NEXT_LINK_FIELD)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|link| !link.is_empty())
}

/// Lazy, non-restartable page sequence starting from an already fetched first page.
pub struct PageStream<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    first: Option<Value>,
    pending_link: Option<String>,
    fetched: usize,
    max_pages: usize,
    finished: bool,
}

impl<'a, F: PageFetcher + ?Sized> PageStream<'a, F> {
    pub fn new(first: Value, fetcher: &'a F, max_pages: usize) -> Self {
        Self {
            fetcher,
            first: Some(first),
            pending_link: None,
            fetched: 0,
            max_pages: max_pages.max(1),
            finished: false,
        }
    }

    /// Pages yielded so far, including the first.
    pub fn pages(&self) -> usize {
        self.fetched
    }

    fn accept(&mut self, page: Value) -> Value {
        self.fetched += 1;
        self.pending_link = next_link(&page).map(String::from);
        page
    }

    pub async fn next(&mut self) -> Option<Result<Value, ToolError>> {
        if let Some(first) = self.first.take() {
            return Some(Ok(self.accept(first)));
        }
        if self.finished {
            return None;
        }
        let Some(link) = self.pending_link.take() else {
            self.finished = true;
            return None;
        };
        if self.fetched >= self.max_pages {
            self.finished = true;
            return Some(Err(ToolError::pagination_limit(self.max_pages, Value::Null)));
        }
        match self.fetcher.fetch(&link).await {
            Ok(page) => Some(Ok(self.accept(page))),
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Concatenated result of a paginated call.
#[derive(Debug, Clone)]
pub struct CollectedPages {
    pub body: Value,
    pub pages: usize,
}

/// First page with its items replaced by every page's items, continuation removed.
fn merge(mut first: Value, items: Vec<Value>) -> Value {
    if let Some(object) = first.as_object_mut() {
        if object.contains_key(ITEMS_FIELD) || !items.is_empty() {
            object.insert(ITEMS_FIELD.to_string(), Value::Array(items));
        }
        object.remove(NEXT_LINK_FIELD);
    }
    first
}

fn page_items(page: &mut Value) -> Vec<Value> {
    match page.get_mut(ITEMS_FIELD) {
        Some(Value::Array(items)) => std::mem::take(items),
        _ => Vec::new(),
    }
}

/// Drives the stream to exhaustion; the cap yields `PaginationLimitExceeded` carrying the partial merge.
pub async fn collect_pages<F: PageFetcher + ?Sized>(
    first: Value,
    fetcher: &F,
    max_pages: usize,
) -> Result<CollectedPages, ToolError> {
    if !first.is_object() {
        return Ok(CollectedPages {
            body: first,
            pages: 1,
        });
    }
    let mut stream = PageStream::new(first, fetcher, max_pages);
    let mut head: Option<Value> = None;
    let mut items = Vec::new();
    while let Some(step) = stream.next().await {
        match step {
            Ok(mut page) => {
                items.extend(page_items(&mut page));
                if head.is_none() {
                    head = Some(page);
                }
            }
            Err(err) if err.kind == ToolErrorKind::PaginationLimitExceeded => {
                let partial = merge(head.unwrap_or(Value::Null), items);
                let mut limit = ToolError::pagination_limit(max_pages, partial);
                if let Some(details) = limit.details.as_mut().and_then(Value::as_object_mut) {
                    details.insert("pages".to_string(), Value::from(stream.pages()));
                }
                return Err(limit);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(CollectedPages {
        body: merge(head.unwrap_or(Value::Null), items),
        pages: stream.pages(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves `/page/N` with a link to `/page/N+1` until `last` (None = endless).
    struct ChainFetcher {
        last: Option<usize>,
        requested: Mutex<Vec<String>>,
    }

    impl ChainFetcher {
        fn new(last: Option<usize>) -> Self {
            Self {
                last,
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    fn page(n: usize, last: Option<usize>) -> Value {
        let mut body = json!({
            "@odata.context": "https://graph.example.com/$metadata#messages",
            "value": [{"id": format!("m{}a", n)}, {"id": format!("m{}b", n)}]
        });
        if last.map_or(true, |last| n < last) {
            body["@odata.nextLink"] = json!(format!("https://graph.example.com/page/{}", n + 1));
        }
        body
    }

    #[async_trait]
    impl PageFetcher for ChainFetcher {
        async fn fetch(&self, url: &str) -> Result<Value, ToolError> {
            self.requested.lock().unwrap().push(url.to_string());
            let n: usize = url.rsplit('/').next().unwrap().parse().unwrap();
            Ok(page(n, self.last))
        }
    }

    fn ids(body: &Value) -> Vec<String> {
        body["value"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| item["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn concatenates_pages_in_order() {
        let fetcher = ChainFetcher::new(Some(3));
        let collected = collect_pages(page(1, Some(3)), &fetcher, 10).await.unwrap();
        assert_eq!(collected.pages, 3);
        assert_eq!(ids(&collected.body), vec!["m1a", "m1b", "m2a", "m2b", "m3a", "m3b"]);
        assert!(collected.body.get("@odata.nextLink").is_none());
        assert!(collected.body.get("@odata.context").is_some());
        assert_eq!(
            *fetcher.requested.lock().unwrap(),
            vec![
                "https://graph.example.com/page/2".to_string(),
                "https://graph.example.com/page/3".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn single_page_makes_no_fetch() {
        let fetcher = ChainFetcher::new(Some(1));
        let collected = collect_pages(page(1, Some(1)), &fetcher, 10).await.unwrap();
        assert_eq!(collected.pages, 1);
        assert!(fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn endless_chain_stops_at_cap_with_partial_result() {
        let fetcher = ChainFetcher::new(None);
        let err = collect_pages(page(1, None), &fetcher, 4).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::PaginationLimitExceeded);
        let partial = err.partial_result().unwrap();
        assert_eq!(ids(partial).len(), 8);
        assert_eq!(err.details.as_ref().unwrap()["pages"], 4);
        assert_eq!(fetcher.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stream_is_not_restartable() {
        let fetcher = ChainFetcher::new(Some(2));
        let mut stream = PageStream::new(page(1, Some(2)), &fetcher, 10);
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
        assert_eq!(stream.pages(), 2);
    }

    #[tokio::test]
    async fn fetch_failure_ends_the_sequence() {
        struct Failing;
        #[async_trait]
        impl PageFetcher for Failing {
            async fn fetch(&self, _url: &str) -> Result<Value, ToolError> {
                Err(ToolError::remote_api(503, "busy"))
            }
        }
        let err = collect_pages(page(1, None), &Failing, 10).await.unwrap_err();
        assert_eq!(err.kind, ToolErrorKind::RemoteApi);
    }
}
