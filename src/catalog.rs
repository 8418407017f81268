//! Report catalog: previously generated reports, newest first.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::producer::ReportSource;
use crate::snapshot::ReportCatalogEntry;

pub struct Catalog<'a, S> {
    source: &'a S,
}

impl<'a, S: ReportSource> Catalog<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// All known reports sorted by creation time, newest first. Entries with
    /// equal timestamps keep the producer's order.
    pub async fn list(&self) -> Result<Vec<ReportCatalogEntry>, ReportError> {
        let mut entries = self.source.list().await?;
        sort_newest_first(&mut entries);
        debug!(count = entries.len(), "catalog loaded");
        Ok(entries)
    }
}

pub fn sort_newest_first(entries: &mut [ReportCatalogEntry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// What the listing shows: entries, or nothing plus the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogView {
    pub entries: Vec<ReportCatalogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CatalogView {
    pub fn from_result(result: Result<Vec<ReportCatalogEntry>, ReportError>) -> Self {
        match result {
            Ok(entries) => Self {
                entries,
                error: None,
            },
            Err(err) => {
                warn!(kind = err.kind(), error = %err, "catalog unavailable");
                Self {
                    entries: Vec::new(),
                    error: Some(err.to_string()),
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::fakes::FakeSource;

    fn entry(id: &str, created_at: i64) -> ReportCatalogEntry {
        ReportCatalogEntry {
            id: id.to_string(),
            name: format!("report {id}"),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_list_sorts_newest_first() {
        let source = FakeSource::listing(Ok(vec![
            entry("a", 100),
            entry("b", 300),
            entry("c", 200),
        ]));
        let ids: Vec<String> = Catalog::new(&source)
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let mut entries = vec![entry("x", 5), entry("y", 9), entry("z", 5)];
        sort_newest_first(&mut entries);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_view_with_message() {
        let source = FakeSource::listing(Err(ReportError::Producer("no data".to_string())));
        let view = CatalogView::from_result(Catalog::new(&source).list().await);
        assert!(view.is_empty());
        assert_eq!(view.error.as_deref(), Some("no data"));
    }

    #[tokio::test]
    async fn test_empty_catalog_is_not_an_error() {
        let source = FakeSource::listing(Ok(Vec::new()));
        let view = CatalogView::from_result(Catalog::new(&source).list().await);
        assert!(view.is_empty());
        assert_eq!(view.error, None);
    }
}
