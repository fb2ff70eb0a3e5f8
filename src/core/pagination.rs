use crate::domain::ports::Page;
use crate::utils::error::{ReconcileError, Result};
use std::future::Future;

/// Follows cursors one page at a time until `has_more` is false.
///
/// Any failed page fails the whole listing; callers never see a partial one.
pub async fn fetch_all<T, F, Fut>(label: &str, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = fetch_page(cursor.take()).await?;
        pages += 1;
        records.extend(page.records);
        tracing::debug!("📄 {} page {}: {} records so far", label, pages, records.len());

        if !page.has_more {
            break;
        }
        match page.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(ReconcileError::TransientFetchFailure {
                    target: label.to_string(),
                    message: format!("page {} reported more results but no cursor", pages),
                })
            }
        }
    }

    Ok(records)
}
