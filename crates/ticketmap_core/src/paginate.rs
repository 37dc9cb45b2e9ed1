use std::collections::HashSet;

use tracing::debug;

use crate::api::{Cursor, Page};
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub pages: usize,
    pub items: usize,
}

/// Walk a cursor-paginated listing from `start` until a page comes back
/// without a `next` cursor.
///
/// `fetch` and `visit` both receive the same `api` handle, so a visitor can
/// issue its own paginated walk (events per ticket) while the outer walk is in
/// progress. Items are visited in page order, then in array order. The first
/// error from either callback ends the walk, as does a `next` cursor that was
/// already requested earlier in the same walk.
pub fn walk_pages<A, T, F, V>(
    api: &mut A,
    resource: &str,
    start: Option<Cursor>,
    mut fetch: F,
    mut visit: V,
) -> Result<WalkStats, FetchError>
where
    A: ?Sized,
    F: FnMut(&mut A, Option<&Cursor>) -> Result<Page<T>, FetchError>,
    V: FnMut(&mut A, T) -> Result<(), FetchError>,
{
    let mut stats = WalkStats::default();
    let mut requested: HashSet<Cursor> = start.iter().cloned().collect();
    let mut cursor = start;

    loop {
        let page = fetch(api, cursor.as_ref())?;
        stats.pages += 1;
        debug!(
            resource,
            cursor = cursor.as_ref().map(ToString::to_string),
            items = page.results.len(),
            "fetched page"
        );

        for item in page.results {
            visit(api, item)?;
            stats.items += 1;
        }

        match page.next {
            None => break,
            Some(next) if requested.contains(&next) => {
                return Err(FetchError::StalledCursor {
                    resource: resource.to_string(),
                    cursor: next.to_string(),
                });
            }
            Some(next) => {
                requested.insert(next.clone());
                cursor = Some(next);
            }
        }
    }

    Ok(stats)
}
