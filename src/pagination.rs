//! Pagination
//!
//! Aggregate and snapshot listings page by offset. Event listings page by
//! sequence number, so appends between requests do not shift a page.
//! Cursors are opaque to callers; they only ever echo back `next_cursor`.

use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Decode an offset cursor; absent means the first page
pub fn decode_offset(cursor: Option<&str>) -> StoreResult<usize> {
    match cursor.map(str::trim) {
        None | Some("") => Ok(0),
        Some(raw) => raw
            .parse()
            .map_err(|_| StoreError::Validation(format!("invalid cursor: {}", raw))),
    }
}

/// Decode a sequence cursor: the last sequence number already returned
pub fn decode_sequence(cursor: Option<&str>) -> StoreResult<Option<u64>> {
    match cursor.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| StoreError::Validation(format!("invalid cursor: {}", raw))),
    }
}

/// Slice one page out of an already ordered collection
pub fn paginate<T>(items: Vec<T>, offset: usize, take: usize) -> Page<T> {
    let total = items.len();
    let items: Vec<T> = items.into_iter().skip(offset).take(take).collect();
    let end = offset.saturating_add(items.len());
    let next_cursor = (end < total).then(|| end.to_string());
    Page { items, next_cursor }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_walks_all_items() {
        let items: Vec<u32> = (1..=5).collect();

        let first = paginate(items.clone(), 0, 2);
        assert_eq!(first.items, vec![1, 2]);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let offset = decode_offset(first.next_cursor.as_deref()).unwrap();
        let second = paginate(items.clone(), offset, 2);
        assert_eq!(second.items, vec![3, 4]);

        let last = paginate(items, 4, 2);
        assert_eq!(last.items, vec![5]);
        assert!(last.next_cursor.is_none());
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let page = paginate(vec![1, 2], 10, 5);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_decode_offset() {
        assert_eq!(decode_offset(None).unwrap(), 0);
        assert_eq!(decode_offset(Some(" ")).unwrap(), 0);
        assert_eq!(decode_offset(Some("7")).unwrap(), 7);
        assert!(matches!(
            decode_offset(Some("abc")),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_decode_sequence() {
        assert_eq!(decode_sequence(None).unwrap(), None);
        assert_eq!(decode_sequence(Some("")).unwrap(), None);
        assert_eq!(decode_sequence(Some("42")).unwrap(), Some(42));
        assert!(matches!(
            decode_sequence(Some("-1")),
            Err(StoreError::Validation(_))
        ));
    }
}
