//! Aggregate listing order
//!
//! Parses `field[:asc|desc]` lists such as `"aggregate_type:asc,updated_at:desc"`.

use std::cmp::Ordering;

use super::AggregateRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateSortField {
    AggregateType,
    AggregateId,
    Archived,
    CreatedAt,
    UpdatedAt,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSort {
    pub field: AggregateSortField,
    pub descending: bool,
}

/// Parse a sort expression. Unknown fields and blank segments are skipped.
pub fn parse_sort(text: &str) -> Vec<AggregateSort> {
    let mut sorts = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut iter = part.splitn(2, ':');
        let field_raw = iter.next().unwrap_or_default().trim().to_lowercase();
        let order_raw = iter.next().unwrap_or("asc").trim().to_lowercase();
        let field = match field_raw.as_str() {
            "aggregate_type" | "type" => AggregateSortField::AggregateType,
            "aggregate_id" | "id" => AggregateSortField::AggregateId,
            "archived" => AggregateSortField::Archived,
            "created_at" => AggregateSortField::CreatedAt,
            "updated_at" => AggregateSortField::UpdatedAt,
            "version" | "current_version" => AggregateSortField::Version,
            _ => continue,
        };
        let descending = matches!(order_raw.as_str(), "desc" | "descending");
        sorts.push(AggregateSort { field, descending });
    }
    sorts
}

/// Compare two records under a sort list, falling back to key order
pub fn compare(sorts: &[AggregateSort], a: &AggregateRecord, b: &AggregateRecord) -> Ordering {
    for sort in sorts {
        let ordering = match sort.field {
            AggregateSortField::AggregateType => a.aggregate_type.cmp(&b.aggregate_type),
            AggregateSortField::AggregateId => a.aggregate_id.cmp(&b.aggregate_id),
            AggregateSortField::Archived => a.archived.cmp(&b.archived),
            AggregateSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            AggregateSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            AggregateSortField::Version => a.current_version.cmp(&b.current_version),
        };
        let ordering = if sort.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    (&a.aggregate_type, &a.aggregate_id).cmp(&(&b.aggregate_type, &b.aggregate_id))
}
