//! Bucket table rows by the values of one or more key columns.
//!
//! ```text
//! region  product  amount        key                  rows
//! north   a        10       →    (north, a)      →    [0, 2]
//! south   a        20            (south, a)           [1]
//! north   a        5
//! (null)  b        7             ungroupable: 1
//! ```

use indexmap::IndexMap;

use crate::models::CellValue;

/// Row indices per distinct key tuple, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Groups {
    pub buckets: IndexMap<Vec<CellValue>, Vec<usize>>,
    /// Rows with a missing cell in any key column.
    pub ungroupable: usize,
}

/// Group `row_count` rows by the given key columns.
///
/// With no key columns every row lands in a single bucket keyed by the empty
/// tuple, which exists even when the table has no rows.
pub fn group_rows(keys: &[&[CellValue]], row_count: usize) -> Groups {
    let mut groups = Groups::default();

    if keys.is_empty() {
        groups.buckets.insert(Vec::new(), (0..row_count).collect());
        return groups;
    }

    for row in 0..row_count {
        let key: Option<Vec<CellValue>> = keys
            .iter()
            .map(|col| col.get(row).filter(|cell| !cell.is_missing()).cloned())
            .collect();

        match key {
            Some(key) => groups.buckets.entry(key).or_default().push(row),
            None => groups.ungroupable += 1,
        }
    }
    groups
}
