//! Columnar in-memory table.
//!
//! Columns hold their cells behind an `Arc`, so deriving a new table from an
//! existing one only copies the columns that actually change. Tables are never
//! mutated in place: every transformation returns a new [`Table`].

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use super::value::CellValue;
use super::SemanticType;
use crate::error::TableError;

/// A named column of cells.
///
/// A column converted by `coerce_type` carries its target as a declared type.
/// Later stages, calculations and metrics read the declared type instead of
/// re-inferring it from the cells, so a `zip` column turned into text stays
/// text even though every cell still reads as a number.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: Arc<Vec<CellValue>>,
    declared_type: Option<SemanticType>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(values),
            declared_type: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> Option<SemanticType> {
        self.declared_type
    }

    /// Same cells, declared as `ty`.
    pub fn with_declared_type(mut self, ty: SemanticType) -> Self {
        self.declared_type = Some(ty);
        self
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether two columns share the same storage.
    pub fn shares_storage_with(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    /// Same name and declared type, new cells.
    pub fn with_values(&self, values: Vec<CellValue>) -> Self {
        Self {
            name: self.name.clone(),
            values: Arc::new(values),
            declared_type: self.declared_type,
        }
    }

    fn select(&self, rows: &[usize]) -> Self {
        let values = rows.iter().filter_map(|&r| self.values.get(r).cloned()).collect();
        self.with_values(values)
    }
}

/// Ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Build a table, checking column names are unique and lengths agree.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
        }

        let row_count = columns.first().map(Column::len).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.len() != row_count) {
            return Err(TableError::RaggedColumn {
                column: bad.name.clone(),
                expected: row_count,
                found: bad.len(),
            });
        }

        Ok(Self { columns, row_count })
    }

    /// Build a table from headers and row-major data.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, TableError> {
        let width = headers.len();
        let mut buffers: Vec<Vec<CellValue>> = vec![Vec::with_capacity(rows.len()); width];

        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(TableError::RaggedRow {
                    row: row_idx,
                    expected: width,
                    found: row.len(),
                });
            }
            for (buf, cell) in buffers.iter_mut().zip(row) {
                buf.push(cell);
            }
        }

        let columns = headers
            .into_iter()
            .zip(buffers)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        Self::new(columns)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cells of one row, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&CellValue>> {
        if index >= self.row_count {
            return None;
        }
        self.columns.iter().map(|c| c.values.get(index)).collect()
    }

    /// Row-major copy of the first `limit` rows.
    pub fn head(&self, limit: usize) -> Vec<Vec<CellValue>> {
        (0..self.row_count.min(limit))
            .map(|r| {
                self.columns
                    .iter()
                    .filter_map(|c| c.values.get(r).cloned())
                    .collect()
            })
            .collect()
    }

    /// New table where the column at `index` holds `values`; other columns are shared.
    pub fn with_column_values(&self, index: usize, values: Vec<CellValue>) -> Result<Self, TableError> {
        let mut columns = self.columns.clone();
        if let Some(col) = columns.get_mut(index) {
            *col = col.with_values(values);
        }
        Self::new(columns)
    }

    /// New table with `column` in place of the column at `index`.
    pub fn with_column_replaced(&self, index: usize, column: Column) -> Result<Self, TableError> {
        let mut columns = self.columns.clone();
        if let Some(col) = columns.get_mut(index) {
            *col = column;
        }
        Self::new(columns)
    }

    /// New table with an extra column at the end.
    pub fn with_column_appended(&self, column: Column) -> Result<Self, TableError> {
        let mut columns = self.columns.clone();
        columns.push(column);
        Self::new(columns)
    }

    /// New table keeping only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let columns: Vec<Column> = self.columns.iter().map(|c| c.select(rows)).collect();
        let row_count = rows.iter().filter(|&&r| r < self.row_count).count();
        Self { columns, row_count }
    }

    /// First `limit` rows for display.
    pub fn preview(&self, limit: usize) -> TablePreview {
        TablePreview {
            columns: self.column_names(),
            rows: self.head(limit),
            total_rows: self.row_count,
        }
    }
}

/// Serializable snapshot of the first rows of a table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub total_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_rows(
            vec!["name".into(), "val".into()],
            vec![
                vec![CellValue::text("a"), CellValue::Number(1.0)],
                vec![CellValue::text("b"), CellValue::Number(2.0)],
                vec![CellValue::text("c"), CellValue::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_shape() {
        let table = sample();
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.column_names(), vec!["name", "val"]);
        assert_eq!(table.row(1).unwrap()[0], &CellValue::text("b"));
        assert!(table.row(3).is_none());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::new(vec![Column::new("a", vec![]), Column::new("a", vec![])]).unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".into()));
    }

    #[test]
    fn test_ragged_rejected() {
        let err = Table::new(vec![
            Column::new("a", vec![CellValue::Null]),
            Column::new("b", vec![]),
        ])
        .unwrap_err();
        assert!(matches!(err, TableError::RaggedColumn { .. }));

        let err = Table::from_rows(vec!["a".into()], vec![vec![]]).unwrap_err();
        assert!(matches!(err, TableError::RaggedRow { row: 0, .. }));
    }

    #[test]
    fn test_untouched_columns_are_shared() {
        let table = sample();
        let next = table
            .with_column_values(1, vec![CellValue::Number(9.0); 3])
            .unwrap();
        assert!(next.columns()[0].shares_storage_with(&table.columns()[0]));
        assert!(!next.columns()[1].shares_storage_with(&table.columns()[1]));
        // input untouched
        assert_eq!(table.columns()[1].values()[0], CellValue::Number(1.0));
    }

    #[test]
    fn test_declared_type_survives_rewrites() {
        let table = sample();
        let declared = table.columns()[1].clone().with_declared_type(SemanticType::Text);
        let table = table.with_column_replaced(1, declared).unwrap();
        assert_eq!(table.columns()[1].declared_type(), Some(SemanticType::Text));
        assert_eq!(table.columns()[0].declared_type(), None);

        let rewritten = table.with_column_values(1, vec![CellValue::Null; 3]).unwrap();
        assert_eq!(rewritten.columns()[1].declared_type(), Some(SemanticType::Text));
        let selected = rewritten.select_rows(&[0]);
        assert_eq!(selected.columns()[1].declared_type(), Some(SemanticType::Text));
    }

    #[test]
    fn test_select_rows_preserves_order() {
        let table = sample().select_rows(&[2, 0]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.columns()[0].values(), &[CellValue::text("c"), CellValue::text("a")]);
    }
}
