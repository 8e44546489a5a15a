//! Row model for array attributes
//!
//! An array editor shows one row per item plus a single trailing empty row
//! used to append. The trailing row exists only in the view; it is never
//! written back to the attribute.

use tracing::trace;

/// Editable rows of one array attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayRows {
    rows: Vec<String>,
}

impl Default for ArrayRows {
    fn default() -> Self {
        Self {
            rows: vec![String::new()],
        }
    }
}

impl ArrayRows {
    pub fn new(items: &[String]) -> Self {
        let mut rows = Self::default();
        rows.reconcile(items);
        rows
    }

    /// Bring the rows in line with the attribute's current items
    ///
    /// Grows or shrinks the populated rows and always leaves exactly one
    /// trailing empty row.
    pub fn reconcile(&mut self, items: &[String]) {
        let before = self.len();
        self.rows.truncate(items.len());
        for (row, item) in self.rows.iter_mut().zip(items) {
            if row != item {
                row.clone_from(item);
            }
        }
        self.rows.extend(items[self.rows.len()..].iter().cloned());
        self.rows.push(String::new());
        trace!(before, after = items.len(), "Reconciled array rows");
    }

    /// Number of populated rows
    pub fn len(&self) -> usize {
        self.rows.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every row including the trailing empty one
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Populated rows, the value the attribute should hold
    pub fn items(&self) -> &[String] {
        &self.rows[..self.len()]
    }

    /// Items after editing row `index`
    ///
    /// Typing into the trailing row appends; clearing a populated row removes
    /// it. Returns `None` when the edit leaves the items unchanged.
    pub fn edited(&self, index: usize, text: &str) -> Option<Vec<String>> {
        let mut items = self.items().to_vec();
        let text = text.trim();
        match index.cmp(&items.len()) {
            std::cmp::Ordering::Less if text.is_empty() => {
                items.remove(index);
            }
            std::cmp::Ordering::Less if items[index] != text => {
                items[index] = text.to_string();
            }
            std::cmp::Ordering::Equal if !text.is_empty() => items.push(text.to_string()),
            _ => return None,
        }
        Some(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_empty_array_has_one_trailing_row() {
        let rows = ArrayRows::new(&[]);
        assert_eq!(rows.rows(), [""]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_reconcile_grow_and_shrink() {
        let mut rows = ArrayRows::new(&items(&["a", "b", "c"]));
        assert_eq!(rows.rows().len(), 4);

        rows.reconcile(&items(&["a", "b", "c", "d", "e"]));
        assert_eq!(rows.len(), 5);
        assert_eq!(rows.rows(), ["a", "b", "c", "d", "e", ""]);

        rows.reconcile(&items(&["a", "x"]));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows(), ["a", "x", ""]);
    }

    #[test]
    fn test_edits() {
        let rows = ArrayRows::new(&items(&["a", "b"]));

        assert_eq!(rows.edited(2, "c"), Some(items(&["a", "b", "c"])));
        assert_eq!(rows.edited(0, "z"), Some(items(&["z", "b"])));
        assert_eq!(rows.edited(1, ""), Some(items(&["a"])));
        assert_eq!(rows.edited(0, "a"), None);
        assert_eq!(rows.edited(2, "  "), None);
        assert_eq!(rows.edited(9, "q"), None);
    }
}
