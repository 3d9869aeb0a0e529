// Page-based storage
// Rows live in fixed-capacity pages. A row id is page_id * max_rows + slot,
// so ids stay stable for the lifetime of the row: deleting leaves a
// tombstone in the slot instead of shifting later rows down.

use super::Row;

/// A page is a fixed-size block of row slots
#[derive(Debug, Clone)]
pub struct Page {
    pub id: usize,
    /// None marks a deleted row
    slots: Vec<Option<Row>>,
    max_rows: usize,
}

impl Page {
    pub fn new(id: usize, max_rows: usize) -> Self {
        Self {
            id,
            slots: Vec::with_capacity(max_rows),
            max_rows,
        }
    }

    /// Append a row and return its slot
    /// A full page hands the row back
    pub fn insert(&mut self, row: Row) -> Result<usize, Row> {
        if self.is_full() {
            return Err(row);
        }
        self.slots.push(Some(row));
        Ok(self.slots.len() - 1)
    }

    /// A page is full once every slot has been handed out,
    /// tombstones included
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.max_rows
    }

    pub fn get(&self, slot: usize) -> Option<&Row> {
        self.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Row> {
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Tombstone a slot, returning the row that was there
    pub fn delete(&mut self, slot: usize) -> Option<Row> {
        self.slots.get_mut(slot)?.take()
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Page Manager - hands out row ids and owns every page of one table
#[derive(Debug)]
pub struct PageManager {
    pages: Vec<Page>,
    max_rows_per_page: usize,
}

impl PageManager {
    pub fn new(max_rows_per_page: usize) -> Self {
        Self {
            pages: Vec::new(),
            max_rows_per_page: max_rows_per_page.max(1),
        }
    }

    /// Append a row, opening a new page when the last one is full
    /// Returns the row id
    pub fn insert(&mut self, row: Row) -> usize {
        let mut row = row;
        if let Some(page) = self.pages.last_mut() {
            match page.insert(row) {
                Ok(slot) => return page.id * self.max_rows_per_page + slot,
                Err(rejected) => row = rejected,
            }
        }

        let page_id = self.pages.len();
        let mut page = Page::new(page_id, self.max_rows_per_page);
        // max_rows_per_page >= 1, so a fresh page always takes the row
        let slot = page.insert(row).unwrap_or_default();
        self.pages.push(page);
        page_id * self.max_rows_per_page + slot
    }

    fn locate(&self, row_id: usize) -> (usize, usize) {
        (row_id / self.max_rows_per_page, row_id % self.max_rows_per_page)
    }

    pub fn get(&self, row_id: usize) -> Option<&Row> {
        let (page_id, slot) = self.locate(row_id);
        self.pages.get(page_id)?.get(slot)
    }

    pub fn get_mut(&mut self, row_id: usize) -> Option<&mut Row> {
        let (page_id, slot) = self.locate(row_id);
        self.pages.get_mut(page_id)?.get_mut(slot)
    }

    pub fn delete(&mut self, row_id: usize) -> Option<Row> {
        let (page_id, slot) = self.locate(row_id);
        self.pages.get_mut(page_id)?.delete(slot)
    }

    /// All live rows with their ids, in insertion order
    pub fn scan(&self) -> impl Iterator<Item = (usize, &Row)> + '_ {
        let per_page = self.max_rows_per_page;
        self.pages.iter().flat_map(move |page| {
            page.slots
                .iter()
                .enumerate()
                .filter_map(move |(slot, row)| row.as_ref().map(|r| (page.id * per_page + slot, r)))
        })
    }

    pub fn total_rows(&self) -> usize {
        self.pages.iter().map(|p| p.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    fn row(i: i64) -> Row {
        Row::new(vec![Value::Integer(i)])
    }

    #[test]
    fn test_row_ids_span_pages() {
        let mut pm = PageManager::new(2);
        let ids: Vec<usize> = (0..5).map(|i| pm.insert(row(i))).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(pm.get(3), Some(&row(3)));
        assert_eq!(pm.total_rows(), 5);
    }

    #[test]
    fn test_delete_keeps_other_ids_stable() {
        let mut pm = PageManager::new(4);
        for i in 0..3 {
            pm.insert(row(i));
        }
        assert_eq!(pm.delete(1), Some(row(1)));
        assert_eq!(pm.get(1), None);
        assert_eq!(pm.get(2), Some(&row(2)));
        assert_eq!(pm.total_rows(), 2);

        let live: Vec<usize> = pm.scan().map(|(id, _)| id).collect();
        assert_eq!(live, vec![0, 2]);
    }
}
