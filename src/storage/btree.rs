// Ordered index over one or more columns
// Keys are the column values in index order, so a composite primary key
// like (student_id, course_id) is a single lookup.

use super::Value;
use std::collections::BTreeMap;

/// Maps a (possibly composite) key to the ids of the rows holding it
#[derive(Debug, Clone)]
pub struct BTreeIndex {
    tree: BTreeMap<Vec<Value>, Vec<usize>>,
    /// Positions of the indexed columns in the table schema
    columns: Vec<usize>,
}

impl BTreeIndex {
    pub fn new(columns: Vec<usize>) -> Self {
        Self {
            tree: BTreeMap::new(),
            columns,
        }
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Build this index's key from a full row
    pub fn key_of(&self, values: &[Value]) -> Vec<Value> {
        self.columns.iter().map(|&i| values[i].clone()).collect()
    }

    pub fn insert(&mut self, key: Vec<Value>, row_id: usize) {
        self.tree.entry(key).or_default().push(row_id);
    }

    pub fn lookup(&self, key: &[Value]) -> Option<&Vec<usize>> {
        self.tree.get(key)
    }

    pub fn contains(&self, key: &[Value]) -> bool {
        self.tree.contains_key(key)
    }

    pub fn remove(&mut self, key: &[Value], row_id: usize) {
        if let Some(row_ids) = self.tree.get_mut(key) {
            row_ids.retain(|&id| id != row_id);
            if row_ids.is_empty() {
                self.tree.remove(key);
            }
        }
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_lookup() {
        let mut index = BTreeIndex::new(vec![0, 1]);
        index.insert(vec![Value::from("s1"), Value::from("c1")], 0);
        index.insert(vec![Value::from("s1"), Value::from("c2")], 1);

        assert_eq!(
            index.lookup(&[Value::from("s1"), Value::from("c2")]),
            Some(&vec![1])
        );
        assert!(!index.contains(&[Value::from("s2"), Value::from("c1")]));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_drops_empty_keys() {
        let mut index = BTreeIndex::new(vec![0]);
        index.insert(vec![Value::Integer(1)], 0);
        index.insert(vec![Value::Integer(1)], 2);

        index.remove(&[Value::Integer(1)], 0);
        assert_eq!(index.lookup(&[Value::Integer(1)]), Some(&vec![2]));

        index.remove(&[Value::Integer(1)], 2);
        assert!(index.is_empty());
    }
}
