// Table implementation
// A table combines schema, data (pages), and its primary key index

use super::{btree::BTreeIndex, page::PageManager, Row, Schema, StorageError, Value};

/// An equality predicate on one column position
pub type ColumnFilter = (usize, Value);

pub struct Table {
    pub name: String,
    pub schema: Schema,
    page_manager: PageManager,
    /// Present when the schema declares a primary key
    primary_index: Option<BTreeIndex>,
}

impl Table {
    pub fn new(name: String, schema: Schema) -> Self {
        let primary_index = if schema.primary_key.is_empty() {
            None
        } else {
            Some(BTreeIndex::new(schema.primary_key.clone()))
        };

        Self {
            name,
            schema,
            page_manager: PageManager::new(100), // 100 rows per page
            primary_index,
        }
    }

    /// Check one value against its column definition
    fn check_value(&self, col_index: usize, value: &Value) -> Result<(), StorageError> {
        let column = &self.schema.columns[col_index];
        let required = !column.nullable || self.schema.primary_key.contains(&col_index);

        if value.is_null() && required {
            return Err(StorageError::NullViolation {
                table: self.name.clone(),
                column: column.name.clone(),
            });
        }
        if !value.fits(&column.data_type) {
            return Err(StorageError::TypeMismatch {
                table: self.name.clone(),
                column: column.name.clone(),
                expected: column.data_type.clone(),
                value: value.clone(),
            });
        }
        Ok(())
    }

    fn duplicate_key(&self, key: &[Value]) -> StorageError {
        StorageError::DuplicateKey {
            table: self.name.clone(),
            key: key.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Insert a row, enforcing arity, types, NOT NULL and primary key
    /// Returns the row id of the inserted row
    pub fn insert(&mut self, values: Vec<Value>) -> Result<usize, StorageError> {
        if values.len() != self.schema.columns.len() {
            return Err(StorageError::Arity {
                table: self.name.clone(),
                expected: self.schema.columns.len(),
                actual: values.len(),
            });
        }

        for (i, value) in values.iter().enumerate() {
            self.check_value(i, value)?;
        }

        let key = self.schema.primary_key_of(&values);
        if let (Some(index), Some(key)) = (&self.primary_index, &key) {
            if index.contains(key) {
                return Err(self.duplicate_key(key));
            }
        }

        let row_id = self.page_manager.insert(Row::new(values));
        if let (Some(index), Some(key)) = (&mut self.primary_index, key) {
            index.insert(key, row_id);
        }

        Ok(row_id)
    }

    /// Ids of the rows matching every filter
    ///
    /// Goes through the primary key index when the filters pin down every
    /// key column, otherwise scans.
    pub fn find(&self, filters: &[ColumnFilter]) -> Vec<usize> {
        if let Some(index) = &self.primary_index {
            let key: Option<Vec<Value>> = index
                .columns()
                .iter()
                .map(|col| filters.iter().find(|(c, _)| c == col).map(|(_, v)| v.clone()))
                .collect();

            if let Some(key) = key {
                return index
                    .lookup(&key)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|&id| {
                        self.page_manager
                            .get(id)
                            .is_some_and(|row| Self::matches(row, filters))
                    })
                    .collect();
            }
        }

        self.page_manager
            .scan()
            .filter(|(_, row)| Self::matches(row, filters))
            .map(|(id, _)| id)
            .collect()
    }

    fn matches(row: &Row, filters: &[ColumnFilter]) -> bool {
        filters.iter().all(|(col, value)| &row.values[*col] == value)
    }

    pub fn get(&self, row_id: usize) -> Option<&Row> {
        self.page_manager.get(row_id)
    }

    /// All live rows in insertion order
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.page_manager.scan().map(|(_, row)| row)
    }

    /// Set one column on every row matching the filters
    /// Returns the number of rows updated
    pub fn update(
        &mut self,
        filters: &[ColumnFilter],
        set_column: usize,
        set_value: Value,
    ) -> Result<usize, StorageError> {
        if set_column >= self.schema.columns.len() {
            return Err(StorageError::ColumnNotFound(format!("#{}", set_column)));
        }
        self.check_value(set_column, &set_value)?;

        let row_ids = self.find(filters);
        let touches_key = self.schema.primary_key.contains(&set_column);

        for &row_id in &row_ids {
            let Some(row) = self.page_manager.get(row_id) else {
                continue;
            };

            if touches_key {
                let old_key = self.schema.primary_key_of(&row.values);
                let mut new_values = row.values.clone();
                new_values[set_column] = set_value.clone();
                let new_key = self.schema.primary_key_of(&new_values);

                if let (Some(index), Some(old_key), Some(new_key)) =
                    (&mut self.primary_index, old_key, new_key)
                {
                    if old_key != new_key {
                        if index.contains(&new_key) {
                            return Err(StorageError::DuplicateKey {
                                table: self.name.clone(),
                                key: new_key
                                    .iter()
                                    .map(|v| v.to_string())
                                    .collect::<Vec<_>>()
                                    .join(", "),
                            });
                        }
                        index.remove(&old_key, row_id);
                        index.insert(new_key, row_id);
                    }
                }
            }

            if let Some(row) = self.page_manager.get_mut(row_id) {
                row.values[set_column] = set_value.clone();
            }
        }

        Ok(row_ids.len())
    }

    /// Delete every row matching the filters
    /// Returns the number of rows deleted
    pub fn delete(&mut self, filters: &[ColumnFilter]) -> usize {
        let row_ids = self.find(filters);

        for &row_id in &row_ids {
            if let Some(row) = self.page_manager.delete(row_id) {
                if let Some(index) = &mut self.primary_index {
                    let key = index.key_of(&row.values);
                    index.remove(&key, row_id);
                }
            }
        }

        row_ids.len()
    }

    pub fn row_count(&self) -> usize {
        self.page_manager.total_rows()
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Column, DataType};

    fn grade_table() -> Table {
        let col = |name: &str, data_type| Column {
            name: name.to_string(),
            data_type,
            nullable: true,
        };
        let schema = Schema::new(
            vec![
                col("student_id", DataType::Text),
                col("course_id", DataType::Text),
                col("score", DataType::Integer),
            ],
            vec![0, 1],
        );
        Table::new("grade".to_string(), schema)
    }

    fn grade(student: &str, course: &str, score: i64) -> Vec<Value> {
        vec![Value::from(student), Value::from(course), Value::Integer(score)]
    }

    #[test]
    fn test_composite_primary_key_rejects_duplicates() {
        let mut table = grade_table();
        table.insert(grade("s1", "c1", 90)).unwrap();
        table.insert(grade("s1", "c2", 80)).unwrap();

        let err = table.insert(grade("s1", "c1", 70)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_key_columns_reject_null_and_bad_types() {
        let mut table = grade_table();
        let err = table
            .insert(vec![Value::Null, Value::from("c1"), Value::Integer(1)])
            .unwrap_err();
        assert!(err.is_constraint());

        let err = table
            .insert(vec![Value::from("s1"), Value::from("c1"), Value::from("A")])
            .unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { .. }));
    }

    #[test]
    fn test_update_and_delete_by_key() {
        let mut table = grade_table();
        table.insert(grade("s1", "c1", 90)).unwrap();
        table.insert(grade("s2", "c1", 60)).unwrap();

        let key = [(0, Value::from("s1")), (1, Value::from("c1"))];
        assert_eq!(table.update(&key, 2, Value::Integer(95)).unwrap(), 1);
        let id = table.find(&key)[0];
        assert_eq!(table.get(id).unwrap().values[2], Value::Integer(95));

        let missing = [(0, Value::from("s9")), (1, Value::from("c1"))];
        assert_eq!(table.update(&missing, 2, Value::Integer(1)).unwrap(), 0);

        assert_eq!(table.delete(&key), 1);
        assert_eq!(table.delete(&key), 0);
        assert_eq!(table.row_count(), 1);

        // the key is free again after the delete
        table.insert(grade("s1", "c1", 10)).unwrap();
    }

    #[test]
    fn test_find_by_partial_key_scans() {
        let mut table = grade_table();
        table.insert(grade("s1", "c1", 90)).unwrap();
        table.insert(grade("s1", "c2", 80)).unwrap();
        table.insert(grade("s2", "c1", 70)).unwrap();

        assert_eq!(table.find(&[(0, Value::from("s1"))]).len(), 2);
        assert_eq!(table.find(&[]).len(), 3);
    }
}
