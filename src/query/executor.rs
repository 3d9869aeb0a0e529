// Query Executor
// This module executes bound query plans against one shard's tables

use super::parser::{Aggregate, ColumnRef, Condition, JoinClause, Query, SelectItem, SelectQuery};
use crate::storage::{table::ColumnFilter, table::Table, Row, StorageError, Value};
use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet};

/// The query executor owns every table of one database instance
pub struct QueryExecutor {
    tables: HashMap<String, Table>,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Execute a query and return the result
    pub fn execute(&mut self, query: Query) -> Result<QueryResult> {
        match query {
            Query::CreateTable { name, schema } => {
                if self.tables.contains_key(&name) {
                    bail!("Table '{}' already exists", name);
                }
                self.tables
                    .insert(name.clone(), Table::new(name.clone(), schema));
                Ok(QueryResult::Message(format!("Table '{}' created", name)))
            }

            Query::Insert {
                table_name,
                columns,
                values,
            } => {
                let table = self.table_mut(&table_name)?;
                let row = Self::arrange_insert(table, &columns, values)?;
                table.insert(row)?;
                Ok(QueryResult::Affected(1))
            }

            Query::Select(select) => self.select(&select),

            Query::Update {
                table_name,
                set_column,
                set_value,
                filter,
            } => {
                let table = self.table_mut(&table_name)?;
                let set_index = table
                    .get_schema()
                    .get_column_index(&set_column)
                    .ok_or_else(|| StorageError::ColumnNotFound(set_column.clone()))?;
                let filters = Self::table_filters(table, &filter)?;
                let count = table.update(&filters, set_index, set_value)?;
                Ok(QueryResult::Affected(count))
            }

            Query::Delete { table_name, filter } => {
                let table = self.table_mut(&table_name)?;
                let filters = Self::table_filters(table, &filter)?;
                Ok(QueryResult::Affected(table.delete(&filters)))
            }
        }
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| anyhow!("Table '{}' not found", name))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("Table '{}' not found", name))
    }

    /// Put INSERT values into schema order, filling unlisted columns with NULL
    fn arrange_insert(table: &Table, columns: &[String], values: Vec<Value>) -> Result<Vec<Value>> {
        if columns.is_empty() {
            return Ok(values);
        }
        if columns.len() != values.len() {
            bail!(
                "INSERT lists {} column(s) but {} value(s)",
                columns.len(),
                values.len()
            );
        }

        let schema = table.get_schema();
        let mut row = vec![Value::Null; schema.columns.len()];
        let mut seen = HashSet::new();
        for (column, value) in columns.iter().zip(values) {
            let index = schema
                .get_column_index(column)
                .ok_or_else(|| StorageError::ColumnNotFound(column.clone()))?;
            if !seen.insert(index) {
                bail!("Column '{}' listed twice", column);
            }
            row[index] = value;
        }
        Ok(row)
    }

    /// Resolve WHERE conditions of a single-table statement to column positions
    fn table_filters(table: &Table, conditions: &[Condition]) -> Result<Vec<ColumnFilter>> {
        conditions
            .iter()
            .map(|cond| {
                if let Some(q) = &cond.column.qualifier {
                    if q != &table.name {
                        bail!("Unknown table qualifier '{}'", q);
                    }
                }
                let index = table
                    .get_schema()
                    .get_column_index(&cond.column.name)
                    .ok_or_else(|| StorageError::ColumnNotFound(cond.column.to_string()))?;
                Ok((index, cond.value.clone()))
            })
            .collect()
    }

    fn select(&self, select: &SelectQuery) -> Result<QueryResult> {
        let mut relation = Relation::scan(self.table(&select.from.name)?, select.from.binding());

        for join in &select.joins {
            let right = Relation::scan(self.table(&join.table.name)?, join.table.binding());
            relation = relation.join(right, join)?;
        }

        let filters = select
            .filter
            .iter()
            .map(|cond| Ok((relation.resolve(&cond.column)?, &cond.value)))
            .collect::<Result<Vec<_>>>()?;
        relation
            .rows
            .retain(|row| filters.iter().all(|(i, value)| &row[*i] == *value));

        if select.is_aggregate() {
            relation.aggregate(select)
        } else {
            relation.project(&select.items)
        }
    }

    /// Get a reference to a table (useful for direct access)
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(&name.to_lowercase())
    }
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Intermediate rows of a SELECT, with every column tagged by the
/// table binding (alias or name) it came from
struct Relation {
    columns: Vec<(String, String)>,
    rows: Vec<Vec<Value>>,
}

impl Relation {
    fn scan(table: &Table, binding: &str) -> Self {
        Self {
            columns: table
                .get_schema()
                .column_names()
                .into_iter()
                .map(|c| (binding.to_string(), c))
                .collect(),
            rows: table.rows().map(|row| row.values.clone()).collect(),
        }
    }

    fn try_resolve(&self, column: &ColumnRef) -> Result<Option<usize>> {
        let mut found = self.columns.iter().enumerate().filter(|(_, (binding, name))| {
            name == &column.name && column.qualifier.as_ref().map_or(true, |q| q == binding)
        });

        match (found.next(), found.next()) {
            (Some((index, _)), None) => Ok(Some(index)),
            (None, _) => Ok(None),
            (Some(_), Some(_)) => bail!("Ambiguous column reference: {}", column),
        }
    }

    fn resolve(&self, column: &ColumnRef) -> Result<usize> {
        self.try_resolve(column)?
            .ok_or_else(|| StorageError::ColumnNotFound(column.to_string()).into())
    }

    /// Inner equi-join; NULL keys never match
    fn join(self, right: Relation, clause: &JoinClause) -> Result<Relation> {
        let (left_index, right_index) = match self.try_resolve(&clause.left)? {
            Some(left_index) => (left_index, right.resolve(&clause.right)?),
            None => (self.resolve(&clause.right)?, right.resolve(&clause.left)?),
        };

        let mut buckets: HashMap<&Value, Vec<&Vec<Value>>> = HashMap::new();
        for row in &right.rows {
            if !row[right_index].is_null() {
                buckets.entry(&row[right_index]).or_default().push(row);
            }
        }

        let mut rows = Vec::new();
        for left_row in &self.rows {
            if let Some(matches) = buckets.get(&left_row[left_index]) {
                for right_row in matches {
                    let mut joined = left_row.clone();
                    joined.extend(right_row.iter().cloned());
                    rows.push(joined);
                }
            }
        }

        let mut columns = self.columns;
        columns.extend(right.columns.iter().cloned());
        Ok(Relation { columns, rows })
    }

    fn project(self, items: &[SelectItem]) -> Result<QueryResult> {
        let mut indices = Vec::new();
        let mut column_names = Vec::new();
        for item in items {
            match item {
                SelectItem::Wildcard => {
                    for (i, (_, name)) in self.columns.iter().enumerate() {
                        indices.push(i);
                        column_names.push(name.clone());
                    }
                }
                SelectItem::Column { column, .. } => {
                    indices.push(self.resolve(column)?);
                    column_names.push(item.output_name());
                }
                SelectItem::Aggregate { .. } => bail!("Aggregate outside an aggregate query"),
            }
        }

        let rows = self
            .rows
            .into_iter()
            .map(|row| Row::new(indices.iter().map(|&i| row[i].clone()).collect()))
            .collect();

        Ok(QueryResult::Rows { rows, column_names })
    }

    fn aggregate(self, select: &SelectQuery) -> Result<QueryResult> {
        let key_indices = select
            .group_by
            .iter()
            .map(|c| self.resolve(c))
            .collect::<Result<Vec<_>>>()?;

        // groups keep first-seen order
        let mut groups: Vec<(Vec<Value>, Vec<&Vec<Value>>)> = Vec::new();
        let mut positions: HashMap<Vec<Value>, usize> = HashMap::new();
        for row in &self.rows {
            let key: Vec<Value> = key_indices.iter().map(|&i| row[i].clone()).collect();
            let position = *positions.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[position].1.push(row);
        }
        // an ungrouped aggregate yields one row even over no input
        if key_indices.is_empty() && groups.is_empty() {
            groups.push((Vec::new(), Vec::new()));
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, members) in &groups {
            let mut values = Vec::with_capacity(select.items.len());
            for item in &select.items {
                let value = match item {
                    SelectItem::Wildcard => bail!("SELECT * is not allowed with aggregates"),
                    SelectItem::Column { column, .. } => {
                        let index = self.resolve(column)?;
                        let position = key_indices
                            .iter()
                            .position(|&k| k == index)
                            .ok_or_else(|| anyhow!("Column '{}' must appear in GROUP BY", column))?;
                        key[position].clone()
                    }
                    SelectItem::Aggregate { func, .. } => self.fold(func, members)?,
                };
                values.push(value);
            }
            rows.push(Row::new(values));
        }

        let column_names = select.items.iter().map(SelectItem::output_name).collect();
        Ok(QueryResult::Rows { rows, column_names })
    }

    fn fold(&self, func: &Aggregate, members: &[&Vec<Value>]) -> Result<Value> {
        let count = |n: usize| Value::Integer(n as i64);
        match func {
            Aggregate::CountStar => Ok(count(members.len())),
            Aggregate::Count(column) => {
                let i = self.resolve(column)?;
                Ok(count(members.iter().filter(|row| !row[i].is_null()).count()))
            }
            Aggregate::CountDistinct(column) => {
                let i = self.resolve(column)?;
                let distinct: HashSet<&Value> = members
                    .iter()
                    .map(|row| &row[i])
                    .filter(|v| !v.is_null())
                    .collect();
                Ok(count(distinct.len()))
            }
            Aggregate::Sum(column) => {
                let i = self.resolve(column)?;
                let mut total: Option<i64> = None;
                for row in members {
                    match &row[i] {
                        Value::Null => {}
                        Value::Integer(n) => {
                            total = Some(
                                total
                                    .unwrap_or(0)
                                    .checked_add(*n)
                                    .ok_or_else(|| anyhow!("SUM({}) overflowed", column))?,
                            )
                        }
                        other => bail!("Cannot SUM non-integer value '{}'", other),
                    }
                }
                Ok(total.map_or(Value::Null, Value::Integer))
            }
        }
    }
}

/// Represents the result of a query execution
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Rows returned from a SELECT query
    Rows {
        rows: Vec<Row>,
        column_names: Vec<String>,
    },
    /// Rows touched by INSERT, UPDATE or DELETE
    Affected(usize),
    /// A message (for CREATE)
    Message(String),
}

impl QueryResult {
    /// Format the result as a string for display
    /// SELECT results are drawn as a box table
    pub fn format(&self) -> String {
        match self {
            QueryResult::Message(msg) => msg.clone(),
            QueryResult::Affected(n) => format!("{} row(s) affected", n),
            QueryResult::Rows { rows, column_names } => {
                if rows.is_empty() {
                    return "No rows found".to_string();
                }

                let mut widths: Vec<usize> = column_names.iter().map(|c| c.len()).collect();
                for row in rows {
                    for (i, value) in row.values.iter().enumerate() {
                        widths[i] = widths[i].max(value.to_string().len());
                    }
                }

                let border = |left: &str, mid: &str, right: &str| {
                    let cells: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
                    format!("{}{}{}\n", left, cells.join(mid), right)
                };

                let mut result = border("┌", "┬", "┐");

                result.push('│');
                for (name, width) in column_names.iter().zip(&widths) {
                    result.push_str(&format!(" {:<width$} │", name, width = width));
                }
                result.push('\n');

                result.push_str(&border("├", "┼", "┤"));

                for row in rows {
                    result.push('│');
                    for (value, width) in row.values.iter().zip(&widths) {
                        let cell = value.to_string();
                        result.push_str(&format!(" {:<width$} │", cell, width = width));
                    }
                    result.push('\n');
                }

                result.push_str(&border("└", "┴", "┘"));
                result.push_str(&format!("\n{} row(s) returned", rows.len()));

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryParser;

    fn run(db: &mut QueryExecutor, sql: &str) -> QueryResult {
        db.execute(QueryParser::parse(sql).unwrap()).unwrap()
    }

    fn school() -> QueryExecutor {
        let mut db = QueryExecutor::new();
        run(
            &mut db,
            "CREATE TABLE Course (course_id TEXT PRIMARY KEY, title TEXT, department TEXT NOT NULL)",
        );
        run(
            &mut db,
            "CREATE TABLE Grade (student_id TEXT, course_id TEXT, score INTEGER, \
             PRIMARY KEY (student_id, course_id))",
        );
        run(&mut db, "INSERT INTO Course VALUES ('c1', 'Algorithms', 'CS')");
        run(&mut db, "INSERT INTO Course VALUES ('c2', 'Compilers', 'CS')");
        run(&mut db, "INSERT INTO Course VALUES ('m1', 'Calculus', 'MATH')");
        run(&mut db, "INSERT INTO Grade VALUES ('s1', 'c1', 80)");
        run(&mut db, "INSERT INTO Grade VALUES ('s1', 'm1', 70)");
        run(&mut db, "INSERT INTO Grade VALUES ('s2', 'c2', 90)");
        db
    }

    fn rows_of(result: QueryResult) -> Vec<Vec<Value>> {
        match result {
            QueryResult::Rows { rows, .. } => rows.into_iter().map(|r| r.values).collect(),
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_join_group_by_sum_and_count() {
        let mut db = school();
        let mut rows = rows_of(run(
            &mut db,
            "SELECT c.department, SUM(g.score) AS total, COUNT(g.score) AS n \
             FROM Grade g JOIN Course c ON g.course_id = c.course_id GROUP BY c.department",
        ));
        rows.sort();

        assert_eq!(
            rows,
            vec![
                vec![Value::from("CS"), Value::Integer(170), Value::Integer(2)],
                vec![Value::from("MATH"), Value::Integer(70), Value::Integer(1)],
            ]
        );
    }

    #[test]
    fn test_count_distinct_per_student() {
        let mut db = school();
        let mut rows = rows_of(run(
            &mut db,
            "SELECT student_id, COUNT(DISTINCT course_id) AS courses FROM Grade GROUP BY student_id",
        ));
        rows.sort();

        assert_eq!(
            rows,
            vec![
                vec![Value::from("s1"), Value::Integer(2)],
                vec![Value::from("s2"), Value::Integer(1)],
            ]
        );
    }

    #[test]
    fn test_ungrouped_count_over_empty_table() {
        let mut db = school();
        run(&mut db, "DELETE FROM Grade WHERE student_id = 's1'");
        run(&mut db, "DELETE FROM Grade WHERE student_id = 's2'");

        let rows = rows_of(run(&mut db, "SELECT COUNT(*) AS n FROM Grade"));
        assert_eq!(rows, vec![vec![Value::Integer(0)]]);
    }

    #[test]
    fn test_grouped_aggregate_over_empty_input_has_no_rows() {
        let mut db = QueryExecutor::new();
        run(&mut db, "CREATE TABLE Grade (student_id TEXT, course_id TEXT, score INTEGER)");
        let rows = rows_of(run(
            &mut db,
            "SELECT student_id, COUNT(course_id) FROM Grade GROUP BY student_id",
        ));
        assert!(rows.is_empty());
    }

    #[test]
    fn test_insert_with_column_list_and_filtered_select() {
        let mut db = QueryExecutor::new();
        run(
            &mut db,
            "CREATE TABLE Student (student_id TEXT PRIMARY KEY, name TEXT NOT NULL, age INTEGER, email TEXT)",
        );
        run(
            &mut db,
            "INSERT INTO Student (email, student_id, name) VALUES ('a@x.edu', 's1', 'Ada')",
        );

        let result = run(&mut db, "SELECT name, age FROM Student WHERE student_id = 's1'");
        assert_eq!(
            result,
            QueryResult::Rows {
                rows: vec![Row::new(vec![Value::from("Ada"), Value::Null])],
                column_names: vec!["name".to_string(), "age".to_string()],
            }
        );
    }

    #[test]
    fn test_duplicate_insert_surfaces_storage_error() {
        let mut db = school();
        let err = db
            .execute(QueryParser::parse("INSERT INTO Grade VALUES ('s1', 'c1', 10)").unwrap())
            .unwrap_err();
        let storage = err.downcast_ref::<StorageError>().unwrap();
        assert!(storage.is_constraint());
    }

    #[test]
    fn test_update_and_delete_report_affected_rows() {
        let mut db = school();
        assert_eq!(
            run(
                &mut db,
                "UPDATE Grade SET score = 99 WHERE student_id = 's1' AND course_id = 'c1'"
            ),
            QueryResult::Affected(1)
        );
        assert_eq!(
            run(
                &mut db,
                "UPDATE Grade SET score = 99 WHERE student_id = 's9' AND course_id = 'c1'"
            ),
            QueryResult::Affected(0)
        );
        assert_eq!(
            run(&mut db, "DELETE FROM Grade WHERE student_id = 's2' AND course_id = 'c2'"),
            QueryResult::Affected(1)
        );
        assert_eq!(db.get_table("Grade").unwrap().row_count(), 2);
    }

    #[test]
    fn test_ambiguous_column_is_rejected() {
        let mut db = school();
        let query = QueryParser::parse(
            "SELECT course_id FROM Grade g JOIN Course c ON g.course_id = c.course_id",
        )
        .unwrap();
        assert!(db.execute(query).is_err());
    }

    #[test]
    fn test_format_draws_table() {
        let result = QueryResult::Rows {
            rows: vec![Row::new(vec![Value::from("CS"), Value::Integer(3)])],
            column_names: vec!["department".to_string(), "n".to_string()],
        };
        let text = result.format();
        assert!(text.contains("│ department │ n │"));
        assert!(text.ends_with("1 row(s) returned"));
    }
}
