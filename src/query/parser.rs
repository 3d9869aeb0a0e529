// SQL Parser
// Turns a parameterized SQL statement into a bound query plan.
// The sqlparser crate handles the grammar; this module accepts the subset
// our shards can execute and substitutes `?` / `$n` placeholders with
// caller-supplied values as it walks the tree.

use crate::storage::{Column, DataType, Schema, Value};
use anyhow::{anyhow, bail, Context, Result};
use sqlparser::ast;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// The statements our shards support, with every parameter already bound
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// CREATE TABLE t (col TYPE [PRIMARY KEY] [NOT NULL], ..., [PRIMARY KEY (a, b)])
    CreateTable { name: String, schema: Schema },
    /// INSERT INTO t [(cols)] VALUES (...)
    Insert {
        table_name: String,
        /// Empty means schema order
        columns: Vec<String>,
        values: Vec<Value>,
    },
    /// SELECT ... FROM t [JOIN u ON t.a = u.b] [WHERE a = x AND ...] [GROUP BY ...]
    Select(SelectQuery),
    /// UPDATE t SET col = value WHERE a = x [AND ...]
    Update {
        table_name: String,
        set_column: String,
        set_value: Value,
        filter: Vec<Condition>,
    },
    /// DELETE FROM t WHERE a = x [AND ...]
    Delete {
        table_name: String,
        filter: Vec<Condition>,
    },
}

/// A possibly table-qualified column name (`g.score` or `score`)
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(name: &str) -> Self {
        Self {
            qualifier: None,
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One `column = value` term of a conjunctive WHERE clause
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: ColumnRef,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

impl TableRef {
    /// The name columns of this table are qualified with
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// INNER JOIN table ON left = right
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: TableRef,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    CountStar,
    Count(ColumnRef),
    CountDistinct(ColumnRef),
    Sum(ColumnRef),
}

impl Aggregate {
    fn default_name(&self) -> &'static str {
        match self {
            Aggregate::CountStar | Aggregate::Count(_) | Aggregate::CountDistinct(_) => "count",
            Aggregate::Sum(_) => "sum",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    Wildcard,
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    Aggregate {
        func: Aggregate,
        alias: Option<String>,
    },
}

impl SelectItem {
    /// Output column name for this item
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::Wildcard => "*".to_string(),
            SelectItem::Column { column, alias } => {
                alias.clone().unwrap_or_else(|| column.name.clone())
            }
            SelectItem::Aggregate { func, alias } => {
                alias.clone().unwrap_or_else(|| func.default_name().to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub from: TableRef,
    pub joins: Vec<JoinClause>,
    pub items: Vec<SelectItem>,
    pub filter: Vec<Condition>,
    pub group_by: Vec<ColumnRef>,
}

impl SelectQuery {
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .items
                .iter()
                .any(|item| matches!(item, SelectItem::Aggregate { .. }))
    }
}

/// Hands out parameters to placeholders in the order they are met
struct Binder<'a> {
    params: &'a [Value],
    next: usize,
}

impl<'a> Binder<'a> {
    fn new(params: &'a [Value]) -> Self {
        Self { params, next: 0 }
    }

    fn bind(&mut self, placeholder: &str) -> Result<Value> {
        // `$n` and `?n` are explicit and 1-based, a bare `?` is positional
        let explicit = placeholder
            .strip_prefix('$')
            .or_else(|| placeholder.strip_prefix('?'))
            .filter(|n| !n.is_empty());
        let index = match explicit {
            Some(n) => n
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .ok_or_else(|| anyhow!("Invalid placeholder: {}", placeholder))?,
            None => self.next,
        };
        self.next = self.next.max(index + 1);

        self.params.get(index).cloned().ok_or_else(|| {
            anyhow!(
                "Missing parameter {} (got {} parameter(s))",
                index + 1,
                self.params.len()
            )
        })
    }

    fn finish(self) -> Result<()> {
        if self.next != self.params.len() {
            bail!(
                "Statement uses {} parameter(s) but {} were supplied",
                self.next,
                self.params.len()
            );
        }
        Ok(())
    }
}

pub struct QueryParser;

impl QueryParser {
    /// Parse a statement that carries no placeholders
    pub fn parse(sql: &str) -> Result<Query> {
        Self::parse_with_params(sql, &[])
    }

    /// Parse a statement template and bind its placeholders
    pub fn parse_with_params(sql: &str, params: &[Value]) -> Result<Query> {
        let dialect = GenericDialect {};
        let statements = Parser::parse_sql(&dialect, sql)
            .map_err(|e| anyhow!("SQL parsing error: {}", e))?;

        if statements.len() != 1 {
            bail!("Only single statements are supported");
        }

        let mut binder = Binder::new(params);
        let query = match &statements[0] {
            ast::Statement::CreateTable(create_table) => Self::parse_create_table(create_table)?,
            ast::Statement::Insert(insert) => Self::parse_insert(insert, &mut binder)?,
            ast::Statement::Query(query) => Self::parse_select(query, &mut binder)?,
            ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => Self::parse_update(table, assignments, selection, &mut binder)?,
            ast::Statement::Delete(delete) => Self::parse_delete(delete, &mut binder)?,
            _ => bail!("Unsupported SQL statement"),
        };
        binder.finish().with_context(|| format!("binding `{}`", sql))?;

        Ok(query)
    }

    fn parse_create_table(create_table: &ast::CreateTable) -> Result<Query> {
        let table_name = Self::object_name(&create_table.name);
        let mut columns = Vec::new();
        let mut primary_key = Vec::new();

        for (position, column_def) in create_table.columns.iter().enumerate() {
            let data_type = Self::parse_data_type(&column_def.data_type)?;

            if column_def.options.iter().any(|opt| {
                matches!(opt.option, ast::ColumnOption::Unique { is_primary: true, .. })
            }) {
                primary_key.push(position);
            }

            let nullable = !column_def
                .options
                .iter()
                .any(|opt| matches!(opt.option, ast::ColumnOption::NotNull));

            columns.push(Column {
                name: Self::ident(&column_def.name),
                data_type,
                nullable,
            });
        }

        for constraint in &create_table.constraints {
            if let ast::TableConstraint::PrimaryKey { columns: key, .. } = constraint {
                if !primary_key.is_empty() {
                    bail!("Table '{}' declares more than one primary key", table_name);
                }
                for ident in key {
                    let name = Self::ident(ident);
                    let position = columns
                        .iter()
                        .position(|c| c.name == name)
                        .ok_or_else(|| anyhow!("Primary key column not found: {}", name))?;
                    primary_key.push(position);
                }
            }
        }

        Ok(Query::CreateTable {
            name: table_name,
            schema: Schema::new(columns, primary_key),
        })
    }

    fn parse_insert(insert: &ast::Insert, binder: &mut Binder<'_>) -> Result<Query> {
        let table_name = Self::object_name(&insert.table_name);
        let columns = insert.columns.iter().map(Self::ident).collect();

        let values = match &insert.source {
            Some(source) => match source.body.as_ref() {
                ast::SetExpr::Values(values) => {
                    // single row inserts only
                    if values.rows.len() != 1 {
                        bail!("Expected exactly one row of values");
                    }
                    values.rows[0]
                        .iter()
                        .map(|expr| Self::parse_value(expr, binder))
                        .collect::<Result<Vec<_>>>()?
                }
                _ => bail!("Unsupported INSERT format"),
            },
            None => bail!("No values provided"),
        };

        Ok(Query::Insert {
            table_name,
            columns,
            values,
        })
    }

    fn parse_select(query: &ast::Query, binder: &mut Binder<'_>) -> Result<Query> {
        let select = match query.body.as_ref() {
            ast::SetExpr::Select(select) => select,
            _ => bail!("Unsupported SELECT format"),
        };
        if select.having.is_some() {
            bail!("HAVING is not supported");
        }

        let items = select
            .projection
            .iter()
            .map(Self::parse_select_item)
            .collect::<Result<Vec<_>>>()?;

        if select.from.len() != 1 {
            bail!("Expected exactly one table in FROM");
        }
        let from = Self::table_ref(&select.from[0].relation)?;

        let mut joins = Vec::new();
        for join in &select.from[0].joins {
            let table = Self::table_ref(&join.relation)?;
            let (left, right) = match &join.join_operator {
                ast::JoinOperator::Inner(ast::JoinConstraint::On(expr)) => {
                    Self::parse_join_condition(expr)?
                }
                _ => bail!("Only INNER JOIN ... ON a = b is supported"),
            };
            joins.push(JoinClause { table, left, right });
        }

        let mut filter = Vec::new();
        if let Some(selection) = &select.selection {
            Self::parse_conditions(selection, binder, &mut filter)?;
        }

        let group_by = match &select.group_by {
            ast::GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(Self::column_ref)
                .collect::<Result<Vec<_>>>()?,
            _ => bail!("GROUP BY ALL is not supported"),
        };

        Ok(Query::Select(SelectQuery {
            from,
            joins,
            items,
            filter,
            group_by,
        }))
    }

    fn parse_update(
        table: &ast::TableWithJoins,
        assignments: &[ast::Assignment],
        selection: &Option<ast::Expr>,
        binder: &mut Binder<'_>,
    ) -> Result<Query> {
        let table_name = Self::table_ref(&table.relation)?.name;

        if assignments.len() != 1 {
            bail!("Only single column updates are supported");
        }

        let assignment = &assignments[0];
        let set_column = match &assignment.target {
            ast::AssignmentTarget::ColumnName(name) => Self::object_name(name),
            _ => bail!("Unsupported assignment target"),
        };
        let set_value = Self::parse_value(&assignment.value, binder)?;

        // WHERE clause is required for updates (safety feature)
        let mut filter = Vec::new();
        match selection {
            Some(expr) => Self::parse_conditions(expr, binder, &mut filter)?,
            None => bail!("UPDATE requires WHERE clause"),
        }

        Ok(Query::Update {
            table_name,
            set_column,
            set_value,
            filter,
        })
    }

    fn parse_delete(delete: &ast::Delete, binder: &mut Binder<'_>) -> Result<Query> {
        let tables = match &delete.from {
            ast::FromTable::WithFromKeyword(tables) | ast::FromTable::WithoutKeyword(tables) => {
                tables
            }
        };
        let table_name = match tables.as_slice() {
            [table] => Self::table_ref(&table.relation)?.name,
            _ => bail!("DELETE needs exactly one table"),
        };

        // WHERE clause is required for deletes (safety feature)
        let mut filter = Vec::new();
        match &delete.selection {
            Some(expr) => Self::parse_conditions(expr, binder, &mut filter)?,
            None => bail!("DELETE requires WHERE clause"),
        }

        Ok(Query::Delete { table_name, filter })
    }

    fn parse_select_item(item: &ast::SelectItem) -> Result<SelectItem> {
        let (expr, alias) = match item {
            ast::SelectItem::Wildcard(_) => return Ok(SelectItem::Wildcard),
            ast::SelectItem::UnnamedExpr(expr) => (expr, None),
            ast::SelectItem::ExprWithAlias { expr, alias } => (expr, Some(Self::ident(alias))),
            _ => bail!("Unsupported select item: {}", item),
        };

        match expr {
            ast::Expr::Function(function) => Ok(SelectItem::Aggregate {
                func: Self::parse_aggregate(function)?,
                alias,
            }),
            _ => Ok(SelectItem::Column {
                column: Self::column_ref(expr)?,
                alias,
            }),
        }
    }

    fn parse_aggregate(function: &ast::Function) -> Result<Aggregate> {
        let name = Self::object_name(&function.name);
        let list = match &function.args {
            ast::FunctionArguments::List(list) => list,
            _ => bail!("Unsupported call to {}", name),
        };
        let distinct = matches!(
            list.duplicate_treatment,
            Some(ast::DuplicateTreatment::Distinct)
        );

        let arg = match list.args.as_slice() {
            [ast::FunctionArg::Unnamed(arg)] => arg,
            _ => bail!("{} takes exactly one argument", name),
        };

        match (name.as_str(), arg, distinct) {
            ("count", ast::FunctionArgExpr::Wildcard, false) => Ok(Aggregate::CountStar),
            ("count", ast::FunctionArgExpr::Expr(expr), false) => {
                Ok(Aggregate::Count(Self::column_ref(expr)?))
            }
            ("count", ast::FunctionArgExpr::Expr(expr), true) => {
                Ok(Aggregate::CountDistinct(Self::column_ref(expr)?))
            }
            ("sum", ast::FunctionArgExpr::Expr(expr), false) => {
                Ok(Aggregate::Sum(Self::column_ref(expr)?))
            }
            _ => bail!("Unsupported aggregate: {}", function),
        }
    }

    fn parse_join_condition(expr: &ast::Expr) -> Result<(ColumnRef, ColumnRef)> {
        match expr {
            ast::Expr::Nested(inner) => Self::parse_join_condition(inner),
            ast::Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => Ok((Self::column_ref(left)?, Self::column_ref(right)?)),
            _ => bail!("Join condition must be a column equality: {}", expr),
        }
    }

    /// Flatten `a = x AND b = y AND ...` into conditions
    fn parse_conditions(
        expr: &ast::Expr,
        binder: &mut Binder<'_>,
        out: &mut Vec<Condition>,
    ) -> Result<()> {
        match expr {
            ast::Expr::Nested(inner) => Self::parse_conditions(inner, binder, out),
            ast::Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::And,
                right,
            } => {
                Self::parse_conditions(left, binder, out)?;
                Self::parse_conditions(right, binder, out)
            }
            ast::Expr::BinaryOp {
                left,
                op: ast::BinaryOperator::Eq,
                right,
            } => {
                let column = Self::column_ref(left)
                    .context("Expected column name on the left of = in WHERE clause")?;
                let value = Self::parse_value(right, binder)?;
                out.push(Condition { column, value });
                Ok(())
            }
            _ => bail!("Only `column = value` terms joined by AND are supported in WHERE"),
        }
    }

    fn parse_data_type(sql_type: &ast::DataType) -> Result<DataType> {
        match sql_type {
            ast::DataType::Int(_) | ast::DataType::Integer(_) | ast::DataType::BigInt(_) => {
                Ok(DataType::Integer)
            }
            ast::DataType::Text | ast::DataType::Varchar(_) | ast::DataType::String(_) => {
                Ok(DataType::Text)
            }
            _ => Err(anyhow!("Unsupported data type: {}", sql_type)),
        }
    }

    fn parse_value(expr: &ast::Expr, binder: &mut Binder<'_>) -> Result<Value> {
        match expr {
            ast::Expr::Value(ast::Value::Placeholder(p)) => binder.bind(p),
            ast::Expr::Value(ast::Value::Number(n, _)) => Ok(Value::Integer(
                n.parse()
                    .with_context(|| format!("Unsupported numeric literal: {}", n))?,
            )),
            ast::Expr::Value(ast::Value::SingleQuotedString(s)) => Ok(Value::Text(s.clone())),
            ast::Expr::Value(ast::Value::Null) => Ok(Value::Null),
            ast::Expr::UnaryOp {
                op: ast::UnaryOperator::Minus,
                expr,
            } => match Self::parse_value(expr, binder)? {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                other => bail!("Cannot negate {}", other),
            },
            _ => bail!("Unsupported value expression: {}", expr),
        }
    }

    fn column_ref(expr: &ast::Expr) -> Result<ColumnRef> {
        match expr {
            ast::Expr::Identifier(ident) => Ok(ColumnRef {
                qualifier: None,
                name: Self::ident(ident),
            }),
            ast::Expr::CompoundIdentifier(parts) => match parts.as_slice() {
                [table, column] => Ok(ColumnRef {
                    qualifier: Some(Self::ident(table)),
                    name: Self::ident(column),
                }),
                _ => bail!("Unsupported column reference: {}", expr),
            },
            _ => bail!("Expected a column reference, got {}", expr),
        }
    }

    fn table_ref(factor: &ast::TableFactor) -> Result<TableRef> {
        match factor {
            ast::TableFactor::Table { name, alias, .. } => Ok(TableRef {
                name: Self::object_name(name),
                alias: alias.as_ref().map(|a| Self::ident(&a.name)),
            }),
            _ => bail!("Unsupported table reference"),
        }
    }

    /// Identifiers are case-insensitive: everything is stored lowercased
    fn ident(ident: &ast::Ident) -> String {
        ident.value.to_lowercase()
    }

    fn object_name(name: &ast::ObjectName) -> String {
        name.0.iter().map(Self::ident).collect::<Vec<_>>().join(".")
    }
}
