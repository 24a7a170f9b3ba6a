use crate::{Row, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq { column: String, value: Value },
    IsNull { column: String },
    IsNotNull { column: String },
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. }
            | Self::IsNull { column }
            | Self::IsNotNull { column }
            | Self::In { column, .. } => column,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.value_or_null(self.column());
        match self {
            Self::Eq { value, .. } => actual.sql_eq(value),
            Self::IsNull { .. } => actual.is_null(),
            Self::IsNotNull { .. } => !actual.is_null(),
            Self::In { values, .. } => values.iter().any(|value| actual.sql_eq(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// A parameterised single-table select.
///
/// Filter values stay typed until the source binds them; nothing is ever
/// formatted into the statement text.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    table: String,
    projection: Projection,
    filters: Vec<Filter>,
    order_by: Vec<OrderBy>,
    limit: Option<usize>,
}

impl Statement {
    pub fn select_all(table: &str) -> Self {
        Self {
            table: table.to_string(),
            projection: Projection::All,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn select(table: &str, columns: &[&str]) -> Self {
        Self {
            projection: Projection::Columns(columns.iter().map(|c| c.to_string()).collect()),
            ..Self::select_all(table)
        }
    }

    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    pub fn filter_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull {
            column: column.to_string(),
        });
        self
    }

    pub fn filter_not_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNotNull {
            column: column.to_string(),
        });
        self
    }

    pub fn filter_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filters.push(Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            column: column.to_string(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn order(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn limit_value(&self) -> Option<usize> {
        self.limit
    }

    /// Renders the statement with `?` placeholders, returning the bind
    /// parameters in placeholder order.
    pub fn to_sql(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let columns = match &self.projection {
            Projection::All => "*".to_string(),
            Projection::Columns(columns) => columns
                .iter()
                .map(|column| quote_identifier(column))
                .collect::<Vec<_>>()
                .join(", "),
        };
        let mut sql = format!("SELECT {columns} FROM {}", quote_identifier(&self.table));

        if !self.filters.is_empty() {
            let clauses = self
                .filters
                .iter()
                .map(|filter| match filter {
                    Filter::Eq { column, value } => {
                        params.push(value.clone());
                        format!("{} = ?", quote_identifier(column))
                    }
                    Filter::IsNull { column } => format!("{} IS NULL", quote_identifier(column)),
                    Filter::IsNotNull { column } => {
                        format!("{} IS NOT NULL", quote_identifier(column))
                    }
                    Filter::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
                    Filter::In { column, values } => {
                        params.extend(values.iter().cloned());
                        let placeholders = vec!["?"; values.len()].join(", ");
                        format!("{} IN ({placeholders})", quote_identifier(column))
                    }
                })
                .collect::<Vec<_>>();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            let keys = self
                .order_by
                .iter()
                .map(|key| {
                    let direction = match key.direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    format!("{} {direction}", quote_identifier(&key.column))
                })
                .collect::<Vec<_>>();
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        (sql, params)
    }
}

fn quote_identifier(raw: &str) -> String {
    format!("`{}`", raw.replace('`', "``"))
}
