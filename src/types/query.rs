use std::fmt;
use std::sync::Arc;

use super::{AccessError, Result, Value};

/// Immutable SQL statement together with its positional parameters.
///
/// Two queries are cache-equivalent when both the statement text and the
/// parameter list are structurally equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    sql: Arc<str>,
    params: Arc<[Value]>,
}

impl Query {
    /// Creates a query without parameters.
    pub fn new(sql: impl AsRef<str>) -> Self {
        Self {
            sql: Arc::from(sql.as_ref()),
            params: Arc::from(Vec::new()),
        }
    }

    /// Creates a query with positional parameters.
    pub fn with_params<I, V>(sql: impl AsRef<str>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let params: Vec<Value> = params.into_iter().map(Into::into).collect();
        Self {
            sql: Arc::from(sql.as_ref()),
            params: params.into(),
        }
    }

    /// Statement text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Positional parameters.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Restricts the query to one page window using `LIMIT ? OFFSET ?`.
    ///
    /// The window is bound as two trailing parameters, so the base statement
    /// must not already end in a `LIMIT` clause. Windows beyond the range of
    /// an SQL integer are rejected as [`AccessError::InvalidArgument`].
    pub fn windowed(&self, window: PageWindow) -> Result<Query> {
        let limit = i64::try_from(window.page_size)
            .map_err(|_| AccessError::InvalidArgument("page_size exceeds the SQL integer range"))?;
        let offset = i64::try_from(window.offset)
            .map_err(|_| AccessError::InvalidArgument("offset exceeds the SQL integer range"))?;
        let base = self.sql.trim_end().trim_end_matches(';');
        let mut params = self.params.to_vec();
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset));
        Ok(Query {
            sql: Arc::from(format!("{base} LIMIT ? OFFSET ?")),
            params: params.into(),
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)?;
        if !self.params.is_empty() {
            f.write_str(" [")?;
            for (idx, param) in self.params.iter().enumerate() {
                if idx > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Query::new(sql)
    }
}

/// `(page_size, offset)` pair issued by the lazy paginator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PageWindow {
    /// Maximum rows requested.
    pub page_size: usize,
    /// Rows skipped before the page starts.
    pub offset: usize,
}
