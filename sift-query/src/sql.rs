//! SQL generation utilities.

use crate::filter::FilterValue;

/// Escape character used in every generated `LIKE` pattern.
pub const LIKE_ESCAPE: char = '\\';

/// Escape a string for use in SQL (for identifiers, not values).
pub fn escape_identifier(name: &str) -> String {
    // Double any existing quotes
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Check if an identifier needs quoting.
pub fn needs_quoting(name: &str) -> bool {
    // Reserved keywords or names with special characters need quoting
    let reserved = [
        "user", "order", "group", "select", "from", "where", "table", "index", "key", "primary",
        "foreign", "check", "default", "null", "not", "and", "or", "in", "is", "like", "between",
        "case", "when", "then", "else", "end", "as", "on", "join", "left", "right", "inner",
        "outer", "cross", "natural", "using", "limit", "offset", "union", "intersect", "except",
        "all", "distinct", "having", "create", "alter", "drop", "insert", "update", "delete",
        "into", "values", "set", "returning",
    ];

    if name.is_empty() || reserved.contains(&name.to_lowercase().as_str()) {
        return true;
    }

    !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        || name.starts_with(|c: char| c.is_ascii_digit())
}

/// Quote an identifier if needed.
pub fn quote_identifier(name: &str) -> String {
    if needs_quoting(name) {
        escape_identifier(name)
    } else {
        name.to_string()
    }
}

/// `table.column`, each part quoted if needed.
pub fn qualified_column(table: &str, column: &str) -> String {
    format!("{}.{}", quote_identifier(table), quote_identifier(column))
}

/// Escape the `LIKE` metacharacters (`%`, `_` and the escape character
/// itself) so the value only ever matches literally.
///
/// ```rust
/// use sift_query::sql::escape_like;
///
/// assert_eq!(escape_like("100%_done"), "100\\%\\_done");
/// assert_eq!(escape_like(r"a\b"), r"a\\b");
/// ```
pub fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 4);
    for c in value.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Build a parameter placeholder for a given database type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseType {
    /// PostgreSQL uses $1, $2, etc.
    #[default]
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    SQLite,
}

impl DatabaseType {
    /// Get the parameter placeholder for this database type.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// The `ESCAPE` clause appended to `LIKE` patterns.
    pub fn like_escape_clause(&self) -> &'static str {
        match self {
            // MySQL string literals treat backslash as an escape themselves
            Self::MySQL => " ESCAPE '\\\\'",
            Self::PostgreSQL | Self::SQLite => " ESCAPE '\\'",
        }
    }
}

/// A SQL builder that keeps literal text and bound parameters apart.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    db_type: DatabaseType,
    sql: String,
    params: Vec<FilterValue>,
}

impl SqlBuilder {
    /// Create a new SQL builder.
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            sql: String::with_capacity(64),
            params: Vec::new(),
        }
    }

    /// Create a PostgreSQL SQL builder.
    pub fn postgres() -> Self {
        Self::new(DatabaseType::PostgreSQL)
    }

    /// Create a MySQL SQL builder.
    pub fn mysql() -> Self {
        Self::new(DatabaseType::MySQL)
    }

    /// Create a SQLite SQL builder.
    pub fn sqlite() -> Self {
        Self::new(DatabaseType::SQLite)
    }

    /// The dialect being written.
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Push a literal SQL string.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Bind a value and push its placeholder.
    pub fn push_param(&mut self, value: impl Into<FilterValue>) -> &mut Self {
        let index = self.params.len() + 1;
        self.sql.push_str(&self.db_type.placeholder(index));
        self.params.push(value.into());
        self
    }

    /// Push an identifier (properly quoted if needed).
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        self.sql.push_str(&quote_identifier(name));
        self
    }

    /// Push `table.column`.
    pub fn push_column(&mut self, table: &str, column: &str) -> &mut Self {
        self.sql.push_str(&qualified_column(table, column));
        self
    }

    /// Build the final SQL string and parameters.
    pub fn build(self) -> (String, Vec<FilterValue>) {
        (self.sql, self.params)
    }

    /// Get the current SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the current parameters.
    pub fn params(&self) -> &[FilterValue] {
        &self.params
    }

    /// Get the next parameter index.
    pub fn next_param_index(&self) -> usize {
        self.params.len() + 1
    }
}

impl Default for SqlBuilder {
    fn default() -> Self {
        Self::postgres()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("user"), "\"user\"");
        assert_eq!(escape_identifier("my_table"), "\"my_table\"");
        assert_eq!(escape_identifier("has\"quote"), "\"has\"\"quote\"");
    }

    #[test]
    fn test_needs_quoting() {
        assert!(needs_quoting("user"));
        assert!(needs_quoting("order"));
        assert!(needs_quoting("has space"));
        assert!(needs_quoting("1st"));
        assert!(!needs_quoting("my_table"));
        assert!(!needs_quoting("site_id"));
    }

    #[test]
    fn test_qualified_column() {
        assert_eq!(qualified_column("audio_events", "site_id"), "audio_events.site_id");
        assert_eq!(qualified_column("user", "name"), "\"user\".name");
    }

    #[test]
    fn test_escape_like_plain() {
        assert_eq!(escape_like("hello"), "hello");
    }

    #[test]
    fn test_database_placeholder() {
        assert_eq!(DatabaseType::PostgreSQL.placeholder(1), "$1");
        assert_eq!(DatabaseType::PostgreSQL.placeholder(5), "$5");
        assert_eq!(DatabaseType::MySQL.placeholder(1), "?");
        assert_eq!(DatabaseType::SQLite.placeholder(1), "?");
    }

    #[test]
    fn test_sql_builder() {
        let mut builder = SqlBuilder::postgres();
        builder
            .push("SELECT * FROM ")
            .push_identifier("user")
            .push(" WHERE ")
            .push_identifier("id")
            .push(" = ")
            .push_param(42i32);

        let (sql, params) = builder.build();
        assert_eq!(sql, "SELECT * FROM \"user\" WHERE id = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_sql_builder_positional() {
        let mut builder = SqlBuilder::sqlite();
        builder.push_column("t", "a").push(" = ").push_param(1i64);
        builder.push(" AND ").push_column("t", "b").push(" = ").push_param("x");
        assert_eq!(builder.next_param_index(), 3);
        assert_eq!(builder.sql(), "t.a = ? AND t.b = ?");
    }
}
