//! Generic SQL builder
//!
//! Assembles SQL text from fragments separated by single spaces. It knows
//! nothing about parameter values, only where the `?` markers go.

/// Fragment-based SQL text builder
///
/// # Example
///
/// ```
/// use shardsaga_core::sql_builder::GenericSqlBuilder;
///
/// let sql = GenericSqlBuilder::new()
///     .append_literals("UPDATE")
///     .append_literals("t_order_0")
///     .append_update_set_assignments(["status"])
///     .append_where_condition(["order_id"])
///     .to_sql();
/// assert_eq!(sql, "UPDATE t_order_0 SET status = ? WHERE order_id = ?");
/// ```
#[derive(Debug, Default, Clone)]
pub struct GenericSqlBuilder {
    fragments: Vec<String>,
}

impl GenericSqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw text; empty text is skipped
    pub fn append_literals(mut self, literals: impl AsRef<str>) -> Self {
        let literals = literals.as_ref().trim();
        if !literals.is_empty() {
            self.fragments.push(literals.to_string());
        }
        self
    }

    /// Append `a, b, c`
    pub fn append_columns<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join(columns, ", ", |c| c.to_string());
        self.append_literals(joined)
    }

    /// Append `(?,?,?)` with one marker per value
    pub fn append_placeholders(self, count: usize) -> Self {
        let markers = vec!["?"; count].join(",");
        self.append_literals(format!("({})", markers))
    }

    /// Append `SET a = ?, b = ?`
    pub fn append_update_set_assignments<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join(columns, ", ", |c| format!("{} = ?", c));
        if joined.is_empty() {
            return self;
        }
        self.append_literals(format!("SET {}", joined))
    }

    /// Append `WHERE a = ? AND b = ?`; nothing when there are no columns
    pub fn append_where_condition<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join(columns, " AND ", |c| format!("{} = ?", c));
        if joined.is_empty() {
            return self;
        }
        self.append_literals(format!("WHERE {}", joined))
    }

    pub fn to_sql(&self) -> String {
        self.fragments.join(" ")
    }
}

fn join<I, S>(items: I, separator: &str, render: impl Fn(&str) -> String) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| render(s.as_ref()))
        .collect::<Vec<_>>()
        .join(separator)
}
