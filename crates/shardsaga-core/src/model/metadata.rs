//! Table metadata from the catalog

/// A declared column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub primary_key: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            primary_key,
        }
    }
}

/// Columns of a logic table in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub table_name: String,
    pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            table_name: table_name.into(),
            columns,
        }
    }

    /// Primary key column names in declaration order (empty if none declared)
    pub fn primary_key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_columns_keep_declaration_order() {
        let meta = TableMetadata::new(
            "t_order_item",
            vec![
                ColumnMetadata::new("item_id", true),
                ColumnMetadata::new("status", false),
                ColumnMetadata::new("order_id", true),
            ],
        );
        assert_eq!(meta.primary_key_columns(), vec!["item_id", "order_id"]);
    }

    #[test]
    fn test_no_primary_key() {
        let meta = TableMetadata::new("t_log", vec![ColumnMetadata::new("msg", false)]);
        assert!(meta.primary_key_columns().is_empty());
    }
}
