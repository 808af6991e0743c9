// SPDX-License-Identifier: Apache-2.0

//! Partition descriptor

use std::collections::BTreeMap;

use qore_query::Expr;

/// A named group of tables that can't be joined in SQL with tables outside
/// the group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSplit {
    name: String,
    tables: Vec<String>,
    /// alias -> table
    aliases: BTreeMap<String, String>,
}

impl PartitionSplit {
    pub fn new<I, S>(name: impl Into<String>, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut split = Self {
            name: name.into(),
            tables: Vec::new(),
            aliases: BTreeMap::new(),
        };
        for table in tables {
            split.add_table(table);
        }
        split
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn contains_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Whether `name` qualifies columns of this partition, as a table name
    /// or as an alias.
    pub fn contains_reference(&self, name: &str) -> bool {
        self.contains_alias(name) || self.contains_table(name)
    }

    /// Records `alias` for `table`. Ignored when the table isn't part of
    /// this partition.
    pub fn add_alias(&mut self, table: &str, alias: &str) {
        if self.contains_table(table) {
            self.aliases.insert(alias.to_string(), table.to_string());
        }
    }

    pub fn add_table(&mut self, table: impl Into<String>) {
        let table = table.into();
        if !self.contains_table(&table) {
            self.tables.push(table);
        }
    }

    /// Resolves `alias.column`; a bare column never belongs to a partition.
    pub fn is_column_in_partition(&self, column: &str) -> bool {
        match column.split_once('.') {
            Some((qualifier, _)) => self.contains_reference(qualifier),
            None => false,
        }
    }

    /// Whether the predicate references any table or alias of this partition.
    pub fn check_predicate_for_table(&self, predicate: &Expr) -> bool {
        predicate
            .qualifiers()
            .into_iter()
            .any(|q| self.contains_reference(q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qore_query::{col, lit};

    fn metadata() -> PartitionSplit {
        PartitionSplit::new("metadata", ["file_metadata", "file_metadata_ext"])
    }

    #[test]
    fn aliases_only_register_for_known_tables() {
        let mut split = metadata();
        split.add_alias("file_metadata", "m");
        split.add_alias("filecache", "f");
        assert!(split.contains_alias("m"));
        assert!(!split.contains_alias("f"));
    }

    #[test]
    fn resolves_qualified_columns_only() {
        let mut split = metadata();
        split.add_alias("file_metadata", "m");
        assert!(split.is_column_in_partition("m.fileid"));
        assert!(split.is_column_in_partition("file_metadata_ext.value"));
        assert!(!split.is_column_in_partition("fileid"));
        assert!(!split.is_column_in_partition("f.fileid"));
    }

    #[test]
    fn attribution_is_exact_not_substring() {
        let mut split = metadata();
        split.add_alias("file_metadata", "m");
        // "mm" contains "m" but is a different alias
        assert!(!split.check_predicate_for_table(&Expr::eq(col("mm.value"), lit(1))));
        assert!(split.check_predicate_for_table(&Expr::eq(col("m.value"), lit(1))));
        assert!(!split.check_predicate_for_table(&Expr::raw("m.value = 1")));
    }

    #[test]
    fn tables_stay_unique_and_ordered() {
        let mut split = metadata();
        split.add_table("file_metadata");
        split.add_table("extra");
        assert_eq!(split.tables(), ["file_metadata", "file_metadata_ext", "extra"]);
    }
}
