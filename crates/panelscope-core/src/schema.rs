use std::collections::BTreeSet;

use duckdb::params;

use crate::error::{PanelError, Result};
use crate::session::{AnalyticsSession, PANEL_VIEW};

pub const YEAR: &str = "year";
pub const ROW: &str = "row";
pub const COL: &str = "col";
pub const LABEL: &str = "transition_01";

/// Identifier and label columns that never count as features.
pub const NON_FEATURE_COLUMNS: [&str; 6] = [YEAR, "x", "y", ROW, COL, LABEL];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn is_numeric(&self) -> bool {
        is_numeric_type(&self.data_type)
    }
}

pub fn is_numeric_type(data_type: &str) -> bool {
    let upper = data_type.trim().to_ascii_uppercase();
    if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") {
        return true;
    }
    matches!(
        upper.as_str(),
        "TINYINT"
            | "SMALLINT"
            | "INTEGER"
            | "BIGINT"
            | "HUGEINT"
            | "UTINYINT"
            | "USMALLINT"
            | "UINTEGER"
            | "UBIGINT"
            | "UHUGEINT"
            | "FLOAT"
            | "DOUBLE"
    )
}

/// Columns of the bound panel, in file order.
pub fn describe_columns(session: &AnalyticsSession) -> Result<Vec<ColumnInfo>> {
    let mut stmt = session
        .connection()
        .prepare(&format!("DESCRIBE SELECT * FROM {PANEL_VIEW}"))?;
    let rows = stmt.query_map(params![], |row| {
        Ok(ColumnInfo {
            name: row.get(0)?,
            data_type: row.get(1)?,
        })
    })?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    if columns.is_empty() {
        return Err(PanelError::Schema(format!(
            "panel `{}` exposes no columns",
            session.panel_path().display()
        )));
    }
    Ok(columns)
}

pub fn available_columns(session: &AnalyticsSession) -> Result<BTreeSet<String>> {
    Ok(describe_columns(session)?
        .into_iter()
        .map(|column| column.name)
        .collect())
}

/// Requested names that are present, in request order, without duplicates.
pub fn intersect<S: AsRef<str>>(requested: &[S], available: &BTreeSet<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    requested
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| available.contains(*name) && seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Numeric columns outside [`NON_FEATURE_COLUMNS`], in file order.
pub fn feature_columns(columns: &[ColumnInfo]) -> Vec<String> {
    columns
        .iter()
        .filter(|column| column.is_numeric())
        .filter(|column| {
            !NON_FEATURE_COLUMNS
                .iter()
                .any(|excluded| excluded.eq_ignore_ascii_case(&column.name))
        })
        .map(|column| column.name.clone())
        .collect()
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal.
pub fn sql_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn intersect_keeps_request_order_and_drops_missing() {
        let available = set(&["year", "C", "A", "transition_01"]);
        assert_eq!(intersect(&["A", "B", "C", "D"], &available), vec!["A", "C"]);
    }

    #[test]
    fn intersect_with_nothing_present_is_empty() {
        let available = set(&["year", "row"]);
        assert!(intersect(&["A", "B"], &available).is_empty());
    }

    #[test]
    fn intersect_ignores_repeated_requests() {
        let available = set(&["A"]);
        assert_eq!(intersect(&["A", "A"], &available), vec!["A"]);
    }

    #[test]
    fn features_exclude_identifiers_and_text() {
        let columns = vec![
            ColumnInfo { name: "year".into(), data_type: "BIGINT".into() },
            ColumnInfo { name: "x".into(), data_type: "DOUBLE".into() },
            ColumnInfo { name: "ndvi".into(), data_type: "FLOAT".into() },
            ColumnInfo { name: "biome".into(), data_type: "VARCHAR".into() },
            ColumnInfo { name: "dist_to_road".into(), data_type: "DECIMAL(10,2)".into() },
            ColumnInfo { name: "transition_01".into(), data_type: "INTEGER".into() },
        ];
        assert_eq!(feature_columns(&columns), vec!["ndvi", "dist_to_road"]);
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(sql_string("/data/o'brien.parquet"), "'/data/o''brien.parquet'");
    }
}
