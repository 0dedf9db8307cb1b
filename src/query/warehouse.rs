//! Warehouse conveniences built on `execute` and `query`.

use tracing::debug;

use super::executor::{ExecuteOptions, ExecutionGateway, QueryOptions};
use crate::db::Value;
use crate::error::Result;

impl ExecutionGateway {
    /// Drops `table`, treating a missing table as success.
    pub fn drop_table_if_exists(&mut self, table: &str, cascade: bool) -> Result<Option<u64>> {
        self.drop_if_exists("TABLE", "table", table, cascade)
    }

    /// Drops `view`, treating a missing view as success.
    pub fn drop_view_if_exists(&mut self, view: &str, cascade: bool) -> Result<Option<u64>> {
        self.drop_if_exists("VIEW", "view", view, cascade)
    }

    /// True when `schema.table` is listed in `pg_tables`.
    ///
    /// A swallowed failure reads as `false`.
    pub fn table_exists(&mut self, schema: &str, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT count(*) FROM pg_tables WHERE schemaname = '{}' AND tablename = '{}';",
            quote_literal(schema),
            quote_literal(table)
        );

        let Some(rows) = self.query(&sql, &QueryOptions::quiet())? else {
            return Ok(false);
        };

        let count = rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64);
        debug!("pg_tables count for {}.{}: {:?}", schema, table, count);

        Ok(count == Some(1))
    }

    /// Routes subsequent statements to a WLM query group.
    pub fn set_query_group(&mut self, group: &str) -> Result<Option<u64>> {
        self.execute(
            &format!("SET query_group TO {group};"),
            &ExecuteOptions::default(),
        )
    }

    /// Claims `count` WLM slots for subsequent statements.
    pub fn set_query_slot_count(&mut self, count: u32) -> Result<Option<u64>> {
        self.execute(
            &format!("SET wlm_query_slot_count TO {count};"),
            &ExecuteOptions::default(),
        )
    }

    fn drop_if_exists(
        &mut self,
        keyword: &str,
        noun: &str,
        name: &str,
        cascade: bool,
    ) -> Result<Option<u64>> {
        let cascade = if cascade { " CASCADE" } else { "" };
        let missing = format!("ERROR: {noun} \"{}\" does not exist", remove_schema(name));

        self.execute(
            &format!("DROP {keyword} {name}{cascade};"),
            &ExecuteOptions::quiet().ignoring(missing),
        )
    }
}

/// `schema.table` -> `table`.
fn remove_schema(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}
