use duckdb::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnSchema {
    pub fn to_sql_definition(&self) -> String {
        let nullable_str = if self.nullable { "" } else { " NOT NULL" };
        let pk_str = if self.primary_key { " PRIMARY KEY" } else { "" };
        format!("{} {}{}{}", self.name, self.data_type, nullable_str, pk_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn to_create_table_sql(&self) -> String {
        let columns_sql: Vec<String> = self
            .columns
            .iter()
            .map(|col| col.to_sql_definition())
            .collect();

        format!(
            "CREATE TABLE {} (\n  {}\n);",
            self.name,
            columns_sql.join(",\n  ")
        )
    }
}

/// Reads the user-visible tables (the `main` schema) and their columns.
pub fn load_tables(conn: &Connection) -> Result<Vec<TableSchema>, duckdb::Error> {
    let mut tables_stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables
         WHERE table_schema = 'main' AND table_type = 'BASE TABLE'
         ORDER BY table_name",
    )?;
    let names = tables_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let mut col_stmt = conn.prepare(&format!(
            "SELECT name, type, \"notnull\", pk FROM pragma_table_info('{}') ORDER BY cid",
            name.replace('\'', "''")
        ))?;
        let columns = col_stmt
            .query_map([], |row| {
                let primary_key: bool = row.get(3)?;
                Ok(ColumnSchema {
                    name: row.get(0)?,
                    data_type: row.get(1)?,
                    // DuckDB reports primary keys as NOT NULL as well; keep the DDL terse.
                    nullable: !row.get::<_, bool>(2)? || primary_key,
                    primary_key,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        tables.push(TableSchema { name, columns });
    }

    Ok(tables)
}

/// Renders the database as `CREATE TABLE` statements for the translator prompt.
pub fn describe_schema(conn: &Connection) -> Result<String, duckdb::Error> {
    let ddl = load_tables(conn)?
        .iter()
        .map(TableSchema::to_create_table_sql)
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(ddl)
}
