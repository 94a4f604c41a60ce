//! Database-level tools.
//!
//! Tools: ping, listDatabases, createDatabase, dropDatabase, getDatabaseStats

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing::info;

use crate::error::Result;
use crate::store::DocStore;
use crate::tools::{report_message, report_value, ParamType, ToolDef, ToolProvider};

/// Provider for database tools.
pub struct DatabaseTools {
    store: Arc<DocStore>,
}

impl DatabaseTools {
    /// Create the provider over a shared store.
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

impl ToolProvider for DatabaseTools {
    fn name(&self) -> &str {
        "database"
    }

    fn tools(&self) -> Result<Vec<ToolDef>> {
        let store = self.store.clone();
        let ping = ToolDef::builder("ping", "Test database connectivity with ping.")
            .handler(move |_args| {
                let databases = store.list_databases();
                report_message(
                    databases,
                    |_| "Database connection is healthy - ping successful.".to_string(),
                    "Database ping failed",
                )
            })
            .build()?;

        let store = self.store.clone();
        let list = ToolDef::builder("listDatabases", "List all databases with statistics.")
            .handler(move |_args| {
                report_value(store.list_databases(), |dbs| {
                    info!("Databases found: {}", dbs.len());
                    json!(dbs)
                })
            })
            .build()?;

        let store = self.store.clone();
        let create = ToolDef::builder(
            "createDatabase",
            "Create a new database with initial collection.",
        )
            .param("dbName", ParamType::String)
            .param("initialCollectionName", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                report_message(
                    store.create_database(&db, &collection),
                    |_| {
                        format!(
                            "Database '{}' created successfully with collection '{}'.",
                            db, collection
                        )
                    },
                    &format!("Failed to create database '{}'", db),
                )
            })
            .build()?;

        let store = self.store.clone();
        let drop = ToolDef::builder("dropDatabase", "Drop/delete a database permanently.")
            .param("dbName", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                report_message(
                    store.drop_database(&db),
                    |_| format!("Database '{}' dropped successfully.", db),
                    &format!("Failed to drop database '{}'", db),
                )
            })
            .build()?;

        let store = self.store.clone();
        let stats = ToolDef::builder("getDatabaseStats", "Get comprehensive database statistics.")
            .param("dbName", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                report_value(store.database_stats(&db), |stats| json!(stats))
            })
            .build()?;

        Ok(vec![ping, list, create, drop, stats])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::bind;
    use serde_json::Map;

    fn call(tools: &[ToolDef], name: &str, args: JsonValue) -> JsonValue {
        let tool = tools.iter().find(|t| t.name == name).unwrap();
        let args = match args {
            JsonValue::Object(m) => m,
            _ => Map::new(),
        };
        tool.invoke(bind(tool, &args).unwrap()).unwrap()
    }

    #[test]
    fn test_create_then_stats() {
        let tools = DatabaseTools::new(Arc::new(DocStore::new())).tools().unwrap();
        let args = json!({"dbName": "shop", "initialCollectionName": "users"});
        let out = call(&tools, "createDatabase", args);
        assert_eq!(out, json!("Database 'shop' created successfully with collection 'users'."));

        let stats = call(&tools, "getDatabaseStats", json!({"dbName": "shop"}));
        assert_eq!(stats["collections"], 1);
        assert_eq!(stats["objects"], 0);
    }

    #[test]
    fn test_failures_are_reported_in_band() {
        let tools = DatabaseTools::new(Arc::new(DocStore::new())).tools().unwrap();
        let out = call(&tools, "dropDatabase", json!({"dbName": "ghost"}));
        assert_eq!(out, json!("Failed to drop database 'ghost': database 'ghost' not found"));

        let stats = call(&tools, "getDatabaseStats", json!({"dbName": "ghost"}));
        assert_eq!(stats["error"], "database 'ghost' not found");
    }

    #[test]
    fn test_ping() {
        let tools = DatabaseTools::new(Arc::new(DocStore::new())).tools().unwrap();
        let out = call(&tools, "ping", json!({}));
        assert!(out.as_str().unwrap().contains("healthy"));
    }
}
