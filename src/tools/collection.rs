//! Collection tools.
//!
//! Tools: listCollections, createCollection, dropCollection, renameCollection,
//!        getCollectionStats

use std::sync::Arc;

use serde_json::json;

use crate::error::Result;
use crate::store::DocStore;
use crate::tools::document::parse_document;
use crate::tools::{report_message, report_value, ParamType, ToolDef, ToolProvider};

/// Provider for collection tools.
pub struct CollectionTools {
    store: Arc<DocStore>,
}

impl CollectionTools {
    /// Create the provider over a shared store.
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

impl ToolProvider for CollectionTools {
    fn name(&self) -> &str {
        "collection"
    }

    fn tools(&self) -> Result<Vec<ToolDef>> {
        let store = self.store.clone();
        let list = ToolDef::builder(
            "listCollections",
            "List all collections in the specified database with metadata.",
        )
        .param("dbName", ParamType::String)
        .handler(move |args| {
            let db = args.string(0)?;
            report_value(store.list_collections(&db), |colls| json!(colls))
        })
        .build()?;

        let store = self.store.clone();
        let create = ToolDef::builder("createCollection", "Create a new collection.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .nullable("validationSchema", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                // Validators are checked for syntax but not enforced on insert
                if let Err(e) = parse_document(args.opt_string(2)?.as_deref()) {
                    return Ok(json!(format!(
                        "Failed to create collection '{}': invalid validation schema: {}",
                        collection, e
                    )));
                }
                report_message(
                    store.create_collection(&db, &collection),
                    |_| format!("Collection '{}' created successfully in '{}'.", collection, db),
                    &format!("Failed to create collection '{}'", collection),
                )
            })
            .build()?;

        let store = self.store.clone();
        let drop = ToolDef::builder("dropCollection", "Drop/delete a collection permanently.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                report_message(
                    store.drop_collection(&db, &collection),
                    |_| format!("Collection '{}' dropped successfully.", collection),
                    &format!("Failed to drop collection '{}'", collection),
                )
            })
            .build()?;

        let store = self.store.clone();
        let rename = ToolDef::builder("renameCollection", "Rename a collection safely.")
            .param("dbName", ParamType::String)
            .param("oldName", ParamType::String)
            .param("newName", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let old_name = args.string(1)?;
                let new_name = args.string(2)?;
                report_message(
                    store.rename_collection(&db, &old_name, &new_name),
                    |_| format!("Collection renamed from '{}' to '{}'.", old_name, new_name),
                    &format!("Failed to rename collection '{}'", old_name),
                )
            })
            .build()?;

        let store = self.store.clone();
        let stats = ToolDef::builder("getCollectionStats", "Get detailed collection statistics.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                report_value(store.collection_stats(&db, &collection), |stats| json!(stats))
            })
            .build()?;

        Ok(vec![list, create, drop, rename, stats])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::bind;
    use serde_json::{Map, Value as JsonValue};

    fn call(tools: &[ToolDef], name: &str, args: JsonValue) -> JsonValue {
        let tool = tools.iter().find(|t| t.name == name).unwrap();
        let args = match args {
            JsonValue::Object(m) => m,
            _ => Map::new(),
        };
        tool.invoke(bind(tool, &args).unwrap()).unwrap()
    }

    #[test]
    fn test_rename_and_list() {
        let tools = CollectionTools::new(Arc::new(DocStore::new())).tools().unwrap();
        call(&tools, "createCollection", json!({"dbName": "app", "collectionName": "logs"}));
        let out = call(
            &tools,
            "renameCollection",
            json!({"dbName": "app", "oldName": "logs", "newName": "events"}),
        );
        assert_eq!(out, json!("Collection renamed from 'logs' to 'events'."));

        let list = call(&tools, "listCollections", json!({"dbName": "app"}));
        assert_eq!(list[0]["name"], "events");
        assert_eq!(list[0]["count"], 0);
    }

    #[test]
    fn test_duplicate_collection_is_in_band_failure() {
        let tools = CollectionTools::new(Arc::new(DocStore::new())).tools().unwrap();
        call(&tools, "createCollection", json!({"dbName": "app", "collectionName": "logs"}));
        let args = json!({"dbName": "app", "collectionName": "logs"});
        let out = call(&tools, "createCollection", args);
        assert_eq!(
            out,
            json!("Failed to create collection 'logs': collection 'logs' already exists")
        );
    }

    #[test]
    fn test_validation_schema_must_parse() {
        let tools = CollectionTools::new(Arc::new(DocStore::new())).tools().unwrap();
        let out = call(
            &tools,
            "createCollection",
            json!({"dbName": "app", "collectionName": "logs", "validationSchema": "{nope"}),
        );
        assert!(out
            .as_str()
            .unwrap()
            .starts_with("Failed to create collection 'logs': invalid validation schema:"));

        let out = call(
            &tools,
            "createCollection",
            json!({
                "dbName": "app",
                "collectionName": "logs",
                "validationSchema": "{\"$jsonSchema\": {\"required\": [\"level\"]}}"
            }),
        );
        assert_eq!(out, json!("Collection 'logs' created successfully in 'app'."));
    }

    #[test]
    fn test_missing_required_arg_is_error() {
        let tools = CollectionTools::new(Arc::new(DocStore::new())).tools().unwrap();
        let tool = tools.iter().find(|t| t.name == "dropCollection").unwrap();
        let bound = bind(tool, &Map::new()).unwrap();
        assert!(tool.invoke(bound).is_err());
    }
}
