//! Document tools.
//!
//! Tools: insertDocument, insertMany, findDocument, findOne, updateDocument,
//!        deleteDocument, countDocuments, simpleQuery, complexQuery
//!
//! Queries, updates and documents arrive as JSON text. Text that does not
//! parse is a tool-domain failure and is reported in the result.

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::{lookup_path, DocStore, Document};
use crate::tools::{report_message, report_value, ParamType, ToolDef, ToolProvider};

/// Provider for document tools.
pub struct DocumentTools {
    store: Arc<DocStore>,
}

impl DocumentTools {
    /// Create the provider over a shared store.
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

impl ToolProvider for DocumentTools {
    fn name(&self) -> &str {
        "document"
    }

    fn tools(&self) -> Result<Vec<ToolDef>> {
        let store = self.store.clone();
        let insert_one = ToolDef::builder(
            "insertDocument",
            "Insert a single document into a collection with validation.",
        )
        .param("dbName", ParamType::String)
        .param("collectionName", ParamType::String)
        .param("jsonDocument", ParamType::String)
        .handler(move |args| {
            let db = args.string(0)?;
            let collection = args.string(1)?;
            let doc = match parse_document(Some(args.string(2)?.as_str())) {
                Ok(doc) => doc,
                Err(e) => return Ok(json!(format!("Failed to insert document: {}", e))),
            };
            report_message(
                store.insert(&db, &collection, doc),
                |id| {
                    info!("Document inserted into {}.{} with ID: {}", db, collection, id);
                    format!(
                        "Document inserted successfully into collection '{}' with ID: {}",
                        collection, id
                    )
                },
                "Failed to insert document",
            )
        })
        .build()?;

        let store = self.store.clone();
        let insert_many = ToolDef::builder(
            "insertMany",
            "Bulk insert multiple documents into a collection.",
        )
        .param("dbName", ParamType::String)
        .param("collectionName", ParamType::String)
        .param("jsonDocumentsArray", ParamType::String)
        .handler(move |args| {
            let db = args.string(0)?;
            let collection = args.string(1)?;
            let docs = match parse_document_list(&args.string(2)?) {
                Ok(docs) => docs,
                Err(e) => return Ok(json!(format!("Failed to parse documents array: {}", e))),
            };
            if docs.is_empty() {
                return Ok(json!("No valid documents found to insert."));
            }
            report_message(
                store.insert_many(&db, &collection, docs),
                |ids| {
                    format!(
                        "Successfully inserted {} documents into collection '{}'.",
                        ids.len(),
                        collection
                    )
                },
                "Failed to bulk insert documents",
            )
        })
        .build()?;

        let store = self.store.clone();
        let find = ToolDef::builder(
            "findDocument",
            "Find documents with advanced query, projection, and sorting.",
        )
        .param("dbName", ParamType::String)
        .param("collectionName", ParamType::String)
        .nullable("jsonQuery", ParamType::String)
        .nullable("projection", ParamType::String)
        .nullable("sort", ParamType::String)
        .param("limit", ParamType::Integer)
        .handler(move |args| {
            let db = args.string(0)?;
            let collection = args.string(1)?;
            let query = args.opt_string(2)?;
            let projection = args.opt_string(3)?;
            let sort = args.opt_string(4)?;
            let limit = args.integer(5)?;
            let parsed = parse_document(query.as_deref()).and_then(|query| {
                let projection = parse_document(projection.as_deref())?;
                let sort = parse_document(sort.as_deref())?;
                Ok((query, projection, sort))
            });
            let (query, projection, sort) = match parsed {
                Ok(parts) => parts,
                Err(e) => return Ok(json!([{ "error": e }])),
            };

            let limit = usize::try_from(limit).ok().filter(|n| *n > 0);
            // Sorting has to see every match before the limit applies.
            let fetch_limit = if sort.is_empty() { limit } else { None };
            report_value(store.find(&db, &collection, &query, fetch_limit), |mut docs| {
                sort_documents(&mut docs, &sort);
                if let Some(n) = limit {
                    docs.truncate(n);
                }
                info!("Query returned {} results.", docs.len());
                JsonValue::Array(
                    docs.into_iter()
                        .map(|d| JsonValue::Object(project(d, &projection)))
                        .collect(),
                )
            })
        })
        .build()?;

        let store = self.store.clone();
        let find_one = ToolDef::builder("findOne", "Find a single document by criteria.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .nullable("jsonQuery", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let query = match parse_document(args.opt_string(2)?.as_deref()) {
                    Ok(query) => query,
                    Err(e) => return Ok(json!({ "error": e })),
                };
                report_value(store.find(&db, &collection, &query, Some(1)), |docs| {
                    docs.into_iter()
                        .next()
                        .map(JsonValue::Object)
                        .unwrap_or_else(|| json!({ "result": "No document found" }))
                })
            })
            .build()?;

        let store = self.store.clone();
        let update = ToolDef::builder("updateDocument", "Update documents matching criteria.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .param("jsonQuery", ParamType::String)
            .param("jsonUpdate", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let query = args.string(2)?;
                let update = args.string(3)?;
                let parsed = parse_document(Some(query.as_str()))
                    .and_then(|query| Ok((query, parse_document(Some(update.as_str()))?)));
                let (query, update) = match parsed {
                    Ok(parts) => parts,
                    Err(e) => return Ok(json!(format!("Failed to update documents: {}", e))),
                };
                report_message(
                    store.update(&db, &collection, &query, &update),
                    |outcome| {
                        format!(
                            "Update completed. Matched: {}, Modified: {}",
                            outcome.matched_count, outcome.modified_count
                        )
                    },
                    "Failed to update documents",
                )
            })
            .build()?;

        let store = self.store.clone();
        let delete = ToolDef::builder("deleteDocument", "Delete documents matching criteria.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .param("jsonQuery", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let query = match parse_document(Some(args.string(2)?.as_str())) {
                    Ok(query) => query,
                    Err(e) => return Ok(json!(format!("Failed to delete documents: {}", e))),
                };
                report_message(
                    store.delete(&db, &collection, &query),
                    |deleted| format!("Delete completed. Deleted: {} documents.", deleted),
                    "Failed to delete documents",
                )
            })
            .build()?;

        let store = self.store.clone();
        let count = ToolDef::builder("countDocuments", "Count documents matching criteria.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .nullable("jsonQuery", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let query = match parse_document(args.opt_string(2)?.as_deref()) {
                    Ok(query) => query,
                    Err(e) => {
                        warn!("Failed to count documents in {}.{}: {}", db, collection, e);
                        return Ok(json!(-1));
                    }
                };
                report_value(store.count(&db, &collection, &query), |n| json!(n))
            })
            .build()?;

        let store = self.store.clone();
        let simple = ToolDef::builder("simpleQuery", "Execute a simple query on a collection.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .param("field", ParamType::String)
            .param("value", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let field = args.string(2)?;
                let value = args.string(3)?;
                let mut query = Map::new();
                query.insert(field, literal(&value));
                report_value(store.find(&db, &collection, &query, None), |docs| json!(docs))
            })
            .build()?;

        let store = self.store.clone();
        let complex = ToolDef::builder("complexQuery", "Execute a complex query on a collection.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .param("jsonQuery", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let query = match parse_document(Some(args.string(2)?.as_str())) {
                    Ok(query) => query,
                    Err(e) => return Ok(json!([{ "error": e }])),
                };
                report_value(store.find(&db, &collection, &query, None), |docs| json!(docs))
            })
            .build()?;

        Ok(vec![
            insert_one,
            insert_many,
            find,
            find_one,
            update,
            delete,
            count,
            simple,
            complex,
        ])
    }
}

/// Parse JSON text into a document. Absent or blank text is an empty document.
pub(crate) fn parse_document(text: Option<&str>) -> std::result::Result<Document, String> {
    let text = match text.map(str::trim) {
        None | Some("") => return Ok(Document::new()),
        Some(t) => t,
    };
    match serde_json::from_str::<JsonValue>(text) {
        Ok(JsonValue::Object(doc)) => Ok(doc),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Accepts `[{...}, ...]` or `{"documents": [{...}, ...]}`. Non-object items are skipped.
fn parse_document_list(text: &str) -> std::result::Result<Vec<Document>, String> {
    let items = match serde_json::from_str::<JsonValue>(text.trim()).map_err(|e| e.to_string())? {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut wrapper) => match wrapper.remove("documents") {
            Some(JsonValue::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => return Err("expected a JSON array of documents".to_string()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            JsonValue::Object(doc) => Some(doc),
            _ => None,
        })
        .collect())
}

/// Interpret a query value typed as text: integers, decimals and booleans
/// become their JSON counterparts, anything else stays a string.
fn literal(value: &str) -> JsonValue {
    if let Ok(n) = value.parse::<i64>() {
        return json!(n);
    }
    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>() {
            if f.is_finite() {
                return json!(f);
            }
        }
    }
    if value.eq_ignore_ascii_case("true") {
        return json!(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return json!(false);
    }
    json!(value)
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        _ => false,
    }
}

/// Apply an inclusion or exclusion projection to top-level fields.
fn project(doc: Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc;
    }
    let inclusive = projection
        .iter()
        .any(|(field, flag)| field != "_id" && truthy(flag));

    if inclusive {
        let keep_id = projection.get("_id").map_or(true, truthy);
        doc.into_iter()
            .filter(|(k, _)| {
                if k == "_id" {
                    keep_id
                } else {
                    projection.get(k).map_or(false, truthy)
                }
            })
            .collect()
    } else {
        doc.into_iter()
            .filter(|(k, _)| projection.get(k).map_or(true, truthy))
            .collect()
    }
}

pub(crate) fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    fn rank(v: Option<&JsonValue>) -> u8 {
        match v {
            None | Some(JsonValue::Null) => 0,
            Some(JsonValue::Number(_)) => 1,
            Some(JsonValue::String(_)) => 2,
            Some(JsonValue::Object(_)) => 3,
            Some(JsonValue::Array(_)) => 4,
            Some(JsonValue::Bool(_)) => 5,
        }
    }
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (Some(JsonValue::Bool(x)), Some(JsonValue::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Stable multi-key sort; each key is `1` for ascending or `-1` for descending.
fn sort_documents(docs: &mut [Document], sort: &Document) {
    if sort.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let ord = compare_values(lookup_path(a, field), lookup_path(b, field));
            let ord = if direction.as_f64().unwrap_or(1.0) < 0.0 {
                ord.reverse()
            } else {
                ord
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
