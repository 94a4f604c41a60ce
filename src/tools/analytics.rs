//! Analytics tools, exposed only with `--exposure all`.
//!
//! Tools: distinctValues, groupByField, textSearch

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::error::Result;
use crate::store::{DocStore, GroupRow};
use crate::tools::document::{compare_values, parse_document};
use crate::tools::{report_value, ParamType, ToolDef, ToolProvider};

/// Provider for analytics tools.
pub struct AnalyticsTools {
    store: Arc<DocStore>,
}

impl AnalyticsTools {
    /// Create the provider over a shared store.
    pub fn new(store: Arc<DocStore>) -> Self {
        Self { store }
    }
}

impl ToolProvider for AnalyticsTools {
    fn name(&self) -> &str {
        "analytics"
    }

    fn tools(&self) -> Result<Vec<ToolDef>> {
        let store = self.store.clone();
        let distinct = ToolDef::builder(
            "distinctValues",
            "Get distinct values from a specific field in the collection.",
        )
        .param("dbName", ParamType::String)
        .param("collectionName", ParamType::String)
        .param("fieldName", ParamType::String)
        .nullable("filterJson", ParamType::String)
        .handler(move |args| {
            let db = args.string(0)?;
            let collection = args.string(1)?;
            let field = args.string(2)?;
            let filter = match parse_document(args.opt_string(3)?.as_deref()) {
                Ok(filter) => filter,
                Err(e) => return Ok(json!({ "error": e })),
            };
            report_value(store.distinct(&db, &collection, &field, &filter), |values| {
                json!({ "distinctValues": values, "count": values.len() })
            })
        })
        .build()?;

        let store = self.store.clone();
        let group = ToolDef::builder(
            "groupByField",
            "Group documents by a specific field and get counts.",
        )
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .param("groupByField", ParamType::String)
            .nullable("countField", ParamType::String)
            .nullable("sortBy", ParamType::String)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let field = args.string(2)?;
                // "count" is the implicit counter, not a field to sum
                let sum_field = args
                    .opt_string(3)?
                    .filter(|f| !f.is_empty() && f != "count");
                let sort_by = args.opt_string(4)?;
                report_value(
                    store.group_by(&db, &collection, &field, sum_field.as_deref()),
                    |mut groups| {
                        sort_groups(&mut groups, sort_by.as_deref());
                        json!(groups)
                    },
                )
            })
            .build()?;

        let store = self.store.clone();
        let search = ToolDef::builder("textSearch", "Perform case-insensitive full-text search.")
            .param("dbName", ParamType::String)
            .param("collectionName", ParamType::String)
            .param("searchText", ParamType::String)
            .nullable("language", ParamType::String)
            .param("limit", ParamType::Integer)
            .handler(move |args| {
                let db = args.string(0)?;
                let collection = args.string(1)?;
                let text = args.string(2)?;
                if let Some(language) = args.opt_string(3)? {
                    // Matching is plain case folding; there is no per-language stemming
                    debug!("textSearch language '{}' ignored", language);
                }
                let limit = usize::try_from(args.integer(4)?).ok().filter(|n| *n > 0);
                report_value(store.text_search(&db, &collection, &text, limit), |docs| json!(docs))
            })
            .build()?;

        Ok(vec![distinct, group, search])
    }
}

/// `count`/`desc` sort by count, `total` by the summed field, anything else
/// by group key. No order keeps the largest group first.
fn sort_groups(groups: &mut [GroupRow], sort_by: Option<&str>) {
    match sort_by {
        None | Some("") | Some("count") | Some("desc") => {
            groups.sort_by(|a, b| b.count.cmp(&a.count))
        }
        Some("total") => groups.sort_by(|a, b| {
            let total = |row: &GroupRow| row.total.as_ref().and_then(JsonValue::as_f64);
            total(b).partial_cmp(&total(a)).unwrap_or(Ordering::Equal)
        }),
        Some(_) => groups.sort_by(|a, b| compare_values(Some(&a.key), Some(&b.key))),
    }
}
