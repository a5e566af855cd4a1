//! Conversion between JSON request/response bodies and BSON documents.
//!
//! Documents leave the service as relaxed extended JSON (an ObjectId renders
//! as `{"$oid": "..."}`) and are accepted back in the same form.

use std::fmt;

use common::errors::{AppError, AppResult};
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use serde_json::Value;

/// Renders a document as relaxed extended JSON.
pub fn document_to_json(document: Document) -> Value {
    Bson::Document(document).into_relaxed_extjson()
}

/// Renders any BSON value as relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> Value {
    value.into_relaxed_extjson()
}

/// Parses a JSON object (extended JSON allowed) into a document.
///
/// `what` names the field in error messages.
pub fn parse_document(value: Value, what: &str) -> AppResult<Document> {
    if !value.is_object() {
        return Err(AppError::Validation(format!("{} must be a JSON object", what)));
    }
    match Bson::try_from(value) {
        Ok(Bson::Document(document)) => Ok(document),
        // e.g. `{"$oid": "..."}` is an extended JSON scalar, not a document
        Ok(_) => Err(AppError::Validation(format!("{} must be a JSON object", what))),
        Err(e) => Err(AppError::Validation(format!(
            "{} is not valid extended JSON: {}",
            what, e
        ))),
    }
}

/// Parses the `update` field of an update request into the set of fields to
/// assign.
///
/// `_id` is dropped since the identity cannot change. Operator keys are
/// rejected because the fields are applied under `$set`.
pub fn parse_update(value: Value) -> AppResult<Document> {
    let mut fields = parse_document(value, "Update")?;
    fields.remove("_id");
    if let Some(key) = fields.keys().find(|k| k.starts_with('$')) {
        return Err(AppError::Validation(format!(
            "Update field names must not start with '$': {}",
            key
        )));
    }
    if fields.is_empty() {
        return Err(AppError::Validation(
            "Update must set at least one field".into(),
        ));
    }
    Ok(fields)
}

/// Identity of a target document, as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentId(Bson);

impl DocumentId {
    /// Accepts a string, a number or an extended JSON value such as
    /// `{"$oid": "..."}`.
    pub fn parse(value: Value) -> AppResult<Self> {
        match value {
            Value::String(s) if s.trim().is_empty() => {
                Err(AppError::Validation("Missing parameters".into()))
            }
            Value::String(s) => Ok(Self(Bson::String(s))),
            Value::Null => Err(AppError::Validation("Missing parameters".into())),
            Value::Bool(_) | Value::Array(_) => Err(AppError::Validation(
                "id must be a string or an extended JSON value".into(),
            )),
            other => match Bson::try_from(other) {
                // A `$` key here would act as a query operator on `_id`.
                Ok(Bson::Document(doc)) if doc.keys().any(|k| k.starts_with('$')) => Err(
                    AppError::Validation("id must not contain query operators".into()),
                ),
                Ok(bson) => Ok(Self(bson)),
                Err(e) => Err(AppError::Validation(format!(
                    "id is not valid extended JSON: {}",
                    e
                ))),
            },
        }
    }

    /// Values of `_id` this identity matches.
    ///
    /// A string that is a valid ObjectId matches both the ObjectId and the
    /// literal string, since listed documents expose either form.
    pub fn candidates(&self) -> Vec<Bson> {
        match &self.0 {
            Bson::String(s) => match ObjectId::parse_str(s) {
                Ok(oid) => vec![Bson::ObjectId(oid), self.0.clone()],
                Err(_) => vec![self.0.clone()],
            },
            other => vec![other.clone()],
        }
    }

    /// Query filter selecting the document.
    pub fn filter(&self) -> Document {
        let mut candidates = self.candidates();
        if candidates.len() == 1 {
            doc! { "_id": candidates.remove(0) }
        } else {
            doc! { "_id": { "$in": candidates } }
        }
    }

    /// Whether `value` (an `_id`) is matched by this identity.
    pub fn matches(&self, value: &Bson) -> bool {
        self.candidates().iter().any(|c| c == value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.clone().into_relaxed_extjson())
    }
}
