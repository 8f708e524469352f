//! Extraction schema, extracted records and output rows

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{Error, Result};

use super::document::DocumentReference;

/// Output schema for extracted records, loaded once per run
///
/// The document is a JSON Schema object; its top-level `properties` name the
/// record fields and `required` lists the ones that must be present.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSchema {
    document: Value,
    properties: Vec<String>,
    required: Vec<String>,
}

impl ExtractionSchema {
    /// Load a schema file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Schema file {} unreadable: {}", path.display(), e))
        })?;
        let document: Value = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("Schema file {} is not valid JSON: {}", path.display(), e))
        })?;
        Self::from_value(document)
    }

    /// Build a schema from an already parsed JSON document
    pub fn from_value(document: Value) -> Result<Self> {
        let object = document
            .as_object()
            .ok_or_else(|| Error::Config("Schema must be a JSON object".to_string()))?;

        let properties: Vec<String> = object
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();

        if properties.is_empty() {
            return Err(Error::Config(
                "Schema must declare at least one field under \"properties\"".to_string(),
            ));
        }

        let required = match object.get("required") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        Error::Config("Schema \"required\" entries must be strings".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(Error::Config(
                    "Schema \"required\" must be an array".to_string(),
                ))
            }
        };

        if let Some(unknown) = required.iter().find(|name| !properties.contains(name)) {
            return Err(Error::Config(format!(
                "Schema requires '{}' but does not declare it under \"properties\"",
                unknown
            )));
        }

        Ok(Self {
            document,
            properties,
            required,
        })
    }

    /// The schema document as loaded
    pub fn as_json(&self) -> &Value {
        &self.document
    }

    /// Compact JSON text of the schema, as sent to services
    pub fn to_json_string(&self) -> String {
        self.document.to_string()
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Check a service payload against the schema
    ///
    /// Required fields must be present and non-null; declared fields that are
    /// absent are filled with an empty string. Undeclared fields are kept.
    pub fn conform(&self, payload: Value) -> Result<ExtractedRecord> {
        let mut fields = match payload {
            Value::Object(map) => map,
            other => {
                return Err(Error::schema_violation(format!(
                    "expected a JSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|name| fields.get(*name).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(Error::schema_violation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            )));
        }

        for name in &self.properties {
            fields
                .entry(name.clone())
                .or_insert_with(|| Value::String(String::new()));
        }

        Ok(ExtractedRecord { fields })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A structured record that passed schema conformance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: Map<String, Value>,
}

impl ExtractedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of a field, if it is a string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Compact JSON text, non-ASCII kept as is
    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}

/// The unit written to the result sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultRow {
    pub source_identifier: String,
    pub extracted_record_json: String,
}

impl ResultRow {
    /// Column names of the output file
    pub const HEADER: [&'static str; 2] = ["source_identifier", "extracted_record_json"];

    pub fn new(reference: &DocumentReference, record: &ExtractedRecord) -> Self {
        Self {
            source_identifier: reference.id.clone(),
            extracted_record_json: record.to_json(),
        }
    }

    pub fn as_record(&self) -> [&str; 2] {
        [&self.source_identifier, &self.extracted_record_json]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lab_schema() -> ExtractionSchema {
        ExtractionSchema::from_value(json!({
            "type": "object",
            "properties": {
                "patient_name": {"type": "string"},
                "test_date": {"type": "string"},
                "result": {"type": "string"}
            },
            "required": ["patient_name"]
        }))
        .unwrap()
    }

    #[test]
    fn test_schema_fields() {
        let schema = lab_schema();
        assert_eq!(schema.properties().len(), 3);
        assert_eq!(schema.required(), ["patient_name".to_string()]);
    }

    #[test]
    fn test_schema_rejects_bad_documents() {
        assert!(matches!(
            ExtractionSchema::from_value(json!([1, 2])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ExtractionSchema::from_value(json!({"type": "object"})),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ExtractionSchema::from_value(json!({
                "properties": {"a": {}},
                "required": ["b"]
            })),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_schema_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExtractionSchema::load(dir.path().join("schema.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_conform_fills_optional_fields() {
        let record = lab_schema()
            .conform(json!({"patient_name": "Jane Doe", "extra": 1}))
            .unwrap();

        assert_eq!(record.get_str("patient_name"), Some("Jane Doe"));
        assert_eq!(record.get_str("test_date"), Some(""));
        assert_eq!(record.get_str("result"), Some(""));
        assert_eq!(record.get("extra"), Some(&json!(1)));
    }

    #[test]
    fn test_conform_rejects_missing_required() {
        let err = lab_schema()
            .conform(json!({"test_date": "2024-01-01"}))
            .unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(ref m) if m.contains("patient_name")));

        let err = lab_schema().conform(json!({"patient_name": null})).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(_)));

        let err = lab_schema().conform(json!("Jane Doe")).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation(ref m) if m.contains("string")));
    }

    #[test]
    fn test_result_row_uses_reference_id() {
        let reference = DocumentReference::drive("1xYz", "lab.pdf", vec![], None);
        let record = lab_schema().conform(json!({"patient_name": "Zoë"})).unwrap();
        let row = ResultRow::new(&reference, &record);

        assert_eq!(row.source_identifier, "1xYz");
        let parsed: Value = serde_json::from_str(&row.extracted_record_json).unwrap();
        assert_eq!(parsed["patient_name"], "Zoë");
        assert!(row.extracted_record_json.contains("Zoë"));
    }
}
