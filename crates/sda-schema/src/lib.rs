//! Schema Validator (C6): validates broker envelopes against a named JSON
//! schema before publish and after receive, symmetrically, for one of two
//! profiles (`isolated` single-site, `federated` multi-site).

use std::collections::HashMap;
use std::path::Path;

use jsonschema::{Draft, JSONSchema};
use serde_json::Value;
use tracing::{debug, info, instrument};

use sda_core::{config::SchemaProfile, Error, Result};

/// A loaded set of schemas for one profile. Schemas are kept as raw
/// documents and compiled per call rather than cached as `JSONSchema`
/// (which borrows its source document), matching how schema compilation
/// is treated as cheap, throwaway work elsewhere in the corpus.
pub struct SchemaValidator {
    schemas: HashMap<String, Value>,
    profile: SchemaProfile,
}

impl SchemaValidator {
    /// Load every `*.json` file directly under `dir/<profile>/` keyed by
    /// file stem (`ingestion-trigger.json` → `"ingestion-trigger"`).
    #[instrument(level = "debug", skip(dir))]
    pub fn load(dir: &Path, profile: SchemaProfile) -> Result<Self> {
        let profile_dir = dir.join(match profile {
            SchemaProfile::Isolated => "isolated",
            SchemaProfile::Federated => "federated",
        });
        debug!(dir = %profile_dir.display(), "🔧 loading schema set");

        let mut schemas = HashMap::new();
        let entries = std::fs::read_dir(&profile_dir)
            .map_err(|e| Error::Config(format!("schema directory {}: {e}", profile_dir.display())))?;

        for entry in entries {
            let entry = entry.map_err(|e| Error::Config(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::Config(format!("unreadable schema filename {}", path.display())))?
                .to_string();

            let raw = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("reading schema {}: {e}", path.display())))?;
            let doc: Value = serde_json::from_str(&raw)?;

            // Compile once up front purely to fail fast on a malformed schema file.
            JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&doc)
                .map_err(|e| Error::Config(format!("schema {name} does not compile: {e}")))?;

            schemas.insert(name, doc);
        }

        info!(count = schemas.len(), ?profile, "✅ schema set loaded");
        Ok(Self { schemas, profile })
    }

    pub fn profile(&self) -> SchemaProfile {
        self.profile
    }

    /// Validate `message` against the named schema. Used symmetrically on
    /// publish and on consume (§4.6); there is no profile negotiation — a
    /// mismatch between sender and receiver profile surfaces here as a
    /// validation failure.
    #[instrument(level = "debug", skip(self, message))]
    pub fn validate(&self, schema_name: &str, message: &Value) -> Result<()> {
        let doc = self
            .schemas
            .get(schema_name)
            .ok_or_else(|| Error::SchemaValidation(format!("no schema named {schema_name}")))?;

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(doc)
            .map_err(|e| Error::Internal(format!("schema {schema_name} failed to recompile: {e}")))?;

        compiled.validate(message).map_err(|errors| {
            let detail = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Error::SchemaValidation(format!("{schema_name}: {detail}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_schema(dir: &Path, profile: &str, name: &str, body: &str) {
        let profile_dir = dir.join(profile);
        fs::create_dir_all(&profile_dir).unwrap();
        fs::write(profile_dir.join(format!("{name}.json")), body).unwrap();
    }

    #[test]
    fn loads_and_validates_a_conforming_message() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(
            dir.path(),
            "isolated",
            "ingestion-trigger",
            r#"{"type":"object","required":["type","user"],"properties":{"type":{"const":"ingest"},"user":{"type":"string"}}}"#,
        );

        let validator = SchemaValidator::load(dir.path(), SchemaProfile::Isolated).unwrap();
        let msg = serde_json::json!({"type": "ingest", "user": "dummy"});
        assert!(validator.validate("ingestion-trigger", &msg).is_ok());
    }

    #[test]
    fn rejects_a_message_missing_a_required_field() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(
            dir.path(),
            "isolated",
            "ingestion-trigger",
            r#"{"type":"object","required":["type","user"],"properties":{"type":{"const":"ingest"},"user":{"type":"string"}}}"#,
        );

        let validator = SchemaValidator::load(dir.path(), SchemaProfile::Isolated).unwrap();
        let msg = serde_json::json!({"type": "ingest"});
        assert!(validator.validate("ingestion-trigger", &msg).is_err());
    }

    #[test]
    fn unknown_schema_name_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path(), "isolated", "ingestion-trigger", r#"{"type":"object"}"#);
        let validator = SchemaValidator::load(dir.path(), SchemaProfile::Isolated).unwrap();
        assert!(validator.validate("does-not-exist", &serde_json::json!({})).is_err());
    }
}
