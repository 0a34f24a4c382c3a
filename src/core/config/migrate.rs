// ─── Config Migrations ───
// Linear chain of pure document transforms, indexed by the version they
// upgrade from. A document without `configVersion` is version 1.

use serde_json::{json, Map, Value};

pub const LATEST_CONFIG_VERSION: u32 = 3;

type Document = Map<String, Value>;
type Migration = fn(Document) -> Document;

/// `(from_version, transform)`; each transform yields `from_version + 1`.
const MIGRATIONS: &[(u32, Migration)] = &[(1, v1_to_v2), (2, v2_to_v3)];

/// Version 1 → 2: modpack linkage.
fn v1_to_v2(mut doc: Document) -> Document {
    doc.entry("modpackSlug").or_insert(Value::Null);
    doc.entry("modpackVersion").or_insert(Value::Null);
    doc.insert("configVersion".into(), json!(2));
    doc
}

/// Version 2 → 3: java version and launch flags.
fn v2_to_v3(mut doc: Document) -> Document {
    doc.entry("javaVersion").or_insert(json!(21));
    doc.entry("extraFlags").or_insert(json!([]));
    doc.entry("extraArgs").or_insert(json!([]));
    doc.insert("configVersion".into(), json!(3));
    doc
}

/// Schema version a document declares.
pub fn document_version(doc: &Value) -> Result<u32, String> {
    let object = doc
        .as_object()
        .ok_or_else(|| "config document is not a JSON object".to_string())?;

    match object.get("configVersion") {
        None | Some(Value::Null) => Ok(1),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v >= 1)
            .ok_or_else(|| format!("invalid configVersion {value}")),
    }
}

/// Apply exactly one migration step.
///
/// Returns `Ok(None)` when the document is already at the latest version.
pub fn migrate_step(doc: Value) -> Result<Option<Value>, String> {
    let version = document_version(&doc)?;
    if version == LATEST_CONFIG_VERSION {
        return Ok(None);
    }
    if version > LATEST_CONFIG_VERSION {
        return Err(format!(
            "configVersion {version} is newer than this tool supports ({LATEST_CONFIG_VERSION})"
        ));
    }

    let (_, migration) = MIGRATIONS
        .iter()
        .find(|(from, _)| *from == version)
        .ok_or_else(|| format!("no migration from configVersion {version}"))?;

    let Value::Object(object) = doc else {
        return Err("config document is not a JSON object".into());
    };
    Ok(Some(Value::Object(migration(object))))
}

/// Run the whole chain in memory.
pub fn migrate_to_latest(mut doc: Value) -> Result<Value, String> {
    while let Some(next) = migrate_step(doc.clone())? {
        doc = next;
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    fn v1_document() -> Value {
        json!({
            "__README": "readme",
            "jarFile": "paper.jar",
            "profileName": "default",
            "ramMB": 4096
        })
    }

    #[test]
    fn chain_covers_every_version() {
        for version in 1..LATEST_CONFIG_VERSION {
            assert!(MIGRATIONS.iter().any(|(from, _)| *from == version));
        }
    }

    #[test]
    fn v1_document_reaches_latest_and_validates() {
        let migrated = migrate_to_latest(v1_document()).unwrap();
        assert_eq!(document_version(&migrated).unwrap(), LATEST_CONFIG_VERSION);

        let config: Config = serde_json::from_value(migrated).unwrap();
        config.validate().unwrap();
        assert_eq!(config.java_version, 21);
        assert_eq!(config.ram_mb, 4096);
        assert!(config.extra_flags.is_empty());
        assert!(config.modpack_slug.is_none());
    }

    #[test]
    fn every_historical_version_terminates_at_latest() {
        let v2 = migrate_step(v1_document()).unwrap().unwrap();
        assert_eq!(document_version(&v2).unwrap(), 2);

        let latest = migrate_to_latest(v2).unwrap();
        assert_eq!(document_version(&latest).unwrap(), LATEST_CONFIG_VERSION);
    }

    #[test]
    fn migrating_latest_is_a_noop() {
        let latest = migrate_to_latest(v1_document()).unwrap();
        assert_eq!(migrate_step(latest.clone()).unwrap(), None);
        assert_eq!(migrate_to_latest(latest.clone()).unwrap(), latest);
    }

    #[test]
    fn existing_fields_are_not_overwritten() {
        let mut doc = v1_document();
        doc["javaVersion"] = json!(17);
        doc["configVersion"] = json!(2);

        let latest = migrate_to_latest(doc).unwrap();
        assert_eq!(latest["javaVersion"], 17);
    }

    #[test]
    fn future_and_invalid_versions_are_rejected() {
        assert!(migrate_step(json!({"configVersion": 99})).is_err());
        assert!(migrate_step(json!({"configVersion": "two"})).is_err());
        assert!(migrate_step(json!([1, 2])).is_err());
    }
}
