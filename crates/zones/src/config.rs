use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use trialmap_anchors::sha256_hex;

/// Only rule-file layout understood by this build.
pub const RULES_SCHEMA_VERSION: u32 = 1;

/// Expected layout of a rule file, used to reject unknown keys with their full path.
#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Any scalar (or any value we do not descend into).
    Leaf,
    /// Object with a fixed set of keys.
    Object(&'static [(&'static str, Shape)]),
    /// Array whose items share one shape.
    ArrayOf(&'static Shape),
    /// Object with free-form keys (e.g. language codes) and uniform values.
    MapOf(&'static Shape),
}

/// Name and SHA-256 of the bytes a configuration object was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSource {
    pub name: String,
    pub digest: String,
}

impl ConfigSource {
    #[must_use]
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            digest: sha256_hex(bytes),
        }
    }
}

/// Parse JSON, falling back to TOML, into a JSON value.
pub fn parse_value(bytes: &[u8]) -> Result<serde_json::Value> {
    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            let utf8 = std::str::from_utf8(bytes).map_err(|err| anyhow!("{json_err}; {err}"))?;
            let toml_value: toml::Value = toml::from_str(utf8).map_err(|toml_err| {
                anyhow!("Rules are not valid JSON or TOML ({json_err}); TOML parse error: {toml_err}")
            })?;
            serde_json::to_value(toml_value)
                .map_err(|err| anyhow!("Failed to convert TOML rules to JSON: {err}"))
        }
    }
}

/// Collect every key that `shape` does not allow, as dotted paths.
pub fn unknown_keys(value: &serde_json::Value, shape: &Shape) -> Vec<String> {
    let mut unknown = Vec::new();
    collect_unknown(value, shape, "", &mut unknown);
    unknown
}

fn collect_unknown(value: &serde_json::Value, shape: &Shape, base: &str, out: &mut Vec<String>) {
    fn join(base: &str, key: &str) -> String {
        if base.is_empty() {
            key.to_string()
        } else {
            format!("{base}.{key}")
        }
    }

    match (shape, value) {
        (Shape::Object(allowed), serde_json::Value::Object(obj)) => {
            for (key, child) in obj {
                match allowed.iter().find(|(name, _)| name == key) {
                    Some((_, child_shape)) => {
                        collect_unknown(child, child_shape, &join(base, key), out);
                    }
                    None => out.push(join(base, key)),
                }
            }
        }
        (Shape::MapOf(inner), serde_json::Value::Object(obj)) => {
            for (key, child) in obj {
                collect_unknown(child, inner, &join(base, key), out);
            }
        }
        (Shape::ArrayOf(inner), serde_json::Value::Array(items)) => {
            for (idx, item) in items.iter().enumerate() {
                collect_unknown(item, inner, &format!("{base}[{idx}]"), out);
            }
        }
        _ => {}
    }
}

/// Parse rule bytes into `T`: JSON/TOML, unknown-key check, schema version check.
pub fn parse_rules<T: DeserializeOwned>(bytes: &[u8], shape: &Shape, what: &str) -> Result<T> {
    let value = parse_value(bytes)?;
    if !value.is_object() {
        return Err(anyhow!("{what} config must be an object"));
    }

    let unknown = unknown_keys(&value, shape);
    if !unknown.is_empty() {
        return Err(anyhow!(
            "{what} config has unknown fields: {}",
            unknown.join(", ")
        ));
    }

    match value.get("schema_version").and_then(serde_json::Value::as_u64) {
        Some(v) if v == u64::from(RULES_SCHEMA_VERSION) => {}
        Some(v) => {
            return Err(anyhow!(
                "{what}.schema_version {v} is not supported (expected {RULES_SCHEMA_VERSION})"
            ))
        }
        None => return Err(anyhow!("{what}.schema_version is required")),
    }

    serde_json::from_value(value).map_err(|err| anyhow!("{what} parse error: {err}"))
}
