use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A broadcast destination as configured by the operator.
///
/// Fields are read leniently: a stray value type never rejects the entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RestreamTarget {
    /// Label used in logs only.
    #[serde(deserialize_with = "label")]
    pub name: String,
    #[serde(deserialize_with = "truthy")]
    pub enabled: bool,
    #[serde(rename = "url", deserialize_with = "text")]
    pub destination_url: String,
    #[serde(rename = "key", deserialize_with = "optional_text")]
    pub access_key: Option<String>,
}

fn label<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(name) => name,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Admin forms store flags as `true`, `1`, `"on"` and the like.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

impl RestreamTarget {
    /// Final destination, or `None` if this target must not be relayed to.
    pub fn final_url(&self) -> Option<String> {
        if !self.enabled || self.destination_url.is_empty() {
            return None;
        }

        let key = self.access_key.as_deref().map(str::trim).unwrap_or("");
        if key.is_empty() {
            return Some(self.destination_url.clone());
        }

        let mut url = self.destination_url.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        url.push_str(key);
        Some(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub name: String,
    pub final_url: String,
}

/// Resolves the configured targets, in order, skipping the disabled and the
/// incomplete ones.
pub fn resolve(targets: &[RestreamTarget]) -> Vec<ResolvedTarget> {
    targets
        .iter()
        .filter_map(|target| {
            target.final_url().map(|final_url| ResolvedTarget {
                name: target.name.clone(),
                final_url,
            })
        })
        .collect()
}
