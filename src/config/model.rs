// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// Top-level job configuration as read from a JSON file.
///
/// ```json
/// {
///     "variables": { "db": "prod" },
///     "steps": {
///         "010_extract": {
///             "type": "os",
///             "task": "extract.sh $db",
///             "name": "Extract nightly feed",
///             "dependencies": []
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Job-level variables, merged over the built-in defaults.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// All steps, keyed by step key.
    #[serde(deserialize_with = "steps_map")]
    pub steps: BTreeMap<String, StepConfig>,
}

/// Step execution type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Shell command handed to the host shell.
    Os,
    /// Built-in task (`send_mail`, `sleep`).
    Internal,
}

/// Declared dependencies: a list of step keys or the `"ALL"` sentinel.
///
/// The sentinel value is checked during resolution; any string other
/// than `"ALL"` is rejected there.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DepsConfig {
    Sentinel(String),
    Keys(Vec<String>),
}

/// One step record from the `steps` object.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    #[serde(rename = "type")]
    pub kind: StepKind,

    /// Shell command line for `os` steps; the keyword `send_mail` or
    /// `sleep` for `internal` steps.
    pub task: String,

    /// Human-readable name used in logs and summaries. Defaults to the
    /// step key.
    #[serde(default)]
    pub name: String,

    /// `null`/absent means no dependencies.
    #[serde(default)]
    pub dependencies: Option<DepsConfig>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Exit codes counted as success for `os` steps.
    #[serde(
        default = "default_resultcodes",
        deserialize_with = "coerce_resultcodes"
    )]
    pub resultcode_allowed: Vec<i32>,

    /// Parameters for internal tasks (`mail_to`, `mail_from`,
    /// `mail_subject`, `mail_body` for `send_mail`; `seconds` for
    /// `sleep`).
    #[serde(default)]
    pub detail: BTreeMap<String, serde_json::Value>,

    /// Run this step without side effects even when the job is live.
    #[serde(default)]
    pub simulate: bool,

    /// Free-form note; carried but never interpreted.
    #[serde(default)]
    pub comment: Option<String>,
}

impl StepConfig {
    /// Declared dependency keys; empty for the ALL sentinel or no deps.
    pub fn dependency_keys(&self) -> &[String] {
        match &self.dependencies {
            Some(DepsConfig::Keys(keys)) => keys,
            _ => &[],
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_resultcodes() -> Vec<i32> {
    vec![0]
}

/// Accept integers or integer-valued strings and coerce to `i32`.
fn coerce_resultcodes<'de, D>(de: D) -> Result<Vec<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Int(i64),
        Text(String),
    }

    let raw = Vec::<Code>::deserialize(de)?;
    raw.into_iter()
        .map(|code| match code {
            Code::Int(n) => i32::try_from(n).map_err(serde::de::Error::custom),
            Code::Text(s) => s.trim().parse::<i32>().map_err(|_| {
                serde::de::Error::custom(format!(
                    "resultcode_allowed entry '{s}' is not an integer"
                ))
            }),
        })
        .collect()
}

/// Deserialize the `steps` object rejecting duplicate keys.
///
/// serde_json's map type silently keeps the last entry for a repeated
/// key; a repeated step key in a job file is always a mistake.
fn steps_map<'de, D>(de: D) -> Result<BTreeMap<String, StepConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StepsVisitor;

    impl<'de> serde::de::Visitor<'de> for StepsVisitor {
        type Value = BTreeMap<String, StepConfig>;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a map of step key to step record")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de>,
        {
            let mut steps = BTreeMap::new();
            while let Some((key, step)) = access.next_entry::<String, StepConfig>()? {
                if steps.insert(key.clone(), step).is_some() {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate step key: {key}"
                    )));
                }
            }
            Ok(steps)
        }
    }

    de.deserialize_map(StepsVisitor)
}
