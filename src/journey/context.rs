//! Per-iteration state threaded between the steps of one journey run.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type Variables = BTreeMap<String, String>;

/// Produces a fresh value for a journey variable at the start of every
/// iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableGenerator {
    /// Uniform choice from a fixed list.
    OneOf(Vec<serde_json::Value>),
    /// Uniform integer in `[min, max]`.
    Between(i64, i64),
    /// Current time, RFC 3339.
    Timestamp,
    Uuid,
}

impl VariableGenerator {
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidVariable {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match self {
            VariableGenerator::OneOf(values) if values.is_empty() => {
                Err(invalid("one_of needs at least one value"))
            }
            VariableGenerator::Between(min, max) if min > max => {
                Err(invalid("between needs min <= max"))
            }
            _ => Ok(()),
        }
    }

    pub fn generate(&self, rng: &mut StdRng) -> String {
        match self {
            VariableGenerator::OneOf(values) => {
                let value = &values[rng.random_range(0..values.len())];
                match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            }
            VariableGenerator::Between(min, max) => rng.random_range(*min..=*max).to_string(),
            VariableGenerator::Timestamp => chrono::Utc::now().to_rfc3339(),
            VariableGenerator::Uuid => uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Mutable state owned by one virtual user for one journey iteration.
pub struct IterationContext<'a> {
    pub vu: u64,
    pub iteration: u64,
    pub vars: Variables,
    /// Status of the last step that produced a response.
    pub previous_status: Option<u16>,
    pub rng: &'a mut StdRng,
}

impl<'a> IterationContext<'a> {
    pub fn new(vu: u64, iteration: u64, base: &Variables, rng: &'a mut StdRng) -> Self {
        let mut vars = base.clone();
        vars.insert("vu".to_string(), vu.to_string());
        vars.insert("iteration".to_string(), iteration.to_string());
        Self {
            vu,
            iteration,
            vars,
            previous_status: None,
            rng,
        }
    }

    /// Draw every generator once and store the results as variables.
    pub fn generate(&mut self, generators: &BTreeMap<String, VariableGenerator>) {
        for (name, generator) in generators {
            let value = generator.generate(self.rng);
            self.vars.insert(name.clone(), value);
        }
    }

    pub fn render(&self, template: &str) -> String {
        render(template, &self.vars)
    }

    pub fn render_json(&self, template: &serde_json::Value) -> serde_json::Value {
        render_json(template, &self.vars)
    }
}

/// Replace `${name}` placeholders. Unknown names are left verbatim.
pub fn render(template: &str, vars: &Variables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                tracing::debug!("Unknown template variable '{}'", name);
                out.push_str(&rest[start..start + 2 + end + 1]);
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Render every string inside a JSON template.
///
/// A string that is exactly one placeholder whose value parses as a JSON
/// number becomes that number, so `"quantity": "${qty}"` sends `2`, not `"2"`.
pub fn render_json(template: &serde_json::Value, vars: &Variables) -> serde_json::Value {
    use serde_json::Value;

    match template {
        Value::String(s) => {
            if let Some(name) = sole_placeholder(s) {
                if let Some(value) = vars.get(name) {
                    if let Ok(number) = value.parse::<serde_json::Number>() {
                        return Value::Number(number);
                    }
                }
            }
            Value::String(render(s, vars))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render_json(v, vars)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_json(v, vars)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sole_placeholder(s: &str) -> Option<&str> {
    let name = s.strip_prefix("${")?.strip_suffix('}')?;
    (!name.contains('}') && !name.contains("${")).then_some(name)
}
