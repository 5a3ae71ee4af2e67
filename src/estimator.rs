//! Parameter introspection for estimators and their components.
//!
//! Mirrors the scikit-learn convention: `get_params` returns a flat, sorted
//! map of parameter names, and nested components expose their own parameters
//! as `component__param`. `set_params` routes nested keys to the component.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GlmError, Result};

/// A dynamically typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Parse a CLI-style value: JSON scalars first, bare strings otherwise.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<ParamValue>(raw) {
            Ok(value) => value,
            Err(_) => ParamValue::Str(raw.to_string()),
        }
    }

    pub fn as_f64(&self, name: &str) -> Result<f64> {
        match self {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(GlmError::invalid_value(name, format!("expected a number, got {other}"))),
        }
    }

    pub fn as_opt_f64(&self, name: &str) -> Result<Option<f64>> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_f64(name).map(Some),
        }
    }

    pub fn as_usize(&self, name: &str) -> Result<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
            other => Err(GlmError::invalid_value(
                name,
                format!("expected a non-negative integer, got {other}"),
            )),
        }
    }

    pub fn as_opt_usize(&self, name: &str) -> Result<Option<usize>> {
        match self {
            ParamValue::Null => Ok(None),
            other => other.as_usize(name).map(Some),
        }
    }

    pub fn as_bool(&self, name: &str) -> Result<bool> {
        match self {
            ParamValue::Bool(v) => Ok(*v),
            other => Err(GlmError::invalid_value(name, format!("expected a boolean, got {other}"))),
        }
    }

    pub fn as_str(&self, name: &str) -> Result<&str> {
        match self {
            ParamValue::Str(v) => Ok(v),
            other => Err(GlmError::invalid_value(name, format!("expected a string, got {other}"))),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => write!(f, "null"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

pub type ParamMap = BTreeMap<String, ParamValue>;

/// Parameter access shared by estimators and their nested components.
pub trait Params {
    /// Own parameters, without any nested `component__param` entries.
    fn own_params(&self) -> ParamMap;

    /// Parameters of a nested component, if `name` is one.
    fn component_params(&self, _name: &str) -> Option<ParamMap> {
        None
    }

    /// Set a single, non-nested parameter.
    fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()>;

    /// Forward nested parameters to the component called `component`.
    fn set_component_params(&mut self, component: &str, _params: Vec<(String, ParamValue)>) -> Result<()> {
        Err(GlmError::InvalidParameter {
            name: component.to_string(),
            valid: self.own_params().into_keys().collect(),
        })
    }

    fn get_params(&self, deep: bool) -> ParamMap {
        let own = self.own_params();
        let mut out = ParamMap::new();
        for (key, value) in own {
            if deep {
                if let Some(nested) = self.component_params(&key) {
                    out.extend(nested.into_iter().map(|(k, v)| (format!("{key}__{k}"), v)));
                }
            }
            out.insert(key, value);
        }
        out
    }

    /// Set several parameters; keys of the form `component__param` are
    /// grouped per component and forwarded after all plain keys are applied.
    fn set_params<I, K>(&mut self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        let mut nested: BTreeMap<String, Vec<(String, ParamValue)>> = BTreeMap::new();
        for (key, value) in params {
            let key = key.as_ref();
            let (head, sub) = match key.split_once("__") {
                Some((head, sub)) => (head, Some(sub)),
                None => (key, None),
            };
            let valid = self.own_params();
            if !valid.contains_key(head) {
                return Err(GlmError::InvalidParameter {
                    name: head.to_string(),
                    valid: valid.into_keys().collect(),
                });
            }
            match sub {
                Some(sub) => nested
                    .entry(head.to_string())
                    .or_default()
                    .push((sub.to_string(), value)),
                None => self.set_param(head, value)?,
            }
        }
        for (component, sub_params) in nested {
            self.set_component_params(&component, sub_params)?;
        }
        Ok(())
    }
}

/// Build the error for an unknown parameter name.
pub(crate) fn unknown_param<P: Params + ?Sized>(owner: &P, name: &str) -> GlmError {
    GlmError::InvalidParameter {
        name: name.to_string(),
        valid: owner.own_params().into_keys().collect(),
    }
}

/// Apply each `(name, value)` pair to `target` through `set_param`.
pub(crate) fn apply_all<P: Params + ?Sized>(target: &mut P, params: Vec<(String, ParamValue)>) -> Result<()> {
    for (name, value) in params {
        if name.contains("__") {
            return Err(unknown_param(target, &name));
        }
        target.set_param(&name, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_values() {
        assert_eq!(ParamValue::parse("0.5"), ParamValue::Float(0.5));
        assert_eq!(ParamValue::parse("12"), ParamValue::Int(12));
        assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse("null"), ParamValue::Null);
        assert_eq!(ParamValue::parse("lasso"), ParamValue::Str("lasso".into()));
        assert_eq!(ParamValue::parse("\"ridge\""), ParamValue::Str("ridge".into()));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(ParamValue::Int(3).as_f64("x").unwrap(), 3.0);
        assert!(ParamValue::Float(3.0).as_usize("x").is_err());
        assert!(ParamValue::Int(-1).as_usize("x").is_err());
        assert_eq!(ParamValue::Null.as_opt_usize("x").unwrap(), None);
    }
}
