//! Label selector parsing and matching
//!
//! Supports the string form accepted by the Kubernetes API server for the
//! operators the operator needs: equality (`=`, `==`), inequality (`!=`),
//! integer comparisons (`<`, `>`), existence (`key`) and absence (`!key`).
//! Clauses are joined with commas and must all hold.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const MAX_NAME_LENGTH: usize = 63;
const MAX_PREFIX_LENGTH: usize = 253;

/// Comparison applied by a single requirement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    Exists,
    DoesNotExist,
}

/// One clause of a selector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    value: Option<String>,
}

impl Requirement {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Check the requirement against a label set
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let current = labels.get(&self.key);
        match self.operator {
            Operator::Exists => current.is_some(),
            Operator::DoesNotExist => current.is_none(),
            Operator::Equals => current.map(String::as_str) == self.value.as_deref(),
            Operator::NotEquals => current.map(String::as_str) != self.value.as_deref(),
            Operator::LessThan | Operator::GreaterThan => {
                let (Some(current), Some(bound)) = (current, self.value.as_deref()) else {
                    return false;
                };
                // Non-numeric label values never match an ordering requirement
                let (Ok(current), Ok(bound)) = (current.parse::<i64>(), bound.parse::<i64>())
                else {
                    return false;
                };
                if self.operator == Operator::LessThan {
                    current < bound
                } else {
                    current > bound
                }
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.value.as_deref().unwrap_or_default();
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, value),
            Operator::NotEquals => write!(f, "{}!={}", self.key, value),
            Operator::LessThan => write!(f, "{}<{}", self.key, value),
            Operator::GreaterThan => write!(f, "{}>{}", self.key, value),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A conjunction of label requirements
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Parse a selector string, e.g. `app=web,tier!=cache,rank<3`
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let requirements = input
            .split(',')
            .map(|clause| parse_requirement(clause).map_err(|reason| Error::invalid_selector(input, reason)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// An empty selector matches everything
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}

fn parse_requirement(clause: &str) -> std::result::Result<Requirement, String> {
    let clause = clause.trim();
    if clause.is_empty() {
        return Err("empty requirement".to_string());
    }

    if let Some(key) = clause.strip_prefix('!') {
        let key = key.trim();
        validate_key(key)?;
        return Ok(Requirement {
            key: key.to_string(),
            operator: Operator::DoesNotExist,
            value: None,
        });
    }

    let Some(position) = clause.find(['=', '!', '<', '>']) else {
        validate_key(clause)?;
        return Ok(Requirement {
            key: clause.to_string(),
            operator: Operator::Exists,
            value: None,
        });
    };

    let (key, rest) = clause.split_at(position);
    let (operator, value) = if let Some(value) = rest.strip_prefix("==") {
        (Operator::Equals, value)
    } else if let Some(value) = rest.strip_prefix("!=") {
        (Operator::NotEquals, value)
    } else if let Some(value) = rest.strip_prefix('=') {
        (Operator::Equals, value)
    } else if let Some(value) = rest.strip_prefix('<') {
        (Operator::LessThan, value)
    } else if let Some(value) = rest.strip_prefix('>') {
        (Operator::GreaterThan, value)
    } else {
        return Err(format!("unknown operator in '{clause}'"));
    };

    let key = key.trim();
    let value = value.trim();
    validate_key(key)?;
    match operator {
        Operator::LessThan | Operator::GreaterThan => {
            value
                .parse::<i64>()
                .map_err(|_| format!("'{value}' is not an integer for key '{key}'"))?;
        }
        _ => validate_value(value)?,
    }

    Ok(Requirement {
        key: key.to_string(),
        operator,
        value: Some(value.to_string()),
    })
}

/// Validate a qualified label key: `[prefix/]name`
fn validate_key(key: &str) -> std::result::Result<(), String> {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > MAX_PREFIX_LENGTH || !is_dns_subdomain(prefix) {
            return Err(format!("invalid key prefix '{prefix}'"));
        }
    }
    if name.is_empty() || name.len() > MAX_NAME_LENGTH || !is_label_token(name) {
        return Err(format!("invalid key '{key}'"));
    }
    Ok(())
}

/// Validate a label value; empty values are allowed
fn validate_value(value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Ok(());
    }
    if value.len() > MAX_NAME_LENGTH || !is_label_token(value) {
        return Err(format!("invalid value '{value}'"));
    }
    Ok(())
}

fn is_label_token(s: &str) -> bool {
    let bytes = s.as_bytes();
    let edge_ok = |b: &u8| b.is_ascii_alphanumeric();
    bytes.first().is_some_and(edge_ok)
        && bytes.last().is_some_and(edge_ok)
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_dns_subdomain(s: &str) -> bool {
    s.split('.').all(|segment| {
        let bytes = segment.as_bytes();
        let edge_ok = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        bytes.first().is_some_and(edge_ok)
            && bytes.last().is_some_and(edge_ok)
            && bytes
                .iter()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
    })
}
