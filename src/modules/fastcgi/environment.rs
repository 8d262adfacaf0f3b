//! FastCGI environment (the PARAMS stream)

use super::record::encode_name_value;
use bytes::BytesMut;
use std::collections::BTreeMap;

/// Protocol variables sent to the backend for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastCgiEnvironment {
    vars: BTreeMap<String, String>,
}

impl FastCgiEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, replacing any earlier value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Name-value pair encoding of every variable
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        for (name, value) in &self.vars {
            encode_name_value(&mut buf, name.as_bytes(), value.as_bytes());
        }
        buf
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FastCgiEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::new();
        for (k, v) in iter {
            env.insert(k, v);
        }
        env
    }
}
