//! Line oriented text format for cells and whole brains.
//!
//! Every line is a run of bare keywords followed by `KEY=VALUE` attributes separated by
//! whitespace, e.g. `ADD CELL ID=H3 TYPELABEL=AND BIAS=0.5 ...`. Blank lines and lines
//! starting with `#` carry nothing.

use crate::error::{EvoError, EvoResult};
use core::{fmt::Display, str::FromStr};

#[derive(Debug, Clone, PartialEq)]
pub struct Line<'a> {
    pub number: usize,
    pub keywords: Vec<&'a str>,
    attributes: Vec<(&'a str, &'a str)>,
}

impl<'a> Line<'a> {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.attributes.is_empty()
    }

    /// Whether the leading keywords match `words`, ignoring case
    pub fn starts_with(&self, words: &[&str]) -> bool {
        self.keywords.len() == words.len()
            && self
                .keywords
                .iter()
                .zip(words)
                .all(|(k, w)| k.eq_ignore_ascii_case(w))
    }

    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.attributes
            .iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(key).then_some(*v))
    }

    pub fn required(&self, key: &str) -> EvoResult<&'a str> {
        self.get(key)
            .ok_or_else(|| EvoError::template(self.number, format!("missing attribute {key}")))
    }

    pub fn parse<T: FromStr>(&self, key: &str) -> EvoResult<T>
    where
        T::Err: Display,
    {
        let raw = self.required(key)?;
        raw.parse()
            .map_err(|e| EvoError::template(self.number, format!("{key}={raw}: {e}")))
    }

    /// A comma separated attribute, empty entries dropped
    pub fn list(&self, key: &str) -> EvoResult<Vec<&'a str>> {
        Ok(self
            .required(key)?
            .split(',')
            .filter(|s| !s.is_empty())
            .collect())
    }
}

pub fn tokenize(number: usize, text: &str) -> Line<'_> {
    let text = text.trim();
    let mut line = Line {
        number,
        keywords: Vec::new(),
        attributes: Vec::new(),
    };
    if text.starts_with('#') {
        return line;
    }

    for token in text.split_whitespace() {
        match token.split_once('=') {
            Some((k, v)) => line.attributes.push((k, v)),
            None => line.keywords.push(token),
        }
    }
    line
}

/// Whether `name` survives a trip through the template format as an id or list entry
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == '=' || c == ',' || c == '#')
}
