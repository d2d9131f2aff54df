//! Parser module for extracting structured data from HTML
//!
//! Extraction is declarative: a `Ruleset` names the element that scopes one
//! record and a list of `FieldRule`s (where to look, how to read it, whether
//! the record is meaningless without it). The engine here evaluates rulesets
//! uniformly and never performs I/O; the site's rulesets and their mapping
//! into models live in [`site`].

pub mod site;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::error::ProviderError;

/// Where a field's element is found, relative to the record scope
#[derive(Debug, Clone, Copy)]
pub enum Locate {
    /// The scope element itself
    Scope,
    /// Descendants matching a CSS selector
    Css(&'static str),
    /// The first selector in the list that matches anything
    FirstOf(&'static [&'static str]),
    /// `inner` elements of the `row`s whose text contains `label`
    Labelled {
        row: &'static str,
        label: &'static str,
        inner: &'static str,
    },
}

/// How a located element becomes a value
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    /// Trimmed text content
    Text,
    /// Attribute value
    Attr(&'static str),
    /// Text parsed as an integer; absent when it does not parse
    Int,
    /// Attribute parsed as an integer; absent when it does not parse
    AttrInt(&'static str),
    /// Capture `group` of `pattern` over the text or the given attribute
    Regex {
        attr: Option<&'static str>,
        pattern: &'static str,
        group: usize,
    },
    /// Present when the element exists
    Marker,
}

/// One logical field of a record
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub locate: Locate,
    pub transform: Transform,
    pub required: bool,
    pub many: bool,
}

impl FieldRule {
    pub const fn new(name: &'static str, locate: Locate, transform: Transform) -> Self {
        Self {
            name,
            locate,
            transform,
            required: false,
            many: false,
        }
    }

    pub const fn text(name: &'static str, css: &'static str) -> Self {
        Self::new(name, Locate::Css(css), Transform::Text)
    }

    pub const fn attr(name: &'static str, css: &'static str, attr: &'static str) -> Self {
        Self::new(name, Locate::Css(css), Transform::Attr(attr))
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn many(mut self) -> Self {
        self.many = true;
        self
    }
}

/// A scope selector plus the fields read from each match
#[derive(Debug, Clone, Copy)]
pub struct Ruleset {
    pub name: &'static str,
    pub scope: &'static str,
    pub fields: &'static [FieldRule],
}

/// Values read for one scope match
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: HashMap<&'static str, Vec<String>>,
}

impl Record {
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn owned(&self, name: &str) -> Option<String> {
        self.first(name).map(str::to_string)
    }

    pub fn all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.first(name).and_then(|v| v.parse().ok())
    }

    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// A record dropped because a required field is missing
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{ruleset} record skipped: missing {field}")]
pub struct RecordSkipped {
    pub ruleset: &'static str,
    pub field: &'static str,
}

/// Parse a CSS selector, `None` (with a warning) if it is invalid
pub fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(selector) => Some(selector),
        Err(e) => {
            warn!("Invalid selector {:?}: {:?}", css, e);
            None
        }
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn locate<'a>(scope: ElementRef<'a>, locate: &Locate) -> Vec<ElementRef<'a>> {
    match locate {
        Locate::Scope => vec![scope],
        Locate::Css(css) => match selector(css) {
            Some(sel) => scope.select(&sel).collect(),
            None => Vec::new(),
        },
        Locate::FirstOf(candidates) => candidates
            .iter()
            .filter_map(|css| selector(css))
            .map(|sel| scope.select(&sel).collect::<Vec<_>>())
            .find(|found| !found.is_empty())
            .unwrap_or_default(),
        Locate::Labelled { row, label, inner } => {
            let (Some(row_sel), Some(inner_sel)) = (selector(row), selector(inner)) else {
                return Vec::new();
            };
            scope
                .select(&row_sel)
                .filter(|r| r.text().collect::<String>().contains(label))
                .flat_map(|r| r.select(&inner_sel).collect::<Vec<_>>())
                .collect()
        }
    }
}

fn transform(element: ElementRef<'_>, transform: &Transform) -> Option<String> {
    let value = match transform {
        Transform::Text => element_text(element),
        Transform::Attr(attr) => element.value().attr(attr)?.trim().to_string(),
        Transform::Int => element_text(element).parse::<i64>().ok()?.to_string(),
        Transform::AttrInt(attr) => element
            .value()
            .attr(attr)?
            .trim()
            .parse::<i64>()
            .ok()?
            .to_string(),
        Transform::Regex {
            attr,
            pattern,
            group,
        } => {
            let haystack = match attr {
                Some(attr) => element.value().attr(attr)?.to_string(),
                None => element.text().collect::<String>(),
            };
            let re = Regex::new(pattern).ok()?;
            re.captures(&haystack)?.get(*group)?.as_str().to_string()
        }
        Transform::Marker => return Some(String::new()),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Evaluate every field of `ruleset` against one scope element
fn evaluate(scope: ElementRef<'_>, ruleset: &Ruleset) -> Result<Record, RecordSkipped> {
    let mut record = Record::default();

    for rule in ruleset.fields {
        let elements = locate(scope, &rule.locate);
        let mut values: Vec<String> = elements
            .into_iter()
            .filter_map(|el| transform(el, &rule.transform))
            .collect();

        if !rule.many {
            values.truncate(1);
        }

        if values.is_empty() {
            if rule.required {
                return Err(RecordSkipped {
                    ruleset: ruleset.name,
                    field: rule.name,
                });
            }
            continue;
        }

        record.values.insert(rule.name, values);
    }

    Ok(record)
}

/// Records (or skip reasons) for every scope match, in document order
pub fn extract_records(document: &Html, ruleset: &Ruleset) -> Vec<Result<Record, RecordSkipped>> {
    let Some(scope) = selector(ruleset.scope) else {
        return Vec::new();
    };
    document
        .select(&scope)
        .map(|element| evaluate(element, ruleset))
        .collect()
}

/// Records for every scope match; rows missing a required field are dropped
pub fn extract(document: &Html, ruleset: &Ruleset) -> Vec<Record> {
    extract_records(document, ruleset)
        .into_iter()
        .filter_map(|record| match record {
            Ok(record) => Some(record),
            Err(skipped) => {
                debug!("{}", skipped);
                None
            }
        })
        .collect()
}

/// The single page-level record; any missing required field is fatal
pub fn extract_page(
    document: &Html,
    ruleset: &Ruleset,
    url: &str,
) -> Result<Record, ProviderError> {
    let scope = selector(ruleset.scope)
        .and_then(|sel| document.select(&sel).next())
        .ok_or_else(|| ProviderError::extraction_failed(ruleset.scope, url))?;

    evaluate(scope, ruleset).map_err(|skipped| {
        warn!("{} at {}", skipped, url);
        ProviderError::extraction_failed(skipped.field, url)
    })
}

/// Make a site link absolute against `base`
pub fn fix_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    if let Some(rest) = href.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}
