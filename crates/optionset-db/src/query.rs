// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! In-process evaluation of FetchXML against stored records.

use anyhow::{Context, Result, bail};
use optionset_app::{Element, QueryDocument, RawRecord};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operator {
    Eq,
    Ne,
    Like,
    NotLike,
    BeginsWith,
    EndsWith,
    Null,
    NotNull,
    In,
    NotIn,
}

impl Operator {
    fn parse(raw: &str) -> Result<Self> {
        Ok(match raw {
            "eq" => Self::Eq,
            "ne" | "neq" => Self::Ne,
            "like" => Self::Like,
            "not-like" => Self::NotLike,
            "begins-with" => Self::BeginsWith,
            "ends-with" => Self::EndsWith,
            "null" => Self::Null,
            "not-null" => Self::NotNull,
            "in" => Self::In,
            "not-in" => Self::NotIn,
            other => bail!("unsupported condition operator `{other}`"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Condition {
    attribute: String,
    operator: Operator,
    values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Condition(Condition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OrderBy {
    attribute: String,
    descending: bool,
}

/// A FetchXML document compiled into something records can be run through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    entity: String,
    predicate: Predicate,
    orders: Vec<OrderBy>,
    limit: Option<usize>,
    projection: Option<Vec<String>>,
}

impl CompiledQuery {
    pub fn compile(doc: &QueryDocument) -> Result<Self> {
        let entity = doc.entity();
        for link in entity.child_elements_named("link-entity") {
            tracing::warn!(
                name = link.attribute("name").unwrap_or_default(),
                "link-entity is not evaluated locally; ignoring"
            );
        }

        let predicate = Predicate::All(
            entity
                .child_elements_named("filter")
                .map(compile_filter)
                .collect::<Result<Vec<_>>>()?,
        );

        let orders = entity
            .child_elements_named("order")
            .filter_map(|order| {
                Some(OrderBy {
                    attribute: order.attribute("attribute")?.to_owned(),
                    descending: order.attribute("descending") == Some("true"),
                })
            })
            .collect();

        let fetch = doc.fetch();
        let limit = match fetch.attribute("top").or_else(|| fetch.attribute("count")) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<usize>()
                    .with_context(|| format!("invalid row limit `{raw}` on fetch"))?,
            ),
            None => None,
        };

        let projection = if entity.child_elements_named("all-attributes").next().is_some() {
            None
        } else {
            let attributes = doc
                .projected_attributes()
                .into_iter()
                .map(str::to_owned)
                .collect::<Vec<_>>();
            (!attributes.is_empty()).then_some(attributes)
        };

        Ok(Self {
            entity: doc.entity_name().to_owned(),
            predicate,
            orders,
            limit,
            projection,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Filters, orders, limits and projects `records`. The primary id
    /// attribute always survives projection.
    pub fn run(&self, records: Vec<RawRecord>, primary_id: &str) -> Vec<RawRecord> {
        let mut matched = records
            .into_iter()
            .filter(|record| self.predicate.matches(record))
            .collect::<Vec<_>>();

        if !self.orders.is_empty() {
            matched.sort_by(|left, right| {
                self.orders
                    .iter()
                    .map(|order| {
                        let ordering =
                            compare_values(left.text(&order.attribute), right.text(&order.attribute));
                        if order.descending {
                            ordering.reverse()
                        } else {
                            ordering
                        }
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
        }

        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }

        match &self.projection {
            None => matched,
            Some(attributes) => matched
                .into_iter()
                .map(|record| {
                    record
                        .attributes()
                        .filter(|(name, _)| {
                            *name == primary_id
                                || attributes.iter().any(|wanted| wanted.as_str() == *name)
                        })
                        .map(|(name, value)| (name.to_owned(), value.clone()))
                        .collect()
                })
                .collect(),
        }
    }
}

fn compile_filter(filter: &Element) -> Result<Predicate> {
    let mut parts = Vec::new();
    for child in filter.child_elements() {
        match child.name() {
            "condition" => parts.push(Predicate::Condition(compile_condition(child)?)),
            "filter" => parts.push(compile_filter(child)?),
            other => tracing::debug!(element = other, "ignoring element inside filter"),
        }
    }
    match filter.attribute("type").unwrap_or("and") {
        "and" => Ok(Predicate::All(parts)),
        "or" => Ok(Predicate::Any(parts)),
        other => bail!("unsupported filter type `{other}`"),
    }
}

fn compile_condition(condition: &Element) -> Result<Condition> {
    let attribute = condition
        .attribute("attribute")
        .filter(|name| !name.is_empty())
        .context("condition is missing its attribute")?;
    let operator = Operator::parse(condition.attribute("operator").unwrap_or("eq"))?;

    let mut values = condition
        .child_elements_named("value")
        .map(Element::text)
        .collect::<Vec<_>>();
    if let Some(value) = condition.attribute("value") {
        values.insert(0, value.to_owned());
    }

    let needs_value = !matches!(operator, Operator::Null | Operator::NotNull);
    if needs_value && values.is_empty() {
        bail!("condition on `{attribute}` needs a value");
    }

    Ok(Condition {
        attribute: attribute.to_owned(),
        operator,
        values,
    })
}

impl Predicate {
    fn matches(&self, record: &RawRecord) -> bool {
        match self {
            Self::All(parts) => parts.iter().all(|part| part.matches(record)),
            // An empty `or` filter places no restriction.
            Self::Any(parts) => parts.is_empty() || parts.iter().any(|part| part.matches(record)),
            Self::Condition(condition) => condition.matches(record),
        }
    }
}

impl Condition {
    fn matches(&self, record: &RawRecord) -> bool {
        let actual = record
            .text(&self.attribute)
            .filter(|text| !text.is_empty())
            .map(|text| text.to_lowercase());
        let expected = self
            .values
            .iter()
            .map(|value| value.to_lowercase())
            .collect::<Vec<_>>();
        let first = expected.first().map(String::as_str).unwrap_or_default();

        match (&self.operator, actual.as_deref()) {
            (Operator::Null, actual) => actual.is_none(),
            (Operator::NotNull, actual) => actual.is_some(),
            (Operator::Ne, None) | (Operator::NotLike, None) | (Operator::NotIn, None) => true,
            (_, None) => false,
            (Operator::Eq, Some(actual)) => actual == first,
            (Operator::Ne, Some(actual)) => actual != first,
            (Operator::Like, Some(actual)) => like_matches(first, actual),
            (Operator::NotLike, Some(actual)) => !like_matches(first, actual),
            (Operator::BeginsWith, Some(actual)) => actual.starts_with(first),
            (Operator::EndsWith, Some(actual)) => actual.ends_with(first),
            (Operator::In, Some(actual)) => expected.iter().any(|value| value == actual),
            (Operator::NotIn, Some(actual)) => !expected.iter().any(|value| value == actual),
        }
    }
}

/// SQL `LIKE` with `%` and `_` wildcards.
fn like_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();
    let (mut p, mut t) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('_') => {
                p += 1;
                t += 1;
            }
            Some(ch) if *ch == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|ch| *ch == '%')
}

fn compare_values(left: Option<String>, right: Option<String>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(left), Some(right)) => match (left.parse::<f64>(), right.parse::<f64>()) {
            (Ok(left), Ok(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            _ => left.to_lowercase().cmp(&right.to_lowercase()),
        },
    }
}
