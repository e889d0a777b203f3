use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Collection;

/// Record filter understood by the store. Dotted paths follow relation
/// fields, so `task.project.id` matches runs whose task belongs to a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    Eq { path: String, value: String },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            single => Filter::And(vec![single, other]),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq { path, value } => write!(f, "{path}={value:?}"),
            Filter::And(parts) => {
                for (idx, part) in parts.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" && ")?;
                    }
                    write!(f, "({part})")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Sort order in the backend's `-active,-created` notation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort(pub Vec<SortKey>);

impl Sort {
    pub fn parse(fields: &str) -> Self {
        let keys = fields
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.strip_prefix('-') {
                Some(field) => SortKey {
                    field: field.to_string(),
                    descending: true,
                },
                None => SortKey {
                    field: part.trim_start_matches('+').to_string(),
                    descending: false,
                },
            })
            .collect();
        Sort(keys)
    }
}

/// One page request against a collection. Pages are 1-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub collection: Collection,
    pub filter: Option<Filter>,
    pub sort: Sort,
    pub page: u32,
    pub per_page: u32,
    pub expand: Vec<String>,
}

impl ListQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filter: None,
            sort: Sort::default(),
            page: 1,
            per_page: 30,
            expand: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sort(mut self, fields: &str) -> Self {
        self.sort = Sort::parse(fields);
        self
    }

    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.max(1);
        self
    }

    /// Comma separated relation names, e.g. `"node,project"`.
    pub fn expand(mut self, relations: &str) -> Self {
        self.expand = parse_expand(relations);
        self
    }
}

pub fn parse_expand(relations: &str) -> Vec<String> {
    relations
        .split(',')
        .map(str::trim)
        .filter(|rel| !rel.is_empty())
        .map(str::to_string)
        .collect()
}
