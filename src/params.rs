use std::collections::BTreeMap;

use crate::error::{ExportError, Result};

/// How `search` and `where` combine when both are present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Conjunction {
    #[default]
    And,
    Or,
}

impl Conjunction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Sort on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    column: String,
    descending: bool,
}

impl Sort {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }

    fn encode(&self) -> String {
        format!("{}{}", if self.descending { '-' } else { '+' }, self.column)
    }
}

/// Validated filter/projection options for one export.
///
/// ```
/// use exportapi::{Conjunction, ExportParams, Sort};
///
/// let params = ExportParams::builder()
///     .select(["name", "year"])
///     .search("oak|maple")
///     .where_clause("year > 2010")
///     .conjunction(Conjunction::Or)
///     .sort(Sort::descending("year"))
///     .build()
///     .unwrap();
/// assert_eq!(params.encode()["select"], "name,year");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportParams {
    select: Vec<String>,
    search: Option<String>,
    where_clause: Option<String>,
    conjunction: Conjunction,
    sort: Option<Sort>,
}

impl ExportParams {
    pub fn builder() -> ExportParamsBuilder {
        ExportParamsBuilder::default()
    }

    /// Flat query mapping. Unset options never appear.
    pub fn encode(&self) -> BTreeMap<&'static str, String> {
        let mut out = BTreeMap::new();
        if !self.select.is_empty() {
            out.insert("select", self.select.join(","));
        }
        if let Some(search) = &self.search {
            out.insert("search", search.clone());
        }
        if let Some(clause) = &self.where_clause {
            out.insert("where", clause.clone());
        }
        // Only meaningful when both filters are present.
        if self.search.is_some() && self.where_clause.is_some() {
            out.insert("conjunction", self.conjunction.as_str().to_string());
        }
        if let Some(sort) = &self.sort {
            out.insert("sort", sort.encode());
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportParamsBuilder {
    select: Vec<String>,
    search: Option<String>,
    wheres: Vec<String>,
    conjunction: Conjunction,
    sort: Option<Sort>,
}

impl ExportParamsBuilder {
    /// Columns to project, in the order given.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Free-text or field-scoped search; `|` acts as OR.
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Numeric comparison filter. Only one is accepted by [`build`](Self::build).
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        self.wheres.push(clause.into());
        self
    }

    pub fn conjunction(mut self, conjunction: Conjunction) -> Self {
        self.conjunction = conjunction;
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn build(self) -> Result<ExportParams> {
        if self.wheres.len() > 1 {
            return Err(ExportError::validation(
                "only one filter clause per request is supported",
            ));
        }
        if self.select.iter().any(|c| c.trim().is_empty()) {
            return Err(ExportError::validation("select contains an empty column name"));
        }
        if let Some(sort) = &self.sort {
            if sort.column.trim().is_empty() {
                return Err(ExportError::validation("sort column must not be empty"));
            }
        }

        Ok(ExportParams {
            select: self.select,
            search: self.search,
            where_clause: self.wheres.into_iter().next(),
            conjunction: self.conjunction,
            sort: self.sort,
        })
    }
}
