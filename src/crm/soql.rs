//! SOQL text construction.
//!
//! Every value interpolated into a query passes through this module: free
//! text is escaped, record ids are shape-checked into [`RecordId`], and
//! limits are clamped. Queries are single-line and deterministic for a given
//! input.

use crate::error::{GatewayError, Result};
use std::fmt;

pub const MAX_LIMIT: u32 = 100;
pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const DEFAULT_OWNED_LIMIT: u32 = 20;

const SUMMARY_FIELDS: &str =
    "Id, Name, StageName, Amount, CloseDate, Owner.Name, Account.Name, Probability";

const EXISTS_FIELDS: &str = "Id, Name, StageName, Amount, CloseDate, OwnerId, Owner.Name, \
     AccountId, Account.Name, Probability, Type, LeadSource";

const VALIDATION_FIELDS: &str = "Id, Name, StageName, Amount, CloseDate, AccountId, Account.Name";

const DETAIL_FIELDS: &str = "Id, Name, StageName, Amount, CloseDate, Probability, Type, \
     LeadSource, NextStep, Description, \
     Owner.Id, Owner.Name, Owner.Email, \
     Account.Id, Account.Name, Account.Industry, Account.Type, Account.BillingCountry, \
     (SELECT Id, Name, ProductCode, Quantity, UnitPrice, TotalPrice FROM OpportunityLineItems)";

const OWNED_FIELDS: &str =
    "Id, Name, StageName, Amount, CloseDate, Account.Name, Probability, Type";

/// A 15- or 18-character alphanumeric Salesforce id, safe to interpolate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId(String);

impl RecordId {
    /// `None` unless `value` is id-shaped
    pub fn parse(value: &str) -> Option<Self> {
        is_record_id(value).then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn is_record_id(value: &str) -> bool {
    matches!(value.len(), 15 | 18) && value.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Escape text for use inside a quoted SOQL string literal
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Escape text for a literal substring match inside `LIKE '%...%'`
pub fn escape_like(value: &str) -> String {
    escape_literal(value)
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Clamp a caller-supplied limit into `1..=MAX_LIMIT`
pub fn clamp_limit(limit: i64) -> u32 {
    limit.clamp(1, MAX_LIMIT as i64) as u32
}

/// Optional search filters, combined with AND
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Substring of the opportunity name
    pub name: Option<String>,
    /// Exact stage name
    pub stage: Option<String>,
    /// Exact owner user id
    pub owner_id: Option<String>,
}

impl SearchFilters {
    /// WHERE predicate, or `None` when no filter is set.
    ///
    /// Blank filters count as unset. A non-id-shaped `owner_id` is
    /// `InvalidFilter`.
    pub fn predicate(&self) -> Result<Option<String>> {
        let mut conditions = Vec::new();

        if let Some(name) = non_blank(&self.name) {
            conditions.push(format!("Name LIKE '%{}%'", escape_like(name)));
        }

        if let Some(stage) = non_blank(&self.stage) {
            conditions.push(format!("StageName = '{}'", escape_literal(stage)));
        }

        if let Some(owner_id) = non_blank(&self.owner_id) {
            let owner_id = RecordId::parse(owner_id).ok_or_else(|| {
                GatewayError::InvalidFilter(format!(
                    "owner_id '{}' is not a Salesforce record id",
                    owner_id
                ))
            })?;
            conditions.push(format!("OwnerId = '{}'", owner_id));
        }

        if conditions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(conditions.join(" AND ")))
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn exists_query(id: &RecordId) -> String {
    format!(
        "SELECT {} FROM Opportunity WHERE Id = '{}'",
        EXISTS_FIELDS, id
    )
}

pub fn validation_query(id: &RecordId) -> String {
    format!(
        "SELECT {} FROM Opportunity WHERE Id = '{}'",
        VALIDATION_FIELDS, id
    )
}

pub fn detail_query(id: &RecordId) -> String {
    format!(
        "SELECT {} FROM Opportunity WHERE Id = '{}'",
        DETAIL_FIELDS, id
    )
}

pub fn search_query(filters: &SearchFilters, limit: u32) -> Result<String> {
    let where_clause = match filters.predicate()? {
        Some(predicate) => format!(" WHERE {}", predicate),
        None => String::new(),
    };

    Ok(format!(
        "SELECT {} FROM Opportunity{} ORDER BY CloseDate DESC LIMIT {}",
        SUMMARY_FIELDS,
        where_clause,
        clamp_limit(limit as i64)
    ))
}

pub fn user_exists_query(id: &RecordId) -> String {
    format!("SELECT Id FROM User WHERE Id = '{}'", id)
}

pub fn owned_by_query(owner_id: &RecordId, limit: u32) -> String {
    format!(
        "SELECT {} FROM Opportunity WHERE OwnerId = '{}' ORDER BY CloseDate DESC LIMIT {}",
        OWNED_FIELDS,
        owner_id,
        clamp_limit(limit as i64)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_shape() {
        assert!(is_record_id("006xx000004TmiQ"));
        assert!(is_record_id("006xx000004TmiQAAS"));
        assert!(!is_record_id("006xx000004Tmi"));
        assert!(!is_record_id("006xx000004TmiQA"));
        assert!(!is_record_id("006xx000004Tmi'Q"));
        assert!(!is_record_id("' OR Id != '"));
        assert!(RecordId::parse("").is_none());
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("O'Brien"), "O\\'Brien");
        assert_eq!(escape_literal("back\\slash"), "back\\\\slash");
        // Backslash is escaped before the quote so \' cannot close the literal
        assert_eq!(escape_literal("\\'"), "\\\\\\'");
        assert_eq!(escape_literal("a\nb"), "a\\nb");
    }

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("O'Brien"), "O\\'Brien");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(10), 10);
        assert_eq!(clamp_limit(100), 100);
        assert_eq!(clamp_limit(5000), 100);
    }

    #[test]
    fn test_search_without_filters() {
        let query = search_query(&SearchFilters::default(), 10).unwrap();
        assert_eq!(
            query,
            "SELECT Id, Name, StageName, Amount, CloseDate, Owner.Name, Account.Name, Probability \
             FROM Opportunity ORDER BY CloseDate DESC LIMIT 10"
        );
    }

    #[test]
    fn test_search_blank_filters_ignored() {
        let filters = SearchFilters {
            name: Some("  ".to_string()),
            stage: Some(String::new()),
            owner_id: None,
        };
        assert_eq!(filters.predicate().unwrap(), None);
    }

    #[test]
    fn test_search_all_filters() {
        let filters = SearchFilters {
            name: Some("Acme's".to_string()),
            stage: Some("Closed Won".to_string()),
            owner_id: Some("005xx000001Sv6A".to_string()),
        };

        let query = search_query(&filters, 500).unwrap();
        assert_eq!(
            query,
            "SELECT Id, Name, StageName, Amount, CloseDate, Owner.Name, Account.Name, Probability \
             FROM Opportunity WHERE Name LIKE '%Acme\\'s%' AND StageName = 'Closed Won' \
             AND OwnerId = '005xx000001Sv6A' ORDER BY CloseDate DESC LIMIT 100"
        );
    }

    #[test]
    fn test_search_rejects_non_id_owner() {
        let filters = SearchFilters {
            owner_id: Some("005' OR Name != '".to_string()),
            ..SearchFilters::default()
        };

        let err = search_query(&filters, 10).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidFilter(_)));
    }

    #[test]
    fn test_id_queries() {
        let id = RecordId::parse("006xx000004TmiQ").unwrap();

        assert!(exists_query(&id).ends_with("FROM Opportunity WHERE Id = '006xx000004TmiQ'"));
        assert!(validation_query(&id).starts_with("SELECT Id, Name, StageName"));
        assert!(detail_query(&id).contains("FROM OpportunityLineItems)"));
        assert_eq!(
            user_exists_query(&id),
            "SELECT Id FROM User WHERE Id = '006xx000004TmiQ'"
        );
    }

    #[test]
    fn test_owned_by_query() {
        let owner = RecordId::parse("005xx000001Sv6A").unwrap();
        assert_eq!(
            owned_by_query(&owner, 20),
            "SELECT Id, Name, StageName, Amount, CloseDate, Account.Name, Probability, Type \
             FROM Opportunity WHERE OwnerId = '005xx000001Sv6A' ORDER BY CloseDate DESC LIMIT 20"
        );
    }
}
