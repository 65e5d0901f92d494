//! Opportunity queries and validation over an already-materialized session.
//!
//! This layer never touches the vault: it takes a [`Session`] from whichever
//! origin the caller used (vault-backed or header-supplied) and only talks to
//! the Salesforce REST API.

pub mod client;
pub mod records;
pub mod soql;
pub mod validation;

pub use client::CrmClient;
pub use records::{AccountInfo, OpportunityDetail, OpportunityRecord, OwnerInfo, ProductLineItem};
pub use soql::{RecordId, SearchFilters};
pub use validation::{ValidationResult, ValidationRules};

use crate::error::{GatewayError, Result};
use crate::session::Session;
use records::{RemoteOpportunity, RemoteOpportunityDetail, RemoteUserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Counted list of opportunity summaries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityList {
    /// Matches reported by Salesforce (may exceed `opportunities.len()`)
    pub count: u64,
    pub opportunities: Vec<OpportunityRecord>,
}

pub struct OpportunityService {
    client: Arc<CrmClient>,
    rules: ValidationRules,
}

impl OpportunityService {
    pub fn new(client: Arc<CrmClient>, rules: ValidationRules) -> Self {
        Self { client, rules }
    }

    /// Evaluate eligibility rules against the current remote state.
    pub async fn validate(&self, session: &Session, record_id: &str) -> Result<ValidationResult> {
        let id = opportunity_id(record_id)?;

        let response = self
            .client
            .query::<RemoteOpportunity>(session, &soql::validation_query(&id))
            .await
            .map_err(not_found_as_opportunity)?;

        let opportunity = response
            .records
            .into_iter()
            .next()
            .map(OpportunityRecord::from)
            .ok_or_else(|| GatewayError::NotFound("Opportunity".to_string()))?;

        let today = chrono::Utc::now().date_naive();
        let result = self.rules.evaluate(opportunity, today);

        debug!(
            opportunity_id = %id,
            valid = result.valid,
            violations = result.validation_messages.len(),
            "Opportunity validated"
        );

        Ok(result)
    }

    /// Opportunity with account, owner and product line items.
    pub async fn get_detail(&self, session: &Session, record_id: &str) -> Result<OpportunityDetail> {
        let id = opportunity_id(record_id)?;

        let response = self
            .client
            .query::<RemoteOpportunityDetail>(session, &soql::detail_query(&id))
            .await
            .map_err(not_found_as_opportunity)?;

        response
            .records
            .into_iter()
            .next()
            .map(OpportunityDetail::from)
            .ok_or_else(|| GatewayError::NotFound("Opportunity".to_string()))
    }

    /// Existence check; `Ok(None)` when there is no such opportunity.
    pub async fn find(&self, session: &Session, record_id: &str) -> Result<Option<OpportunityRecord>> {
        let Some(id) = RecordId::parse(record_id) else {
            return Ok(None);
        };

        match self
            .client
            .query::<RemoteOpportunity>(session, &soql::exists_query(&id))
            .await
        {
            Ok(response) => Ok(response.records.into_iter().next().map(OpportunityRecord::from)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Filtered search, newest close date first.
    pub async fn search(
        &self,
        session: &Session,
        filters: &SearchFilters,
        limit: u32,
    ) -> Result<OpportunityList> {
        let query = soql::search_query(filters, limit)?;
        let response = self
            .client
            .query::<RemoteOpportunity>(session, &query)
            .await?;

        Ok(OpportunityList {
            count: response.total_size,
            opportunities: response
                .records
                .into_iter()
                .map(OpportunityRecord::from)
                .collect(),
        })
    }

    /// Opportunities owned by `owner_id`, after confirming the user exists.
    pub async fn owned_by(&self, session: &Session, owner_id: &str, limit: u32) -> Result<OpportunityList> {
        let user_not_found = || GatewayError::NotFound("User".to_string());
        let owner = RecordId::parse(owner_id).ok_or_else(user_not_found)?;

        let users = self
            .client
            .query::<RemoteUserId>(session, &soql::user_exists_query(&owner))
            .await
            .map_err(|e| match e {
                GatewayError::NotFound(_) => user_not_found(),
                e => e,
            })?;
        if users.records.is_empty() {
            return Err(user_not_found());
        }

        let response = self
            .client
            .query::<RemoteOpportunity>(session, &soql::owned_by_query(&owner, limit))
            .await?;

        Ok(OpportunityList {
            count: response.total_size,
            opportunities: response
                .records
                .into_iter()
                .map(OpportunityRecord::from)
                .collect(),
        })
    }
}

/// Ill-shaped ids never reach Salesforce
fn opportunity_id(record_id: &str) -> Result<RecordId> {
    RecordId::parse(record_id).ok_or_else(|| GatewayError::NotFound("Opportunity".to_string()))
}

fn not_found_as_opportunity(e: GatewayError) -> GatewayError {
    match e {
        GatewayError::NotFound(_) => GatewayError::NotFound("Opportunity".to_string()),
        e => e,
    }
}
