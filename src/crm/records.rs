//! Salesforce record shapes and their typed projections.
//!
//! `Remote*` structs mirror the REST query JSON (PascalCase, relationship
//! objects nested, subqueries as nested query results). Each has exactly one
//! `From` conversion into the gateway's own shape; nothing outside this module
//! reads the remote structs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Body of `GET /services/data/{version}/query`
#[derive(Debug, Deserialize)]
pub struct QueryResponse<T> {
    #[serde(rename = "totalSize")]
    pub total_size: u64,
    pub done: bool,
    pub records: Vec<T>,
}

/// Relationship reference that only carries a name (`Owner.Name`, `Account.Name`)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteNameRef {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteOpportunity {
    pub id: String,
    pub name: String,
    pub stage_name: String,
    pub amount: Option<f64>,
    pub close_date: Option<NaiveDate>,
    pub probability: Option<f64>,
    #[serde(rename = "Type")]
    pub opportunity_type: Option<String>,
    pub lead_source: Option<String>,
    pub owner_id: Option<String>,
    pub owner: Option<RemoteNameRef>,
    pub account_id: Option<String>,
    pub account: Option<RemoteNameRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteAccount {
    pub id: Option<String>,
    pub name: Option<String>,
    pub industry: Option<String>,
    #[serde(rename = "Type")]
    pub account_type: Option<String>,
    pub billing_country: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteLineItem {
    pub id: String,
    pub name: Option<String>,
    pub product_code: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
}

/// Opportunity with its account, owner and `OpportunityLineItems` subquery
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteOpportunityDetail {
    pub id: String,
    pub name: String,
    pub stage_name: String,
    pub amount: Option<f64>,
    pub close_date: Option<NaiveDate>,
    pub probability: Option<f64>,
    #[serde(rename = "Type")]
    pub opportunity_type: Option<String>,
    pub lead_source: Option<String>,
    pub next_step: Option<String>,
    pub description: Option<String>,
    pub owner: Option<RemoteUser>,
    pub account: Option<RemoteAccount>,
    /// Null when the opportunity has no products
    pub opportunity_line_items: Option<QueryResponse<RemoteLineItem>>,
}

/// `SELECT Id FROM User`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteUserId {
    pub id: String,
}

/// Opportunity summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityRecord {
    pub id: String,
    pub name: String,
    pub stage: String,
    pub amount: Option<f64>,
    pub close_date: Option<NaiveDate>,
    pub probability: Option<f64>,
    #[serde(rename = "type")]
    pub opportunity_type: Option<String>,
    pub owner_id: Option<String>,
    /// Owner display name
    pub owner: Option<String>,
    pub account_id: Option<String>,
    /// Account display name
    pub account: Option<String>,
    pub lead_source: Option<String>,
}

impl From<RemoteOpportunity> for OpportunityRecord {
    fn from(remote: RemoteOpportunity) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            stage: remote.stage_name,
            amount: remote.amount,
            close_date: remote.close_date,
            probability: remote.probability,
            opportunity_type: remote.opportunity_type,
            owner_id: remote.owner_id,
            owner: remote.owner.and_then(|o| o.name),
            account_id: remote.account_id,
            account: remote.account.and_then(|a| a.name),
            lead_source: remote.lead_source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub industry: Option<String>,
    #[serde(rename = "type")]
    pub account_type: Option<String>,
    pub billing_country: Option<String>,
}

impl From<RemoteAccount> for AccountInfo {
    fn from(remote: RemoteAccount) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            industry: remote.industry,
            account_type: remote.account_type,
            billing_country: remote.billing_country,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnerInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<RemoteUser> for OwnerInfo {
    fn from(remote: RemoteUser) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            email: remote.email,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductLineItem {
    pub id: String,
    pub name: Option<String>,
    pub product_code: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
}

impl From<RemoteLineItem> for ProductLineItem {
    fn from(remote: RemoteLineItem) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            product_code: remote.product_code,
            quantity: remote.quantity,
            unit_price: remote.unit_price,
            total_price: remote.total_price,
        }
    }
}

/// Full opportunity view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpportunityDetail {
    pub id: String,
    pub name: String,
    pub stage: String,
    pub amount: Option<f64>,
    pub close_date: Option<NaiveDate>,
    pub probability: Option<f64>,
    #[serde(rename = "type")]
    pub opportunity_type: Option<String>,
    pub lead_source: Option<String>,
    pub next_step: Option<String>,
    pub description: Option<String>,
    pub account: Option<AccountInfo>,
    pub owner: Option<OwnerInfo>,
    pub line_items: Vec<ProductLineItem>,
}

impl From<RemoteOpportunityDetail> for OpportunityDetail {
    fn from(remote: RemoteOpportunityDetail) -> Self {
        let line_items = remote
            .opportunity_line_items
            .map(|items| items.records.into_iter().map(ProductLineItem::from).collect())
            .unwrap_or_default();

        Self {
            id: remote.id,
            name: remote.name,
            stage: remote.stage_name,
            amount: remote.amount,
            close_date: remote.close_date,
            probability: remote.probability,
            opportunity_type: remote.opportunity_type,
            lead_source: remote.lead_source,
            next_step: remote.next_step,
            description: remote.description,
            account: remote.account.map(AccountInfo::from),
            owner: remote.owner.map(OwnerInfo::from),
            line_items,
        }
    }
}
