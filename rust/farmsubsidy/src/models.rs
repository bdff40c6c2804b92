//! Typed records returned by the views.
//!
//! Backends disagree on how they encode enums, decimals and 64-bit counts in
//! JSON, so numeric fields accept either a number or its string form.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst, VecSkipError};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub pk: String,
    pub country: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub year: i32,
    pub recipient_id: String,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_fingerprint: Option<String>,
    #[serde(default)]
    pub recipient_address: Option<String>,
    pub recipient_country: String,
    #[serde(default)]
    pub recipient_url: Option<String>,
    #[serde(default)]
    pub scheme_id: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub scheme_code: Option<String>,
    #[serde(default)]
    pub scheme_description: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub amount_original: Option<f64>,
    #[serde(default)]
    pub currency_original: Option<String>,
}

/// Numeric aggregates shared by every grouped view.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Amounts {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub amount_sum: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub amount_avg: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub amount_max: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub amount_min: Option<f64>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientBase {
    pub id: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub total_payments: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}

/// Recipient names, addresses, countries and urls are always multi-valued.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub name: Vec<String>,
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub address: Vec<String>,
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub country: Vec<String>,
    #[serde_as(as = "VecSkipError<_>")]
    #[serde(default)]
    pub url: Vec<String>,
    #[serde_as(as = "Vec<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub total_payments: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientName {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub country: String,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scheme {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde_as(as = "Vec<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_payments: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_recipients: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub country: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde_as(as = "Vec<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_payments: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_recipients: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Year {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub year: i32,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_payments: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_recipients: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub location: Option<String>,
    #[serde_as(as = "Vec<PickFirst<(_, DisplayFromStr)>>")]
    #[serde(default)]
    pub years: Vec<i32>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_payments: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_recipients: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_payments: u64,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub total_recipients: u64,
    #[serde(flatten)]
    pub amounts: Amounts,
}
