//! Sensor view of the latest bill.
//!
//! Maps raw bill table labels onto a fixed attribute set by substring
//! match and derives the numeric state from the billing amount. Values
//! persist across updates until a later record overwrites them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expiry::SessionState;
use crate::types::{AccountId, BillingRecord, PollResult};

pub const ATTRIBUTION: &str = "Powered by ShinHai Gas Data";
pub const UNIT_OF_MEASUREMENT: &str = "$";
pub const ICON: &str = "mdi:currency-twd";

/// Attributes exposed alongside the sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillAttribute {
    BillingDate,
    CurrentGasmeter,
    GasPayment,
    GasConsumption,
    CurrentStatus,
    BillingAmount,
    HttpsResult,
}

impl BillAttribute {
    pub const ALL: [BillAttribute; 7] = [
        Self::BillingDate,
        Self::CurrentGasmeter,
        Self::GasPayment,
        Self::GasConsumption,
        Self::CurrentStatus,
        Self::BillingAmount,
        Self::HttpsResult,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::BillingDate => "billing_date",
            Self::CurrentGasmeter => "current_gasmeter",
            Self::GasPayment => "gas_payment",
            Self::GasConsumption => "gas_consumption",
            Self::CurrentStatus => "current_status",
            Self::BillingAmount => "billing_amount",
            Self::HttpsResult => "https_result",
        }
    }
}

/// Label fragment → attribute. Checked in order for every label.
///
/// Billing date and payment share the 收費日 fragment, so both always carry
/// the same value.
const LABEL_RULES: &[(&str, BillAttribute)] = &[
    ("總金額", BillAttribute::BillingAmount),
    ("收費日", BillAttribute::BillingDate),
    ("累計度數", BillAttribute::CurrentGasmeter),
    ("收費日", BillAttribute::GasPayment),
    ("使用度", BillAttribute::GasConsumption),
    ("狀態", BillAttribute::CurrentStatus),
];

/// Keep only ASCII digits and the decimal point.
pub fn numeric_state(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

/// Read-only copy of the sensor handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub name: String,
    pub state: Option<String>,
    pub unit_of_measurement: &'static str,
    pub icon: &'static str,
    pub attribution: &'static str,
    pub session: SessionState,
    pub attributes: BTreeMap<&'static str, Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SensorSnapshot {
    pub fn attribute(&self, attr: BillAttribute) -> Option<&str> {
        self.attributes.get(attr.key()).and_then(|v| v.as_deref())
    }
}

/// Sticky sensor state for one account.
#[derive(Debug, Clone)]
pub struct BillingSensor {
    name: String,
    state: Option<String>,
    attributes: BTreeMap<BillAttribute, Option<String>>,
    session: SessionState,
    updated_at: Option<DateTime<Utc>>,
}

impl BillingSensor {
    pub fn new(account: &AccountId) -> Self {
        Self {
            name: format!("shinhai_gas_fee_{account}"),
            state: None,
            attributes: BillAttribute::ALL.iter().map(|a| (*a, None)).collect(),
            session: SessionState::Active,
            updated_at: None,
        }
    }

    /// Unique id; same as the name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn attribute(&self, attr: BillAttribute) -> Option<&str> {
        self.attributes.get(&attr).and_then(|v| v.as_deref())
    }

    /// Fold a record into the sensor. Later labels win over earlier ones.
    pub fn apply(&mut self, record: &BillingRecord, session: SessionState) {
        for (label, value) in &record.fields {
            for (fragment, attr) in LABEL_RULES {
                if !label.contains(fragment) {
                    continue;
                }
                if *attr == BillAttribute::BillingAmount {
                    self.state = Some(numeric_state(value));
                }
                self.attributes.insert(*attr, Some(value.clone()));
            }
        }

        self.attributes
            .insert(BillAttribute::HttpsResult, Some(record.result.label().into_owned()));
        if record.result == PollResult::Forbidden {
            self.state = None;
        }
        self.session = session;
        if record.fetched_at.is_some() {
            self.updated_at = record.fetched_at;
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            name: self.name.clone(),
            state: self.state.clone(),
            unit_of_measurement: UNIT_OF_MEASUREMENT,
            icon: ICON,
            attribution: ATTRIBUTION,
            session: self.session,
            attributes: self
                .attributes
                .iter()
                .map(|(attr, value)| (attr.key(), value.clone()))
                .collect(),
            updated_at: self.updated_at,
        }
    }
}
