//! Firestore REST value encoding for the user document.
//!
//! The REST API wraps every field in a typed value (`{"integerValue": "8"}`).
//! Only the synchronizer's own fields are encoded and decoded here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::FirestoreError;
use crate::domain::billing::{AccessStatus, PlanTier, SubscriptionDoc, UserDocument};

/// A typed Firestore value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    /// Firestore sends 64-bit integers as strings.
    IntegerValue(String),
    DoubleValue(f64),
    StringValue(String),
    TimestampValue(String),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

pub type Fields = BTreeMap<String, Value>;

/// Field paths written by a merge. Anything else on the document is left alone.
pub const USER_FIELD_PATHS: [&str; 9] = [
    "subscription.status",
    "subscription.plan",
    "subscription.quota",
    "subscription.used",
    "stripeCustomerId",
    "stripeSubscriptionId",
    "currentPeriodEnd",
    "cancelAtPeriodEnd",
    "subscriptionUpdatedAt",
];

fn string_or_null(s: Option<&str>) -> Value {
    s.map_or(Value::NullValue(()), |s| Value::StringValue(s.to_string()))
}

fn timestamp_or_null(t: Option<DateTime<Utc>>) -> Value {
    t.map_or(Value::NullValue(()), |t| Value::TimestampValue(t.to_rfc3339()))
}

/// Encodes the synchronizer's fields of a user document.
pub fn encode_user_document(doc: &UserDocument) -> Fields {
    let mut subscription = BTreeMap::new();
    subscription.insert(
        "status".to_string(),
        Value::StringValue(doc.subscription.status.as_str().to_string()),
    );
    subscription.insert(
        "plan".to_string(),
        string_or_null(doc.subscription.plan.map(|p| p.as_str())),
    );
    subscription.insert(
        "quota".to_string(),
        Value::IntegerValue(doc.subscription.quota.to_string()),
    );
    subscription.insert(
        "used".to_string(),
        Value::IntegerValue(doc.subscription.used.to_string()),
    );

    let mut fields = BTreeMap::new();
    fields.insert(
        "subscription".to_string(),
        Value::MapValue(MapValue {
            fields: subscription,
        }),
    );
    fields.insert(
        "stripeCustomerId".to_string(),
        string_or_null(doc.stripe_customer_id.as_deref()),
    );
    fields.insert(
        "stripeSubscriptionId".to_string(),
        string_or_null(doc.stripe_subscription_id.as_deref()),
    );
    fields.insert(
        "currentPeriodEnd".to_string(),
        timestamp_or_null(doc.current_period_end),
    );
    fields.insert(
        "cancelAtPeriodEnd".to_string(),
        Value::BooleanValue(doc.cancel_at_period_end),
    );
    fields.insert(
        "subscriptionUpdatedAt".to_string(),
        timestamp_or_null(doc.subscription_updated_at),
    );
    fields
}

fn get_string(fields: &Fields, name: &str) -> Result<Option<String>, FirestoreError> {
    match fields.get(name) {
        None | Some(Value::NullValue(())) => Ok(None),
        Some(Value::StringValue(s)) => Ok(Some(s.clone())),
        Some(other) => Err(FirestoreError::Decode(format!(
            "field '{}' is not a string: {:?}",
            name, other
        ))),
    }
}

fn get_int(fields: &Fields, name: &str) -> Result<i32, FirestoreError> {
    match fields.get(name) {
        None | Some(Value::NullValue(())) => Ok(0),
        Some(Value::IntegerValue(s)) => s
            .parse()
            .map_err(|_| FirestoreError::Decode(format!("field '{}' is not an i32: {}", name, s))),
        // Documents written by the web client may hold doubles
        Some(Value::DoubleValue(d)) => Ok(*d as i32),
        Some(other) => Err(FirestoreError::Decode(format!(
            "field '{}' is not an integer: {:?}",
            name, other
        ))),
    }
}

fn get_bool(fields: &Fields, name: &str) -> Result<bool, FirestoreError> {
    match fields.get(name) {
        None | Some(Value::NullValue(())) => Ok(false),
        Some(Value::BooleanValue(b)) => Ok(*b),
        Some(other) => Err(FirestoreError::Decode(format!(
            "field '{}' is not a boolean: {:?}",
            name, other
        ))),
    }
}

fn get_timestamp(fields: &Fields, name: &str) -> Result<Option<DateTime<Utc>>, FirestoreError> {
    match fields.get(name) {
        None | Some(Value::NullValue(())) => Ok(None),
        Some(Value::TimestampValue(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| FirestoreError::Decode(format!("field '{}': {}", name, e))),
        Some(other) => Err(FirestoreError::Decode(format!(
            "field '{}' is not a timestamp: {:?}",
            name, other
        ))),
    }
}

/// Decodes the synchronizer's fields. `None` if the document has no
/// `subscription` map yet.
pub fn decode_user_document(fields: &Fields) -> Result<Option<UserDocument>, FirestoreError> {
    let subscription = match fields.get("subscription") {
        Some(Value::MapValue(map)) => &map.fields,
        None | Some(Value::NullValue(())) => return Ok(None),
        Some(other) => {
            return Err(FirestoreError::Decode(format!(
                "field 'subscription' is not a map: {:?}",
                other
            )))
        }
    };

    let status = match get_string(subscription, "status")? {
        Some(s) => s
            .parse::<AccessStatus>()
            .map_err(|e| FirestoreError::Decode(e.to_string()))?,
        None => AccessStatus::default(),
    };
    let plan = match get_string(subscription, "plan")? {
        Some(p) => Some(
            PlanTier::parse(&p)
                .ok_or_else(|| FirestoreError::Decode(format!("unknown plan '{}'", p)))?,
        ),
        None => None,
    };

    Ok(Some(UserDocument {
        subscription: SubscriptionDoc {
            status,
            plan,
            quota: get_int(subscription, "quota")?,
            used: get_int(subscription, "used")?,
        },
        stripe_customer_id: get_string(fields, "stripeCustomerId")?,
        stripe_subscription_id: get_string(fields, "stripeSubscriptionId")?,
        current_period_end: get_timestamp(fields, "currentPeriodEnd")?,
        cancel_at_period_end: get_bool(fields, "cancelAtPeriodEnd")?,
        subscription_updated_at: get_timestamp(fields, "subscriptionUpdatedAt")?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn document() -> UserDocument {
        UserDocument {
            subscription: SubscriptionDoc {
                status: AccessStatus::Active,
                plan: Some(PlanTier::Enterprise),
                quota: 25,
                used: 4,
            },
            stripe_customer_id: Some("cus_1".to_string()),
            stripe_subscription_id: None,
            current_period_end: Some(Utc.timestamp_opt(1_706_745_600, 0).unwrap()),
            cancel_at_period_end: true,
            subscription_updated_at: Some(Utc.timestamp_opt(1_704_067_200, 0).unwrap()),
        }
    }

    #[test]
    fn integers_are_encoded_as_strings() {
        let fields = encode_user_document(&document());
        let json = serde_json::to_value(&fields).unwrap();

        assert_eq!(
            json["subscription"]["mapValue"]["fields"]["quota"],
            serde_json::json!({"integerValue": "25"})
        );
        assert_eq!(
            json["stripeSubscriptionId"],
            serde_json::json!({"nullValue": null})
        );
        assert_eq!(json["cancelAtPeriodEnd"], serde_json::json!({"booleanValue": true}));
    }

    #[test]
    fn decoded_document_matches_encoded() {
        let doc = document();
        let fields = encode_user_document(&doc);

        let decoded = decode_user_document(&fields).unwrap().unwrap();

        assert_eq!(decoded, doc);
    }

    #[test]
    fn document_without_subscription_decodes_to_none() {
        let mut fields = Fields::new();
        fields.insert(
            "displayName".to_string(),
            Value::StringValue("Ada".to_string()),
        );

        assert!(decode_user_document(&fields).unwrap().is_none());
    }

    #[test]
    fn double_quota_from_web_client_is_accepted() {
        let mut sub = Fields::new();
        sub.insert("status".to_string(), Value::StringValue("trial".to_string()));
        sub.insert("quota".to_string(), Value::DoubleValue(3.0));
        let mut fields = Fields::new();
        fields.insert(
            "subscription".to_string(),
            Value::MapValue(MapValue { fields: sub }),
        );

        let doc = decode_user_document(&fields).unwrap().unwrap();

        assert_eq!(doc.subscription.quota, 3);
        assert_eq!(doc.subscription.status, AccessStatus::Trial);
    }

    #[test]
    fn mask_covers_every_encoded_top_level_field() {
        let fields = encode_user_document(&document());
        for name in fields.keys() {
            assert!(
                USER_FIELD_PATHS.iter().any(|p| p == name || p.starts_with(&format!("{}.", name))),
                "{} is not in the update mask",
                name
            );
        }
    }
}
