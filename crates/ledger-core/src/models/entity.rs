//! Ledger entity models
//!
//! Every syncable record is one variant of [`Entity`]. Domain fields are
//! optional so that incomplete local snapshots can still be queued and then
//! rejected by [`Entity::validate`] before they ever reach the network.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kind of versioned entity handled by the sync subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Supplier,
    Product,
    Rate,
    Collection,
    Payment,
}

impl EntityType {
    pub const ALL: [Self; 5] = [
        Self::Supplier,
        Self::Product,
        Self::Rate,
        Self::Collection,
        Self::Payment,
    ];

    /// Singular name used in storage and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Supplier => "supplier",
            Self::Product => "product",
            Self::Rate => "rate",
            Self::Collection => "collection",
            Self::Payment => "payment",
        }
    }

    /// Plural path segment used by the HTTP API (`/v1/suppliers`).
    pub const fn collection_path(self) -> &'static str {
        match self {
            Self::Supplier => "suppliers",
            Self::Product => "products",
            Self::Rate => "rates",
            Self::Collection => "collections",
            Self::Payment => "payments",
        }
    }

    /// Resolve a plural API path segment.
    pub fn from_collection_path(segment: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|entity_type| entity_type.collection_path() == segment)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|entity_type| {
                entity_type.as_str() == normalized || entity_type.collection_path() == normalized
            })
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity type: {s}")))
    }
}

/// A unique identifier for an entity, using UUID v7 (time-sortable).
///
/// Ids are assigned on the client so that records created offline keep a
/// stable identity across the queue, the cache, and the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new unique entity ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// A supplier delivering produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

/// A product that can be collected and priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub name: Option<String>,
    pub code: Option<String>,
    pub base_unit: Option<String>,
    pub description: Option<String>,
}

/// A product rate valid from a given date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub product_id: Option<EntityId>,
    pub rate: Option<f64>,
    pub unit: Option<String>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

/// A quantity of product collected from a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub supplier_id: Option<EntityId>,
    pub product_id: Option<EntityId>,
    pub rate_id: Option<EntityId>,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub collection_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Kind of payment made to a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Advance,
    Partial,
    Full,
}

/// A payment made to a supplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub supplier_id: Option<EntityId>,
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub payment_type: Option<PaymentType>,
    pub payment_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// A versioned ledger record, one variant per entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", rename_all = "snake_case")]
pub enum Entity {
    Supplier(Supplier),
    Product(Product),
    Rate(Rate),
    Collection(Collection),
    Payment(Payment),
}

impl Entity {
    pub const fn entity_type(&self) -> EntityType {
        match self {
            Self::Supplier(_) => EntityType::Supplier,
            Self::Product(_) => EntityType::Product,
            Self::Rate(_) => EntityType::Rate,
            Self::Collection(_) => EntityType::Collection,
            Self::Payment(_) => EntityType::Payment,
        }
    }

    pub const fn id(&self) -> EntityId {
        match self {
            Self::Supplier(entity) => entity.id,
            Self::Product(entity) => entity.id,
            Self::Rate(entity) => entity.id,
            Self::Collection(entity) => entity.id,
            Self::Payment(entity) => entity.id,
        }
    }

    /// Last server version observed for this snapshot, if any.
    pub const fn version(&self) -> Option<i64> {
        match self {
            Self::Supplier(entity) => entity.version,
            Self::Product(entity) => entity.version,
            Self::Rate(entity) => entity.version,
            Self::Collection(entity) => entity.version,
            Self::Payment(entity) => entity.version,
        }
    }

    pub fn set_version(&mut self, version: Option<i64>) {
        let slot = match self {
            Self::Supplier(entity) => &mut entity.version,
            Self::Product(entity) => &mut entity.version,
            Self::Rate(entity) => &mut entity.version,
            Self::Collection(entity) => &mut entity.version,
            Self::Payment(entity) => &mut entity.version,
        };
        *slot = version;
    }

    /// Check the required fields for this entity type.
    ///
    /// Returns every problem found, e.g. `"Missing supplier_id"`.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut checks = FieldChecks::default();
        match self {
            Self::Supplier(supplier) => {
                checks.text("name", supplier.name.as_deref());
                checks.text("code", supplier.code.as_deref());
            }
            Self::Product(product) => {
                checks.text("name", product.name.as_deref());
                checks.text("base_unit", product.base_unit.as_deref());
            }
            Self::Rate(rate) => {
                checks.reference("product_id", rate.product_id.as_ref());
                checks.positive("rate", rate.rate);
                checks.text("unit", rate.unit.as_deref());
                checks.present("effective_from", rate.effective_from.as_ref());
            }
            Self::Collection(collection) => {
                checks.reference("supplier_id", collection.supplier_id.as_ref());
                checks.reference("product_id", collection.product_id.as_ref());
                checks.positive("quantity", collection.quantity);
            }
            Self::Payment(payment) => {
                checks.reference("supplier_id", payment.supplier_id.as_ref());
                checks.positive("amount", payment.amount);
                checks.present("type", payment.payment_type.as_ref());
            }
        }
        checks.finish()
    }

    /// Domain fields as a JSON object, without the `entity_type` tag.
    pub fn to_fields(&self) -> Result<Map<String, Value>> {
        let value = match self {
            Self::Supplier(entity) => serde_json::to_value(entity)?,
            Self::Product(entity) => serde_json::to_value(entity)?,
            Self::Rate(entity) => serde_json::to_value(entity)?,
            Self::Collection(entity) => serde_json::to_value(entity)?,
            Self::Payment(entity) => serde_json::to_value(entity)?,
        };
        match value {
            Value::Object(fields) => Ok(fields),
            other => Err(Error::InvalidInput(format!(
                "{} did not serialize to an object: {other}",
                self.entity_type()
            ))),
        }
    }

    /// Build an entity of the given type from an untagged JSON object.
    ///
    /// Unknown keys (server timestamps, audit metadata) are ignored.
    pub fn from_fields(entity_type: EntityType, value: Value) -> Result<Self> {
        Ok(match entity_type {
            EntityType::Supplier => Self::Supplier(serde_json::from_value(value)?),
            EntityType::Product => Self::Product(serde_json::from_value(value)?),
            EntityType::Rate => Self::Rate(serde_json::from_value(value)?),
            EntityType::Collection => Self::Collection(serde_json::from_value(value)?),
            EntityType::Payment => Self::Payment(serde_json::from_value(value)?),
        })
    }
}

#[derive(Default)]
struct FieldChecks {
    problems: Vec<String>,
}

impl FieldChecks {
    fn text(&mut self, field: &str, value: Option<&str>) {
        if value.map_or(true, |value| value.trim().is_empty()) {
            self.problems.push(format!("Missing {field}"));
        }
    }

    fn reference(&mut self, field: &str, value: Option<&EntityId>) {
        self.present(field, value);
    }

    fn present<T>(&mut self, field: &str, value: Option<&T>) {
        if value.is_none() {
            self.problems.push(format!("Missing {field}"));
        }
    }

    fn positive(&mut self, field: &str, value: Option<f64>) {
        match value {
            None => self.problems.push(format!("Missing {field}")),
            Some(value) if value.is_nan() || value <= 0.0 => {
                self.problems.push(format!("{field} must be greater than 0"));
            }
            Some(_) => {}
        }
    }

    fn finish(self) -> std::result::Result<(), Vec<String>> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(self.problems)
        }
    }
}
