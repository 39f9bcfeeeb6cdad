//! Entity identities shared by the relation graph, the tracker and the caches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Record categories of the booking schema.
///
/// The set is closed; the live schema is checked against it once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    User,
    UserEmail,
    Image,
    Booking,
    FlightOffer,
    HotelOffer,
    Flight,
    Hotel,
    Airport,
    Airline,
    City,
    Country,
    LocalizedText,
    Review,
}

impl EntityType {
    pub const ALL: [EntityType; 14] = [
        EntityType::User,
        EntityType::UserEmail,
        EntityType::Image,
        EntityType::Booking,
        EntityType::FlightOffer,
        EntityType::HotelOffer,
        EntityType::Flight,
        EntityType::Hotel,
        EntityType::Airport,
        EntityType::Airline,
        EntityType::City,
        EntityType::Country,
        EntityType::LocalizedText,
        EntityType::Review,
    ];

    /// Model name as declared in the relational schema (also the table name).
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::User => "User",
            EntityType::UserEmail => "UserEmail",
            EntityType::Image => "Image",
            EntityType::Booking => "Booking",
            EntityType::FlightOffer => "FlightOffer",
            EntityType::HotelOffer => "HotelOffer",
            EntityType::Flight => "Flight",
            EntityType::Hotel => "Hotel",
            EntityType::Airport => "Airport",
            EntityType::Airline => "Airline",
            EntityType::City => "City",
            EntityType::Country => "Country",
            EntityType::LocalizedText => "LocalizedText",
            EntityType::Review => "Review",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value)
            .ok_or_else(|| DomainError::UnknownEntityType(value.to_string()))
    }
}

/// Primary key of a record, kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identity-only reference to a record. Never carries payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// Parses the `Type:id` form used on the command line.
impl FromStr for EntityRef {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (entity_type, id) = value
            .split_once(':')
            .ok_or_else(|| DomainError::malformed_ref(value, "expected `Type:id`"))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(DomainError::malformed_ref(value, "entity id is empty"));
        }
        Ok(Self::new(entity_type.trim().parse()?, id))
    }
}

/// An entity that may have been mutated, with its soft-delete flag as read at
/// resolution time. Create, update and delete are indistinguishable here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub entity: EntityRef,
    pub is_deleted: bool,
}
