//! Curated relation table.
//!
//! Only foreign keys whose target contributes to a cached rendering are listed.
//! Everything else in the schema is deliberately absent; the notable omissions
//! are recorded in [`EXCLUDED_RELATIONS`] so they stay reviewable.

use serde::Serialize;

use crate::domain::entities::EntityType;

/// A foreign key `owner.field -> target` retained for invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub owner: EntityType,
    pub field: &'static str,
    pub target: EntityType,
    /// Whether a change on `target` fans out to every `owner` row pointing at it.
    pub traverse_reverse: bool,
}

/// A schema foreign key that is intentionally not propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedRelation {
    pub owner: EntityType,
    pub field: &'static str,
    pub target: EntityType,
    pub reason: &'static str,
}

const fn rel(
    owner: EntityType,
    field: &'static str,
    target: EntityType,
    traverse_reverse: bool,
) -> Relation {
    Relation {
        owner,
        field,
        target,
        traverse_reverse,
    }
}

pub const TRAVEL_RELATIONS: &[Relation] = &[
    // Accounts
    rel(EntityType::UserEmail, "userId", EntityType::User, true),
    // Email change history; forms chains and cycles of the same type.
    rel(EntityType::UserEmail, "previousEmailId", EntityType::UserEmail, true),
    rel(EntityType::User, "avatarImageId", EntityType::Image, true),
    // Bookings
    rel(EntityType::Booking, "userId", EntityType::User, true),
    rel(EntityType::Booking, "flightOfferId", EntityType::FlightOffer, true),
    rel(EntityType::Booking, "hotelOfferId", EntityType::HotelOffer, true),
    // Flights
    rel(EntityType::FlightOffer, "departFlightId", EntityType::Flight, true),
    rel(EntityType::FlightOffer, "returnFlightId", EntityType::Flight, true),
    // Airline branding is rendered from its own entity-cache entry.
    rel(EntityType::Flight, "airlineId", EntityType::Airline, false),
    rel(EntityType::Flight, "departureAirportId", EntityType::Airport, true),
    rel(EntityType::Flight, "arrivalAirportId", EntityType::Airport, true),
    rel(EntityType::Airport, "cityId", EntityType::City, true),
    // Hotels
    rel(EntityType::HotelOffer, "hotelId", EntityType::Hotel, true),
    rel(EntityType::Hotel, "cityId", EntityType::City, true),
    rel(EntityType::Hotel, "coverImageId", EntityType::Image, true),
    rel(EntityType::Hotel, "descriptionTextId", EntityType::LocalizedText, true),
    // Places
    // Country names are read through the entity cache; a country edit must not
    // walk every city.
    rel(EntityType::City, "countryId", EntityType::Country, false),
    rel(EntityType::City, "imageId", EntityType::Image, true),
    rel(EntityType::City, "nameTextId", EntityType::LocalizedText, true),
];

pub const EXCLUDED_RELATIONS: &[ExcludedRelation] = &[
    ExcludedRelation {
        owner: EntityType::Review,
        field: "hotelId",
        target: EntityType::Hotel,
        reason: "review bodies are loaded client-side and never rendered into hotel pages",
    },
    ExcludedRelation {
        owner: EntityType::Review,
        field: "userId",
        target: EntityType::User,
        reason: "reviews are not shown on profiles",
    },
    ExcludedRelation {
        owner: EntityType::Image,
        field: "uploadedById",
        target: EntityType::User,
        reason: "upload audit column, not rendered",
    },
];
