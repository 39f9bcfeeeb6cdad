//! Rendered page types and the entity each one is keyed by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::entities::EntityType;
use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageType {
    HotelDetail,
    HotelOffer,
    FlightOffer,
    BookingConfirmation,
    CityLanding,
    AirportLanding,
    CountryLanding,
    UserProfile,
}

impl PageType {
    pub const ALL: [PageType; 8] = [
        PageType::HotelDetail,
        PageType::HotelOffer,
        PageType::FlightOffer,
        PageType::BookingConfirmation,
        PageType::CityLanding,
        PageType::AirportLanding,
        PageType::CountryLanding,
        PageType::UserProfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PageType::HotelDetail => "hotel-detail",
            PageType::HotelOffer => "hotel-offer",
            PageType::FlightOffer => "flight-offer",
            PageType::BookingConfirmation => "booking-confirmation",
            PageType::CityLanding => "city-landing",
            PageType::AirportLanding => "airport-landing",
            PageType::CountryLanding => "country-landing",
            PageType::UserProfile => "user-profile",
        }
    }

    /// The entity whose id keys this page.
    pub fn entity_type(self) -> EntityType {
        match self {
            PageType::HotelDetail => EntityType::Hotel,
            PageType::HotelOffer => EntityType::HotelOffer,
            PageType::FlightOffer => EntityType::FlightOffer,
            PageType::BookingConfirmation => EntityType::Booking,
            PageType::CityLanding => EntityType::City,
            PageType::AirportLanding => EntityType::Airport,
            PageType::CountryLanding => EntityType::Country,
            PageType::UserProfile => EntityType::User,
        }
    }

    /// Pages rendered directly from an entity. Types without a page of their
    /// own (images, texts, flights...) reach pages through the closure.
    pub fn for_entity(entity_type: EntityType) -> impl Iterator<Item = PageType> {
        PageType::ALL
            .into_iter()
            .filter(move |page| page.entity_type() == entity_type)
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        PageType::ALL
            .into_iter()
            .find(|page| page.as_str() == value)
            .ok_or_else(|| DomainError::UnknownPage(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_page_parses_from_its_name() {
        for page in PageType::ALL {
            assert_eq!(page.as_str().parse::<PageType>().expect("known page"), page);
        }
    }

    #[test]
    fn hotel_maps_to_detail_page_only() {
        let pages: Vec<_> = PageType::for_entity(EntityType::Hotel).collect();
        assert_eq!(pages, vec![PageType::HotelDetail]);
    }

    #[test]
    fn images_have_no_page_of_their_own() {
        assert_eq!(PageType::for_entity(EntityType::Image).count(), 0);
    }
}
