mod support;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use support::{MemoryStore, entity, tracker};
use tripwire::domain::entities::{EntityRef, EntityType};
use tripwire::tracker::{DependencyClosure, TrackerError, TrackerOptions};

fn entities(closure: &DependencyClosure) -> BTreeSet<EntityRef> {
    closure.entities().cloned().collect()
}

/// Lisbon with a live and a retired airport, one hotel and a review.
fn lisbon() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store.live(EntityType::Country, "pt", &[]);
    store.live(EntityType::City, "lis", &[("countryId", "pt")]);
    store.live(EntityType::Airport, "lis-a", &[("cityId", "lis")]);
    store.deleted(EntityType::Airport, "lis-old", &[("cityId", "lis")]);
    store.live(EntityType::Hotel, "h1", &[("cityId", "lis")]);
    store.live(EntityType::Review, "r1", &[("hotelId", "h1")]);
    store
}

#[tokio::test]
async fn airport_change_reaches_its_city() {
    let tracker = tracker(lisbon(), TrackerOptions::default());

    let closure = tracker
        .changed_entity_chain(&[entity(EntityType::Airport, "lis-a")], false)
        .await
        .expect("closure");

    assert!(closure.contains(&entity(EntityType::Airport, "lis-a")));
    assert!(closure.contains(&entity(EntityType::City, "lis")));
}

#[tokio::test]
async fn city_change_reaches_live_airports_only() {
    let tracker = tracker(lisbon(), TrackerOptions::default());
    let city = entity(EntityType::City, "lis");

    let closure = tracker
        .changed_entity_chain(std::slice::from_ref(&city), false)
        .await
        .expect("closure");

    assert!(closure.contains(&city));
    assert!(closure.contains(&entity(EntityType::Airport, "lis-a")));
    assert!(closure.contains(&entity(EntityType::Hotel, "h1")));
    assert!(!closure.contains(&entity(EntityType::Airport, "lis-old")));

    let with_deleted = tracker
        .changed_entity_chain(std::slice::from_ref(&city), true)
        .await
        .expect("closure");
    let retired = with_deleted
        .get(&entity(EntityType::Airport, "lis-old"))
        .expect("deleted airport present when requested");
    assert!(retired.is_deleted);
}

#[tokio::test]
async fn resolution_is_idempotent() {
    let tracker = tracker(lisbon(), TrackerOptions::default());
    let triggers = [entity(EntityType::City, "lis")];

    let first = tracker
        .changed_entity_chain(&triggers, false)
        .await
        .expect("first");
    let second = tracker
        .changed_entity_chain(&triggers, false)
        .await
        .expect("second");

    assert_eq!(first, second);
}

#[tokio::test]
async fn triggers_lead_the_closure() {
    let tracker = tracker(lisbon(), TrackerOptions::default());
    let trigger = entity(EntityType::Hotel, "h1");

    let closure = tracker
        .changed_entity_chain(std::slice::from_ref(&trigger), false)
        .await
        .expect("closure");

    let first = closure.iter().next().expect("non-empty closure");
    assert_eq!(first.entity, trigger);
    assert!(!first.is_deleted);
}

#[tokio::test]
async fn email_history_cycle_terminates() {
    let store = MemoryStore::new();
    store.live(EntityType::User, "u1", &[]);
    store.live(
        EntityType::UserEmail,
        "e1",
        &[("userId", "u1"), ("previousEmailId", "e2")],
    );
    store.live(
        EntityType::UserEmail,
        "e2",
        &[("userId", "u1"), ("previousEmailId", "e1")],
    );
    let tracker = tracker(store, TrackerOptions::default());

    let closure = tracker
        .changed_entity_chain(&[entity(EntityType::UserEmail, "e1")], false)
        .await
        .expect("closure");

    let expected: BTreeSet<EntityRef> = [
        entity(EntityType::UserEmail, "e1"),
        entity(EntityType::UserEmail, "e2"),
        entity(EntityType::User, "u1"),
    ]
    .into_iter()
    .collect();
    assert_eq!(entities(&closure), expected);
    assert_eq!(closure.len(), 3);
}

#[tokio::test]
async fn deleted_trigger_is_not_traversed() {
    let store = lisbon();
    store.set_deleted(&entity(EntityType::Hotel, "h1"), true);
    let tracker = tracker(store, TrackerOptions::default());
    let hotel = entity(EntityType::Hotel, "h1");

    let closure = tracker
        .changed_entity_chain(std::slice::from_ref(&hotel), false)
        .await
        .expect("closure");
    assert_eq!(closure.len(), 1);
    assert!(closure.get(&hotel).expect("trigger kept").is_deleted);

    let expanded = tracker
        .changed_entity_chain(std::slice::from_ref(&hotel), true)
        .await
        .expect("closure");
    assert!(expanded.contains(&entity(EntityType::City, "lis")));
}

#[tokio::test]
async fn missing_trigger_is_reported_as_deleted() {
    let tracker = tracker(lisbon(), TrackerOptions::default());
    let ghost = entity(EntityType::Hotel, "gone");

    let closure = tracker
        .changed_entity_chain(std::slice::from_ref(&ghost), false)
        .await
        .expect("closure");

    assert_eq!(closure.len(), 1);
    assert!(closure.get(&ghost).expect("ghost kept").is_deleted);
}

#[tokio::test]
async fn deleted_intermediate_still_propagates() {
    let store = lisbon();
    store.deleted(EntityType::HotelOffer, "ho1", &[("hotelId", "h1")]);
    store.live(EntityType::Booking, "b1", &[("hotelOfferId", "ho1")]);
    let tracker = tracker(store, TrackerOptions::default());

    let closure = tracker
        .changed_entity_chain(&[entity(EntityType::Booking, "b1")], false)
        .await
        .expect("closure");

    assert!(closure.contains(&entity(EntityType::Hotel, "h1")));
    assert!(!closure.contains(&entity(EntityType::HotelOffer, "ho1")));
}

#[tokio::test]
async fn batch_equals_union_of_single_closures() {
    let store = lisbon();
    store.live(EntityType::City, "opo", &[("countryId", "pt")]);
    store.live(EntityType::Airport, "opo-a", &[("cityId", "opo")]);
    let tracker = tracker(store, TrackerOptions::default());
    let lis = entity(EntityType::Airport, "lis-a");
    let opo = entity(EntityType::Airport, "opo-a");

    let batch = tracker
        .changed_entity_chain(&[lis.clone(), opo.clone()], false)
        .await
        .expect("batch");
    let mut union = entities(
        &tracker
            .changed_entity_chain(&[lis], false)
            .await
            .expect("lis"),
    );
    union.extend(entities(
        &tracker
            .changed_entity_chain(&[opo], false)
            .await
            .expect("opo"),
    ));

    assert_eq!(entities(&batch), union);
}

#[tokio::test]
async fn airline_change_does_not_fan_out_to_flights() {
    let store = MemoryStore::new();
    store.live(EntityType::Airline, "tp", &[]);
    store.live(EntityType::Flight, "tp1350", &[("airlineId", "tp")]);
    let tracker = tracker(store, TrackerOptions::default());

    let closure = tracker
        .changed_entity_chain(&[entity(EntityType::Airline, "tp")], false)
        .await
        .expect("closure");

    assert_eq!(closure.len(), 1);
    assert!(!closure.contains(&entity(EntityType::Flight, "tp1350")));
}

#[tokio::test]
async fn reviews_are_not_part_of_hotel_closures() {
    let tracker = tracker(lisbon(), TrackerOptions::default());

    let closure = tracker
        .changed_entity_chain(&[entity(EntityType::Hotel, "h1")], false)
        .await
        .expect("closure");

    assert!(!closure.contains(&entity(EntityType::Review, "r1")));
}

#[tokio::test]
async fn store_failure_yields_no_closure() {
    let store = lisbon();
    store.fail_lookups(true);
    let tracker = tracker(store, TrackerOptions::default());

    let err = tracker
        .changed_entity_chain(&[entity(EntityType::City, "lis")], false)
        .await
        .expect_err("store is down");

    assert!(matches!(err, TrackerError::Store { .. }));
}

#[tokio::test]
async fn slow_store_hits_the_deadline() {
    let store = lisbon();
    store.set_delay(Some(Duration::from_millis(200)));
    let tracker = tracker(store, TrackerOptions::default());

    let err = tracker
        .changed_entity_chain_within(
            &[entity(EntityType::City, "lis")],
            false,
            Duration::from_millis(20),
        )
        .await
        .expect_err("deadline");

    assert!(matches!(err, TrackerError::DeadlineExceeded { .. }));
}

#[tokio::test]
async fn curated_relations_validate_against_the_schema() {
    let store = MemoryStore::new();

    let graph = tripwire::graph::RelationGraph::introspect(
        store.as_ref(),
        tripwire::graph::TRAVEL_RELATIONS,
    )
    .await
    .expect("every curated relation exists");
    assert!(!graph.edges_from(EntityType::City).is_empty());

    store.fail_lookups(true);
    assert!(
        tripwire::graph::RelationGraph::introspect(
            store.as_ref(),
            tripwire::graph::TRAVEL_RELATIONS
        )
        .await
        .is_err()
    );
}
