//! Change-dependency tracking and cache invalidation for a server-rendered
//! travel-booking site.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod graph;
pub mod infra;
pub mod tracker;
