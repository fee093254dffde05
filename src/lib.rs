//! CleanTabs - bookmark organizer
//!
//! Saved sites organized into categories and subcategories, revisit
//! reminders, and sign-in by password or magic link, served as a JSON API.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
