//! Galaxy Server - room booking REST backend.
//!
//! This crate provides the HTTP API of the Galaxy hotel application:
//! - Listing and fetching rooms
//! - Creating, reading, rescheduling and cancelling bookings
//! - Submitting and reading reviews
//! - Issuing the cookie-borne auth token
//!
//! # Architecture
//!
//! Every request is a single stateless transaction: the router hands it to a
//! handler, the handler validates its input and performs one operation against
//! the shared [`store::DocumentStore`], and the result (or an
//! [`error::ApiError`]) becomes the response.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod store;
pub mod types;
