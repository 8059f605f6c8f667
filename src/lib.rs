//! Windowgate - per-subject fixed-window rate limiting
//!
//! This crate throttles how often each subject (usually a user) may invoke an
//! expensive operation. Every subject gets a fixed window with a call quota;
//! records for idle subjects are reclaimed by a cleanup task the host starts
//! and stops explicitly.

pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
