//! Marquee - request throttling and animation lifecycle management
//!
//! This crate backs a marketing site with two independent, in-memory
//! components: a fixed-window rate limiter guarding the lead-capture form
//! endpoints, and an animation manager that owns every timer, frame
//! callback and observer a decorative component schedules, degrading or
//! shutting animation off when the client cannot keep up.

pub mod animation;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod web;
