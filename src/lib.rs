//! Sampling Roster
//!
//! Shift scheduling and validation for vessel samplers: generates the line
//! turns that follow a vessel's office sampling shift, validates any proposed
//! shift against rest, weekly, day-restriction, cross-assignment and
//! pilot-on-board rules, and serves both over a small REST API.
//!
//! Validation reads a per-week snapshot from [`cache::ValidationCache`],
//! built once from the upstream collaborators behind
//! [`repository::ScheduleRepository`].

pub mod api;
pub mod cache;
pub mod calculator;
pub mod config;
pub mod context;
pub mod demo_data;
pub mod domain;
pub mod dto;
pub mod error;
pub mod repository;
pub mod time_window;
pub mod validation;
