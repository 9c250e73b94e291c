//! Per-participant agent coordinating round phases of a shared table without a central
//! scheduler. Exposes the derived round state to a UI over HTTP and Server-Sent Events.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
