//! Domain entities, value objects and the port traits the application layer
//! depends on. The run/payment state machines live here so every status
//! mutation flows through one authoritative transition function.

pub mod asset;
pub mod audit;
pub mod employee;
pub mod fees;
pub mod organization;
pub mod ports;
pub mod run;
