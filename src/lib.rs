pub mod api;
pub mod auth;
pub mod bus;
pub mod config;
pub mod consumer;
pub mod controller;
pub mod domain;
pub mod engine;
pub mod error;
pub mod invalidation;
pub mod notification;
pub mod orchestrator;
pub mod repo;
pub mod telemetry;
