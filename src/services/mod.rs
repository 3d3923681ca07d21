pub mod audit_consumer;
pub mod challenge;
pub mod event_bus;
pub mod fraud_consumer;
pub mod fraud_service;
pub mod otp_service;
pub mod profile_service;
pub mod sweeper;
