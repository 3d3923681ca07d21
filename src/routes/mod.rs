pub mod audit_routes;
pub mod fraud_routes;
pub mod otp_routes;
pub mod profile_routes;
