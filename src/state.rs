use std::sync::Arc;

use mongodb::Database;

use crate::config::AppConfig;
use crate::services::event_bus::EventSink;
use crate::services::fraud_service::FraudAlertService;
use crate::services::otp_service::OtpService;
use crate::services::profile_service::ProfileService;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub otp_service: Arc<OtpService>,
    pub profile_service: Arc<ProfileService>,
    pub fraud_service: Arc<FraudAlertService>,
    pub events: Arc<dyn EventSink>,
}
