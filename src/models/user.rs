use serde::{Deserialize, Serialize};

/// Employee record owned by the external auth/registration service. This
/// service only ever touches the `iban` field, and only after a completed
/// step-up challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "fullName", default)]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub iban: Option<String>,
}

/// Claims carried by the bearer token issued by the external auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}
