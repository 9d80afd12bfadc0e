use serde::{Deserialize, Serialize};

pub mod clients;
pub mod legacy;
pub mod portal;

#[derive(Serialize, Deserialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

#[get("/health")]
pub fn api_health() -> &'static str {
    "OK"
}
