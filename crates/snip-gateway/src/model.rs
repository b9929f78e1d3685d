use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ShortenRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    pub result: String,
}

#[derive(Debug, Serialize)]
pub struct BatchShortenResponse {
    pub correlation_id: String,
    pub short_url: String,
}

#[derive(Debug, Serialize)]
pub struct UserUrlResponse {
    pub short_url: String,
    pub original_url: String,
}
