use crate::adapters::http::client::ApiClient;
use crate::domain::model::RegistryRecord;
use crate::domain::ports::RegistryApi;
use crate::utils::error::{Result, RfidError};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const LOOKUP_PATH: &str = "/v1/api/Mobile/files-per-garage-by-plate";
pub const ASSIGN_PATH: &str = "/v1/api/Mobile/file-rfid";
pub const DELIVER_PATH: &str = "/v1/api/Mobile/rfid-deliver";

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    plate: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequest<'a> {
    in_file_id: i64,
    st_rfid: &'a str,
    st_note: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AssignResponse {
    #[serde(alias = "Success")]
    success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeliverRequest<'a> {
    st_rfid: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeliverResponse {
    #[serde(alias = "Status")]
    status: bool,
    #[serde(alias = "Message")]
    message: Option<String>,
}

/// Registry endpoints, all called with the session bearer token.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    api: ApiClient,
}

impl HttpRegistry {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

fn status_line(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    format!("{} {}", status, reason)
}

#[async_trait]
impl RegistryApi for HttpRegistry {
    async fn lookup_by_plate(&self, plate: &str) -> Result<Option<RegistryRecord>> {
        tracing::info!("🔎 Looking up plate {}", plate);
        let record = self
            .api
            .post_json::<_, RegistryRecord>(LOOKUP_PATH, &LookupRequest { plate }, true)
            .await?;

        match &record {
            Some(r) => tracing::debug!(
                "Registry record for {}: file {:?}, tag {:?}",
                plate,
                r.in_file_id,
                r.st_tag_number
            ),
            None => tracing::info!("No registry record for {}", plate),
        }
        Ok(record)
    }

    async fn assign_tag(&self, record_id: &str, chip_id: &str, note: &str) -> Result<bool> {
        let in_file_id =
            record_id
                .trim()
                .parse::<i64>()
                .map_err(|_| RfidError::InvalidRecordId {
                    value: record_id.to_string(),
                })?;

        let request = AssignRequest {
            in_file_id,
            st_rfid: chip_id,
            st_note: note,
        };
        match self
            .api
            .post_json::<_, AssignResponse>(ASSIGN_PATH, &request, true)
            .await
        {
            Ok(response) => {
                let accepted = response.map(|r| r.success).unwrap_or(false);
                tracing::info!(
                    "Registry assignment of {} to file {}: {}",
                    chip_id,
                    in_file_id,
                    if accepted { "accepted" } else { "refused" }
                );
                Ok(accepted)
            }
            Err(RfidError::Api { status, message, .. }) => {
                tracing::warn!("⚠️ Registry refused assignment (HTTP {}): {}", status, message);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn deliver(&self, chip_id: &str) -> Result<(bool, Option<String>)> {
        let request = DeliverRequest { st_rfid: chip_id };
        match self
            .api
            .post_json::<_, DeliverResponse>(DELIVER_PATH, &request, true)
            .await
        {
            Ok(Some(response)) => Ok((response.status, response.message)),
            Ok(None) => Ok((false, None)),
            Err(RfidError::Api { status, .. }) => {
                tracing::warn!("⚠️ Registry refused delivery of {} (HTTP {})", chip_id, status);
                Ok((false, Some(status_line(status))))
            }
            Err(e) => Err(e),
        }
    }
}
