use crate::utils::error::{Result, RfidError};
use serde::{Deserialize, Serialize};

/// One tag seen by an inventory round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHandle {
    pub epc_hex: String,
    pub epc_byte_len: usize,
    /// Printable preview of the EPC, empty when the bytes are not text.
    pub epc_ascii: String,
}

impl TagHandle {
    pub fn from_epc_hex(epc_hex: impl Into<String>) -> Self {
        let epc_hex = epc_hex.into();
        let epc_byte_len = epc_hex.len() / 2;
        Self {
            epc_hex,
            epc_byte_len,
            epc_ascii: String::new(),
        }
    }
}

/// Result of a single successful scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub epc_hex: String,
    pub tid_hex: Option<String>,
    pub plate: Option<String>,
    pub record_id: Option<String>,
}

/// Serial session parameters for the reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConnection {
    pub port: String,
    pub baud_index: u8,
    pub address: u8,
}

/// Optional reader features, queried once when a service is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderCapabilities {
    pub tid: bool,
}

/// Registry answer for a plate lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
    pub status: Option<bool>,
    pub message: Option<String>,
    pub st_numberplate: Option<String>,
    pub st_vehicle_mark_name: Option<String>,
    pub st_vehicle_model_name: Option<String>,
    pub in_file_id: Option<i64>,
    pub st_chasis_no: Option<String>,
    pub st_vehicle_color: Option<String>,
    pub st_tag_number: Option<String>,
    pub st_site_no: Option<String>,
    pub picture_thumbnail_url: Option<String>,
    pub picture_url: Option<String>,
}

impl RegistryRecord {
    /// Tag number the registry already holds for this plate, if any.
    pub fn existing_tag_number(&self) -> Option<&str> {
        self.st_tag_number
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    pub succeeded: bool,
    pub message: Option<String>,
}

impl AuthResult {
    pub fn ok() -> Self {
        Self {
            succeeded: true,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: Some(message.into()),
        }
    }

    /// 登入失敗轉成 transport 類錯誤，不是 registry 衝突
    pub fn into_result(self) -> Result<()> {
        if self.succeeded {
            return Ok(());
        }
        Err(RfidError::AuthFailed {
            message: self
                .message
                .unwrap_or_else(|| "Authentication failed.".to_string()),
        })
    }
}
