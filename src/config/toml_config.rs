use crate::core::assignment::{
    AssignmentSettings, DEFAULT_NOTE_SUFFIX, DEFAULT_SCAN_TIME, DEFAULT_TX_POWER_DBM,
};
use crate::core::codec;
use crate::core::credentials::DEFAULT_SKEW_SECS;
use crate::core::polling::PollPolicy;
use crate::domain::model::ReaderConnection;
use crate::utils::error::{Result, RfidError};
use crate::utils::validation::{
    validate_hex, validate_non_empty_string, validate_positive_number, validate_range,
    validate_required_field, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub reader: ReaderConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: Option<u64>,
    pub token_skew_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub port: String,
    pub baud_index: u8,
    pub address: u8,
    pub tx_power_dbm: u8,
    pub scan_time: u8,
    /// 8 hex characters
    pub access_password: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            baud_index: 5,
            address: 0,
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            scan_time: DEFAULT_SCAN_TIME,
            access_password: "00000000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub presence_window_ms: u64,
    pub presence_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            poll_interval_ms: 150,
            presence_window_ms: 2000,
            presence_interval_ms: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub note_suffix: String,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            note_suffix: DEFAULT_NOTE_SUFFIX.to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(30))
    }

    pub fn token_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_skew_seconds.unwrap_or(DEFAULT_SKEW_SECS))
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(RfidError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RfidError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${RFID_CLIENT_SECRET})，未設定的保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RfidError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_url("api.base_url", &self.api.base_url)?;

        if let Some(timeout) = self.api.timeout_seconds {
            validate_positive_number("api.timeout_seconds", timeout, 1)?;
        }

        validate_non_empty_string("reader.port", &self.reader.port)?;
        validate_range("reader.tx_power_dbm", self.reader.tx_power_dbm, 0, 30)?;
        validate_hex("reader.access_password", &self.reader.access_password, 8)?;

        validate_positive_number("scan.timeout_ms", self.scan.timeout_ms, 1)?;
        validate_positive_number("scan.poll_interval_ms", self.scan.poll_interval_ms, 1)?;
        validate_positive_number("scan.presence_window_ms", self.scan.presence_window_ms, 1)?;
        validate_positive_number(
            "scan.presence_interval_ms",
            self.scan.presence_interval_ms,
            1,
        )?;

        Ok(())
    }

    /// 取得 client credentials，缺一不可
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let id = validate_required_field("auth.client_id", &self.auth.client_id)?;
        let secret = validate_required_field("auth.client_secret", &self.auth.client_secret)?;
        // 環境變數沒設定時 ${VAR} 會原樣留下
        for (field, value) in [("auth.client_id", id), ("auth.client_secret", secret)] {
            if value.starts_with("${") {
                return Err(RfidError::MissingConfigError {
                    field: field.to_string(),
                });
            }
        }
        Ok((id.as_str(), secret.as_str()))
    }

    pub fn reader_connection(&self) -> ReaderConnection {
        ReaderConnection {
            port: self.reader.port.clone(),
            baud_index: self.reader.baud_index,
            address: self.reader.address,
        }
    }

    pub fn access_password(&self) -> Result<[u8; 4]> {
        validate_hex("reader.access_password", &self.reader.access_password, 8)?;
        let bytes = codec::hex_to_bytes(&self.reader.access_password);
        let mut password = [0u8; 4];
        password.copy_from_slice(&bytes);
        Ok(password)
    }

    pub fn assignment_settings(&self) -> Result<AssignmentSettings> {
        Ok(AssignmentSettings {
            connection: self.reader_connection(),
            tx_power_dbm: self.reader.tx_power_dbm,
            scan_time: self.reader.scan_time,
            access_password: self.access_password()?,
            scan_policy: PollPolicy::from_millis(
                self.scan.poll_interval_ms,
                self.scan.timeout_ms,
            ),
            presence_policy: PollPolicy::from_millis(
                self.scan.presence_interval_ms,
                self.scan.presence_window_ms,
            ),
            note_suffix: self.assignment.note_suffix.clone(),
        })
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
