use crate::core::codec;
use crate::core::polling::PollPolicy;
use crate::domain::model::{
    ReaderCapabilities, ReaderConnection, RegistryRecord, ScanResult,
};
use crate::domain::ports::{RegistryApi, RfidReader};
use crate::utils::error::{Result, RfidError};

pub const DEFAULT_TX_POWER_DBM: u8 = 15;
pub const DEFAULT_SCAN_TIME: u8 = 0x04;
pub const DEFAULT_NOTE_SUFFIX: &str = "plate assigned";

/// Reader tuning and timing used by [`AssignmentService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentSettings {
    pub connection: ReaderConnection,
    pub tx_power_dbm: u8,
    pub scan_time: u8,
    pub access_password: [u8; 4],
    pub scan_policy: PollPolicy,
    pub presence_policy: PollPolicy,
    /// Appended to the plate in the registry note.
    pub note_suffix: String,
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            connection: ReaderConnection {
                port: "COM3".to_string(),
                baud_index: 5,
                address: 0,
            },
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            scan_time: DEFAULT_SCAN_TIME,
            access_password: [0; 4],
            scan_policy: PollPolicy::scan(),
            presence_policy: PollPolicy::presence(),
            note_suffix: DEFAULT_NOTE_SUFFIX.to_string(),
        }
    }
}

/// Upper-cases and keeps ASCII letters and digits only.
pub fn normalize_plate(raw: &str) -> String {
    raw.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

/// Ties the reader, the codec and the registry into the assign/remove flows.
///
/// Operations that touch the cached registry record take `&mut self`, so a
/// single service instance never runs two of them at once.
pub struct AssignmentService<R: RfidReader, A: RegistryApi> {
    reader: R,
    registry: A,
    settings: AssignmentSettings,
    capabilities: ReaderCapabilities,
    last_record: Option<RegistryRecord>,
}

impl<R: RfidReader, A: RegistryApi> AssignmentService<R, A> {
    pub fn new(reader: R, registry: A, settings: AssignmentSettings) -> Self {
        let capabilities = reader.capabilities();
        Self {
            reader,
            registry,
            settings,
            capabilities,
            last_record: None,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn registry(&self) -> &A {
        &self.registry
    }

    pub fn settings(&self) -> &AssignmentSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.reader.is_connected()
    }

    /// Opens the reader and applies tuning; tuning failures only warn.
    pub async fn connect(&self) -> Result<()> {
        self.reader.connect(&self.settings.connection).await?;

        if let Err(e) = self.reader.set_tx_power_dbm(self.settings.tx_power_dbm).await {
            tracing::warn!("⚠️ Could not set transmit power: {}", e);
        }
        if let Err(e) = self.reader.set_scan_time(self.settings.scan_time).await {
            tracing::warn!("⚠️ Could not set scan time: {}", e);
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.reader.disconnect().await
    }

    pub async fn scan_once(&self) -> Result<ScanResult> {
        self.scan_with_policy(self.settings.scan_policy).await
    }

    /// Polls inventory until a tag shows up, then enriches it with TID and decoded identity.
    pub async fn scan_with_policy(&self, policy: PollPolicy) -> Result<ScanResult> {
        tracing::info!("📡 Scanning for a tag ({} ms)", policy.deadline.as_millis());
        let reader = &self.reader;
        let found = policy
            .run(move || async move {
                reader
                    .inventory_once()
                    .await
                    .map(|tags| tags.into_iter().next())
            })
            .await?;

        let Some(tag) = found else {
            tracing::info!("No tag answered within {} ms", policy.deadline.as_millis());
            return Err(RfidError::ScanTimeout {
                timeout_ms: policy.deadline.as_millis() as u64,
            });
        };

        let tid_hex = if self.capabilities.tid {
            match self.read_tid_hex(&tag.epc_hex).await {
                Ok(tid) => tid,
                Err(e) => {
                    tracing::warn!("⚠️ TID read failed for {}: {}", tag.epc_hex, e);
                    None
                }
            }
        } else {
            None
        };

        let (plate, record_id) = match codec::parse(&tag.epc_hex) {
            Ok(decoded) => (non_blank(decoded.plate), non_blank(decoded.record_id)),
            Err(e) => {
                tracing::debug!("EPC {} is not an identity payload: {}", tag.epc_hex, e);
                (None, None)
            }
        };

        tracing::info!("🏷️ Tag {} found", tag.epc_hex);
        Ok(ScanResult {
            epc_hex: tag.epc_hex,
            tid_hex,
            plate,
            record_id,
        })
    }

    async fn read_tid_hex(&self, epc_hex: &str) -> Result<Option<String>> {
        let tid = self.reader.read_tid(epc_hex).await?;
        Ok(tid.filter(|t| !t.is_empty()).map(|t| codec::to_hex(&t)))
    }

    /// A TID answer decides on its own; without one, the EPC must reappear in inventory.
    pub async fn verify_presence(&self, epc_hex: &str, tid_hex: Option<&str>) -> Result<bool> {
        let expected_tid = tid_hex.map(str::trim).filter(|t| !t.is_empty());
        if let (Some(expected), true) = (expected_tid, self.capabilities.tid) {
            if let Some(actual) = self.read_tid_hex(epc_hex).await? {
                let matched = actual.eq_ignore_ascii_case(expected);
                if !matched {
                    tracing::warn!("⚠️ TID mismatch: expected {}, read {}", expected, actual);
                }
                return Ok(matched);
            }
            tracing::debug!("No TID answer for {}, checking inventory", epc_hex);
        }

        let reader = &self.reader;
        let seen = self
            .settings
            .presence_policy
            .run(move || async move {
                reader.inventory_once().await.map(|tags| {
                    tags.iter()
                        .any(|t| t.epc_hex.eq_ignore_ascii_case(epc_hex))
                        .then_some(())
                })
            })
            .await?;
        Ok(seen.is_some())
    }

    /// Looks a plate up and replaces the cached record with the answer.
    pub async fn fetch_plate(&mut self, plate: &str) -> Result<Option<RegistryRecord>> {
        self.last_record = None;
        let record = self.registry.lookup_by_plate(plate).await?;
        self.last_record = record.clone();
        Ok(record)
    }

    pub fn last_record(&self) -> Option<&RegistryRecord> {
        self.last_record.as_ref()
    }

    async fn program(&self, epc_hex: &str, payload: &[u8]) -> Result<bool> {
        self.reader
            .write_epc(epc_hex, payload, self.settings.access_password)
            .await
    }

    /// Binds a blank tag to a registry record and writes the identity onto it.
    ///
    /// `Ok(false)` means the registry refused; nothing was written.
    pub async fn assign(
        &mut self,
        epc_hex: &str,
        tid_hex: &str,
        normalized_plate: &str,
        record_id: &str,
    ) -> Result<bool> {
        let payload = codec::build_identity(normalized_plate, record_id)?;

        if let Ok(existing) = codec::inspect(epc_hex) {
            if !existing.is_cleared() {
                return Err(RfidError::TagNotEmpty {
                    plate: or_dash(&existing.plate),
                    record_id: or_dash(&existing.record_id),
                });
            }
        }

        if let Some(tag_number) = self
            .last_record
            .as_ref()
            .and_then(RegistryRecord::existing_tag_number)
        {
            return Err(RfidError::RegistryHasTag {
                tag_number: tag_number.to_string(),
            });
        }

        if !self.verify_presence(epc_hex, Some(tid_hex)).await? {
            tracing::error!("❌ Tag {} is no longer in range", epc_hex);
            return Err(RfidError::TagUnreachable);
        }

        let note = format!("{} {}", normalized_plate, self.settings.note_suffix);
        if !self.registry.assign_tag(record_id, tid_hex, &note).await? {
            tracing::warn!("⚠️ Registry refused to bind {} to record {}", tid_hex, record_id);
            return Ok(false);
        }

        match self.program(epc_hex, &payload).await {
            Ok(true) => {
                tracing::info!(
                    "✅ Tag {} now carries {} / {}",
                    epc_hex,
                    normalized_plate,
                    record_id
                );
                Ok(true)
            }
            outcome => {
                if let Err(e) = &outcome {
                    tracing::error!("💥 Tag write error: {}", e);
                }
                tracing::error!(
                    "💥 Registry bound {} to record {} but EPC {} was not written",
                    tid_hex,
                    record_id,
                    epc_hex
                );
                Err(RfidError::PartialFailure {
                    message: format!(
                        "Registry assigned record {} but the tag could not be written.",
                        record_id
                    ),
                })
            }
        }
    }

    /// Releases the tag in the registry, then overwrites it with the cleared sentinel.
    pub async fn remove(&mut self, epc_hex: &str, tid_hex: Option<&str>) -> Result<String> {
        if let Ok(existing) = codec::inspect(epc_hex) {
            if existing.is_cleared() {
                return Err(RfidError::NothingToRemove);
            }
        }

        if !self.verify_presence(epc_hex, tid_hex).await? {
            tracing::error!("❌ Tag {} is no longer in range", epc_hex);
            return Err(RfidError::TagUnreachable);
        }

        let chip_id = tid_hex.unwrap_or_default();
        let (released, message) = self.registry.deliver(chip_id).await?;
        if !released {
            let message = message.unwrap_or_else(|| "Registry request failed.".to_string());
            tracing::warn!("⚠️ Registry refused release of {}: {}", chip_id, message);
            return Err(RfidError::RegistryRejected { message });
        }

        match self.program(epc_hex, &codec::cleared_payload()).await {
            Ok(true) => {}
            outcome => {
                if let Err(e) = &outcome {
                    tracing::error!("💥 Tag write error: {}", e);
                }
                tracing::error!(
                    "💥 Registry released {} but EPC {} still holds data",
                    chip_id,
                    epc_hex
                );
                return Err(RfidError::PartialFailure {
                    message: "Registry released the tag but it could not be cleared.".to_string(),
                });
            }
        }

        if let Some(record) = self.last_record.as_mut() {
            record.st_tag_number = None;
        }
        tracing::info!("🧹 Tag {} cleared", epc_hex);
        Ok(message.unwrap_or_else(|| "Tag removed.".to_string()))
    }
}
