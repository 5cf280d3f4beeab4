use crate::core::codec;
use crate::domain::model::{ReaderCapabilities, ReaderConnection, TagHandle};
use crate::domain::ports::RfidReader;
use crate::utils::error::{Result, RfidError};
use crate::utils::validation::validate_range;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const MEM_EPC: u8 = 1;
pub const MEM_TID: u8 = 2;
/// EPC data starts after the CRC and PC words.
pub const EPC_WORD_PTR: u8 = 2;
pub const TID_WORDS: u8 = 4;
pub const MAX_TX_POWER_DBM: u8 = 30;

const INVENTORY_BUFFER_LEN: usize = 8192;

/// Outcome of one vendor inventory call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventoryRound {
    pub rc: i32,
    pub total_len: usize,
    pub card_count: usize,
}

/// Blocking vendor SDK surface, one method per native call.
///
/// Return codes are the SDK's own: `0` or `1` means success for everything
/// except inventory, where only `1` (round finished) counts.
pub trait ReaderDriver: Send + 'static {
    fn open(&mut self, port: &str, baud_index: u8, address: u8) -> i32;
    fn close(&mut self) -> i32;

    /// Fills `buffer` with `len, epc[len]` records.
    fn inventory(&mut self, buffer: &mut [u8]) -> InventoryRound;
    fn fast_inventory(&mut self, buffer: &mut [u8]) -> InventoryRound;

    fn read_data(
        &mut self,
        epc: &[u8],
        mem: u8,
        word_ptr: u8,
        word_count: u8,
        password: [u8; 4],
        out: &mut [u8],
    ) -> i32;

    fn write_epc(&mut self, password: [u8; 4], epc: &[u8]) -> i32;

    /// `data.len()` is always even.
    fn ext_write_data(
        &mut self,
        epc: &[u8],
        mem: u8,
        word_ptr: [u8; 2],
        data: &[u8],
        password: [u8; 4],
    ) -> i32;

    fn block_write(
        &mut self,
        epc: &[u8],
        mem: u8,
        word_ptr: u8,
        data: &[u8],
        password: [u8; 4],
    ) -> i32;

    fn set_rf_power(&mut self, dbm: u8) -> i32;
    fn set_scan_time(&mut self, code: u8) -> i32;

    fn supports_tid(&self) -> bool {
        true
    }
}

fn rc_ok(rc: i32) -> bool {
    rc == 0 || rc == 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStrategy {
    EpcWrite,
    ExtendedWrite,
    BlockWrite,
}

impl WriteStrategy {
    const ALL: [WriteStrategy; 3] = [Self::EpcWrite, Self::ExtendedWrite, Self::BlockWrite];

    fn name(self) -> &'static str {
        match self {
            Self::EpcWrite => "WriteEPC_G2",
            Self::ExtendedWrite => "ExtWriteData_G2",
            Self::BlockWrite => "BlockWrite_G2",
        }
    }

    fn apply<D: ReaderDriver>(
        self,
        driver: &mut D,
        selected: &[u8],
        payload: &[u8],
        password: [u8; 4],
    ) -> i32 {
        match self {
            Self::EpcWrite => driver.write_epc(password, payload),
            Self::ExtendedWrite => {
                driver.ext_write_data(selected, MEM_EPC, [0x00, EPC_WORD_PTR], payload, password)
            }
            Self::BlockWrite => {
                driver.block_write(selected, MEM_EPC, EPC_WORD_PTR, payload, password)
            }
        }
    }
}

/// Parses `len, epc[len], ...` records, deduplicated and sorted by EPC.
pub fn parse_inventory(buffer: &[u8], total_len: usize) -> Vec<TagHandle> {
    let end = total_len.min(buffer.len());
    let mut tags = BTreeMap::new();
    let mut idx = 0;

    while idx < end {
        let len = usize::from(buffer[idx]);
        let next = idx + 1 + len;
        if len == 0 || next > end {
            break;
        }

        let epc = &buffer[idx + 1..next];
        let epc_hex = codec::to_hex(epc);
        tags.entry(epc_hex.clone()).or_insert_with(|| TagHandle {
            epc_ascii: ascii_preview(&epc_hex, epc),
            epc_hex,
            epc_byte_len: len,
        });
        idx = next;
    }

    tags.into_values().collect()
}

fn ascii_preview(epc_hex: &str, epc: &[u8]) -> String {
    if let Ok(decoded) = codec::parse(epc_hex) {
        if !decoded.plate.is_empty() {
            return decoded.plate;
        }
    }
    let text: Vec<u8> = epc.iter().copied().take_while(|&b| b != 0).collect();
    if !text.is_empty() && text.iter().all(|b| (0x20..=0x7E).contains(b)) {
        text.into_iter().map(char::from).collect()
    } else {
        String::new()
    }
}

/// [`RfidReader`] over a vendor driver.
///
/// Driver calls block, so each one runs on the blocking pool behind a mutex.
pub struct DriverReader<D: ReaderDriver> {
    driver: Arc<Mutex<D>>,
    connected: AtomicBool,
    supports_tid: bool,
}

impl<D: ReaderDriver> DriverReader<D> {
    pub fn new(driver: D) -> Self {
        let supports_tid = driver.supports_tid();
        Self {
            driver: Arc::new(Mutex::new(driver)),
            connected: AtomicBool::new(false),
            supports_tid,
        }
    }

    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut D) -> T + Send + 'static,
    {
        let driver = self.driver.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = driver.lock().map_err(|_| RfidError::Hardware {
                operation: operation.to_string(),
                code: -1,
            })?;
            Ok(f(&mut guard))
        })
        .await
        .map_err(|e| {
            tracing::error!("💥 Driver task for {} aborted: {}", operation, e);
            RfidError::Hardware {
                operation: operation.to_string(),
                code: -1,
            }
        })?
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(RfidError::ReaderNotConnected)
        }
    }
}

#[async_trait]
impl<D: ReaderDriver> RfidReader for DriverReader<D> {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn capabilities(&self) -> ReaderCapabilities {
        ReaderCapabilities {
            tid: self.supports_tid,
        }
    }

    async fn connect(&self, connection: &ReaderConnection) -> Result<()> {
        let port = connection.port.clone();
        let (baud, address) = (connection.baud_index, connection.address);
        let rc = self
            .call("open", move |d| d.open(&port, baud, address))
            .await?;
        if rc != 0 {
            tracing::error!("❌ Opening reader on {} failed (rc={})", connection.port, rc);
            return Err(RfidError::Hardware {
                operation: "open".to_string(),
                code: rc,
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!("🔌 Reader connected on {}", connection.port);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if !self.is_connected() {
            return Ok(());
        }
        let rc = self.call("close", |d| d.close()).await?;
        self.connected.store(false, Ordering::SeqCst);
        if !rc_ok(rc) {
            tracing::warn!("⚠️ Reader close returned rc={}", rc);
        }
        Ok(())
    }

    async fn inventory_once(&self) -> Result<Vec<TagHandle>> {
        self.ensure_connected()?;
        self.call("inventory", |d| {
            let mut buffer = vec![0u8; INVENTORY_BUFFER_LEN];
            let round = d.inventory(&mut buffer);
            if round.rc == 1 && round.total_len > 0 && round.card_count > 0 {
                return parse_inventory(&buffer, round.total_len);
            }

            tracing::debug!("Inventory_G2 rc={}, trying fast inventory", round.rc);
            buffer.fill(0);
            let round = d.fast_inventory(&mut buffer);
            if round.rc == 1 && round.total_len > 0 && round.card_count > 0 {
                parse_inventory(&buffer, round.total_len)
            } else {
                Vec::new()
            }
        })
        .await
    }

    async fn read_tid(&self, epc_hex: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_connected()?;
        let epc = codec::hex_to_bytes(epc_hex);
        let (rc, tid) = self
            .call("read_tid", move |d| {
                let mut out = vec![0u8; usize::from(TID_WORDS) * 2];
                let rc = d.read_data(&epc, MEM_TID, 0, TID_WORDS, [0; 4], &mut out);
                (rc, out)
            })
            .await?;

        if rc_ok(rc) {
            Ok(Some(tid))
        } else {
            tracing::warn!("⚠️ TID read for {} failed (rc={})", epc_hex, rc);
            Ok(None)
        }
    }

    async fn write_epc(
        &self,
        current_epc_hex: &str,
        payload: &[u8],
        access_password: [u8; 4],
    ) -> Result<bool> {
        self.ensure_connected()?;
        if payload.is_empty() || payload.len() % 2 != 0 {
            return Err(RfidError::InvalidPayload {
                reason: format!("payload must cover whole words ({} bytes)", payload.len()),
            });
        }

        let selected = codec::hex_to_bytes(current_epc_hex);
        let data = payload.to_vec();
        let outcome = self
            .call("write_epc", move |d| {
                WriteStrategy::ALL.into_iter().find_map(|strategy| {
                    let rc = strategy.apply(d, &selected, &data, access_password);
                    tracing::debug!("{} rc={}", strategy.name(), rc);
                    rc_ok(rc).then_some(strategy)
                })
            })
            .await?;

        match outcome {
            Some(strategy) => {
                tracing::info!("✍️ EPC written with {}", strategy.name());
                Ok(true)
            }
            None => {
                tracing::warn!("⚠️ Every write strategy failed for {}", current_epc_hex);
                Ok(false)
            }
        }
    }

    async fn set_tx_power_dbm(&self, dbm: u8) -> Result<()> {
        self.ensure_connected()?;
        validate_range("tx_power_dbm", dbm, 0, MAX_TX_POWER_DBM)?;
        let rc = self.call("set_rf_power", move |d| d.set_rf_power(dbm)).await?;
        if !rc_ok(rc) {
            return Err(RfidError::Hardware {
                operation: "set_rf_power".to_string(),
                code: rc,
            });
        }
        Ok(())
    }

    async fn set_scan_time(&self, code: u8) -> Result<()> {
        self.ensure_connected()?;
        let rc = self.call("set_scan_time", move |d| d.set_scan_time(code)).await?;
        if !rc_ok(rc) {
            return Err(RfidError::Hardware {
                operation: "set_scan_time".to_string(),
                code: rc,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted driver; records every call by SDK name.
    #[derive(Default)]
    struct FakeDriver {
        open_rc: i32,
        inventory: Option<Vec<u8>>,
        fast_inventory: Option<Vec<u8>>,
        tid: Option<Vec<u8>>,
        write_rcs: [i32; 3],
        calls: Arc<Mutex<Vec<String>>>,
        written: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    }

    impl FakeDriver {
        fn log(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn round(records: &Option<Vec<u8>>, buffer: &mut [u8]) -> InventoryRound {
            match records {
                Some(bytes) => {
                    buffer[..bytes.len()].copy_from_slice(bytes);
                    InventoryRound {
                        rc: 1,
                        total_len: bytes.len(),
                        card_count: 1,
                    }
                }
                None => InventoryRound {
                    rc: 0xFB,
                    ..InventoryRound::default()
                },
            }
        }
    }

    impl ReaderDriver for FakeDriver {
        fn open(&mut self, _port: &str, _baud_index: u8, _address: u8) -> i32 {
            self.log("open");
            self.open_rc
        }

        fn close(&mut self) -> i32 {
            self.log("close");
            0
        }

        fn inventory(&mut self, buffer: &mut [u8]) -> InventoryRound {
            self.log("Inventory_G2");
            Self::round(&self.inventory, buffer)
        }

        fn fast_inventory(&mut self, buffer: &mut [u8]) -> InventoryRound {
            self.log("Fast_EPC_Inventory_G2");
            Self::round(&self.fast_inventory, buffer)
        }

        fn read_data(
            &mut self,
            _epc: &[u8],
            mem: u8,
            _word_ptr: u8,
            word_count: u8,
            _password: [u8; 4],
            out: &mut [u8],
        ) -> i32 {
            self.log("ReadData_G2");
            assert_eq!(mem, MEM_TID);
            assert_eq!(usize::from(word_count) * 2, out.len());
            match &self.tid {
                Some(tid) => {
                    out.copy_from_slice(tid);
                    0
                }
                None => 0xFA,
            }
        }

        fn write_epc(&mut self, _password: [u8; 4], epc: &[u8]) -> i32 {
            self.log("WriteEPC_G2");
            self.record_write("WriteEPC_G2", epc, self.write_rcs[0])
        }

        fn ext_write_data(
            &mut self,
            _epc: &[u8],
            mem: u8,
            word_ptr: [u8; 2],
            data: &[u8],
            _password: [u8; 4],
        ) -> i32 {
            self.log("ExtWriteData_G2");
            assert_eq!((mem, word_ptr), (MEM_EPC, [0x00, 0x02]));
            self.record_write("ExtWriteData_G2", data, self.write_rcs[1])
        }

        fn block_write(
            &mut self,
            _epc: &[u8],
            mem: u8,
            word_ptr: u8,
            data: &[u8],
            _password: [u8; 4],
        ) -> i32 {
            self.log("BlockWrite_G2");
            assert_eq!((mem, word_ptr), (MEM_EPC, 2));
            self.record_write("BlockWrite_G2", data, self.write_rcs[2])
        }

        fn set_rf_power(&mut self, _dbm: u8) -> i32 {
            self.log("SetRfPower");
            0
        }

        fn set_scan_time(&mut self, _code: u8) -> i32 {
            self.log("SetScanTime");
            0x10
        }
    }

    impl FakeDriver {
        fn record_write(&self, name: &str, data: &[u8], rc: i32) -> i32 {
            if rc_ok(rc) {
                self.written
                    .lock()
                    .unwrap()
                    .push((name.to_string(), data.to_vec()));
            }
            rc
        }
    }

    fn connection() -> ReaderConnection {
        ReaderConnection {
            port: "COM3".into(),
            baud_index: 5,
            address: 0,
        }
    }

    async fn connected(driver: FakeDriver) -> DriverReader<FakeDriver> {
        let reader = DriverReader::new(driver);
        reader.connect(&connection()).await.unwrap();
        reader
    }

    #[test]
    fn test_parse_inventory_dedupes_and_sorts() {
        let buffer = [
            3, 0xBB, 0x01, 0x02, // BB0102
            2, 0xAA, 0x01, // AA01
            3, 0xBB, 0x01, 0x02, // duplicate
            9, 0x01, // truncated record is dropped
        ];
        let tags = parse_inventory(&buffer, buffer.len());
        let hexes: Vec<&str> = tags.iter().map(|t| t.epc_hex.as_str()).collect();
        assert_eq!(hexes, vec!["AA01", "BB0102"]);
        assert_eq!(tags[1].epc_byte_len, 3);
    }

    #[test]
    fn test_ascii_preview_prefers_decoded_plate() {
        let payload = codec::build_identity("34ABC123", "778812").unwrap();
        let mut buffer = vec![payload.len() as u8];
        buffer.extend_from_slice(&payload);
        buffer.extend_from_slice(&[4, b'T', b'A', b'G', 0]);
        buffer.extend_from_slice(&[2, 0x01, 0x02]);

        let tags = parse_inventory(&buffer, buffer.len());
        let previews: Vec<&str> = tags.iter().map(|t| t.epc_ascii.as_str()).collect();
        assert_eq!(previews, vec!["", "34ABC123", "TAG"]);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let reader = DriverReader::new(FakeDriver::default());
        assert!(matches!(
            reader.inventory_once().await,
            Err(RfidError::ReaderNotConnected)
        ));
        assert!(matches!(
            reader.write_epc("AA", &[1, 2], [0; 4]).await,
            Err(RfidError::ReaderNotConnected)
        ));
    }

    #[tokio::test]
    async fn test_open_failure_is_hardware_error() {
        let reader = DriverReader::new(FakeDriver {
            open_rc: 0x30,
            ..FakeDriver::default()
        });
        let err = reader.connect(&connection()).await.unwrap_err();
        assert!(matches!(err, RfidError::Hardware { code: 0x30, .. }));
        assert!(!reader.is_connected());
    }

    #[tokio::test]
    async fn test_inventory_falls_back_to_fast_mode() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let reader = connected(FakeDriver {
            fast_inventory: Some(vec![2, 0xE2, 0x80]),
            calls: calls.clone(),
            ..FakeDriver::default()
        })
        .await;

        let tags = reader.inventory_once().await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].epc_hex, "E280");
        let calls = calls.lock().unwrap();
        assert_eq!(calls[1..], ["Inventory_G2", "Fast_EPC_Inventory_G2"]);
    }

    #[tokio::test]
    async fn test_inventory_empty_when_both_rounds_fail() {
        let reader = connected(FakeDriver::default()).await;
        assert!(reader.inventory_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_falls_through_strategies() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let reader = connected(FakeDriver {
            write_rcs: [0xFC, 0xFC, 0],
            written: written.clone(),
            ..FakeDriver::default()
        })
        .await;

        let payload = codec::cleared_payload();
        assert!(reader.write_epc("E280", &payload, [0; 4]).await.unwrap());
        assert_eq!(
            written.lock().unwrap().as_slice(),
            &[("BlockWrite_G2".to_string(), payload)]
        );
    }

    #[tokio::test]
    async fn test_write_reports_false_when_all_fail() {
        let reader = connected(FakeDriver {
            write_rcs: [0xFC, 0xFC, 0xFC],
            ..FakeDriver::default()
        })
        .await;
        assert!(!reader.write_epc("E280", &[1, 2], [0; 4]).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_rejects_odd_payload() {
        let reader = connected(FakeDriver::default()).await;
        assert!(matches!(
            reader.write_epc("E280", &[1, 2, 3], [0; 4]).await,
            Err(RfidError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_tid() {
        let tid = vec![0xE2, 0x00, 0x34, 0x12, 0x01, 0x02, 0x03, 0x04];
        let reader = connected(FakeDriver {
            tid: Some(tid.clone()),
            ..FakeDriver::default()
        })
        .await;
        assert_eq!(reader.read_tid("E280").await.unwrap(), Some(tid));
        assert!(reader.capabilities().tid);

        let silent = connected(FakeDriver::default()).await;
        assert_eq!(silent.read_tid("E280").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tuning_validates_and_maps_rc() {
        let reader = connected(FakeDriver::default()).await;
        assert!(reader.set_tx_power_dbm(15).await.is_ok());
        assert!(matches!(
            reader.set_tx_power_dbm(31).await,
            Err(RfidError::InvalidConfigValueError { .. })
        ));
        assert!(matches!(
            reader.set_scan_time(4).await,
            Err(RfidError::Hardware { code: 0x10, .. })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_clears_state() {
        let reader = connected(FakeDriver::default()).await;
        reader.disconnect().await.unwrap();
        assert!(!reader.is_connected());
        // second disconnect is a no-op
        reader.disconnect().await.unwrap();
    }
}
