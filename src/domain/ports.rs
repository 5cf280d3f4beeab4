use crate::domain::model::{
    AuthResult, ReaderCapabilities, ReaderConnection, RegistryRecord, TagHandle,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Physical UHF reader session.
///
/// Implementations are not expected to be reentrant: one flow drives one reader.
#[async_trait]
pub trait RfidReader: Send + Sync {
    fn is_connected(&self) -> bool;

    fn capabilities(&self) -> ReaderCapabilities {
        ReaderCapabilities::default()
    }

    async fn connect(&self, connection: &ReaderConnection) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn inventory_once(&self) -> Result<Vec<TagHandle>>;

    /// Raw TID words, `None` when the chip did not answer.
    async fn read_tid(&self, _epc_hex: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    /// Returns `false` once every write strategy the reader knows has failed.
    async fn write_epc(
        &self,
        current_epc_hex: &str,
        payload: &[u8],
        access_password: [u8; 4],
    ) -> Result<bool>;

    async fn set_tx_power_dbm(&self, dbm: u8) -> Result<()>;

    async fn set_scan_time(&self, code: u8) -> Result<()>;
}

/// Remote vehicle registry.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn lookup_by_plate(&self, plate: &str) -> Result<Option<RegistryRecord>>;

    async fn assign_tag(&self, record_id: &str, chip_id: &str, note: &str) -> Result<bool>;

    async fn deliver(&self, chip_id: &str) -> Result<(bool, Option<String>)>;
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> AuthResult;

    /// Never fails loudly: any problem is logged and reported as `false`.
    async fn refresh(&self) -> bool;
}
