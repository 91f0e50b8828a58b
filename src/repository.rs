//! Persistence port: the gateway core never touches storage directly, it calls through this
//! trait. Kept deliberately separate from the teacher's `storage::Entity`/`typetag` global
//! registry — see `DESIGN.md` for why.

use crate::errors::Error;
use crate::variant::Variant;

/// A device record as persisted by whatever storage the embedding application chooses.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub device_type: Variant,
}

/// Persistence boundary for device identity. The core calls [`DeviceRepository::upsert`] on
/// first-ever identification and whenever a device's reported name changes; it never reads
/// from this port during normal operation.
pub trait DeviceRepository: Send + Sync {
    fn find_all(&self) -> Result<Vec<DeviceRecord>, Error>;
    fn upsert(&self, id: &str, name: &str, device_type: Variant) -> Result<(), Error>;
    fn delete(&self, id: &str) -> Result<(), Error>;
}

/// A no-op [`DeviceRepository`], for tests and for embedding applications that don't persist
/// device identity at all.
#[derive(Default, Debug, Clone)]
pub struct NullDeviceRepository;

impl DeviceRepository for NullDeviceRepository {
    fn find_all(&self) -> Result<Vec<DeviceRecord>, Error> {
        Ok(Vec::new())
    }

    fn upsert(&self, _id: &str, _name: &str, _device_type: Variant) -> Result<(), Error> {
        Ok(())
    }

    fn delete(&self, _id: &str) -> Result<(), Error> {
        Ok(())
    }
}
