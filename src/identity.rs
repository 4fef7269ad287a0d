//! Per-installation device identity
//!
//! The device id is an opaque UUID generated on first use and persisted in
//! the operating system's credential store (Keychain on macOS, Secret
//! Service on Linux, Windows Credential Manager on Windows). It is the only
//! key the quota system knows about; it carries no user information.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{NoorError, Result};

/// Keyring service name under which the device id is stored
const KEYRING_SERVICE: &str = "noor";
/// Keyring account name for the device id entry
const KEYRING_ACCOUNT: &str = "device-id";

/// Minimal secret storage used to persist the device id
///
/// The production implementation is [`KeyringSecretStore`]; tests use
/// [`MemorySecretStore`].
pub trait SecretStore: Send + Sync {
    /// Read a secret, returning `None` when it has never been written
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write or overwrite a secret
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Secret store backed by the OS native keyring
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    /// Creates a store namespaced under the default `noor` service
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(&self.service, key).map_err(NoorError::Keyring)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(NoorError::Keyring(e).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, key).map_err(NoorError::Keyring)?;
        entry.set_password(value).map_err(NoorError::Keyring)?;
        Ok(())
    }
}

/// In-process secret store, lost when dropped
#[derive(Default)]
pub struct MemorySecretStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| NoorError::Identity("secret store lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| NoorError::Identity("secret store lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Resolves the stable device identifier, creating it on first use
///
/// The resolved id is cached for the lifetime of the value, so repeated
/// sends do not hit the keyring.
///
/// # Examples
///
/// ```
/// use noor::identity::{DeviceIdentity, MemorySecretStore};
///
/// let identity = DeviceIdentity::new(Box::new(MemorySecretStore::new()));
/// let first = identity.device_id().unwrap();
/// let second = identity.device_id().unwrap();
/// assert_eq!(first, second);
/// ```
pub struct DeviceIdentity {
    store: Box<dyn SecretStore>,
    cached: Mutex<Option<String>>,
}

impl DeviceIdentity {
    /// Creates an identity resolver over the given secret store
    pub fn new(store: Box<dyn SecretStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Creates an identity resolver backed by the OS keyring
    pub fn keyring() -> Self {
        Self::new(Box::new(KeyringSecretStore::new()))
    }

    /// Returns the device id, generating and persisting one if absent
    ///
    /// # Errors
    ///
    /// Returns an error when the secret store cannot be read or written.
    pub fn device_id(&self) -> Result<String> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| NoorError::Identity("identity cache lock poisoned".into()))?;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.store.get(KEYRING_ACCOUNT)? {
            Some(existing) if !existing.trim().is_empty() => existing,
            _ => {
                let generated = uuid::Uuid::new_v4().to_string();
                self.store.set(KEYRING_ACCOUNT, &generated)?;
                tracing::info!(device_id = %generated, "Generated new device id");
                generated
            }
        };

        *cached = Some(id.clone());
        Ok(id)
    }
}
