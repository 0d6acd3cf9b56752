use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// Capability set of the active network as reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NetworkCapabilities {
    pub wifi: bool,
    pub cellular: bool,
    pub internet: bool,
}

impl NetworkCapabilities {
    pub fn wifi() -> Self {
        Self {
            wifi: true,
            cellular: false,
            internet: true,
        }
    }

    pub fn cellular() -> Self {
        Self {
            wifi: false,
            cellular: true,
            internet: true,
        }
    }

    /// Internet capability on a transport we cannot classify (ethernet, VPN)
    pub fn internet() -> Self {
        Self {
            wifi: false,
            cellular: false,
            internet: true,
        }
    }
}

/// Invoked with the new capability set, `None` when the network is lost
pub type NetworkCallback = Arc<dyn Fn(Option<NetworkCapabilities>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

#[derive(Error, Debug, Clone)]
pub enum ConnectivityError {
    #[error("Network callback registration refused: {0}")]
    RegistrationRefused(String),
}

/// Host connectivity service
///
/// Implemented by the embedding application on top of whatever the OS offers.
pub trait NetworkPlatform: Send + Sync {
    fn active_capabilities(&self) -> Option<NetworkCapabilities>;

    fn register(&self, callback: NetworkCallback) -> Result<RegistrationId, ConnectivityError>;

    fn unregister(&self, id: RegistrationId);
}

/// Live platform registration, unregistered on drop
pub struct Registration {
    platform: Arc<dyn NetworkPlatform>,
    id: RegistrationId,
}

impl Registration {
    pub fn new(
        platform: Arc<dyn NetworkPlatform>,
        callback: NetworkCallback,
    ) -> Result<Self, ConnectivityError> {
        let id = platform.register(callback)?;
        trace!("Registered network callback {:?}", id);
        Ok(Self { platform, id })
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        trace!("Unregistering network callback {:?}", self.id);
        self.platform.unregister(self.id);
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

#[derive(Default)]
struct ManualState {
    capabilities: Option<NetworkCapabilities>,
    callbacks: HashMap<RegistrationId, NetworkCallback>,
    next_id: u64,
}

/// Platform adapter driven by the host pushing connectivity changes
///
/// Hosts without a native binding (or bridging one over FFI) forward their
/// network events through `set_capabilities` / `set_offline`.
#[derive(Default)]
pub struct ManualNetworkPlatform {
    state: Mutex<ManualState>,
}

impl ManualNetworkPlatform {
    pub fn new(capabilities: Option<NetworkCapabilities>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                capabilities,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the active capability set and notify every registration
    pub fn set_capabilities(&self, capabilities: Option<NetworkCapabilities>) {
        let callbacks: Vec<NetworkCallback> = {
            let mut state = self.lock();
            state.capabilities = capabilities;
            state.callbacks.values().cloned().collect()
        };

        debug!(
            "Network capabilities changed: {:?} ({} listeners)",
            capabilities,
            callbacks.len()
        );

        // Callbacks run outside the lock so they may query the platform
        for callback in callbacks {
            callback(capabilities);
        }
    }

    pub fn set_offline(&self) {
        self.set_capabilities(None);
    }

    pub fn registration_count(&self) -> usize {
        self.lock().callbacks.len()
    }
}

impl NetworkPlatform for ManualNetworkPlatform {
    fn active_capabilities(&self) -> Option<NetworkCapabilities> {
        self.lock().capabilities
    }

    fn register(&self, callback: NetworkCallback) -> Result<RegistrationId, ConnectivityError> {
        let mut state = self.lock();
        state.next_id += 1;
        let id = RegistrationId(state.next_id);
        state.callbacks.insert(id, callback);
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) {
        self.lock().callbacks.remove(&id);
    }
}
