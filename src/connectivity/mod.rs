pub mod observer;
pub mod platform;

pub use observer::{ConnectivityObserver, NetworkState, NetworkStateStream};
pub use platform::{
    ConnectivityError, ManualNetworkPlatform, NetworkCallback, NetworkCapabilities,
    NetworkPlatform, Registration, RegistrationId,
};
