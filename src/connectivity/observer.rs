use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::platform::{NetworkCapabilities, NetworkPlatform, Registration};

/// Coarse reachability hint, not a promise that any given host answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkState {
    /// Internet capability on an unclassified transport
    Online,
    Offline,
    Wifi,
    Cellular,
}

impl NetworkState {
    /// First match wins: none, wifi, cellular, internet, otherwise offline
    pub fn classify(capabilities: Option<&NetworkCapabilities>) -> Self {
        match capabilities {
            None => Self::Offline,
            Some(caps) if caps.wifi => Self::Wifi,
            Some(caps) if caps.cellular => Self::Cellular,
            Some(caps) if caps.internet => Self::Online,
            Some(_) => Self::Offline,
        }
    }

    pub fn is_online(&self) -> bool {
        !matches!(self, Self::Offline)
    }
}

/// Tracks reachability and transport type of the active network
pub struct ConnectivityObserver {
    platform: Arc<dyn NetworkPlatform>,
    published: Arc<watch::Sender<NetworkState>>,
    monitor: Mutex<Option<Registration>>,
}

impl ConnectivityObserver {
    pub fn new(platform: Arc<dyn NetworkPlatform>) -> Self {
        let initial = NetworkState::classify(platform.active_capabilities().as_ref());
        let (published, _) = watch::channel(initial);

        Self {
            platform,
            published: Arc::new(published),
            monitor: Mutex::new(None),
        }
    }

    fn monitor(&self) -> MutexGuard<'_, Option<Registration>> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh platform query, does not touch the published state
    pub fn current_state(&self) -> NetworkState {
        NetworkState::classify(self.platform.active_capabilities().as_ref())
    }

    /// Query the platform and publish the result
    pub fn refresh(&self) -> NetworkState {
        let state = self.current_state();
        publish(&self.published, state);
        state
    }

    /// Start republishing platform changes; a no-op when already running
    pub fn start_monitoring(&self) {
        let mut monitor = self.monitor();
        if monitor.is_some() {
            debug!("Connectivity monitoring already started");
            return;
        }

        let published = self.published.clone();
        let callback = Arc::new(move |capabilities: Option<NetworkCapabilities>| {
            publish(&published, NetworkState::classify(capabilities.as_ref()));
        });

        match Registration::new(self.platform.clone(), callback) {
            Ok(registration) => {
                *monitor = Some(registration);
                let state = self.refresh();
                info!("Connectivity monitoring started, current state: {:?}", state);
            }
            Err(e) => {
                warn!(
                    "Failed to register for connectivity changes, falling back to on-demand queries: {}",
                    e
                );
                self.refresh();
            }
        }
    }

    /// Stop republishing changes; a no-op when not running
    pub fn stop_monitoring(&self) {
        match self.monitor().take() {
            Some(_registration) => info!("Connectivity monitoring stopped"),
            None => debug!("Connectivity monitoring not running"),
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor().is_some()
    }

    /// Last published state, may lag behind the platform
    pub fn published_state(&self) -> NetworkState {
        *self.published.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.published_state().is_online()
    }

    pub fn is_wifi(&self) -> bool {
        self.published_state() == NetworkState::Wifi
    }

    pub fn is_cellular(&self) -> bool {
        self.published_state() == NetworkState::Cellular
    }

    /// Live view of the published state
    pub fn state_receiver(&self) -> watch::Receiver<NetworkState> {
        self.published.subscribe()
    }

    /// Independent stream of de-duplicated states, current state first
    ///
    /// Every call holds its own platform registration which is released when
    /// the stream is dropped.
    pub fn observe(&self) -> NetworkStateStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let callback = Arc::new(move |capabilities: Option<NetworkCapabilities>| {
            let _ = sender.send(NetworkState::classify(capabilities.as_ref()));
        });

        let registration = match Registration::new(self.platform.clone(), callback) {
            Ok(registration) => Some(registration),
            Err(e) => {
                warn!(
                    "Failed to register connectivity stream, emitting current state only: {}",
                    e
                );
                None
            }
        };

        // Read after registering so no change can slip in between
        let initial = self.current_state();

        NetworkStateStream {
            initial: Some(initial),
            last: None,
            receiver: registration.as_ref().map(|_| receiver),
            _registration: registration,
        }
    }
}

fn publish(sender: &watch::Sender<NetworkState>, state: NetworkState) {
    let changed = sender.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });

    if changed {
        debug!("Network state changed to {:?}", state);
    }
}

/// Stream returned by [`ConnectivityObserver::observe`]
pub struct NetworkStateStream {
    initial: Option<NetworkState>,
    last: Option<NetworkState>,
    receiver: Option<mpsc::UnboundedReceiver<NetworkState>>,
    _registration: Option<Registration>,
}

impl Stream for NetworkStateStream {
    type Item = NetworkState;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(state) = this.initial.take() {
            this.last = Some(state);
            return Poll::Ready(Some(state));
        }

        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(None);
        };

        loop {
            match receiver.poll_recv(cx) {
                Poll::Ready(Some(state)) if this.last == Some(state) => continue,
                Poll::Ready(Some(state)) => {
                    this.last = Some(state);
                    return Poll::Ready(Some(state));
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[path = "observer_tests.rs"]
mod tests;
