/// Connectivity Monitor
///
/// Holds the process-wide online/offline state. Platform signals are fed in
/// through `report`; interested components subscribe to a watch channel and
/// react to transitions instead of polling.
use crate::metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Binary connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn from_online(online: bool) -> Self {
        if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// A change of connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// offline -> online; triggers sync and revocation refresh
    CameOnline,
    /// online -> offline; informational only
    WentOffline,
}

impl Transition {
    /// Classify a state change, if it is one
    pub fn between(previous: Connectivity, current: Connectivity) -> Option<Self> {
        match (previous, current) {
            (Connectivity::Offline, Connectivity::Online) => Some(Transition::CameOnline),
            (Connectivity::Online, Connectivity::Offline) => Some(Transition::WentOffline),
            _ => None,
        }
    }
}

/// Process-scoped connectivity state
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivityMonitor {
    /// Create a monitor initialized from the current platform signal
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        metrics::ONLINE.set(initial.is_online() as i64);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online()
    }

    /// Record an observed platform signal
    ///
    /// Subscribers are only woken when the state actually changes.
    pub fn report(&self, observed: Connectivity) -> Option<Transition> {
        let mut transition = None;
        self.state.send_if_modified(|state| {
            transition = Transition::between(*state, observed);
            *state = observed;
            transition.is_some()
        });

        match transition {
            Some(Transition::CameOnline) => info!("Connectivity restored"),
            Some(Transition::WentOffline) => {
                info!("Connectivity lost; logs will sync when reconnected")
            }
            None => {}
        }
        metrics::ONLINE.set(observed.is_online() as i64);

        transition
    }

    pub fn set_online(&self) -> Option<Transition> {
        self.report(Connectivity::Online)
    }

    pub fn set_offline(&self) -> Option<Transition> {
        self.report(Connectivity::Offline)
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert!(ConnectivityMonitor::new(Connectivity::Online).is_online());
        assert!(!ConnectivityMonitor::new(Connectivity::Offline).is_online());
    }

    #[test]
    fn test_report_returns_transitions() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);

        assert_eq!(monitor.set_offline(), None);
        assert_eq!(monitor.set_online(), Some(Transition::CameOnline));
        assert_eq!(monitor.set_online(), None);
        assert_eq!(monitor.set_offline(), Some(Transition::WentOffline));
    }

    #[tokio::test]
    async fn test_subscribers_only_see_changes() {
        let monitor = ConnectivityMonitor::new(Connectivity::Offline);
        let mut rx = monitor.subscribe();

        monitor.set_offline();
        assert!(!rx.has_changed().unwrap());

        monitor.set_online();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Connectivity::Online);
    }
}
