//! The set of currently-live device sessions, keyed by [`Identity`], plus the `joined`/
//! `updated`/`left` subscriber feed external consumers watch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::{Mutex, RwLock};

use crate::device::{DiscreteSnapshot, Identity, SessionHandle};
use crate::dispatch::ActionValue;
use crate::errors::{Error, SessionError};
use crate::repository::DeviceRepository;
use crate::utils::EventManager;

/// Owns every currently-online [`SessionHandle`] and republishes their lifecycle as
/// roster-wide events. A session occupies the roster only while `online`; one that never
/// reaches `READY` before closing is never added and never emits `joined`/`left`.
///
/// Two `EventManager`s are deliberately not one: callers of [`Roster::on_joined`]/
/// [`Roster::on_updated`]/[`Roster::on_left`] only ever see snapshots of sessions currently
/// or formerly tracked by this roster, never a session's internal handshake chatter.
#[derive(Clone)]
pub struct Roster {
    sessions: Arc<RwLock<HashMap<Identity, SessionHandle>>>,
    events: EventManager,
    repository: Arc<dyn DeviceRepository>,
}

impl Roster {
    pub fn new(repository: Arc<dyn DeviceRepository>) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), events: EventManager::default(), repository }
    }

    /// Watches a freshly connected session and folds it into the roster once it reaches
    /// `READY`. Ignored with a warning if another live session already occupies this
    /// identity — per the roster's double-add invariant, a duplicate only replaces a
    /// previous occupant once that occupant has closed.
    pub fn add(&self, session: SessionHandle) {
        let identity = session.identity();
        if self.sessions.read().contains_key(&identity) {
            warn!("roster: ignoring duplicate session for {identity}, previous session is still live");
            return;
        }

        let joined = Arc::new(AtomicBool::new(false));
        let last_name: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let sessions = self.sessions.clone();
        let events = self.events.clone();
        let repository = self.repository.clone();
        let update_identity = identity.clone();
        let update_session = session.clone();
        let update_joined = joined.clone();
        session.on_update(move |snapshot| {
            if snapshot.online {
                if let Some(name) = &snapshot.name {
                    let mut last = last_name.lock();
                    if last.as_deref() != Some(name.as_str()) {
                        *last = Some(name.clone());
                        let _ = repository.upsert(&update_identity.0, name, snapshot.device_type);
                    }
                }
                if !update_joined.swap(true, Ordering::SeqCst) {
                    sessions.write().insert(update_identity.clone(), update_session.clone());
                    events.emit("joined", snapshot);
                } else {
                    events.emit("updated", snapshot);
                }
            }
            Box::pin(async { Ok(()) })
        });

        let sessions = self.sessions.clone();
        let events = self.events.clone();
        let repository = self.repository.clone();
        let closed_identity = identity.clone();
        session.on_closed(move |_snapshot| {
            let was_tracked = sessions.write().remove(&closed_identity).is_some();
            if was_tracked || joined.load(Ordering::SeqCst) {
                events.emit("left", closed_identity.0.clone());
                let _ = repository.delete(&closed_identity.0);
            }
            Box::pin(async { Ok(()) })
        });
    }

    /// Drops `identity` from the roster without waiting for the session itself to close.
    /// Idempotent: removing an identity that isn't present is a no-op.
    pub fn remove(&self, identity: &Identity) {
        let removed = self.sessions.write().remove(identity).is_some();
        if removed {
            self.events.emit("left", identity.0.clone());
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<SessionHandle> {
        self.sessions.read().get(identity).cloned()
    }

    /// The discrete snapshot of every currently online session.
    pub fn snapshot(&self) -> Vec<DiscreteSnapshot> {
        self.sessions.read().values().map(|s| s.snapshot()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Forwards a named action to the session identified by `identity`.
    pub async fn execute_action(&self, identity: &Identity, action: &str, args: Vec<ActionValue>) -> Result<(), Error> {
        let session = self
            .get(identity)
            .ok_or_else(|| Error::from(SessionError::InvalidState { state: "not in roster" }))?;
        session.execute_action(action, args).await
    }

    /// `executeAction(deviceId, action, params[])`: forwards raw string params to the session
    /// identified by `identity`, which parses and range-checks them before dispatch.
    pub async fn execute_action_params(&self, identity: &Identity, action: &str, params: &[String]) -> Result<(), Error> {
        let session = self
            .get(identity)
            .ok_or_else(|| Error::from(SessionError::InvalidState { state: "not in roster" }))?;
        session.execute_action_params(action, params).await
    }

    pub fn on_joined<F>(&self, callback: F)
    where
        F: FnMut(DiscreteSnapshot) -> futures::future::BoxFuture<'static, Result<(), Error>> + Send + 'static,
    {
        let mut callback = callback;
        self.events.on("joined", move |snapshot: DiscreteSnapshot| callback(snapshot));
    }

    pub fn on_updated<F>(&self, callback: F)
    where
        F: FnMut(DiscreteSnapshot) -> futures::future::BoxFuture<'static, Result<(), Error>> + Send + 'static,
    {
        let mut callback = callback;
        self.events.on("updated", move |snapshot: DiscreteSnapshot| callback(snapshot));
    }

    pub fn on_left<F>(&self, callback: F)
    where
        F: FnMut(String) -> futures::future::BoxFuture<'static, Result<(), Error>> + Send + 'static,
    {
        let mut callback = callback;
        self.events.on("left", move |id: String| callback(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::device::DeviceSession;
    use crate::firmata::constants::{ANALOG_MAPPING_RESPONSE, CAPABILITY_RESPONSE, END_SYSEX, REPORT_FIRMWARE, START_SYSEX};
    use crate::firmata::split_14bit;
    use crate::mocks::MockLink;
    use crate::repository::NullDeviceRepository;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn roster() -> Roster {
        Roster::new(Arc::new(NullDeviceRepository))
    }

    /// A full identification reply sequence (firmware + empty capability + empty analog
    /// mapping) that drives a session straight from IDENTIFYING into READY.
    fn identification_bytes(name: &str) -> Vec<u8> {
        let mut bytes = vec![START_SYSEX, REPORT_FIRMWARE, 2, 5];
        for ch in name.chars() {
            let (lsb, msb) = split_14bit(ch as u16);
            bytes.push(lsb);
            bytes.push(msb);
        }
        bytes.push(END_SYSEX);
        bytes.extend([START_SYSEX, CAPABILITY_RESPONSE, END_SYSEX]);
        bytes.extend([START_SYSEX, ANALOG_MAPPING_RESPONSE, END_SYSEX]);
        bytes
    }

    fn ready_link(name: &str) -> MockLink {
        MockLink::with_bytes(identification_bytes(name)).looping()
    }

    #[tokio::test]
    async fn test_add_registers_session_once_ready_and_emits_joined() {
        let roster = roster();
        let joined = Arc::new(AtomicUsize::new(0));
        let j = joined.clone();
        roster.on_joined(move |snapshot| {
            assert_eq!(snapshot.name.as_deref(), Some("GenericBoard"));
            j.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let link: Box<dyn crate::link::Link> = Box::new(ready_link("GenericBoard"));
        let handle = DeviceSession::connect(link, GatewayConfig::default());
        roster.add(handle.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(roster.len(), 1);
        assert_eq!(joined.load(Ordering::SeqCst), 1);

        handle.close();
    }

    #[tokio::test]
    async fn test_close_removes_from_roster_and_emits_left() {
        let roster = roster();
        let left = Arc::new(AtomicUsize::new(0));
        let l = left.clone();
        roster.on_left(move |_id| {
            l.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let link: Box<dyn crate::link::Link> = Box::new(ready_link("GenericBoard"));
        let handle = DeviceSession::connect(link, GatewayConfig::default());
        roster.add(handle.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(roster.len(), 1);

        handle.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(roster.is_empty());
        assert_eq!(left.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_that_never_identifies_is_never_joined() {
        let roster = roster();
        let joined = Arc::new(AtomicUsize::new(0));
        let j = joined.clone();
        roster.on_joined(move |_| {
            j.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let link: Box<dyn crate::link::Link> = Box::new(MockLink::new());
        let handle = DeviceSession::connect(link, GatewayConfig::default());
        roster.add(handle);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(joined.load(Ordering::SeqCst), 0);
        assert!(roster.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let roster = roster();
        let identity: Identity = "mock://gone".into();
        roster.remove(&identity);
        roster.remove(&identity);
        assert!(roster.is_empty());
    }

    #[tokio::test]
    async fn test_execute_action_on_unknown_identity_is_invalid_state() {
        let roster = roster();
        let identity: Identity = "mock://missing".into();
        let err = roster.execute_action(&identity, "TOGGLELED", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::SessionError { .. }));
    }
}
