//! The virtual desktop manager proxy.
//!
//! Owns every [`VirtualDesktop`] the server has announced, in the server's
//! layout order, and routes events for itself and its children.

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, EventQueue};
use crate::desktop::{DesktopHandle, DesktopSnapshot, VirtualDesktop};
use crate::error::{Error, ProtocolAnomaly};
use crate::protocol::{
    DesktopEvent, Event, Global, ManagerEvent, ObjectHandle, Request, DESKTOP_INTERFACE,
    MANAGER_INTERFACE, SUPPORTED_VERSION,
};
use crate::proxy::Proxy;
use crate::signal::{Signal, SlotId};

/// Position hint asking the server to append a new desktop.
pub const POSITION_END: u32 = u32::MAX;

/// Notifications the manager emits to its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerNotification {
    DesktopCreated { id: String, position: u32 },
    DesktopRemoved { id: String },
    RowsChanged { rows: u32 },
    /// The global this manager is bound to went away.
    Removed,
    /// A batch of manager-level changes is complete.
    Done,
}

/// Client-side proxy for the virtual desktop manager global.
pub struct VirtualDesktopManager {
    connection: Rc<dyn Connection>,
    proxy: Proxy,
    version: u32,
    global_name: Option<u32>,
    queue: Option<EventQueue>,
    /// Desktops in server layout order, keyed by server id.
    pub(crate) desktops: IndexMap<String, Rc<VirtualDesktop>>,
    /// Child object → desktop id, for routing desktop events.
    pub(crate) routes: HashMap<ObjectHandle, String>,
    rows: Option<u32>,
    notifications: Signal<ManagerNotification>,
}

impl std::fmt::Debug for VirtualDesktopManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDesktopManager")
            .field("proxy", &self.proxy)
            .field("version", &self.version)
            .field("desktops", &self.desktops.keys().collect::<Vec<_>>())
            .field("rows", &self.rows)
            .finish_non_exhaustive()
    }
}

impl VirtualDesktopManager {
    /// An unbound manager. Call [`setup`](Self::setup) before use, or use
    /// [`bind`](Self::bind) to do both.
    pub fn new(connection: Rc<dyn Connection>) -> Self {
        Self {
            connection,
            proxy: Proxy::new(),
            version: SUPPORTED_VERSION,
            global_name: None,
            queue: None,
            desktops: IndexMap::new(),
            routes: HashMap::new(),
            rows: None,
            notifications: Signal::new(),
        }
    }

    /// Bind the advertised `global` and set up a manager for it.
    ///
    /// The bound version is the lowest of the advertised version,
    /// `max_version` and [`SUPPORTED_VERSION`].
    pub fn bind(
        connection: Rc<dyn Connection>,
        global: &Global,
        max_version: u32,
    ) -> Result<Self, Error> {
        if global.interface != MANAGER_INTERFACE {
            return Err(Error::InterfaceMismatch {
                name: global.name,
                expected: MANAGER_INTERFACE,
                found: global.interface.clone(),
            });
        }
        let version = global.version.min(max_version).min(SUPPORTED_VERSION);
        if version == 0 {
            return Err(Error::UnsupportedVersion {
                name: global.name,
                version,
            });
        }

        let handle = connection.bind(global, version)?;
        let mut manager = Self::new(connection);
        manager.version = version;
        manager.global_name = Some(global.name);
        manager.setup(handle)?;
        info!(
            "Bound {} v{} (global {}) as {handle}",
            MANAGER_INTERFACE, version, global.name
        );
        Ok(manager)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn setup(&mut self, handle: ObjectHandle) -> Result<(), Error> {
        self.proxy.setup(handle)?;
        let queue = self.event_queue();
        self.connection.assign_queue(handle, &queue);
        Ok(())
    }

    pub const fn is_valid(&self) -> bool {
        self.proxy.is_valid()
    }

    pub const fn handle(&self) -> Option<ObjectHandle> {
        self.proxy.handle()
    }

    /// Interface version in use.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Graceful teardown: release every desktop, then the manager itself.
    pub fn release(&mut self) {
        if self.is_valid() {
            debug!("Releasing manager with {} desktops", self.desktops.len());
        }
        for desktop in self.desktops.values() {
            desktop.release();
        }
        self.clear();
        self.proxy.release(self.connection.as_ref());
    }

    /// Abrupt teardown for a dead connection. Sends nothing; safe to repeat.
    pub fn destroy(&mut self) {
        for desktop in self.desktops.values() {
            desktop.destroy();
        }
        self.clear();
        self.proxy.destroy();
    }

    fn clear(&mut self) {
        self.desktops.clear();
        self.routes.clear();
        self.rows = None;
    }

    /// Use `queue` for this manager's events and its desktops' events.
    pub fn set_event_queue(&mut self, queue: EventQueue) {
        if let Some(handle) = self.proxy.handle() {
            self.connection.assign_queue(handle, &queue);
        }
        for handle in self.routes.keys() {
            self.connection.assign_queue(*handle, &queue);
        }
        self.queue = Some(queue);
    }

    /// The queue events are delivered to; the connection's default unless
    /// one was set.
    pub fn event_queue(&self) -> EventQueue {
        self.queue
            .clone()
            .unwrap_or_else(|| self.connection.default_queue())
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// The unique desktop with `id`, if the server has announced it.
    pub fn get_virtual_desktop(&self, id: &str) -> Option<DesktopHandle> {
        self.desktops.get(id).map(DesktopHandle::new)
    }

    /// Every desktop in server layout order.
    pub fn desktops(&self) -> Vec<DesktopHandle> {
        self.desktops.values().map(DesktopHandle::new).collect()
    }

    pub fn desktop_ids(&self) -> Vec<String> {
        self.desktops.keys().cloned().collect()
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.desktops.get_index_of(id)
    }

    pub fn active_desktop(&self) -> Option<DesktopHandle> {
        self.desktops
            .values()
            .find(|desktop| desktop.is_active())
            .map(DesktopHandle::new)
    }

    pub fn snapshot(&self) -> Vec<DesktopSnapshot> {
        self.desktops
            .values()
            .map(|desktop| DesktopSnapshot::from(desktop.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.desktops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desktops.is_empty()
    }

    /// Rows the desktops are laid out in; `None` until the server says.
    pub const fn rows(&self) -> Option<u32> {
        self.rows
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Ask for a desktop named `name` at `position`. Zero places it first,
    /// anything at or past the current count places it last
    /// ([`POSITION_END`]). The server decides; nothing changes locally until
    /// `desktop_created` arrives.
    pub fn request_create_virtual_desktop(&self, name: &str, position: u32) {
        self.proxy.send(
            self.connection.as_ref(),
            Request::CreateVirtualDesktop {
                name: name.to_string(),
                position,
            },
        );
    }

    /// Ask for desktop `id` to be removed. The server may refuse silently.
    pub fn request_remove_virtual_desktop(&self, id: &str) {
        self.proxy.send(
            self.connection.as_ref(),
            Request::RemoveVirtualDesktop {
                desktop_id: id.to_string(),
            },
        );
    }

    // ── Observers ────────────────────────────────────────────────────

    pub fn subscribe(&self, callback: impl FnMut(&ManagerNotification) + 'static) -> SlotId {
        self.notifications.connect(callback)
    }

    pub fn unsubscribe(&self, slot: SlotId) -> bool {
        self.notifications.disconnect(slot)
    }

    /// Discovery reported global `name` gone.
    pub fn global_removed(&self, name: u32) {
        if self.global_name == Some(name) {
            info!("Virtual desktop manager global {name} removed");
            self.notifications.emit(&ManagerNotification::Removed);
        }
    }

    // ── Event handling (connection → manager) ────────────────────────

    /// Handle one inbound event addressed to `target`, which is either this
    /// manager or one of its desktops.
    ///
    /// Protocol anomalies are logged, leave state untouched, and are
    /// returned so callers can count them.
    pub fn dispatch(&mut self, target: ObjectHandle, event: Event) -> Result<(), ProtocolAnomaly> {
        let result = self.route(target, event);
        if let Err(ref anomaly) = result {
            warn!("Protocol anomaly: {anomaly}");
        }

        #[cfg(debug_assertions)]
        if let Err(e) = crate::invariants::validate(self) {
            warn!("Invariant violation after dispatch: {}", e);
        }

        result
    }

    fn route(&mut self, target: ObjectHandle, event: Event) -> Result<(), ProtocolAnomaly> {
        let Some(own) = self.proxy.handle() else {
            return Err(ProtocolAnomaly::NotBound);
        };

        if target == own {
            return match event {
                Event::Manager(event) => self.handle_manager_event(event),
                Event::Desktop(_) => Err(ProtocolAnomaly::WrongInterface(target)),
            };
        }

        let Some(id) = self.routes.get(&target).cloned() else {
            return Err(ProtocolAnomaly::UnknownObject(target));
        };
        let event = match event {
            Event::Desktop(event) => event,
            // `done` is spelled the same on both interfaces.
            Event::Manager(ManagerEvent::Done) => DesktopEvent::Done,
            Event::Manager(_) => return Err(ProtocolAnomaly::WrongInterface(target)),
        };

        if event == DesktopEvent::Removed {
            return self.on_desktop_removed(&id);
        }
        match self.desktops.get(&id) {
            Some(desktop) => desktop.handle_event(target, event),
            None => Err(ProtocolAnomaly::UnknownObject(target)),
        }
    }

    fn handle_manager_event(&mut self, event: ManagerEvent) -> Result<(), ProtocolAnomaly> {
        trace!("manager: {event:?}");
        match event {
            ManagerEvent::DesktopCreated { id, position } => self.on_desktop_created(id, position),
            ManagerEvent::DesktopRemoved { id } => self.on_desktop_removed(&id),
            ManagerEvent::Rows { rows } => {
                self.rows = Some(rows);
                self.notifications
                    .emit(&ManagerNotification::RowsChanged { rows });
                Ok(())
            }
            ManagerEvent::Done => {
                self.notifications.emit(&ManagerNotification::Done);
                Ok(())
            }
        }
    }

    fn on_desktop_created(&mut self, id: String, position: u32) -> Result<(), ProtocolAnomaly> {
        if self.desktops.contains_key(&id) {
            return Err(ProtocolAnomaly::DuplicateDesktop(id));
        }
        let Some(own) = self.proxy.handle() else {
            return Err(ProtocolAnomaly::NotBound);
        };

        let child = self.connection.new_object(DESKTOP_INTERFACE, self.version);
        self.proxy.send(
            self.connection.as_ref(),
            Request::GetVirtualDesktop {
                new_id: child,
                desktop_id: id.clone(),
            },
        );
        self.connection.assign_queue(child, &self.event_queue());

        let desktop = Rc::new(VirtualDesktop::new(
            Rc::clone(&self.connection),
            own,
            id.clone(),
        ));
        if let Err(e) = desktop.setup(child) {
            warn!("Could not set up desktop '{id}': {e}");
        }

        let index = (position as usize).min(self.desktops.len());
        self.desktops.shift_insert(index, id.clone(), desktop);
        self.routes.insert(child, id.clone());
        debug!("Desktop '{id}' created at {index} as {child}");

        self.notifications
            .emit(&ManagerNotification::DesktopCreated { id, position });
        Ok(())
    }

    fn on_desktop_removed(&mut self, id: &str) -> Result<(), ProtocolAnomaly> {
        let Some(desktop) = self.desktops.get(id).cloned() else {
            return Err(ProtocolAnomaly::UnknownDesktop(id.to_string()));
        };

        // Holders react while the desktop is still in the collection.
        desktop.notify_removed();

        self.desktops.shift_remove(id);
        if let Some(handle) = desktop.handle() {
            self.routes.remove(&handle);
        }
        desktop.release();
        drop(desktop);

        self.notifications.emit(&ManagerNotification::DesktopRemoved {
            id: id.to_string(),
        });
        Ok(())
    }
}

impl Drop for VirtualDesktopManager {
    fn drop(&mut self) {
        if self.is_valid() {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desktop::DesktopNotification;
    use crate::test_support::RecordingConnection;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    const MANAGER: ObjectHandle = ObjectHandle(1);

    fn manager() -> (Rc<RecordingConnection>, VirtualDesktopManager) {
        let conn = Rc::new(RecordingConnection::new());
        let connection: Rc<dyn Connection> = conn.clone();
        let mut manager = VirtualDesktopManager::new(connection);
        manager.setup(MANAGER).unwrap();
        (conn, manager)
    }

    fn create(manager: &mut VirtualDesktopManager, id: &str, position: u32) {
        manager
            .dispatch(
                MANAGER,
                ManagerEvent::DesktopCreated {
                    id: id.into(),
                    position,
                }
                .into(),
            )
            .unwrap();
    }

    fn record(manager: &VirtualDesktopManager) -> Rc<RefCell<Vec<ManagerNotification>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        manager.subscribe(move |n| sink.borrow_mut().push(n.clone()));
        seen
    }

    #[test]
    fn test_created_binds_child_and_notifies() {
        let (conn, mut manager) = manager();
        let seen = record(&manager);

        create(&mut manager, "d1", 0);

        assert_eq!(manager.desktop_ids(), vec!["d1"]);
        assert_eq!(
            conn.sent(),
            vec![(
                MANAGER,
                Request::GetVirtualDesktop {
                    new_id: ObjectHandle(100),
                    desktop_id: "d1".into()
                }
            )]
        );
        assert_eq!(
            *seen.borrow(),
            vec![ManagerNotification::DesktopCreated {
                id: "d1".into(),
                position: 0
            }]
        );
        let desktop = manager.get_virtual_desktop("d1").unwrap();
        assert_eq!(desktop.with(VirtualDesktop::handle), Some(Some(ObjectHandle(100))));
        assert_eq!(desktop.with(VirtualDesktop::parent), Some(MANAGER));
    }

    #[test]
    fn test_positions_are_clamped() {
        let (_conn, mut manager) = manager();
        create(&mut manager, "a", 0);
        create(&mut manager, "b", 0);
        create(&mut manager, "c", 99);
        create(&mut manager, "d", 1);

        assert_eq!(manager.desktop_ids(), vec!["b", "d", "a", "c"]);
        assert_eq!(manager.position_of("c"), Some(3));
    }

    #[test]
    fn test_duplicate_creation_keeps_original() {
        let (conn, mut manager) = manager();
        create(&mut manager, "d1", 0);
        let original = manager.get_virtual_desktop("d1").unwrap();
        let sent_before = conn.sent().len();

        let result = manager.dispatch(
            MANAGER,
            ManagerEvent::DesktopCreated {
                id: "d1".into(),
                position: 0,
            }
            .into(),
        );

        assert_eq!(result, Err(ProtocolAnomaly::DuplicateDesktop("d1".into())));
        assert_eq!(manager.len(), 1);
        assert!(manager.get_virtual_desktop("d1").unwrap().ptr_eq(&original));
        assert_eq!(conn.sent().len(), sent_before);
    }

    #[test]
    fn test_removal_notifies_desktop_first() {
        let (conn, mut manager) = manager();
        create(&mut manager, "d1", 0);
        create(&mut manager, "d2", 1);
        let seen = record(&manager);

        let handle = manager.get_virtual_desktop("d1").unwrap();
        let during = Rc::new(RefCell::new(None));
        {
            let during = Rc::clone(&during);
            let probe = handle.clone();
            handle.subscribe(move |n| {
                if *n == DesktopNotification::Removed {
                    *during.borrow_mut() = probe.id();
                }
            });
        }

        manager
            .dispatch(MANAGER, ManagerEvent::DesktopRemoved { id: "d1".into() }.into())
            .unwrap();

        assert_eq!(during.borrow().as_deref(), Some("d1"));
        assert!(!handle.is_alive());
        assert_eq!(manager.desktop_ids(), vec!["d2"]);
        assert_eq!(
            *seen.borrow(),
            vec![ManagerNotification::DesktopRemoved { id: "d1".into() }]
        );
        assert_eq!(conn.sent().last(), Some(&(ObjectHandle(100), Request::Destroy)));
    }

    #[test]
    fn test_desktop_removed_event_on_child() {
        let (_conn, mut manager) = manager();
        create(&mut manager, "d1", 0);

        manager
            .dispatch(ObjectHandle(100), DesktopEvent::Removed.into())
            .unwrap();

        assert!(manager.is_empty());
        assert_eq!(
            manager.dispatch(ObjectHandle(100), DesktopEvent::Done.into()),
            Err(ProtocolAnomaly::UnknownObject(ObjectHandle(100)))
        );
    }

    #[test]
    fn test_unknown_removal_is_ignored() {
        let (_conn, mut manager) = manager();
        create(&mut manager, "d1", 0);

        let result =
            manager.dispatch(MANAGER, ManagerEvent::DesktopRemoved { id: "zz".into() }.into());
        assert_eq!(result, Err(ProtocolAnomaly::UnknownDesktop("zz".into())));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_child_events_are_routed() {
        let (_conn, mut manager) = manager();
        create(&mut manager, "d1", 0);
        let child = ObjectHandle(100);

        manager
            .dispatch(child, DesktopEvent::DesktopId { id: "d1".into() }.into())
            .unwrap();
        manager
            .dispatch(child, DesktopEvent::Name { name: "Mail".into() }.into())
            .unwrap();
        manager.dispatch(child, ManagerEvent::Done.into()).unwrap();

        let desktop = manager.get_virtual_desktop("d1").unwrap();
        assert_eq!(desktop.name().as_deref(), Some("Mail"));
        assert_eq!(
            manager.dispatch(child, ManagerEvent::Rows { rows: 2 }.into()),
            Err(ProtocolAnomaly::WrongInterface(child))
        );
    }

    #[test]
    fn test_rows_and_done() {
        let (_conn, mut manager) = manager();
        let seen = record(&manager);
        assert_eq!(manager.rows(), None);

        manager
            .dispatch(MANAGER, ManagerEvent::Rows { rows: 2 }.into())
            .unwrap();
        manager.dispatch(MANAGER, ManagerEvent::Done.into()).unwrap();

        assert_eq!(manager.rows(), Some(2));
        assert_eq!(
            *seen.borrow(),
            vec![
                ManagerNotification::RowsChanged { rows: 2 },
                ManagerNotification::Done
            ]
        );
    }

    #[test]
    fn test_requests_do_not_touch_local_state() {
        let (conn, mut manager) = manager();
        for id in ["a", "b", "c"] {
            create(&mut manager, id, POSITION_END);
        }
        let sent_before = conn.sent().len();

        manager.request_create_virtual_desktop("X", 0);
        manager.request_create_virtual_desktop("Y", 999);
        manager.request_remove_virtual_desktop("a");

        assert_eq!(manager.desktop_ids(), vec!["a", "b", "c"]);
        assert_eq!(
            conn.sent()[sent_before..].to_vec(),
            vec![
                (
                    MANAGER,
                    Request::CreateVirtualDesktop {
                        name: "X".into(),
                        position: 0
                    }
                ),
                (
                    MANAGER,
                    Request::CreateVirtualDesktop {
                        name: "Y".into(),
                        position: 999
                    }
                ),
                (
                    MANAGER,
                    Request::RemoveVirtualDesktop {
                        desktop_id: "a".into()
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_release_tears_down_children_then_manager() {
        let (conn, mut manager) = manager();
        create(&mut manager, "d1", 0);
        create(&mut manager, "d2", 1);
        let handle = manager.get_virtual_desktop("d2").unwrap();
        let sent_before = conn.sent().len();

        manager.release();

        assert!(!manager.is_valid());
        assert!(manager.is_empty());
        assert!(!handle.is_alive());
        assert_eq!(
            conn.sent()[sent_before..].to_vec(),
            vec![
                (ObjectHandle(100), Request::Destroy),
                (ObjectHandle(101), Request::Destroy),
                (MANAGER, Request::Destroy),
            ]
        );
    }

    #[test]
    fn test_destroy_is_silent_and_idempotent() {
        let (conn, mut manager) = manager();
        create(&mut manager, "d1", 0);
        manager
            .dispatch(MANAGER, ManagerEvent::Rows { rows: 3 }.into())
            .unwrap();
        conn.kill();

        manager.destroy();
        manager.destroy();
        manager.request_create_virtual_desktop("late", 0);

        assert!(!manager.is_valid());
        assert!(manager.is_empty());
        assert_eq!(manager.rows(), None);
        assert_eq!(conn.sent().len(), 1);
        assert!(manager.setup(ObjectHandle(2)).is_ok());
    }

    #[test]
    fn test_setup_twice_is_misuse() {
        let (_conn, mut manager) = manager();
        assert!(matches!(
            manager.setup(ObjectHandle(5)),
            Err(Error::AlreadyBound(MANAGER))
        ));
    }

    #[test]
    fn test_bind_checks_interface_and_version() {
        let conn: Rc<dyn Connection> = Rc::new(RecordingConnection::new());

        let wrong = Global::new(4, "wl_seat", 7);
        assert!(matches!(
            VirtualDesktopManager::bind(Rc::clone(&conn), &wrong, 2),
            Err(Error::InterfaceMismatch { name: 4, .. })
        ));

        let zero = Global::new(5, MANAGER_INTERFACE, 0);
        assert!(matches!(
            VirtualDesktopManager::bind(Rc::clone(&conn), &zero, 2),
            Err(Error::UnsupportedVersion { name: 5, version: 0 })
        ));

        let capped = Global::new(8, MANAGER_INTERFACE, 9);
        assert!(matches!(
            VirtualDesktopManager::bind(Rc::clone(&conn), &capped, 0),
            Err(Error::UnsupportedVersion { name: 8, version: 0 })
        ));

        let newer = Global::new(6, MANAGER_INTERFACE, 9);
        let manager = VirtualDesktopManager::bind(Rc::clone(&conn), &newer, 9).unwrap();
        assert_eq!(manager.version(), SUPPORTED_VERSION);
        assert!(manager.is_valid());
    }

    #[test]
    fn test_drop_releases_children_then_manager() {
        let (conn, mut manager) = manager();
        create(&mut manager, "d1", 0);
        create(&mut manager, "d2", 1);
        let held = manager.get_virtual_desktop("d2").unwrap();
        let before = conn.sent().len();

        drop(manager);

        assert!(!held.is_alive());
        assert_eq!(
            conn.sent()[before..].to_vec(),
            vec![
                (ObjectHandle(100), Request::Destroy),
                (ObjectHandle(101), Request::Destroy),
                (MANAGER, Request::Destroy),
            ]
        );
    }

    #[test]
    fn test_global_removed_emits_removed() {
        let conn: Rc<dyn Connection> = Rc::new(RecordingConnection::new());
        let global = Global::new(6, MANAGER_INTERFACE, 2);
        let manager = VirtualDesktopManager::bind(conn, &global, 2).unwrap();
        let seen = record(&manager);

        manager.global_removed(7);
        manager.global_removed(6);

        assert_eq!(*seen.borrow(), vec![ManagerNotification::Removed]);
        assert!(manager.is_valid());
    }

    #[test]
    fn test_unbound_manager_rejects_events() {
        let conn: Rc<dyn Connection> = Rc::new(RecordingConnection::new());
        let mut manager = VirtualDesktopManager::new(conn);
        assert_eq!(
            manager.dispatch(MANAGER, ManagerEvent::Done.into()),
            Err(ProtocolAnomaly::NotBound)
        );
    }
}
