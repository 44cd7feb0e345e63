//! A simulated compositor serving the virtual desktop manager global.
//!
//! It owns the authoritative desktop list, answers client requests with the
//! events a real compositor would send, and is driven explicitly through
//! [`Compositor::process`] so tests control every turn.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use vdesk_core::{
    DesktopEvent, Global, ManagerEvent, ObjectHandle, Request, VirtualDesktopManager,
    MANAGER_INTERFACE, SUPPORTED_VERSION,
};

use crate::connection::LoopbackConnection;

/// Server-side record of one desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDesktop {
    pub id: String,
    pub name: String,
    pub active: bool,
}

/// Simulated compositor state.
#[derive(Debug)]
pub struct Compositor {
    global: Global,
    desktops: Vec<ServerDesktop>,
    rows: u32,
    next_id: u32,
    /// Bound manager objects and their versions.
    managers: Vec<(ObjectHandle, u32)>,
    /// Bound desktop objects → desktop id, until the client destroys them.
    objects: HashMap<ObjectHandle, String>,
}

impl Compositor {
    /// A compositor with `initial` desktops named `"{prefix} {n}"`; the
    /// first one is active.
    pub fn new(global_name: u32, initial: usize, rows: u32, prefix: &str) -> Self {
        let mut compositor = Self {
            global: Global::new(global_name, MANAGER_INTERFACE, SUPPORTED_VERSION),
            desktops: Vec::new(),
            rows,
            next_id: 1,
            managers: Vec::new(),
            objects: HashMap::new(),
        };
        for n in 1..=initial {
            let id = compositor.allocate_id();
            compositor.desktops.push(ServerDesktop {
                id,
                name: format!("{prefix} {n}"),
                active: n == 1,
            });
        }
        compositor
    }

    pub const fn global(&self) -> &Global {
        &self.global
    }

    pub fn desktops(&self) -> &[ServerDesktop] {
        &self.desktops
    }

    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Announce the global on `conn`.
    pub fn advertise(&self, conn: &LoopbackConnection) {
        conn.advertise(self.global.clone());
    }

    fn allocate_id(&mut self) -> String {
        let id = format!("desktop-{}", self.next_id);
        self.next_id += 1;
        id
    }

    // ── Request processing ───────────────────────────────────────────

    /// Handle every bind and request sent since the last call. Returns how
    /// many were handled.
    pub fn process(&mut self, conn: &LoopbackConnection) -> usize {
        let binds = conn.take_binds();
        let requests = conn.take_requests();
        let handled = binds.len() + requests.len();

        for (handle, global) in binds {
            if global.name == self.global.name {
                self.on_bind(conn, handle, global.version);
            }
        }
        for (target, request) in requests {
            self.on_request(conn, target, request);
        }
        handled
    }

    /// Alternate server processing and client dispatch until both are idle.
    pub fn roundtrip(&mut self, conn: &LoopbackConnection, manager: &mut VirtualDesktopManager) {
        let queue = manager.event_queue();
        loop {
            let handled = self.process(conn);
            let dispatched = queue.dispatch_pending(manager);
            if handled == 0 && dispatched == 0 {
                break;
            }
        }
    }

    fn on_bind(&mut self, conn: &LoopbackConnection, handle: ObjectHandle, version: u32) {
        info!("Client bound manager as {handle} (v{version})");
        self.managers.push((handle, version));
        if version >= 2 {
            conn.deliver(handle, ManagerEvent::Rows { rows: self.rows });
        }
        for (position, desktop) in self.desktops.iter().enumerate() {
            conn.deliver(
                handle,
                ManagerEvent::DesktopCreated {
                    id: desktop.id.clone(),
                    position: position as u32,
                },
            );
        }
        conn.deliver(handle, ManagerEvent::Done);
    }

    fn on_request(&mut self, conn: &LoopbackConnection, target: ObjectHandle, request: Request) {
        if self.managers.iter().any(|(handle, _)| *handle == target) {
            self.on_manager_request(conn, target, request);
        } else if self.objects.contains_key(&target) {
            self.on_desktop_request(conn, target, request);
        } else {
            warn!("Request {request:?} for unknown object {target}");
        }
    }

    fn on_manager_request(
        &mut self,
        conn: &LoopbackConnection,
        target: ObjectHandle,
        request: Request,
    ) {
        match request {
            Request::GetVirtualDesktop { new_id, desktop_id } => {
                let Some(desktop) = self.desktops.iter().find(|d| d.id == desktop_id) else {
                    warn!("get_virtual_desktop for unknown '{desktop_id}'");
                    return;
                };
                conn.deliver(new_id, DesktopEvent::DesktopId { id: desktop.id.clone() });
                conn.deliver(new_id, DesktopEvent::Name { name: desktop.name.clone() });
                if desktop.active {
                    conn.deliver(new_id, DesktopEvent::Activated);
                }
                conn.deliver(new_id, DesktopEvent::Done);
                self.objects.insert(new_id, desktop_id);
            }
            Request::CreateVirtualDesktop { name, position } => {
                let id = self.allocate_id();
                let index = (position as usize).min(self.desktops.len());
                debug!("Creating '{id}' ({name}) at {index}");
                self.desktops.insert(
                    index,
                    ServerDesktop {
                        id: id.clone(),
                        name,
                        active: false,
                    },
                );
                self.broadcast(conn, &ManagerEvent::DesktopCreated {
                    id,
                    position: index as u32,
                });
            }
            Request::RemoveVirtualDesktop { desktop_id } => {
                self.remove(conn, &desktop_id);
            }
            Request::Destroy => {
                self.managers.retain(|(handle, _)| *handle != target);
            }
            Request::Activate => warn!("activate sent to manager {target}"),
        }
    }

    fn on_desktop_request(
        &mut self,
        conn: &LoopbackConnection,
        target: ObjectHandle,
        request: Request,
    ) {
        match request {
            Request::Activate => {
                if let Some(id) = self.objects.get(&target).cloned() {
                    self.activate(conn, &id);
                }
            }
            Request::Destroy => {
                self.objects.remove(&target);
            }
            other => warn!("{other:?} sent to desktop {target}"),
        }
    }

    // ── Server-side changes ──────────────────────────────────────────

    /// Make `id` the active desktop.
    pub fn activate(&mut self, conn: &LoopbackConnection, id: &str) {
        if !self.desktops.iter().any(|d| d.id == id) {
            warn!("Cannot activate unknown desktop '{id}'");
            return;
        }
        let mut changed = Vec::new();
        for desktop in &mut self.desktops {
            let active = desktop.id == id;
            if desktop.active != active {
                desktop.active = active;
                changed.push((desktop.id.clone(), active));
            }
        }
        for (id, active) in changed {
            let event = if active {
                DesktopEvent::Activated
            } else {
                DesktopEvent::Deactivated
            };
            self.notify_desktop(conn, &id, &[event, DesktopEvent::Done]);
        }
    }

    /// Rename `id` and tell every bound object.
    pub fn rename(&mut self, conn: &LoopbackConnection, id: &str, name: &str) {
        let Some(desktop) = self.desktops.iter_mut().find(|d| d.id == id) else {
            warn!("Cannot rename unknown desktop '{id}'");
            return;
        };
        desktop.name = name.to_string();
        self.notify_desktop(
            conn,
            id,
            &[DesktopEvent::Name { name: name.to_string() }, DesktopEvent::Done],
        );
    }

    /// Remove `id`. The last remaining desktop is never removed.
    pub fn remove(&mut self, conn: &LoopbackConnection, id: &str) {
        if self.desktops.len() <= 1 {
            info!("Declining to remove the last desktop '{id}'");
            return;
        }
        let Some(index) = self.desktops.iter().position(|d| d.id == id) else {
            warn!("Cannot remove unknown desktop '{id}'");
            return;
        };
        let removed = self.desktops.remove(index);
        // Bound objects stay known until the client destroys them.
        self.broadcast(conn, &ManagerEvent::DesktopRemoved { id: removed.id.clone() });

        if removed.active {
            let fallback = self.desktops[index.min(self.desktops.len() - 1)].id.clone();
            self.activate(conn, &fallback);
        }
    }

    pub fn set_rows(&mut self, conn: &LoopbackConnection, rows: u32) {
        self.rows = rows;
        for (handle, version) in &self.managers {
            if *version >= 2 {
                conn.deliver(*handle, ManagerEvent::Rows { rows });
                conn.deliver(*handle, ManagerEvent::Done);
            }
        }
    }

    fn broadcast(&self, conn: &LoopbackConnection, event: &ManagerEvent) {
        for (handle, _) in &self.managers {
            conn.deliver(*handle, event.clone());
            conn.deliver(*handle, ManagerEvent::Done);
        }
    }

    fn notify_desktop(&self, conn: &LoopbackConnection, id: &str, events: &[DesktopEvent]) {
        let mut objects: Vec<_> = self
            .objects
            .iter()
            .filter(|(_, desktop_id)| desktop_id.as_str() == id)
            .map(|(handle, _)| *handle)
            .collect();
        objects.sort();
        for handle in objects {
            for event in events {
                conn.deliver(handle, event.clone());
            }
        }
    }
}
