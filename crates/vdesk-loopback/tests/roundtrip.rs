//! End-to-end tests: vdesk-core talking to the simulated compositor.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use vdesk_core::{
    Connection, DesktopNotification, ManagerNotification, Request, VirtualDesktopManager,
    MANAGER_INTERFACE, POSITION_END,
};
use vdesk_loopback::{Compositor, LoopbackConnection};

/// Helper: a compositor with `initial` desktops and a bound, synced manager.
fn setup(initial: usize) -> (Rc<LoopbackConnection>, Compositor, VirtualDesktopManager) {
    let conn = Rc::new(LoopbackConnection::new());
    let mut compositor = Compositor::new(12, initial, 1, "Desktop");
    compositor.advertise(&conn);

    let global = conn.find_global(MANAGER_INTERFACE).unwrap();
    let connection: Rc<dyn Connection> = conn.clone();
    let mut manager = VirtualDesktopManager::bind(connection, &global, 2).unwrap();
    compositor.roundtrip(&conn, &mut manager);
    (conn, compositor, manager)
}

fn names(manager: &VirtualDesktopManager) -> Vec<String> {
    manager.snapshot().into_iter().map(|d| d.name).collect()
}

#[test]
fn bind_mirrors_server_state() {
    let (_conn, compositor, manager) = setup(3);

    assert_eq!(manager.rows(), Some(1));
    assert_eq!(names(&manager), vec!["Desktop 1", "Desktop 2", "Desktop 3"]);
    let server_ids: Vec<_> = compositor.desktops().iter().map(|d| d.id.clone()).collect();
    assert_eq!(manager.desktop_ids(), server_ids);
    assert_eq!(
        manager.active_desktop().and_then(|d| d.id()).as_deref(),
        Some("desktop-1")
    );
}

#[test]
fn create_lands_where_the_server_puts_it() {
    let (conn, mut compositor, mut manager) = setup(3);

    manager.request_create_virtual_desktop("First", 0);
    manager.request_create_virtual_desktop("Last", 999);
    assert_eq!(manager.len(), 3);

    compositor.roundtrip(&conn, &mut manager);

    assert_eq!(
        names(&manager),
        vec!["First", "Desktop 1", "Desktop 2", "Desktop 3", "Last"]
    );
}

#[test]
fn activation_round_trip() {
    let (conn, mut compositor, mut manager) = setup(2);
    let second = manager.get_virtual_desktop("desktop-2").unwrap();
    let first = manager.get_virtual_desktop("desktop-1").unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    for handle in [&first, &second] {
        let seen = Rc::clone(&seen);
        let id = handle.id().unwrap();
        handle.subscribe(move |n| seen.borrow_mut().push((id.clone(), *n)));
    }

    assert!(second.request_activate());
    assert_eq!(second.is_active(), Some(false));
    compositor.roundtrip(&conn, &mut manager);

    assert_eq!(second.is_active(), Some(true));
    assert_eq!(first.is_active(), Some(false));
    assert_eq!(
        *seen.borrow(),
        vec![
            ("desktop-1".to_string(), DesktopNotification::Deactivated),
            ("desktop-1".to_string(), DesktopNotification::Done),
            ("desktop-2".to_string(), DesktopNotification::Activated),
            ("desktop-2".to_string(), DesktopNotification::Done),
        ]
    );
}

#[test]
fn rename_is_visible_after_done() {
    let (conn, mut compositor, mut manager) = setup(1);
    let desktop = manager.get_virtual_desktop("desktop-1").unwrap();

    compositor.rename(&conn, "desktop-1", "Mail");
    assert_eq!(desktop.name().as_deref(), Some("Desktop 1"));
    compositor.roundtrip(&conn, &mut manager);

    assert_eq!(desktop.name().as_deref(), Some("Mail"));
}

#[test]
fn server_removal_releases_the_child() {
    let (conn, mut compositor, mut manager) = setup(2);
    let held = manager.get_virtual_desktop("desktop-2").unwrap();
    let child = held.with(|d| d.handle()).flatten().unwrap();

    manager.request_remove_virtual_desktop("desktop-2");
    assert!(held.is_alive());
    compositor.roundtrip(&conn, &mut manager);

    assert!(!held.is_alive());
    assert_eq!(manager.desktop_ids(), vec!["desktop-1"]);
    assert!(conn.sent().contains(&(child, Request::Destroy)));
}

#[test]
fn server_may_decline_removal() {
    let (conn, mut compositor, mut manager) = setup(1);

    manager.request_remove_virtual_desktop("desktop-1");
    compositor.roundtrip(&conn, &mut manager);

    assert_eq!(manager.desktop_ids(), vec!["desktop-1"]);
}

#[test]
fn rows_change_is_batched_with_done() {
    let (conn, mut compositor, mut manager) = setup(4);
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        manager.subscribe(move |n| seen.borrow_mut().push(n.clone()));
    }

    compositor.set_rows(&conn, 2);
    compositor.roundtrip(&conn, &mut manager);

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
fn dead_connection_teardown_is_silent() {
    let (conn, mut compositor, mut manager) = setup(2);
    let held = manager.get_virtual_desktop("desktop-1").unwrap();
    let sent_before = conn.sent().len();

    conn.kill();
    manager.destroy();
    manager.destroy();
    manager.request_create_virtual_desktop("ignored", POSITION_END);
    compositor.roundtrip(&conn, &mut manager);

    assert!(!manager.is_valid());
    assert!(!held.is_alive());
    assert_eq!(conn.sent().len(), sent_before);
}

#[test]
fn graceful_release_reaches_the_server() {
    let (conn, mut compositor, mut manager) = setup(2);
    let sent_before = conn.sent().len();

    manager.release();
    compositor.process(&conn);

    let destroys = conn.sent()[sent_before..]
        .iter()
        .filter(|(_, request)| *request == Request::Destroy)
        .count();
    assert_eq!(destroys, 3);
    assert!(manager.is_empty());
}
