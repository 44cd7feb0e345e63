//! Scripted session against the simulated compositor.

use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::info;

use vdesk_core::{
    Connection, DesktopSnapshot, ObjectHandle, VirtualDesktop, VirtualDesktopManager,
    POSITION_END,
};
use vdesk_loopback::{Compositor, LoopbackConnection};

use crate::config::Config;

/// Overrides from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulationOptions {
    pub desktops: Option<usize>,
    pub rows: Option<u32>,
}

/// Run the scripted session and return the final layout.
///
/// The script binds the manager, creates a scratch desktop at the front and
/// one at the end, activates the last desktop, renames the first original
/// desktop server-side, changes rows and removes the scratch desktop.
pub fn run_simulation(config: &Config, options: SimulationOptions) -> Result<Vec<DesktopSnapshot>> {
    let sim = &config.simulation;
    let initial = options.desktops.unwrap_or(sim.initial_desktops).max(1);
    let rows = options.rows.unwrap_or(sim.rows);

    let conn = Rc::new(LoopbackConnection::new());
    let mut compositor = Compositor::new(1, initial, rows, &sim.name_prefix);
    compositor.advertise(&conn);

    let global = conn
        .find_global(&config.protocol.interface)
        .with_context(|| format!("No global implements '{}'", config.protocol.interface))?;
    let connection: Rc<dyn Connection> = conn.clone();
    let mut manager =
        VirtualDesktopManager::bind(connection, &global, config.protocol.effective_version())
            .context("Failed to bind virtual desktop manager")?;

    if config.general.print_notifications {
        manager.subscribe(|n| println!("  manager  {n:?}"));
    }

    let mut watched = HashSet::new();
    compositor.roundtrip(&conn, &mut manager);
    watch_desktops(config, &manager, &mut watched);
    print_layout("Initial layout", &manager);

    info!("Creating scratch desktops");
    manager.request_create_virtual_desktop("Scratch", 0);
    manager.request_create_virtual_desktop("Overflow", POSITION_END);
    compositor.roundtrip(&conn, &mut manager);
    watch_desktops(config, &manager, &mut watched);
    print_layout("After create", &manager);

    if let Some(last) = manager.desktops().last() {
        info!("Activating {:?}", last.id());
        last.request_activate();
    }
    compositor.roundtrip(&conn, &mut manager);
    print_layout("After activate", &manager);

    if let Some(first) = compositor.desktops().get(1).map(|d| d.id.clone()) {
        compositor.rename(&conn, &first, "Renamed");
    }
    compositor.set_rows(&conn, rows + 1);
    compositor.roundtrip(&conn, &mut manager);
    print_layout("After rename", &manager);

    if let Some(scratch) = manager.desktop_ids().into_iter().next() {
        info!("Removing {scratch}");
        manager.request_remove_virtual_desktop(&scratch);
    }
    compositor.roundtrip(&conn, &mut manager);
    print_layout("Final layout", &manager);

    let layout = manager.snapshot();
    manager.release();
    compositor.process(&conn);
    Ok(layout)
}

fn watch_desktops(
    config: &Config,
    manager: &VirtualDesktopManager,
    watched: &mut HashSet<ObjectHandle>,
) {
    if !config.general.print_notifications {
        return;
    }
    for handle in manager.desktops() {
        let Some(object) = handle.with(VirtualDesktop::handle).flatten() else {
            continue;
        };
        if watched.insert(object) {
            let id = handle.id().unwrap_or_default();
            handle.subscribe(move |n| println!("  {id:<8} {n:?}"));
        }
    }
}

fn print_layout(title: &str, manager: &VirtualDesktopManager) {
    let rows = manager
        .rows()
        .map_or_else(|| "-".to_string(), |rows| rows.to_string());
    println!("{title} (rows: {rows})");
    for (position, desktop) in manager.snapshot().iter().enumerate() {
        let marker = if desktop.active { '*' } else { ' ' };
        println!("  {marker} {position}: {} [{}]", desktop.name, desktop.id);
    }
}
