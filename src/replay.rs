//! Replay of recorded protocol traces.
//!
//! A trace is JSON lines, one inbound event per line:
//!
//! ```text
//! {"target": 1, "event": {"type": "desktop_created", "id": "d1", "position": 0}}
//! {"target": 2, "event": {"type": "desktop_id", "id": "d1"}}
//! ```
//!
//! The manager is bound as object 1; desktop objects are numbered from 2 in
//! the order their `desktop_created` events appear.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io::BufRead;
use std::rc::Rc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vdesk_core::{
    Connection, DesktopSnapshot, Event, Global, ObjectHandle, VirtualDesktop,
    VirtualDesktopManager, SUPPORTED_VERSION,
};
use vdesk_loopback::LoopbackConnection;

use crate::config::Config;

/// One line of a trace file.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceEntry {
    pub target: ObjectHandle,
    pub event: Event,
}

/// Outcome of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub events: usize,
    pub anomalies: Vec<String>,
    pub rows: Option<u32>,
    pub desktops: Vec<DesktopSnapshot>,
    pub notifications: Vec<String>,
}

/// Feed every entry of `trace` through a freshly bound manager.
pub fn run_replay(trace: impl BufRead, config: &Config) -> Result<ReplayReport> {
    let conn = Rc::new(LoopbackConnection::new());
    let global = Global::new(1, config.protocol.interface.clone(), SUPPORTED_VERSION);
    conn.advertise(global.clone());

    let connection: Rc<dyn Connection> = conn.clone();
    let mut manager =
        VirtualDesktopManager::bind(connection, &global, config.protocol.effective_version())
            .context("Failed to bind virtual desktop manager")?;

    let notifications = Rc::new(RefCell::new(Vec::new()));
    {
        let notifications = Rc::clone(&notifications);
        manager.subscribe(move |n| notifications.borrow_mut().push(format!("manager: {n:?}")));
    }

    let mut subscribed = HashSet::new();
    let mut events = 0;
    let mut anomalies = Vec::new();

    for (number, line) in trace.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read trace line {}", number + 1))?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let entry: TraceEntry = serde_json::from_str(&line)
            .with_context(|| format!("Invalid trace entry on line {}", number + 1))?;
        debug!("line {}: {} {:?}", number + 1, entry.target, entry.event);

        events += 1;
        if let Err(anomaly) = manager.dispatch(entry.target, entry.event) {
            anomalies.push(format!("line {}: {anomaly}", number + 1));
        }

        // Watch desktops as soon as they exist
        for handle in manager.desktops() {
            let Some(object) = handle.with(VirtualDesktop::handle).flatten() else {
                continue;
            };
            let Some(id) = handle.id() else { continue };
            if subscribed.insert(object) {
                let notifications = Rc::clone(&notifications);
                handle.subscribe(move |n| {
                    notifications.borrow_mut().push(format!("{id}: {n:?}"));
                });
            }
        }
    }

    let report = ReplayReport {
        events,
        anomalies,
        rows: manager.rows(),
        desktops: manager.snapshot(),
        notifications: notifications.borrow().clone(),
    };
    info!(
        "Replayed {} events, {} anomalies",
        report.events,
        report.anomalies.len()
    );
    if !report.anomalies.is_empty() {
        warn!("Trace violates the protocol in {} places", report.anomalies.len());
    }

    // No server on the other end of a trace.
    manager.destroy();
    Ok(report)
}
