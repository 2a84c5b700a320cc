//! Resource Switching Agent.
//!
//! Replays a hardware failure profile: at each scheduled instant it powers
//! a link, or a fraction of a cluster's hosts, off or on. It is the sole
//! driver of induced infrastructure failures; everything downstream
//! (batch job failures, heartbeat timeouts, quorum shrinking) cascades from
//! the power switches it flips.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{Result, SimError};
use crate::sim::{Actor, Context, EventPayload};

// ═══════════════════════════════════════════════════════════════════════════════
// Failure Profile
// ═══════════════════════════════════════════════════════════════════════════════

/// One scheduled infrastructure failure (and optional recovery).
#[derive(Debug, Clone, Deserialize)]
pub struct FailureEvent {
    /// Resource kind, e.g. "cluster" or "link". Informational; the resource
    /// name decides the handling.
    #[serde(rename = "type")]
    pub kind: String,

    /// Cluster or link name.
    pub resource: String,

    /// Fraction of the cluster's hosts affected, in (0, 1].
    #[serde(default = "default_fraction")]
    pub fraction: f64,

    /// When the resource goes down.
    pub turn_off_time: f64,

    /// When the resource comes back, if ever.
    #[serde(default)]
    pub turn_on_time: Option<f64>,
}

fn default_fraction() -> f64 {
    1.0
}

/// Load and validate a failure profile (a JSON array of events).
pub fn load_failure_profile(path: impl AsRef<Path>) -> Result<Vec<FailureEvent>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SimError::failure_profile(format!("{}: {}", path.display(), e)))?;
    let events: Vec<FailureEvent> = serde_json::from_str(&contents)
        .map_err(|e| SimError::failure_profile(format!("{}: {}", path.display(), e)))?;

    for event in &events {
        if !(event.fraction > 0.0 && event.fraction <= 1.0) {
            return Err(SimError::failure_profile(format!(
                "fraction must be in (0, 1], got {} for '{}'",
                event.fraction, event.resource
            )));
        }
        if event.turn_off_time < 0.0 {
            return Err(SimError::failure_profile(format!(
                "negative turn_off_time for '{}'",
                event.resource
            )));
        }
    }
    Ok(events)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Agent
// ═══════════════════════════════════════════════════════════════════════════════

/// Replays the failure profile against the kernel's power switches.
pub struct ResourceSwitchingAgent {
    name: String,
    events: Vec<FailureEvent>,
}

impl ResourceSwitchingAgent {
    pub fn new(events: Vec<FailureEvent>) -> Self {
        Self {
            name: "resource-switching".to_string(),
            events,
        }
    }

    /// Apply one decoded switch to a link or a slice of a cluster.
    fn apply_switch(
        &self,
        ctx: &mut Context<'_>,
        resource: &str,
        fraction: f64,
        on: bool,
    ) -> Result<()> {
        if resource.contains("link") {
            info!(link = resource, on = on, "Switching link power");
            ctx.set_link_power(resource, on);
            return Ok(());
        }

        let hosts = ctx.cluster_hosts(resource);
        if hosts.is_empty() {
            warn!(resource = resource, "Failure profile names an unknown cluster");
            return Ok(());
        }
        let affected = (hosts.len() as f64 * fraction).ceil() as usize;
        info!(
            cluster = resource,
            percent = (100.0 * fraction) as u32,
            hosts = affected,
            on = on,
            "Switching cluster power"
        );
        for host in hosts.iter().take(affected) {
            ctx.set_host_power(host, on)?;
        }
        Ok(())
    }
}

/// Timer labels carry the switch to perform: `turn_{off,on}_<resource>_f<fraction>`.
fn decode_label(label: &str) -> Option<(bool, &str, f64)> {
    let (on, rest) = if let Some(rest) = label.strip_prefix("turn_on_") {
        (true, rest)
    } else if let Some(rest) = label.strip_prefix("turn_off_") {
        (false, rest)
    } else {
        return None;
    };
    let split = rest.rfind("_f")?;
    let resource = &rest[..split];
    let fraction: f64 = rest[split + 2..].parse().ok()?;
    Some((on, resource, fraction))
}

impl Actor for ResourceSwitchingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_start(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        info!(events = self.events.len(), "Resource Switching Agent starting");
        for event in &self.events {
            ctx.set_timer(
                event.turn_off_time,
                format!("turn_off_{}_f{}", event.resource, event.fraction),
            );
            if let Some(turn_on_time) = event.turn_on_time {
                ctx.set_timer(
                    turn_on_time,
                    format!("turn_on_{}_f{}", event.resource, event.fraction),
                );
            }
        }
        Ok(())
    }

    fn on_event(&mut self, ctx: &mut Context<'_>, event: EventPayload) -> Result<()> {
        let EventPayload::Timer { label } = event else {
            return Ok(());
        };
        let Some((on, resource, fraction)) = decode_label(&label) else {
            return Err(SimError::internal(format!(
                "{}: unexpected timer label '{}'",
                self.name, label
            )));
        };
        let resource = resource.to_string();
        self.apply_switch(ctx, &resource, fraction, on)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
