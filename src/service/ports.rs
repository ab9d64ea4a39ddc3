//! Host port assignment and detection.

use serde::Serialize;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::compose::ComposeCli;
use crate::error::{Result, SlipwayError};
use crate::log_component;

const MAX_EPHEMERAL_ATTEMPTS: usize = 32;

/// Ports claimed by services started in this process.
///
/// Shared by every [`PortAllocator`]; claim-check-then-insert is a single
/// locked operation so two services can never receive the same dynamic port.
/// Fixed ports may be declared by several services, so each holder counts
/// and the port stays claimed until the last one releases it.
#[derive(Debug, Default)]
pub struct PortLedger {
    claimed: Mutex<HashMap<u16, usize>>,
}

impl PortLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `port` exclusively. Returns `false` if anyone already holds it.
    pub fn claim(&self, port: u16) -> bool {
        let mut claimed = self.claimed.lock().unwrap();
        if claimed.contains_key(&port) {
            return false;
        }
        claimed.insert(port, 1);
        true
    }

    /// Add a holder for `port`. Returns `false` if it was already held.
    pub fn acquire(&self, port: u16) -> bool {
        let mut claimed = self.claimed.lock().unwrap();
        let holders = claimed.entry(port).or_insert(0);
        *holders += 1;
        *holders == 1
    }

    /// Drop one holder. Returns `false` if the port was not claimed.
    pub fn release(&self, port: u16) -> bool {
        let mut claimed = self.claimed.lock().unwrap();
        match claimed.get_mut(&port) {
            Some(holders) if *holders > 1 => {
                *holders -= 1;
                true
            }
            Some(_) => {
                claimed.remove(&port);
                true
            }
            None => false,
        }
    }

    pub fn release_all(&self, ports: &[u16]) {
        for port in ports {
            self.release(*port);
        }
    }

    pub fn is_claimed(&self, port: u16) -> bool {
        self.claimed.lock().unwrap().contains_key(&port)
    }

    pub fn claimed(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.claimed.lock().unwrap().keys().copied().collect();
        ports.sort_unstable();
        ports
    }
}

/// Picks host ports for a service.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    ledger: Arc<PortLedger>,
    bind_host: String,
}

impl PortAllocator {
    pub fn new(ledger: Arc<PortLedger>, bind_host: impl Into<String>) -> Self {
        Self {
            ledger,
            bind_host: bind_host.into(),
        }
    }

    pub fn ledger(&self) -> &Arc<PortLedger> {
        &self.ledger
    }

    /// Non-zero ports pass through; each `0` (or an empty list, meaning one
    /// fully dynamic port) becomes a fresh OS-chosen port.
    pub fn assign(&self, declared: &[u16]) -> Result<Vec<u16>> {
        if declared.is_empty() {
            return Ok(vec![self.ephemeral()?]);
        }
        declared
            .iter()
            .map(|&port| {
                if port == 0 {
                    self.ephemeral()
                } else {
                    if !self.ledger.acquire(port) {
                        warn!(port, "Declared port is shared with another service");
                    }
                    Ok(port)
                }
            })
            .collect()
    }

    fn ephemeral(&self) -> Result<u16> {
        for _ in 0..MAX_EPHEMERAL_ATTEMPTS {
            let listener = TcpListener::bind((self.bind_host.as_str(), 0)).map_err(|e| {
                SlipwayError::Orchestrator(format!("cannot bind {}: {}", self.bind_host, e))
            })?;
            let port = listener.local_addr()?.port();
            drop(listener);

            if self.ledger.claim(port) {
                log_component!(debug, "ports", "Assigned ephemeral port", port = port);
                return Ok(port);
            }
        }
        Err(SlipwayError::Orchestrator(
            "no unclaimed ephemeral port available".to_string(),
        ))
    }

    /// Host ports actually bound by the running service.
    ///
    /// Reads the structured listing first and falls back to inspecting the
    /// container when the listing carries no publishers.
    pub async fn detect(&self, compose: &ComposeCli, service: &str) -> Result<Vec<u16>> {
        let containers = compose.ps(service).await?;
        let Some(container) = containers
            .iter()
            .find(|c| c.service == service && c.is_running())
            .or_else(|| containers.iter().find(|c| c.is_running()))
        else {
            return Ok(Vec::new());
        };

        let ports = container.published_ports();
        if !ports.is_empty() || container.id.is_empty() {
            return Ok(ports);
        }
        debug!(container = %container.id, "No publishers in listing, inspecting");
        compose.inspect_ports(&container.id).await
    }
}

/// Declared, locally assigned and live-detected ports of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortAssignment {
    pub declared: Vec<u16>,
    pub assigned: Vec<u16>,
    pub detected: Vec<u16>,
}

impl PortAssignment {
    pub fn new(declared: Vec<u16>, assigned: Vec<u16>) -> Self {
        Self {
            declared,
            assigned,
            detected: Vec::new(),
        }
    }

    /// Externally visible ports: detected, else assigned, else declared.
    pub fn effective(&self) -> Vec<u16> {
        [&self.detected, &self.assigned, &self.declared]
            .into_iter()
            .map(|set| set.iter().copied().filter(|p| *p != 0).collect::<Vec<_>>())
            .find(|set| !set.is_empty())
            .unwrap_or_default()
    }

    pub fn primary(&self) -> Option<u16> {
        self.effective().first().copied()
    }

    /// Record live ports, lined up with the declared slots.
    ///
    /// A listed port that matches a slot's known host port takes that slot;
    /// the remaining ports fill dynamic slots in listing order, and any
    /// surplus goes last.
    pub fn set_detected(&mut self, listed: Vec<u16>) {
        let expected = if self.assigned.len() >= self.declared.len() {
            &self.assigned
        } else {
            &self.declared
        };

        let mut rest = listed;
        let mut slots: Vec<Option<u16>> = expected
            .iter()
            .map(|&want| {
                let pos = rest.iter().position(|&p| want != 0 && p == want)?;
                Some(rest.remove(pos))
            })
            .collect();

        let mut leftovers = rest.into_iter();
        for slot in slots.iter_mut().filter(|s| s.is_none()) {
            *slot = leftovers.next();
        }
        let mut detected: Vec<u16> = slots.into_iter().flatten().collect();
        detected.extend(leftovers);
        self.detected = detected;
    }
}
