//! Connectivity state machine
//!
//! ```text
//! Polling ──> Connected
//!    │
//!    └──> FallbackPending ──> ApActive ──> HandshakeInProgress ──> Polling
//!              ^                                   │
//!              └───────────────────────────────────┘ (failure)
//! ```
//!
//! All probe calls go through one lock, so no two external commands issued
//! by the machine ever overlap. The only suspension points are the poll
//! interval and the two handshake grace delays; all of them end early on
//! shutdown.

use crate::{
    error::{Cancelled, CommandError},
    network_probe::{ConnectionStatus, NetworkProbe, ScanResult},
    services::{credentials::NetworkCredentials, next_stage::NextStage, shutdown::ShutdownSignal},
};
use anyhow::{Context, Result, ensure};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    fmt,
    sync::{
        Mutex as StdMutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Mutex, mpsc, watch};

/// Bounded attempt count plus fixed interval of one polling session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryBudget {
    max_attempts: u32,
    interval: Duration,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self> {
        ensure!(max_attempts > 0, "retry budget needs at least one attempt");

        Ok(Self {
            max_attempts,
            interval,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectivitySettings {
    pub retry_budget: RetryBudget,
    /// Retries of the scan taken right before the AP goes up
    pub scan_retries: u32,
    /// Wait before the AP is torn down, so the HTTP answer still gets out
    pub response_grace: Duration,
    /// Wait between AP teardown and the new network definition
    pub teardown_grace: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Polling,
    Connected,
    FallbackPending,
    ApActive,
    HandshakeInProgress,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectivityState::Polling => "polling",
            ConnectivityState::Connected => "connected",
            ConnectivityState::FallbackPending => "fallback pending",
            ConnectivityState::ApActive => "AP active",
            ConnectivityState::HandshakeInProgress => "handshake in progress",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Connected,
    Exhausted,
}

/// Why a credential submission was not accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// Another handshake is still running
    Busy,
    /// The machine is not offering provisioning right now
    NotProvisioning(ConnectivityState),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Busy => write!(f, "a network change is already in progress"),
            SubmitError::NotProvisioning(state) => {
                write!(f, "not accepting networks while {state}")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state: ConnectivityState,
    pub connected_network: Option<String>,
    pub known_networks: Vec<String>,
}

pub struct ConnectivityStateMachine<P, N> {
    probe: Mutex<P>,
    next_stage: N,
    settings: ConnectivitySettings,
    shutdown: ShutdownSignal,
    state: watch::Sender<ConnectivityState>,
    preliminary_scan: StdMutex<Option<ScanResult>>,
    submissions_tx: mpsc::Sender<NetworkCredentials>,
    submissions_rx: Mutex<mpsc::Receiver<NetworkCredentials>>,
    handed_off: AtomicBool,
}

impl<P, N> ConnectivityStateMachine<P, N>
where
    P: NetworkProbe + Send + Sync,
    N: NextStage + Sync,
{
    pub fn new(
        probe: P,
        next_stage: N,
        settings: ConnectivitySettings,
        shutdown: ShutdownSignal,
    ) -> Self {
        let (state, _) = watch::channel(ConnectivityState::Polling);
        let (submissions_tx, submissions_rx) = mpsc::channel(1);

        Self {
            probe: Mutex::new(probe),
            next_stage,
            settings,
            shutdown,
            state,
            preliminary_scan: StdMutex::new(None),
            submissions_tx,
            submissions_rx: Mutex::new(submissions_rx),
            handed_off: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state.subscribe()
    }

    /// Network list captured on the most recent AP entry
    pub fn preliminary_scan(&self) -> Option<ScanResult> {
        self.preliminary_scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, next: ConnectivityState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("connectivity: {previous} -> {next}");
        }
    }

    /// Move to `next` only from a state `from` accepts; atomic with respect
    /// to submissions
    fn transition(
        &self,
        next: ConnectivityState,
        from: impl Fn(ConnectivityState) -> bool,
    ) -> bool {
        let mut previous = next;

        let changed = self.state.send_if_modified(|state| {
            previous = *state;
            if *state != next && from(*state) {
                *state = next;
                true
            } else {
                false
            }
        });

        if changed {
            info!("connectivity: {previous} -> {next}");
        }

        changed
    }

    /// Poll the supplicant with a fresh retry budget
    ///
    /// Probe failures count as "not connected yet". Returns as soon as one
    /// poll reports `COMPLETED`.
    pub async fn wait_for_connection(&self) -> Result<PollOutcome, Cancelled> {
        let budget = self.settings.retry_budget;
        let max_attempts = budget.max_attempts();

        self.set_state(ConnectivityState::Polling);

        for attempt in 1..=max_attempts {
            let status = self.probe.lock().await.status().await;

            match status {
                Ok(status) if status.is_connected() => {
                    info!("wifi connection found on attempt {attempt}");
                    self.set_state(ConnectivityState::Connected);
                    return Ok(PollOutcome::Connected);
                }
                Ok(status) => {
                    info!("no wifi connection on attempt {attempt}/{max_attempts}: {status}")
                }
                Err(e) => warn!(
                    "status check failed on attempt {attempt}/{max_attempts} ({}): {e}",
                    e.kind()
                ),
            }

            if attempt < max_attempts {
                self.shutdown.sleep(budget.interval()).await?;
            }
        }

        warn!("giving up, no wifi connection after {max_attempts} attempts");
        self.set_state(ConnectivityState::FallbackPending);

        Ok(PollOutcome::Exhausted)
    }

    /// Scan while the radio still can, then start broadcasting
    ///
    /// A submission accepted while this runs keeps the machine in
    /// `HandshakeInProgress`.
    pub async fn enter_ap_mode(&self) -> Result<()> {
        self.transition(ConnectivityState::FallbackPending, |state| {
            state != ConnectivityState::HandshakeInProgress
        });

        let probe = self.probe.lock().await;

        let scan = match probe.scan(self.settings.scan_retries).await {
            Ok(scan) => scan,
            Err(e) => {
                warn!("preliminary scan failed ({}): {e}", e.kind());
                ScanResult::default()
            }
        };
        info!("preliminary scan found {} networks", scan.len());
        *self
            .preliminary_scan
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(scan);

        probe
            .start_ap()
            .await
            .context("failed to start access point")?;
        drop(probe);

        info!("no wifi found, access point is up");
        if !self.transition(ConnectivityState::ApActive, |state| {
            state == ConnectivityState::FallbackPending
        }) {
            debug!("credentials already submitted, staying in {}", self.state());
        }

        Ok(())
    }

    /// Networks to offer on the provisioning page
    ///
    /// A live scan wins when it finds anything; otherwise the preliminary
    /// scan is served. During a handshake the radio is left alone.
    pub async fn network_list(&self) -> ScanResult {
        if self.state() != ConnectivityState::HandshakeInProgress {
            let live = self.probe.lock().await.scan(0).await;

            match live {
                Ok(live) if !live.is_empty() => return live,
                Ok(_) => debug!("live scan is empty, serving preliminary scan"),
                Err(e) => warn!("live scan failed ({}), serving preliminary scan: {e}", e.kind()),
            }
        }

        self.preliminary_scan().unwrap_or_default()
    }

    /// Queue a handshake for `credentials`
    ///
    /// Only one handshake is accepted at a time; the machine moves to
    /// `HandshakeInProgress` before this returns, so a concurrent second
    /// submission is rejected with [`SubmitError::Busy`].
    pub fn submit_credentials(&self, credentials: NetworkCredentials) -> Result<(), SubmitError> {
        let mut previous = ConnectivityState::Polling;

        let accepted = self.state.send_if_modified(|state| {
            previous = *state;
            match state {
                ConnectivityState::FallbackPending | ConnectivityState::ApActive => {
                    *state = ConnectivityState::HandshakeInProgress;
                    true
                }
                _ => false,
            }
        });

        if !accepted {
            return Err(match previous {
                ConnectivityState::HandshakeInProgress => SubmitError::Busy,
                other => SubmitError::NotProvisioning(other),
            });
        }

        info!(
            "connectivity: {previous} -> {}",
            ConnectivityState::HandshakeInProgress
        );

        if let Err(e) = self.submissions_tx.try_send(credentials) {
            error!("failed to queue credentials: {e}");
            self.set_state(previous);
            return Err(SubmitError::Busy);
        }

        Ok(())
    }

    /// Enter AP mode and serve submissions until one gets the device online
    ///
    /// A failed handshake is not retried; the access point is brought back
    /// and the next submission is awaited.
    pub async fn provision(&self) -> Result<()> {
        if let Err(e) = self.enter_ap_mode().await {
            error!("{e:#}");
        }

        let mut submissions = self.submissions_rx.lock().await;

        loop {
            let credentials = tokio::select! {
                _ = self.shutdown.cancelled() => return Err(Cancelled.into()),
                credentials = submissions.recv() => {
                    credentials.context("credential queue closed")?
                }
            };

            let ssid = credentials.ssid().to_string();

            match self.run_handshake(&credentials).await {
                Ok(PollOutcome::Connected) => {
                    self.hand_off().await;
                    return Ok(());
                }
                Ok(PollOutcome::Exhausted) => {
                    warn!("no connection to {ssid} after the network was defined")
                }
                Err(e) if e.downcast_ref::<Cancelled>().is_some() => return Err(e),
                Err(e) => {
                    error!(
                        "failed to bring up wifi for {ssid} ({}): {e:#}",
                        failure_kind(&e)
                    );
                    self.set_state(ConnectivityState::FallbackPending);
                }
            }
            drop(credentials);

            if let Err(e) = self.enter_ap_mode().await {
                error!("{e:#}");
            }
        }
    }

    async fn run_handshake(&self, credentials: &NetworkCredentials) -> Result<PollOutcome> {
        info!("switching to network {}", credentials.ssid());

        self.shutdown.sleep(self.settings.response_grace).await?;

        self.probe
            .lock()
            .await
            .stop_ap()
            .await
            .context("failed to stop access point")?;

        self.shutdown.sleep(self.settings.teardown_grace).await?;

        self.probe
            .lock()
            .await
            .define_network(credentials)
            .await
            .context("failed to define network")?;

        Ok(self.wait_for_connection().await?)
    }

    /// Run the next stage; only the first call per process does anything
    pub async fn hand_off(&self) {
        if self.handed_off.swap(true, Ordering::SeqCst) {
            debug!("next stage already launched");
            return;
        }

        match self.probe.lock().await.connected_network().await {
            Ok(Some(ssid)) => info!("connected to {ssid}"),
            Ok(None) => info!("connected"),
            Err(e) => warn!("failed to read connected network ({}): {e}", e.kind()),
        }

        if let Err(e) = self.next_stage.launch().await {
            error!("{e:#}");
        }
    }

    pub async fn status_report(&self) -> Result<StatusReport> {
        let probe = self.probe.lock().await;

        let connected_network = probe
            .connected_network()
            .await
            .context("failed to read connected network")?;
        let known_networks = probe
            .known_networks()
            .await
            .context("failed to list known networks")?;

        Ok(StatusReport {
            state: self.state(),
            connected_network,
            known_networks,
        })
    }
}

/// Log label of the command failure behind `e`, if any
fn failure_kind(e: &anyhow::Error) -> &'static str {
    e.downcast_ref::<CommandError>()
        .map_or("other", CommandError::kind)
}
