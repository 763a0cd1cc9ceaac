//! Connection session
//!
//! Owns the provider and the peripheral handle for one connection attempt
//! and walks the session state machine:
//!
//! ```text
//! Disconnected -> Connecting -> DiscoveringServices -> Subscribing -> Streaming -> Disconnected
//! ```
//!
//! Startup failures (not found, connect, missing characteristic) are returned
//! as errors. Once streaming, the session only wakes up for the periodic
//! liveness check; notifications arrive on the provider's own context and
//! are decoded straight into the transfer channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use super::diagnostics;
use super::locator;
use super::provider::{BleProvider, GattService, NotificationCallback, PeripheralHandle};
use super::transfer::ReadingSender;
use crate::config::{AppConfig, ChannelBinding};
use crate::decoder;
use crate::error::{BioStreamError, Result, ResultExt};
use crate::lifecycle::{StopReason, StopSignal};
use crate::types::{SessionPhase, SignalKind};

/// How a session that reached streaming came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The stop signal fired
    Stopped,
    /// The liveness check found the link down
    PeripheralLost,
}

/// Reference point for `Reading::elapsed_seconds`
///
/// Starts when the first subscription succeeds. A notification racing ahead
/// of that moment starts it instead, so elapsed time never goes negative.
#[derive(Debug, Clone, Default)]
pub struct StreamClock(Arc<OnceLock<Instant>>);

impl StreamClock {
    /// Start the clock if it is not running yet and return its origin
    pub fn start(&self) -> Instant {
        *self.0.get_or_init(Instant::now)
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.0.get().copied()
    }

    /// Seconds since the origin, starting the clock if needed
    pub fn elapsed_seconds(&self) -> f64 {
        self.start().elapsed().as_secs_f64()
    }
}

/// Live state of a connected session
#[derive(Debug)]
pub struct SessionState {
    pub handle: PeripheralHandle,
    pub subscribed: Vec<(SignalKind, Uuid)>,
    /// Reference point for `elapsed_seconds`
    pub clock: StreamClock,
    pub connected: bool,
}

/// Summary handed back when the session finishes
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub peripheral_id: Option<String>,
    pub peripheral_name: Option<String>,
    /// Whether both startup and subscription completed
    pub streamed: bool,
    pub subscribed: Vec<(SignalKind, Uuid)>,
    pub streaming_secs: f64,
}

impl SessionReport {
    fn stopped_before_streaming() -> Self {
        Self {
            outcome: SessionOutcome::Stopped,
            peripheral_id: None,
            peripheral_name: None,
            streamed: false,
            subscribed: Vec::new(),
            streaming_secs: 0.0,
        }
    }
}

/// One connection attempt against the target peripheral
pub struct ConnectionSession<P: BleProvider> {
    provider: P,
    config: Arc<AppConfig>,
    stop: StopSignal,
    phase: SessionPhase,
    state: Option<SessionState>,
}

impl<P: BleProvider> ConnectionSession<P> {
    /// Create a session; nothing happens until [`ConnectionSession::run`]
    pub fn new(provider: P, config: Arc<AppConfig>, stop: StopSignal) -> Self {
        Self {
            provider,
            config,
            stop,
            phase: SessionPhase::Disconnected,
            state: None,
        }
    }

    /// Current phase of the state machine
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Give the provider back, e.g. to inspect a simulator
    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Run the whole session: locate, connect, discover, subscribe, stream
    ///
    /// Returns once the stop signal fires or the link is lost. The peripheral
    /// is disconnected exactly once before returning, on success and on every
    /// failure after connecting.
    pub fn run(&mut self, sender: ReadingSender) -> Result<SessionReport> {
        let result = self.start(sender);

        let report = match result {
            Ok(true) => {
                let outcome = self.stream();
                Ok(self.report(outcome))
            }
            Ok(false) => {
                tracing::info!("Stop requested before streaming started");
                Ok(self
                    .state
                    .as_ref()
                    .map(|_| self.report(SessionOutcome::Stopped))
                    .unwrap_or_else(SessionReport::stopped_before_streaming))
            }
            Err(e) => Err(e),
        };

        self.release();
        report
    }

    /// Everything up to streaming; `Ok(false)` means the stop signal won
    fn start(&mut self, sender: ReadingSender) -> Result<bool> {
        let device = &self.config.device;
        let target = locator::discover(&mut self.provider, device)?;
        if self.stop.is_stopped() {
            return Ok(false);
        }

        self.set_phase(SessionPhase::Connecting);
        let timeout = self.config.session.connect_timeout();
        let handle = self
            .provider
            .connect(&target, timeout)
            .with_context(|| format!("Failed to connect to {}", target))?;
        tracing::info!("connected to {} ({})", handle.name(), handle.id());
        self.state = Some(SessionState {
            handle,
            subscribed: Vec::new(),
            clock: StreamClock::default(),
            connected: true,
        });
        if self.stop.is_stopped() {
            return Ok(false);
        }

        self.set_phase(SessionPhase::DiscoveringServices);
        let services = self.discover_services()?;
        if self.stop.is_stopped() {
            return Ok(false);
        }

        self.set_phase(SessionPhase::Subscribing);
        self.subscribe_all(&services, sender)?;

        self.set_phase(SessionPhase::Streaming);
        Ok(true)
    }

    fn discover_services(&mut self) -> Result<Vec<GattService>> {
        let state = self.state.as_ref().ok_or(BioStreamError::Disconnected)?;
        let services = self
            .provider
            .enumerate(&state.handle)
            .context("Failed to enumerate services")?;

        tracing::info!("begin to extract all of its services");
        let report = diagnostics::walk(&mut self.provider, &state.handle, &services);
        report.log();
        if report.failed_reads() > 0 {
            tracing::warn!(
                "{} diagnostic read(s) failed, continuing",
                report.failed_reads()
            );
        }
        Ok(services)
    }

    fn subscribe_all(&mut self, services: &[GattService], sender: ReadingSender) -> Result<()> {
        let policy = self.config.device.duplicate_policy;
        let sender = Arc::new(sender);
        let state = self.state.as_mut().ok_or(BioStreamError::Disconnected)?;

        for &ChannelBinding {
            kind,
            characteristic,
        } in &self.config.channels
        {
            let matches = services
                .iter()
                .flat_map(|s| s.characteristics.iter())
                .filter(|c| c.uuid == characteristic);
            let (found, count) = policy.select(matches);

            let Some(found) = found else {
                tracing::error!("{} characteristic {} not found", kind, characteristic);
                return Err(BioStreamError::CharacteristicNotFound {
                    kind,
                    uuid: characteristic,
                });
            };
            if count > 1 {
                tracing::warn!(
                    "{} characteristics share {}, using the one in service {} ({})",
                    count,
                    characteristic,
                    found.service,
                    policy
                );
            }

            let callback = notification_callback(kind, state.clock.clone(), sender.clone());
            self.provider
                .subscribe(&state.handle, found, callback)
                .with_context(|| format!("Failed to subscribe to {} ({})", kind, characteristic))?;
            state.clock.start();
            state.subscribed.push((kind, characteristic));
            tracing::info!("subscribed to {} on {}", kind, characteristic);
        }

        Ok(())
    }

    /// Idle until stop or link loss, checking liveness every interval
    fn stream(&mut self) -> SessionOutcome {
        let interval = self.config.session.liveness_interval();
        let Some(state) = self.state.as_mut() else {
            return SessionOutcome::Stopped;
        };

        loop {
            if self.stop.wait_timeout(interval) {
                tracing::info!("Stopping session: {:?}", self.stop.reason());
                return SessionOutcome::Stopped;
            }

            if !self.provider.is_connected(&state.handle) {
                tracing::warn!("Peripheral {} disconnected", state.handle.id());
                state.connected = false;
                self.stop.trigger(StopReason::PeripheralLost);
                return SessionOutcome::PeripheralLost;
            }
        }
    }

    fn report(&self, outcome: SessionOutcome) -> SessionReport {
        let state = self.state.as_ref();
        SessionReport {
            outcome,
            peripheral_id: state.map(|s| s.handle.id().to_string()),
            peripheral_name: state.map(|s| s.handle.name().to_string()),
            streamed: self.phase == SessionPhase::Streaming,
            subscribed: state.map(|s| s.subscribed.clone()).unwrap_or_default(),
            streaming_secs: state
                .and_then(|s| s.clock.started_at())
                .map(|t| t.elapsed().as_secs_f64())
                .unwrap_or(0.0),
        }
    }

    /// Disconnect if connected and drop the handle
    fn release(&mut self) {
        if let Some(state) = self.state.take() {
            tracing::info!("Disconnecting from {}", state.handle.id());
            self.provider.disconnect(&state.handle);
        }
        self.set_phase(SessionPhase::Disconnected);
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::info!("Session: {} -> {}", self.phase, phase);
            self.phase = phase;
        }
    }
}

/// Build the callback bound to one kind
///
/// Classification happens here, once; the hot path only decodes and sends.
fn notification_callback(
    kind: SignalKind,
    clock: StreamClock,
    sender: Arc<ReadingSender>,
) -> NotificationCallback {
    let warned = AtomicBool::new(false);
    Box::new(move |payload: &[u8]| {
        let elapsed = clock.elapsed_seconds();
        let reading = decoder::decode(kind, payload, elapsed);
        if let Err(e) = sender.send(reading) {
            if !warned.swap(true, Ordering::Relaxed) {
                tracing::warn!("Dropping {} notification: {}", kind.tag(), e);
            }
        }
    })
}
