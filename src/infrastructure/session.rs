//! Session Bootstrap
//!
//! Finds the robot, connects, locates the control characteristic and hands
//! back a running dispatcher. The whole chain races a single timeout: whichever
//! of {robot ready, deadline} comes first decides the outcome.

use crate::domain::models::{DispatcherState, RobotIdentity, SessionState};
use crate::domain::peripheral::{LinkError, PeripheralLink};
use crate::domain::settings::Settings;
use crate::infrastructure::dispatcher::{
    DispatchError, DispatchStats, Dispatcher, DispatcherConfig, DispatcherHandle,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Default bootstrap window
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("robot not found within {0:?}")]
    Timeout(Duration),

    #[error("control characteristic not found: {0}")]
    Discovery(String),

    #[error("BLE link failed: {0}")]
    Link(String),

    #[error(transparent)]
    Dispatcher(#[from] DispatchError),
}

impl From<LinkError> for SessionError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::Discovery(msg) => Self::Discovery(msg),
            LinkError::Adapter(msg) => Self::Link(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub identity: RobotIdentity,
    pub timeout: Duration,
    pub dispatcher: DispatcherConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: RobotIdentity::default(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl From<&Settings> for SessionConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            identity: settings.robot.clone(),
            timeout: settings.connect_timeout(),
            dispatcher: DispatcherConfig::from(settings),
        }
    }
}

/// Drives one bootstrap attempt and publishes its progress
pub struct SessionBootstrap {
    config: SessionConfig,
    state: watch::Sender<SessionState>,
}

impl SessionBootstrap {
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Searching);
        Self { config, state }
    }

    /// Follow the Searching → Connecting → Ready progression
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn establish<L: PeripheralLink>(
        self,
        link: &mut L,
    ) -> Result<Session, SessionError> {
        let timeout = self.config.timeout;
        let identity = &self.config.identity;
        let state = &self.state;

        let discovery = async {
            publish(state, SessionState::Searching);
            let peripheral = link.scan(identity).await?;

            publish(state, SessionState::Connecting);
            let writer = link.connect(peripheral, identity).await?;
            Ok::<_, SessionError>(writer)
        };

        let writer = match tokio::time::timeout(timeout, discovery).await {
            Ok(Ok(writer)) => writer,
            Ok(Err(e)) => {
                error!("Session bootstrap failed: {}", e);
                publish(&self.state, SessionState::Closed);
                return Err(e);
            }
            Err(_) => {
                error!("Timed out finding robot {}", identity.device_id);
                publish(&self.state, SessionState::Closed);
                return Err(SessionError::Timeout(timeout));
            }
        };

        let dispatcher = match Dispatcher::start(writer, self.config.dispatcher.clone()) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                publish(&self.state, SessionState::Closed);
                return Err(e.into());
            }
        };

        info!("Robot {} ready", identity.device_id);
        publish(&self.state, SessionState::Ready);

        Ok(Session {
            dispatcher,
            state: self.state,
        })
    }
}

fn publish(state: &watch::Sender<SessionState>, next: SessionState) {
    debug!("Session {}", next);
    state.send_replace(next);
}

/// Bootstrap with default progress reporting.
pub async fn establish<L: PeripheralLink>(
    link: &mut L,
    config: SessionConfig,
) -> Result<Session, SessionError> {
    SessionBootstrap::new(config).establish(link).await
}

/// A connected robot
pub struct Session {
    dispatcher: Dispatcher,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// `Closed` as soon as the dispatcher has stopped, e.g. after a halting write failure
    pub fn state(&self) -> SessionState {
        if self.dispatcher.state() == DispatcherState::Stopped {
            return SessionState::Closed;
        }
        *self.state.borrow()
    }

    /// Enqueue handle for whatever component issues commands
    pub fn handle(&self) -> DispatcherHandle {
        self.dispatcher.handle()
    }

    /// Drain queued commands and close.
    pub async fn close(self) -> DispatchStats {
        let stats = self.dispatcher.shutdown().await;
        publish(&self.state, SessionState::Closed);
        info!("Session closed");
        stats
    }
}
