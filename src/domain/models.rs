use serde::{Deserialize, Serialize};
use std::fmt;

/// Default robot BLE address
pub const ROBOT_DEVICE_ID: &str = "C5:DD:FB:6A:06:9E";
/// Service carrying the Bitsnap characteristics
pub const ROBOT_SERVICE_UUID: &str = "d9d9e9e0-aa4e-4797-8151-cb41cedaf2ad";
/// Descriptor text that marks the control characteristic
pub const CONTROL_DESCRIPTOR_LABEL: &str = "Bitsnap Control";

/// Which peripheral to look for and how to recognise its control characteristic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotIdentity {
    pub device_id: String,
    pub service_uuid: String,
    pub control_label: String,
}

impl RobotIdentity {
    /// Device identifiers compare case-insensitively
    pub fn matches_device(&self, id: &str) -> bool {
        self.device_id.eq_ignore_ascii_case(id.trim())
    }

    /// Descriptor text must match the label exactly
    pub fn matches_label(&self, descriptor: &[u8]) -> bool {
        descriptor == self.control_label.as_bytes()
    }
}

impl Default for RobotIdentity {
    fn default() -> Self {
        Self {
            device_id: ROBOT_DEVICE_ID.to_string(),
            service_uuid: ROBOT_SERVICE_UUID.to_string(),
            control_label: CONTROL_DESCRIPTOR_LABEL.to_string(),
        }
    }
}

/// Pick the characteristic whose descriptors carry the control label.
///
/// `candidates` pairs each characteristic with the raw values of its
/// descriptors, in discovery order. The first match wins.
pub fn select_control_characteristic<C>(
    identity: &RobotIdentity,
    candidates: impl IntoIterator<Item = (C, Vec<Vec<u8>>)>,
) -> Option<C> {
    candidates
        .into_iter()
        .find(|(_, descriptors)| descriptors.iter().any(|d| identity.matches_label(d)))
        .map(|(characteristic, _)| characteristic)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Searching,
    Connecting,
    Ready,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Searching => "searching",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Created,
    Running,
    /// Input closed, queued commands still being written
    Draining,
    Stopped,
}

/// What the dispatcher does when `enqueue` finds the queue full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackPressure {
    /// Wait for the consumer to free a slot
    #[default]
    Block,
    /// Return `QueueFull` immediately
    FailFast,
}

/// What the consumer does after a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum WriteFailurePolicy {
    /// Log, drop the command, move on
    #[default]
    Skip,
    /// Re-issue the same frame up to `attempts` more times
    Retry { attempts: u32, backoff_ms: u64 },
    /// Stop the dispatcher on the first failure
    Halt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_match_ignores_case() {
        let identity = RobotIdentity::default();
        assert!(identity.matches_device("c5:dd:fb:6a:06:9e"));
        assert!(identity.matches_device("C5:DD:FB:6A:06:9E"));
        assert!(!identity.matches_device("C5:DD:FB:6A:06:9F"));
    }

    #[test]
    fn test_select_control_characteristic() {
        let identity = RobotIdentity::default();
        let candidates = vec![
            ("battery", vec![b"Battery Level".to_vec()]),
            ("status", vec![]),
            ("control", vec![b"Format".to_vec(), b"Bitsnap Control".to_vec()]),
            ("control-2", vec![b"Bitsnap Control".to_vec()]),
        ];
        assert_eq!(
            select_control_characteristic(&identity, candidates),
            Some("control")
        );
    }

    #[test]
    fn test_select_control_characteristic_missing() {
        let identity = RobotIdentity::default();
        let candidates = vec![("almost", vec![b"bitsnap control".to_vec()])];
        assert_eq!(select_control_characteristic(&identity, candidates), None);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Searching.to_string(), "searching");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }

    #[test]
    fn test_policy_serde() {
        let policy: WriteFailurePolicy =
            serde_json::from_str(r#"{"mode":"retry","attempts":2,"backoff_ms":50}"#).unwrap();
        assert_eq!(
            policy,
            WriteFailurePolicy::Retry {
                attempts: 2,
                backoff_ms: 50
            }
        );
        let bp: BackPressure = serde_json::from_str(r#""fail_fast""#).unwrap();
        assert_eq!(bp, BackPressure::FailFast);
    }
}
