use serde::{Deserialize, Serialize};

/// State reported by a daemon through its status API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum DaemonState {
    Init,
    Ready,
    Running,
    Upgrading,
    Interrupted,
    Stopped,
    Unknown,
}

impl DaemonState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonState::Init => "INIT",
            DaemonState::Ready => "READY",
            DaemonState::Running => "RUNNING",
            DaemonState::Upgrading => "UPGRADING",
            DaemonState::Interrupted => "INTERRUPTED",
            DaemonState::Stopped => "STOPPED",
            DaemonState::Unknown => "UNKNOWN",
        }
    }
}

impl std::str::FromStr for DaemonState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "INIT" => DaemonState::Init,
            "READY" => DaemonState::Ready,
            "RUNNING" => DaemonState::Running,
            "UPGRADING" => DaemonState::Upgrading,
            "INTERRUPTED" => DaemonState::Interrupted,
            "STOPPED" => DaemonState::Stopped,
            _ => DaemonState::Unknown,
        })
    }
}

impl From<String> for DaemonState {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(state) => state,
            Err(never) => match never {},
        }
    }
}

impl std::fmt::Display for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Response of the daemon status endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub version: Option<serde_json::Value>,
    pub state: DaemonState,
}
