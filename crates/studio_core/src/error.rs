//! Error types shared by the mesh builder, the body factories and the stepper.

/// Errors raised while building or stepping a simulation.
#[derive(Debug)]
pub enum SimError {
    /// Grid resolution below 2 points on some axis. Nothing was built.
    InvalidTopology { nx: u32, ny: u32, nz: u32 },
    /// Construction-time parameter rejected (negative mass, bad extents, ...)
    InvalidParameter(String),
    /// A synced rigid body had no readable transform this frame.
    MissingMotionState(u32),
    /// The physics world could not complete a step. Never retried.
    WorldStepFailure(String),
    /// A frame was delivered while the stepper was not `Ready`.
    NotReady(String),
    /// A handle that the physics world does not know about.
    UnknownHandle(String),
    /// File system error while loading or saving configuration
    Io(std::io::Error),
    /// JSON (de)serialization error
    Json(String),
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::InvalidTopology { nx, ny, nz } => write!(
                f,
                "Invalid topology: grid needs at least 2 points per axis, got {}x{}x{}",
                nx, ny, nz
            ),
            SimError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            SimError::MissingMotionState(handle) => {
                write!(f, "Missing motion state for rigid body {}", handle)
            }
            SimError::WorldStepFailure(msg) => write!(f, "World step failure: {}", msg),
            SimError::NotReady(state) => write!(f, "Stepper not ready (state: {})", state),
            SimError::UnknownHandle(msg) => write!(f, "Unknown handle: {}", msg),
            SimError::Io(e) => write!(f, "IO error: {}", e),
            SimError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for SimError {}

impl From<std::io::Error> for SimError {
    fn from(e: std::io::Error) -> Self {
        SimError::Io(e)
    }
}

impl From<serde_json::Error> for SimError {
    fn from(e: serde_json::Error) -> Self {
        SimError::Json(e.to_string())
    }
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
