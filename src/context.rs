//! Saga identity types and the per-run correlation context

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub ::uuid::Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the raw UUID
            pub fn get(&self) -> ::uuid::Uuid {
                self.0
            }
        }

        impl From<$name> for ::uuid::Uuid {
            fn from(id: $name) -> ::uuid::Uuid {
                id.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pub(crate) use record_id;

record_id!(
    /// Unique identifier for one saga run
    SagaInstanceId
);
record_id!(
    /// Unique identifier for a step record within a run
    SagaStepId
);
record_id!(
    /// Unique identifier for a saga log line
    SagaLogId
);

/// Current wall-clock time in milliseconds since UNIX epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Correlation context handed to observers for every lifecycle callback
#[derive(Clone)]
pub struct SagaContext {
    /// The run being observed
    pub instance_id: SagaInstanceId,
    /// Human-readable run name
    pub saga_name: Box<str>,
    /// When the run started (millis since UNIX epoch)
    pub started_at_millis: u64,
}

impl SagaContext {
    pub fn new(instance_id: SagaInstanceId, saga_name: &str, started_at_millis: u64) -> Self {
        Self {
            instance_id,
            saga_name: saga_name.into(),
            started_at_millis,
        }
    }

    /// Milliseconds since the run started
    pub fn elapsed_millis(&self) -> u64 {
        now_millis().saturating_sub(self.started_at_millis)
    }
}

impl std::fmt::Debug for SagaContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaContext")
            .field("instance_id", &self.instance_id)
            .field("saga_name", &self.saga_name)
            .finish()
    }
}
