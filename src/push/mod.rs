//! Page-side push coordination: capability detection, SDK readiness and the
//! subscription lifecycle

pub mod capability;
pub mod gate;
pub mod host;
pub mod manager;
pub mod types;

pub use capability::{is_supported, permission_state};
pub use gate::{ReadinessGate, ReadinessState, ReadyOutcome};
pub use host::{AnalyticsSdk, Capabilities, PushHost};
pub use manager::SubscriptionManager;
pub use types::{
    EncodedSubscription, FailureReason, NotificationPermission, OperationResult, PermissionState,
    PushError, Subscription, SubscriptionKeys,
};
