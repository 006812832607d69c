//! Capability detection

use super::host::PushHost;
use super::types::PermissionState;

/// True iff notification, worker registration and push manager are all present
pub fn is_supported(host: &dyn PushHost) -> bool {
    host.capabilities().is_supported()
}

/// Permission snapshot; `Unsupported` when the host lacks a capability
pub fn permission_state(host: &dyn PushHost) -> PermissionState {
    if !is_supported(host) {
        return PermissionState::Unsupported;
    }
    host.permission().into()
}
