//! Shared default-value helpers reused across more than one config submodule.
//! Concern-specific defaults live next to their struct; only the truly
//! generic `serde(default = ...)` helper lives here.

pub fn default_true() -> bool {
    true
}
