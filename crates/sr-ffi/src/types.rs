/// Status codes returned by `sr_init`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SRStatus {
    Ok = 0,
    ErrorInvalidArgument = 1,
    ErrorConfig = 2,
    ErrorBackend = 3,
    ErrorInternal = 4,
    ErrorAlreadyInitialised = 5,
}

/// Handle value returned by a failed `sr_load`.
pub const SR_NULL_HANDLE: u64 = 0;
