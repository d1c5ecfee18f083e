use thiserror::Error;

/// Failures surfaced by the audio bridge, the media dispatcher and the window
/// controllers. None of them are fatal; the UI keeps its last known state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("no default audio render device: {0}")]
    DeviceUnavailable(String),

    #[error("access to the audio endpoint was denied: {0}")]
    AccessDenied(String),

    #[error("media key injection was rejected: {0}")]
    InjectionFailed(String),

    /// Only reachable if a caller bypasses clamping.
    #[error("value {value} outside of {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

impl ControlError {
    /// Short label for the transient "not applied" status line.
    pub fn label(&self) -> &'static str {
        match self {
            ControlError::DeviceUnavailable(_) => "Audio device unavailable",
            ControlError::AccessDenied(_) => "Audio access denied",
            ControlError::InjectionFailed(_) => "Media key not accepted",
            ControlError::OutOfRange { .. } => "Value out of range",
        }
    }
}

/// Validates that `value` lies in `min..=max`, reporting `OutOfRange` otherwise.
pub fn ensure_in_range(value: i64, min: i64, max: i64) -> Result<i64, ControlError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ControlError::OutOfRange { value, min, max })
    }
}

#[cfg(target_os = "windows")]
pub(crate) mod hresult {
    use super::ControlError;
    use windows::core::HRESULT;
    use windows::Win32::Foundation::E_ACCESSDENIED;

    const E_NOTFOUND: HRESULT = HRESULT(0x8007_0490_u32 as i32);
    const AUDCLNT_E_DEVICE_INVALIDATED: HRESULT = HRESULT(0x8889_0004_u32 as i32);

    pub fn to_audio_error(err: windows::core::Error) -> ControlError {
        let code = err.code();
        if code == E_ACCESSDENIED {
            return ControlError::AccessDenied(err.message().to_string());
        }
        let detail = if code == E_NOTFOUND {
            "no default render endpoint".to_string()
        } else if code == AUDCLNT_E_DEVICE_INVALIDATED {
            "render endpoint was removed".to_string()
        } else {
            format!("{code:?} {}", err.message())
        };
        ControlError::DeviceUnavailable(detail)
    }
}
