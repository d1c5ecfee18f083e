use std::time::{Duration, Instant};

use crate::error::{ensure_in_range, ControlError};

pub const VOLUME_MIN: i32 = 0;
pub const VOLUME_MAX: i32 = 100;

/// Cached view of the default render endpoint. The OS stays the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VolumeState {
    pub level: i32,
    pub muted: bool,
}

/// Master volume controls of one audio endpoint.
pub trait EndpointVolume {
    /// Master level as a 0.0..=1.0 scalar.
    fn scalar(&self) -> Result<f32, ControlError>;
    fn set_scalar(&self, scalar: f32) -> Result<(), ControlError>;
    fn muted(&self) -> Result<bool, ControlError>;
    fn set_muted(&self, muted: bool) -> Result<(), ControlError>;
}

/// Resolves whichever endpoint is currently the default one.
pub type EndpointResolver = Box<dyn Fn() -> Result<Box<dyn EndpointVolume>, ControlError>>;

/// Volume and mute of the default render endpoint.
///
/// The endpoint is resolved again for every operation, so a change of default
/// device (or a device appearing after startup) is picked up by the next call.
pub struct AudioSessionBridge {
    resolve: EndpointResolver,
    cached: Option<VolumeState>,
    call_budget: Duration,
}

impl AudioSessionBridge {
    pub fn new(resolve: EndpointResolver, call_budget: Duration) -> Self {
        Self {
            resolve,
            cached: None,
            call_budget,
        }
    }

    /// Bridge over the OS default render endpoint.
    pub fn system(call_budget: Duration) -> Self {
        Self::new(Box::new(default_endpoint), call_budget)
    }

    /// Last state confirmed by the OS, if any call has succeeded yet.
    pub fn cached(&self) -> Option<VolumeState> {
        self.cached
    }

    pub fn set_call_budget(&mut self, budget: Duration) {
        self.call_budget = budget;
    }

    pub fn get_volume(&mut self) -> Result<VolumeState, ControlError> {
        let endpoint = self.endpoint()?;
        self.store(Self::read(endpoint.as_ref(), self.call_budget)?)
    }

    /// Clamps `level` into 0..=100, writes it and re-reads the endpoint.
    /// On failure the cache is left untouched.
    pub fn set_volume(&mut self, level: i32) -> Result<VolumeState, ControlError> {
        let level = level.clamp(VOLUME_MIN, VOLUME_MAX);
        let scalar = level as f32 / VOLUME_MAX as f32;
        let endpoint = self.endpoint()?;
        timed("SetMasterVolumeLevelScalar", self.call_budget, || {
            endpoint.set_scalar(scalar)
        })?;
        log::debug!("master volume set to {level}");
        self.store(Self::read(endpoint.as_ref(), self.call_budget)?)
    }

    /// Flips mute and leaves the level alone.
    pub fn toggle_mute(&mut self) -> Result<VolumeState, ControlError> {
        let endpoint = self.endpoint()?;
        let muted = timed("GetMute", self.call_budget, || endpoint.muted())?;
        timed("SetMute", self.call_budget, || endpoint.set_muted(!muted))?;
        log::debug!("master mute set to {}", !muted);
        self.store(Self::read(endpoint.as_ref(), self.call_budget)?)
    }

    /// Adopts a reading taken elsewhere (the snapshot worker) into the cache.
    /// Returns true if the cached view changed.
    pub fn sync_external(&mut self, state: VolumeState) -> bool {
        let state = VolumeState {
            level: state.level.clamp(VOLUME_MIN, VOLUME_MAX),
            muted: state.muted,
        };
        if self.cached == Some(state) {
            return false;
        }
        self.cached = Some(state);
        true
    }

    fn endpoint(&self) -> Result<Box<dyn EndpointVolume>, ControlError> {
        timed("GetDefaultAudioEndpoint", self.call_budget, || (self.resolve)())
    }

    fn store(&mut self, state: VolumeState) -> Result<VolumeState, ControlError> {
        self.cached = Some(state);
        Ok(state)
    }

    fn read(endpoint: &dyn EndpointVolume, budget: Duration) -> Result<VolumeState, ControlError> {
        let scalar = timed("GetMasterVolumeLevelScalar", budget, || endpoint.scalar())?;
        let muted = timed("GetMute", budget, || endpoint.muted())?;
        let level = ensure_in_range(scalar_to_level(scalar), 0, VOLUME_MAX as i64)?;
        Ok(VolumeState {
            level: level as i32,
            muted,
        })
    }
}

fn scalar_to_level(scalar: f32) -> i64 {
    if !scalar.is_finite() {
        return i64::MIN;
    }
    (scalar as f64 * VOLUME_MAX as f64).round() as i64
}

/// Runs a synchronous OS call and warns when it exceeds `budget`. The result is
/// passed through untouched, so an OS-reported failure is never mistaken for a hang.
pub fn timed<T>(
    what: &str,
    budget: Duration,
    call: impl FnOnce() -> Result<T, ControlError>,
) -> Result<T, ControlError> {
    let started = Instant::now();
    let result = call();
    let elapsed = started.elapsed();
    if elapsed > budget {
        log::warn!("{what} took {elapsed:?} (budget {budget:?})");
    }
    if let Err(err) = &result {
        log::warn!("{what} failed: {err}");
    }
    result
}

#[cfg(target_os = "windows")]
fn default_endpoint() -> Result<Box<dyn EndpointVolume>, ControlError> {
    Ok(Box::new(wasapi::WasapiEndpoint::open()?))
}

#[cfg(not(target_os = "windows"))]
fn default_endpoint() -> Result<Box<dyn EndpointVolume>, ControlError> {
    Err(ControlError::DeviceUnavailable(
        "system volume control is only supported on Windows".into(),
    ))
}

#[cfg(target_os = "windows")]
mod wasapi {
    use windows::Win32::{
        Media::Audio::{
            eConsole, eRender, Endpoints::IAudioEndpointVolume, IMMDeviceEnumerator,
            MMDeviceEnumerator,
        },
        System::Com::{CoCreateInstance, CLSCTX_ALL, COINIT_APARTMENTTHREADED},
    };

    use super::EndpointVolume;
    use crate::{com::ComApartment, error::hresult::to_audio_error, error::ControlError};

    pub struct WasapiEndpoint {
        volume: IAudioEndpointVolume,
        // Dropped after `volume`.
        _apartment: ComApartment,
    }

    impl WasapiEndpoint {
        pub fn open() -> Result<Self, ControlError> {
            let apartment = ComApartment::enter(COINIT_APARTMENTTHREADED).map_err(|e| {
                ControlError::DeviceUnavailable(format!("COM init failed: {e:?}"))
            })?;

            let volume = unsafe {
                let enumerator: IMMDeviceEnumerator =
                    CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                        .map_err(to_audio_error)?;
                let device = enumerator
                    .GetDefaultAudioEndpoint(eRender, eConsole)
                    .map_err(to_audio_error)?;
                device
                    .Activate::<IAudioEndpointVolume>(CLSCTX_ALL, None)
                    .map_err(to_audio_error)?
            };

            Ok(Self {
                volume,
                _apartment: apartment,
            })
        }
    }

    impl EndpointVolume for WasapiEndpoint {
        fn scalar(&self) -> Result<f32, ControlError> {
            unsafe { self.volume.GetMasterVolumeLevelScalar() }.map_err(to_audio_error)
        }

        fn set_scalar(&self, scalar: f32) -> Result<(), ControlError> {
            unsafe {
                self.volume
                    .SetMasterVolumeLevelScalar(scalar.clamp(0.0, 1.0), std::ptr::null())
            }
            .map_err(to_audio_error)
        }

        fn muted(&self) -> Result<bool, ControlError> {
            unsafe { self.volume.GetMute() }
                .map(|muted| muted.as_bool())
                .map_err(to_audio_error)
        }

        fn set_muted(&self, muted: bool) -> Result<(), ControlError> {
            unsafe { self.volume.SetMute(muted, std::ptr::null()) }.map_err(to_audio_error)
        }
    }
}
