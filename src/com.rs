use windows::{
    core::HRESULT,
    Win32::{
        Foundation::RPC_E_CHANGED_MODE,
        System::Com::{CoInitializeEx, CoUninitialize, COINIT},
    },
};

/// Keeps COM initialised on the current thread for as long as it lives.
///
/// If the thread already joined an apartment with a different model the
/// existing apartment is reused and nothing is uninitialised on drop.
pub struct ComApartment {
    owned: bool,
}

impl ComApartment {
    pub fn enter(model: COINIT) -> std::result::Result<Self, HRESULT> {
        let hr = unsafe { CoInitializeEx(None, model) };
        if hr.is_ok() {
            Ok(Self { owned: true })
        } else if hr == RPC_E_CHANGED_MODE {
            Ok(Self { owned: false })
        } else {
            Err(hr)
        }
    }
}

impl Drop for ComApartment {
    fn drop(&mut self) {
        if self.owned {
            unsafe {
                CoUninitialize();
            }
        }
    }
}
