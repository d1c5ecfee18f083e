//! Playback intents routed to whichever application owns the system media session.
//!
//! Commands are delivered as simulated media keys, so the overlay never holds a
//! reference to a particular player. Success only means the OS accepted the
//! input event; whether an application reacted is unknowable from here.

use crate::error::ControlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaCommand {
    Play,
    Pause,
    Next,
    Previous,
}

impl MediaCommand {
    /// The OS only exposes a toggling play/pause key, so Play and Pause share it.
    pub fn key(self) -> MediaKey {
        match self {
            MediaCommand::Play | MediaCommand::Pause => MediaKey::PlayPause,
            MediaCommand::Next => MediaKey::NextTrack,
            MediaCommand::Previous => MediaKey::PreviousTrack,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaCommand::Play => "Play",
            MediaCommand::Pause => "Pause",
            MediaCommand::Next => "Next",
            MediaCommand::Previous => "Previous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKey {
    PlayPause,
    NextTrack,
    PreviousTrack,
}

impl MediaKey {
    pub fn virtual_key(self) -> u16 {
        match self {
            MediaKey::PlayPause => 0xB3,
            MediaKey::NextTrack => 0xB0,
            MediaKey::PreviousTrack => 0xB1,
        }
    }
}

/// Injects a full key press (down + up) into the OS input queue.
pub trait KeyInjector {
    fn inject(&self, key: MediaKey) -> Result<(), ControlError>;
}

pub struct MediaCommandDispatcher {
    injector: Box<dyn KeyInjector>,
}

impl MediaCommandDispatcher {
    pub fn new(injector: Box<dyn KeyInjector>) -> Self {
        Self { injector }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemKeyInjector))
    }

    /// Fire-and-forget. A rejected injection is reported once and never retried.
    pub fn send(&self, command: MediaCommand) -> Result<(), ControlError> {
        let key = command.key();
        match self.injector.inject(key) {
            Ok(()) => {
                log::debug!("{} sent as {key:?}", command.label());
                Ok(())
            }
            Err(err) => {
                log::warn!("{} not delivered: {err}", command.label());
                Err(err)
            }
        }
    }
}

pub struct SystemKeyInjector;

#[cfg(target_os = "windows")]
impl KeyInjector for SystemKeyInjector {
    fn inject(&self, key: MediaKey) -> Result<(), ControlError> {
        use windows::Win32::Foundation::GetLastError;
        use windows::Win32::UI::Input::KeyboardAndMouse::{
            SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS,
            KEYEVENTF_KEYUP, VIRTUAL_KEY,
        };

        let keyboard = |flags: KEYBD_EVENT_FLAGS| INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 {
                ki: KEYBDINPUT {
                    wVk: VIRTUAL_KEY(key.virtual_key()),
                    wScan: 0,
                    dwFlags: flags,
                    time: 0,
                    dwExtraInfo: 0,
                },
            },
        };
        let inputs = [keyboard(KEYBD_EVENT_FLAGS(0)), keyboard(KEYEVENTF_KEYUP)];

        let sent = unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) };
        if sent as usize == inputs.len() {
            Ok(())
        } else {
            let last_error = unsafe { GetLastError() };
            Err(ControlError::InjectionFailed(format!(
                "SendInput accepted {sent} of {} events ({last_error:?})",
                inputs.len()
            )))
        }
    }
}

#[cfg(not(target_os = "windows"))]
impl KeyInjector for SystemKeyInjector {
    fn inject(&self, key: MediaKey) -> Result<(), ControlError> {
        Err(ControlError::InjectionFailed(format!(
            "{key:?} injection is only supported on Windows"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct RecordingInjector {
        sent: Rc<RefCell<Vec<MediaKey>>>,
        reject: bool,
    }

    impl KeyInjector for RecordingInjector {
        fn inject(&self, key: MediaKey) -> Result<(), ControlError> {
            self.sent.borrow_mut().push(key);
            if self.reject {
                Err(ControlError::InjectionFailed("protected input".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn commands_map_to_media_keys() {
        let injector = RecordingInjector::default();
        let dispatcher = MediaCommandDispatcher::new(Box::new(injector.clone()));

        for command in [
            MediaCommand::Previous,
            MediaCommand::Play,
            MediaCommand::Pause,
            MediaCommand::Next,
        ] {
            dispatcher.send(command).unwrap();
        }

        assert_eq!(
            *injector.sent.borrow(),
            vec![
                MediaKey::PreviousTrack,
                MediaKey::PlayPause,
                MediaKey::PlayPause,
                MediaKey::NextTrack
            ]
        );
    }

    #[test]
    fn rejected_injection_is_not_retried() {
        let injector = RecordingInjector {
            reject: true,
            ..Default::default()
        };
        let dispatcher = MediaCommandDispatcher::new(Box::new(injector.clone()));

        let err = dispatcher.send(MediaCommand::Next).unwrap_err();
        assert!(matches!(err, ControlError::InjectionFailed(_)));
        assert_eq!(injector.sent.borrow().len(), 1);
    }

    #[test]
    fn virtual_key_codes_match_the_os_table() {
        assert_eq!(MediaKey::PlayPause.virtual_key(), 0xB3);
        assert_eq!(MediaKey::NextTrack.virtual_key(), 0xB0);
        assert_eq!(MediaKey::PreviousTrack.virtual_key(), 0xB1);
    }
}
