pub mod audio;
pub mod config;
pub mod error;
pub mod listen;
pub mod logging;

pub use crate::audio::file::{FileSource, SourceMetadata};
pub use crate::audio::microphone::{list_input_devices, DeviceSpec, Microphone};
pub use crate::audio::source::AudioSource;
pub use crate::audio::{SourceError, SourceFormat};
pub use crate::config::schema::CaptureConfig;
pub use crate::error::{CaptureError, Result};
pub use crate::listen::clip::AudioClip;
pub use crate::listen::listener::{BackgroundListener, Listener};
pub use crate::listen::{ListenConfig, ListenError};
