pub mod microphone;
pub mod wav;

// Capture is only wired up where cpal is a dependency.
#[cfg(any(windows, target_os = "macos"))]
pub mod recorder;

pub use microphone::default_microphone;
