pub mod audio_capture;
pub mod dispatcher;
pub mod engine;
pub mod file_capture;
pub mod renderer;
pub mod session;
pub mod sync;
pub mod traits;
