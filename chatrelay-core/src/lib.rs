pub mod codec;
pub mod config;
pub mod content;
pub mod error;
pub mod text;
pub mod types;

// Keep the public surface small and intentional.
pub use codec::*;
pub use config::*;
pub use content::*;
pub use error::*;
pub use text::*;
pub use types::*;
