pub mod parse;
pub mod realtime;
pub mod request;
pub mod runtime;
pub mod supabase;
pub mod webhook;
