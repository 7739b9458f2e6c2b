//! HTTP front end for the enhancement pipeline.
//!
//! ## Routes
//!
//! - `GET /` - upload form
//! - `POST /enhance` - multipart upload (`file` field), returns the result page
//!   with noisy and enhanced players plus an `enhanced.wav` download
//! - `POST /api/enhance` - same upload, returns the enhanced WAV directly
//! - `GET /health` - model and server status
//!
//! The enhancement model is created once at startup and shared by every
//! request behind a mutex, so at most one inference runs at a time.

pub mod page;
mod routes;

pub use routes::{router, serve, ApiError, AppState};
