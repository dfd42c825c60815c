//! Clients for the external services the pipeline depends on.
//!
//! Each service sits behind an async trait so the pipeline can be driven
//! by scripted fakes in tests:
//!
//! - [`planner::Planner`] (OpenAI chat completions)
//! - [`speech::SpeechSynth`] (ElevenLabs)
//! - [`image::ImageGenerator`] (Gemini)
//! - [`video::VideoSynth`] (xAI image-to-video)
//! - [`transcribe::Transcriber`] (OpenAI Whisper)
//! - [`storage::ObjectStore`] (Supabase storage)
//! - [`render::MediaRenderer`] (ffmpeg)

pub mod captions;
pub mod error;
pub mod http;
pub mod image;
pub mod planner;
pub mod render;
pub mod speech;
pub mod storage;
pub mod transcribe;
pub mod video;

pub use error::ProviderError;
