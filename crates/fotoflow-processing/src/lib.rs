//! Fotoflow Processing Library
//!
//! Upload policy validation plus the two derivative generators the worker
//! dispatches to: bounded-box image resizing (in-process, `image` crate) and
//! ffmpeg-based video transcoding/thumbnailing/preview cutting.

pub mod ffmpeg;
pub mod image_derive;
pub mod validator;

pub use ffmpeg::FfmpegService;
pub use image_derive::{fit_within, ImageDeriver, BOUND_LARGE, BOUND_MEDIUM, BOUND_SMALL};
pub use validator::{UploadValidator, ValidationError};
