//! Vehicle tracking, speed estimation and over-speed notification over a
//! video stream.
//!
//! An [`Engine`] owns the current [`Session`]. Selecting a source starts a new
//! session; [`Engine::stream`] yields the annotated frames of the current one
//! as MJPEG multipart parts while [`Engine::report`] serves the violation
//! table to any number of concurrent readers.

pub mod annotate;
pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod math;
pub mod mjpeg;
pub mod notify;
pub mod owner;
pub mod pipeline;
pub mod plate;
pub mod predictor;
pub mod record;
pub mod session;
pub mod source;
pub mod speed;
pub mod tracker;
pub mod violation;

mod history;
mod track;

pub use config::Config;
pub use detection::Detection;
pub use detector::{DetectionLog, Detector, StaticDetector};
pub use error::{BoxError, Error};
pub use frame::Frame;
pub use notify::{LogNotifier, Notifier};
pub use owner::{Owner, OwnerRegistry, OwnerResolver};
pub use pipeline::FrameLoop;
pub use plate::{CommandTextReader, NoTextReader, Plate, TextReader};
pub use record::{ReportEntry, ViolationRecord};
pub use session::{Collaborators, Engine, Session};
pub use source::MediaSource;
pub use track::{Sample, Track};
pub use tracker::TrackManager;
pub use violation::Violation;
