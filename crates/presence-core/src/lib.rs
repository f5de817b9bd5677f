//! presence-core: anti-spoofing (liveness) engine for the attendance kiosk.
//!
//! Fuses four hand-tuned liveness signals computed from a face crop into a
//! single real/fake verdict: micro-texture, depth/shadow structure, dense
//! optical flow against the previous frame, and a coarse eye-distance blink
//! proxy. The face detector and embedding model are external collaborators;
//! this crate only consumes their crops, boxes and landmarks.

pub mod blink;
pub mod config;
pub mod contours;
pub mod crop;
pub mod depth;
pub mod edges;
pub mod flow;
pub mod imgops;
pub mod liveness;
pub mod motion;
pub mod texture;
pub mod types;

pub use blink::{BlinkDetector, BlinkObservation, EyeDistanceHistory};
pub use config::{ConfigError, LivenessConfig};
pub use crop::{extract_face, select_detections, CropError, FACE_CROP_SIZE};
pub use liveness::{LivenessEngine, LivenessVerdict, Method, ScoreMap};
pub use types::{BoundingBox, Detection, Landmarks};
