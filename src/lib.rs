//! Signal-triggered single-frame capture.
//!
//! A [CaptureSession] owns an opened camera, its stream grabber and one
//! grab buffer. The [CaptureLoop] runs one acquisition cycle per
//! [Control::Trigger], ignores triggers while a cycle is in flight and
//! writes every frame as a plain PGM. The [Forwarder] is the other end: it
//! turns console input into trigger signals.

pub use camera::*;
pub use capture::{save_frame, CaptureLoop, CycleReport, LoopEvent, LoopStats};
pub use config::{CameraSettings, CaptureConfig, OutputFormat};
pub use error::{Error, ForwardError, PgmError, Result, SdkError};
pub use forward::{Delivery, Forwarder};
pub use frame::{Buffer, BufferHandle, Frame, FrameOrTimeout, GrabFailure};
pub use roi::Roi;
pub use session::{CaptureOutcome, CaptureSession};
pub use trigger::{Control, TriggerSignal};

pub mod camera;
pub mod capture;
pub mod config;
pub mod error;
pub mod forward;
pub mod frame;
pub mod pgm;
pub mod roi;
pub mod session;
pub mod sim;
pub mod trigger;
