//! Audio subsystem module

pub mod buffer;
#[cfg(feature = "microphone")]
pub mod capture;
#[cfg(feature = "microphone")]
pub mod device;
pub mod source;
pub mod tone;

pub use buffer::{CaptureBuffer, Sample};
#[cfg(feature = "microphone")]
pub use capture::MicCapture;
#[cfg(feature = "microphone")]
pub use device::{list_input_devices, InputDeviceInfo};
pub use source::{sample_queue, QueueSource, SampleSink, SampleSource};
pub use tone::{ToneCapture, ToneGenerator};
