//! Camera SDK surface.
//!
//! The vendor SDK is reached through three traits mirroring its object
//! model: a [TransportLayer] enumerates and creates devices, a [Camera]
//! exposes its feature nodes and acquisition start, and a [StreamGrabber]
//! owns the buffer queue and delivers grab results.

use std::fmt;
use std::time::Duration;

use paste::paste;
use serde::{Deserialize, Serialize};

use crate::error::SdkError;
use crate::frame::{Buffer, Frame, FrameOrTimeout};
use crate::roi::Roi;

/// Physical interface a transport layer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum DeviceClass {
    #[serde(rename = "1394")]
    #[value(name = "1394")]
    Ieee1394,
    #[serde(rename = "gige")]
    #[value(name = "gige")]
    GigE,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Ieee1394 => f.write_str("BaslerIIDC1394"),
            DeviceClass::GigE => f.write_str("BaslerGigE"),
        }
    }
}

/// Entry of a device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model_name: String,
    pub serial_number: String,
    pub device_class: DeviceClass,
}

/// 8-bit pixel formats; every sample is written as one grey value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Mono8,
    #[serde(rename = "bayer_bg8")]
    BayerBG8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Every image is started by [Camera::acquisition_start].
    SingleFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    /// Exposure lasts `exposure_time_raw`.
    Timed,
}

/// Hardware trigger a camera may wait on before exposing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSelector {
    AcquisitionStart,
    FrameStart,
}

/// Everything [Camera::configure] writes to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionParams {
    pub pixel_format: PixelFormat,
    pub roi: Roi,
    pub acquisition_mode: AcquisitionMode,
    pub exposure_mode: ExposureMode,
    pub exposure_time_raw: u32,
    /// Triggers to switch off; the caller only lists available ones.
    pub triggers_off: Vec<TriggerSelector>,
}

macro_rules! acquisition_param {
    ($($name:ident: $ty:ty),* $(,)?) => {
        paste! {
            impl AcquisitionParams {
                $(
                    pub fn [<with_ $name>](mut self, value: $ty) -> Self {
                        self.$name = value;
                        self
                    }
                )*
            }
        }
    };
}

acquisition_param! {
    pixel_format: PixelFormat,
    roi: Roi,
    acquisition_mode: AcquisitionMode,
    exposure_mode: ExposureMode,
    exposure_time_raw: u32,
}

impl AcquisitionParams {
    /// Single-frame, timed exposure over the given region.
    pub fn single_frame(roi: Roi) -> Self {
        Self {
            pixel_format: PixelFormat::Mono8,
            roi,
            acquisition_mode: AcquisitionMode::SingleFrame,
            exposure_mode: ExposureMode::Timed,
            exposure_time_raw: 30000,
            triggers_off: Vec::new(),
        }
    }

    pub fn with_trigger_off(mut self, selector: TriggerSelector) -> Self {
        if !self.triggers_off.contains(&selector) {
            self.triggers_off.push(selector);
        }
        self
    }
}

/// Stream grabber parameters that must be fixed before `prepare_grab`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrabSettings {
    pub max_buffer_size: usize,
    pub max_num_buffer: usize,
    pub socket_buffer_size: u32,
}

pub trait TransportLayer {
    type Camera: Camera;

    fn device_class(&self) -> DeviceClass;

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, SdkError>;

    fn create_device(&self, info: &DeviceInfo) -> Result<Self::Camera, SdkError>;
}

pub trait Camera: Send {
    type Grabber: StreamGrabber;

    fn info(&self) -> &DeviceInfo;

    fn open(&mut self) -> Result<(), SdkError>;

    fn close(&mut self) -> Result<(), SdkError>;

    /// Maximum width and height of the sensor.
    fn sensor_size(&self) -> Result<(u32, u32), SdkError>;

    fn is_trigger_available(&self, selector: TriggerSelector) -> bool;

    fn configure(&mut self, params: &AcquisitionParams) -> Result<(), SdkError>;

    /// Byte size of one full frame under the current configuration.
    fn payload_size(&self) -> Result<usize, SdkError>;

    fn stream_grabber(&mut self, index: usize) -> Result<Self::Grabber, SdkError>;

    /// Let the camera acquire one image; in single-frame mode every image
    /// must be started this way.
    fn acquisition_start(&mut self) -> Result<(), SdkError>;
}

pub trait StreamGrabber: Send {
    fn open(&mut self) -> Result<(), SdkError>;

    fn close(&mut self) -> Result<(), SdkError>;

    /// Allocate grab resources. Image size must not change until
    /// [StreamGrabber::finish_grab].
    fn prepare_grab(&mut self, settings: &GrabSettings) -> Result<(), SdkError>;

    fn finish_grab(&mut self) -> Result<(), SdkError>;

    fn register_buffer(&mut self, memory: Vec<u8>) -> Result<Buffer, SdkError>;

    /// Buffers must not be queued when deregistered.
    fn deregister_buffer(&mut self, buffer: Buffer) -> Result<Vec<u8>, SdkError>;

    fn queue_buffer(&mut self, buffer: Buffer) -> Result<(), SdkError>;

    /// Block until a result is ready. `false` on timeout.
    fn wait(&mut self, timeout: Duration) -> Result<bool, SdkError>;

    /// Pop the next result from the result queue.
    fn retrieve_result(&mut self) -> Option<Frame>;

    /// Abort pending grabs; queued buffers come back as failed results.
    fn cancel_grab(&mut self) -> Result<(), SdkError>;

    fn wait_and_retrieve(&mut self, timeout: Duration) -> Result<FrameOrTimeout, SdkError> {
        if !self.wait(timeout)? {
            return Ok(FrameOrTimeout::Timeout);
        }
        Ok(match self.retrieve_result() {
            Some(frame) => FrameOrTimeout::Frame(frame),
            None => FrameOrTimeout::Timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_setters_chain() {
        let params = AcquisitionParams::single_frame(Roi::full_sensor(640, 480))
            .with_pixel_format(PixelFormat::BayerBG8)
            .with_exposure_time_raw(12000)
            .with_trigger_off(TriggerSelector::FrameStart)
            .with_trigger_off(TriggerSelector::FrameStart);
        assert_eq!(params.pixel_format, PixelFormat::BayerBG8);
        assert_eq!(params.exposure_time_raw, 12000);
        assert_eq!(params.acquisition_mode, AcquisitionMode::SingleFrame);
        assert_eq!(params.triggers_off, vec![TriggerSelector::FrameStart]);
    }

    #[test]
    fn pixel_format_names_in_config() {
        let fmt: PixelFormat = serde_json::from_str("\"bayer_bg8\"").unwrap();
        assert_eq!(fmt, PixelFormat::BayerBG8);
        assert!(serde_json::from_str::<PixelFormat>("\"yuv422_packed\"").is_err());
    }
}
