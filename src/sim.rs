//! Simulated transport layer.
//!
//! Implements the SDK traits in memory so the capture flow can run without
//! camera hardware. Each acquisition start consumes one scripted [SimShot];
//! an empty script produces a moving gradient over the configured region.
//! A [Gate] can hold exposures open until a test releases them.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::camera::{
    AcquisitionParams, Camera, DeviceClass, DeviceInfo, GrabSettings,
    StreamGrabber, TransportLayer, TriggerSelector,
};
use crate::error::SdkError;
use crate::frame::{Buffer, BufferHandle, Frame, GrabFailure};
use crate::roi::Roi;

/// Error code the simulated grabber reports for canceled buffers.
pub const CANCELED_CODE: u32 = 0xE100_0014;
/// Error code for parameter writes the simulated device rejects.
pub const OUT_OF_RANGE_CODE: u32 = 0x8000_0001;
/// Accepted range of `ExposureTimeRaw`.
pub const MIN_EXPOSURE_RAW: u32 = 100;
pub const MAX_EXPOSURE_RAW: u32 = 1_000_000;

/// What the next exposure produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimShot {
    Gradient,
    Frame { width: u32, height: u32, pixels: Vec<u8> },
    Failure { code: u32, description: String },
    Timeout,
}

/// Snapshot of what the simulated SDK has been asked to do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimStats {
    pub camera_open: bool,
    pub grabber_open: bool,
    pub grab_prepared: bool,
    pub acquisitions: usize,
    pub cancels: usize,
    pub registered: Vec<BufferHandle>,
    pub queued: Vec<BufferHandle>,
    pub pending_results: usize,
    pub params: Option<AcquisitionParams>,
    pub grab_settings: Option<GrabSettings>,
}

struct SimState {
    sensor: (u32, u32),
    script: VecDeque<SimShot>,
    armed: Option<SimShot>,
    queue: VecDeque<Buffer>,
    results: VecDeque<Frame>,
    registered: Vec<BufferHandle>,
    next_handle: u64,
    camera_open: bool,
    grabber_open: bool,
    grab_settings: Option<GrabSettings>,
    params: Option<AcquisitionParams>,
    acquisitions: usize,
    cancels: usize,
}

impl SimState {
    fn roi(&self) -> Roi {
        self.params.as_ref().map_or(Roi::full_sensor(self.sensor.0, self.sensor.1), |p| p.roi)
    }

    fn expose(&mut self, shot: SimShot, mut buffer: Buffer) -> Frame {
        match shot {
            SimShot::Gradient => {
                let roi = self.roi();
                let (width, height) = (roi.width, roi.height);
                if buffer.capacity() < roi.area() {
                    return too_small(buffer, roi.area());
                }
                let span = (width + height).saturating_sub(2).max(1) as usize;
                let shift = self.acquisitions.saturating_sub(1);
                for y in 0..height as usize {
                    for x in 0..width as usize {
                        let value = ((x + y) * 255 / span + shift) % 256;
                        buffer.as_mut_slice()[y * width as usize + x] = value as u8;
                    }
                }
                Frame::succeeded(width, height, buffer)
            }
            SimShot::Frame { width, height, pixels } => {
                if buffer.capacity() < pixels.len() {
                    return too_small(buffer, pixels.len());
                }
                buffer.as_mut_slice()[..pixels.len()].copy_from_slice(&pixels);
                Frame::succeeded(width, height, buffer)
            }
            SimShot::Failure { code, description } => {
                Frame::failed(buffer, GrabFailure { code, description })
            }
            SimShot::Timeout => unreachable!("timeouts never expose a buffer"),
        }
    }
}

fn too_small(buffer: Buffer, needed: usize) -> Frame {
    let description = format!("payload of {needed} bytes exceeds buffer of {}", buffer.capacity());
    Frame::failed(buffer, GrabFailure { code: OUT_OF_RANGE_CODE, description })
}

type Shared = Arc<Mutex<SimState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, SimState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases one held exposure per call to [Gate::release].
#[derive(Debug, Clone)]
pub struct Gate(Sender<()>);

impl Gate {
    pub fn release(&self) {
        let _ = self.0.send(());
    }
}

/// Read access to the simulated SDK while a session owns it.
#[derive(Clone)]
pub struct SimProbe {
    shared: Shared,
}

impl SimProbe {
    pub fn stats(&self) -> SimStats {
        let state = lock(&self.shared);
        SimStats {
            camera_open: state.camera_open,
            grabber_open: state.grabber_open,
            grab_prepared: state.grab_settings.is_some(),
            acquisitions: state.acquisitions,
            cancels: state.cancels,
            registered: state.registered.clone(),
            queued: state.queue.iter().map(Buffer::handle).collect(),
            pending_results: state.results.len(),
            params: state.params.clone(),
            grab_settings: state.grab_settings,
        }
    }

    pub fn push_shot(&self, shot: SimShot) {
        lock(&self.shared).script.push_back(shot);
    }
}

pub struct SimTransport {
    class: DeviceClass,
    devices: Vec<DeviceInfo>,
    shared: Shared,
    gate: Mutex<Option<Receiver<()>>>,
}

impl SimTransport {
    /// One simulated camera with the given sensor size.
    pub fn new(class: DeviceClass, sensor_width: u32, sensor_height: u32) -> Self {
        let device = DeviceInfo {
            model_name: "SimCam".to_string(),
            serial_number: "00000001".to_string(),
            device_class: class,
        };
        let state = SimState {
            sensor: (sensor_width, sensor_height),
            script: VecDeque::new(),
            armed: None,
            queue: VecDeque::new(),
            results: VecDeque::new(),
            registered: Vec::new(),
            next_handle: 1,
            camera_open: false,
            grabber_open: false,
            grab_settings: None,
            params: None,
            acquisitions: 0,
            cancels: 0,
        };
        Self {
            class,
            devices: vec![device],
            shared: Arc::new(Mutex::new(state)),
            gate: Mutex::new(None),
        }
    }

    /// Like [SimTransport::new], failing the way a missing transport layer
    /// does when the sensor has no pixels.
    pub fn create(class: DeviceClass, sensor_width: u32, sensor_height: u32) -> Result<Self, SdkError> {
        if sensor_width == 0 || sensor_height == 0 {
            return Err(SdkError::TransportUnavailable {
                reason: format!("{class}: empty sensor {sensor_width}x{sensor_height}"),
            });
        }
        Ok(Self::new(class, sensor_width, sensor_height))
    }

    pub fn without_devices(mut self) -> Self {
        self.devices.clear();
        self
    }

    pub fn with_script<I: IntoIterator<Item = SimShot>>(self, shots: I) -> Self {
        lock(&self.shared).script.extend(shots);
        self
    }

    /// Hold every exposure until the returned gate is released.
    pub fn gated(self) -> (Self, Gate) {
        let (tx, rx) = mpsc::channel();
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        (self, Gate(tx))
    }

    pub fn probe(&self) -> SimProbe {
        SimProbe { shared: self.shared.clone() }
    }
}

impl TransportLayer for SimTransport {
    type Camera = SimCamera;

    fn device_class(&self) -> DeviceClass {
        self.class
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, SdkError> {
        Ok(self.devices.clone())
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<SimCamera, SdkError> {
        if !self.devices.contains(info) {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("device {} not attached", info.serial_number),
            });
        }
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(SimCamera { info: info.clone(), shared: self.shared.clone(), gate })
    }
}

pub struct SimCamera {
    info: DeviceInfo,
    shared: Shared,
    gate: Option<Receiver<()>>,
}

impl SimCamera {
    fn open_state(&self) -> Result<MutexGuard<'_, SimState>, SdkError> {
        let state = lock(&self.shared);
        if !state.camera_open {
            return Err(SdkError::NotOpen { component: "camera" });
        }
        Ok(state)
    }
}

impl Camera for SimCamera {
    type Grabber = SimGrabber;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open(&mut self) -> Result<(), SdkError> {
        lock(&self.shared).camera_open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SdkError> {
        lock(&self.shared).camera_open = false;
        Ok(())
    }

    fn sensor_size(&self) -> Result<(u32, u32), SdkError> {
        Ok(self.open_state()?.sensor)
    }

    fn is_trigger_available(&self, selector: TriggerSelector) -> bool {
        match self.info.device_class {
            DeviceClass::GigE => true,
            DeviceClass::Ieee1394 => selector == TriggerSelector::FrameStart,
        }
    }

    fn configure(&mut self, params: &AcquisitionParams) -> Result<(), SdkError> {
        let mut state = self.open_state()?;
        let (width, height) = state.sensor;
        if !params.roi.fits(width, height) {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("AOI {:?} exceeds sensor {width}x{height}", params.roi),
            });
        }
        if !(MIN_EXPOSURE_RAW..=MAX_EXPOSURE_RAW).contains(&params.exposure_time_raw) {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("ExposureTimeRaw {} out of range", params.exposure_time_raw),
            });
        }
        if let Some(selector) = params.triggers_off.iter().find(|s| !self.is_trigger_available(**s)) {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("TriggerSelector {selector:?} not available"),
            });
        }
        state.params = Some(params.clone());
        Ok(())
    }

    fn payload_size(&self) -> Result<usize, SdkError> {
        let state = self.open_state()?;
        Ok(state.roi().area())
    }

    fn stream_grabber(&mut self, index: usize) -> Result<SimGrabber, SdkError> {
        self.open_state()?;
        if index != 0 {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("stream grabber {index} does not exist"),
            });
        }
        Ok(SimGrabber { shared: self.shared.clone(), gate: self.gate.take() })
    }

    fn acquisition_start(&mut self) -> Result<(), SdkError> {
        let mut state = self.open_state()?;
        let shot = state.script.pop_front().unwrap_or(SimShot::Gradient);
        debug!(?shot, "simulated acquisition start");
        state.acquisitions += 1;
        state.armed = Some(shot);
        Ok(())
    }
}

pub struct SimGrabber {
    shared: Shared,
    gate: Option<Receiver<()>>,
}

impl SimGrabber {
    fn open_state(&self) -> Result<MutexGuard<'_, SimState>, SdkError> {
        let state = lock(&self.shared);
        if !state.grabber_open {
            return Err(SdkError::NotOpen { component: "stream grabber" });
        }
        Ok(state)
    }
}

impl StreamGrabber for SimGrabber {
    fn open(&mut self) -> Result<(), SdkError> {
        lock(&self.shared).grabber_open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SdkError> {
        lock(&self.shared).grabber_open = false;
        Ok(())
    }

    fn prepare_grab(&mut self, settings: &GrabSettings) -> Result<(), SdkError> {
        self.open_state()?.grab_settings = Some(*settings);
        Ok(())
    }

    fn finish_grab(&mut self) -> Result<(), SdkError> {
        let mut state = self.open_state()?;
        if let Some(buffer) = state.queue.front() {
            return Err(SdkError::BufferBusy { handle: buffer.handle() });
        }
        state.grab_settings = None;
        state.results.clear();
        Ok(())
    }

    fn register_buffer(&mut self, memory: Vec<u8>) -> Result<Buffer, SdkError> {
        let mut state = self.open_state()?;
        let settings = state
            .grab_settings
            .ok_or(SdkError::NotOpen { component: "grab" })?;
        if state.registered.len() >= settings.max_num_buffer {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("MaxNumBuffer {} reached", settings.max_num_buffer),
            });
        }
        if memory.len() > settings.max_buffer_size {
            return Err(SdkError::Device {
                code: OUT_OF_RANGE_CODE,
                description: format!("buffer exceeds MaxBufferSize {}", settings.max_buffer_size),
            });
        }
        let handle = BufferHandle(state.next_handle);
        state.next_handle += 1;
        state.registered.push(handle);
        Ok(Buffer::new(handle, memory))
    }

    fn deregister_buffer(&mut self, buffer: Buffer) -> Result<Vec<u8>, SdkError> {
        let mut state = self.open_state()?;
        let handle = buffer.handle();
        let position = state
            .registered
            .iter()
            .position(|h| *h == handle)
            .ok_or(SdkError::UnknownBuffer { handle })?;
        state.registered.remove(position);
        Ok(buffer.into_memory())
    }

    fn queue_buffer(&mut self, buffer: Buffer) -> Result<(), SdkError> {
        let mut state = self.open_state()?;
        let handle = buffer.handle();
        if !state.registered.contains(&handle) {
            return Err(SdkError::UnknownBuffer { handle });
        }
        state.queue.push_back(buffer);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, SdkError> {
        if let Some(gate) = &self.gate {
            if let Err(RecvTimeoutError::Timeout) = gate.recv_timeout(timeout) {
                return Ok(false);
            }
        }

        let mut state = self.open_state()?;
        if !state.results.is_empty() {
            return Ok(true);
        }
        let shot = match state.armed.take() {
            Some(SimShot::Timeout) | None => None,
            Some(shot) => Some(shot),
        };
        let buffer = match shot {
            Some(_) => state.queue.pop_front(),
            None => None,
        };
        match (shot, buffer) {
            (Some(shot), Some(buffer)) => {
                let frame = state.expose(shot, buffer);
                state.results.push_back(frame);
                Ok(true)
            }
            _ => {
                drop(state);
                if self.gate.is_none() {
                    thread::sleep(timeout);
                }
                Ok(false)
            }
        }
    }

    fn retrieve_result(&mut self) -> Option<Frame> {
        lock(&self.shared).results.pop_front()
    }

    fn cancel_grab(&mut self) -> Result<(), SdkError> {
        let mut state = self.open_state()?;
        state.armed = None;
        state.cancels += 1;
        while let Some(buffer) = state.queue.pop_front() {
            let failure = GrabFailure { code: CANCELED_CODE, description: "Grab canceled".to_string() };
            state.results.push_back(Frame::failed(buffer, failure));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(transport: &SimTransport) -> (SimCamera, SimGrabber) {
        let info = transport.enumerate_devices().unwrap().remove(0);
        let mut camera = transport.create_device(&info).unwrap();
        camera.open().unwrap();
        camera.configure(&AcquisitionParams::single_frame(Roi::full_sensor(4, 2))).unwrap();
        let mut grabber = camera.stream_grabber(0).unwrap();
        grabber.open().unwrap();
        grabber
            .prepare_grab(&GrabSettings { max_buffer_size: 8, max_num_buffer: 1, socket_buffer_size: 127 })
            .unwrap();
        (camera, grabber)
    }

    #[test]
    fn gradient_fills_configured_region() {
        let transport = SimTransport::new(DeviceClass::GigE, 4, 2);
        let (mut camera, mut grabber) = prepared(&transport);
        let buffer = grabber.register_buffer(vec![0; 8]).unwrap();
        grabber.queue_buffer(buffer).unwrap();

        camera.acquisition_start().unwrap();
        assert!(grabber.wait(Duration::from_millis(10)).unwrap());
        let frame = grabber.retrieve_result().unwrap();
        assert!(frame.is_success());
        assert_eq!((frame.width(), frame.height()), (4, 2));
        assert_eq!(frame.pixel(0, 0), Some(0));
        assert_eq!(frame.pixel(3, 1), Some(255));
    }

    #[test]
    fn cancel_returns_queued_buffers_as_results() {
        let transport = SimTransport::new(DeviceClass::GigE, 4, 2).with_script([SimShot::Timeout]);
        let (mut camera, mut grabber) = prepared(&transport);
        let buffer = grabber.register_buffer(vec![0; 8]).unwrap();
        let handle = buffer.handle();
        grabber.queue_buffer(buffer).unwrap();

        camera.acquisition_start().unwrap();
        assert!(!grabber.wait(Duration::from_millis(5)).unwrap());
        assert!(matches!(grabber.finish_grab(), Err(SdkError::BufferBusy { .. })));

        grabber.cancel_grab().unwrap();
        let frame = grabber.retrieve_result().unwrap();
        assert_eq!(frame.buffer_handle(), handle);
        assert_eq!(frame.failure().map(|f| f.code), Some(CANCELED_CODE));
        assert!(grabber.retrieve_result().is_none());
    }

    #[test]
    fn only_one_buffer_may_be_registered() {
        let transport = SimTransport::new(DeviceClass::GigE, 4, 2);
        let (_camera, mut grabber) = prepared(&transport);
        grabber.register_buffer(vec![0; 8]).unwrap();
        assert!(grabber.register_buffer(vec![0; 8]).is_err());
    }

    #[test]
    fn empty_sensor_has_no_transport() {
        assert!(matches!(
            SimTransport::create(DeviceClass::GigE, 0, 480),
            Err(SdkError::TransportUnavailable { .. })
        ));
        assert!(SimTransport::create(DeviceClass::GigE, 1, 1).is_ok());
    }

    #[test]
    fn ieee1394_has_no_acquisition_start_trigger() {
        let transport = SimTransport::new(DeviceClass::Ieee1394, 4, 2);
        let info = transport.enumerate_devices().unwrap().remove(0);
        let camera = transport.create_device(&info).unwrap();
        assert!(!camera.is_trigger_available(TriggerSelector::AcquisitionStart));
        assert!(camera.is_trigger_available(TriggerSelector::FrameStart));
    }
}
