use std::mem;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::camera::{
    AcquisitionParams, Camera, DeviceInfo, GrabSettings, StreamGrabber, TransportLayer,
    TriggerSelector,
};
use crate::config::CameraSettings;
use crate::error::SdkError;
use crate::frame::{Buffer, BufferHandle, Frame, FrameOrTimeout, GrabFailure};
use crate::roi::Roi;

/// Result of one acquisition cycle.
#[derive(Debug)]
pub enum CaptureOutcome<R> {
    /// The buffer was filled; `value` is what the frame callback returned.
    Captured { width: u32, height: u32, value: R },
    Failed(GrabFailure),
    TimedOut,
}

#[derive(Debug)]
enum Slot {
    Queued(BufferHandle),
    Held(Buffer),
    Lost,
}

/// An open camera with its stream grabber and the single grab buffer.
///
/// Dropping the session tears it down; [CaptureSession::close] does the
/// same and reports the first failure.
pub struct CaptureSession<C: Camera> {
    camera: C,
    grabber: C::Grabber,
    slot: Slot,
    payload_size: usize,
    closed: bool,
}

impl<C: Camera> CaptureSession<C> {
    /// Open the first camera of `transport`, configure it for software
    /// triggered single-frame acquisition and queue one buffer.
    pub fn open<T>(transport: &T, settings: &CameraSettings) -> Result<Self, SdkError>
    where
        T: TransportLayer<Camera = C>,
    {
        info!(transport = %transport.device_class(), "Get all attached cameras");
        let devices = transport.enumerate_devices()?;
        let first = devices.first().ok_or(SdkError::NoCameraPresent)?;

        info!(model = %first.model_name, serial = %first.serial_number, "Open the camera");
        let mut camera = transport.create_device(first)?;
        camera.open()?;

        let mut grabber = match camera.stream_grabber(0) {
            Ok(grabber) => grabber,
            Err(e) => {
                let _ = camera.close();
                return Err(e);
            }
        };
        let opened = grabber.open();

        let mut session = Self {
            camera,
            grabber,
            slot: Slot::Lost,
            payload_size: 0,
            closed: false,
        };
        opened?;
        session.setup(settings)?;
        Ok(session)
    }

    fn setup(&mut self, settings: &CameraSettings) -> Result<(), SdkError> {
        let (width, height) = self.camera.sensor_size()?;
        let mut params = AcquisitionParams::single_frame(Roi::full_sensor(width, height))
            .with_pixel_format(settings.pixel_format)
            .with_exposure_time_raw(settings.exposure_time_raw);
        for selector in [TriggerSelector::AcquisitionStart, TriggerSelector::FrameStart] {
            if self.camera.is_trigger_available(selector) {
                debug!(?selector, "Disable trigger");
                params = params.with_trigger_off(selector);
            }
        }
        info!(width, height, pixel_format = ?params.pixel_format, "Configure single-frame acquisition");
        self.camera.configure(&params)?;

        self.payload_size = self.camera.payload_size()?;
        self.grabber.prepare_grab(&GrabSettings {
            max_buffer_size: self.payload_size,
            max_num_buffer: 1,
            socket_buffer_size: settings.socket_buffer_size,
        })?;

        let buffer = self.grabber.register_buffer(vec![0; self.payload_size])?;
        info!(buffer = %buffer.handle(), bytes = self.payload_size, "Queue grab buffer");
        self.queue(buffer)
    }

    pub fn device(&self) -> &DeviceInfo {
        self.camera.info()
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Handle of the grab buffer while it waits in the grabber's queue.
    pub fn queued_buffer(&self) -> Option<BufferHandle> {
        match self.slot {
            Slot::Queued(handle) => Some(handle),
            _ => None,
        }
    }

    /// Start the exposure of one frame.
    pub fn arm_single_capture(&mut self) -> Result<(), SdkError> {
        self.camera.acquisition_start()
    }

    /// Run one acquisition cycle.
    ///
    /// `on_frame` sees the frame only when the grab succeeded. Whatever the
    /// outcome, the buffer is back in the grab queue when this returns `Ok`.
    pub fn capture<F, R>(&mut self, timeout: Duration, on_frame: F) -> Result<CaptureOutcome<R>, SdkError>
    where
        F: FnOnce(&Frame) -> R,
    {
        if let Slot::Held(_) = self.slot {
            self.requeue_held()?;
        }
        if let Slot::Lost = self.slot {
            return Err(SdkError::BufferLost);
        }

        self.arm_single_capture()?;
        let waited = match self.grabber.wait_and_retrieve(timeout) {
            Ok(waited) => waited,
            Err(e) => {
                // The exposure is armed; cancel it so no stale result is left.
                if let Err(recovery) = self.recover().and_then(|()| self.requeue_held()) {
                    warn!(error = %recovery, "Buffer not recovered after failed wait");
                }
                return Err(e);
            }
        };
        match waited {
            FrameOrTimeout::Frame(frame) => {
                let outcome = match frame.failure() {
                    None => CaptureOutcome::Captured {
                        width: frame.width(),
                        height: frame.height(),
                        value: on_frame(&frame),
                    },
                    Some(failure) => CaptureOutcome::Failed(failure.clone()),
                };
                self.slot = Slot::Held(frame.into_buffer());
                self.requeue_held()?;
                Ok(outcome)
            }
            FrameOrTimeout::Timeout => {
                self.recover()?;
                self.requeue_held()?;
                Ok(CaptureOutcome::TimedOut)
            }
        }
    }

    fn queue(&mut self, buffer: Buffer) -> Result<(), SdkError> {
        let handle = buffer.handle();
        self.slot = Slot::Lost;
        self.grabber.queue_buffer(buffer)?;
        self.slot = Slot::Queued(handle);
        Ok(())
    }

    fn requeue_held(&mut self) -> Result<(), SdkError> {
        match mem::replace(&mut self.slot, Slot::Lost) {
            Slot::Held(buffer) => self.queue(buffer),
            other => {
                self.slot = other;
                Ok(())
            }
        }
    }

    /// Get a queued buffer back: cancel the pending grab and drain every
    /// outstanding result. Buffers may not be deregistered while queued.
    fn recover(&mut self) -> Result<(), SdkError> {
        let Slot::Queued(handle) = self.slot else {
            return Ok(());
        };
        self.grabber.cancel_grab()?;

        let mut recovered = None;
        while let Some(frame) = self.grabber.retrieve_result() {
            if frame.buffer_handle() == handle {
                recovered = Some(frame.into_buffer());
            } else {
                warn!(buffer = %frame.buffer_handle(), "Drained result for a foreign buffer");
            }
        }
        match recovered {
            Some(buffer) => {
                self.slot = Slot::Held(buffer);
                Ok(())
            }
            None => {
                self.slot = Slot::Lost;
                Err(SdkError::BufferLost)
            }
        }
    }

    /// Release the buffer, the grab resources, the grabber and the camera.
    pub fn close(mut self) -> Result<(), SdkError> {
        self.closed = true;
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), SdkError> {
        let mut first_error = None;
        let mut note = |step: &'static str, result: Result<(), SdkError>| {
            if let Err(e) = result {
                warn!(step, error = %e, "Teardown step failed");
                first_error.get_or_insert(e);
            }
        };

        note("recover buffer", self.recover());
        if let Slot::Held(buffer) = mem::replace(&mut self.slot, Slot::Lost) {
            note("deregister buffer", self.grabber.deregister_buffer(buffer).map(drop));
        }
        note("finish grab", self.grabber.finish_grab());
        note("close stream grabber", self.grabber.close());
        note("close camera", self.camera.close());

        info!(model = %self.camera.info().model_name, "Camera closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl<C: Camera> Drop for CaptureSession<C> {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.teardown();
        }
    }
}
