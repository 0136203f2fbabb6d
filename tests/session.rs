use std::time::Duration;

use click::sim::{SimCamera, SimGrabber, SimShot, SimTransport};
use click::{
    AcquisitionMode, AcquisitionParams, Buffer, Camera, CameraSettings, CaptureOutcome,
    CaptureSession, DeviceClass, DeviceInfo, ExposureMode, Frame, GrabSettings, PixelFormat, Roi,
    SdkError, StreamGrabber, TransportLayer, TriggerSelector,
};

/// Simulated transport whose grabber fails its first `wait`.
struct StallingTransport(SimTransport);

struct StallingCamera(SimCamera);

struct StallingGrabber {
    inner: SimGrabber,
    failures_left: usize,
}

impl TransportLayer for StallingTransport {
    type Camera = StallingCamera;

    fn device_class(&self) -> DeviceClass {
        self.0.device_class()
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, SdkError> {
        self.0.enumerate_devices()
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<StallingCamera, SdkError> {
        self.0.create_device(info).map(StallingCamera)
    }
}

impl Camera for StallingCamera {
    type Grabber = StallingGrabber;

    fn info(&self) -> &DeviceInfo {
        self.0.info()
    }

    fn open(&mut self) -> Result<(), SdkError> {
        self.0.open()
    }

    fn close(&mut self) -> Result<(), SdkError> {
        self.0.close()
    }

    fn sensor_size(&self) -> Result<(u32, u32), SdkError> {
        self.0.sensor_size()
    }

    fn is_trigger_available(&self, selector: TriggerSelector) -> bool {
        self.0.is_trigger_available(selector)
    }

    fn configure(&mut self, params: &AcquisitionParams) -> Result<(), SdkError> {
        self.0.configure(params)
    }

    fn payload_size(&self) -> Result<usize, SdkError> {
        self.0.payload_size()
    }

    fn stream_grabber(&mut self, index: usize) -> Result<StallingGrabber, SdkError> {
        let inner = self.0.stream_grabber(index)?;
        Ok(StallingGrabber { inner, failures_left: 1 })
    }

    fn acquisition_start(&mut self) -> Result<(), SdkError> {
        self.0.acquisition_start()
    }
}

impl StreamGrabber for StallingGrabber {
    fn open(&mut self) -> Result<(), SdkError> {
        self.inner.open()
    }

    fn close(&mut self) -> Result<(), SdkError> {
        self.inner.close()
    }

    fn prepare_grab(&mut self, settings: &GrabSettings) -> Result<(), SdkError> {
        self.inner.prepare_grab(settings)
    }

    fn finish_grab(&mut self) -> Result<(), SdkError> {
        self.inner.finish_grab()
    }

    fn register_buffer(&mut self, memory: Vec<u8>) -> Result<Buffer, SdkError> {
        self.inner.register_buffer(memory)
    }

    fn deregister_buffer(&mut self, buffer: Buffer) -> Result<Vec<u8>, SdkError> {
        self.inner.deregister_buffer(buffer)
    }

    fn queue_buffer(&mut self, buffer: Buffer) -> Result<(), SdkError> {
        self.inner.queue_buffer(buffer)
    }

    fn wait(&mut self, timeout: Duration) -> Result<bool, SdkError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SdkError::Device { code: 0xe100_0001, description: "wait failed".into() });
        }
        self.inner.wait(timeout)
    }

    fn retrieve_result(&mut self) -> Option<Frame> {
        self.inner.retrieve_result()
    }

    fn cancel_grab(&mut self) -> Result<(), SdkError> {
        self.inner.cancel_grab()
    }
}

#[test]
fn gige_setup_switches_both_triggers_off() {
    let transport = SimTransport::new(DeviceClass::GigE, 640, 480);
    let probe = transport.probe();
    let session = CaptureSession::open(&transport, &CameraSettings::default()).unwrap();

    let params = probe.stats().params.unwrap();
    assert_eq!(params.roi, Roi::full_sensor(640, 480));
    assert_eq!(params.pixel_format, PixelFormat::BayerBG8);
    assert_eq!(params.acquisition_mode, AcquisitionMode::SingleFrame);
    assert_eq!(params.exposure_mode, ExposureMode::Timed);
    assert_eq!(params.exposure_time_raw, 30000);
    assert_eq!(
        params.triggers_off,
        vec![TriggerSelector::AcquisitionStart, TriggerSelector::FrameStart]
    );
    assert_eq!(session.device().device_class, DeviceClass::GigE);
}

#[test]
fn ieee1394_setup_only_touches_available_trigger() {
    let transport = SimTransport::new(DeviceClass::Ieee1394, 320, 240);
    let probe = transport.probe();
    let _session = CaptureSession::open(&transport, &CameraSettings::default()).unwrap();

    let params = probe.stats().params.unwrap();
    assert_eq!(params.triggers_off, vec![TriggerSelector::FrameStart]);
}

#[test]
fn one_buffer_of_payload_size_is_queued() {
    let transport = SimTransport::new(DeviceClass::GigE, 16, 8);
    let probe = transport.probe();
    let settings = CameraSettings { socket_buffer_size: 64, ..Default::default() };
    let session = CaptureSession::open(&transport, &settings).unwrap();

    assert_eq!(session.payload_size(), 128);
    let stats = probe.stats();
    assert_eq!(
        stats.grab_settings,
        Some(GrabSettings { max_buffer_size: 128, max_num_buffer: 1, socket_buffer_size: 64 })
    );
    assert_eq!(stats.registered.len(), 1);
    assert_eq!(stats.queued, stats.registered);
    assert_eq!(session.queued_buffer(), Some(stats.registered[0]));
    assert_eq!(stats.acquisitions, 0);
}

#[test]
fn no_camera_is_reported() {
    let transport = SimTransport::new(DeviceClass::GigE, 16, 8).without_devices();
    let err = CaptureSession::open(&transport, &CameraSettings::default()).err().unwrap();
    assert!(matches!(err, SdkError::NoCameraPresent));
}

#[test]
fn rejected_configuration_closes_the_device() {
    let transport = SimTransport::new(DeviceClass::GigE, 16, 8);
    let probe = transport.probe();
    let settings = CameraSettings { exposure_time_raw: 0, ..Default::default() };

    let err = CaptureSession::open(&transport, &settings).err().unwrap();
    assert!(matches!(err, SdkError::Device { .. }));
    let stats = probe.stats();
    assert!(!stats.camera_open && !stats.grabber_open);
}

#[test]
fn buffer_survives_a_timeout_and_is_released_on_close() {
    let transport = SimTransport::new(DeviceClass::GigE, 4, 4).with_script([SimShot::Timeout]);
    let probe = transport.probe();
    let mut session = CaptureSession::open(&transport, &CameraSettings::default()).unwrap();
    let handle = session.queued_buffer().unwrap();

    let outcome = session
        .capture(Duration::from_millis(5), |_| unreachable!("timed out"))
        .unwrap();
    assert!(matches!(outcome, CaptureOutcome::TimedOut));
    assert_eq!(session.queued_buffer(), Some(handle));

    let outcome = session.capture(Duration::from_millis(5), |frame| frame.pixel(3, 3)).unwrap();
    assert!(matches!(outcome, CaptureOutcome::Captured { width: 4, height: 4, value: Some(_) }));

    session.close().unwrap();
    let stats = probe.stats();
    assert!(stats.registered.is_empty() && stats.queued.is_empty());
    assert!(!stats.grab_prepared);
}

#[test]
fn dropping_the_session_tears_it_down() {
    let transport = SimTransport::new(DeviceClass::GigE, 4, 4);
    let probe = transport.probe();
    {
        let _session = CaptureSession::open(&transport, &CameraSettings::default()).unwrap();
        assert!(probe.stats().camera_open);
    }
    let stats = probe.stats();
    assert!(stats.registered.is_empty());
    assert!(!stats.camera_open && !stats.grabber_open);
}

#[test]
fn gradient_frames_move_between_captures() {
    let transport = SimTransport::new(DeviceClass::GigE, 4, 2);
    let mut session = CaptureSession::open(&transport, &CameraSettings::default()).unwrap();

    let mut first = Vec::new();
    session.capture(Duration::from_millis(5), |frame| first = frame.data().to_vec()).unwrap();
    let mut second = Vec::new();
    session.capture(Duration::from_millis(5), |frame| second = frame.data().to_vec()).unwrap();

    assert_eq!(first.len(), 8);
    assert_eq!(second.len(), 8);
    assert_ne!(first, second);
}

#[test]
fn failed_wait_cancels_the_armed_grab() {
    let marked = SimShot::Frame { width: 2, height: 2, pixels: vec![7, 7, 7, 7] };
    let sim = SimTransport::new(DeviceClass::GigE, 2, 2).with_script([marked]);
    let probe = sim.probe();
    let transport = StallingTransport(sim);
    let mut session = CaptureSession::open(&transport, &CameraSettings::default()).unwrap();
    let handle = session.queued_buffer().unwrap();

    let err = session.capture(Duration::from_millis(5), |_| ()).err().unwrap();
    assert!(matches!(err, SdkError::Device { code: 0xe100_0001, .. }));

    let stats = probe.stats();
    assert_eq!(stats.cancels, 1);
    assert_eq!(stats.queued, vec![handle]);
    assert_eq!(stats.pending_results, 0);
    assert_eq!(session.queued_buffer(), Some(handle));

    // The canceled exposure is gone: the next cycle sees a fresh frame.
    let outcome = session.capture(Duration::from_millis(5), |frame| frame.data().to_vec()).unwrap();
    match outcome {
        CaptureOutcome::Captured { width: 2, height: 2, value } => assert_ne!(value, vec![7, 7, 7, 7]),
        other => panic!("unexpected outcome {other:?}"),
    }
    session.close().unwrap();
}
