use std::time::Duration;

use click::{trigger, Control, TriggerSignal};
use tokio::time::timeout;

fn raise(signal: libc::c_int) {
    assert_eq!(unsafe { libc::raise(signal) }, 0);
}

async fn next(controls: &mut tokio::sync::mpsc::Receiver<Control>) -> Option<Control> {
    timeout(Duration::from_secs(5), controls.recv()).await.expect("control in time")
}

#[tokio::test]
#[serial_test::file_serial]
async fn user1_becomes_a_trigger() {
    let mut controls = trigger::listen(TriggerSignal::User1).unwrap();

    raise(libc::SIGUSR1);
    assert_eq!(next(&mut controls).await, Some(Control::Trigger));

    raise(libc::SIGUSR1);
    assert_eq!(next(&mut controls).await, Some(Control::Trigger));
}

#[tokio::test]
#[serial_test::file_serial]
async fn sigterm_requests_shutdown_and_ends_the_stream() {
    let mut controls = trigger::listen(TriggerSignal::User1).unwrap();

    raise(libc::SIGTERM);
    assert_eq!(next(&mut controls).await, Some(Control::Shutdown));
    assert_eq!(next(&mut controls).await, None);
}

#[tokio::test]
#[serial_test::file_serial]
async fn sigint_stops_when_it_is_not_the_trigger() {
    let mut controls = trigger::listen(TriggerSignal::User1).unwrap();

    raise(libc::SIGINT);
    assert_eq!(next(&mut controls).await, Some(Control::Shutdown));
}

#[tokio::test]
#[serial_test::file_serial]
async fn sigint_as_trigger() {
    let mut controls = trigger::listen(TriggerSignal::Interrupt).unwrap();

    raise(libc::SIGINT);
    assert_eq!(next(&mut controls).await, Some(Control::Trigger));
}
