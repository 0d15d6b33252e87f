//! Upload ordering through the public client API.

use image::{DynamicImage, GrayImage, Luma};
use vudial_core::mocks::{MockTransport, RecordingPacer, Timeline, TimelineEvent};
use vudial_core::protocol::{DialAddress, Opcode};
use vudial_core::upload::{CHUNK_SETTLE, COMMAND_SETTLE};
use vudial_core::{CancelToken, ClientError, DialClient, UploadError};

fn client() -> (DialClient<MockTransport, RecordingPacer>, Timeline) {
    let timeline = Timeline::default();
    let client = DialClient::with_pacer(
        MockTransport::new(timeline.clone()),
        RecordingPacer::new(timeline.clone()),
    );
    (client, timeline)
}

#[test]
fn image_data_follows_clear_and_cursor_reset() {
    let (mut client, timeline) = client();
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(320, 240, |x, _| {
        Luma([(x % 256) as u8])
    }));
    client
        .upload_image(DialAddress::new(1).unwrap(), &img, &CancelToken::new())
        .unwrap();

    let events = timeline.events();
    let first_data = events
        .iter()
        .position(|e| {
            matches!(e, TimelineEvent::Sent(c) if c.opcode() == Opcode::DisplayImageData)
        })
        .unwrap();
    let before: Vec<&TimelineEvent> = events[..first_data].iter().collect();
    assert!(matches!(before[0], TimelineEvent::Sent(c) if c.opcode() == Opcode::DisplayClear));
    assert_eq!(*before[1], TimelineEvent::Settled(COMMAND_SETTLE));
    assert!(matches!(before[2], TimelineEvent::Sent(c) if c.opcode() == Opcode::DisplayGotoXY));
    assert_eq!(*before[3], TimelineEvent::Settled(COMMAND_SETTLE));
    assert_eq!(before.len(), 4);

    // Every chunk is followed by its own settle before anything else is sent.
    for (i, event) in events.iter().enumerate() {
        if let TimelineEvent::Sent(c) = event {
            if c.opcode() == Opcode::DisplayImageData {
                assert_eq!(events[i + 1], TimelineEvent::Settled(CHUNK_SETTLE));
            }
        }
    }
}

fn small_black_image() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(10, 10, Luma([0])))
}

#[test]
fn first_write_failure_leaves_display_clean() {
    let (mut client, timeline) = client();
    client.transport_mut().fail_at(0);
    let err = client
        .upload_image(DialAddress::new(0).unwrap(), &small_black_image(), &CancelToken::new())
        .unwrap_err();
    match err {
        ClientError::Upload(e @ UploadError::Transmission { .. }) => {
            assert!(e.before_transmission())
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(timeline.commands().is_empty());
}

#[test]
fn mid_upload_failure_leaves_display_indeterminate() {
    let (mut client, timeline) = client();
    client.transport_mut().fail_at(3);
    let err = client
        .upload_image(DialAddress::new(0).unwrap(), &small_black_image(), &CancelToken::new())
        .unwrap_err();
    match err {
        ClientError::Upload(e @ UploadError::Transmission { .. }) => {
            assert!(!e.before_transmission())
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(timeline.commands().len(), 3);
}

#[test]
fn upload_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logo.png");
    GrayImage::from_pixel(50, 50, Luma([255])).save(&path).unwrap();
    let (mut client, timeline) = client();
    let (frame, report) = client
        .upload_image_file(DialAddress::new(7).unwrap(), &path, &CancelToken::new())
        .unwrap();
    assert_eq!(report.chunks, 4);
    assert!(frame.as_bytes().iter().any(|&b| b != 0));
    assert_eq!(timeline.commands().len(), 7);
}
