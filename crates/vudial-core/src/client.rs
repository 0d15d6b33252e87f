use crate::epaper::{self, PackedFrame};
use crate::record::{Backlight, DialRecord};
use crate::transport::{ConnectionState, Transport, TransportError};
use crate::upload::{self, CancelToken, Pacer, ThreadPacer, UploadError, UploadPlan, UploadReport};
use image::DynamicImage;
use log::{debug, info};
use std::path::Path;
use thiserror::Error;
use vudial_protocol::{Command, DialAddress, InvalidParameter, Opcode, Response};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameter),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("no reply to {0:?}")]
    NoReply(Opcode),
    #[error("hub reported status 0x{0:02X}")]
    DeviceStatus(u8),
}

/// Per-dial operations over one hub link.
pub struct DialClient<T, P = ThreadPacer> {
    transport: T,
    pacer: P,
}

impl<T: Transport> DialClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_pacer(transport, ThreadPacer)
    }
}

impl<T: Transport, P: Pacer> DialClient<T, P> {
    pub fn with_pacer(transport: T, pacer: P) -> Self {
        Self { transport, pacer }
    }

    pub fn connect(&mut self) -> bool {
        self.transport.connect()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn set_value(&mut self, dial: DialAddress, percent: f64) -> Result<(), ClientError> {
        let cmd = Command::set_value(dial, percent)?;
        self.transport.send(&cmd)?;
        Ok(())
    }

    pub fn set_backlight(
        &mut self,
        dial: DialAddress,
        backlight: Backlight,
    ) -> Result<(), ClientError> {
        let cmd = backlight_command(dial, backlight)?;
        self.transport.send(&cmd)?;
        Ok(())
    }

    /// Set needle and backlight together. Both are validated before either
    /// is sent.
    pub fn update(
        &mut self,
        dial: DialAddress,
        percent: f64,
        backlight: Backlight,
    ) -> Result<(), ClientError> {
        let value = Command::set_value(dial, percent)?;
        let light = backlight_command(dial, backlight)?;
        self.transport.send(&value)?;
        self.transport.send(&light)?;
        Ok(())
    }

    pub fn rescan(&mut self) -> Result<(), ClientError> {
        self.transport.send(&Command::rescan_bus())?;
        Ok(())
    }

    /// Identifier of the dial at `dial`, or `None` when no dial answers there.
    pub fn uid(&mut self, dial: DialAddress) -> Result<Option<String>, ClientError> {
        Ok(self.query(&Command::get_uid(dial))?.uid())
    }

    /// Bus positions the hub currently sees.
    pub fn devices_map(&mut self) -> Result<Vec<DialAddress>, ClientError> {
        Ok(self.query(&Command::get_devices_map())?.devices_map())
    }

    pub fn firmware_info(&mut self, dial: DialAddress) -> Result<String, ClientError> {
        Ok(self.query(&Command::get_firmware_info(dial))?.text())
    }

    /// Rescan the bus, then ask every position for its identifier.
    /// Positions that stay silent or report no device are skipped.
    pub fn discover(&mut self) -> Result<Vec<DialRecord>, ClientError> {
        self.rescan()?;
        let mut found = Vec::new();
        for dial in DialAddress::all() {
            match self.uid(dial) {
                Ok(Some(uid)) => {
                    info!("dial {dial}: {uid}");
                    found.push(DialRecord::discovered(uid, dial));
                }
                Ok(None) => debug!("dial {dial}: no device"),
                Err(ClientError::NoReply(_)) => debug!("dial {dial}: no reply"),
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    pub fn set_dial_easing(
        &mut self,
        dial: DialAddress,
        step: u8,
        period_ms: u32,
    ) -> Result<(), ClientError> {
        let step = Command::set_dial_easing_step(dial, step)?;
        let period = Command::set_dial_easing_period(dial, period_ms)?;
        self.transport.send(&step)?;
        self.transport.send(&period)?;
        Ok(())
    }

    pub fn set_backlight_easing(
        &mut self,
        dial: DialAddress,
        step: u8,
        period_ms: u32,
    ) -> Result<(), ClientError> {
        let step = Command::set_backlight_easing_step(dial, step)?;
        let period = Command::set_backlight_easing_period(dial, period_ms)?;
        self.transport.send(&step)?;
        self.transport.send(&period)?;
        Ok(())
    }

    pub fn clear_display(
        &mut self,
        dial: DialAddress,
        white_background: bool,
    ) -> Result<(), ClientError> {
        self.transport.send(&Command::display_clear(dial, white_background))?;
        Ok(())
    }

    /// Convert `image` and upload it. Conversion errors surface before any
    /// command is sent. Returns the frame that was shown.
    pub fn upload_image(
        &mut self,
        dial: DialAddress,
        image: &DynamicImage,
        cancel: &CancelToken,
    ) -> Result<(PackedFrame, UploadReport), ClientError> {
        let frame = epaper::convert(image).map_err(UploadError::from)?;
        let report = self.upload_frame(dial, &frame, cancel)?;
        Ok((frame, report))
    }

    pub fn upload_image_file(
        &mut self,
        dial: DialAddress,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<(PackedFrame, UploadReport), ClientError> {
        let image = epaper::open(path).map_err(UploadError::from)?;
        self.upload_image(dial, &image, cancel)
    }

    pub fn upload_frame(
        &mut self,
        dial: DialAddress,
        frame: &PackedFrame,
        cancel: &CancelToken,
    ) -> Result<UploadReport, ClientError> {
        let plan = UploadPlan::new(dial, frame).map_err(UploadError::from)?;
        Ok(upload::run(&mut self.transport, &mut self.pacer, &plan, cancel)?)
    }

    fn query(&mut self, cmd: &Command) -> Result<Response, ClientError> {
        let response = self
            .transport
            .request(cmd)?
            .ok_or(ClientError::NoReply(cmd.opcode()))?;
        match response.status() {
            Some(code) if code != 0 => Err(ClientError::DeviceStatus(code)),
            _ => Ok(response),
        }
    }
}

fn backlight_command(dial: DialAddress, backlight: Backlight) -> Result<Command, InvalidParameter> {
    Command::set_backlight(dial, backlight.red, backlight.green, backlight.blue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockTransport, RecordingPacer, Timeline};
    use image::{GrayImage, Luma};

    fn client() -> (DialClient<MockTransport, RecordingPacer>, Timeline) {
        let timeline = Timeline::default();
        let client = DialClient::with_pacer(
            MockTransport::new(timeline.clone()),
            RecordingPacer::new(timeline.clone()),
        );
        (client, timeline)
    }

    fn dial(n: u8) -> DialAddress {
        DialAddress::new(n).unwrap()
    }

    #[test]
    fn update_validates_before_sending() {
        let (mut client, timeline) = client();
        let err = client
            .update(dial(0), 50.0, Backlight::new(0.0, 0.0, 120.0))
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidParameter(_)));
        assert!(timeline.commands().is_empty());

        client
            .update(dial(0), 50.0, Backlight::new(10.0, 20.0, 30.0))
            .unwrap();
        let ops: Vec<Opcode> = timeline.commands().iter().map(Command::opcode).collect();
        assert_eq!(ops, vec![Opcode::SetDialPercentSingle, Opcode::SetRgbBacklight]);
    }

    #[test]
    fn uid_distinguishes_absent_from_silent() {
        let (mut client, _) = client();
        client.transport_mut().push_reply(Some(b"<0B02000400000000\r\n".as_slice()));
        client.transport_mut().push_reply(None);
        assert_eq!(client.uid(dial(1)).unwrap(), None);
        assert!(matches!(
            client.uid(dial(1)),
            Err(ClientError::NoReply(Opcode::GetDeviceUid))
        ));
    }

    #[test]
    fn malformed_reply_is_reported() {
        let (mut client, _) = client();
        client.transport_mut().push_reply(Some(b"<0B".as_slice()));
        assert!(matches!(
            client.uid(dial(0)),
            Err(ClientError::Transport(TransportError::Decode(_)))
        ));
    }

    #[test]
    fn discover_skips_empty_positions() {
        let (mut client, timeline) = client();
        for n in 0..8 {
            let reply: Option<&[u8]> = match n {
                0 => Some(b"<0B020004DEADBEEF".as_slice()),
                3 => Some(b"<0B02000400000001".as_slice()),
                5 => None,
                _ => Some(b"<0B02000400000000".as_slice()),
            };
            client.transport_mut().push_reply(reply);
        }
        let records = client.discover().unwrap();
        let found: Vec<(u8, &str)> = records
            .iter()
            .map(|r| (r.index.get(), r.uid.as_str()))
            .collect();
        assert_eq!(found, vec![(0, "DEADBEEF"), (3, "00000001")]);
        assert_eq!(timeline.commands()[0].opcode(), Opcode::RescanBus);
        assert_eq!(timeline.commands().len(), 9);
    }

    #[test]
    fn non_zero_status_is_an_error() {
        let (mut client, _) = client();
        client.transport_mut().push_reply(Some(b"<0705000102".as_slice()));
        assert!(matches!(client.devices_map(), Err(ClientError::DeviceStatus(2))));
    }

    #[test]
    fn firmware_info_reads_text() {
        let (mut client, _) = client();
        client.transport_mut().push_reply(Some(b"<09020003322E30".as_slice()));
        assert_eq!(client.firmware_info(dial(2)).unwrap(), "2.0");
    }

    #[test]
    fn easing_sends_step_then_period() {
        let (mut client, timeline) = client();
        client.set_dial_easing(dial(1), 5, 50).unwrap();
        client.set_backlight_easing(dial(1), 10, 100).unwrap();
        assert!(client.set_dial_easing(dial(1), 0, 50).is_err());
        let ops: Vec<Opcode> = timeline.commands().iter().map(Command::opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::SetDialEasingStep,
                Opcode::SetDialEasingPeriod,
                Opcode::SetBacklightEasingStep,
                Opcode::SetBacklightEasingPeriod,
            ]
        );
    }

    #[test]
    fn empty_image_fails_before_any_command() {
        let (mut client, timeline) = client();
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let err = client
            .upload_image(dial(0), &img, &CancelToken::new())
            .unwrap_err();
        match err {
            ClientError::Upload(e) => assert!(e.before_transmission()),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(timeline.events().is_empty());
    }

    #[test]
    fn upload_image_sends_frame() {
        let (mut client, timeline) = client();
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 144, Luma([255])));
        let (frame, report) = client
            .upload_image(dial(6), &img, &CancelToken::new())
            .unwrap();
        assert!(frame.as_bytes().iter().all(|&b| b == 0xFF));
        assert_eq!(report.chunks, 4);
        let cmds = timeline.commands();
        assert_eq!(cmds.first().map(Command::opcode), Some(Opcode::DisplayClear));
        assert_eq!(cmds.last().map(Command::opcode), Some(Opcode::DisplayShowImage));
    }

    #[test]
    fn disconnected_transport_fails_fire_and_forget() {
        let (mut client, _) = client();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.set_value(dial(0), 10.0),
            Err(ClientError::Transport(TransportError::NotConnected))
        ));
        assert!(client.connect());
        client.set_value(dial(0), 10.0).unwrap();
    }
}
