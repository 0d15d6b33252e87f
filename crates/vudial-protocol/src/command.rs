//! Builders for every host-to-hub instruction.
//!
//! The command set is closed: each [`Opcode`] maps to one fixed data type and
//! payload layout, and [`Command`] values are only produced by the builders
//! below. Arguments are validated before a single byte is written.

use crate::address::DialAddress;
use crate::display_constants::{DISPLAY_HEIGHT, DISPLAY_WIDTH, MAX_IMAGE_DATA_LEN};
use crate::error::InvalidParameter;
use crate::frame::{DataType, RawFrame, COMMAND_MARKER};

/// Longest easing period the hub firmware accepts, in milliseconds.
pub const MAX_EASING_PERIOD_MS: u32 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    SetDialPercentSingle = 0x03,
    GetDevicesMap = 0x07,
    GetFirmwareInfo = 0x09,
    GetDeviceUid = 0x0B,
    RescanBus = 0x0C,
    SetDialEasingStep = 0x0D,
    SetDialEasingPeriod = 0x0E,
    SetBacklightEasingStep = 0x0F,
    SetBacklightEasingPeriod = 0x10,
    SetRgbBacklight = 0x13,
    DisplayClear = 0x14,
    DisplayGotoXY = 0x15,
    DisplayImageData = 0x16,
    DisplayShowImage = 0x17,
}

impl Opcode {
    pub const ALL: [Opcode; 14] = [
        Opcode::SetDialPercentSingle,
        Opcode::GetDevicesMap,
        Opcode::GetFirmwareInfo,
        Opcode::GetDeviceUid,
        Opcode::RescanBus,
        Opcode::SetDialEasingStep,
        Opcode::SetDialEasingPeriod,
        Opcode::SetBacklightEasingStep,
        Opcode::SetBacklightEasingPeriod,
        Opcode::SetRgbBacklight,
        Opcode::DisplayClear,
        Opcode::DisplayGotoXY,
        Opcode::DisplayImageData,
        Opcode::DisplayShowImage,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_byte() == byte)
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn data_type(self) -> DataType {
        match self {
            Opcode::RescanBus | Opcode::GetDevicesMap => DataType::None,
            Opcode::GetDeviceUid | Opcode::GetFirmwareInfo | Opcode::DisplayShowImage => {
                DataType::Single
            }
            Opcode::DisplayImageData => DataType::Multiple,
            Opcode::SetDialPercentSingle
            | Opcode::SetDialEasingStep
            | Opcode::SetDialEasingPeriod
            | Opcode::SetBacklightEasingStep
            | Opcode::SetBacklightEasingPeriod
            | Opcode::SetRgbBacklight
            | Opcode::DisplayClear
            | Opcode::DisplayGotoXY => DataType::KeyValue,
        }
    }

    /// Queries whose reply carries data the caller waits for.
    pub fn awaits_response(self) -> bool {
        matches!(
            self,
            Opcode::GetDeviceUid | Opcode::GetDevicesMap | Opcode::GetFirmwareInfo
        )
    }
}

/// One encoded instruction, ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    opcode: Opcode,
    bytes: Vec<u8>,
}

impl Command {
    fn build(opcode: Opcode, payload: Vec<u8>) -> Self {
        let frame = RawFrame {
            marker: COMMAND_MARKER,
            opcode: opcode.as_byte(),
            data_type: opcode.data_type() as u8,
            payload,
        };
        Self {
            opcode,
            bytes: frame.encode(),
        }
    }

    /// Move the needle of `dial` to `percent` of full scale.
    pub fn set_value(dial: DialAddress, percent: f64) -> Result<Self, InvalidParameter> {
        let unit = percent_to_unit("percent", percent)?;
        Ok(Self::build(Opcode::SetDialPercentSingle, vec![dial.get(), unit]))
    }

    /// Set the RGB backlight; each channel is a percentage of full brightness.
    pub fn set_backlight(
        dial: DialAddress,
        red: f64,
        green: f64,
        blue: f64,
    ) -> Result<Self, InvalidParameter> {
        let payload = vec![
            dial.get(),
            percent_to_unit("red", red)?,
            percent_to_unit("green", green)?,
            percent_to_unit("blue", blue)?,
        ];
        Ok(Self::build(Opcode::SetRgbBacklight, payload))
    }

    /// Ask the hub to re-enumerate the I2C bus. Broadcast, no dial address.
    pub fn rescan_bus() -> Self {
        Self::build(Opcode::RescanBus, Vec::new())
    }

    pub fn get_uid(dial: DialAddress) -> Self {
        Self::build(Opcode::GetDeviceUid, vec![dial.get()])
    }

    pub fn get_devices_map() -> Self {
        Self::build(Opcode::GetDevicesMap, Vec::new())
    }

    pub fn get_firmware_info(dial: DialAddress) -> Self {
        Self::build(Opcode::GetFirmwareInfo, vec![dial.get()])
    }

    /// Largest needle movement per easing tick, in percent.
    pub fn set_dial_easing_step(dial: DialAddress, step: u8) -> Result<Self, InvalidParameter> {
        check_step(step)?;
        Ok(Self::build(Opcode::SetDialEasingStep, vec![dial.get(), step]))
    }

    pub fn set_dial_easing_period(
        dial: DialAddress,
        period_ms: u32,
    ) -> Result<Self, InvalidParameter> {
        check_period(period_ms)?;
        Ok(Self::build(
            Opcode::SetDialEasingPeriod,
            period_payload(dial, period_ms),
        ))
    }

    pub fn set_backlight_easing_step(
        dial: DialAddress,
        step: u8,
    ) -> Result<Self, InvalidParameter> {
        check_step(step)?;
        Ok(Self::build(Opcode::SetBacklightEasingStep, vec![dial.get(), step]))
    }

    pub fn set_backlight_easing_period(
        dial: DialAddress,
        period_ms: u32,
    ) -> Result<Self, InvalidParameter> {
        check_period(period_ms)?;
        Ok(Self::build(
            Opcode::SetBacklightEasingPeriod,
            period_payload(dial, period_ms),
        ))
    }

    pub fn display_clear(dial: DialAddress, white_background: bool) -> Self {
        Self::build(
            Opcode::DisplayClear,
            vec![dial.get(), u8::from(white_background)],
        )
    }

    /// Position the write cursor for subsequent image data.
    pub fn display_goto_xy(dial: DialAddress, x: u16, y: u16) -> Result<Self, InvalidParameter> {
        if u32::from(x) >= DISPLAY_WIDTH {
            return Err(InvalidParameter::new(
                "x",
                format!("{x} is outside 0..{DISPLAY_WIDTH}"),
            ));
        }
        if u32::from(y) >= DISPLAY_HEIGHT {
            return Err(InvalidParameter::new(
                "y",
                format!("{y} is outside 0..{DISPLAY_HEIGHT}"),
            ));
        }
        let mut payload = vec![dial.get()];
        payload.extend_from_slice(&x.to_be_bytes());
        payload.extend_from_slice(&y.to_be_bytes());
        Ok(Self::build(Opcode::DisplayGotoXY, payload))
    }

    pub fn display_image_data(dial: DialAddress, chunk: &[u8]) -> Result<Self, InvalidParameter> {
        if chunk.is_empty() {
            return Err(InvalidParameter::new("chunk", "image chunk is empty"));
        }
        if chunk.len() > MAX_IMAGE_DATA_LEN {
            return Err(InvalidParameter::new(
                "chunk",
                format!(
                    "{} bytes exceeds the {MAX_IMAGE_DATA_LEN} byte limit",
                    chunk.len()
                ),
            ));
        }
        let mut payload = Vec::with_capacity(chunk.len() + 1);
        payload.push(dial.get());
        payload.extend_from_slice(chunk);
        Ok(Self::build(Opcode::DisplayImageData, payload))
    }

    pub fn display_show_image(dial: DialAddress) -> Self {
        Self::build(Opcode::DisplayShowImage, vec![dial.get()])
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn awaits_response(&self) -> bool {
        self.opcode.awaits_response()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Command {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Convert a percentage into the hub's integer percent unit.
///
/// Values must be finite and inside `0.0..=100.0`; nothing is clamped.
/// In-range values round half away from zero, so the result is within 0.5
/// of the input.
pub fn percent_to_unit(name: &'static str, percent: f64) -> Result<u8, InvalidParameter> {
    if !percent.is_finite() {
        return Err(InvalidParameter::new(name, "value is not a finite number"));
    }
    if !(0.0..=100.0).contains(&percent) {
        return Err(InvalidParameter::new(
            name,
            format!("{percent} is outside 0..=100"),
        ));
    }
    Ok(percent.round() as u8)
}

fn check_step(step: u8) -> Result<(), InvalidParameter> {
    if !(1..=100).contains(&step) {
        return Err(InvalidParameter::new(
            "step",
            format!("{step} is outside 1..=100"),
        ));
    }
    Ok(())
}

fn check_period(period_ms: u32) -> Result<(), InvalidParameter> {
    if !(1..=MAX_EASING_PERIOD_MS).contains(&period_ms) {
        return Err(InvalidParameter::new(
            "period_ms",
            format!("{period_ms} is outside 1..={MAX_EASING_PERIOD_MS}"),
        ));
    }
    Ok(())
}

fn period_payload(dial: DialAddress, period_ms: u32) -> Vec<u8> {
    let mut payload = vec![dial.get()];
    payload.extend_from_slice(&period_ms.to_be_bytes());
    payload
}
