use crate::epaper::{ImageError, PackedFrame};
use crate::logbuf::now_millis;
use serde::{Deserialize, Serialize};
use vudial_protocol::DialAddress;

/// Backlight channels, each a percentage of full brightness.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Backlight {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Backlight {
    pub fn new(red: f64, green: f64, blue: f64) -> Self {
        Self { red, green, blue }
    }
}

/// Last known state of one dial, in plain values for whatever stores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialRecord {
    pub uid: String,
    pub index: DialAddress,
    pub value: f64,
    pub backlight: Backlight,
    pub last_seen_ms: u64,
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Vec<u8>>,
}

impl DialRecord {
    pub fn discovered(uid: String, index: DialAddress) -> Self {
        Self {
            uid,
            index,
            value: 0.0,
            backlight: Backlight::default(),
            last_seen_ms: now_millis(),
            online: true,
            image: None,
            thumbnail: None,
        }
    }

    pub fn observe_value(&mut self, value: f64) {
        self.value = value;
        self.touch();
    }

    pub fn observe_backlight(&mut self, backlight: Backlight) {
        self.backlight = backlight;
        self.touch();
    }

    /// Keep the uploaded frame and a PNG preview of it.
    pub fn observe_image(&mut self, frame: &PackedFrame) -> Result<(), ImageError> {
        self.thumbnail = Some(frame.thumbnail_png()?);
        self.image = Some(frame.as_bytes().to_vec());
        self.touch();
        Ok(())
    }

    pub fn mark_offline(&mut self) {
        self.online = false;
    }

    fn touch(&mut self) {
        self.online = true;
        self.last_seen_ms = now_millis();
    }
}
