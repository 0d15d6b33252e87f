pub const DISPLAY_WIDTH: u32 = 200;
pub const DISPLAY_HEIGHT: u32 = 144;
/// Eight vertically stacked pixels share one byte.
pub const BYTES_PER_COLUMN: usize = DISPLAY_HEIGHT as usize / 8;
/// Size of a full packed frame: 200 columns * 18 bytes.
pub const PACKED_FRAME_LEN: usize = DISPLAY_WIDTH as usize * BYTES_PER_COLUMN;
/// Largest chunk of image bytes the hub accepts in one `DisplayImageData` command.
pub const MAX_IMAGE_DATA_LEN: usize = 1000;
