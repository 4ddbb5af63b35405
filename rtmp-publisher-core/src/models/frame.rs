/// One captured video frame as handed to display surfaces and publish links.
///
/// `data` is an 8-bit luma plane of `width * height` bytes for the virtual
/// backend; real backends may carry any pixel layout they agree on with
/// their link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_us: u64,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, timestamp_us: u64, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            timestamp_us,
            data,
        }
    }
}
