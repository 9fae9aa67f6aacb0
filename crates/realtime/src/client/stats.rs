#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    frames_received: u64,
    decode_errors: u64,
    text_forwarded: u64,
    text_filtered: u64,
    audio_bytes: u64,
    tool_uses: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_frame(&mut self) {
        self.frames_received += 1;
    }

    pub(crate) fn record_decode_error(&mut self) {
        self.decode_errors += 1;
    }

    pub(crate) fn record_text(&mut self, forwarded: bool) {
        if forwarded {
            self.text_forwarded += 1;
        } else {
            self.text_filtered += 1;
        }
    }

    pub(crate) fn record_audio(&mut self, bytes: usize) {
        self.audio_bytes += bytes as u64;
    }

    pub(crate) fn record_tool_use(&mut self) {
        self.tool_uses += 1;
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    pub fn text_forwarded(&self) -> u64 {
        self.text_forwarded
    }

    pub fn text_filtered(&self) -> u64 {
        self.text_filtered
    }

    pub fn audio_bytes(&self) -> u64 {
        self.audio_bytes
    }

    pub fn tool_uses(&self) -> u64 {
        self.tool_uses
    }
}
