use std::io::Write;
use std::sync::Mutex;

/// Where revealed dialogue text goes. Mutated only by the sequencer and its
/// revealer; nothing else writes here.
pub trait TextSink: Send + Sync {
    fn set_text(&self, text: &str);
    fn append_text(&self, text: &str);
}

/// Accumulating sink used by tests and available to embedders.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buf.lock().expect("sink lock").clone()
    }
}

impl TextSink for BufferSink {
    fn set_text(&self, text: &str) {
        let mut buf = self.buf.lock().expect("sink lock");
        buf.clear();
        buf.push_str(text);
    }

    fn append_text(&self, text: &str) {
        self.buf.lock().expect("sink lock").push_str(text);
    }
}

/// Terminal sink for the demo binary: appends print without a newline so
/// the typewriter effect is visible as it happens.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    pub fn new() -> Self {
        Self
    }
}

impl TextSink for StdoutSink {
    fn set_text(&self, text: &str) {
        println!();
        if !text.is_empty() {
            print!("{}", text);
            let _ = std::io::stdout().flush();
        }
    }

    fn append_text(&self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }
}
