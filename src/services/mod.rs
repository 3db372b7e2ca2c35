pub mod reply;
pub mod speech;

pub use reply::ReplyClient;
pub use speech::{HttpSpeechSynthesizer, SpeechSynthesizer};
