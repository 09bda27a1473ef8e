pub mod db;
pub mod sst;
pub mod tts;
pub mod whatsapp;

pub use db::DbAdapter;
pub use sst::OpenAiSstAdapter;
pub use tts::OpenAiTtsAdapter;
pub use whatsapp::WhatsAppLink;
