//! services/api/src/adapters/whatsapp.rs
//!
//! Builds `wa.me` deep links that open a chat with the business number.

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

const BASE_URL: &str = "https://wa.me";

/// A deep-link builder bound to one business phone number.
#[derive(Clone, Debug)]
pub struct WhatsAppLink {
    number: String,
}

impl WhatsAppLink {
    /// `wa.me` wants digits only, without `+` or separators. Returns `None`
    /// when nothing usable is left.
    pub fn new(number: &str) -> Option<Self> {
        let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < 7 {
            return None;
        }
        Some(Self { number: digits })
    }

    pub fn chat_url(&self, message: Option<&str>) -> String {
        match message.map(str::trim).filter(|m| !m.is_empty()) {
            Some(text) => format!(
                "{}/{}?text={}",
                BASE_URL,
                self.number,
                utf8_percent_encode(text, NON_ALPHANUMERIC)
            ),
            None => format!("{}/{}", BASE_URL, self.number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting_from_number() {
        let link = WhatsAppLink::new("+91 98450-12345").unwrap();
        assert_eq!(link.chat_url(None), "https://wa.me/919845012345");
    }

    #[test]
    fn encodes_message_text() {
        let link = WhatsAppLink::new("919845012345").unwrap();
        assert_eq!(
            link.chat_url(Some("Hi, I'd like a sherwani fitting & quote")),
            "https://wa.me/919845012345?text=Hi%2C%20I%27d%20like%20a%20sherwani%20fitting%20%26%20quote"
        );
        assert_eq!(link.chat_url(Some("   ")), "https://wa.me/919845012345");
    }

    #[test]
    fn rejects_short_numbers() {
        assert!(WhatsAppLink::new("12-34").is_none());
    }
}
