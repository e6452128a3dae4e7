/// Raw contact form payload. Every field is user-editable text; `url` is
/// hidden from humans and only ever filled in by bots.
///
/// Missing keys are treated as empty strings, so that a partial body reaches
/// the validation pipeline instead of being rejected up front.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Submission {
    pub name: String,
    pub email: String,
    pub url: String,
    pub subject: String,
    pub message: String,
}

impl Submission {
    /// Decode an `application/x-www-form-urlencoded` body.
    ///
    /// Returns `None` when the body carries no fields at all (empty or
    /// undecodable), which the handler treats as a malformed request.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).ok()?;
        if pairs.is_empty() {
            return None;
        }
        // last occurrence wins, same as most form decoders
        let mut sub = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "name" => sub.name = value,
                "email" => sub.email = value,
                "url" => sub.url = value,
                "subject" => sub.subject = value,
                "message" => sub.message = value,
                _ => {}
            }
        }
        Some(sub)
    }

    /// True when the hidden honeypot field was filled in.
    pub fn is_spam(&self) -> bool { !self.url.is_empty() }
}
