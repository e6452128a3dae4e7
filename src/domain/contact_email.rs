use validator::ValidateEmail;

#[derive(Debug, Clone)]
/// A syntactically valid email address. Used both for the destination read
/// from the secrets file and for the address a visitor types into the form.
///
/// Surrounding whitespace is trimmed before validation, and is not kept.
pub struct ContactEmail(String);

impl ContactEmail {
    pub fn parse(email: &str) -> Result<Self, String> {
        let email = email.trim().to_string();
        ValidateEmail::validate_email(&email)
            .then(|| Self(email.clone()))
            .ok_or(format!("Invalid email: {email:?}"))
    }
}

impl AsRef<str> for ContactEmail {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for ContactEmail {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
