//! Turning a validated submission into the text of an email.
//!
//! Everything here is pure string manipulation; sending lives in
//! `email_client`.

use base64::engine::general_purpose;
use base64::Engine;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::ContactEmail;

/// Column at which message lines are wrapped
pub const WRAP_WIDTH: usize = 72;

/// Appended to every wrapped line. The trailing space marks a soft break for
/// `format=flowed` readers.
pub const FLOWED_BREAK: &str = " \n";

/// Remove HTML tags (and comments) from `text`.
///
/// A `<` followed by whitespace is not a tag and is kept. An unterminated
/// tag, a lone `<` at the very end included, swallows the rest of the text. Quoted `>` inside a tag
/// does not close it.
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        if chars.peek().is_some_and(|next| next.is_whitespace()) {
            out.push(c);
            continue;
        }

        let mut quote: Option<char> = None;
        for c in chars.by_ref() {
            match (quote, c) {
                (None, '>') => break,
                (None, '"' | '\'') => quote = Some(c),
                (Some(q), c) if q == c => quote = None,
                _ => {}
            }
        }
    }
    out
}

/// True when every char is printable ASCII (0x20..=0x7E).
fn is_printable_ascii(text: &str) -> bool { text.bytes().all(|b| (0x20..=0x7E).contains(&b)) }

/// Wrap `text` in a MIME encoded-word (`=?UTF-8?B?...?=`).
pub fn encoded_word(text: &str) -> String {
    format!("=?UTF-8?B?{}?=", general_purpose::STANDARD.encode(text))
}

/// Make user text safe for a header: strip tags, trim, then
/// entity-encode `& < > " '`. Anything that is not printable ASCII after that
/// is carried as an encoded-word, so the header stays 7-bit.
pub fn clean_header(text: &str) -> String {
    let cleaned = clean(&strip_tags(text));
    match is_printable_ascii(&cleaned) {
        true => cleaned,
        false => encoded_word(&cleaned),
    }
}

/// Trim and entity-encode, without touching tags.
pub fn clean(text: &str) -> String { htmlescape::encode_minimal(text.trim()) }

/// Hard-wrap a single line (no `\n` inside) at `width` columns, breaking only
/// at spaces. The space a break replaces becomes the trailing space of
/// `FLOWED_BREAK`. Words longer than `width` are left whole.
///
/// Columns are counted in graphemes, so combined characters are one column.
pub fn wrap_line(
    line: &str,
    width: usize,
) -> String {
    let g: Vec<&str> = line.graphemes(true).collect();
    let mut out = String::with_capacity(line.len() + line.len() / width.max(1) * 2);

    let mut last_start = 0;
    let mut last_space = 0;
    for (current, grapheme) in g.iter().enumerate() {
        if *grapheme == " " {
            // space at the boundary: break right here
            if current - last_start >= width {
                out.extend(g[last_start..current].iter().copied());
                out.push_str(FLOWED_BREAK);
                last_start = current + 1;
            }
            last_space = current;
        } else if current - last_start >= width && last_start < last_space {
            // word runs over: back up to the last space
            out.extend(g[last_start..last_space].iter().copied());
            out.push_str(FLOWED_BREAK);
            last_start = last_space + 1;
            last_space = last_start;
        }
    }
    out.extend(g[last_start..].iter().copied());
    out
}

/// Entity-encode the message body and wrap every line as flowed text.
/// `\r\n` and lone `\r` count as line breaks too.
pub fn format_body(message: &str) -> String {
    clean(message)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(|line| wrap_line(line, WRAP_WIDTH))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A composed email: ordered headers and a flowed plain-text body.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

/// What goes into the email besides the visitor's text.
pub struct Letterhead<'a> {
    /// Where the message is delivered. Also used as sender, so that SPF
    /// checks of the receiving server pass.
    pub destination: &'a ContactEmail,
    pub from_name: &'a str,
    pub subject_prefix: &'a str,
    pub x_mailer: &'a str,
}

impl OutgoingEmail {
    /// Compose the email for an accepted submission. `name`, `subject` and
    /// `message` are raw user input; `reply_to` has already been validated.
    pub fn compose(
        letterhead: &Letterhead,
        name: &str,
        reply_to: &ContactEmail,
        subject: &str,
        message: &str,
    ) -> Self {
        let name = clean_header(name);
        let prefix = clean_header(letterhead.subject_prefix);
        let subject = format!("[{prefix}] {}", clean_header(subject));
        let destination = letterhead.destination.as_ref();

        let headers = vec![
            ("From", format!("{} <{destination}>", letterhead.from_name)),
            ("Sender", destination.to_string()),
            ("To", destination.to_string()),
            ("Return-Path", destination.to_string()),
            ("Reply-To", format!("{name} <{reply_to}>")),
            ("Subject", subject),
            ("MIME-Version", "1.0".to_string()),
            (
                "Content-Type",
                "text/plain; charset=UTF-8; format=flowed; delsp=yes".to_string(),
            ),
            ("Content-Transfer-Encoding", "8Bit".to_string()),
            ("X-Mailer", letterhead.x_mailer.to_string()),
        ];

        Self {
            headers,
            body: format_body(message),
        }
    }

    pub fn header(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// RFC 5322 representation, ready for SMTP `DATA`. All line ends are
    /// CRLF, and no bare `\r` or `\n` is left in the body. The
    /// terminating `CRLF.CRLF` is left to the transport.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        for (i, line) in self.body.split('\n').enumerate() {
            if i > 0 {
                out.push_str("\r\n");
            }
            out.push_str(line.strip_suffix('\r').unwrap_or(line));
        }
        out.into_bytes()
    }
}
