//! Browser-side gate in front of the contact form.
//!
//! Naive form fillers post the form without ever producing input events. The
//! guard keeps the submit control disabled until the body sees a pointer
//! move, a touch move, or a Tab/Enter key press, and then submits the form
//! with a single asynchronous POST.
//!
//! The DOM is reached only through `Page`, and the network only through
//! `Poster`, so any front-end binding can host the guard.

use crate::domain::Submission;
use crate::startup::CONTACT_PATH;

/// Element ids the page must provide
pub mod ids {
    pub const FORM: &str = "contact-form";
    pub const SUBMIT: &str = "contact-submit";
    pub const STATUS: &str = "contact-status";
    pub const NAME: &str = "edit-name";
    pub const EMAIL: &str = "edit-mail";
    pub const URL: &str = "edit-url";
    pub const SUBJECT: &str = "edit-subject";
    pub const MESSAGE: &str = "edit-message";
}

pub const SUBMITTED_TEXT: &str = "Message submitted";
pub const FAILED_TEXT: &str = "Error submitting message";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Body-level listeners owned by the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listener {
    PointerMove,
    TouchMove,
    KeyDown,
}

pub const LISTENERS: [Listener; 3] = [Listener::PointerMove, Listener::TouchMove, Listener::KeyDown];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Tab,
    Enter,
    Other,
}

impl Key {
    /// Map a DOM `keyCode`
    pub fn from_code(code: u32) -> Self {
        match code {
            9 => Key::Tab,
            13 => Key::Enter,
            _ => Key::Other,
        }
    }
}

/// An event delivered to one of the body listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEvent {
    PointerMove,
    TouchMove,
    KeyDown(Key),
}

impl BodyEvent {
    /// Pointer and touch moves always count; of the keys, only those a person
    /// uses to move through a form do.
    fn is_human(&self) -> bool {
        match self {
            BodyEvent::PointerMove | BodyEvent::TouchMove => true,
            BodyEvent::KeyDown(key) => matches!(key, Key::Tab | Key::Enter),
        }
    }
}

/// What the guard needs from the document.
pub trait Page {
    /// Text of the status element
    fn set_status(
        &mut self,
        text: &str,
    );
    fn set_form_visible(
        &mut self,
        visible: bool,
    );
    fn set_submit_enabled(
        &mut self,
        enabled: bool,
    );
    fn add_listener(
        &mut self,
        listener: Listener,
    );
    fn remove_listener(
        &mut self,
        listener: Listener,
    );
    /// Native constraint validation of the form
    fn form_is_valid(&self) -> bool;
    /// Current values of the five inputs
    fn fields(&self) -> Submission;
}

/// Fire-and-forget request. The response is reported back through
/// `FormGuard::complete`.
pub trait Poster {
    fn post(
        &mut self,
        path: &str,
        content_type: &str,
        body: String,
    );
}

/// Result of a click on the submit control. Default navigation is prevented
/// in every case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Click {
    /// No qualifying body event yet; the control is still disabled
    Locked,
    /// The form failed constraint validation; nothing was sent
    Invalid,
    /// The request went out
    Posted,
    /// A request is already in flight
    Ignored,
}

pub struct FormGuard<P: Page> {
    page: P,
    armed: bool,
    posted: bool,
}

impl<P: Page> FormGuard<P> {
    /// Page load: drop the "no script" placeholder, show the form with submit
    /// disabled, and start listening for a person.
    pub fn load(mut page: P) -> Self {
        page.set_status("");
        page.set_form_visible(true);
        page.set_submit_enabled(false);

        let mut guard = Self {
            page,
            armed: false,
            posted: false,
        };
        guard.arm();
        guard
    }

    pub fn page(&self) -> &P { &self.page }

    pub fn is_armed(&self) -> bool { self.armed }

    /// Register the body listeners. No-op if already armed.
    pub fn arm(&mut self) {
        if self.armed {
            return;
        }
        for listener in LISTENERS {
            self.page.add_listener(listener);
        }
        self.armed = true;
    }

    /// Remove all body listeners and unlock the submit control. Listeners are
    /// removed exactly once; later calls do nothing.
    pub fn disarm(&mut self) {
        if !self.armed {
            return;
        }
        for listener in LISTENERS {
            self.page.remove_listener(listener);
        }
        self.armed = false;
        if !self.posted {
            self.page.set_submit_enabled(true);
        }
    }

    /// Entry point for the body listeners.
    pub fn on_body_event(
        &mut self,
        event: BodyEvent,
    ) {
        if self.armed && event.is_human() {
            self.disarm();
        }
    }

    /// Click on the submit control. Posts the form if it is valid, then hides
    /// it and disables the control before any response arrives. Clicks that
    /// arrive while the guard is still armed are dropped, like clicks on a
    /// disabled button.
    pub fn click_submit(
        &mut self,
        poster: &mut impl Poster,
    ) -> Click {
        if self.armed {
            return Click::Locked;
        }
        if self.posted {
            return Click::Ignored;
        }
        if !self.page.form_is_valid() {
            return Click::Invalid;
        }

        poster.post(CONTACT_PATH, FORM_CONTENT_TYPE, encode_fields(&self.page.fields()));
        self.posted = true;

        self.page.set_form_visible(false);
        self.page.set_submit_enabled(false);
        Click::Posted
    }

    /// Completion callback of the request. `status` is `None` when no HTTP
    /// response was received at all.
    ///
    /// Only an exact `200` counts as success. Note that the handler answers
    /// with a redirect, so what is observed here depends on whether the
    /// binding follows it.
    pub fn complete(
        &mut self,
        status: Option<u16>,
    ) {
        let text = match status {
            Some(200) => SUBMITTED_TEXT,
            _ => FAILED_TEXT,
        };
        self.page.set_status(text);
    }
}

/// `name=..&email=..&url=..&subject=..&message=..`, each value
/// percent-encoded on its own.
pub fn encode_fields(fields: &Submission) -> String {
    [
        ("name", &fields.name),
        ("email", &fields.email),
        ("url", &fields.url),
        ("subject", &fields.subject),
        ("message", &fields.message),
    ]
    .iter()
    .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
    .collect::<Vec<_>>()
    .join("&")
}
