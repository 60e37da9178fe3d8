//! Verification email content.

use notekeep_model::Session;

use crate::Email;

const SUBJECT: &str = "Register Verification";

/// Renders the email carrying the session's pending code.
///
/// Returns `None` for a session with no code pending (already verified,
/// or refreshed by a login): there is nothing to send.
pub fn verification_email(session: &Session) -> Option<Email> {
    let code = session.code?;
    let text = format!(
        "hello {}, this is your verification code: {code}",
        session.username
    );
    let html = format!(
        "<p>hello {}, this is your verification code: <strong>{code}</strong></p>",
        escape_html(&session.username)
    );

    Some(Email {
        to: session.email.clone(),
        to_name: Some(session.username.clone()),
        subject: SUBJECT.to_string(),
        html,
        text,
    })
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
