//! Reply and forward composition. Pure string building, no I/O.

use crate::message::Message;

const FORWARD_BANNER: &str = "---------- Forwarded message ----------";

/// Build the subject and body of a reply to `original`.
///
/// The subject is always prefixed, so replying to `Re: x` yields `Re: Re: x`.
pub fn build_reply(original: &Message, reply_text: &str) -> (String, String) {
    let subject = format!("Re: {}", original.subject);

    let mut body = String::with_capacity(reply_text.len() + original.body.len() + 64);
    body.push_str(reply_text);
    body.push_str("\n\n");
    body.push_str(&format!(
        "On {}, {} wrote:\n",
        original.sent_at.to_rfc2822(),
        original.sender
    ));
    body.push_str(&quote(&original.body));

    (subject, body)
}

/// Build the subject and body for forwarding `original`.
pub fn build_forward(original: &Message) -> (String, String) {
    let subject = format!("Fwd: {}", original.subject);
    let body = format!(
        "{FORWARD_BANNER}\nFrom: {}\nDate: {}\nSubject: {}\n\n{}",
        original.sender,
        original.sent_at.to_rfc2822(),
        original.subject,
        original.body,
    );
    (subject, body)
}

fn quote(text: &str) -> String {
    if text.is_empty() {
        return ">".to_string();
    }
    text.lines()
        .map(|line| format!("> {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
