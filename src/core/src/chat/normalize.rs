//! Turns chat request input (free text plus attachments) into a user [`Turn`].
//!
//! Normalization never fails: an attachment that cannot be decoded degrades to
//! a placeholder text part naming it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use huddle_protocol::Attachment;

use super::turn::{ContentPart, Turn};

/// Media types outside `text/*` whose payload is still plain text.
const TEXTUAL_APPLICATION_TYPES: &[&str] = &["application/json", "application/xml"];

/// Build the user turn for a chat request.
///
/// Free text comes first as its own part; attachments follow in order, each
/// as a separate part, so the user's words stay distinguishable from
/// extracted file contents.
pub fn normalize(text: Option<&str>, attachments: &[Attachment]) -> Turn {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
        parts.push(ContentPart::Text(text.to_string()));
    }
    for attachment in attachments {
        parts.push(normalize_attachment(attachment));
    }
    Turn::user_parts(parts)
}

fn normalize_attachment(attachment: &Attachment) -> ContentPart {
    let name = display_name(attachment);
    let media_type = attachment.media_type.trim().to_ascii_lowercase();

    if media_type.starts_with("image/") {
        return match image_payload(&attachment.data) {
            Some(payload) => ContentPart::Image(payload),
            None => {
                tracing::debug!(%name, "image attachment not decodable");
                ContentPart::Text(format!("[Image attached: {name}]"))
            }
        };
    }
    if media_type.starts_with("video/") {
        return ContentPart::Text(format!("[Video file attached: {name}]"));
    }
    if media_type.starts_with("audio/") {
        return ContentPart::Text(format!("[Audio file attached: {name}]"));
    }

    if is_textual(&media_type, &attachment.data) {
        match decode_text(&attachment.data) {
            Some(text) => return ContentPart::Text(format!("Content of {name}:\n{text}")),
            None => tracing::debug!(%name, "text attachment not decodable"),
        }
    }
    ContentPart::Text(format!("[Document attached: {name}]"))
}

fn display_name(attachment: &Attachment) -> &str {
    let name = attachment.name.trim();
    if name.is_empty() {
        "unnamed"
    } else {
        name
    }
}

/// Split a data URI into its header (`data:text/plain;base64`) and payload.
/// Bare payloads have no header.
fn split_data_uri(data: &str) -> Option<(Option<&str>, &str)> {
    if !data.starts_with("data:") {
        return Some((None, data));
    }
    data.split_once(',')
        .map(|(header, payload)| (Some(header), payload))
}

fn is_textual(media_type: &str, data: &str) -> bool {
    if media_type.starts_with("text/") || TEXTUAL_APPLICATION_TYPES.contains(&media_type) {
        return true;
    }
    match split_data_uri(data) {
        Some((Some(header), _)) => {
            let header = header.to_ascii_lowercase();
            header.starts_with("data:text/") || header.contains("text/plain")
        }
        _ => false,
    }
}

/// Base64 image payload with the data-URI prefix removed. Rejects payloads
/// that are empty or not valid base64.
fn image_payload(data: &str) -> Option<String> {
    let (_, payload) = split_data_uri(data)?;
    let payload = payload.trim();
    if payload.is_empty() || STANDARD.decode(payload).is_err() {
        return None;
    }
    Some(payload.to_string())
}

fn decode_text(data: &str) -> Option<String> {
    let (header, payload) = split_data_uri(data)?;
    let is_base64 = header.map_or(true, |h| h.to_ascii_lowercase().ends_with(";base64"));
    if !is_base64 {
        let bytes = urlencoding::decode_binary(payload.as_bytes());
        return Some(String::from_utf8_lossy(&bytes).into_owned());
    }
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::turn::{Role, TurnContent};

    fn attachment(name: &str, media_type: &str, data: &str) -> Attachment {
        Attachment {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    fn parts(turn: &Turn) -> Vec<ContentPart> {
        match &turn.content {
            TurnContent::Text(t) => vec![ContentPart::Text(t.clone())],
            TurnContent::Parts(p) => p.clone(),
        }
    }

    #[test]
    fn plain_text_only() {
        let turn = normalize(Some("hi"), &[]);
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, TurnContent::Text("hi".into()));
    }

    #[test]
    fn single_image_without_text_yields_one_image_part() {
        let turn = normalize(
            None,
            &[attachment("a.png", "image/png", "data:image/png;base64,iVBORw0KGgo=")],
        );
        assert_eq!(
            turn.content,
            TurnContent::Parts(vec![ContentPart::Image("iVBORw0KGgo=".into())])
        );
    }

    #[test]
    fn text_file_and_free_text_are_both_kept_and_distinguishable() {
        // "hello file" in base64
        let turn = normalize(
            Some("summarise this"),
            &[attachment(
                "notes.txt",
                "text/plain",
                "data:text/plain;base64,aGVsbG8gZmlsZQ==",
            )],
        );
        assert_eq!(
            parts(&turn),
            vec![
                ContentPart::Text("summarise this".into()),
                ContentPart::Text("Content of notes.txt:\nhello file".into()),
            ]
        );
    }

    #[test]
    fn text_detected_from_data_uri_when_type_is_generic() {
        let turn = normalize(
            None,
            &[attachment(
                "readme",
                "application/octet-stream",
                "data:text/markdown;base64,IyBUaXRsZQ==",
            )],
        );
        assert_eq!(turn.content, TurnContent::Text("Content of readme:\n# Title".into()));
    }

    #[test]
    fn audio_and_video_become_labeled_placeholders() {
        let turn = normalize(
            None,
            &[
                attachment("clip.mp4", "video/mp4", "data:video/mp4;base64,AAAA"),
                attachment("memo.ogg", "audio/ogg", "data:audio/ogg;base64,AAAA"),
            ],
        );
        assert_eq!(
            parts(&turn),
            vec![
                ContentPart::Text("[Video file attached: clip.mp4]".into()),
                ContentPart::Text("[Audio file attached: memo.ogg]".into()),
            ]
        );
    }

    #[test]
    fn unparsed_document_becomes_placeholder() {
        let turn = normalize(
            None,
            &[attachment("report.pdf", "application/pdf", "data:application/pdf;base64,JVBERi0=")],
        );
        assert_eq!(
            turn.content,
            TurnContent::Text("[Document attached: report.pdf]".into())
        );
    }

    #[test]
    fn decode_failures_degrade_without_dropping_other_attachments() {
        let turn = normalize(
            Some("see files"),
            &[
                attachment("broken.txt", "text/plain", "data:text/plain;base64,@@not-base64@@"),
                attachment("broken.png", "image/png", "data:image/png;base64"),
                attachment("ok.png", "image/png", "QUJD"),
            ],
        );
        assert_eq!(
            parts(&turn),
            vec![
                ContentPart::Text("see files".into()),
                ContentPart::Text("[Document attached: broken.txt]".into()),
                ContentPart::Text("[Image attached: broken.png]".into()),
                ContentPart::Image("QUJD".into()),
            ]
        );
    }

    #[test]
    fn empty_input_still_yields_a_user_turn() {
        let turn = normalize(Some("   "), &[]);
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, TurnContent::Parts(Vec::new()));
    }

    #[test]
    fn plain_data_uri_is_percent_decoded() {
        let turn = normalize(
            None,
            &[attachment("note.txt", "text/plain", "data:text/plain,hello%20world%21")],
        );
        assert_eq!(
            turn.content,
            TurnContent::Text("Content of note.txt:\nhello world!".into())
        );
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        // 0xff 0xfe 'a'
        let turn = normalize(None, &[attachment("bin.txt", "text/plain", "//5h")]);
        let text = turn.text();
        assert!(text.starts_with("Content of bin.txt:\n"));
        assert!(text.ends_with('a'));
    }
}
