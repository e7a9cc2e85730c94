//! Conversion between mail models and RFC 5322 mail text.

use base64::Engine;
use std::collections::BTreeMap;

use super::{split_addresses, AttachmentPart, BodyPart, MailRequest};

/// Render a mail request as mail text with CRLF line endings.
///
/// Attachments produce a `multipart/mixed` mail. Bcc recipients are not
/// written to the headers.
pub fn render(request: &MailRequest, boundary: &str) -> String {
    let mut lines = vec![
        format!("From: {}", request.from),
        format!("To: {}", request.to),
    ];
    if !request.cc.is_empty() {
        lines.push(format!("Cc: {}", request.cc));
    }
    if !request.reply_to.is_empty() {
        lines.push(format!("Reply-To: {}", request.reply_to));
    }
    lines.push(format!("Subject: {}", request.subject));
    lines.push(format!("Date: {}", chrono::Utc::now().to_rfc2822()));
    lines.push("MIME-Version: 1.0".to_string());

    if request.body.attachments.is_empty() {
        lines.push(format!("Content-Type: {}", with_charset(&request.body.content_type)));
        lines.push(String::new());
        lines.push(request.body.content.clone());
    } else {
        lines.push(format!("Content-Type: multipart/mixed; boundary=\"{}\"", boundary));
        lines.push(String::new());
        lines.push(format!("--{}", boundary));
        lines.push(format!("Content-Type: {}", with_charset(&request.body.content_type)));
        lines.push(String::new());
        lines.push(request.body.content.clone());
        for attachment in &request.body.attachments {
            lines.push(format!("--{}", boundary));
            lines.push(format!("Content-Type: {}; name=\"{}\"", attachment.content_type, attachment.file_name));
            lines.push("Content-Transfer-Encoding: base64".to_string());
            lines.push(format!("Content-Disposition: attachment; filename=\"{}\"", attachment.file_name));
            lines.push(String::new());
            lines.push(attachment.content.clone());
        }
        lines.push(format!("--{}--", boundary));
    }

    lines.join("\n").replace("\r\n", "\n").replace('\n', "\r\n")
}

fn with_charset(content_type: &str) -> String {
    if content_type.starts_with("text/") && !content_type.contains("charset") {
        format!("{}; charset=UTF-8", content_type)
    } else {
        content_type.to_string()
    }
}

/// Headers (lower case names, folded lines joined) and body of a mail text
pub fn split_headers(text: &str) -> (BTreeMap<String, String>, String) {
    let text = text.replace("\r\n", "\n");
    let (head, body) = match text.split_once("\n\n") {
        Some((head, body)) => (head.to_string(), body.to_string()),
        None => (text.clone(), String::new()),
    };

    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in head.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some(name) = &current {
                if let Some(value) = headers.get_mut(name) {
                    value.push(' ');
                    value.push_str(line.trim());
                }
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            headers.insert(name.clone(), value.trim().to_string());
            current = Some(name);
        }
    }
    (headers, body)
}

/// Value of a header parameter such as `boundary` or `filename`
pub fn header_param(value: &str, param: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|part| {
        let (name, value) = part.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case(param)
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn media_type(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// Parse received mail text into a mail request.
///
/// Envelope addresses fill in missing headers; envelope recipients that are
/// neither in `To` nor `Cc` are reported as bcc.
pub fn parse(text: &str, envelope_from: &str, envelope_to: &[String], split_multipart: bool) -> MailRequest {
    let (headers, body) = split_headers(text);
    let header = |name: &str| headers.get(name).cloned().unwrap_or_default();

    let from = headers.get("from").cloned().unwrap_or_else(|| envelope_from.to_string());
    let to = headers.get("to").cloned().unwrap_or_else(|| envelope_to.join(","));
    let cc = header("cc");
    let visible: Vec<String> = split_addresses(&to)
        .into_iter()
        .chain(split_addresses(&cc))
        .map(|address| bare_address(&address))
        .collect();
    let bcc = envelope_to
        .iter()
        .filter(|recipient| !visible.contains(&bare_address(recipient)))
        .cloned()
        .collect::<Vec<_>>()
        .join(",");

    let content_type = headers
        .get("content-type")
        .cloned()
        .unwrap_or_else(|| "text/plain".to_string());

    let body = if split_multipart && media_type(&content_type).starts_with("multipart/") {
        let mut parts = BodyPart::default();
        collect_parts(&content_type, &body, &mut parts);
        if parts.content_type.is_empty() {
            parts.content_type = "text/plain".to_string();
        }
        parts
    } else {
        BodyPart {
            content_type,
            content: body.trim_end_matches('\n').to_string(),
            attachments: Vec::new(),
        }
    };

    MailRequest {
        from,
        to,
        cc,
        bcc,
        reply_to: header("reply-to"),
        subject: header("subject"),
        body,
    }
}

/// `Name <a@b>` to `a@b`
fn bare_address(address: &str) -> String {
    match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => address[start + 1..end].to_string(),
        _ => address.trim().to_string(),
    }
}

/// First text part becomes the body, all other parts attachments
fn collect_parts(content_type: &str, body: &str, target: &mut BodyPart) {
    let Some(boundary) = header_param(content_type, "boundary") else {
        target.content = body.to_string();
        return;
    };

    let delimiter = format!("--{}", boundary);
    for raw_part in body.split(&delimiter).skip(1) {
        if raw_part.starts_with("--") {
            break;
        }
        let raw_part = raw_part.trim_start_matches('\n');
        let (part_headers, part_body) = split_headers(raw_part);
        let part_body = part_body.trim_end_matches('\n');
        let part_type = part_headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "text/plain".to_string());
        let disposition = part_headers.get("content-disposition").cloned().unwrap_or_default();

        if media_type(&part_type).starts_with("multipart/") {
            collect_parts(&part_type, part_body, target);
            continue;
        }

        let is_attachment = disposition.to_ascii_lowercase().starts_with("attachment");
        if !is_attachment && target.content_type.is_empty() && media_type(&part_type).starts_with("text/") {
            target.content_type = part_type;
            target.content = part_body.to_string();
            continue;
        }

        let base64_encoded = part_headers
            .get("content-transfer-encoding")
            .is_some_and(|encoding| encoding.eq_ignore_ascii_case("base64"));
        let content = if base64_encoded {
            part_body.split_whitespace().collect::<String>()
        } else {
            base64::engine::general_purpose::STANDARD.encode(part_body)
        };

        target.attachments.push(AttachmentPart {
            file_name: header_param(&disposition, "filename")
                .or_else(|| header_param(&part_type, "name"))
                .unwrap_or_default(),
            content_type: media_type(&part_type),
            content,
        });
    }
}
