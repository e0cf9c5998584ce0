//! Renders records as Telegram HTML messages with their action buttons.
use crate::model::{ActionButton, ButtonLayout, CallbackAction, FormattedMessage, Record};

/// Business limit on the quoted body, in characters.
pub const BODY_LIMIT: usize = 1000;
const BODY_KEEP: usize = BODY_LIMIT - 3;
const ELLIPSIS: &str = "...";

/// Length the chat transport accepts after a "message is too long" rejection.
pub const TRANSPORT_FALLBACK_LIMIT: usize = 3000;
pub const TRANSPORT_TRUNCATION_NOTICE: &str =
    "...\n\n(Content truncated due to length. Click 'View full content' to read more)";

pub const VIEW_FULL_CONTENT: &str = "View full content";
pub const APPROVE_LABEL: &str = "✅ Approve";

/// Escape text for embedding in Telegram HTML.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// First `limit` characters of `text`, and whether anything was cut.
fn take_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

/// Join paragraphs and apply the body limit.
pub fn bounded_body<S: AsRef<str>>(paragraphs: &[S]) -> String {
    let joined = paragraphs
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n\n");
    if joined.chars().count() > BODY_LIMIT {
        let (head, _) = take_chars(&joined, BODY_KEEP);
        format!("{head}{ELLIPSIS}")
    } else {
        joined
    }
}

pub fn buttons_for(record: &Record) -> ButtonLayout {
    ButtonLayout::new(vec![
        vec![ActionButton::Link {
            label: VIEW_FULL_CONTENT.into(),
            url: record.url.clone(),
        }],
        vec![ActionButton::Callback {
            label: APPROVE_LABEL.into(),
            action: CallbackAction::approve(record.id.clone()),
        }],
    ])
}

/// Render a record whose content has been extracted. Returns `None` when the
/// record lacks a title or content.
pub fn format(record: &Record) -> Option<FormattedMessage> {
    let title = escape_html(record.title.as_deref()?);
    let content = record.content.as_ref()?;
    let paragraphs: Vec<&str> = content.iter().map(|b| b.as_str()).collect();
    let body = escape_html(&bounded_body(&paragraphs));

    let text = format!("📝 <b>{title}</b>\n\n💬 <blockquote>{body}</blockquote>\n\n");
    Some(FormattedMessage {
        text,
        buttons: buttons_for(record),
    })
}

/// Second-chance body for a message the transport rejected as too long.
///
/// The cut never lands inside a tag or an entity, and tags left open by the
/// cut are closed before the notice so the result still parses as HTML.
pub fn shorten_for_transport(text: &str) -> String {
    let (head, cut) = take_chars(text, TRANSPORT_FALLBACK_LIMIT);
    if !cut {
        return format!("{head}{TRANSPORT_TRUNCATION_NOTICE}");
    }
    let head = markup_safe_prefix(head);
    let closers: String = open_tags(head)
        .iter()
        .rev()
        .map(|tag| format!("</{tag}>"))
        .collect();
    format!("{head}{closers}{TRANSPORT_TRUNCATION_NOTICE}")
}

/// Drop a trailing partial tag (`<blockq`) or entity (`&am`).
fn markup_safe_prefix(head: &str) -> &str {
    let mut end = head.len();
    if let Some(lt) = head.rfind('<') {
        if !head[lt..].contains('>') {
            end = lt;
        }
    }
    let head = &head[..end];
    if let Some(amp) = head.rfind('&') {
        if !head[amp..].contains(';') {
            end = amp;
        }
    }
    &head[..end]
}

/// Tags opened in `html` and not yet closed, outermost first.
fn open_tags(html: &str) -> Vec<&str> {
    let mut stack = Vec::new();
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else { break };
        let tag = &after[..gt];
        if let Some(name) = tag.strip_prefix('/') {
            if stack.last() == Some(&name.trim()) {
                stack.pop();
            }
        } else if let Some(name) = tag.split_whitespace().next() {
            stack.push(name);
        }
        rest = &after[gt + 1..];
    }
    stack
}
