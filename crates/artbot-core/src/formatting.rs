//! Rendering of outgoing messages for platforms that speak Telegram-style HTML.

use crate::messaging::types::{Embed, OutgoingMessage};

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render `msg` as HTML no longer than `max_len` characters.
pub fn render_html(msg: &OutgoingMessage, max_len: usize) -> String {
    let html = match msg {
        OutgoingMessage::Text(text) => escape_html(text),
        OutgoingMessage::Embed(embed) => embed_to_html(embed),
    };
    truncate_chars(&html, max_len)
}

fn embed_to_html(embed: &Embed) -> String {
    let title = format!("<b>{}</b>", escape_html(&embed.title));
    let mut lines = vec![match &embed.url {
        Some(url) => format!(r#"<a href="{}">{title}</a>"#, escape_html(url)),
        None => title,
    }];

    if let Some(desc) = &embed.description {
        lines.push(escape_html(desc));
    }

    // Telegram has no side-by-side fields; inline ones share a line.
    let mut inline = Vec::new();
    for field in &embed.fields {
        let rendered = format!(
            "<b>{}</b>: {}",
            escape_html(&field.name),
            escape_html(&field.value)
        );
        if field.inline {
            inline.push(rendered);
        } else {
            flush_inline(&mut lines, &mut inline);
            lines.push(rendered);
        }
    }
    flush_inline(&mut lines, &mut inline);

    if let Some(image) = &embed.image_url {
        lines.push(format!(r#"<a href="{}">🖼</a>"#, escape_html(image)));
    }

    let footer = match (&embed.footer, embed.timestamp) {
        (Some(f), Some(ts)) => Some(format!("{} • {}", f, ts.format("%Y-%m-%d %H:%M UTC"))),
        (Some(f), None) => Some(f.clone()),
        (None, Some(ts)) => Some(ts.format("%Y-%m-%d %H:%M UTC").to_string()),
        (None, None) => None,
    };
    if let Some(footer) = footer {
        lines.push(format!("<i>{}</i>", escape_html(&footer)));
    }

    lines.join("\n")
}

fn flush_inline(lines: &mut Vec<String>, inline: &mut Vec<String>) {
    if !inline.is_empty() {
        lines.push(inline.join(" | "));
        inline.clear();
    }
}

/// Cut `text` to at most `max_len` characters, marking the cut with an ellipsis.
///
/// Only used on rendered HTML, so it backs off to before an unclosed tag or entity.
fn truncate_chars(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len.saturating_sub(1)).collect();
    if let Some(open) = out.rfind(['<', '&']) {
        if !out[open..].contains(['>', ';']) {
            out.truncate(open);
        }
    }
    out.push('…');
    out
}
