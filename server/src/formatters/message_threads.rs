//! Message threads ("recados") left for a staff member.
//!
//! A thread is stored as one text field: entries separated by `---`, each
//! starting with an `author > date > time` header line followed by the
//! message body.

use std::fmt::Write as _;

use crate::scheduling::{Record, SchedulingSchema};

/// Entries shown per thread, most recent last.
const SHOWN_ENTRIES: usize = 3;

const SEPARATOR: &str = "━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ThreadEntry {
    author: String,
    date: String,
    time: String,
    body: String,
}

fn parse_thread(text: &str) -> Vec<ThreadEntry> {
    let text = text.replace("\r\n", "\r").replace('\n', "\r");
    text.split("---")
        .filter_map(|block| {
            let block = block.trim().trim_matches('\r');
            if block.is_empty() {
                return None;
            }

            let (header, content) = block.split_once('\r').unwrap_or((block, ""));
            let header = header.trim();
            let parts: Vec<&str> = header.split('>').map(str::trim).collect();
            let (author, date, time) = match parts.as_slice() {
                [author, date, time, ..] => (
                    (*author).to_string(),
                    (*date).to_string(),
                    time.split(':').take(2).collect::<Vec<_>>().join(":"),
                ),
                [author, date] => ((*author).to_string(), (*date).to_string(), String::new()),
                _ => (header.to_string(), String::new(), String::new()),
            };

            let body = content.trim();
            Some(ThreadEntry {
                author,
                date,
                time,
                body: if body.is_empty() {
                    "(sin contenido)".to_string()
                } else {
                    body.to_string()
                },
            })
        })
        .collect()
}

/// Render the message threads addressed to `name`.
pub fn format_message_threads(
    records: &[Record],
    schema: &SchedulingSchema,
    name: &str,
) -> String {
    let threads: Vec<Vec<ThreadEntry>> = records
        .iter()
        .map(|r| parse_thread(r.field_str(&schema.messages_text_field)))
        .filter(|entries| !entries.is_empty())
        .collect();

    if threads.is_empty() {
        return format!("*{name}*, no tienes recados pendientes. ✅");
    }

    let mut msg = format!("*📋 Recados para {name}*\n");
    let _ = writeln!(msg, "_{} recado(s) encontrado(s)_", threads.len());
    let _ = writeln!(msg, "{SEPARATOR}");

    for (i, entries) in threads.iter().enumerate() {
        let _ = writeln!(msg, "\n*Recado #{}*", i + 1);
        let hidden = entries.len().saturating_sub(SHOWN_ENTRIES);
        if hidden > 0 {
            let _ = writeln!(msg, "_... {hidden} mensaje(s) anterior(es)_");
        }
        for entry in &entries[hidden..] {
            let _ = writeln!(msg, "👤 *{}* — {} {}", entry.author, entry.date, entry.time);
            let _ = writeln!(msg, "   {}", entry.body);
        }
        let _ = writeln!(msg, "{SEPARATOR}");
    }

    msg.trim_end_matches('\n').to_string()
}
