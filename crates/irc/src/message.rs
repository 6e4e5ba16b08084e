//! IRC line parsing and formatting.

use titlebot_common::error::AppError;

/// Longest line the protocol allows, excluding the trailing CR LF.
pub const MAX_LINE_BYTES: usize = 510;

/// Room left for the `:nick!user@host ` source the server prepends when it
/// relays our message: 30-byte nick, 10-byte user, 63-byte host.
pub const RELAY_PREFIX_BYTES: usize = 1 + 30 + 1 + 10 + 1 + 63 + 1;

/// One parsed IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Raw IRCv3 tag string without the leading `@`.
    pub tags: Option<String>,
    /// Source without the leading `:`, e.g. `nick!user@host`.
    pub prefix: Option<String>,
    /// Upper-cased command or three-digit numeric.
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        let tags = match rest.strip_prefix('@') {
            Some(tagged) => {
                let (tags, tail) = split_word(tagged);
                rest = tail;
                Some(tags.to_string())
            }
            None => None,
        };

        let prefix = match rest.strip_prefix(':') {
            Some(prefixed) => {
                let (prefix, tail) = split_word(prefixed);
                rest = tail;
                Some(prefix.to_string())
            }
            None => None,
        };

        let (command, mut rest) = split_word(rest);
        if command.is_empty() {
            return Err(AppError::Protocol(format!("no command in line {line:?}")));
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            let (param, tail) = split_word(rest);
            params.push(param.to_string());
            rest = tail;
        }

        Ok(Self {
            tags,
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nick part of the prefix, if the source is a user.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start_matches(' ');
    match s.find(' ') {
        Some(i) => (&s[..i], s[i..].trim_start_matches(' ')),
        None => (s, ""),
    }
}

/// Build a `PRIVMSG` line for `target`.
///
/// Line breaks in `text` become spaces and the text is cut on a character
/// boundary so the line still fits [`MAX_LINE_BYTES`] once the server adds
/// our source prefix.
pub fn privmsg(target: &str, text: &str) -> String {
    let head = format!("PRIVMSG {target} :");
    let budget = MAX_LINE_BYTES
        .saturating_sub(RELAY_PREFIX_BYTES)
        .saturating_sub(head.len());
    let text: String = text
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    format!("{head}{}", truncate_on_char_boundary(&text, budget))
}

pub fn truncate_on_char_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
