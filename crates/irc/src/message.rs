//! IRC line parsing and outbound text splitting.

use std::fmt;

/// Maximum length of one protocol line, CRLF included.
pub const MAX_LINE_BYTES: usize = 512;

/// Room left for the `:nick!user@host ` prefix the server prepends when it
/// relays our `PRIVMSG` to recipients.
const RELAY_PREFIX_RESERVE: usize = 100;

/// A parsed IRC message. IRCv3 tags are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Parse one line (with or without the trailing CRLF).
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if rest.starts_with('@') {
            let (_, after) = rest.split_once(' ')?;
            rest = after;
        }
        rest = rest.trim_start_matches(' ');

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, after) = stripped.split_once(' ')?;
            rest = after.trim_start_matches(' ');
            Some(prefix.to_string())
        } else {
            None
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Some(Self {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host`).
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .and_then(|p| p.split('!').next())
            .filter(|n| !n.is_empty())
    }

    /// Three-digit numeric reply code, if this is a numeric.
    pub fn numeric(&self) -> Option<u16> {
        if self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit()) {
            self.command.parse().ok()
        } else {
            None
        }
    }

    /// Last parameter, which carries free text for most commands.
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            if i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':')) {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

/// Lowercase a nickname or channel name with the rfc1459 casemapping.
pub fn irc_lowercase(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' => '^',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Whether `text` can go into an outgoing line without ending it early.
pub fn is_line_safe(text: &str) -> bool {
    !text.contains(['\r', '\n', '\0'])
}

/// Text budget for one `PRIVMSG <target> :` line.
pub fn privmsg_text_limit(target: &str) -> usize {
    let overhead = "PRIVMSG ".len() + target.len() + " :".len() + 2 + RELAY_PREFIX_RESERVE;
    MAX_LINE_BYTES.saturating_sub(overhead).max(1)
}

/// Split free text into chunks that each fit one protocol line.
///
/// Every input line becomes at least one chunk; blank lines are skipped.
/// Long lines break at the last space that fits, or mid-word when there is
/// none. Chunks never split a UTF-8 character.
pub fn split_text(text: &str, max_bytes: usize) -> Vec<String> {
    let max_bytes = max_bytes.max(1);
    let mut chunks = Vec::new();

    for line in text.split('\n') {
        let line: String = line.chars().filter(|c| *c != '\r' && *c != '\0').collect();
        if line.trim().is_empty() {
            continue;
        }

        let mut rest = line.as_str();
        while rest.len() > max_bytes {
            let mut cut = max_bytes;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            if cut == 0 {
                cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
            }
            if !rest[cut..].starts_with(' ')
                && let Some(space) = rest[..cut].rfind(' ')
                && space > 0
            {
                cut = space;
            }
            chunks.push(rest[..cut].to_string());
            rest = rest[cut..].trim_start_matches(' ');
        }
        if !rest.is_empty() {
            chunks.push(rest.to_string());
        }
    }

    chunks
}
