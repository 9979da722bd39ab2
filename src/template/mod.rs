//! Template Module
//!
//! Single-pass token substitution over raw asset bytes. A token is a
//! delimiter-bounded span such as `<[API_URL]>`; its key is looked up through a
//! caller-supplied function and the span replaced with the result.


use crate::config::TemplateConfig;

// == Template Token ==
/// Span `[start, end)` over a buffer, both delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateToken {
    pub start: usize,
    pub end: usize,
}

impl TemplateToken {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

// == Template Engine ==
/// Scanner and substituter for one delimiter pair.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    left: Vec<u8>,
    right: Vec<u8>,
    /// Longest accepted span including both delimiters
    max_token_len: usize,
}

impl TemplateEngine {
    /// Delimiters must be non-empty, otherwise no token is ever found.
    pub fn new(left: &str, right: &str, max_token_len: usize) -> Self {
        Self {
            left: left.as_bytes().to_vec(),
            right: right.as_bytes().to_vec(),
            max_token_len,
        }
    }

    pub fn from_config(config: &TemplateConfig) -> Self {
        Self::new(&config.left, &config.right, config.max_token_len)
    }

    // == Scan ==
    /// Finds all replaceable tokens, ordered and non-overlapping.
    ///
    /// A span longer than `max_token_len` is skipped and stays verbatim; the
    /// search then resumes right after its start delimiter so later tokens are
    /// still found.
    pub fn scan(&self, buf: &[u8]) -> Vec<TemplateToken> {
        let mut tokens = Vec::new();
        let mut pos = 0;
        // first end delimiter at or after the last searched offset
        let mut cached_end: Option<usize> = None;

        while let Some(start) = find(buf, &self.left, pos) {
            let key_start = start + self.left.len();
            let end = match cached_end {
                Some(e) if e >= key_start => e,
                _ => match find(buf, &self.right, key_start) {
                    Some(e) => e,
                    // no end delimiter left, so no later token can close either
                    None => break,
                },
            };
            cached_end = Some(end);

            let span_end = end + self.right.len();
            if span_end - start > self.max_token_len {
                pos = start + 1;
                continue;
            }
            tokens.push(TemplateToken {
                start,
                end: span_end,
            });
            pos = span_end;
        }
        tokens
    }

    /// Key bytes strictly between the delimiters of `token`.
    pub fn key<'a>(&self, buf: &'a [u8], token: &TemplateToken) -> &'a [u8] {
        &buf[token.start + self.left.len()..token.end - self.right.len()]
    }

    // == Substitute ==
    /// Copies `buf` with every token replaced by `resolve(key)`.
    ///
    /// An empty replacement deletes the token. Replacements are written as-is
    /// and never scanned again.
    pub fn substitute<F>(&self, buf: &[u8], tokens: &[TemplateToken], mut resolve: F) -> Vec<u8>
    where
        F: FnMut(&str) -> String,
    {
        let mut out = Vec::with_capacity(buf.len());
        let mut last = 0;
        for token in tokens {
            out.extend_from_slice(&buf[last..token.start]);
            let key = String::from_utf8_lossy(self.key(buf, token));
            let replacement = resolve(&key);
            if !replacement.is_empty() {
                out.extend_from_slice(replacement.as_bytes());
            }
            last = token.end;
        }
        out.extend_from_slice(&buf[last..]);
        out
    }

    /// Scan and substitute in one call.
    pub fn render<F>(&self, buf: &[u8], resolve: F) -> Vec<u8>
    where
        F: FnMut(&str) -> String,
    {
        let tokens = self.scan(buf);
        self.substitute(buf, &tokens, resolve)
    }
}

/// Default replacement source: process environment, unset → empty.
pub fn env_lookup(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
