// Left-to-right region scanner over assembled message text.
//
// Recognises reasoning regions (`<thinking>`, `<think>`, `<reasoning>`) and
// tool invocation regions (`<tool_action ...>` / `<action ...>`). A region
// whose closing tag has not arrived runs to end of input. An opening tag with
// no `>` yet is left in the surrounding text.
use std::ops::Range;

use memchr::{memchr, memchr_iter, memmem};

const REASONING_TAGS: [(&str, &str); 3] = [
    ("<thinking>", "</thinking>"),
    ("<think>", "</think>"),
    ("<reasoning>", "</reasoning>"),
];

const INVOCATION_TAGS: [(&str, &str); 2] = [
    ("<tool_action", "</tool_action>"),
    ("<action", "</action>"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Text(Range<usize>),
    Reasoning {
        span: Range<usize>,
        inner: Range<usize>,
        terminated: bool,
    },
    Invocation {
        span: Range<usize>,
        open_tag: Range<usize>,
        body: Range<usize>,
        terminated: bool,
    },
}

pub(crate) fn scan(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0usize;
    let mut resume_at = 0usize;

    for lt in memchr_iter(b'<', bytes) {
        if lt < resume_at {
            continue;
        }
        let Some(region) = match_region(text, lt) else {
            continue;
        };
        if text_start < lt {
            tokens.push(Token::Text(text_start..lt));
        }
        resume_at = region_end(&region);
        text_start = resume_at;
        tokens.push(region);
    }

    if text_start < bytes.len() {
        tokens.push(Token::Text(text_start..bytes.len()));
    }
    tokens
}

fn region_end(token: &Token) -> usize {
    match token {
        Token::Text(range) => range.end,
        Token::Reasoning { span, .. } | Token::Invocation { span, .. } => span.end,
    }
}

fn match_region(text: &str, at: usize) -> Option<Token> {
    let rest = &text.as_bytes()[at..];
    for (open, close) in REASONING_TAGS {
        if rest.starts_with(open.as_bytes()) {
            return Some(reasoning_region(text, at, open, close));
        }
    }
    for (open, close) in INVOCATION_TAGS {
        if rest.starts_with(open.as_bytes())
            && rest
                .get(open.len())
                .is_some_and(|&b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
        {
            return invocation_region(text, at, open, close);
        }
    }
    None
}

fn reasoning_region(text: &str, at: usize, open: &str, close: &str) -> Token {
    let inner_start = at + open.len();
    match memmem::find(&text.as_bytes()[inner_start..], close.as_bytes()) {
        Some(rel) => Token::Reasoning {
            span: at..inner_start + rel + close.len(),
            inner: inner_start..inner_start + rel,
            terminated: true,
        },
        None => Token::Reasoning {
            span: at..text.len(),
            inner: inner_start..text.len(),
            terminated: false,
        },
    }
}

fn invocation_region(text: &str, at: usize, open: &str, close: &str) -> Option<Token> {
    let bytes = text.as_bytes();
    let attrs_start = at + open.len();
    let gt = attrs_start + memchr(b'>', &bytes[attrs_start..])?;
    let open_tag = at..gt + 1;

    if bytes[gt - 1] == b'/' {
        return Some(Token::Invocation {
            span: open_tag.clone(),
            open_tag,
            body: gt + 1..gt + 1,
            terminated: true,
        });
    }

    let body_start = gt + 1;
    Some(match memmem::find(&bytes[body_start..], close.as_bytes()) {
        Some(rel) => Token::Invocation {
            span: at..body_start + rel + close.len(),
            open_tag,
            body: body_start..body_start + rel,
            terminated: true,
        },
        None => Token::Invocation {
            span: at..text.len(),
            open_tag,
            body: body_start..text.len(),
            terminated: false,
        },
    })
}
