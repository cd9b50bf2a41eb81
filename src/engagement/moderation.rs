//! Comment moderation gate and mention tokenization.
//!
//! Both entry points are pure functions of their inputs: `validate` gates a
//! submission against the visible thread, `tokenize_mentions` splits text
//! for rendering and never alters what was validated or stored.

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static MENTION_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"@([A-Za-z0-9_]{2,32})").expect("mention regex"));

/// Longest accepted comment, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// Minimum spacing between two comments by the same author in one thread.
pub const RESUBMIT_COOLDOWN_SECS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
  Comment,
  Reply,
}

/// A comment already visible in-thread, as the gate sees it.
#[derive(Debug, Clone, Copy)]
pub struct VisibleComment<'a> {
  pub id: &'a str,
  pub author_id: &'a str,
  pub author_username: &'a str,
  pub text: &'a str,
  pub created_at: DateTime<Utc>,
}

/// The root comment being replied to, when the submission is a reply.
#[derive(Debug, Clone, Copy)]
pub struct ParentRef<'a> {
  pub id: &'a str,
  pub author_username: &'a str,
}

/// Everything the gate may consider. No hidden state, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct ModerationContext<'a> {
  pub post_id: &'a str,
  pub post_author: &'a str,
  pub kind: SubmissionKind,
  pub parent: Option<ParentRef<'a>>,
  pub author_id: &'a str,
  pub existing: &'a [VisibleComment<'a>],
  pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
  /// Submission passed; carries the sanitized text to store.
  Accepted(String),
  /// Submission failed; carries the human-readable reason to flash.
  Rejected(String),
}

/// Gate a raw submission. Returns the sanitized text on acceptance or a
/// displayable reason on rejection.
pub fn validate(raw: &str, ctx: &ModerationContext) -> Verdict {
  let text = sanitize(raw);

  if text.is_empty() {
    return Verdict::Rejected("Say something first".into());
  }
  if text.chars().count() > MAX_COMMENT_CHARS {
    return Verdict::Rejected(format!("Keep it under {} characters", MAX_COMMENT_CHARS));
  }

  let own_latest = ctx
    .existing
    .iter()
    .filter(|c| c.author_id == ctx.author_id)
    .map(|c| c.created_at)
    .max();
  if let Some(latest) = own_latest {
    if ctx.now - latest < Duration::seconds(RESUBMIT_COOLDOWN_SECS) {
      return Verdict::Rejected("You're commenting too fast".into());
    }
  }

  let duplicate = ctx
    .existing
    .iter()
    .any(|c| c.author_id == ctx.author_id && sanitize(c.text).eq_ignore_ascii_case(&text));
  if duplicate {
    return Verdict::Rejected("You've already posted that in this thread".into());
  }

  for token in tokenize_mentions(&text) {
    if let Token::Mention(name) = token {
      if !is_participant(&name, ctx) {
        return Verdict::Rejected(format!("@{} isn't part of this thread", name));
      }
    }
  }

  Verdict::Accepted(text)
}

/// Strip control characters (newlines excepted), collapse runs of blank
/// lines, and trim.
fn sanitize(raw: &str) -> String {
  let cleaned: String = raw
    .chars()
    .filter(|c| !c.is_control() || *c == '\n')
    .collect();

  let mut out = String::with_capacity(cleaned.len());
  let mut newline_run = 0usize;
  for c in cleaned.chars() {
    if c == '\n' {
      newline_run += 1;
      if newline_run > 2 {
        continue;
      }
    } else {
      newline_run = 0;
    }
    out.push(c);
  }
  out.trim().to_string()
}

fn is_participant(name: &str, ctx: &ModerationContext) -> bool {
  let matches = |candidate: &str| candidate.eq_ignore_ascii_case(name);

  matches(ctx.post_author)
    || ctx
      .parent
      .map(|p| matches(p.author_username))
      .unwrap_or(false)
    || ctx.existing.iter().any(|c| matches(c.author_username))
}

/// A rendering token: plain text or an `@username` mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
  Text(String),
  Mention(String),
}

/// Split text into plain and mention tokens. Joining the tokens back (with
/// the `@` restored on mentions) reproduces the input exactly.
pub fn tokenize_mentions(text: &str) -> Vec<Token> {
  let mut tokens = Vec::new();
  let mut last = 0usize;

  for m in MENTION_RE.captures_iter(text) {
    let whole = m.get(0).expect("match");
    if whole.start() > last {
      tokens.push(Token::Text(text[last..whole.start()].to_string()));
    }
    tokens.push(Token::Mention(m[1].to_string()));
    last = whole.end();
  }
  if last < text.len() {
    tokens.push(Token::Text(text[last..].to_string()));
  }

  tokens
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ctx<'a>(existing: &'a [VisibleComment<'a>]) -> ModerationContext<'a> {
    ModerationContext {
      post_id: "p1",
      post_author: "ana",
      kind: SubmissionKind::Comment,
      parent: None,
      author_id: "u2",
      existing,
      now: Utc::now(),
    }
  }

  fn visible<'a>(
    id: &'a str,
    author_id: &'a str,
    author_username: &'a str,
    text: &'a str,
    seconds_ago: i64,
  ) -> VisibleComment<'a> {
    VisibleComment {
      id,
      author_id,
      author_username,
      text,
      created_at: Utc::now() - Duration::seconds(seconds_ago),
    }
  }

  #[test]
  fn test_accepts_and_sanitizes() {
    let existing: [VisibleComment; 0] = [];
    let verdict = validate("  loved the pacing here\u{7}  ", &ctx(&existing));
    assert_eq!(verdict, Verdict::Accepted("loved the pacing here".into()));
  }

  #[test]
  fn test_rejects_empty_after_trim() {
    let existing: [VisibleComment; 0] = [];
    assert!(matches!(validate("   \n ", &ctx(&existing)), Verdict::Rejected(_)));
  }

  #[test]
  fn test_rejects_over_length() {
    let existing: [VisibleComment; 0] = [];
    let long = "x".repeat(MAX_COMMENT_CHARS + 1);
    assert!(matches!(validate(&long, &ctx(&existing)), Verdict::Rejected(_)));
  }

  #[test]
  fn test_rejects_rapid_resubmission() {
    let existing = [visible("c1", "u2", "ben", "first take", 2)];
    let verdict = validate("second take", &ctx(&existing));
    assert_eq!(verdict, Verdict::Rejected("You're commenting too fast".into()));
  }

  #[test]
  fn test_rejects_duplicate_text_by_same_author_only() {
    let existing = [
      visible("c1", "u2", "ben", "Great ending", 60),
      visible("c2", "u3", "cam", "agreed!", 30),
    ];
    // Same author, same text (case-insensitive) -> rejected
    assert!(matches!(
      validate("great ending", &ctx(&existing)),
      Verdict::Rejected(_)
    ));
    // Different author posting the same words is fine
    let mut other = ctx(&existing);
    other.author_id = "u4";
    assert!(matches!(validate("great ending", &other), Verdict::Accepted(_)));
  }

  #[test]
  fn test_rejects_mention_of_stranger() {
    let existing = [visible("c1", "u3", "cam", "solid pick", 60)];
    let verdict = validate("@zoe have you seen this?", &ctx(&existing));
    assert_eq!(verdict, Verdict::Rejected("@zoe isn't part of this thread".into()));
  }

  #[test]
  fn test_accepts_mentions_of_participants() {
    let existing = [visible("c1", "u3", "cam", "solid pick", 60)];
    // Post author and commenters are fair game
    let verdict = validate("@ana and @cam agree", &ctx(&existing));
    assert!(matches!(verdict, Verdict::Accepted(_)));

    // The parent author counts too when replying
    let mut reply = ctx(&existing);
    reply.kind = SubmissionKind::Reply;
    reply.parent = Some(ParentRef {
      id: "c9",
      author_username: "dee",
    });
    assert!(matches!(validate("thanks @dee", &reply), Verdict::Accepted(_)));
  }

  #[test]
  fn test_blank_line_runs_collapse() {
    let existing: [VisibleComment; 0] = [];
    let verdict = validate("top\n\n\n\nbottom", &ctx(&existing));
    assert_eq!(verdict, Verdict::Accepted("top\n\nbottom".into()));
  }

  #[test]
  fn test_tokenize_roundtrips_input() {
    let text = "hey @ana, @cam said hi (cc @ben_99)";
    let tokens = tokenize_mentions(text);

    let rebuilt: String = tokens
      .iter()
      .map(|t| match t {
        Token::Text(s) => s.clone(),
        Token::Mention(name) => format!("@{}", name),
      })
      .collect();
    assert_eq!(rebuilt, text);

    let mentions: Vec<&str> = tokens
      .iter()
      .filter_map(|t| match t {
        Token::Mention(name) => Some(name.as_str()),
        _ => None,
      })
      .collect();
    assert_eq!(mentions, vec!["ana", "cam", "ben_99"]);
  }

  #[test]
  fn test_tokenize_without_mentions_is_one_text_token() {
    assert_eq!(
      tokenize_mentions("no handles here"),
      vec![Token::Text("no handles here".into())]
    );
    assert_eq!(tokenize_mentions(""), Vec::<Token>::new());
  }

  #[test]
  fn test_validate_is_pure() {
    let existing = [visible("c1", "u3", "cam", "solid pick", 60)];
    let context = ctx(&existing);
    assert_eq!(validate("hello @cam", &context), validate("hello @cam", &context));
  }
}
