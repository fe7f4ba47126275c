//! AS2 message-id template expansion.
//!
//! Templates carry `$…$` replacement tokens: `$date.<pattern>$` with a
//! Java-style date pattern, `$rand.<digits>$` producing a random number
//! with as many digits as the token literal, and
//! `$msg.sender.as2_id$` / `$msg.receiver.as2_id$`.

use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

/// Error expanding a message-id template.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageIdError {
    /// A `$` without a closing `$`.
    #[error("unterminated '$' token in message id format")]
    UnterminatedToken,

    /// A token this implementation does not know.
    #[error("unknown message id token '${0}$'")]
    UnknownToken(String),

    /// A date pattern with letters that have no mapping.
    #[error("unsupported date pattern '{0}'")]
    BadDatePattern(String),
}

/// Expand a message-id template.
pub fn expand_message_id(
    format: &str,
    sender_as2_id: &str,
    receiver_as2_id: &str,
    at: DateTime<Utc>,
) -> Result<String, MessageIdError> {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('$').ok_or(MessageIdError::UnterminatedToken)?;
        let token = &after[..end];
        expand_token(token, sender_as2_id, receiver_as2_id, at, &mut out)?;
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn expand_token(
    token: &str,
    sender_as2_id: &str,
    receiver_as2_id: &str,
    at: DateTime<Utc>,
    out: &mut String,
) -> Result<(), MessageIdError> {
    if let Some(pattern) = token.strip_prefix("date.") {
        let strftime = java_date_pattern_to_strftime(pattern)?;
        out.push_str(&at.format(&strftime).to_string());
        return Ok(());
    }
    if let Some(digits) = token.strip_prefix("rand.") {
        // The literal's length determines the digit count.
        let width = digits.len().clamp(1, 9) as u32;
        let value = rand::thread_rng().gen_range(0..10u64.pow(width));
        out.push_str(&format!("{value:0width$}", width = width as usize));
        return Ok(());
    }
    match token {
        "msg.sender.as2_id" => {
            out.push_str(sender_as2_id);
            Ok(())
        }
        "msg.receiver.as2_id" => {
            out.push_str(receiver_as2_id);
            Ok(())
        }
        other => Err(MessageIdError::UnknownToken(other.to_string())),
    }
}

/// Translate the supported subset of Java's `SimpleDateFormat` patterns
/// into a chrono `strftime` string.
fn java_date_pattern_to_strftime(pattern: &str) -> Result<String, MessageIdError> {
    let mut out = String::new();
    let mut chars = pattern.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphabetic() {
            let mut run = 0usize;
            while chars.peek() == Some(&c) {
                chars.next();
                run += 1;
            }
            match c {
                'y' => out.push_str(if run == 2 { "%y" } else { "%Y" }),
                'M' => out.push_str("%m"),
                'd' => out.push_str("%d"),
                'H' => out.push_str("%H"),
                'm' => out.push_str("%M"),
                's' => out.push_str("%S"),
                'S' => out.push_str("%3f"),
                'Z' => out.push_str("%z"),
                _ => return Err(MessageIdError::BadDatePattern(pattern.to_string())),
            }
        } else {
            chars.next();
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 13, 45, 59).unwrap()
    }

    #[test]
    fn expands_ids_and_date() {
        let id = expand_message_id(
            "OpenPEPPOL-$date.ddMMyyyyHHmmssZ$-X@$msg.sender.as2_id$_$msg.receiver.as2_id$",
            "POP000001",
            "POP000002",
            at(),
        )
        .unwrap();
        assert_eq!(id, "OpenPEPPOL-15062024134559+0000-X@POP000001_POP000002");
    }

    #[test]
    fn rand_token_width_follows_literal() {
        let id = expand_message_id("$rand.1234$", "a", "b", at()).unwrap();
        assert_eq!(id.len(), 4);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn default_format_expands() {
        let id = expand_message_id(
            super::super::DEFAULT_MESSAGE_ID_FORMAT,
            "POP000092",
            "POP000092",
            at(),
        )
        .unwrap();
        assert!(id.starts_with("OpenPEPPOL-15062024134559+0000-"));
        assert!(id.ends_with("@POP000092_POP000092"));
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert_eq!(
            expand_message_id("$msg.subject$", "a", "b", at()),
            Err(MessageIdError::UnknownToken("msg.subject".into()))
        );
    }

    #[test]
    fn unterminated_token_is_rejected() {
        assert_eq!(
            expand_message_id("prefix-$rand.12", "a", "b", at()),
            Err(MessageIdError::UnterminatedToken)
        );
    }

    #[test]
    fn two_digit_year_pattern() {
        let id = expand_message_id("$date.yyMMdd$", "a", "b", at()).unwrap();
        assert_eq!(id, "240615");
    }
}
