//! Envelope argument parsing for MAIL FROM and RCPT TO.

use epistle_core::address::Address;
use thiserror::Error;

/// Why a MAIL or RCPT argument string was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    /// The `FROM:` / `TO:` keyword is missing.
    #[error("Expected {0}:<address>")]
    MissingKeyword(&'static str),

    /// Bracket enforcement is on and the path is not bracketed.
    #[error("Address must be enclosed in angle brackets")]
    MissingBrackets,

    /// The path did not parse as an address.
    #[error("Unable to parse address: {0}")]
    BadAddress(String),

    /// RFC 1870 allows at most one SIZE parameter.
    #[error("Duplicate SIZE parameter not allowed")]
    DuplicateSize,
}

/// Parse `FROM:<path> [SIZE=n] [params...]`.
///
/// Returns the sender (`None` for the null reverse-path `<>`) and the
/// declared SIZE, if any. A malformed or zero SIZE value is ignored, but
/// a duplicated SIZE parameter is rejected outright.
pub fn parse_mail_args(
    args: &str,
    enforce_brackets: bool,
) -> Result<(Option<Address>, Option<usize>), SyntaxError> {
    let rest = strip_keyword(args, "FROM:").ok_or(SyntaxError::MissingKeyword("FROM"))?;
    let rest = rest.trim();

    let (path, params) = match rest.split_once(char::is_whitespace) {
        Some((path, params)) => (path, Some(params)),
        None => (rest, None),
    };

    let size = match params {
        Some(params) => parse_size_param(params)?,
        None => None,
    };

    let path = check_brackets(path, enforce_brackets)?;

    // The null reverse-path is not an address; handle it before parsing.
    if path == "<>" {
        return Ok((None, size));
    }

    let sender = parse_path(path)?;
    Ok((Some(sender), size))
}

/// Parse `TO:<path>`.
pub fn parse_rcpt_args(args: &str, enforce_brackets: bool) -> Result<Address, SyntaxError> {
    let rest = strip_keyword(args, "TO:").ok_or(SyntaxError::MissingKeyword("TO"))?;
    let path = check_brackets(rest.trim(), enforce_brackets)?;

    parse_path(path)
}

fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    args.get(..keyword.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(keyword))
        .map(|_| &args[keyword.len()..])
}

fn check_brackets(path: &str, enforce: bool) -> Result<&str, SyntaxError> {
    if enforce && !(path.starts_with('<') && path.ends_with('>')) {
        return Err(SyntaxError::MissingBrackets);
    }

    Ok(path)
}

fn parse_path(path: &str) -> Result<Address, SyntaxError> {
    match mailparse::addrparse(path) {
        Ok(mut addresses) if !addresses.is_empty() => Ok(Address(addresses.remove(0))),
        Ok(_) => Err(SyntaxError::BadAddress(path.to_string())),
        Err(err) => Err(SyntaxError::BadAddress(err.to_string())),
    }
}

/// Extract the RFC 1870 SIZE parameter from the ESMTP parameter list.
fn parse_size_param(params: &str) -> Result<Option<usize>, SyntaxError> {
    let size_params: Vec<&str> = params
        .split_whitespace()
        .filter(|param| {
            param
                .get(..5)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SIZE="))
        })
        .collect();

    if size_params.len() > 1 {
        return Err(SyntaxError::DuplicateSize);
    }

    Ok(size_params.first().and_then(|param| {
        param.split('=').nth(1).and_then(|value| {
            value.parse::<usize>().ok().and_then(|size| {
                // RFC 1870 reads SIZE=0 as "no fixed maximum"; a client
                // declaring a 0-byte message is not saying anything useful.
                if size == 0 { None } else { Some(size) }
            })
        })
    }))
}
