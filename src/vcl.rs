//! VCL rendering and address validation.
//!
//! The rendered document is interpolated into a remote shell command, so every
//! host that reaches [`render_vcl`] from the broker is checked with
//! [`validate_host`] first.

use thiserror::Error;

/// Port the proxy forwards to on the bound application.
pub const BACKEND_PORT: u16 = 80;

/// Longest host name accepted, matching the DNS limit.
const MAX_HOST_LEN: usize = 253;

/// Errors raised when an address cannot be embedded safely.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddressError {
    /// Raised when the address is empty or only whitespace.
    #[error("address must not be empty")]
    Empty,
    /// Raised when the address exceeds the DNS length limit.
    #[error("address is longer than {MAX_HOST_LEN} characters")]
    TooLong,
    /// Raised when the address would be read as an option by `ssh`.
    #[error("address must not start with '-': {address}")]
    LeadingDash {
        /// Offending address.
        address: String,
    },
    /// Raised when the address contains a character outside the host alphabet.
    #[error("address {address:?} contains invalid character {character:?}")]
    InvalidCharacter {
        /// Offending address.
        address: String,
        /// First rejected character.
        character: char,
    },
}

/// Renders the default backend block pointing at `target` on port 80.
///
/// The target is embedded verbatim; callers validate it beforehand.
///
/// # Examples
///
/// ```
/// # use varnish_broker::vcl::render_vcl;
/// let vcl = render_vcl("myapp.example.com");
/// assert!(vcl.contains(".host = \"myapp.example.com\";"));
/// ```
#[must_use]
pub fn render_vcl(target: &str) -> String {
    format!(
        "backend default {{\n    .host = \"{target}\";\n    .port = \"{BACKEND_PORT}\";\n}}\n"
    )
}

/// Checks that `host` is a plain host name or IP literal.
///
/// # Errors
///
/// Returns [`AddressError`] describing the first rule the host breaks.
pub fn validate_host(host: &str) -> Result<(), AddressError> {
    if host.trim().is_empty() {
        return Err(AddressError::Empty);
    }
    if host.len() > MAX_HOST_LEN {
        return Err(AddressError::TooLong);
    }
    if host.starts_with('-') {
        return Err(AddressError::LeadingDash {
            address: host.to_owned(),
        });
    }
    if let Some(character) = host.chars().find(|ch| !is_host_char(*ch)) {
        return Err(AddressError::InvalidCharacter {
            address: host.to_owned(),
            character,
        });
    }
    Ok(())
}

const fn is_host_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_' | ':' | '[' | ']')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn render_vcl_matches_template() {
        let rendered = render_vcl("myapp.cloud.tsuru.io");

        assert_eq!(
            rendered,
            "backend default {\n    .host = \"myapp.cloud.tsuru.io\";\n    .port = \"80\";\n}\n"
        );
    }

    #[rstest]
    #[case("10.2.2.1")]
    #[case("myapp.cloud.tsuru.io")]
    #[case("")]
    fn render_vcl_embeds_target_once(#[case] target: &str) {
        let rendered = render_vcl(target);

        assert!(rendered.contains(&format!(".host = \"{target}\";")));
        assert!(rendered.contains(".port = \"80\";"));
        let without_target = rendered.replacen(target, "", 1);
        assert_eq!(without_target, render_vcl(""));
    }

    #[rstest]
    #[case("10.2.2.1")]
    #[case("myapp.cloud.tsuru.io")]
    #[case("[fe80::1]")]
    #[case("app_1.internal")]
    fn validate_host_accepts_plain_hosts(#[case] host: &str) {
        assert_eq!(validate_host(host), Ok(()));
    }

    #[rstest]
    #[case("app'; rm -rf /", '\'')]
    #[case("app\"host", '"')]
    #[case("app host", ' ')]
    #[case("app$(id)", '$')]
    #[case("app\nhost", '\n')]
    #[case("app`id`", '`')]
    fn validate_host_rejects_shell_characters(#[case] host: &str, #[case] expected: char) {
        let Err(AddressError::InvalidCharacter { character, .. }) = validate_host(host) else {
            panic!("{host:?} should be rejected");
        };
        assert_eq!(character, expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn validate_host_rejects_blank(#[case] host: &str) {
        assert_eq!(validate_host(host), Err(AddressError::Empty));
    }

    #[test]
    fn validate_host_rejects_option_like_hosts() {
        assert!(matches!(
            validate_host("-oProxyCommand=id"),
            Err(AddressError::LeadingDash { .. })
        ));
    }

    #[test]
    fn validate_host_rejects_overlong_hosts() {
        let host = "a".repeat(MAX_HOST_LEN + 1);
        assert_eq!(validate_host(&host), Err(AddressError::TooLong));
    }
}
