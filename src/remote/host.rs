use std::fmt;
use std::str::FromStr;

use crate::error::HostSpecError;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// `[user@]host[:port]`, resolved to concrete values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSpec {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl HostSpec {
    /// Parse a host string. The user defaults to the invoking OS user and
    /// the port to 22. IPv6 literals need brackets when a port is given
    /// (`[::1]:2222`); a bare IPv6 literal is taken as the host.
    pub fn parse(input: &str) -> Result<Self, HostSpecError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(HostSpecError::EmptyHost);
        }

        let (user, rest) = match input.split_once('@') {
            Some((user, rest)) => {
                if user.is_empty() {
                    return Err(HostSpecError::EmptyUser(input.to_string()));
                }
                (user.to_string(), rest)
            }
            None => (current_user(), input),
        };

        let (host, port) = split_host_port(rest)?;
        if host.is_empty() {
            return Err(HostSpecError::EmptyHost);
        }

        Ok(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    /// Address form accepted by `ToSocketAddrs`.
    pub fn address(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

fn split_host_port(rest: &str) -> Result<(&str, u16), HostSpecError> {
    if let Some(stripped) = rest.strip_prefix('[') {
        let (host, after) = stripped
            .split_once(']')
            .ok_or(HostSpecError::EmptyHost)?;
        return match after {
            "" => Ok((host, DEFAULT_SSH_PORT)),
            _ => match after.strip_prefix(':') {
                Some(port) => Ok((host, parse_port(port)?)),
                None => Err(HostSpecError::InvalidPort(after.to_string())),
            },
        };
    }

    match rest.matches(':').count() {
        0 => Ok((rest, DEFAULT_SSH_PORT)),
        1 => {
            let (host, port) = rest.split_once(':').unwrap_or((rest, ""));
            Ok((host, parse_port(port)?))
        }
        // Unbracketed IPv6 literal.
        _ => Ok((rest, DEFAULT_SSH_PORT)),
    }
}

fn parse_port(port: &str) -> Result<u16, HostSpecError> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(HostSpecError::InvalidPort(port.to_string())),
        Ok(p) => Ok(p),
    }
}

/// Login name of whoever runs us.
fn current_user() -> String {
    users::get_current_username()
        .and_then(|name| name.into_string().ok())
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .unwrap_or_else(|| "root".to_string())
}

impl FromStr for HostSpec {
    type Err = HostSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}@[{}]:{}", self.user, self.host, self.port)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let spec = HostSpec::parse("user@example.com:2222").unwrap();
        assert_eq!(spec.user, "user");
        assert_eq!(spec.host, "example.com");
        assert_eq!(spec.port, 2222);
    }

    #[test]
    fn test_parse_no_port() {
        let spec = HostSpec::parse("user@example.com").unwrap();
        assert_eq!(spec.port, 22);
    }

    #[test]
    fn test_parse_host_only_uses_current_user() {
        let spec = HostSpec::parse("example.com").unwrap();
        assert_eq!(spec.host, "example.com");
        assert_eq!(spec.port, 22);
        assert!(!spec.user.is_empty());
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let spec = HostSpec::parse("root@[::1]:2222").unwrap();
        assert_eq!(spec.host, "::1");
        assert_eq!(spec.port, 2222);
        assert_eq!(spec.to_string(), "root@[::1]:2222");

        let spec = HostSpec::parse("[fe80::1]").unwrap();
        assert_eq!(spec.port, 22);
    }

    #[test]
    fn test_parse_bare_ipv6() {
        let spec = HostSpec::parse("me@fe80::2").unwrap();
        assert_eq!(spec.host, "fe80::2");
        assert_eq!(spec.port, 22);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(HostSpec::parse(""), Err(HostSpecError::EmptyHost));
        assert_eq!(HostSpec::parse("   "), Err(HostSpecError::EmptyHost));
        assert_eq!(HostSpec::parse("user@"), Err(HostSpecError::EmptyHost));
        assert_eq!(HostSpec::parse("user@:22"), Err(HostSpecError::EmptyHost));
        assert!(matches!(
            HostSpec::parse("@host"),
            Err(HostSpecError::EmptyUser(_))
        ));
        assert_eq!(
            HostSpec::parse("host:abc"),
            Err(HostSpecError::InvalidPort("abc".into()))
        );
        assert_eq!(
            HostSpec::parse("host:0"),
            Err(HostSpecError::InvalidPort("0".into()))
        );
        assert_eq!(
            HostSpec::parse("host:"),
            Err(HostSpecError::InvalidPort("".into()))
        );
    }

    #[test]
    fn test_display() {
        let spec = HostSpec::parse("user@example.com:2222").unwrap();
        assert_eq!(spec.to_string(), "user@example.com:2222");
        let spec: HostSpec = "ops@box".parse().unwrap();
        assert_eq!(spec.to_string(), "ops@box:22");
    }
}
