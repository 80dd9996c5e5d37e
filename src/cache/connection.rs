//! Conversion of cache connection strings into Redis URLs.
//!
//! Managed Redis offerings usually hand out connection strings in the
//! comma-separated StackExchange form:
//!
//! ```text
//! contoso.redis.cache.windows.net:6380,password=secret,ssl=True,abortConnect=False
//! ```
//!
//! `redis` only understands URLs, so [`redis_url`] translates that form and
//! passes genuine URLs through untouched.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::CacheError;

const URL_SCHEMES: [&str; 4] = ["redis://", "rediss://", "redis+unix://", "unix://"];

const DEFAULT_PORT: u16 = 6379;
const DEFAULT_TLS_PORT: u16 = 6380;

/// Returns a Redis URL for `connection_string`.
///
/// Recognised StackExchange options are `password`, `user`, `ssl` and
/// `defaultDatabase` (case-insensitive). Client-tuning options such as
/// `abortConnect` or `connectTimeout` are ignored. Only the first endpoint
/// is used when several are listed.
///
/// # Errors
///
/// Returns [`CacheError::InvalidConnectionString`] if the string is empty,
/// names no endpoint, or carries an unparsable port, `ssl` flag or database.
///
/// # Examples
///
/// ```
/// use greeting_cache::cache::redis_url;
///
/// let url = redis_url("cache.example.net:6380,password=s3cret,ssl=True").unwrap();
/// assert_eq!(url, "rediss://:s3cret@cache.example.net:6380");
///
/// let url = redis_url("redis://127.0.0.1:6379/0").unwrap();
/// assert_eq!(url, "redis://127.0.0.1:6379/0");
/// ```
pub fn redis_url(connection_string: &str) -> Result<String, CacheError> {
    let raw = connection_string.trim();
    if raw.is_empty() {
        return Err(invalid("connection string is empty"));
    }
    if URL_SCHEMES.iter().any(|scheme| raw.starts_with(scheme)) {
        return Ok(raw.to_owned());
    }

    let mut endpoint = None;
    let mut user = None;
    let mut password = None;
    let mut tls = false;
    let mut database = None;

    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            endpoint.get_or_insert(part);
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "password" => password = Some(value),
            "user" => user = Some(value),
            "ssl" => {
                tls = value
                    .parse::<bool>()
                    .or_else(|_| value.to_ascii_lowercase().parse::<bool>())
                    .map_err(|_| invalid(format!("ssl must be true or false, got {value:?}")))?;
            }
            "defaultdatabase" => {
                let db = value
                    .parse::<u32>()
                    .map_err(|_| invalid(format!("defaultDatabase must be a number, got {value:?}")))?;
                database = Some(db);
            }
            _ => {}
        }
    }

    let endpoint = endpoint.ok_or_else(|| invalid("no host endpoint given"))?;
    let (host, port) = split_endpoint(endpoint)?;
    let port = port.unwrap_or(if tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT });

    let scheme = if tls { "rediss" } else { "redis" };
    let auth = match (user, password) {
        (Some(user), Some(password)) => format!("{}:{}@", encode(user), encode(password)),
        (Some(user), None) => format!("{}@", encode(user)),
        (None, Some(password)) => format!(":{}@", encode(password)),
        (None, None) => String::new(),
    };
    let path = database.map(|db| format!("/{db}")).unwrap_or_default();

    Ok(format!("{scheme}://{auth}{host}:{port}{path}"))
}

/// Splits `host[:port]`; IPv6 hosts must be bracketed (`[::1]:6379`).
fn split_endpoint(endpoint: &str) -> Result<(&str, Option<u16>), CacheError> {
    let (host, port) = if endpoint.starts_with('[') {
        let close = endpoint
            .find(']')
            .ok_or_else(|| invalid(format!("unterminated IPv6 host in {endpoint:?}")))?;
        let (host, rest) = endpoint.split_at(close + 1);
        match rest.strip_prefix(':') {
            Some(port) => (host, Some(port)),
            None if rest.is_empty() => (host, None),
            None => return Err(invalid(format!("unexpected text after host in {endpoint:?}"))),
        }
    } else {
        match endpoint.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (endpoint, None),
        }
    };

    if host.is_empty() || host == "[]" {
        return Err(invalid(format!("missing host in {endpoint:?}")));
    }
    let port = port
        .map(|p| {
            p.parse::<u16>()
                .map_err(|_| invalid(format!("invalid port {p:?}")))
        })
        .transpose()?;
    Ok((host, port))
}

fn encode(component: &str) -> String {
    utf8_percent_encode(component, NON_ALPHANUMERIC).to_string()
}

fn invalid(reason: impl Into<String>) -> CacheError {
    CacheError::InvalidConnectionString(reason.into())
}
