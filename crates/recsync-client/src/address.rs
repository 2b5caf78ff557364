//! Server address validation and endpoint derivation.

use std::fmt;

use recsync_core::{DeviceId, SyncError};
use reqwest::Url;

/// Path of the recording-events stream, relative to the server address.
pub const STREAM_PATH: &str = "/ws/recording";
/// Path of the status-listing endpoint used for the initial snapshot.
pub const SNAPSHOT_PATH: &str = "/v1/device_manager/GetAllRecordingStatus";

/// A validated recording-service base address.
///
/// Accepts `http://host[:port][/prefix]`, `https://...`, or a bare
/// `host[:port]` (treated as `http`). The scheme is matched
/// case-insensitively and the stored form is normalized: lower-case scheme
/// and host, no default port, no trailing slash.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    base: String,
    stream: Url,
}

impl ServerAddress {
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SyncError::invalid_address(raw, "address is empty"));
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("http".to_string(), trimmed),
        };
        if !matches!(scheme.as_str(), "http" | "https") {
            return Err(SyncError::invalid_address(
                raw,
                format!("unsupported scheme {scheme:?}"),
            ));
        }
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(SyncError::invalid_address(raw, "missing host"));
        }

        let url = Url::parse(&format!("{scheme}://{rest}"))
            .map_err(|e| SyncError::invalid_address(raw, e.to_string()))?;
        let Some(host) = url.host_str().filter(|h| !h.is_empty()) else {
            return Err(SyncError::invalid_address(raw, "missing host"));
        };
        if url.query().is_some() || url.fragment().is_some() {
            return Err(SyncError::invalid_address(
                raw,
                "query strings and fragments are not allowed",
            ));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(SyncError::invalid_address(raw, "credentials are not allowed"));
        }

        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        let prefix = url.path().trim_end_matches('/');
        let base = format!("{}://{host}{port}{prefix}", url.scheme());

        let mut stream = url.clone();
        stream
            .set_scheme("ws")
            .map_err(|()| SyncError::invalid_address(raw, "cannot derive stream url"))?;
        stream.set_path(&format!("{prefix}{STREAM_PATH}"));

        Ok(Self { base, stream })
    }

    /// Base address with scheme, as used for HTTP requests.
    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Stream socket URL: the address re-rooted on `ws://` plus the
    /// recording-events path. The device filter is form-encoded.
    pub fn stream_url(&self, device_filter: Option<&DeviceId>) -> String {
        let mut url = self.stream.clone();
        if let Some(device) = device_filter {
            url.query_pairs_mut()
                .append_pair("device_number", device.as_str());
        }
        url.into()
    }

    pub fn snapshot_url(&self) -> String {
        format!("{}{SNAPSHOT_PATH}", self.base)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn strips_http_scheme_for_stream() {
        let addr = ServerAddress::parse("http://192.168.2.2:8080").unwrap();
        assert_eq!(addr.stream_url(None), "ws://192.168.2.2:8080/ws/recording");
        assert_eq!(
            addr.snapshot_url(),
            "http://192.168.2.2:8080/v1/device_manager/GetAllRecordingStatus"
        );
    }

    #[test]
    fn strips_https_scheme_for_stream() {
        let addr = ServerAddress::parse("https://blueos.local/ping/").unwrap();
        assert_eq!(addr.as_str(), "https://blueos.local/ping");
        assert_eq!(addr.stream_url(None), "ws://blueos.local/ping/ws/recording");
    }

    #[test]
    fn bare_host_defaults_to_http() {
        let addr = ServerAddress::parse("  localhost:6060 ").unwrap();
        assert_eq!(addr.as_str(), "http://localhost:6060");
        assert_eq!(addr.stream_url(None), "ws://localhost:6060/ws/recording");
    }

    #[test]
    fn device_filter_adds_query() {
        let addr = ServerAddress::parse("http://host:1").unwrap();
        let device = DeviceId::from("00000000-0000-0000-0000-000000000001");
        assert_eq!(
            addr.stream_url(Some(&device)),
            "ws://host:1/ws/recording?device_number=00000000-0000-0000-0000-000000000001"
        );
    }

    #[test]
    fn device_filter_is_form_encoded() {
        let addr = ServerAddress::parse("http://host:1").unwrap();
        let device = DeviceId::from("a b&c");
        assert_eq!(
            addr.stream_url(Some(&device)),
            "ws://host:1/ws/recording?device_number=a+b%26c"
        );
    }

    #[test]
    fn scheme_and_host_are_normalized() {
        let addr = ServerAddress::parse("HTTP://Host:1/").unwrap();
        assert_eq!(addr.as_str(), "http://host:1");
        assert_eq!(addr.stream_url(None), "ws://host:1/ws/recording");

        let addr = ServerAddress::parse("HttpS://blueos.local/Ping").unwrap();
        assert_eq!(addr.as_str(), "https://blueos.local/Ping");
        assert_eq!(addr.stream_url(None), "ws://blueos.local/Ping/ws/recording");
    }

    #[test]
    fn default_port_is_dropped() {
        let addr = ServerAddress::parse("http://host:80").unwrap();
        assert_eq!(addr.as_str(), "http://host");
        assert_eq!(ServerAddress::parse("[::1]:6060").unwrap().as_str(), "http://[::1]:6060");
    }

    #[test]
    fn rejects_bad_addresses() {
        for raw in [
            "",
            "   ",
            "/",
            "ftp://host",
            "http://",
            "HTTP://",
            "https:///",
            "://host",
            "http://host?x=1",
            "http://host#top",
            "http://user:pw@host",
            "http://ho st",
        ] {
            assert_matches!(
                ServerAddress::parse(raw),
                Err(SyncError::InvalidAddress { .. }),
                "accepted {raw:?}"
            );
        }
    }
}
