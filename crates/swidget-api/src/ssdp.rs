// SSDP search for devices on the local segment.
//
// One M-SEARCH datagram goes to the multicast group; every reply that
// arrives inside the response window is parsed into an `SsdpReply`.
// Deduplication and typing happen in `swidget-core`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;

/// SSDP multicast group and port.
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Service type the device firmware answers to.
pub const SWIDGET_SERVICE_TYPE: &str = "urn:swidget:pico:1";

const MAX_DATAGRAM: usize = 2048;

/// A parsed search response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpReply {
    /// Suffix of `USN` after the last `-`.
    pub mac: String,
    /// Host portion of `LOCATION`.
    pub host: String,
    /// `ST` header, when present.
    pub service_type: Option<String>,
    /// First half of the `SERVER` product token (`dimmer` in `... dimmer+thp/1.2`).
    pub device_type: Option<String>,
    /// Second half of the `SERVER` product token (`thp` in `... dimmer+thp/1.2`).
    pub insert_type: Option<String>,
}

/// Render the M-SEARCH request for `service_type`.
pub fn search_request(service_type: &str, mx_secs: u64) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx_secs}\r\n\
         ST: {service_type}\r\n\
         \r\n"
    )
}

/// Split a datagram into its headers, keyed by upper-cased name.
///
/// Returns `None` unless the first line is an HTTP `200` status line.
fn parse_headers(datagram: &str) -> Option<HashMap<String, String>> {
    let mut lines = datagram.lines();
    let status = lines.next()?;
    let mut parts = status.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") || parts.next()? != "200" {
        return None;
    }

    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_uppercase(), value.trim().to_owned()))
        .collect();
    Some(headers)
}

/// Parse a search response. Replies without `USN` or a usable `LOCATION`
/// are dropped.
pub fn parse_reply(datagram: &str) -> Option<SsdpReply> {
    let headers = parse_headers(datagram)?;

    let mac = headers.get("USN")?.rsplit('-').next()?.trim().to_owned();
    if mac.is_empty() {
        return None;
    }
    let location = Url::parse(headers.get("LOCATION")?).ok()?;
    let host = location.host_str()?.to_owned();

    // SERVER: "<os> <device_type>+<insert_type>/<version>"
    let product = headers
        .get("SERVER")
        .and_then(|server| server.split_whitespace().nth(1))
        .map(|token| token.split('/').next().unwrap_or(token));
    let (device_type, insert_type) = match product.and_then(|p| p.split_once('+')) {
        Some((device, insert)) => (Some(device.to_owned()), Some(insert.to_owned())),
        None => (product.map(str::to_owned), None),
    };

    Some(SsdpReply {
        mac,
        host,
        service_type: headers.get("ST").cloned(),
        device_type,
        insert_type,
    })
}

/// Send one M-SEARCH to `target` and collect replies for `window`.
///
/// Replies advertising a different `ST` are ignored. Order follows
/// arrival; duplicates are kept.
pub async fn search(
    target: SocketAddr,
    service_type: &str,
    window: Duration,
) -> Result<Vec<SsdpReply>, Error> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    let mx = window.as_secs().max(1);
    socket
        .send_to(search_request(service_type, mx).as_bytes(), target)
        .await?;
    debug!(%target, service_type, window_ms = window.as_millis(), "SSDP search sent");

    let deadline = Instant::now() + window;
    let mut replies = Vec::new();
    let mut buf = [0_u8; MAX_DATAGRAM];

    loop {
        let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        let (len, from) = match received {
            Err(_) => break,
            Ok(result) => result?,
        };

        let datagram = String::from_utf8_lossy(&buf[..len]);
        let Some(reply) = parse_reply(&datagram) else {
            trace!(%from, "Ignoring unparseable SSDP datagram");
            continue;
        };
        if reply
            .service_type
            .as_deref()
            .is_some_and(|st| st != service_type)
        {
            trace!(%from, st = ?reply.service_type, "Ignoring foreign SSDP service");
            continue;
        }

        debug!(%from, mac = %reply.mac, host = %reply.host, "SSDP reply");
        replies.push(reply);
    }

    Ok(replies)
}
