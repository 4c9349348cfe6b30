//! Cluster hash slots: key hashing, slot ownership, and redirect replies.

use std::sync::Arc;

use kvlink_common::{CommandError, CommandResult};

use crate::resp::RespValue;

/// Number of hash slots in a cluster.
pub const SLOT_COUNT: usize = 16384;

/// Calculates the hash slot for a key, honouring `{hash tag}` sections.
pub fn slot_for_key(key: &[u8]) -> u16 {
    if let Some(start) = key.iter().position(|&b| b == b'{') {
        if let Some(end) = key[start + 1..].iter().position(|&b| b == b'}') {
            if end > 0 {
                return crc16(&key[start + 1..start + 1 + end]) % SLOT_COUNT as u16;
            }
        }
    }
    crc16(key) % SLOT_COUNT as u16
}

/// CRC16/XMODEM, the checksum used for slot assignment.
fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Primary node address for every slot.
#[derive(Debug, Clone)]
pub struct SlotMap {
    owners: Vec<Option<Arc<str>>>,
}

impl Default for SlotMap {
    fn default() -> Self {
        SlotMap {
            owners: vec![None; SLOT_COUNT],
        }
    }
}

impl SlotMap {
    /// Builds the map from a `CLUSTER SLOTS` reply.
    ///
    /// Each entry is `[start, end, [host, port, ...], replicas...]`; only the
    /// primary is used. An empty host means "the node that answered", which
    /// is `reporting_host`.
    pub fn from_cluster_slots(reply: &RespValue, reporting_host: &str) -> CommandResult<Self> {
        let entries = match reply {
            RespValue::Array(entries) => entries,
            _ => return Err(CommandError::UnexpectedResponse),
        };

        let mut map = SlotMap::default();
        for entry in entries {
            let fields = match entry {
                RespValue::Array(fields) if fields.len() >= 3 => fields,
                _ => return Err(CommandError::Protocol("malformed CLUSTER SLOTS entry")),
            };
            let start = slot_number(&fields[0])?;
            let end = slot_number(&fields[1])?;
            if start > end {
                return Err(CommandError::Protocol("CLUSTER SLOTS range is inverted"));
            }
            let address: Arc<str> = primary_address(&fields[2], reporting_host)?.into();
            for slot in start..=end {
                map.owners[slot as usize] = Some(address.clone());
            }
        }
        Ok(map)
    }

    pub fn owner(&self, slot: u16) -> Option<&str> {
        self.owners.get(slot as usize)?.as_deref()
    }

    pub fn assign(&mut self, slot: u16, address: &str) {
        if let Some(owner) = self.owners.get_mut(slot as usize) {
            *owner = Some(Arc::from(address));
        }
    }

    /// Distinct owner addresses in slot order.
    pub fn addresses(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for owner in self.owners.iter().flatten() {
            if !seen.contains(&owner.as_ref()) {
                seen.push(owner);
            }
        }
        seen
    }

    pub fn covered_slots(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }
}

fn slot_number(value: &RespValue) -> CommandResult<u16> {
    match value {
        RespValue::Integer(n) if (0..SLOT_COUNT as i64).contains(n) => Ok(*n as u16),
        _ => Err(CommandError::Protocol("CLUSTER SLOTS slot out of range")),
    }
}

fn primary_address(node: &RespValue, reporting_host: &str) -> CommandResult<String> {
    let fields = match node {
        RespValue::Array(fields) if fields.len() >= 2 => fields,
        _ => return Err(CommandError::Protocol("malformed CLUSTER SLOTS node")),
    };
    let host = match &fields[0] {
        RespValue::Bulk(Some(host)) | RespValue::Simple(host) => {
            String::from_utf8_lossy(host).into_owned()
        }
        RespValue::Bulk(None) => String::new(),
        _ => return Err(CommandError::Protocol("malformed CLUSTER SLOTS host")),
    };
    let port = match &fields[1] {
        RespValue::Integer(port) if (0..=u16::MAX as i64).contains(port) => *port as u16,
        _ => return Err(CommandError::Protocol("malformed CLUSTER SLOTS port")),
    };
    let host = if host.is_empty() || host == "?" {
        reporting_host.to_string()
    } else {
        host
    };
    Ok(format!("{}:{}", host, port))
}

/// A `MOVED` or `ASK` error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// The slot now lives elsewhere permanently.
    Moved { slot: u16, address: String },
    /// The slot is migrating; retry once on the target after `ASKING`.
    Ask { slot: u16, address: String },
}

impl Redirect {
    /// Parses a reply as a redirect. `current_host` fills in addresses that
    /// omit the host (`MOVED 12 :7001`).
    pub fn from_reply(reply: &RespValue, current_host: &str) -> Option<Redirect> {
        let message = match reply {
            RespValue::Error(message) => std::str::from_utf8(message).ok()?,
            _ => return None,
        };
        let mut parts = message.split_whitespace();
        let kind = parts.next()?;
        let slot = parts.next()?.parse::<u16>().ok()?;
        let target = parts.next()?;
        let (host, port) = target.rsplit_once(':')?;
        let port = port.parse::<u16>().ok()?;
        let host = if host.is_empty() { current_host } else { host };
        let address = format!("{}:{}", host, port);

        match kind {
            "MOVED" => Some(Redirect::Moved { slot, address }),
            "ASK" => Some(Redirect::Ask { slot, address }),
            _ => None,
        }
    }
}

/// Splits a `host:port` routing address.
pub(crate) fn split_address(address: &str) -> CommandResult<(&str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or(CommandError::Protocol("node address without port"))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| CommandError::Protocol("node address with invalid port"))?;
    Ok((host, port))
}
