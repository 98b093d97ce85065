//! Kernel neighbor-table scan
//!
//! Hosts the kernel has recently exchanged frames with show up in the ARP
//! table whether or not they advertise anything. Completed entries on
//! wireless, wired, and cellular interfaces become low-priority candidates.

use tokio::sync::mpsc;

use tether_core::DiscoverySource;

use crate::candidate::Candidate;

/// Fixed OS neighbor-table path
pub const NEIGHBOR_TABLE_PATH: &str = "/proc/net/arp";

/// ARP flag bit for a completed (resolved) entry
const FLAG_COMPLETE: u32 = 0x2;

/// Interface name prefixes worth scanning
const INTERFACE_PREFIXES: [&str; 4] = ["wlan", "eth", "en", "rmnet"];

/// Read the neighbor table, streaming a candidate per completed entry
pub async fn scan(tx: mpsc::Sender<Candidate>) {
    let content = match tokio::fs::read_to_string(NEIGHBOR_TABLE_PATH).await {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("Neighbor table read failed: {}", e);
            return;
        }
    };
    for candidate in parse_neighbor_table(&content) {
        if tx.send(candidate).await.is_err() {
            return;
        }
    }
}

/// Parse `/proc/net/arp`: whitespace columns
/// `IP address  HW type  Flags  HW address  Mask  Device`, one header line
fn parse_neighbor_table(content: &str) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for line in content.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 6 {
            continue;
        }
        let (ip, flags, device) = (fields[0], fields[2], fields[5]);

        let flags = u32::from_str_radix(flags.trim_start_matches("0x"), 16).unwrap_or(0);
        if flags & FLAG_COMPLETE == 0 {
            continue;
        }
        if !INTERFACE_PREFIXES.iter().any(|p| device.starts_with(p)) {
            continue;
        }

        candidates.push(Candidate::bare(ip, DiscoverySource::Neighbor));
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
10.0.0.5         0x1         0x2         aa:bb:cc:dd:ee:01     *        wlan0
10.0.0.6         0x1         0x0         00:00:00:00:00:00     *        wlan0
10.0.0.7         0x1         0x2         aa:bb:cc:dd:ee:03     *        docker0
10.0.0.8         0x1         0x2         aa:bb:cc:dd:ee:04     *        eth0
10.0.0.9         0x1         0x6         aa:bb:cc:dd:ee:05     *        rmnet0
";

    #[test]
    fn test_parse_completed_entries_on_known_interfaces() {
        let candidates = parse_neighbor_table(TABLE);
        let hosts: Vec<&str> = candidates.iter().map(|c| c.host.as_str()).collect();

        // Incomplete entries and unknown interfaces are skipped; flag 0x6
        // still has the complete bit set.
        assert_eq!(hosts, vec!["10.0.0.5", "10.0.0.8", "10.0.0.9"]);
        assert!(candidates
            .iter()
            .all(|c| c.source == DiscoverySource::Neighbor));
    }

    #[test]
    fn test_parse_empty_table() {
        assert!(parse_neighbor_table("IP address HW type Flags\n").is_empty());
    }
}
