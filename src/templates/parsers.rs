//! Raw tool output -> typed content. Every parser is permissive: lines that
//! don't match are skipped, and empty output gives an empty collection.

use std::{
    collections::BTreeMap,
    net::Ipv4Addr,
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    net::Ipv4Subnet,
    types::{Credential, SessionId},
};

static HOST_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[\+\]\s+(\d{1,3}(?:\.\d{1,3}){3})\s+host found\s*$")
        .expect("host-found pattern is valid")
});

static OPEN_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[\+\]\s+.*?(\d{1,3}(?:\.\d{1,3}){3}):(\d{1,5})\s+-\s+TCP OPEN\s*$")
        .expect("open-port pattern is valid")
});

static ROUTE_SUBNET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[\+\].*?(\d{1,3}(?:\.\d{1,3}){3})/(\d{1,3}(?:\.\d{1,3}){3}|\d{1,2})\b")
        .expect("route pattern is valid")
});

static SESSION_OPENED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)session (\d+) opened").expect("session pattern is valid")
});

static LOGIN_SUCCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[\+\].*?Success:\s+'([^':]+):([^']*)'")
        .expect("login pattern is valid")
});

/// Addresses reported by a ping sweep, in output order.
pub fn responsive_hosts(output: &str) -> Vec<Ipv4Addr> {
    HOST_FOUND
        .captures_iter(output)
        .filter_map(|caps| caps[1].parse().ok())
        .collect()
}

/// Open ports per address, each port list sorted and deduplicated.
pub fn open_ports(output: &str) -> BTreeMap<Ipv4Addr, Vec<u16>> {
    let mut services: BTreeMap<Ipv4Addr, Vec<u16>> = BTreeMap::new();
    for caps in OPEN_PORT.captures_iter(output) {
        let (Ok(address), Ok(port)) = (caps[1].parse::<Ipv4Addr>(), caps[2].parse::<u16>()) else {
            continue;
        };
        services.entry(address).or_default().push(port);
    }

    for ports in services.values_mut() {
        ports.sort_unstable();
        ports.dedup();
    }
    services
}

/// One path per non-empty line.
pub fn file_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

pub fn trim_single_newline(output: &str) -> String {
    let output = output.strip_suffix('\n').unwrap_or(output);
    output.strip_suffix('\r').unwrap_or(output).to_string()
}

/// Subnets announced on success lines, in `/prefix` or `/netmask` form.
pub fn routed_subnets(output: &str) -> Vec<Ipv4Subnet> {
    let mut subnets = Vec::new();
    for caps in ROUTE_SUBNET.captures_iter(output) {
        let Ok(subnet) = format!("{}/{}", &caps[1], &caps[2]).parse::<Ipv4Subnet>() else {
            continue;
        };
        if !subnets.contains(&subnet) {
            subnets.push(subnet);
        }
    }
    subnets
}

pub fn opened_session_id(output: &str) -> Option<SessionId> {
    SESSION_OPENED
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
}

pub fn login_credentials(output: &str) -> Vec<Credential> {
    LOGIN_SUCCESS
        .captures_iter(output)
        .map(|caps| Credential {
            username: caps[1].to_string(),
            password: caps[2].to_string(),
        })
        .collect()
}
